//! Bounded, error-context-aware retry loop for generated code.
//!
//! Wraps a caller-supplied [`CodeRunner`] (typically a shell command writing
//! a temp file and executing it) and, on failure, asks the model to produce
//! a fix informed by the captured stderr, a short environment snapshot, and
//! a coarse error category.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

use crate::ai::providers::health::ProviderRouter;
use crate::ai::types::{CompletionRequest, Message};
use crate::trace::{SpanKind, SpanStatus, TraceRecorder};
use crate::util::truncate_to;

const ENV_SNAPSHOT_CAP_BYTES: usize = 2 * 1024;
const DEFAULT_MAX_ATTEMPTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SelfHealError {
    #[error("self-healing exhausted {attempts} attempt(s); last error ({category:?}): {message}")]
    Exhausted {
        attempts: usize,
        category: ErrorCategory,
        message: String,
    },
    #[error("provider error during healing: {0}")]
    Provider(String),
}

/// Coarse classification of a failed run's stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    ModuleMissing,
    Syntax,
    Type,
    Name,
    Attribute,
    Key,
    Index,
    Value,
    FileMissing,
    ZeroDivision,
    Indentation,
    Import,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ModuleMissing => "module-missing",
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Type => "type",
            ErrorCategory::Name => "name",
            ErrorCategory::Attribute => "attribute",
            ErrorCategory::Key => "key",
            ErrorCategory::Index => "index",
            ErrorCategory::Value => "value",
            ErrorCategory::FileMissing => "file-missing",
            ErrorCategory::ZeroDivision => "zero-division",
            ErrorCategory::Indentation => "indentation",
            ErrorCategory::Import => "import",
            ErrorCategory::Other => "other",
        }
    }
}

/// Classify stderr output into an [`ErrorCategory`] via an ordered regex
/// table; first match wins.
pub fn classify_error(stderr: &str) -> ErrorCategory {
    let table: &[(&str, ErrorCategory)] = &[
        (r"ModuleNotFoundError|No module named", ErrorCategory::ModuleMissing),
        (r"SyntaxError|syntax error", ErrorCategory::Syntax),
        (r"IndentationError", ErrorCategory::Indentation),
        (r"TypeError", ErrorCategory::Type),
        (r"NameError", ErrorCategory::Name),
        (r"AttributeError", ErrorCategory::Attribute),
        (r"KeyError", ErrorCategory::Key),
        (r"IndexError", ErrorCategory::Index),
        (r"ValueError", ErrorCategory::Value),
        (r"FileNotFoundError|No such file or directory", ErrorCategory::FileMissing),
        (r"ZeroDivisionError|division by zero", ErrorCategory::ZeroDivision),
        (r"ImportError", ErrorCategory::Import),
    ];

    for (pattern, category) in table {
        if Regex::new(pattern)
            .map(|re| re.is_match(stderr))
            .unwrap_or(false)
        {
            return *category;
        }
    }
    ErrorCategory::Other
}

/// Result of one execution attempt.
pub struct CodeRunResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Abstraction over "run this code and tell me what happened", so
/// `SelfHealingExecutor` stays agnostic to the language and the concrete
/// tool (shell + temp file, in-process interpreter, etc.) doing the running.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str) -> CodeRunResult;
}

/// Best-effort, truncated snapshot of the local environment for inclusion in
/// a healing prompt.
pub fn capture_env_snapshot(installed_packages: &str) -> String {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    let snapshot = format!(
        "os: {os}\narch: {arch}\npackages:\n{}",
        truncate_to(installed_packages, ENV_SNAPSHOT_CAP_BYTES / 2)
    );
    truncate_to(&snapshot, ENV_SNAPSHOT_CAP_BYTES)
}

fn build_healing_prompt(code: &str, stderr: &str, category: ErrorCategory, env_snapshot: &str) -> String {
    format!(
        "The following code failed to run.\n\n\
         Error category: {category}\n\n\
         --- code ---\n{code}\n\n\
         --- stderr ---\n{stderr}\n\n\
         --- environment ---\n{env_snapshot}\n\n\
         Reply with a corrected version of the code as a single fenced code block.",
        category = category.as_str(),
    )
}

/// Pull the first fenced code block (```lang\n...\n```` or plain ```) out of
/// a model reply.
fn extract_first_code_block(reply: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```[a-zA-Z0-9_+-]*\n(.*?)```").ok()?;
    re.captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end().to_string())
}

pub struct SelfHealingExecutor {
    router: Arc<ProviderRouter>,
    max_attempts: usize,
}

impl SelfHealingExecutor {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self {
            router,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Run `code` via `runner`, feeding failures back into a correction loop
    /// bounded at `max_attempts`. Each attempt opens a `self_heal` span.
    #[tracing::instrument(skip(self, trace, runner, code), fields(trace_id))]
    pub async fn heal(
        &self,
        trace: &TraceRecorder,
        trace_id: &str,
        parent_span: Option<&str>,
        mut code: String,
        env_snapshot: &str,
        runner: &dyn CodeRunner,
    ) -> Result<String, SelfHealError> {
        let mut last_category = ErrorCategory::Other;
        let mut last_stderr = String::new();

        for attempt in 1..=self.max_attempts {
            let span_id = trace
                .start_span(trace_id, SpanKind::SelfHeal, "self_heal", parent_span)
                .ok();

            let result = runner.run(&code).await;

            if result.success {
                if let Some(span_id) = &span_id {
                    let mut attrs = std::collections::HashMap::new();
                    attrs.insert("attempt".to_string(), attempt.to_string());
                    attrs.insert("success".to_string(), "true".to_string());
                    let _ = trace.end_span(trace_id, span_id, SpanStatus::Ok, attrs, vec![]);
                }
                return Ok(code);
            }

            let category = classify_error(&result.stderr);
            last_category = category;
            last_stderr = result.stderr.clone();

            if let Some(span_id) = &span_id {
                let mut attrs = std::collections::HashMap::new();
                attrs.insert("attempt".to_string(), attempt.to_string());
                attrs.insert("error_category".to_string(), category.as_str().to_string());
                attrs.insert("success".to_string(), "false".to_string());
                let _ = trace.end_span(trace_id, span_id, SpanStatus::Error, attrs, vec![]);
            }

            if category == ErrorCategory::Other && attempt > 1 {
                break;
            }

            if attempt == self.max_attempts {
                break;
            }

            let prompt = build_healing_prompt(&code, &result.stderr, category, env_snapshot);
            let request = CompletionRequest::new("healing", vec![Message::user(prompt)])
                .with_temperature(0.0);

            let (_, response) = self
                .router
                .route_complete(request)
                .await
                .map_err(|e| SelfHealError::Provider(e.to_string()))?;

            match extract_first_code_block(&response.content) {
                Some(new_code) => code = new_code,
                None => break,
            }
        }

        Err(SelfHealError::Exhausted {
            attempts: self.max_attempts,
            category: last_category,
            message: last_stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{LLMProvider, Result as ProviderResult, StreamResponse};
    use crate::ai::providers::health::{ProviderEndpointConfig, ProviderKind};
    use crate::ai::types::CompletionResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn classify_error_recognizes_module_missing() {
        let category = classify_error("ModuleNotFoundError: No module named 'pandas'");
        assert_eq!(category, ErrorCategory::ModuleMissing);
    }

    #[test]
    fn classify_error_recognizes_zero_division() {
        assert_eq!(
            classify_error("ZeroDivisionError: division by zero"),
            ErrorCategory::ZeroDivision
        );
    }

    #[test]
    fn classify_error_falls_back_to_other() {
        assert_eq!(classify_error("segmentation fault"), ErrorCategory::Other);
    }

    #[test]
    fn extract_first_code_block_pulls_fenced_content() {
        let reply = "Here's the fix:\n```python\nprint('ok')\n```\nLet me know.";
        let code = extract_first_code_block(reply).unwrap();
        assert_eq!(code, "print('ok')");
    }

    struct FixingProvider {
        fail_once: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for FixingProvider {
        async fn complete(&self, _request: CompletionRequest) -> ProviderResult<CompletionResponse> {
            self.fail_once.fetch_add(1, Ordering::SeqCst);
            Ok(CompletionResponse {
                content: "```python\nimport csv\nprint('fixed')\n```".to_string(),
                tool_use: None,
                model: "healing".to_string(),
                usage: None,
                finish_reason: Some("stop".to_string()),
            })
        }

        async fn stream(&self, _request: CompletionRequest) -> ProviderResult<StreamResponse> {
            Err("unsupported".to_string())
        }

        fn context_limit(&self) -> usize {
            4096
        }

        fn supports_tools(&self) -> bool {
            false
        }

        fn provider_name(&self) -> &str {
            "fixing"
        }
    }

    struct FailThenSucceedRunner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CodeRunner for FailThenSucceedRunner {
        async fn run(&self, _code: &str) -> CodeRunResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                CodeRunResult {
                    success: false,
                    stdout: String::new(),
                    stderr: "ModuleNotFoundError: No module named 'pandas'".to_string(),
                }
            } else {
                CodeRunResult {
                    success: true,
                    stdout: "fixed".to_string(),
                    stderr: String::new(),
                }
            }
        }
    }

    #[tokio::test]
    async fn heals_module_missing_error_on_second_attempt() {
        let router = Arc::new(ProviderRouter::new(vec![ProviderEndpointConfig {
            id: "healing".to_string(),
            kind: ProviderKind::OpenAiCompatible,
            base_priority: 100,
            provider: Arc::new(FixingProvider {
                fail_once: AtomicUsize::new(0),
            }),
        }]));
        let executor = SelfHealingExecutor::new(router);
        let trace = TraceRecorder::new();
        let trace_id = trace.start_trace("heal pandas import");
        let runner = FailThenSucceedRunner {
            calls: AtomicUsize::new(0),
        };

        let result = executor
            .heal(
                &trace,
                &trace_id,
                None,
                "import pandas".to_string(),
                "os: linux\npackages: (none)",
                &runner,
            )
            .await;

        assert!(result.is_ok());
        let trace = trace.get(&trace_id).unwrap();
        let heal_spans: Vec<_> = trace
            .spans
            .iter()
            .filter(|s| s.kind == SpanKind::SelfHeal)
            .collect();
        assert_eq!(heal_spans.len(), 2);
    }

    struct AlwaysFailsRunner;
    #[async_trait]
    impl CodeRunner for AlwaysFailsRunner {
        async fn run(&self, _code: &str) -> CodeRunResult {
            CodeRunResult {
                success: false,
                stdout: String::new(),
                stderr: "ZeroDivisionError: division by zero".to_string(),
            }
        }
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts_and_returns_original_category() {
        let router = Arc::new(ProviderRouter::new(vec![ProviderEndpointConfig {
            id: "healing".to_string(),
            kind: ProviderKind::OpenAiCompatible,
            base_priority: 100,
            provider: Arc::new(FixingProvider {
                fail_once: AtomicUsize::new(0),
            }),
        }]));
        let executor = SelfHealingExecutor::new(router).with_max_attempts(2);
        let trace = TraceRecorder::new();
        let trace_id = trace.start_trace("heal forever-broken code");

        let result = executor
            .heal(
                &trace,
                &trace_id,
                None,
                "1 / 0".to_string(),
                "os: linux",
                &AlwaysFailsRunner,
            )
            .await;

        match result {
            Err(SelfHealError::Exhausted { attempts, category, .. }) => {
                assert_eq!(attempts, 2);
                assert_eq!(category, ErrorCategory::ZeroDivision);
            }
            _ => panic!("expected Exhausted"),
        }
    }

    #[test]
    fn env_snapshot_is_capped() {
        let huge = "package-x==1.0\n".repeat(1000);
        let snap = capture_env_snapshot(&huge);
        assert!(snap.len() <= ENV_SNAPSHOT_CAP_BYTES + "...[truncated]".len() * 2);
    }
}
