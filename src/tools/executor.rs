//! Approval-gated, trace-recorded dispatch of [`Tool`] calls.
//!
//! `ToolExecutor` sits between [`crate::brain::Brain`]'s tool dispatch loop
//! and the bare [`ToolRegistry`]: every call is classified and gated by
//! [`ApprovalBroker`], wrapped in a `tool_exec` span, and always returns a
//! structured outcome — nothing this type does ever throws past its boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::approval::{ApprovalBroker, Decision, WaitOutcome};
use crate::trace::{SpanKind, SpanStatus, TraceRecorder};

use super::registry::ToolRegistry;

/// Outcome of [`ToolExecutor::execute`]; always returned, never an `Err`, so
/// callers can thread it straight back into a conversation as a tool result.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub ok: bool,
    pub error_kind: Option<String>,
    pub output: String,
    pub metadata: Option<serde_json::Value>,
}

impl ToolOutcome {
    fn denied(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_kind: Some("denied".to_string()),
            output: reason.into(),
            metadata: None,
        }
    }

    fn policy_violation(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_kind: Some("policy_violation".to_string()),
            output: reason.into(),
            metadata: None,
        }
    }

    fn execution_error(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_kind: Some("execution_error".to_string()),
            output: reason.into(),
            metadata: None,
        }
    }

    fn unknown_tool(name: &str) -> Self {
        Self {
            ok: false,
            error_kind: Some("unknown_tool".to_string()),
            output: format!("no tool registered under the name '{name}'"),
            metadata: None,
        }
    }
}

/// A short, stable digest of a tool call's arguments for span attributes —
/// identifies repeated/identical calls without echoing potentially sensitive
/// argument values into the trace.
fn arg_digest(args: &serde_json::Value) -> String {
    let canonical = serde_json::to_string(args).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..16].to_string()
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    approvals: Arc<ApprovalBroker>,
    trace: Arc<TraceRecorder>,
    approval_wait: Duration,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        approvals: Arc<ApprovalBroker>,
        trace: Arc<TraceRecorder>,
    ) -> Self {
        Self {
            registry,
            approvals,
            trace,
            approval_wait: Duration::from_secs(30),
        }
    }

    pub fn with_approval_wait(mut self, wait: Duration) -> Self {
        self.approval_wait = wait;
        self
    }

    /// Dispatch one tool call under `trace_id`, opening a `tool_exec` span
    /// parented at `parent_span` (normally the current `llm_call` span).
    #[tracing::instrument(skip(self, args), fields(tool_name))]
    pub async fn execute(
        &self,
        trace_id: &str,
        parent_span: Option<&str>,
        tool_name: &str,
        args: serde_json::Value,
    ) -> ToolOutcome {
        let span_id = self
            .trace
            .start_span(trace_id, SpanKind::ToolExec, tool_name, parent_span)
            .ok();
        let digest = arg_digest(&args);
        let started = Instant::now();

        let outcome = self.dispatch(tool_name, args).await;

        if let Some(span_id) = &span_id {
            let mut attrs = HashMap::new();
            attrs.insert("tool".to_string(), tool_name.to_string());
            attrs.insert("arg_digest".to_string(), digest);
            attrs.insert(
                "duration_ms".to_string(),
                started.elapsed().as_millis().to_string(),
            );
            attrs.insert(
                "outcome".to_string(),
                outcome.error_kind.clone().unwrap_or_else(|| "ok".to_string()),
            );
            let status = if outcome.ok { SpanStatus::Ok } else { SpanStatus::Error };
            let _ = self.trace.end_span(trace_id, span_id, status, attrs, vec![]);
        }

        outcome
    }

    async fn dispatch(&self, tool_name: &str, args: serde_json::Value) -> ToolOutcome {
        let Some(tool) = self.registry.get(tool_name) else {
            return ToolOutcome::unknown_tool(tool_name);
        };

        match self.approvals.check(tool_name, "builtin", &args) {
            Decision::DenyPolicy(reason) => return ToolOutcome::policy_violation(reason),
            Decision::AutoAllow => {}
            Decision::RequireApproval(req_id) => {
                match self.approvals.wait(&req_id, self.approval_wait).await {
                    WaitOutcome::Approved => {}
                    WaitOutcome::Denied => {
                        return ToolOutcome::denied(format!("approval {req_id} denied"));
                    }
                    WaitOutcome::Timeout => {
                        return ToolOutcome::denied(format!("approval {req_id} timed out"));
                    }
                }
            }
        }

        match tool.execute(args).await {
            Ok(result) => ToolOutcome {
                ok: result.success,
                error_kind: if result.success { None } else { Some("tool_error".to_string()) },
                output: result.output,
                metadata: result.metadata,
            },
            Err(super::traits::ToolError::PolicyViolation(reason)) => {
                ToolOutcome::policy_violation(reason)
            }
            Err(super::traits::ToolError::Other(message)) => ToolOutcome::execution_error(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{AutonomyLevel, SecurityPolicy};
    use crate::tools::{FileReadTool, FileWriteTool, ShellTool};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn full_policy() -> Arc<SecurityPolicy> {
        Arc::new(SecurityPolicy::new(AutonomyLevel::Full, None, vec![], 3600, 100))
    }

    fn executor(auto_approve_safe: bool) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ShellTool::new(full_policy())));
        registry.register(Arc::new(FileReadTool::new(full_policy())));
        registry.register(Arc::new(FileWriteTool::new(full_policy())));

        ToolExecutor::new(
            Arc::new(registry),
            Arc::new(ApprovalBroker::new(auto_approve_safe, Duration::from_millis(200))),
            Arc::new(TraceRecorder::new()),
        )
    }

    #[tokio::test]
    async fn unknown_tool_returns_structured_error() {
        let exec = executor(true);
        let trace = TraceRecorder::new();
        let trace_id = trace.start_trace("t");
        let out = exec.execute(&trace_id, None, "nonexistent", json!({})).await;
        assert!(!out.ok);
        assert_eq!(out.error_kind.as_deref(), Some("unknown_tool"));
    }

    #[tokio::test]
    async fn safe_tool_auto_allowed_and_runs() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "hello").unwrap();

        let exec = executor(true);
        let out = exec
            .execute("t1", None, "read_file", json!({"path": file.display().to_string()}))
            .await;
        assert!(out.ok);
        assert!(out.output.contains("hello"));
    }

    #[tokio::test]
    async fn sensitive_tool_denied_on_approval_timeout() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("b.txt");

        let exec = executor(true);
        let out = exec
            .execute(
                "t2",
                None,
                "write_file",
                json!({"path": file.display().to_string(), "content": "x"}),
            )
            .await;
        assert!(!out.ok);
        assert_eq!(out.error_kind.as_deref(), Some("denied"));
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn records_tool_exec_span_with_expected_attributes() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("c.txt");
        fs::write(&file, "data").unwrap();

        let registry = {
            let mut r = ToolRegistry::new();
            r.register(Arc::new(FileReadTool::new(full_policy())));
            Arc::new(r)
        };
        let approvals = Arc::new(ApprovalBroker::new(true, Duration::from_millis(200)));
        let trace = Arc::new(TraceRecorder::new());
        let exec = ToolExecutor::new(registry, approvals, trace.clone());

        let trace_id = trace.start_trace("t");
        let _ = exec
            .execute(&trace_id, None, "read_file", json!({"path": file.display().to_string()}))
            .await;

        let recorded = trace.get(&trace_id).unwrap();
        let span = recorded
            .spans
            .iter()
            .find(|s| s.name == "read_file")
            .expect("tool_exec span recorded");
        assert!(span.attributes.contains_key("arg_digest"));
        assert!(span.attributes.contains_key("duration_ms"));
        assert_eq!(span.attributes.get("outcome").map(String::as_str), Some("ok"));
    }

    #[tokio::test]
    async fn policy_blocked_path_reports_policy_violation_not_execution_error() {
        // `read_file` under a configured blocked directory is rejected by
        // `SecurityPolicy::validate_path` from inside the tool's own
        // `execute()`, not by the approval broker. Must still surface as
        // `policy_violation`, distinct from an ordinary I/O failure.
        let blocked_policy = Arc::new(SecurityPolicy::new(
            AutonomyLevel::Full,
            None,
            vec![std::path::PathBuf::from("/etc")],
            3600,
            100,
        ));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FileReadTool::new(blocked_policy)));

        let exec = ToolExecutor::new(
            Arc::new(registry),
            Arc::new(ApprovalBroker::new(true, Duration::from_millis(200))),
            Arc::new(TraceRecorder::new()),
        );

        let out = exec
            .execute("t4", None, "read_file", json!({"path": "/etc/passwd"}))
            .await;
        assert!(!out.ok);
        assert_eq!(out.error_kind.as_deref(), Some("policy_violation"));
    }

    #[tokio::test]
    async fn denied_tool_never_reaches_underlying_execution() {
        let exec = executor(true);
        exec.approvals.deny_tool("shell");
        let out = exec.execute("t3", None, "shell", json!({"command": "echo hi"})).await;
        assert!(!out.ok);
        assert_eq!(out.error_kind.as_deref(), Some("policy_violation"));
    }
}
