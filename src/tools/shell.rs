use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::process::Command;

use crate::security::{SecurityPolicy, ValidationResult};

use super::traits::{Tool, ToolError, ToolResult};

/// Default wall-clock budget for a shell invocation, applied when the
/// caller does not pass an explicit `timeout`.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Executes shell commands via `/bin/sh -c`, subject to the active
/// [`SecurityPolicy`].
pub struct ShellTool {
    policy: Arc<SecurityPolicy>,
}

impl ShellTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its stdout/stderr output. \
         Only safe, non-destructive commands are permitted by the active security policy."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute."
                },
                "working_dir": {
                    "type": "string",
                    "description": "Optional working directory for the command."
                },
                "timeout": {
                    "type": "integer",
                    "description": "Maximum seconds to let the command run before it is killed (default: 30).",
                    "minimum": 1
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'command'")?
            .to_string();

        let working_dir = args
            .get("working_dir")
            .and_then(Value::as_str)
            .map(str::to_string);

        let timeout_secs = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        // Security gate.
        let risk = self.policy.classify_command_risk(&command);
        let decision = self.policy.validate_command(&command);

        let decision_str = match &decision {
            ValidationResult::Allowed => "allowed",
            ValidationResult::NeedsApproval => "needs_approval",
            ValidationResult::Denied(_) => "denied",
        };
        self.policy
            .log_action(self.name(), args.clone(), risk, decision_str, None);

        match decision {
            ValidationResult::Allowed => {}
            ValidationResult::NeedsApproval => {
                return Err("command requires user approval before execution".into());
            }
            ValidationResult::Denied(reason) => {
                return Err(ToolError::PolicyViolation(format!("command denied: {reason}")));
            }
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&command);
        if let Some(dir) = &working_dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(inner) => inner.map_err(|e| format!("failed to spawn process: {e}"))?,
            Err(_) => {
                let meta = json!({ "exit_code": Value::Null, "duration_ms": duration_ms, "timed_out": true });
                return Ok(ToolResult::err(format!(
                    "command timed out after {timeout_secs}s"
                ))
                .with_metadata(meta));
            }
        };

        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
        let success = result.status.success();

        let output = if stderr.is_empty() {
            stdout
        } else if stdout.is_empty() {
            format!("STDERR: {stderr}")
        } else {
            format!("{stdout}\nSTDERR: {stderr}")
        };

        let meta = json!({
            "exit_code": result.status.code(),
            "duration_ms": duration_ms,
            "timed_out": false
        });
        if success {
            Ok(ToolResult::ok(output).with_metadata(meta))
        } else {
            Ok(ToolResult::err(output).with_metadata(meta))
        }
    }
}
