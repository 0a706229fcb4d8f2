use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::security::{RiskLevel, SecurityPolicy, ValidationResult};

use super::traits::{Tool, ToolError, ToolResult};

// ─── FileReadTool ────────────────────────────────────────────────────────────

pub struct FileReadTool {
    policy: Arc<SecurityPolicy>,
}

impl FileReadTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file, truncated to max_bytes (default 1 MiB)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute path to the file." },
                "max_bytes": {
                    "type": "integer",
                    "description": "Maximum number of bytes to return (default: 1048576).",
                    "minimum": 1
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let path = required_path(&args, "path")?;

        match self.policy.validate_path(&path) {
            ValidationResult::Allowed => {}
            ValidationResult::NeedsApproval => {
                return Err("path access requires user approval".into());
            }
            ValidationResult::Denied(reason) => {
                return Err(ToolError::PolicyViolation(format!("path denied: {reason}")));
            }
        }

        self.policy.log_action(
            self.name(),
            args.clone(),
            RiskLevel::Low,
            "allowed",
            None,
        );

        let max_bytes = args
            .get("max_bytes")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(1024 * 1024);

        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;

        let truncated = contents.len() > max_bytes;
        let output = crate::util::truncate_to(&contents, max_bytes);

        Ok(ToolResult::ok(output).with_metadata(json!({
            "path": path.display().to_string(),
            "truncated": truncated
        })))
    }
}

// ─── FileWriteTool ────────────────────────────────────────────────────────────

pub struct FileWriteTool {
    policy: Arc<SecurityPolicy>,
}

impl FileWriteTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it if it does not exist and overwriting it if it does."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path":    { "type": "string", "description": "Absolute path to write." },
                "content": { "type": "string", "description": "Content to write." }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let path = required_path(&args, "path")?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'content'")?
            .to_string();

        match self.policy.validate_path(&path) {
            ValidationResult::Allowed => {}
            ValidationResult::NeedsApproval => {
                return Err("path access requires user approval".into());
            }
            ValidationResult::Denied(reason) => {
                return Err(ToolError::PolicyViolation(format!("path denied: {reason}")));
            }
        }

        self.policy.log_action(
            self.name(),
            args.clone(),
            RiskLevel::Medium,
            "allowed",
            None,
        );

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create parent dirs: {e}"))?;
        }

        let bytes = content.len();
        fs::write(&path, &content)
            .map_err(|e| format!("failed to write '{}': {e}", path.display()))?;

        Ok(ToolResult::ok(format!(
            "wrote {} bytes to '{}'",
            bytes,
            path.display()
        ))
        .with_metadata(json!({ "path": path.display().to_string(), "bytes": bytes })))
    }
}

// ─── FileListTool ─────────────────────────────────────────────────────────────

pub struct FileListTool {
    policy: Arc<SecurityPolicy>,
}

impl FileListTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FileListTool {
    fn name(&self) -> &str {
        "file_list"
    }

    fn description(&self) -> &str {
        "List the contents of a directory, optionally recursively."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute path of the directory." },
                "recursive": {
                    "type": "boolean",
                    "description": "If true, list all files recursively (default: false)."
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let path = required_path(&args, "path")?;
        let recursive = args
            .get("recursive")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        match self.policy.validate_path(&path) {
            ValidationResult::Allowed => {}
            ValidationResult::NeedsApproval => {
                return Err("path access requires user approval".into());
            }
            ValidationResult::Denied(reason) => {
                return Err(ToolError::PolicyViolation(format!("path denied: {reason}")));
            }
        }

        self.policy.log_action(
            self.name(),
            args.clone(),
            RiskLevel::Low,
            "allowed",
            None,
        );

        let entries = collect_entries(&path, recursive)
            .map_err(|e| format!("failed to list '{}': {e}", path.display()))?;

        Ok(ToolResult::ok(entries.join("\n"))
            .with_metadata(json!({ "count": entries.len() })))
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn required_path(args: &Value, key: &str) -> Result<PathBuf, String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| format!("missing required argument '{key}'"))
}

fn collect_entries(dir: &Path, recursive: bool) -> std::io::Result<Vec<String>> {
    let mut result = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let display = path.display().to_string();
        result.push(display.clone());
        if recursive && path.is_dir() {
            let sub = collect_entries(&path, true)?;
            result.extend(sub);
        }
    }
    result.sort();
    Ok(result)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
