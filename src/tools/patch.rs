//! Apply search/replace edits to a file.
//!
//! Each edit names the exact text to find and what to replace it with. An
//! edit fails closed if its `search` string does not appear in the file
//! exactly once — ambiguous matches are an error, never a best-effort guess.
//! Edits are applied in order against the file's in-memory contents and the
//! result is written back atomically via a temp-file rename.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::security::{RiskLevel, SecurityPolicy, ValidationResult};

use super::traits::{Tool, ToolError, ToolResult};

/// A single `{search, replace}` edit.
#[derive(Debug, Clone, Deserialize)]
struct Edit {
    search: String,
    replace: String,
}

/// Applies a sequence of search/replace edits to a file.
pub struct PatchTool {
    policy: Arc<SecurityPolicy>,
}

impl PatchTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for PatchTool {
    fn name(&self) -> &str {
        "patch_file"
    }

    fn description(&self) -> &str {
        "Apply one or more search/replace edits to a file, in order. Each edit's \
         `search` text must match the file's current contents exactly once; an \
         edit that matches zero or more than one location fails the whole call \
         and leaves the file untouched."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute path to the file to patch."
                },
                "edits": {
                    "type": "array",
                    "description": "Edits to apply in order.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "search": { "type": "string", "description": "Exact text to find." },
                            "replace": { "type": "string", "description": "Replacement text." }
                        },
                        "required": ["search", "replace"]
                    }
                }
            },
            "required": ["path", "edits"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .ok_or("missing required argument 'path'")?;

        let edits: Vec<Edit> = args
            .get("edits")
            .cloned()
            .ok_or("missing required argument 'edits'")
            .and_then(|v| serde_json::from_value(v).map_err(|e| format!("invalid 'edits': {e}")))?;

        if edits.is_empty() {
            return Err("'edits' must contain at least one edit".into());
        }

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

        let path_clone = path.clone();
        let edits_count = edits.len();
        let result = tokio::task::spawn_blocking(move || apply_edits_blocking(&path_clone, &edits))
            .await
            .map_err(|e| format!("blocking task panicked: {e}"))?;

        match result {
            Ok(()) => Ok(ToolResult::ok(format!(
                "applied {edits_count} edit(s) to '{}'",
                path.display()
            ))
            .with_metadata(json!({
                "path": path.display().to_string(),
                "edits_applied": edits_count
            }))),
            Err(e) => Ok(ToolResult::err(e.clone()).with_metadata(json!({
                "path": path.display().to_string(),
                "error": e
            }))),
        }
    }
}

fn apply_edits_blocking(path: &PathBuf, edits: &[Edit]) -> Result<(), String> {
    let mut contents =
        std::fs::read_to_string(path).map_err(|e| format!("failed to read '{}': {e}", path.display()))?;

    for (i, edit) in edits.iter().enumerate() {
        let occurrences = contents.matches(edit.search.as_str()).count();
        match occurrences {
            0 => {
                return Err(format!(
                    "edit {}: search text not found in '{}'",
                    i, path.display()
                ));
            }
            1 => {
                contents = contents.replacen(&edit.search, &edit.replace, 1);
            }
            n => {
                return Err(format!(
                    "edit {}: search text is ambiguous ({} matches) in '{}'",
                    i, n, path.display()
                ));
            }
        }
    }

    let tmp_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("failed to write temp file for '{}': {e}", path.display()))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("failed to finalize write to '{}': {e}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::AutonomyLevel;
    use tempfile::TempDir;

    fn full_policy() -> Arc<SecurityPolicy> {
        Arc::new(SecurityPolicy::new(
            AutonomyLevel::Full,
            None,
            vec![],
            3600,
            100,
        ))
    }

    #[tokio::test]
    async fn single_edit_applies() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("test.txt");
        std::fs::write(&file, "hello world\n").unwrap();

        let tool = PatchTool::new(full_policy());
        let r = tool
            .execute(json!({
                "path": file.display().to_string(),
                "edits": [{"search": "world", "replace": "universe"}]
            }))
            .await
            .unwrap();
        assert!(r.success);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello universe\n");
    }

    #[tokio::test]
    async fn sequential_edits_apply_in_order() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("test.txt");
        std::fs::write(&file, "one two three\n").unwrap();

        let tool = PatchTool::new(full_policy());
        let r = tool
            .execute(json!({
                "path": file.display().to_string(),
                "edits": [
                    {"search": "one", "replace": "1"},
                    {"search": "three", "replace": "3"}
                ]
            }))
            .await
            .unwrap();
        assert!(r.success);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "1 two 3\n");
    }

    #[tokio::test]
    async fn no_match_fails_without_modifying_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("test.txt");
        std::fs::write(&file, "original\n").unwrap();

        let tool = PatchTool::new(full_policy());
        let r = tool
            .execute(json!({
                "path": file.display().to_string(),
                "edits": [{"search": "missing", "replace": "x"}]
            }))
            .await
            .unwrap();
        assert!(!r.success);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "original\n");
    }

    #[tokio::test]
    async fn ambiguous_match_fails_without_modifying_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("test.txt");
        std::fs::write(&file, "dup dup\n").unwrap();

        let tool = PatchTool::new(full_policy());
        let r = tool
            .execute(json!({
                "path": file.display().to_string(),
                "edits": [{"search": "dup", "replace": "x"}]
            }))
            .await
            .unwrap();
        assert!(!r.success);
        assert!(r.output.contains("ambiguous"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "dup dup\n");
    }

    #[tokio::test]
    async fn partial_failure_leaves_earlier_edits_uncommitted() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("test.txt");
        std::fs::write(&file, "alpha beta\n").unwrap();

        let tool = PatchTool::new(full_policy());
        let r = tool
            .execute(json!({
                "path": file.display().to_string(),
                "edits": [
                    {"search": "alpha", "replace": "ALPHA"},
                    {"search": "gamma", "replace": "GAMMA"}
                ]
            }))
            .await
            .unwrap();
        assert!(!r.success);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "alpha beta\n");
    }

    #[tokio::test]
    async fn missing_path_arg_errors() {
        let tool = PatchTool::new(full_policy());
        let r = tool.execute(json!({"edits": [{"search": "a", "replace": "b"}]})).await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn empty_edits_array_errors() {
        let tool = PatchTool::new(full_policy());
        let r = tool
            .execute(json!({"path": "/tmp/x", "edits": []}))
            .await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn blocked_path_errors() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().to_path_buf();
        let policy = Arc::new(SecurityPolicy::new(
            AutonomyLevel::Full,
            None,
            vec![blocked.clone()],
            60,
            100,
        ));
        let file = blocked.join("secret.txt");
        std::fs::write(&file, "secret").unwrap();

        let tool = PatchTool::new(policy);
        let r = tool
            .execute(json!({
                "path": file.display().to_string(),
                "edits": [{"search": "secret", "replace": "x"}]
            }))
            .await;
        assert!(r.is_err());
    }
}
