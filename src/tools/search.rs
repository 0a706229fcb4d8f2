//! Glob-based recursive file search.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use globset::Glob;
use serde_json::{Value, json};
use walkdir::WalkDir;

use crate::security::{RiskLevel, SecurityPolicy, ValidationResult};

use super::traits::{Tool, ToolError, ToolResult};

/// Maximum number of paths a single search returns, regardless of how many
/// more the glob actually matches.
const MAX_RESULTS: usize = 500;

pub struct SearchFilesTool {
    policy: Arc<SecurityPolicy>,
}

impl SearchFilesTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Recursively search a directory for files whose relative path matches a glob \
         pattern (e.g. `**/*.rs`). Returns at most 500 matches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "root": { "type": "string", "description": "Absolute path of the directory to search." },
                "glob": { "type": "string", "description": "Glob pattern matched against each file's path relative to root." }
            },
            "required": ["root", "glob"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let root = args
            .get("root")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .ok_or("missing required argument 'root'")?;

        let glob = args
            .get("glob")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'glob'")?
            .to_string();

        match self.policy.validate_path(&root) {
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

        let matcher = Glob::new(&glob)
            .map_err(|e| format!("invalid glob '{glob}': {e}"))?
            .compile_matcher();

        let root_clone = root.clone();
        let (matches, truncated) = tokio::task::spawn_blocking(move || {
            search_blocking(&root_clone, &matcher)
        })
        .await
        .map_err(|e| format!("blocking task panicked: {e}"))??;

        Ok(ToolResult::ok(matches.join("\n")).with_metadata(json!({
            "root": root.display().to_string(),
            "glob": glob,
            "count": matches.len(),
            "truncated": truncated
        })))
    }
}

fn search_blocking(
    root: &PathBuf,
    matcher: &globset::GlobMatcher,
) -> Result<(Vec<String>, bool), String> {
    let mut matches = Vec::new();
    let mut truncated = false;

    for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if matcher.is_match(relative) {
            if matches.len() >= MAX_RESULTS {
                truncated = true;
                break;
            }
            matches.push(entry.path().display().to_string());
        }
    }

    matches.sort();
    Ok((matches, truncated))
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
    async fn finds_matching_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("c.rs"), "").unwrap();

        let tool = SearchFilesTool::new(full_policy());
        let r = tool
            .execute(json!({"root": dir.path().display().to_string(), "glob": "**/*.rs"}))
            .await
            .unwrap();
        assert!(r.success);
        assert!(r.output.contains("a.rs"));
        assert!(r.output.contains("c.rs"));
        assert!(!r.output.contains("b.txt"));
        assert_eq!(r.metadata.unwrap()["count"], 2);
    }

    #[tokio::test]
    async fn no_matches_returns_empty_success() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();

        let tool = SearchFilesTool::new(full_policy());
        let r = tool
            .execute(json!({"root": dir.path().display().to_string(), "glob": "*.rs"}))
            .await
            .unwrap();
        assert!(r.success);
        assert_eq!(r.output, "");
        assert_eq!(r.metadata.unwrap()["count"], 0);
    }

    #[tokio::test]
    async fn results_are_bounded() {
        let dir = TempDir::new().unwrap();
        for i in 0..520 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "").unwrap();
        }

        let tool = SearchFilesTool::new(full_policy());
        let r = tool
            .execute(json!({"root": dir.path().display().to_string(), "glob": "*.txt"}))
            .await
            .unwrap();
        let meta = r.metadata.unwrap();
        assert_eq!(meta["count"], 500);
        assert_eq!(meta["truncated"], true);
    }

    #[tokio::test]
    async fn invalid_glob_errors() {
        let tool = SearchFilesTool::new(full_policy());
        let r = tool
            .execute(json!({"root": "/tmp", "glob": "["}))
            .await;
        assert!(r.is_err());
    }

    #[tokio::test]
    async fn blocked_root_errors() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().to_path_buf();
        let policy = Arc::new(SecurityPolicy::new(
            AutonomyLevel::Full,
            None,
            vec![blocked.clone()],
            60,
            100,
        ));

        let tool = SearchFilesTool::new(policy);
        let r = tool
            .execute(json!({"root": blocked.display().to_string(), "glob": "*"}))
            .await;
        assert!(r.is_err());
    }
}
