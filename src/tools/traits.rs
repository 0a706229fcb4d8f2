use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The result of executing a [`Tool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Human-readable output (stdout, file contents, directory listing, etc.).
    pub output: String,
    /// Whether the tool considered the execution successful.
    pub success: bool,
    /// Optional structured metadata for machine consumption.
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
            metadata: None,
        }
    }

    pub fn err(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Why a [`Tool::execute`] call failed before producing a [`ToolResult`].
///
/// Distinguishes a policy-layer rejection (path/shell blocklist, denied
/// approval) from any other runtime failure, so the dispatcher can route the
/// two to different `error_kind`s (`policy_violation` vs `execution_error`).
#[derive(Debug, Clone)]
pub enum ToolError {
    /// The call was rejected by a [`crate::security::SecurityPolicy`] check
    /// (blocked path, sensitive prefix, shell blocklist) before execution
    /// began.
    PolicyViolation(String),
    /// Any other failure: missing argument, I/O error, malformed input.
    Other(String),
}

impl ToolError {
    pub fn message(&self) -> &str {
        match self {
            ToolError::PolicyViolation(m) => m,
            ToolError::Other(m) => m,
        }
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl From<String> for ToolError {
    fn from(message: String) -> Self {
        ToolError::Other(message)
    }
}

impl From<&str> for ToolError {
    fn from(message: &str) -> Self {
        ToolError::Other(message.to_string())
    }
}

/// A capability that the agent loop can invoke.
///
/// Implementations must be `Send + Sync` so they can be held in a shared
/// `Arc<dyn Tool>` registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable machine identifier (snake_case), e.g. `"shell"`.
    fn name(&self) -> &str;

    /// Human-readable description used in LLM `tool_use` payloads.
    fn description(&self) -> &str;

    /// JSON Schema object describing the tool's accepted parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments (validated against the schema
    /// by the caller when invoking from the agent loop).
    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError>;
}

/// Summary of a registered tool, suitable for inclusion in LLM API requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub schema: Value,
}
