//! Crate-wide error taxonomy.
//!
//! Component-local errors (`ApprovalBroker`'s `Decision`, `ProviderRouterError`,
//! `SelfHealError`, `SwarmOrchestrator`'s `Result<_, String>`) stay local to
//! their modules — they're the shape a unit test wants to match on. This enum
//! is what crosses a component boundary to a caller that no longer cares
//! which component failed, only which *class* of failure happened.

use crate::ai::providers::health::ProviderRouterError;
use crate::self_heal::SelfHealError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no provider endpoint is currently available")]
    ProviderUnavailable,

    #[error("provider call failed transiently: {0}")]
    ProviderTransient(String),

    #[error("tool call denied: {0}")]
    ToolDenied(String),

    #[error("tool policy violation: {0}")]
    ToolPolicyViolation(String),

    #[error("tool execution failed: {0}")]
    ToolExecutionError(String),

    #[error("self-heal exhausted after {attempts} attempts ({category}): {message}")]
    SelfHealExhausted {
        attempts: usize,
        category: String,
        message: String,
    },

    #[error("swarm exhausted after {iterations} iterations: {feedback}")]
    SwarmExhausted { iterations: usize, feedback: String },

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ProviderRouterError> for GatewayError {
    fn from(_: ProviderRouterError) -> Self {
        GatewayError::ProviderUnavailable
    }
}

impl From<SelfHealError> for GatewayError {
    fn from(err: SelfHealError) -> Self {
        match err {
            SelfHealError::Exhausted {
                attempts,
                category,
                message,
            } => GatewayError::SelfHealExhausted {
                attempts,
                category: category.as_str().to_string(),
                message,
            },
            SelfHealError::Provider(msg) => GatewayError::ProviderTransient(msg),
        }
    }
}
