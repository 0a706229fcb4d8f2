pub mod ai;
pub mod approval;
pub mod brain;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod security;
pub mod self_heal;
pub mod swarm;
pub mod tools;
pub mod trace;
pub mod util;

/// Convenience re-exports for the most commonly used traits and types across
/// the gateway.
///
/// ```rust
/// use local_ts_lib::prelude::*;
/// ```
pub mod prelude {
    // AI provider trait and router
    pub use crate::ai::provider::LLMProvider;
    pub use crate::ai::providers::{CostTier, ModelRouter, ModelTarget, ProviderRouter, TaskType};
    pub use crate::ai::types::{CompletionRequest, CompletionResponse, Message, MessageRole};

    // Tool system
    pub use crate::tools::{Tool, ToolExecutor, ToolRegistry, ToolResult};

    // Security
    pub use crate::security::{AutonomyLevel, SecurityPolicy, ValidationResult};

    // Event bus
    pub use crate::event_bus::{AppEvent, EventBus, TokioBroadcastBus};

    // Configuration
    pub use crate::config::{load_default_config, AppConfig};

    // Brain: single-turn orchestrator
    pub use crate::brain::{Brain, BrainProfile, Observer, Session, ToolAccess};

    // Swarm: bounded multi-agent loop
    pub use crate::swarm::{AgentProfile, SwarmOrchestrator, SwarmRun, SwarmStatus};

    // Approval broker
    pub use crate::approval::{ApprovalBroker, Decision, SafetyLevel};

    // Trace recorder
    pub use crate::trace::{Span, Trace, TraceRecorder};

    // Self-healing executor
    pub use crate::self_heal::{ErrorCategory, SelfHealingExecutor};

    // Crate-wide error taxonomy
    pub use crate::error::GatewayError;
}
