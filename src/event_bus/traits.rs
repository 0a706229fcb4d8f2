use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Outbound/inbound event frames exchanged with the UI layer over its
/// websocket. The wire transport itself is an external collaborator (out of
/// scope here); this enum is the shared vocabulary the core emits into, so
/// `ProviderRouter`/`Brain`/`ApprovalBroker`/`SwarmOrchestrator` can report
/// their internal state without depending on a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// Outbound: `{type:"start", session_id, trace_id}`.
    #[serde(rename = "start")]
    BrainTurnStart { session_id: String, trace_id: String },
    /// Outbound: `{type:"chunk", content}`.
    #[serde(rename = "chunk")]
    BrainTurnChunk { session_id: String, content: String },
    /// Outbound: `{type:"end"}`.
    #[serde(rename = "end")]
    BrainTurnEnd { session_id: String },

    /// Outbound: `{type:"approval_request", id, tool_name, server_name,
    /// description, safety_level, resource_path?, deadline}`.
    #[serde(rename = "approval_request")]
    ApprovalRequested {
        id: String,
        tool_name: String,
        server_name: String,
        description: String,
        safety_level: String,
        #[serde(default)]
        resource_path: Option<String>,
        deadline: String,
    },
    /// Outbound: `{type:"approval_resolved", id, approved}`.
    #[serde(rename = "approval_resolved")]
    ApprovalResolved { id: String, approved: bool },

    /// Outbound: `{type:"thinking_stream", text, agent?, new_turn?}`.
    ThinkingStream {
        text: String,
        #[serde(default)]
        agent: Option<String>,
        #[serde(default)]
        new_turn: bool,
    },
    /// Outbound: `{type:"agent_spawned", role}`.
    AgentSpawned { role: String },
    /// Outbound: `{type:"agent_completed", role}`.
    AgentCompleted { role: String },
    /// Outbound: `{type:"agent_failed", role}`.
    AgentFailed { role: String },

    /// Inbound: `{type:"human_hint", text}`, threaded into the next swarm
    /// coder iteration as an `[URGENT USER MESSAGE]` block.
    HumanHint { text: String },

    ProviderHealthChange { provider_id: String, healthy: bool },
    SystemError { message: String },
}

/// Selects which event variants a subscriber is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    BrainTurnStart,
    BrainTurnChunk,
    BrainTurnEnd,
    ApprovalRequested,
    ApprovalResolved,
    ThinkingStream,
    AgentSpawned,
    AgentCompleted,
    AgentFailed,
    HumanHint,
    ProviderHealthChange,
    SystemError,
    /// Matches every variant.
    All,
}

impl EventType {
    /// Returns true if this filter matches `event`.
    pub fn matches(&self, event: &AppEvent) -> bool {
        match self {
            Self::All => true,
            Self::BrainTurnStart => matches!(event, AppEvent::BrainTurnStart { .. }),
            Self::BrainTurnChunk => matches!(event, AppEvent::BrainTurnChunk { .. }),
            Self::BrainTurnEnd => matches!(event, AppEvent::BrainTurnEnd { .. }),
            Self::ApprovalRequested => matches!(event, AppEvent::ApprovalRequested { .. }),
            Self::ApprovalResolved => matches!(event, AppEvent::ApprovalResolved { .. }),
            Self::ThinkingStream => matches!(event, AppEvent::ThinkingStream { .. }),
            Self::AgentSpawned => matches!(event, AppEvent::AgentSpawned { .. }),
            Self::AgentCompleted => matches!(event, AppEvent::AgentCompleted { .. }),
            Self::AgentFailed => matches!(event, AppEvent::AgentFailed { .. }),
            Self::HumanHint => matches!(event, AppEvent::HumanHint { .. }),
            Self::ProviderHealthChange => matches!(event, AppEvent::ProviderHealthChange { .. }),
            Self::SystemError => matches!(event, AppEvent::SystemError { .. }),
        }
    }
}

/// A set of event types used for filtering subscriptions.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub event_types: Vec<EventType>,
}

impl EventFilter {
    pub fn new(event_types: Vec<EventType>) -> Self {
        Self { event_types }
    }

    pub fn matches(&self, event: &AppEvent) -> bool {
        self.event_types.iter().any(|t| t.matches(event))
    }
}

/// Central pub/sub bus for application events.
///
/// All returned `Receiver`s receive every published event; callers are
/// responsible for filtering if they subscribed via [`subscribe_filtered`].
pub trait EventBus: Send + Sync {
    /// Publish an event to all active subscribers.
    fn publish(&self, event: AppEvent) -> Result<(), String>;

    /// Subscribe to all events.
    fn subscribe(&self) -> broadcast::Receiver<AppEvent>;

    /// Subscribe to events, pre-scoped to the given filter.
    ///
    /// The returned receiver still carries all events; the filter is provided
    /// as documentation / future optimisation surface.  Consumers should call
    /// [`EventFilter::matches`] to discard unwanted events.
    fn subscribe_filtered(&self, filter: EventFilter) -> broadcast::Receiver<AppEvent>;
}
