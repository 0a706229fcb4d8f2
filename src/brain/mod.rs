//! Single-turn model orchestrator.
//!
//! `Brain` is the thing that actually talks to a model: given a [`Session`]'s
//! history and a [`BrainProfile`] scoping which tools it may call, it drives
//! up to `max_tool_rounds` provider calls, dispatching any `tool_use` blocks
//! through [`crate::tools::ToolExecutor`] and streaming the final answer to
//! an [`Observer`]. [`crate::swarm::SwarmOrchestrator`] drives this same type
//! through the [`BrainPhaseRunner`] adapter, one `Brain` call per phase.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ai::providers::health::ProviderRouter;
use crate::ai::types::{CompletionRequest, Message, MessageRole, ToolSchema};
use crate::error::GatewayError;
use crate::event_bus::{AppEvent, EventBus};
use crate::swarm::{AgentProfile, PhaseRunner, SandboxAccess};
use crate::tools::{ToolExecutor, ToolProfile, ToolRegistry};
use crate::trace::{SpanKind, SpanStatus, TraceRecorder, TraceStatus};

/// Chunk size (bytes) used to synthesize streaming output from a non-streamed
/// provider response; replayable later from the `response` span's events.
const STREAM_CHUNK_BYTES: usize = 64;

// ─── Session ────────────────────────────────────────────────────────────────

struct SessionState {
    messages: VecDeque<Message>,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

/// A bounded, single-in-flight-turn conversation.
///
/// History is FIFO-evicted once it exceeds `max_messages`, preferring to keep
/// any leading system message. All mutation goes through `&self` methods
/// backed by an internal mutex, so a `Session` can be shared behind an `Arc`
/// without an outer lock.
pub struct Session {
    pub id: String,
    state: std::sync::Mutex<SessionState>,
    busy: AtomicBool,
    max_messages: usize,
}

impl Session {
    pub fn new(max_messages: usize) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), max_messages)
    }

    pub fn with_id(id: impl Into<String>, max_messages: usize) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state: std::sync::Mutex::new(SessionState {
                messages: VecDeque::new(),
                created_at: now,
                last_active: now,
            }),
            busy: AtomicBool::new(false),
            max_messages: max_messages.max(1),
        }
    }

    /// Attempt to claim the session for a new turn. Returns `false` if a turn
    /// is already in flight (at most one in-flight turn per session).
    pub fn try_begin_turn(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_turn(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).created_at
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).last_active
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, message: Message) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.messages.push_back(message);
        state.last_active = Utc::now();

        while state.messages.len() > self.max_messages {
            let evict_at = state
                .messages
                .iter()
                .position(|m| m.role != MessageRole::System);
            match evict_at {
                Some(idx) => {
                    state.messages.remove(idx);
                }
                None => break,
            }
        }
    }

    /// A snapshot of the current history, suitable for one provider call.
    fn snapshot(&self) -> Vec<Message> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .messages
            .iter()
            .cloned()
            .collect()
    }
}

// ─── Observer ───────────────────────────────────────────────────────────────

/// Receiver of a Brain turn's `{start, chunk+, end}` stream.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn start(&self, trace_id: &str);
    async fn chunk(&self, trace_id: &str, content: &str);
    async fn end(&self, trace_id: &str);
}

/// An observer that discards everything; used where streaming output has no
/// interested listener (e.g. a swarm phase's internal turn).
pub struct NullObserver;

#[async_trait]
impl Observer for NullObserver {
    async fn start(&self, _trace_id: &str) {}
    async fn chunk(&self, _trace_id: &str, _content: &str) {}
    async fn end(&self, _trace_id: &str) {}
}

/// Forwards a turn's stream onto the application [`EventBus`] as
/// `BrainTurnStart`/`BrainTurnChunk`/`BrainTurnEnd` events for a given
/// session, for UI or channel consumers.
pub struct EventBusObserver {
    events: Arc<dyn EventBus>,
    session_id: String,
}

impl EventBusObserver {
    pub fn new(events: Arc<dyn EventBus>, session_id: impl Into<String>) -> Self {
        Self {
            events,
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl Observer for EventBusObserver {
    async fn start(&self, trace_id: &str) {
        let _ = self.events.publish(AppEvent::BrainTurnStart {
            session_id: self.session_id.clone(),
            trace_id: trace_id.to_string(),
        });
    }

    async fn chunk(&self, _trace_id: &str, content: &str) {
        let _ = self.events.publish(AppEvent::BrainTurnChunk {
            session_id: self.session_id.clone(),
            content: content.to_string(),
        });
    }

    async fn end(&self, _trace_id: &str) {
        let _ = self.events.publish(AppEvent::BrainTurnEnd {
            session_id: self.session_id.clone(),
        });
    }
}

// ─── BrainProfile ───────────────────────────────────────────────────────────

/// Which tools a Brain turn may present to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolAccess {
    Full,
    Scoped(ToolProfile),
    None,
}

/// A role's system prompt plus its tool scope, for one Brain turn.
#[derive(Debug, Clone)]
pub struct BrainProfile {
    pub system_prompt: String,
    pub tool_access: ToolAccess,
}

impl BrainProfile {
    /// A plain chat profile with unrestricted tool access.
    pub fn unrestricted(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            tool_access: ToolAccess::Full,
        }
    }

    /// Derive a profile from a swarm role, mapping its sandbox access onto
    /// the matching [`ToolProfile`] (coder/tester get read-write, reviewer/
    /// security get read-only, the rest get no tools at all).
    pub fn from_swarm_profile(profile: AgentProfile) -> Self {
        let tool_access = match profile.sandbox_access() {
            SandboxAccess::ReadWrite => ToolAccess::Scoped(ToolProfile::Coding),
            SandboxAccess::ReadOnly => ToolAccess::Scoped(ToolProfile::Minimal),
            SandboxAccess::None => ToolAccess::None,
        };
        Self {
            system_prompt: profile.system_prompt().to_string(),
            tool_access,
        }
    }
}

// ─── Brain ──────────────────────────────────────────────────────────────────

/// Split `text` into UTF-8-safe chunks of roughly `chunk_bytes` bytes, for
/// synthesizing a stream out of a provider response that arrived whole.
fn chunk_text(text: &str, chunk_bytes: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + chunk_bytes).min(text.len());
        while end < text.len() && !text.is_char_boundary(end) {
            end += 1;
        }
        chunks.push(text[start..end].to_string());
        start = end;
    }
    chunks
}

fn cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Acquire))
}

/// Single-turn orchestrator: one model-driven answer, with as many tool
/// round-trips along the way as `max_tool_rounds` allows.
pub struct Brain {
    router: Arc<ProviderRouter>,
    registry: Arc<ToolRegistry>,
    executor: Arc<ToolExecutor>,
    trace: Arc<TraceRecorder>,
    model: String,
    max_tool_rounds: usize,
}

impl Brain {
    pub fn new(
        router: Arc<ProviderRouter>,
        registry: Arc<ToolRegistry>,
        executor: Arc<ToolExecutor>,
        trace: Arc<TraceRecorder>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            router,
            registry,
            executor,
            trace,
            model: model.into(),
            max_tool_rounds: 8,
        }
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds.max(1);
        self
    }

    fn tool_schemas(&self, access: ToolAccess) -> Vec<ToolSchema> {
        let infos = match access {
            ToolAccess::None => return Vec::new(),
            ToolAccess::Full => self.registry.list(),
            ToolAccess::Scoped(profile) => self.registry.list_filtered(profile),
        };
        infos
            .into_iter()
            .map(|info| ToolSchema {
                name: info.name,
                description: info.description,
                parameters: info.schema,
            })
            .collect()
    }

    /// Run one turn: appends `user_input` to `session`, drives the provider/
    /// tool round-trip loop, and returns the final text answer.
    ///
    /// Fails fast with [`GatewayError::ResourceExhausted`] if `session`
    /// already has a turn in flight — the caller is expected to have checked
    /// [`Session::try_begin_turn`] semantics itself when queuing concurrent
    /// requests, but `turn` enforces it regardless.
    #[tracing::instrument(skip(self, session, profile, user_input, observer, cancel), fields(session_id = %session.id))]
    pub async fn turn(
        &self,
        session: &Session,
        profile: &BrainProfile,
        user_input: String,
        observer: &dyn Observer,
        cancel: Option<&AtomicBool>,
    ) -> Result<String, GatewayError> {
        if !session.try_begin_turn() {
            return Err(GatewayError::ResourceExhausted(
                "a turn is already in flight for this session".to_string(),
            ));
        }

        let result = self.execute_rounds(session, profile, user_input, observer, cancel).await;
        session.end_turn();
        result
    }

    async fn execute_rounds(
        &self,
        session: &Session,
        profile: &BrainProfile,
        user_input: String,
        observer: &dyn Observer,
        cancel: Option<&AtomicBool>,
    ) -> Result<String, GatewayError> {
        if session.is_empty() {
            session.push(Message::system(profile.system_prompt.clone()));
        }
        session.push(Message::user(user_input.clone()));

        let trace_id = self.trace.start_trace(user_input);
        observer.start(&trace_id).await;

        let schemas = self.tool_schemas(profile.tool_access);
        let mut final_text: Option<String> = None;

        for round in 1..=self.max_tool_rounds {
            if cancelled(cancel) {
                let _ = self.trace.end_trace(&trace_id, "", TraceStatus::Error);
                observer.end(&trace_id).await;
                return Err(GatewayError::DeadlineExceeded);
            }

            // The last round in the cap always runs with tools disabled, so
            // every turn terminates in at most max_tool_rounds calls.
            let tools_enabled = !matches!(profile.tool_access, ToolAccess::None)
                && round < self.max_tool_rounds
                && !schemas.is_empty();

            let mut request = CompletionRequest::new(self.model.clone(), session.snapshot());
            if tools_enabled {
                request = request.with_tools(schemas.clone());
            }

            let span_id = self
                .trace
                .start_span(&trace_id, SpanKind::LlmCall, "llm_call", None)
                .ok();

            let response = match self.router.route_complete(request).await {
                Ok((endpoint_id, response)) => {
                    if let Some(span_id) = &span_id {
                        let mut attrs = HashMap::new();
                        attrs.insert("endpoint".to_string(), endpoint_id);
                        attrs.insert("round".to_string(), round.to_string());
                        let _ = self.trace.end_span(&trace_id, span_id, SpanStatus::Ok, attrs, vec![]);
                    }
                    response
                }
                Err(err) => {
                    if let Some(span_id) = &span_id {
                        let mut attrs = HashMap::new();
                        attrs.insert("round".to_string(), round.to_string());
                        let _ = self
                            .trace
                            .end_span(&trace_id, span_id, SpanStatus::Error, attrs, vec![]);
                    }
                    let _ = self.trace.end_trace(&trace_id, "", TraceStatus::Error);
                    observer.end(&trace_id).await;
                    return Err(err.into());
                }
            };

            let tool_calls = response
                .tool_use
                .clone()
                .filter(|calls| !calls.is_empty() && tools_enabled);

            match tool_calls {
                Some(calls) => {
                    session.push(Message::assistant_with_tool_use(response.content.clone(), calls.clone()));
                    // Tool calls dispatch sequentially, preserving order.
                    for call in calls {
                        let outcome = self
                            .executor
                            .execute(&trace_id, span_id.as_deref(), &call.name, call.arguments.clone())
                            .await;
                        session.push(Message::tool_result_with_status(
                            call.id.clone(),
                            outcome.output,
                            outcome.ok,
                        ));
                    }
                }
                None => {
                    session.push(Message::assistant(response.content.clone()));
                    final_text = Some(response.content);
                    break;
                }
            }
        }

        let final_text = final_text.unwrap_or_default();

        let response_span = self
            .trace
            .start_span(&trace_id, SpanKind::Response, "response", None)
            .ok();
        for chunk in chunk_text(&final_text, STREAM_CHUNK_BYTES) {
            observer.chunk(&trace_id, &chunk).await;
            if let Some(span_id) = &response_span {
                let _ = self.trace.record_event(&trace_id, span_id, "chunk", chunk);
            }
        }
        if let Some(span_id) = &response_span {
            let _ = self
                .trace
                .end_span(&trace_id, span_id, SpanStatus::Ok, HashMap::new(), vec![]);
        }

        let _ = self.trace.end_trace(&trace_id, final_text.clone(), TraceStatus::Completed);
        observer.end(&trace_id).await;

        Ok(final_text)
    }
}

// ─── BrainPhaseRunner ───────────────────────────────────────────────────────

/// Adapts a [`Brain`] to [`crate::swarm::PhaseRunner`]: each phase call gets
/// its own scratch [`Session`] seeded with the messages the orchestrator
/// built for that role, since swarm phases don't share conversational state
/// across roles the way a chat session does.
pub struct BrainPhaseRunner {
    brain: Arc<Brain>,
    session_max_messages: usize,
}

impl BrainPhaseRunner {
    pub fn new(brain: Arc<Brain>, session_max_messages: usize) -> Self {
        Self {
            brain,
            session_max_messages,
        }
    }
}

#[async_trait]
impl PhaseRunner for BrainPhaseRunner {
    async fn run_phase(&self, profile: AgentProfile, messages: Vec<Message>) -> Result<String, String> {
        let brain_profile = BrainProfile::from_swarm_profile(profile);
        let user_input = messages
            .into_iter()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content)
            .unwrap_or_default();

        let session = Session::new(self.session_max_messages);
        self.brain
            .turn(&session, &brain_profile, user_input, &NullObserver, None)
            .await
            .map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalBroker;
    use crate::ai::provider::{LLMProvider, Result as ProviderResult, StreamResponse};
    use crate::ai::providers::health::{ProviderEndpointConfig, ProviderKind};
    use crate::ai::types::{CompletionResponse, ToolUseBlock};
    use crate::tools::traits::ToolResult;
    use crate::tools::Tool;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// A provider that replays a fixed script of responses, one per call.
    struct ScriptedProvider {
        responses: std::sync::Mutex<VecDeque<CompletionResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<CompletionResponse>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::Acquire)
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn complete(&self, _request: CompletionRequest) -> ProviderResult<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::AcqRel);
            let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
            responses
                .pop_front()
                .ok_or_else(|| "scripted provider exhausted".to_string())
        }

        async fn stream(&self, _request: CompletionRequest) -> ProviderResult<StreamResponse> {
            Err("not supported in tests".to_string())
        }

        fn context_limit(&self) -> usize {
            8192
        }

        fn supports_tools(&self) -> bool {
            true
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    fn text_response(content: &str) -> CompletionResponse {
        CompletionResponse {
            content: content.to_string(),
            tool_use: None,
            model: "test-model".to_string(),
            usage: None,
            finish_reason: Some("stop".to_string()),
        }
    }

    fn tool_use_response(content: &str, id: &str, tool: &str, args: serde_json::Value) -> CompletionResponse {
        CompletionResponse {
            content: content.to_string(),
            tool_use: Some(vec![ToolUseBlock {
                id: id.to_string(),
                name: tool.to_string(),
                arguments: args,
            }]),
            model: "test-model".to_string(),
            usage: None,
            finish_reason: Some("tool_use".to_string()),
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "get_echo"
        }

        fn description(&self) -> &str {
            "echoes its input back"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }

        async fn execute(
            &self,
            args: serde_json::Value,
        ) -> Result<ToolResult, crate::tools::traits::ToolError> {
            Ok(ToolResult::ok(args.to_string()))
        }
    }

    fn brain_with(responses: Vec<CompletionResponse>) -> (Arc<Brain>, Arc<ScriptedProvider>) {
        brain_with_rounds(responses, None)
    }

    fn brain_with_rounds(
        responses: Vec<CompletionResponse>,
        max_tool_rounds: Option<usize>,
    ) -> (Arc<Brain>, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(responses));
        let router = Arc::new(ProviderRouter::new(vec![ProviderEndpointConfig {
            id: "test".to_string(),
            kind: ProviderKind::Anthropic,
            base_priority: 100,
            provider: provider.clone(),
        }]));

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let registry = Arc::new(registry);

        let trace = Arc::new(TraceRecorder::new());
        let approvals = Arc::new(ApprovalBroker::new(true, Duration::from_millis(200)));
        let executor = Arc::new(ToolExecutor::new(registry.clone(), approvals, trace.clone()));

        let mut brain = Brain::new(router, registry, executor, trace, "test-model");
        if let Some(rounds) = max_tool_rounds {
            brain = brain.with_max_tool_rounds(rounds);
        }
        (Arc::new(brain), provider)
    }

    #[tokio::test]
    async fn single_turn_without_tool_calls_returns_text() {
        let (brain, provider) = brain_with(vec![text_response("hello there")]);
        let session = Session::new(200);
        let profile = BrainProfile::unrestricted("you are a helpful assistant");

        let answer = brain
            .turn(&session, &profile, "hi".to_string(), &NullObserver, None)
            .await
            .unwrap();

        assert_eq!(answer, "hello there");
        assert_eq!(provider.calls(), 1);
        // system + user + assistant
        assert_eq!(session.len(), 3);
    }

    #[tokio::test]
    async fn tool_round_trip_preserves_tool_use_id() {
        let (brain, _provider) = brain_with(vec![
            tool_use_response("", "call-1", "get_echo", json!({"x": 1})),
            text_response("done"),
        ]);
        let session = Session::new(200);
        let profile = BrainProfile::unrestricted("you can call tools");

        let answer = brain
            .turn(&session, &profile, "use the tool".to_string(), &NullObserver, None)
            .await
            .unwrap();

        assert_eq!(answer, "done");

        let snapshot = session.snapshot();
        let tool_result = snapshot
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .expect("tool result recorded");
        assert_eq!(tool_result.tool_call_id.as_deref(), Some("call-1"));
    }

    #[tokio::test]
    async fn max_tool_rounds_forces_final_disabled_tools_turn() {
        // Every response asks for another tool call; the loop must still
        // terminate at max_tool_rounds provider calls.
        let responses: Vec<CompletionResponse> = (0..5)
            .map(|i| tool_use_response("", &format!("call-{i}"), "get_echo", json!({"i": i})))
            .collect();
        let (brain, provider) = brain_with_rounds(responses, Some(3));
        let session = Session::new(200);
        let profile = BrainProfile::unrestricted("you can call tools");

        let answer = brain
            .turn(&session, &profile, "loop forever".to_string(), &NullObserver, None)
            .await
            .unwrap();

        // On round 3 tools are force-disabled, so the (still tool_use-shaped)
        // response is treated as the final text answer.
        assert_eq!(answer, "");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn concurrent_turn_on_busy_session_is_rejected() {
        let (brain, _provider) = brain_with(vec![text_response("ok")]);
        let session = Session::new(200);
        assert!(session.try_begin_turn());

        let profile = BrainProfile::unrestricted("hi");
        let err = brain
            .turn(&session, &profile, "hello".to_string(), &NullObserver, None)
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::ResourceExhausted(_)));
        session.end_turn();
    }

    #[tokio::test]
    async fn unregistered_tool_produces_synthetic_result_without_aborting_loop() {
        let (brain, _provider) = brain_with(vec![
            tool_use_response("", "call-1", "shell", json!({"command": "echo hi"})),
            text_response("handled the failure"),
        ]);
        let session = Session::new(200);
        let profile = BrainProfile::unrestricted("you can call tools");

        // `shell` isn't registered on this brain's registry, so it resolves
        // as an unknown-tool outcome rather than aborting the turn.
        let answer = brain
            .turn(&session, &profile, "run a command".to_string(), &NullObserver, None)
            .await
            .unwrap();

        assert_eq!(answer, "handled the failure");
    }

    #[tokio::test]
    async fn phase_runner_dispatches_to_brain_for_swarm_phase() {
        let (brain, _provider) = brain_with(vec![text_response("fn solve() {}")]);
        let runner = BrainPhaseRunner::new(brain, 200);

        let messages = vec![
            Message::system(AgentProfile::Coder.system_prompt()),
            Message::user("write a function"),
        ];
        let result = runner.run_phase(AgentProfile::Coder, messages).await.unwrap();
        assert_eq!(result, "fn solve() {}");
    }
}
