//! Risk-gated approval of tool calls with time- and path-scoped trust grants.
//!
//! `ApprovalBroker` sits between the [`crate::brain`]'s tool dispatch and
//! [`crate::tools`] execution: every call is classified into a safety level,
//! auto-allowed, satisfied by an existing trust grant, or turned into a
//! pending request that an external UI resolves. All state lives behind one
//! mutex, kept deliberately coarse; `wait` uses a per-request
//! signal rather than polling.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// How risky a tool invocation is judged to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Safe,
    Sensitive,
    Critical,
}

/// Lifecycle state of an [`ApprovalRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Pending,
    Approved,
    Denied,
    Timeout,
}

/// Outcome of a [`ApprovalBroker::check`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    AutoAllow,
    RequireApproval(String),
    DenyPolicy(String),
}

/// Outcome of a [`ApprovalBroker::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Approved,
    Denied,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub tool_name: String,
    pub server_name: String,
    /// Arguments as they should be shown to a human — callers are expected
    /// to redact secrets before passing them in.
    pub arguments: serde_json::Value,
    pub resource_path: Option<String>,
    pub safety_level: SafetyLevel,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub state: ApprovalState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrustGrant {
    pub tool_name: String,
    pub server_name: String,
    /// `None` means a tool-global grant; `Some(p)` matches any effective
    /// path starting with `p` (an exact-file grant is simply a prefix equal
    /// to that file's own canonical path).
    pub path_prefix: Option<String>,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TrustGrant {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    fn matches(&self, tool_name: &str, server_name: &str, effective_path: Option<&str>) -> bool {
        if self.tool_name != tool_name || self.server_name != server_name {
            return false;
        }
        match (&self.path_prefix, effective_path) {
            (None, _) => true,
            // Component-wise comparison, not raw string `starts_with`: a
            // grant scoped to `/workspace/proj/a.txt` must not also match
            // `/workspace/proj/a.txt.bak` just because one string is a
            // textual prefix of the other. `Path::starts_with` compares
            // whole path components, so `a.txt` and `a.txt.bak` never
            // collide, and a directory prefix like `/workspace/proj/`
            // still matches every path beneath it.
            (Some(prefix), Some(path)) => {
                std::path::Path::new(path).starts_with(std::path::Path::new(prefix.as_str()))
            }
            (Some(_), None) => false,
        }
    }
}

/// Observer event emitted when a new approval is pending, for the UI layer.
#[derive(Debug, Clone)]
pub struct ApprovalNeededEvent {
    pub request: ApprovalRequest,
}

struct RequestSlot {
    request: ApprovalRequest,
    signal: std::sync::Arc<Notify>,
}

struct BrokerState {
    requests: HashMap<String, RequestSlot>,
    trust_grants: Vec<TrustGrant>,
    safety_overrides: HashMap<String, SafetyLevel>,
    denied_tools: std::collections::HashSet<String>,
}

/// Classify a tool name by its default prefix rule.
/// `get_/list_/read_/search_` → safe; `create_/write_/update_/send_` →
/// sensitive; `delete_/destroy_/drop_/kill_` → critical; unknown → sensitive.
pub fn classify_by_prefix(tool_name: &str) -> SafetyLevel {
    const SAFE_PREFIXES: &[&str] = &["get_", "list_", "read_", "search_"];
    const SENSITIVE_PREFIXES: &[&str] = &["create_", "write_", "update_", "send_"];
    const CRITICAL_PREFIXES: &[&str] = &["delete_", "destroy_", "drop_", "kill_"];

    if SAFE_PREFIXES.iter().any(|p| tool_name.starts_with(p)) {
        SafetyLevel::Safe
    } else if SENSITIVE_PREFIXES.iter().any(|p| tool_name.starts_with(p)) {
        SafetyLevel::Sensitive
    } else if CRITICAL_PREFIXES.iter().any(|p| tool_name.starts_with(p)) {
        SafetyLevel::Critical
    } else {
        SafetyLevel::Sensitive
    }
}

/// Pull a canonicalized effective path out of a tool call's arguments, if any
/// argument named `path` or `file_path` is present.
fn effective_path(args: &serde_json::Value) -> Option<String> {
    let raw = args
        .get("path")
        .or_else(|| args.get("file_path"))
        .and_then(|v| v.as_str())?;

    let path = std::path::Path::new(raw);
    let canonical = path
        .canonicalize()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| raw.to_string());
    Some(canonical)
}

pub struct ApprovalBroker {
    state: std::sync::Mutex<BrokerState>,
    auto_approve_safe: bool,
    default_timeout: Duration,
}

impl ApprovalBroker {
    pub fn new(auto_approve_safe: bool, default_timeout: Duration) -> Self {
        Self {
            state: std::sync::Mutex::new(BrokerState {
                requests: HashMap::new(),
                trust_grants: Vec::new(),
                safety_overrides: HashMap::new(),
                denied_tools: std::collections::HashSet::new(),
            }),
            auto_approve_safe,
            default_timeout,
        }
    }

    /// Register an explicit tool_name → safety_level override, taking
    /// precedence over the default prefix rule.
    pub fn set_safety_override(&self, tool_name: impl Into<String>, level: SafetyLevel) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.safety_overrides.insert(tool_name.into(), level);
    }

    /// Mark a tool as always denied regardless of trust grants.
    pub fn deny_tool(&self, tool_name: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.denied_tools.insert(tool_name.into());
    }

    fn classify(&self, state: &BrokerState, tool_name: &str) -> SafetyLevel {
        state
            .safety_overrides
            .get(tool_name)
            .copied()
            .unwrap_or_else(|| classify_by_prefix(tool_name))
    }

    /// Classify and decide whether a tool call may run immediately.
    #[tracing::instrument(skip(self, args), fields(tool_name, server_name))]
    pub fn check(
        &self,
        tool_name: &str,
        server_name: &str,
        args: &serde_json::Value,
    ) -> Decision {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.denied_tools.contains(tool_name) {
            return Decision::DenyPolicy(format!("tool '{tool_name}' is administratively denied"));
        }

        let level = self.classify(&state, tool_name);
        if level == SafetyLevel::Safe && self.auto_approve_safe {
            return Decision::AutoAllow;
        }

        let path = effective_path(args);
        let now = Utc::now();

        // GC expired grants lazily, then look for the first matching live grant.
        state.trust_grants.retain(|g| g.is_live(now));
        let trusted = state
            .trust_grants
            .iter()
            .any(|g| g.matches(tool_name, server_name, path.as_deref()));
        if trusted {
            return Decision::AutoAllow;
        }

        let request = ApprovalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.to_string(),
            server_name: server_name.to_string(),
            arguments: args.clone(),
            resource_path: path,
            safety_level: level,
            description: format!("{server_name}::{tool_name}"),
            created_at: now,
            deadline: now + chrono::Duration::from_std(self.default_timeout).unwrap_or_default(),
            state: ApprovalState::Pending,
        };
        let req_id = request.id.clone();
        state.requests.insert(
            req_id.clone(),
            RequestSlot {
                request,
                signal: std::sync::Arc::new(Notify::new()),
            },
        );

        Decision::RequireApproval(req_id)
    }

    /// Snapshot the pending request so the caller can emit an observer event.
    pub fn get_request(&self, req_id: &str) -> Option<ApprovalRequest> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.requests.get(req_id).map(|slot| slot.request.clone())
    }

    /// Resolve a pending request. Returns `false` if the request is unknown
    /// or already resolved (at-most-once: a second `resolve` is a no-op).
    pub fn resolve(&self, req_id: &str, approved: bool, trust_minutes: Option<i64>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.resolve_locked(&mut state, req_id, approved, trust_minutes)
    }

    fn resolve_locked(
        &self,
        state: &mut BrokerState,
        req_id: &str,
        approved: bool,
        trust_minutes: Option<i64>,
    ) -> bool {
        let Some(slot) = state.requests.get_mut(req_id) else {
            return false;
        };
        if slot.request.state != ApprovalState::Pending {
            return false;
        }

        slot.request.state = if approved {
            ApprovalState::Approved
        } else {
            ApprovalState::Denied
        };
        let signal = slot.signal.clone();

        if approved {
            if let Some(minutes) = trust_minutes {
                let grant = TrustGrant {
                    tool_name: slot.request.tool_name.clone(),
                    server_name: slot.request.server_name.clone(),
                    path_prefix: slot.request.resource_path.clone(),
                    granted_at: Utc::now(),
                    expires_at: Utc::now() + chrono::Duration::minutes(minutes),
                };
                state.trust_grants.push(grant);
            }
        }

        signal.notify_waiters();
        true
    }

    /// Resolve a batch of requests atomically per id; ids already timed out
    /// or otherwise non-pending are simply skipped (`false` in the result).
    pub fn batch_resolve(
        &self,
        req_ids: &[String],
        approved: bool,
        trust_minutes: Option<i64>,
    ) -> Vec<(String, bool)> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        req_ids
            .iter()
            .map(|id| {
                let ok = self.resolve_locked(&mut state, id, approved, trust_minutes);
                (id.clone(), ok)
            })
            .collect()
    }

    pub fn grant_trust(
        &self,
        tool_name: impl Into<String>,
        server_name: impl Into<String>,
        path_prefix: Option<String>,
        minutes: i64,
    ) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.trust_grants.push(TrustGrant {
            tool_name: tool_name.into(),
            server_name: server_name.into(),
            path_prefix,
            granted_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::minutes(minutes),
        });
    }

    pub fn revoke_trust(&self, tool_name: &str, server_name: &str, path_prefix: Option<&str>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.trust_grants.retain(|g| {
            !(g.tool_name == tool_name
                && g.server_name == server_name
                && g.path_prefix.as_deref() == path_prefix)
        });
    }

    pub fn list_trusted(&self) -> Vec<TrustGrant> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.trust_grants.retain(|g| g.is_live(now));
        state.trust_grants.clone()
    }

    /// Block (async) until `req_id` resolves or `timeout` (bounded by the
    /// request's own deadline, whichever is sooner) elapses.
    pub async fn wait(&self, req_id: &str, timeout: Duration) -> WaitOutcome {
        let (signal, deadline) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.requests.get(req_id) {
                Some(slot) => (slot.signal.clone(), slot.request.deadline),
                None => return WaitOutcome::Timeout,
            }
        };

        let requested_deadline = Utc::now() + chrono::Duration::from_std(timeout).unwrap_or_default();
        let effective_deadline = requested_deadline.min(deadline);

        loop {
            if let Some(outcome) = self.current_outcome(req_id) {
                return outcome;
            }

            let remaining = (effective_deadline - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                self.mark_timeout(req_id);
                return WaitOutcome::Timeout;
            }

            if tokio::time::timeout(remaining, signal.notified())
                .await
                .is_err()
            {
                self.mark_timeout(req_id);
                return WaitOutcome::Timeout;
            }
        }
    }

    fn current_outcome(&self, req_id: &str) -> Option<WaitOutcome> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.requests.get(req_id)?.request.state {
            ApprovalState::Approved => Some(WaitOutcome::Approved),
            ApprovalState::Denied => Some(WaitOutcome::Denied),
            ApprovalState::Timeout => Some(WaitOutcome::Timeout),
            ApprovalState::Pending => None,
        }
    }

    fn mark_timeout(&self, req_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = state.requests.get_mut(req_id) {
            if slot.request.state == ApprovalState::Pending {
                slot.request.state = ApprovalState::Timeout;
            }
        }
    }
}
