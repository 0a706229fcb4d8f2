//! Span-tree tracing for a single request's decision trail.
//!
//! `TraceRecorder` is the product-facing record of what the [`crate::brain`]
//! and [`crate::swarm`] did for a given request: every provider call, tool
//! execution, approval, and self-healing attempt opens a [`Span`] on the
//! trace for that request. This is deliberately a different concern from
//! `tracing`'s operator-facing log lines — both are populated at the same
//! call sites but serve different readers.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::truncate_to;

/// Attribute values and event payloads are truncated to this many bytes.
const MAX_ATTR_BYTES: usize = 4 * 1024;
/// Attribute count per span is capped at this value; further inserts are dropped.
const MAX_ATTRS_PER_SPAN: usize = 32;
/// Oldest trace is evicted once the in-memory buffer exceeds this count.
const MAX_TRACES: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace not found: {0}")]
    TraceNotFound(String),
    #[error("span not found: {0}")]
    SpanNotFound(String),
    #[error("persistence error: {0}")]
    Persist(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The kind of operation a span represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Request,
    Retrieval,
    LlmCall,
    ToolExec,
    SelfHeal,
    Delegation,
    McpCall,
    Approval,
    Response,
}

/// Terminal or in-progress status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
    Timeout,
    Active,
}

/// Overall status of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Active,
    Completed,
    Error,
}

/// A single timestamped event appended to a span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

/// One node of a trace tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub span_id: String,
    pub trace_id: String,
    pub parent_span_id: Option<String>,
    pub kind: SpanKind,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SpanStatus,
    pub attributes: HashMap<String, String>,
    pub events: Vec<SpanEvent>,
}

impl Span {
    fn new(trace_id: &str, parent_span_id: Option<String>, kind: SpanKind, name: &str) -> Self {
        Self {
            span_id: uuid::Uuid::new_v4().to_string(),
            trace_id: trace_id.to_string(),
            parent_span_id,
            kind,
            name: name.to_string(),
            start_time: Utc::now(),
            end_time: None,
            status: SpanStatus::Active,
            attributes: HashMap::new(),
            events: Vec::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    fn set_attributes(&mut self, attributes: HashMap<String, String>) {
        for (k, v) in attributes {
            if self.attributes.len() >= MAX_ATTRS_PER_SPAN && !self.attributes.contains_key(&k) {
                continue;
            }
            self.attributes.insert(k, truncate_to(&v, MAX_ATTR_BYTES));
        }
    }
}

/// A tree of spans recorded for one user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_id: String,
    pub user_input: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TraceStatus,
    pub final_response: Option<String>,
    pub spans: Vec<Span>,

    /// Stack of currently-open span ids, most recent last. Not part of the
    /// persisted record's meaning — rebuilt from `spans` on load.
    #[serde(skip)]
    open_stack: Vec<String>,
}

impl Trace {
    fn rebuild_open_stack(&mut self) {
        self.open_stack = self
            .spans
            .iter()
            .filter(|s| s.is_open())
            .map(|s| s.span_id.clone())
            .collect();
    }

    fn find_span_mut(&mut self, span_id: &str) -> Option<&mut Span> {
        self.spans.iter_mut().find(|s| s.span_id == span_id)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}

/// Aggregate view over recorded traces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStats {
    pub avg_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub active_count: usize,
    pub error_count: usize,
}

/// Process-wide trace buffer. All state is passed in through the
/// constructor; nothing here is a hidden module-level global, so tests can
/// substitute a throwaway instance per case.
pub struct TraceRecorder {
    inner: Mutex<Inner>,
    persist_dir: Option<PathBuf>,
}

struct Inner {
    traces: HashMap<String, Trace>,
    order: VecDeque<String>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                traces: HashMap::new(),
                order: VecDeque::new(),
            }),
            persist_dir: None,
        }
    }

    /// Build a recorder that flushes completed traces to
    /// `<persist_dir>/<trace_id>.json` via an atomic rename.
    pub fn with_persistence(persist_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                traces: HashMap::new(),
                order: VecDeque::new(),
            }),
            persist_dir: Some(persist_dir.into()),
        }
    }

    /// Open a root span (kind=request) for a new trace.
    pub fn start_trace(&self, user_input: impl Into<String>) -> String {
        let user_input = user_input.into();
        let trace_id = uuid::Uuid::new_v4().to_string();
        let root = Span::new(&trace_id, None, SpanKind::Request, "request");
        let root_id = root.span_id.clone();

        let trace = Trace {
            trace_id: trace_id.clone(),
            user_input,
            start_time: root.start_time,
            end_time: None,
            status: TraceStatus::Active,
            final_response: None,
            spans: vec![root],
            open_stack: vec![root_id],
        };

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.order.push_back(trace_id.clone());
        inner.traces.insert(trace_id.clone(), trace);
        self.evict_if_needed(&mut inner);
        trace_id
    }

    /// Append a child span. `parent` defaults to the most recently opened,
    /// still-open span of the trace (usually the root).
    pub fn start_span(
        &self,
        trace_id: &str,
        kind: SpanKind,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, TraceError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let trace = inner
            .traces
            .get_mut(trace_id)
            .ok_or_else(|| TraceError::TraceNotFound(trace_id.to_string()))?;

        let parent_id = parent
            .map(str::to_string)
            .or_else(|| trace.open_stack.last().cloned());

        let span = Span::new(trace_id, parent_id, kind, name);
        let span_id = span.span_id.clone();
        trace.spans.push(span);
        trace.open_stack.push(span_id.clone());
        Ok(span_id)
    }

    /// Close a span. Idempotent: closing an already-closed span is a no-op.
    pub fn end_span(
        &self,
        trace_id: &str,
        span_id: &str,
        status: SpanStatus,
        attributes: HashMap<String, String>,
        events: Vec<(String, String)>,
    ) -> Result<(), TraceError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let trace = inner
            .traces
            .get_mut(trace_id)
            .ok_or_else(|| TraceError::TraceNotFound(trace_id.to_string()))?;

        let now = Utc::now();
        {
            let span = trace
                .find_span_mut(span_id)
                .ok_or_else(|| TraceError::SpanNotFound(span_id.to_string()))?;

            if !span.is_open() {
                return Ok(());
            }

            span.end_time = Some(now);
            span.status = status;
            span.set_attributes(attributes);
            for (name, payload) in events {
                span.events.push(SpanEvent {
                    name,
                    payload: truncate_to(&payload, MAX_ATTR_BYTES),
                    timestamp: now,
                });
            }
        }

        trace.open_stack.retain(|id| id != span_id);
        Ok(())
    }

    /// Append an event to a span without closing it.
    pub fn record_event(
        &self,
        trace_id: &str,
        span_id: &str,
        name: impl Into<String>,
        payload: impl Into<String>,
    ) -> Result<(), TraceError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let trace = inner
            .traces
            .get_mut(trace_id)
            .ok_or_else(|| TraceError::TraceNotFound(trace_id.to_string()))?;
        let span = trace
            .find_span_mut(span_id)
            .ok_or_else(|| TraceError::SpanNotFound(span_id.to_string()))?;

        span.events.push(SpanEvent {
            name: name.into(),
            payload: truncate_to(&payload.into(), MAX_ATTR_BYTES),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Close the trace: closes any spans still open as `status`, persists if
    /// configured, and evicts the oldest trace if the buffer overflows.
    pub fn end_trace(
        &self,
        trace_id: &str,
        final_response: impl Into<String>,
        status: TraceStatus,
    ) -> Result<(), TraceError> {
        let snapshot = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let trace = inner
                .traces
                .get_mut(trace_id)
                .ok_or_else(|| TraceError::TraceNotFound(trace_id.to_string()))?;

            let now = Utc::now();
            for span_id in std::mem::take(&mut trace.open_stack) {
                if let Some(span) = trace.find_span_mut(&span_id) {
                    if span.is_open() {
                        span.end_time = Some(now);
                        span.status = SpanStatus::Timeout;
                    }
                }
            }

            trace.end_time = Some(now);
            trace.status = status;
            trace.final_response = Some(final_response.into());
            trace.clone()
        };

        if let Some(dir) = &self.persist_dir {
            self.persist(dir, &snapshot)?;
        }

        Ok(())
    }

    /// Most recent `limit` traces, newest first.
    pub fn list(&self, limit: usize) -> Vec<Trace> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| inner.traces.get(id).cloned())
            .collect()
    }

    pub fn get(&self, trace_id: &str) -> Option<Trace> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.traces.get(trace_id).cloned()
    }

    /// Traces whose `user_input` or `final_response` contains `substring`.
    pub fn search(&self, substring: &str) -> Vec<Trace> {
        let needle = substring.to_lowercase();
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.traces.get(id))
            .filter(|t| {
                t.user_input.to_lowercase().contains(&needle)
                    || t.final_response
                        .as_deref()
                        .is_some_and(|r| r.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> TraceStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut durations: Vec<i64> = inner
            .traces
            .values()
            .filter_map(|t| t.duration_ms())
            .collect();
        durations.sort_unstable();

        let avg_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<i64>() as f64 / durations.len() as f64
        };

        let p95_duration_ms = if durations.is_empty() {
            0.0
        } else {
            let idx = ((durations.len() as f64) * 0.95).ceil() as usize;
            durations[idx.saturating_sub(1).min(durations.len() - 1)] as f64
        };

        let active_count = inner
            .traces
            .values()
            .filter(|t| t.status == TraceStatus::Active)
            .count();
        let error_count = inner
            .traces
            .values()
            .filter(|t| t.status == TraceStatus::Error)
            .count();

        TraceStats {
            avg_duration_ms,
            p95_duration_ms,
            active_count,
            error_count,
        }
    }

    fn evict_if_needed(&self, inner: &mut Inner) {
        while inner.order.len() > MAX_TRACES {
            if let Some(oldest) = inner.order.pop_front() {
                inner.traces.remove(&oldest);
            }
        }
    }

    fn persist(&self, dir: &Path, trace: &Trace) -> Result<(), TraceError> {
        std::fs::create_dir_all(dir)?;
        let final_path = dir.join(format!("{}.json", trace.trace_id));
        let tmp_path = dir.join(format!("{}.json.tmp", trace.trace_id));
        let body = serde_json::to_vec_pretty(trace)?;
        std::fs::write(&tmp_path, body)?;
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}
