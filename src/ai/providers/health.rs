//! Health-tracked, latency-aware routing across LLM provider endpoints.
//!
//! Distinct from [`super::router::ModelRouter`] (which resolves aliases and
//! task types to a *preferred* target list): `ProviderRouter` takes that kind
//! of endpoint list and actually dispatches completions, tracking per-endpoint
//! health so a flaky or overloaded provider gets skipped for a while instead
//! of being retried forever.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::ai::provider::LLMProvider;
use crate::ai::types::{CompletionRequest, CompletionResponse};

#[derive(Debug, thiserror::Error)]
pub enum ProviderRouterError {
    #[error("no provider endpoint is currently available")]
    ProviderUnavailable,
}

/// Kind of backend an endpoint speaks to; mirrors the wire-contract family
/// used when translating requests/responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAiCompatible,
    Ollama,
}

/// Static configuration for one provider endpoint.
pub struct ProviderEndpointConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_priority: i64,
    pub provider: Arc<dyn LLMProvider>,
}

/// Default per-endpoint request budget, matching
/// [`crate::config::schema::SecurityConfig`]'s `rate_limit_per_minute`
/// default — the same "60 actions per minute" shape, applied here to
/// provider calls rather than tool calls.
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Per-endpoint token bucket limiting request volume independent of the
/// circuit breaker: a circuit trips on failure, a bucket caps volume even
/// when an endpoint is perfectly healthy.
struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: std::sync::Mutex<(f64, Instant)>,
}

impl TokenBucket {
    fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1) as f64;
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            state: std::sync::Mutex::new((capacity, Instant::now())),
        }
    }

    fn refill_locked(&self, guard: &mut (f64, Instant)) {
        let now = Instant::now();
        let elapsed = now.duration_since(guard.1).as_secs_f64();
        guard.0 = (guard.0 + elapsed * self.refill_per_sec).min(self.capacity);
        guard.1 = now;
    }

    /// Non-consuming check of whether a token is currently available.
    fn has_capacity(&self) -> bool {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refill_locked(&mut guard);
        guard.0 >= 1.0
    }

    /// Take one token if available. Returns `false` (and takes nothing) if
    /// the bucket is empty.
    fn try_acquire(&self) -> bool {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refill_locked(&mut guard);
        if guard.0 >= 1.0 {
            guard.0 -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Mutable health state for one endpoint, updated atomically so no
/// router-wide lock is needed to record a success or failure.
struct EndpointHealth {
    consecutive_failures: AtomicU32,
    last_latency_ms: AtomicU64,
    /// Millis since epoch at which the circuit reopens; 0 means closed.
    circuit_open_until_ms: AtomicI64,
}

impl EndpointHealth {
    fn new() -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            last_latency_ms: AtomicU64::new(0),
            circuit_open_until_ms: AtomicI64::new(0),
        }
    }

    fn circuit_open(&self) -> bool {
        let until = self.circuit_open_until_ms.load(Ordering::Acquire);
        until > Utc::now().timestamp_millis()
    }

    fn record_success(&self, latency_ms: u64) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.circuit_open_until_ms.store(0, Ordering::Release);
        // EWMA with alpha = 0.3, integer arithmetic.
        let prev = self.last_latency_ms.load(Ordering::Acquire);
        let updated = if prev == 0 {
            latency_ms
        } else {
            (prev * 7 + latency_ms * 3) / 10
        };
        self.last_latency_ms.store(updated, Ordering::Release);
    }

    fn record_failure(&self, base_backoff_ms: u64, cap_ms: u64) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        let exp = base_backoff_ms.saturating_mul(1u64 << failures.min(16));
        let backoff = exp.min(cap_ms);
        let jitter = (backoff / 10).max(1);
        let jittered = backoff + (rand_jitter() % jitter.max(1));
        let until = Utc::now().timestamp_millis() + jittered as i64;
        self.circuit_open_until_ms.store(until, Ordering::Release);
    }

    fn score(&self, base_priority: i64, alpha: f64, beta: f64) -> f64 {
        let latency = self.last_latency_ms.load(Ordering::Acquire) as f64;
        let failures = self.consecutive_failures.load(Ordering::Acquire) as f64;
        base_priority as f64 - alpha * latency - beta * failures
    }
}

/// Deterministic-enough jitter source without pulling in a `rand` dependency:
/// mixes the current instant's subsecond component.
fn rand_jitter() -> u64 {
    Instant::now().elapsed().subsec_nanos() as u64 ^ (std::process::id() as u64)
}

struct Endpoint {
    config: ProviderEndpointConfig,
    enabled: std::sync::atomic::AtomicBool,
    health: EndpointHealth,
    rate_limiter: TokenBucket,
}

/// Health-tracked, latency-aware LLM endpoint router.
///
/// All per-endpoint mutation is lock-free (atomics); the endpoint list
/// itself is fixed at construction time, so no router-wide lock is needed
/// for selection either.
pub struct ProviderRouter {
    endpoints: Vec<Endpoint>,
    alpha: f64,
    beta: f64,
    base_backoff_ms: u64,
    cap_backoff_ms: u64,
}

impl ProviderRouter {
    pub fn new(endpoints: Vec<ProviderEndpointConfig>) -> Self {
        Self::new_with_rate_limit(endpoints, DEFAULT_REQUESTS_PER_MINUTE)
    }

    /// Same as [`ProviderRouter::new`], but with an explicit per-endpoint
    /// request budget — wire this to `SecurityConfig::rate_limit_per_minute`
    /// (or a dedicated provider-level config field) when assembling the
    /// router from `GatewayConfig` instead of accepting the default.
    pub fn new_with_rate_limit(
        endpoints: Vec<ProviderEndpointConfig>,
        requests_per_minute: u32,
    ) -> Self {
        Self {
            endpoints: endpoints
                .into_iter()
                .map(|config| Endpoint {
                    config,
                    enabled: std::sync::atomic::AtomicBool::new(true),
                    health: EndpointHealth::new(),
                    rate_limiter: TokenBucket::new(requests_per_minute),
                })
                .collect(),
            alpha: 0.01,
            beta: 50.0,
            base_backoff_ms: 1000,
            cap_backoff_ms: 60_000,
        }
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) {
        if let Some(ep) = self.endpoints.iter().find(|e| e.config.id == id) {
            ep.enabled.store(enabled, Ordering::Release);
        }
    }

    pub fn consecutive_failures(&self, id: &str) -> Option<u32> {
        self.endpoints
            .iter()
            .find(|e| e.config.id == id)
            .map(|e| e.health.consecutive_failures.load(Ordering::Acquire))
    }

    pub fn circuit_open(&self, id: &str) -> Option<bool> {
        self.endpoints
            .iter()
            .find(|e| e.config.id == id)
            .map(|e| e.health.circuit_open())
    }

    /// Endpoints eligible for selection right now, ranked best-first.
    ///
    /// Checking `rate_limiter.has_capacity()` here is a non-consuming peek:
    /// tokens are only spent in [`ProviderRouter::route_complete`], at the
    /// moment an endpoint is actually attempted, so ranking an endpoint
    /// never drains a budget it ends up not using.
    fn ranked_candidates(&self) -> Vec<&Endpoint> {
        let mut candidates: Vec<&Endpoint> = self
            .endpoints
            .iter()
            .filter(|e| {
                e.enabled.load(Ordering::Acquire)
                    && !e.health.circuit_open()
                    && e.rate_limiter.has_capacity()
            })
            .collect();

        candidates.sort_by(|a, b| {
            let score_a = a.health.score(a.config.base_priority, self.alpha, self.beta);
            let score_b = b.health.score(b.config.base_priority, self.alpha, self.beta);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }

    /// Attempt a completion across ranked endpoints, recording health and
    /// failing over on transient error until one succeeds or all are spent.
    ///
    /// Returns the response together with the id of the endpoint that served
    /// it, so callers can attribute an `llm_call` span correctly.
    #[tracing::instrument(skip(self, request))]
    pub async fn route_complete(
        &self,
        request: CompletionRequest,
    ) -> Result<(String, CompletionResponse), ProviderRouterError> {
        let candidates = self.ranked_candidates();
        if candidates.is_empty() {
            return Err(ProviderRouterError::ProviderUnavailable);
        }

        for endpoint in candidates {
            if !endpoint.rate_limiter.try_acquire() {
                // Lost a race with another caller between the peek in
                // `ranked_candidates` and here; try the next endpoint
                // instead of failing the whole call.
                continue;
            }
            let started = Instant::now();
            match endpoint.config.provider.complete(request.clone()).await {
                Ok(response) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    endpoint.health.record_success(latency_ms);
                    return Ok((endpoint.config.id.clone(), response));
                }
                Err(err) => {
                    tracing::warn!(endpoint = %endpoint.config.id, error = %err, "provider call failed");
                    endpoint
                        .health
                        .record_failure(self.base_backoff_ms, self.cap_backoff_ms);
                }
            }
        }

        Err(ProviderRouterError::ProviderUnavailable)
    }
}
