//! Constant identity strings this gateway presents to upstream providers.

/// Sent as the `HTTP-Referer` header on OpenRouter requests, per their
/// attribution requirements for app-identified traffic.
pub const OPENROUTER_HTTP_REFERER: &str = "https://cortexgate.dev";

/// Sent as the `X-Title` header on OpenRouter requests.
pub const OPENROUTER_TITLE: &str = "CortexGate";
