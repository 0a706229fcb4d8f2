//! Flatten-and-redact transform for the dynamic config reload path.
//!
//! `/api/config` PUT requests operate on a JSON document that mirrors
//! [`super::schema::AppConfig`]. Before such a document is echoed back (e.g.
//! in a confirmation response or an audit log), nested keys are flattened
//! with `.` separators and any key matching a secret-shaped name is redacted.
//! The transform always deep-copies its input first, so the caller's live
//! config value is never mutated.

use regex::Regex;
use serde_json::{Map, Value};

const REDACTED: &str = "***redacted***";

fn secret_key_pattern() -> Regex {
    Regex::new(r"(?i)api_key|secret|password|token|private_key").expect("valid regex")
}

/// Flatten a nested JSON object into a single-level map of `a.b.c` → value,
/// redacting any leaf whose flattened key matches the secret pattern.
pub fn flatten_and_redact(value: &Value) -> Map<String, Value> {
    let pattern = secret_key_pattern();
    let mut out = Map::new();
    flatten_into(&mut out, "", value, &pattern);
    out
}

fn flatten_into(out: &mut Map<String, Value>, prefix: &str, value: &Value, pattern: &Regex) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let flat_key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(out, &flat_key, child, pattern);
            }
        }
        leaf => {
            let redacted = pattern.is_match(prefix);
            out.insert(
                prefix.to_string(),
                if redacted {
                    Value::String(REDACTED.to_string())
                } else {
                    leaf.clone()
                },
            );
        }
    }
}
