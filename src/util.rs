//! Small cross-cutting helpers shared by components that otherwise have no
//! natural common parent module.

/// Truncate a string to at most `max_bytes` bytes, appending a marker when
/// truncation actually happened. Splits on a char boundary so multi-byte
/// UTF-8 sequences are never cut in half.
pub fn truncate_to(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...[truncated]", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_string_unchanged() {
        assert_eq!(truncate_to("hello", 100), "hello");
    }

    #[test]
    fn long_string_truncated_with_marker() {
        let s = "a".repeat(200);
        let out = truncate_to(&s, 10);
        assert!(out.starts_with(&"a".repeat(10)));
        assert!(out.ends_with("[truncated]"));
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let s = "héllo world".repeat(50);
        let out = truncate_to(&s, 7);
        assert!(String::from_utf8(out.clone().into_bytes()).is_ok());
        assert!(out.ends_with("[truncated]"));
    }
}
