/// Truncate a string to at most `max` characters, appending "..." when cut.
pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// First `max` characters, without an ellipsis. Never splits a code point.
pub fn head_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Maximum length of a remote error body quoted in an error message
const MAX_ERROR_BODY_LEN: usize = 200;

/// Make a remote error body safe to show: truncated, and dropped entirely when
/// it carries something shaped like a key or an authorization header.
///
/// Plain words such as "credentials" or "tokens" pass through so messages
/// like "Bad credentials" stay readable.
pub fn sanitize_error_body(body: &str) -> String {
    const KEY_PREFIXES: &[&str] = &["sk-", "ghp_", "gho_", "ghs_", "github_pat_"];
    const HEADER_PATTERNS: &[&str] = &["bearer ", "authorization:"];

    let lower = body.to_lowercase();
    let has_key = lower
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .any(|word| KEY_PREFIXES.iter().any(|prefix| word.starts_with(prefix)));
    if has_key || HEADER_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
        return "(details redacted - may contain sensitive data)".to_string();
    }
    truncate(body.trim(), MAX_ERROR_BODY_LEN)
}
