use chrono::{DateTime, Utc};

pub const SESSION_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Session ids are the second-resolution UTC start time of the daemon.
pub fn session_id_at(at: DateTime<Utc>) -> String {
    at.format(SESSION_ID_FORMAT).to_string()
}

/// Truncate `input` to at most `max_chars` Unicode characters, collapsing
/// whitespace runs and appending `…` when truncated.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    let clean = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if clean.chars().count() > max_chars {
        let mut s: String = clean.chars().take(max_chars).collect();
        s.push('…');
        s
    } else {
        clean
    }
}

/// Case-insensitive substring test against any of `needles`.
pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles
        .iter()
        .any(|needle| lower.contains(&needle.to_lowercase()))
}
