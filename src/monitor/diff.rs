use crate::monitor::facts::CompressibleFact;
use crate::monitor::ledger::LedgerEntry;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub facts: Vec<CompressibleFact>,
    pub token_count: u64,
    pub file_changes: Vec<String>,
}

impl From<&LedgerEntry> for SessionSnapshot {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            session_id: entry.session_id.clone(),
            timestamp: entry.timestamp,
            facts: entry.facts.iter().map(CompressibleFact::from).collect(),
            token_count: entry.token_count,
            file_changes: entry.file_changes.clone(),
        }
    }
}

/// Set difference between two snapshots keyed by `type:content`.
/// A fact whose key is unchanged counts as unchanged even if its importance
/// moved, so `modified` is always empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    pub added: Vec<CompressibleFact>,
    pub removed: Vec<CompressibleFact>,
    pub modified: Vec<CompressibleFact>,
    pub summary: String,
    pub token_delta: i64,
}

fn fact_key(fact: &CompressibleFact) -> String {
    format!("{}:{}", fact.fact_type, fact.content)
}

fn missing_from(source: &[CompressibleFact], other: &[CompressibleFact]) -> Vec<CompressibleFact> {
    let other_keys: HashSet<String> = other.iter().map(fact_key).collect();
    let mut seen = HashSet::new();
    source
        .iter()
        .filter(|f| {
            let key = fact_key(f);
            !other_keys.contains(&key) && seen.insert(key)
        })
        .cloned()
        .collect()
}

pub fn generate_diff(previous: &SessionSnapshot, current: &SessionSnapshot) -> Diff {
    let mut diff = Diff {
        added: missing_from(&current.facts, &previous.facts),
        removed: missing_from(&previous.facts, &current.facts),
        modified: Vec::new(),
        summary: String::new(),
        token_delta: current.token_count as i64 - previous.token_count as i64,
    };
    diff.summary = summarize(&diff);
    diff
}

fn summarize(diff: &Diff) -> String {
    let mut parts = Vec::new();
    if !diff.added.is_empty() {
        parts.push(format!("{} new facts", diff.added.len()));
    }
    if !diff.removed.is_empty() {
        parts.push(format!("{} resolved", diff.removed.len()));
    }
    if diff.token_delta != 0 {
        parts.push(format!("{:+} tokens", diff.token_delta));
    }
    if parts.is_empty() {
        return "No significant changes".to_string();
    }
    parts.join(", ")
}

pub fn format_diff(diff: &Diff, previous: &SessionSnapshot, current: &SessionSnapshot) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Session Diff\n");
    let _ = writeln!(
        md,
        "**Previous**: {} ({})",
        previous.session_id,
        previous.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let _ = writeln!(
        md,
        "**Current**: {} ({})\n",
        current.session_id,
        current.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let _ = writeln!(md, "**Summary**: {}\n", diff.summary);

    if !diff.added.is_empty() {
        let _ = writeln!(md, "## Added Facts\n");
        for fact in &diff.added {
            let _ = writeln!(
                md,
                "- **[{}]** {} (importance: {})",
                fact.fact_type, fact.content, fact.importance
            );
        }
        md.push('\n');
    }

    if !diff.removed.is_empty() {
        let _ = writeln!(md, "## Removed/Resolved Facts\n");
        for fact in &diff.removed {
            let _ = writeln!(md, "- **[{}]** {}", fact.fact_type, fact.content);
        }
        md.push('\n');
    }

    if diff.token_delta != 0 {
        let _ = writeln!(md, "## Token Usage\n");
        let _ = writeln!(md, "Change: {:+} tokens\n", diff.token_delta);
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::facts::FactType;
    use chrono::TimeZone;

    fn fact(t: FactType, content: &str, importance: u8) -> CompressibleFact {
        CompressibleFact {
            fact_type: t,
            content: content.to_string(),
            importance,
            created: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            stale: false,
        }
    }

    fn snapshot(id: &str, facts: Vec<CompressibleFact>, tokens: u64) -> SessionSnapshot {
        SessionSnapshot {
            session_id: id.to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            facts,
            token_count: tokens,
            file_changes: Vec::new(),
        }
    }

    #[test]
    fn detects_added_blocker() {
        let prev = snapshot("a", vec![fact(FactType::Decision, "use postgres", 4)], 100);
        let curr = snapshot(
            "b",
            vec![
                fact(FactType::Decision, "use postgres", 4),
                fact(FactType::Blocker, "ci down", 5),
            ],
            100,
        );
        let diff = generate_diff(&prev, &curr);
        assert_eq!(diff.added, vec![fact(FactType::Blocker, "ci down", 5)]);
        assert!(diff.removed.is_empty());
        assert!(diff.modified.is_empty());
        assert_eq!(diff.summary, "1 new facts");
    }

    #[test]
    fn removed_and_token_delta_in_summary() {
        let prev = snapshot("a", vec![fact(FactType::Blocker, "ci down", 5)], 500);
        let curr = snapshot("b", Vec::new(), 300);
        let diff = generate_diff(&prev, &curr);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.token_delta, -200);
        assert_eq!(diff.summary, "1 resolved, -200 tokens");

        let grew = generate_diff(&curr, &snapshot("c", Vec::new(), 350));
        assert_eq!(grew.summary, "+50 tokens");
    }

    #[test]
    fn importance_change_is_not_a_difference() {
        let prev = snapshot("a", vec![fact(FactType::Todo, "write docs", 2)], 10);
        let curr = snapshot("b", vec![fact(FactType::Todo, "write docs", 5)], 10);
        let diff = generate_diff(&prev, &curr);
        assert!(diff.added.is_empty() && diff.removed.is_empty());
        assert_eq!(diff.summary, "No significant changes");
    }

    #[test]
    fn same_content_different_type_is_distinct() {
        let prev = snapshot("a", vec![fact(FactType::Todo, "ship it", 3)], 0);
        let curr = snapshot("b", vec![fact(FactType::Decision, "ship it", 4)], 0);
        let diff = generate_diff(&prev, &curr);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.removed.len(), 1);
    }

    #[test]
    fn markdown_lists_sections() {
        let prev = snapshot("a", vec![fact(FactType::Blocker, "ci down", 5)], 100);
        let curr = snapshot("b", vec![fact(FactType::Insight, "cache helps", 3)], 160);
        let diff = generate_diff(&prev, &curr);
        let md = format_diff(&diff, &prev, &curr);
        assert!(md.starts_with("# Session Diff"));
        assert!(md.contains("**Previous**: a (2026-01-01T00:00:00Z)"));
        assert!(md.contains("- **[insight]** cache helps (importance: 3)"));
        assert!(md.contains("## Removed/Resolved Facts\n\n- **[blocker]** ci down"));
        assert!(md.contains("Change: +60 tokens"));
    }
}
