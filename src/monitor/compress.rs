use crate::monitor::facts::{CompressibleFact, Fact, FactType};
use crate::monitor::scoring::StaleDetector;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_FACTS_PER_TYPE: usize = 10;

/// Retention policy: drop stale facts, keep the top N per type by
/// importance then recency.
#[derive(Debug, Clone, Copy)]
pub struct ContextCompressor {
    max_facts_per_type: usize,
}

impl Default for ContextCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FACTS_PER_TYPE)
    }
}

impl ContextCompressor {
    pub fn new(max_facts_per_type: usize) -> Self {
        Self { max_facts_per_type }
    }

    pub fn max_facts_per_type(&self) -> usize {
        self.max_facts_per_type
    }

    /// Groups come out in `FactType` order; callers should not rely on it.
    pub fn compress(&self, facts: &[CompressibleFact]) -> Vec<CompressibleFact> {
        let mut grouped: BTreeMap<FactType, Vec<CompressibleFact>> = BTreeMap::new();
        for fact in facts.iter().filter(|f| !f.stale) {
            grouped
                .entry(fact.fact_type)
                .or_default()
                .push(fact.clone());
        }

        let mut out = Vec::new();
        for (_, mut group) in grouped {
            group.sort_by(|a, b| {
                b.importance
                    .cmp(&a.importance)
                    .then_with(|| b.created.cmp(&a.created))
            });
            group.truncate(self.max_facts_per_type);
            out.extend(group);
        }
        out
    }
}

/// Set the `stale` flag on each fact the detector rejects. Returns how many
/// facts were newly marked.
pub fn mark_stale(
    facts: &mut [CompressibleFact],
    detector: &StaleDetector,
    now: DateTime<Utc>,
) -> usize {
    let mut marked = 0;
    for fact in facts.iter_mut().filter(|f| !f.stale) {
        if detector.is_stale_at(fact.fact_type, fact.created, &fact.content, now) {
            fact.stale = true;
            marked += 1;
        }
    }
    marked
}

/// Stale facts dropped, the rest capped per type. Used for handoffs and the
/// `context` command.
pub fn retain(
    facts: &[Fact],
    compressor: &ContextCompressor,
    detector: &StaleDetector,
    now: DateTime<Utc>,
) -> Vec<Fact> {
    let mut candidates: Vec<CompressibleFact> = facts.iter().map(CompressibleFact::from).collect();
    mark_stale(&mut candidates, detector, now);
    compressor
        .compress(&candidates)
        .iter()
        .map(Fact::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn fact(t: FactType, content: &str, importance: u8, age_mins: i64) -> CompressibleFact {
        CompressibleFact {
            fact_type: t,
            content: content.to_string(),
            importance,
            created: now() - Duration::minutes(age_mins),
            stale: false,
        }
    }

    #[test]
    fn caps_each_type_independently() {
        let mut facts = Vec::new();
        for i in 0..7 {
            facts.push(fact(FactType::Todo, &format!("todo {i}"), 3, i));
        }
        for i in 0..2 {
            facts.push(fact(FactType::Decision, &format!("dec {i}"), 4, i));
        }

        let out = ContextCompressor::new(3).compress(&facts);
        let todos = out.iter().filter(|f| f.fact_type == FactType::Todo).count();
        let decisions = out
            .iter()
            .filter(|f| f.fact_type == FactType::Decision)
            .count();
        assert_eq!(todos, 3);
        assert_eq!(decisions, 2);
    }

    #[test]
    fn orders_by_importance_then_recency() {
        let facts = vec![
            fact(FactType::Blocker, "old-high", 5, 120),
            fact(FactType::Blocker, "low", 2, 1),
            fact(FactType::Blocker, "new-high", 5, 5),
        ];
        let out = ContextCompressor::new(2).compress(&facts);
        let contents: Vec<&str> = out.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(contents, vec!["new-high", "old-high"]);
    }

    #[test]
    fn never_returns_stale_facts() {
        let mut stale = fact(FactType::Insight, "gone", 5, 0);
        stale.stale = true;
        let facts = vec![stale, fact(FactType::Insight, "kept", 1, 0)];
        let out = ContextCompressor::default().compress(&facts);
        assert_eq!(out.len(), 1);
        assert!(out.iter().all(|f| !f.stale));
        assert_eq!(out[0].content, "kept");
    }

    #[test]
    fn mark_stale_uses_detector() {
        let mut facts = vec![
            fact(FactType::Blocker, "api outage", 5, 60 * 24 * 5),
            fact(FactType::Todo, "write docs - done", 3, 1),
            fact(FactType::Decision, "use sqlite", 4, 1),
        ];
        let marked = mark_stale(&mut facts, &StaleDetector::new(), now());
        assert_eq!(marked, 2);
        assert!(facts[0].stale);
        assert!(facts[1].stale);
        assert!(!facts[2].stale);

        let out = ContextCompressor::default().compress(&facts);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "use sqlite");
    }

    #[test]
    fn retain_drops_resolved_and_caps() {
        let at = now() - Duration::minutes(5);
        let facts = vec![
            Fact::new(FactType::Blocker, "tls handshake resolved", at),
            Fact::new(FactType::Todo, "add retries", at),
            Fact::new(FactType::Todo, "write changelog", at),
            Fact::new(FactType::Todo, "bump version", at),
        ];
        let out = retain(&facts, &ContextCompressor::new(2), &StaleDetector::new(), now());
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|f| f.fact_type == FactType::Todo));
    }
}
