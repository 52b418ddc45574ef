use crate::monitor::facts::{FactType, MAX_IMPORTANCE, MIN_IMPORTANCE};
use chrono::{DateTime, Duration, Utc};

const TYPE_WEIGHT_SCALE: f64 = 3.0;
const MAX_CONTENT_BONUS: f64 = 1.5;
const HIGH_VALUE_BONUS: f64 = 0.3;
const MEDIUM_VALUE_BONUS: f64 = 0.2;

const HIGH_VALUE_KEYWORDS: &[&str] = &[
    "critical", "breaking", "urgent", "security", "bug", "crash", "error",
];
const MEDIUM_VALUE_KEYWORDS: &[&str] = &["important", "major", "refactor", "optimize", "performance"];

/// Heuristic 1..=5 importance from fact type, content keywords, and age.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportanceScorer;

impl ImportanceScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn type_weight(fact_type: FactType) -> f64 {
        match fact_type {
            FactType::Blocker => 1.0,
            FactType::Decision => 0.9,
            FactType::Dependency => 0.7,
            FactType::Todo => 0.6,
            FactType::Insight => 0.5,
            FactType::FileChange => 0.4,
        }
    }

    pub fn calculate_importance(
        &self,
        fact_type: FactType,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> u8 {
        self.score_at(fact_type, content, created_at, Utc::now())
    }

    pub fn score_at(
        &self,
        fact_type: FactType,
        content: &str,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> u8 {
        let score = Self::type_weight(fact_type) * TYPE_WEIGHT_SCALE
            + content_bonus(content)
            + recency_bonus(now - created_at);

        let rounded = score.round();
        if rounded < MIN_IMPORTANCE as f64 {
            MIN_IMPORTANCE
        } else if rounded > MAX_IMPORTANCE as f64 {
            MAX_IMPORTANCE
        } else {
            rounded as u8
        }
    }
}

fn content_bonus(content: &str) -> f64 {
    let lower = content.to_lowercase();
    let mut score = 0.0;

    for keyword in HIGH_VALUE_KEYWORDS {
        if lower.contains(keyword) {
            score += HIGH_VALUE_BONUS;
        }
    }
    for keyword in MEDIUM_VALUE_KEYWORDS {
        if lower.contains(keyword) {
            score += MEDIUM_VALUE_BONUS;
        }
    }

    let chars = content.chars().count();
    if chars > 100 {
        score += 0.3;
    } else if chars > 50 {
        score += 0.2;
    }

    score.min(MAX_CONTENT_BONUS)
}

// Negative ages (clock skew, future timestamps) count as fresh.
fn recency_bonus(age: Duration) -> f64 {
    if age < Duration::hours(1) {
        0.5
    } else if age < Duration::hours(24) {
        0.3
    } else if age < Duration::weeks(1) {
        0.1
    } else {
        0.0
    }
}

/// Pure predicate deciding whether a stored fact has outlived its relevance.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaleDetector;

impl StaleDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn stale_after_days(fact_type: FactType) -> i64 {
        match fact_type {
            FactType::Blocker => 3,
            FactType::Todo => 7,
            FactType::FileChange => 14,
            FactType::Dependency => 30,
            FactType::Decision => 90,
            FactType::Insight => 60,
        }
    }

    pub fn is_stale(&self, fact_type: FactType, created_at: DateTime<Utc>, content: &str) -> bool {
        self.is_stale_at(fact_type, created_at, content, Utc::now())
    }

    pub fn is_stale_at(
        &self,
        fact_type: FactType,
        created_at: DateTime<Utc>,
        content: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let lower = content.to_lowercase();
        match fact_type {
            FactType::Blocker if lower.contains("resolved") => return true,
            FactType::Todo if lower.contains("done") => return true,
            _ => {}
        }

        now - created_at > Duration::days(Self::stale_after_days(fact_type))
    }
}
