use crate::error::MonitorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_IMPORTANCE: u8 = 1;
pub const MAX_IMPORTANCE: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Decision,
    Blocker,
    Todo,
    FileChange,
    Dependency,
    Insight,
}

impl FactType {
    pub const ALL: [FactType; 6] = [
        FactType::Decision,
        FactType::Blocker,
        FactType::Todo,
        FactType::FileChange,
        FactType::Dependency,
        FactType::Insight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FactType::Decision => "decision",
            FactType::Blocker => "blocker",
            FactType::Todo => "todo",
            FactType::FileChange => "file_change",
            FactType::Dependency => "dependency",
            FactType::Insight => "insight",
        }
    }

    /// Importance assigned at extraction time, before scoring.
    pub fn default_importance(self) -> u8 {
        match self {
            FactType::Decision => 4,
            FactType::Blocker => 5,
            FactType::Todo => 3,
            FactType::FileChange => 2,
            FactType::Dependency => 3,
            FactType::Insight => 3,
        }
    }
}

impl fmt::Display for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactType {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FactType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| MonitorError::UnknownFactType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    #[serde(rename = "type")]
    pub fact_type: FactType,
    pub content: String,
    pub importance: u8,
    pub timestamp: DateTime<Utc>,
}

impl Fact {
    pub fn new(fact_type: FactType, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            fact_type,
            content: content.into(),
            importance: fact_type.default_importance(),
            timestamp,
        }
    }
}

/// Read-side shape of an already persisted fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressibleFact {
    #[serde(rename = "type")]
    pub fact_type: FactType,
    pub content: String,
    pub importance: u8,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub stale: bool,
}

impl From<&Fact> for CompressibleFact {
    fn from(fact: &Fact) -> Self {
        Self {
            fact_type: fact.fact_type,
            content: fact.content.clone(),
            importance: fact.importance,
            created: fact.timestamp,
            stale: false,
        }
    }
}

impl From<&CompressibleFact> for Fact {
    fn from(fact: &CompressibleFact) -> Self {
        Self {
            fact_type: fact.fact_type,
            content: fact.content.clone(),
            importance: fact.importance,
            timestamp: fact.created,
        }
    }
}
