use crate::monitor::conversation::Conversation;
use crate::monitor::facts::{Fact, FactType};
use crate::monitor::util::{contains_any, truncate_with_ellipsis};
use chrono::{DateTime, Utc};

const FALLBACK_CONTENT_CHARS: usize = 200;

const DECISION_TRIGGERS: &[&str] = &["decided to", "chose to", "going with", "will use"];
const BLOCKER_TRIGGERS: &[&str] = &["blocked by", "can't proceed", "error:", "failed to"];
const TODO_TRIGGERS: &[&str] = &["todo:", "need to", "should", "must"];
const CHANGE_VERBS: &[&str] = &["created", "modified", "updated", "deleted"];
const FILE_EXTENSIONS: &[&str] = &[
    ".ts", ".tsx", ".js", ".jsx", ".go", ".py", ".java", ".rs", ".toml",
];
const DEPENDENCY_TRIGGERS: &[&str] = &[
    "installed",
    "added dependency",
    "npm install",
    "go get",
    "cargo add",
    "pip install",
    "yarn add",
];
const INSIGHT_TRIGGERS: &[&str] = &["discovered", "found that", "interesting", "note that"];

/// Phrases whose presence marks a message as carrying a fact of this type.
fn triggers(fact_type: FactType) -> &'static [&'static str] {
    match fact_type {
        FactType::Decision => DECISION_TRIGGERS,
        FactType::Blocker => BLOCKER_TRIGGERS,
        FactType::Todo => TODO_TRIGGERS,
        FactType::FileChange => CHANGE_VERBS,
        FactType::Dependency => DEPENDENCY_TRIGGERS,
        FactType::Insight => INSIGHT_TRIGGERS,
    }
}

fn matches(fact_type: FactType, content: &str) -> bool {
    let hit = contains_any(content, triggers(fact_type));
    match fact_type {
        FactType::FileChange => hit && contains_any(content, FILE_EXTENSIONS),
        FactType::Decision
        | FactType::Blocker
        | FactType::Todo
        | FactType::Dependency
        | FactType::Insight => hit,
    }
}

/// First `.`-delimited sentence containing a trigger. When none matches, a
/// truncated copy of the whole message stands in so the fact keeps content.
fn extract_sentence(content: &str, keywords: &[&str]) -> String {
    content
        .split('.')
        .find(|sentence| contains_any(sentence, keywords))
        .map(|sentence| sentence.trim().to_string())
        .unwrap_or_else(|| truncate_with_ellipsis(content, FALLBACK_CONTENT_CHARS))
}

/// Scan assistant messages for trigger phrases. Each fact type is checked
/// independently, so one message can yield several facts. Importance is the
/// type default until the scorer runs.
pub fn extract_facts(conv: &Conversation) -> Vec<Fact> {
    extract_facts_at(conv, Utc::now())
}

pub fn extract_facts_at(conv: &Conversation, now: DateTime<Utc>) -> Vec<Fact> {
    let mut facts = Vec::new();
    for msg in conv.assistant_messages() {
        let at = msg.timestamp.unwrap_or(now);
        for fact_type in FactType::ALL {
            if !matches(fact_type, &msg.content) {
                continue;
            }
            let content = extract_sentence(&msg.content, triggers(fact_type));
            facts.push(Fact::new(fact_type, content, at));
        }
    }
    facts
}
