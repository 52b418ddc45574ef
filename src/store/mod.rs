pub mod http;

use crate::monitor::facts::Fact;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use http::HttpRecordStore;

/// Session summary pushed when a handoff is written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub project: String,
    pub summary: String,
    pub token_count: u64,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
}

/// Remote record store the watcher writes through. Calls are
/// fire-and-log: callers never retry or read back.
pub trait RecordStore {
    fn verify_project(&self, project_id: &str) -> Result<()>;
    fn create_fact(&self, project_id: &str, fact: &Fact) -> Result<()>;
    fn create_session(&self, session: &SessionRecord) -> Result<()>;
}
