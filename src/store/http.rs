use crate::error::MonitorError;
use crate::monitor::facts::Fact;
use crate::store::{RecordStore, SessionRecord};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_STORE_URL: &str = "http://localhost:8090";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct FactPayload<'a> {
    project: &'a str,
    fact_type: &'a str,
    content: &'a str,
    importance: u8,
    stale: bool,
}

/// PocketBase-style collection API over blocking HTTP.
#[derive(Debug, Clone)]
pub struct HttpRecordStore {
    base_url: String,
    client: Client,
}

fn ensure_created(resp: Response, what: &str) -> Result<()> {
    let status = resp.status();
    if status == StatusCode::OK || status == StatusCode::CREATED {
        return Ok(());
    }
    let body = resp.text().unwrap_or_default();
    Err(MonitorError::Store(format!(
        "{what} failed: status {} body={}",
        status.as_u16(),
        body.trim()
    ))
    .into())
}

impl HttpRecordStore {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn records_url(&self, collection: &str) -> String {
        format!("{}/api/collections/{collection}/records", self.base_url)
    }
}

impl RecordStore for HttpRecordStore {
    fn verify_project(&self, project_id: &str) -> Result<()> {
        let url = format!("{}/{project_id}", self.records_url("projects"));
        let resp = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("GET {url}"))?;
        if resp.status() != StatusCode::OK {
            return Err(MonitorError::Store(format!(
                "project not found: {project_id} (status {})",
                resp.status().as_u16()
            ))
            .into());
        }
        Ok(())
    }

    fn create_fact(&self, project_id: &str, fact: &Fact) -> Result<()> {
        let url = self.records_url("extracted_facts");
        let payload = FactPayload {
            project: project_id,
            fact_type: fact.fact_type.as_str(),
            content: &fact.content,
            importance: fact.importance,
            stale: false,
        };
        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .with_context(|| format!("POST {url}"))?;
        ensure_created(resp, "create fact")
    }

    fn create_session(&self, session: &SessionRecord) -> Result<()> {
        let url = self.records_url("session_history");
        let resp = self
            .client
            .post(&url)
            .json(session)
            .send()
            .with_context(|| format!("POST {url}"))?;
        ensure_created(resp, "create session")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::facts::FactType;
    use chrono::{TimeZone, Utc};
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn create_fact_posts_collection_record() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/collections/extracted_facts/records")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "project": "p1",
                "fact_type": "blocker",
                "content": "ci down",
                "importance": 5,
                "stale": false
            })))
            .with_status(200)
            .with_body("{}")
            .create();

        let store = HttpRecordStore::new(&server.url(), 5).expect("client");
        let fact = Fact::new(FactType::Blocker, "ci down", Utc::now());
        store.create_fact("p1", &fact).expect("create");
        mock.assert();
    }

    #[test]
    fn non_success_status_is_store_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/api/collections/extracted_facts/records")
            .with_status(400)
            .with_body("bad request")
            .create();

        let store = HttpRecordStore::new(&server.url(), 5).expect("client");
        let fact = Fact::new(FactType::Todo, "tests", Utc::now());
        let err = store.create_fact("p1", &fact).expect_err("must fail");
        assert!(matches!(
            err.downcast_ref::<MonitorError>(),
            Some(MonitorError::Store(msg)) if msg.contains("400")
        ));
    }

    #[test]
    fn create_session_sends_timestamps() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/collections/session_history/records")
            .match_body(Matcher::PartialJson(json!({
                "project": "p1",
                "token_count": 150000,
                "session_start": "2026-01-01T00:00:00Z"
            })))
            .with_status(201)
            .create();

        let store = HttpRecordStore::new(&format!("{}/", server.url()), 5).expect("client");
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        store
            .create_session(&SessionRecord {
                project: "p1".into(),
                summary: "Continued development work.".into(),
                token_count: 150_000,
                session_start: at,
                session_end: at,
            })
            .expect("create");
        mock.assert();
    }

    #[test]
    fn verify_project_requires_ok() {
        let mut server = mockito::Server::new();
        let _ok = server
            .mock("GET", "/api/collections/projects/records/known")
            .with_status(200)
            .create();
        let _missing = server
            .mock("GET", "/api/collections/projects/records/missing")
            .with_status(404)
            .create();

        let store = HttpRecordStore::new(&server.url(), 5).expect("client");
        store.verify_project("known").expect("known project");
        let err = store.verify_project("missing").expect_err("missing project");
        assert!(err.to_string().contains("project not found: missing"));
    }
}
