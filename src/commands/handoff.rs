use anyhow::Result;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;

use crate::commands::{CommandReport, open_existing_ledger, resolve_repo_root};
use crate::monitor::compress::{ContextCompressor, retain};
use crate::monitor::config::load_config;
use crate::monitor::ledger::{ContinuityLedger, validate_session_id};
use crate::monitor::paths::thoughts_dir_for;
use crate::monitor::scoring::StaleDetector;

#[derive(Debug, Clone, Default)]
pub struct HandoffOptions {
    pub session: String,
    pub repo: Option<PathBuf>,
    pub project: Option<String>,
}

/// Write a handoff from the latest ledger entry, ignoring the watcher's
/// debounce.
pub fn run(opts: &HandoffOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("handoff");
    let session = opts.session.trim();
    if session.is_empty() {
        report.issue("--session cannot be empty");
        return Ok(report);
    }
    if let Err(err) = validate_session_id(session) {
        report.issue(format!("--session: {err}"));
        return Ok(report);
    }

    let cfg = load_config()?;
    let repo_root = resolve_repo_root(opts.repo.as_deref(), &cfg)?;
    let Some(reader) = open_existing_ledger(&mut report, &repo_root, &cfg.watcher.project_id)?
    else {
        return Ok(report);
    };
    let entry = match reader.latest_entry() {
        Ok(entry) => entry,
        Err(err) => {
            report.issue(format!("{err:#}"));
            return Ok(report);
        }
    };

    // Explicit flag, then config, then whoever wrote the entry.
    let project = opts
        .project
        .clone()
        .filter(|p| !p.trim().is_empty())
        .or_else(|| Some(cfg.watcher.project_id.clone()).filter(|p| !p.is_empty()))
        .unwrap_or_else(|| entry.project_id.clone());
    let ledger = ContinuityLedger::open(project.as_str(), &thoughts_dir_for(&repo_root))?;

    let facts = retain(
        &entry.facts,
        &ContextCompressor::new(cfg.watcher.max_facts_per_type),
        &StaleDetector::new(),
        Utc::now(),
    );
    let summary = entry.summary();
    let path = ledger.create_handoff(session, &summary, &facts)?;

    report.detail(format!("handoff={}", path.display()));
    report.detail(format!("project={project}"));
    report.detail(format!("facts={}", facts.len()));
    report.detail(format!("summary={summary}"));
    report.output = fs::read_to_string(&path).ok();
    Ok(report)
}
