use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;

use crate::commands::{
    CommandReport, open_existing_ledger, report_skipped_lines, resolve_repo_root,
};
use crate::monitor::compress::{ContextCompressor, retain};
use crate::monitor::config::load_config;
use crate::monitor::facts::Fact;
use crate::monitor::scoring::StaleDetector;

#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub repo: Option<PathBuf>,
    pub max_per_type: Option<usize>,
}

/// Every fact ever recorded, minus stale ones, capped per type.
pub fn run(opts: &ContextOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("context");
    let cfg = load_config()?;
    let max_per_type = opts.max_per_type.unwrap_or(cfg.watcher.max_facts_per_type);
    if max_per_type == 0 {
        report.issue("--max-per-type must be >= 1");
        return Ok(report);
    }

    let repo_root = resolve_repo_root(opts.repo.as_deref(), &cfg)?;
    let Some(ledger) = open_existing_ledger(&mut report, &repo_root, &cfg.watcher.project_id)?
    else {
        return Ok(report);
    };

    let (entries, skipped) = ledger.read_entries()?;

    let all: Vec<Fact> = entries.into_iter().flat_map(|e| e.facts).collect();
    let kept = retain(
        &all,
        &ContextCompressor::new(max_per_type),
        &StaleDetector::new(),
        Utc::now(),
    );

    report.detail(format!("facts.total={}", all.len()));
    report.detail(format!("facts.retained={}", kept.len()));
    report_skipped_lines(&mut report, "context", &skipped);
    for fact in &kept {
        report.detail(format!(
            "[{}] {} (importance: {})",
            fact.fact_type, fact.content, fact.importance
        ));
    }
    Ok(report)
}
