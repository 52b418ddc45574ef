use anyhow::Result;
use chrono::SecondsFormat;
use std::path::PathBuf;

use crate::commands::{CommandReport, open_existing_ledger, resolve_repo_root};
use crate::monitor::config::load_config;
use crate::monitor::facts::FactType;

#[derive(Debug, Clone, Default)]
pub struct LedgerOptions {
    pub repo: Option<PathBuf>,
}

pub fn run(opts: &LedgerOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("ledger");
    let cfg = load_config()?;
    let repo_root = resolve_repo_root(opts.repo.as_deref(), &cfg)?;
    let Some(ledger) = open_existing_ledger(&mut report, &repo_root, &cfg.watcher.project_id)?
    else {
        return Ok(report);
    };

    let entry = match ledger.latest_entry() {
        Ok(entry) => entry,
        Err(err) => {
            report.issue(format!("{err:#}"));
            return Ok(report);
        }
    };

    report.detail(format!("ledger_dir={}", ledger.ledger_dir().display()));
    report.detail(format!("session_id={}", entry.session_id));
    report.detail(format!("project={}", entry.project_id));
    report.detail(format!(
        "timestamp={}",
        entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    report.detail(format!("tokens={}", entry.token_count));
    report.detail(format!("facts={}", entry.facts.len()));
    for fact_type in FactType::ALL {
        let n = entry
            .facts
            .iter()
            .filter(|f| f.fact_type == fact_type)
            .count();
        if n > 0 {
            report.detail(format!("facts.{fact_type}={n}"));
        }
    }
    report.detail(format!("summary={}", entry.summary()));

    Ok(report)
}
