use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{
    CommandReport, open_existing_ledger, report_skipped_lines, resolve_repo_root,
};
use crate::monitor::config::load_config;
use crate::monitor::diff::{SessionSnapshot, format_diff, generate_diff};

#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    pub repo: Option<PathBuf>,
}

pub fn run(opts: &DiffOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("diff");
    let cfg = load_config()?;
    let repo_root = resolve_repo_root(opts.repo.as_deref(), &cfg)?;
    let Some(ledger) = open_existing_ledger(&mut report, &repo_root, &cfg.watcher.project_id)?
    else {
        return Ok(report);
    };

    let (entries, skipped) = ledger.read_entries()?;
    report_skipped_lines(&mut report, "diff", &skipped);
    let [.., previous, current] = entries.as_slice() else {
        report.issue(format!(
            "need at least two ledger entries to diff (found {})",
            entries.len()
        ));
        return Ok(report);
    };

    let previous = SessionSnapshot::from(previous);
    let current = SessionSnapshot::from(current);
    let diff = generate_diff(&previous, &current);

    report.detail(format!("previous={}", previous.session_id));
    report.detail(format!("current={}", current.session_id));
    report.detail(format!("added={}", diff.added.len()));
    report.detail(format!("removed={}", diff.removed.len()));
    report.detail(format!("token_delta={:+}", diff.token_delta));
    report.detail(format!("summary={}", diff.summary));
    report.output = Some(format_diff(&diff, &previous, &current));
    Ok(report)
}
