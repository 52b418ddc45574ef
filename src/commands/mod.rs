pub mod context;
pub mod diff;
pub mod handoff;
pub mod ledger;
pub mod watch;

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::monitor::config::TrackerConfig;
use crate::monitor::ledger::ContinuityLedger;
use crate::monitor::paths::thoughts_dir_for;
use crate::monitor::warn::{self, WarnEvent};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    /// Rendered document (diff, handoff body) printed ahead of the details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            output: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// `--repo` wins, then the configured repo root, then the current directory.
pub fn resolve_repo_root(flag: Option<&Path>, cfg: &TrackerConfig) -> Result<PathBuf> {
    match flag {
        Some(root) => Ok(root.to_path_buf()),
        None => cfg.watcher.resolved_repo_root(),
    }
}

/// Open the ledger for read-side commands without creating directories in a
/// repo that has never been watched.
pub fn open_existing_ledger(
    report: &mut CommandReport,
    repo_root: &Path,
    project_id: &str,
) -> Result<Option<ContinuityLedger>> {
    let thoughts = thoughts_dir_for(repo_root);
    if !thoughts.join("ledgers").is_dir() {
        report.issue(format!(
            "no ledger directory under {} (run `ctxd watch` first)",
            thoughts.display()
        ));
        return Ok(None);
    }
    Ok(Some(ContinuityLedger::open(project_id, &thoughts)?))
}

/// Warn about malformed ledger lines and record how many were skipped.
pub fn report_skipped_lines(
    report: &mut CommandReport,
    stage: &str,
    skipped: &[(PathBuf, usize)],
) {
    for (file, line) in skipped {
        warn::emit(WarnEvent {
            code: "LEDGER_LINE_SKIPPED",
            stage,
            action: "read-entries",
            file: &file.display().to_string(),
            reason: "malformed-json",
            err: &format!("line {line}"),
        });
    }
    report.detail(format!("skipped_lines={}", skipped.len()));
}
