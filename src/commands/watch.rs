use anyhow::{Result, anyhow};
use std::path::PathBuf;

use crate::commands::{CommandReport, resolve_repo_root};
use crate::monitor::config::{load_config, validate};
use crate::monitor::daemon_lock;
use crate::monitor::paths::TrackerPaths;
use crate::monitor::watcher::{self, Watcher};
use crate::store::{HttpRecordStore, RecordStore};

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub project: Option<String>,
    pub logs: Option<PathBuf>,
    pub repo: Option<PathBuf>,
    pub store_url: Option<String>,
    pub threshold: Option<u64>,
    pub no_smart: bool,
    pub once: bool,
    pub skip_verify: bool,
    pub verbose: bool,
}

pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    let mut cfg = load_config()?;
    if let Some(project) = &opts.project {
        cfg.watcher.project_id = project.trim().to_string();
    }
    if let Some(logs) = &opts.logs {
        cfg.watcher.log_dir = Some(logs.clone());
    }
    if let Some(url) = &opts.store_url {
        cfg.store.url = url.clone();
    }
    if let Some(threshold) = opts.threshold {
        cfg.watcher.compact_threshold = threshold;
    }
    if opts.no_smart {
        cfg.watcher.smart_mode = false;
    }
    cfg.watcher.verbose |= opts.verbose;
    validate(&cfg)?;

    if cfg.watcher.project_id.is_empty() {
        report.issue("project id required (pass --project or set CTX_PROJECT_ID)");
        return Ok(report);
    }

    let log_dir = cfg
        .watcher
        .resolved_log_dir()
        .ok_or_else(|| anyhow!("no log directory found; pass --logs or set CTX_LOG_DIR"))?;
    let repo_root = resolve_repo_root(opts.repo.as_deref(), &cfg)?;
    let paths = TrackerPaths::new(log_dir, repo_root);

    let store = HttpRecordStore::new(&cfg.store.url, cfg.store.timeout_secs)?;
    let tracker = Watcher::new(&cfg.watcher, &paths, store)?;
    let lock = match daemon_lock::acquire(&paths.thoughts_dir, &cfg.watcher.project_id) {
        Ok(lock) => lock,
        Err(err) => {
            if let Ok(Some(holder)) = daemon_lock::read_payload(&paths.thoughts_dir) {
                return Err(err.context(format!(
                    "held by pid {} for project {} since {}",
                    holder.pid, holder.project_id, holder.started_at
                )));
            }
            return Err(err);
        }
    };
    if !opts.skip_verify {
        tracker.store().verify_project(&cfg.watcher.project_id)?;
    }

    report.detail(format!("project={}", cfg.watcher.project_id));
    report.detail(format!("log_dir={}", paths.log_dir.display()));
    report.detail(format!("thoughts_dir={}", paths.thoughts_dir.display()));
    report.detail(format!("daemon_lock={}", lock.path().display()));
    report.detail(format!("smart_mode={}", cfg.watcher.smart_mode));
    report.detail(format!("compact_threshold={}", cfg.watcher.compact_threshold));

    let outcome = watcher::run(tracker, opts.once)?;
    drop(lock);

    report.detail(format!("session_id={}", outcome.session_id));
    report.detail(format!("swept_files={}", outcome.swept_files));
    report.detail(format!("cycles={}", outcome.stats.cycles));
    report.detail(format!("tokens.current={}", outcome.current_tokens));
    report.detail(format!("facts.extracted={}", outcome.stats.facts_extracted));
    report.detail(format!("facts.pushed={}", outcome.stats.facts_pushed));
    report.detail(format!("facts.push_failures={}", outcome.stats.push_failures));
    report.detail(format!("ledger.failures={}", outcome.stats.ledger_failures));
    report.detail(format!("handoffs={}", outcome.stats.handoffs));
    if let Some(path) = &outcome.final_handoff {
        report.detail(format!("final_handoff={}", path.display()));
    }

    Ok(report)
}
