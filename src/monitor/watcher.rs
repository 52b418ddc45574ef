use crate::error::MonitorError;
use crate::monitor::compress::{ContextCompressor, retain};
use crate::monitor::config::WatcherConfig;
use crate::monitor::extractor::extract_facts_at;
use crate::monitor::facts::Fact;
use crate::monitor::ledger::{ContinuityLedger, LedgerEntry};
use crate::monitor::parser::{count_tokens, parse};
use crate::monitor::paths::TrackerPaths;
use crate::monitor::scoring::{ImportanceScorer, StaleDetector};
use crate::monitor::thresholds::PreCompactDetector;
use crate::monitor::util::session_id_at;
use crate::monitor::warn::{self, WarnEvent};
use crate::store::{RecordStore, SessionRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

/// Everything the event loop can receive. Shutdown shares the channel with
/// filesystem events so an in-flight cycle always completes first.
#[derive(Debug)]
pub enum WatchMessage {
    Fs(notify::Result<Event>),
    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub cycles: u64,
    pub read_failures: u64,
    pub facts_extracted: u64,
    pub facts_pushed: u64,
    pub push_failures: u64,
    pub ledger_failures: u64,
    pub handoffs: u64,
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub path: PathBuf,
    pub facts: Vec<Fact>,
    pub token_count: u64,
    pub ledger_path: Option<PathBuf>,
    pub handoff_path: Option<PathBuf>,
}

/// Scoring, ledger and handoff state; only present in smart mode.
struct SmartPipeline {
    ledger: ContinuityLedger,
    scorer: ImportanceScorer,
    stale: StaleDetector,
    compressor: ContextCompressor,
    detector: PreCompactDetector,
    handoff_interval: Duration,
    last_handoff: Option<DateTime<Utc>>,
}

pub struct Watcher<S: RecordStore> {
    log_dir: PathBuf,
    cfg: WatcherConfig,
    store: S,
    smart: Option<SmartPipeline>,
    session_id: String,
    started_at: DateTime<Utc>,
    current_tokens: u64,
    stats: WatchStats,
}

fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}

fn handoff_interval(secs: u64) -> Result<Duration, MonitorError> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| {
            MonitorError::InvalidConfig(format!("handoff_interval_secs out of range: {secs}"))
        })
}

impl<S: RecordStore> Watcher<S> {
    /// Fails when the log directory is missing or, in smart mode, when the
    /// ledger directories cannot be created.
    pub fn new(cfg: &WatcherConfig, paths: &TrackerPaths, store: S) -> Result<Self> {
        if !paths.log_dir.is_dir() {
            return Err(MonitorError::LogDirMissing(paths.log_dir.clone()).into());
        }

        let smart = if cfg.smart_mode {
            Some(SmartPipeline {
                ledger: ContinuityLedger::open(cfg.project_id.clone(), &paths.thoughts_dir)?,
                scorer: ImportanceScorer::new(),
                stale: StaleDetector::new(),
                compressor: ContextCompressor::new(cfg.max_facts_per_type),
                detector: PreCompactDetector::new(cfg.compact_threshold),
                handoff_interval: handoff_interval(cfg.handoff_interval_secs)?,
                last_handoff: None,
            })
        } else {
            None
        };

        let started_at = Utc::now();
        Ok(Self {
            log_dir: paths.log_dir.clone(),
            cfg: cfg.clone(),
            store,
            smart,
            session_id: session_id_at(started_at),
            started_at,
            current_tokens: 0,
            stats: WatchStats::default(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn stats(&self) -> &WatchStats {
        &self.stats
    }

    pub fn current_tokens(&self) -> u64 {
        self.current_tokens
    }

    fn warn(&self, event: WarnEvent<'_>) {
        if self.cfg.verbose {
            warn::emit(event);
        }
    }

    /// Process every pre-existing log file once, in name order.
    pub fn sweep_existing(&mut self) -> Result<usize> {
        let mut files = fs::read_dir(&self.log_dir)
            .with_context(|| format!("failed to read {}", self.log_dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && self.cfg.sweeps(p))
            .collect::<Vec<_>>();
        files.sort();

        for file in &files {
            self.process_file(file);
        }
        Ok(files.len())
    }

    pub fn handle_event(&mut self, event: Event) {
        if !is_write(&event.kind) {
            return;
        }
        for path in event.paths {
            if path.is_file() {
                log::debug!("modified file: {}", path.display());
                self.process_file(&path);
            }
        }
    }

    pub fn process_file(&mut self, path: &Path) -> Option<CycleOutcome> {
        self.process_file_at(path, Utc::now())
    }

    pub fn process_file_at(&mut self, path: &Path, now: DateTime<Utc>) -> Option<CycleOutcome> {
        let file = path.display().to_string();
        let raw = match fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                self.stats.read_failures += 1;
                self.warn(WarnEvent {
                    code: "LOG_READ_FAILED",
                    stage: "process",
                    action: "read-log",
                    file: &file,
                    reason: "io-error",
                    err: &err.to_string(),
                });
                return None;
            }
        };

        self.stats.cycles += 1;
        let conversation = parse(&raw);
        let mut facts = extract_facts_at(&conversation, now);
        let token_count = count_tokens(&conversation);
        self.current_tokens = token_count;
        self.stats.facts_extracted += facts.len() as u64;

        let mut outcome = CycleOutcome {
            path: path.to_path_buf(),
            facts: Vec::new(),
            token_count,
            ledger_path: None,
            handoff_path: None,
        };

        if let Some(smart) = &self.smart {
            for fact in &mut facts {
                fact.importance =
                    smart
                        .scorer
                        .score_at(fact.fact_type, &fact.content, fact.timestamp, now);
            }
        }

        for fact in &facts {
            self.push_fact(fact, &file);
        }

        if self.smart.is_some() {
            outcome.ledger_path = self.append_ledger(&facts, token_count, now, &file);
            if self.should_handoff(token_count) {
                outcome.handoff_path = self.create_handoff_if_needed_at(false, now);
            }
            if let Some(smart) = &self.smart {
                log::debug!(
                    "{}: {} facts, {} tokens ({:.1}% of {}), {} remaining until compact",
                    file,
                    facts.len(),
                    token_count,
                    smart.detector.usage_ratio(token_count) * 100.0,
                    smart.detector.threshold(),
                    smart.detector.time_until_compact(token_count)
                );
            }
        } else {
            log::debug!("{}: {} facts, {} tokens", file, facts.len(), token_count);
        }

        outcome.facts = facts;
        Some(outcome)
    }

    fn push_fact(&mut self, fact: &Fact, file: &str) {
        match self.store.create_fact(&self.cfg.project_id, fact) {
            Ok(()) => {
                self.stats.facts_pushed += 1;
                log::debug!(
                    "created fact (importance: {}): {} ({})",
                    fact.importance,
                    fact.content,
                    fact.fact_type
                );
            }
            Err(err) => {
                self.stats.push_failures += 1;
                self.warn(WarnEvent {
                    code: "FACT_PUSH_FAILED",
                    stage: "process",
                    action: "create-fact",
                    file,
                    reason: fact.fact_type.as_str(),
                    err: &format!("{err:#}"),
                });
            }
        }
    }

    fn append_ledger(
        &mut self,
        facts: &[Fact],
        token_count: u64,
        now: DateTime<Utc>,
        file: &str,
    ) -> Option<PathBuf> {
        let smart = self.smart.as_ref()?;
        let entry = LedgerEntry::new(
            self.session_id.clone(),
            self.cfg.project_id.clone(),
            token_count,
            facts.to_vec(),
            now,
        );
        match smart.ledger.append_entry(&entry) {
            Ok(path) => Some(path),
            Err(err) => {
                self.stats.ledger_failures += 1;
                self.warn(WarnEvent {
                    code: "LEDGER_APPEND_FAILED",
                    stage: "process",
                    action: "append-ledger",
                    file,
                    reason: "io-error",
                    err: &format!("{err:#}"),
                });
                None
            }
        }
    }

    fn should_handoff(&self, token_count: u64) -> bool {
        self.smart
            .as_ref()
            .is_some_and(|smart| smart.detector.should_create_handoff(token_count))
    }

    pub fn create_handoff_if_needed(&mut self, force: bool) -> Option<PathBuf> {
        self.create_handoff_if_needed_at(force, Utc::now())
    }

    /// At most one handoff per `handoff_interval`; `force` bypasses the
    /// interval. Writes nothing outside smart mode.
    pub fn create_handoff_if_needed_at(
        &mut self,
        force: bool,
        now: DateTime<Utc>,
    ) -> Option<PathBuf> {
        let smart = self.smart.as_ref()?;
        if !force
            && let Some(last) = smart.last_handoff
            && now - last < smart.handoff_interval
        {
            return None;
        }

        let latest = match smart.ledger.latest_entry() {
            Ok(entry) => entry,
            Err(err) => {
                self.warn(WarnEvent {
                    code: "LEDGER_READ_FAILED",
                    stage: "handoff",
                    action: "latest-entry",
                    file: "na",
                    reason: "no-entry",
                    err: &format!("{err:#}"),
                });
                return None;
            }
        };

        let retained = retain(&latest.facts, &smart.compressor, &smart.stale, now);

        let summary = latest.summary();
        let path =
            match smart
                .ledger
                .create_handoff_at(&self.session_id, &summary, &retained, now)
            {
                Ok(path) => path,
                Err(err) => {
                    // Handoff failures are reported even outside verbose mode.
                    warn::emit(WarnEvent {
                        code: "HANDOFF_FAILED",
                        stage: "handoff",
                        action: "create-handoff",
                        file: "na",
                        reason: "io-error",
                        err: &format!("{err:#}"),
                    });
                    return None;
                }
            };

        if let Some(smart) = self.smart.as_mut() {
            smart.last_handoff = Some(now);
        }
        self.stats.handoffs += 1;

        if self.cfg.verbose || force {
            log::info!(
                "handoff created: {} ({}; tokens: {}, facts: {})",
                path.display(),
                summary,
                latest.token_count,
                retained.len()
            );
        }

        let session = SessionRecord {
            project: self.cfg.project_id.clone(),
            summary,
            token_count: latest.token_count,
            session_start: self.started_at,
            session_end: now,
        };
        if let Err(err) = self.store.create_session(&session) {
            self.warn(WarnEvent {
                code: "SESSION_PUSH_FAILED",
                stage: "handoff",
                action: "create-session",
                file: "na",
                reason: "store-error",
                err: &format!("{err:#}"),
            });
        }

        Some(path)
    }

    /// Final step before the subscription closes.
    pub fn shutdown(&mut self) -> Option<PathBuf> {
        self.create_handoff_if_needed(true)
    }

    /// Drain messages until shutdown or until every sender is gone. Each
    /// message is handled to completion before the next is read.
    pub fn run(&mut self, rx: &Receiver<WatchMessage>) {
        while let Ok(message) = rx.recv() {
            match message {
                WatchMessage::Fs(Ok(event)) => self.handle_event(event),
                WatchMessage::Fs(Err(err)) => {
                    log::warn!("watcher error: {err}");
                }
                WatchMessage::Shutdown => {
                    log::info!("shutting down");
                    break;
                }
            }
        }
    }
}

/// Subscribe to modify events in `dir`, forwarding them into `tx`.
pub fn subscribe(dir: &Path, tx: Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let mut fs_watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(WatchMessage::Fs(res));
    })
    .context("failed to initialize filesystem watcher")?;
    fs_watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;
    Ok(fs_watcher)
}

#[derive(Debug, Clone)]
pub struct WatchRunOutcome {
    pub session_id: String,
    pub swept_files: usize,
    pub current_tokens: u64,
    pub stats: WatchStats,
    pub final_handoff: Option<PathBuf>,
}

/// Idle/Processing/Stopped lifecycle: subscribe, sweep existing files, loop
/// over events until Ctrl-C, then write the forced handoff and unsubscribe.
/// With `once`, the loop is skipped and no subscription is made.
pub fn run<S: RecordStore>(mut watcher: Watcher<S>, once: bool) -> Result<WatchRunOutcome> {
    let (tx, rx) = mpsc::channel::<WatchMessage>();
    let subscription = if once {
        None
    } else {
        Some(subscribe(&watcher.log_dir, tx.clone())?)
    };

    let swept_files = match watcher.sweep_existing() {
        Ok(n) => n,
        Err(err) => {
            log::warn!("failed to process existing logs: {err:#}");
            0
        }
    };

    if subscription.is_some() {
        let shutdown_tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = shutdown_tx.send(WatchMessage::Shutdown);
        })
        .context("failed to install shutdown handler")?;
        log::info!(
            "watching {} (session {})",
            watcher.log_dir.display(),
            watcher.session_id
        );
        drop(tx);
        watcher.run(&rx);
    }

    let final_handoff = watcher.shutdown();
    drop(subscription);

    Ok(WatchRunOutcome {
        session_id: watcher.session_id.clone(),
        swept_files,
        current_tokens: watcher.current_tokens,
        stats: watcher.stats.clone(),
        final_handoff,
    })
}
