use crate::error::MonitorError;
use crate::monitor::facts::{Fact, FactType};
use crate::monitor::util::SESSION_ID_FORMAT;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LEDGER_PREFIX: &str = "CONTINUITY_";
const LEDGER_SUFFIX: &str = ".jsonl";
const MAX_HANDOFF_SUFFIX: u32 = 100;

/// One processing cycle's snapshot. The string lists are projections of
/// `facts` and are only ever filled by [`LedgerEntry::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub project_id: String,
    pub token_count: u64,
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub file_changes: Vec<String>,
}

fn contents_of(facts: &[Fact], fact_type: FactType) -> Vec<String> {
    facts
        .iter()
        .filter(|f| f.fact_type == fact_type)
        .map(|f| f.content.clone())
        .collect()
}

impl LedgerEntry {
    pub fn new(
        session_id: impl Into<String>,
        project_id: impl Into<String>,
        token_count: u64,
        facts: Vec<Fact>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            session_id: session_id.into(),
            project_id: project_id.into(),
            token_count,
            decisions: contents_of(&facts, FactType::Decision),
            next_steps: contents_of(&facts, FactType::Todo),
            blockers: contents_of(&facts, FactType::Blocker),
            file_changes: contents_of(&facts, FactType::FileChange),
            facts,
            context: BTreeMap::new(),
        }
    }

    /// One-line description of what the cycle touched.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.decisions.is_empty() {
            parts.push("Made architectural decisions.");
        }
        if !self.blockers.is_empty() {
            parts.push("Encountered blockers.");
        }
        if !self.file_changes.is_empty() {
            parts.push("Modified codebase.");
        }
        if parts.is_empty() {
            return "Continued development work.".to_string();
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone)]
pub struct ContinuityLedger {
    project_id: String,
    ledger_dir: PathBuf,
    handoff_dir: PathBuf,
}

pub fn ledger_file_name(day: NaiveDate) -> String {
    format!("{LEDGER_PREFIX}{}{LEDGER_SUFFIX}", day.format("%Y-%m-%d"))
}

fn is_ledger_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(LEDGER_PREFIX) && n.ends_with(LEDGER_SUFFIX))
}

fn ensure_dir(dir: &Path) -> Result<(), MonitorError> {
    fs::create_dir_all(dir).map_err(|source| MonitorError::LedgerDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Session ids become part of a handoff file name, so they must stay a single
/// path component.
pub fn validate_session_id(session_id: &str) -> Result<(), MonitorError> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if session_id.is_empty() || session_id.contains("..") || !session_id.chars().all(allowed) {
        return Err(MonitorError::InvalidSessionId(session_id.to_string()));
    }
    Ok(())
}

impl ContinuityLedger {
    /// Create (idempotently) `thoughts/ledgers` and `thoughts/shared/handoffs`
    /// under `thoughts_root`.
    pub fn open(project_id: impl Into<String>, thoughts_root: &Path) -> Result<Self, MonitorError> {
        let ledger_dir = thoughts_root.join("ledgers");
        let handoff_dir = thoughts_root.join("shared").join("handoffs");
        ensure_dir(&ledger_dir)?;
        ensure_dir(&handoff_dir)?;
        Ok(Self {
            project_id: project_id.into(),
            ledger_dir,
            handoff_dir,
        })
    }

    pub fn ledger_dir(&self) -> &Path {
        &self.ledger_dir
    }

    pub fn handoff_dir(&self) -> &Path {
        &self.handoff_dir
    }

    pub fn append_entry(&self, entry: &LedgerEntry) -> Result<PathBuf> {
        self.append_entry_on(entry, Utc::now().date_naive())
    }

    pub(crate) fn append_entry_on(&self, entry: &LedgerEntry, day: NaiveDate) -> Result<PathBuf> {
        let path = self.ledger_dir.join(ledger_file_name(day));
        let line = format!("{}\n", serde_json::to_string(entry)?);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append {}", path.display()))?;
        Ok(path)
    }

    /// Ledger files sorted by name, which is chronological.
    pub fn ledger_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = fs::read_dir(&self.ledger_dir)
            .with_context(|| format!("failed to read {}", self.ledger_dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_ledger_file(p))
            .collect::<Vec<_>>();
        files.sort();
        Ok(files)
    }

    pub fn latest_entry(&self) -> Result<LedgerEntry> {
        let files = self.ledger_files()?;
        let Some(latest) = files.last() else {
            return Err(MonitorError::NoLedgerEntries(self.ledger_dir.clone()).into());
        };

        let raw = fs::read_to_string(latest)
            .with_context(|| format!("failed to read {}", latest.display()))?;
        let Some(line) = raw.lines().rev().find(|l| !l.trim().is_empty()) else {
            return Err(MonitorError::EmptyLedgerFile(latest.clone()).into());
        };

        serde_json::from_str(line)
            .with_context(|| format!("failed to parse last entry of {}", latest.display()))
    }

    /// Every entry in file order. Malformed lines are skipped and reported
    /// back as (file, line number) pairs.
    pub fn read_entries(&self) -> Result<(Vec<LedgerEntry>, Vec<(PathBuf, usize)>)> {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        for file in self.ledger_files()? {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            for (idx, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LedgerEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    Err(_) => skipped.push((file.clone(), idx + 1)),
                }
            }
        }
        Ok((entries, skipped))
    }

    pub fn create_handoff(&self, session_id: &str, summary: &str, facts: &[Fact]) -> Result<PathBuf> {
        self.create_handoff_at(session_id, summary, facts, Utc::now())
    }

    /// Write-once: an existing handoff is never touched. A second handoff in
    /// the same second gets a `-N` suffix.
    pub fn create_handoff_at(
        &self,
        session_id: &str,
        summary: &str,
        facts: &[Fact],
        at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        let stem = format!("handoff_{}_{}", session_id, at.format(SESSION_ID_FORMAT));
        let body = render_handoff(session_id, &self.project_id, summary, facts, at);

        for attempt in 0..MAX_HANDOFF_SUFFIX {
            let name = if attempt == 0 {
                format!("{stem}.md")
            } else {
                format!("{stem}-{attempt}.md")
            };
            let path = self.handoff_dir.join(name);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to create handoff {}", path.display()));
                }
            };
            file.write_all(body.as_bytes())
                .with_context(|| format!("failed to write handoff {}", path.display()))?;
            return Ok(path);
        }
        anyhow::bail!(
            "too many handoffs named {stem} in {}",
            self.handoff_dir.display()
        )
    }
}

pub fn render_handoff(
    session_id: &str,
    project_id: &str,
    summary: &str,
    facts: &[Fact],
    at: DateTime<Utc>,
) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Session Handoff\n");
    let _ = writeln!(md, "**Session ID**: {session_id}");
    let _ = writeln!(
        md,
        "**Timestamp**: {}",
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let _ = writeln!(md, "**Project**: {project_id}\n");
    let _ = writeln!(md, "## Summary\n{summary}\n");

    let _ = writeln!(md, "## Key Facts");
    for fact in facts {
        let _ = writeln!(
            md,
            "- [{}] {} (importance: {})",
            fact.fact_type, fact.content, fact.importance
        );
    }

    let _ = writeln!(md, "\n## Next Steps");
    for fact in facts.iter().filter(|f| f.fact_type == FactType::Todo) {
        let _ = writeln!(md, "- [ ] {}", fact.content);
    }

    let _ = writeln!(md, "\n## Blockers");
    for fact in facts.iter().filter(|f| f.fact_type == FactType::Blocker) {
        let _ = writeln!(md, "- ⚠️ {}", fact.content);
    }
    md
}
