use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("log directory does not exist: {0}")]
    LogDirMissing(PathBuf),
    #[error("failed to create ledger directory {path}: {source}")]
    LedgerDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no ledger files found in {0}")]
    NoLedgerEntries(PathBuf),
    #[error("ledger file has no entries: {0}")]
    EmptyLedgerFile(PathBuf),
    #[error("watcher daemon already running (lock: {0})")]
    DaemonAlreadyRunning(PathBuf),
    #[error("record store request failed: {0}")]
    Store(String),
    #[error("config invalid: {0}")]
    InvalidConfig(String),
    #[error("invalid session id {0:?}: use letters, digits, '-', '_' or '.'")]
    InvalidSessionId(String),
    #[error("unknown fact type: {0}")]
    UnknownFactType(String),
}
