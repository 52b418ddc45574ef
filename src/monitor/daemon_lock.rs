use crate::error::MonitorError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const DAEMON_LOCK_FILE: &str = "ctx-watch.daemon.lock";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonLockPayload {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub project_id: String,
}

/// Exclusive lock held for the daemon's lifetime; released on drop.
#[derive(Debug)]
pub struct DaemonLock {
    path: PathBuf,
    _file: File,
}

impl DaemonLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn daemon_lock_path(thoughts_dir: &Path) -> PathBuf {
    thoughts_dir.join(DAEMON_LOCK_FILE)
}

pub fn acquire(thoughts_dir: &Path, project_id: &str) -> Result<DaemonLock> {
    fs::create_dir_all(thoughts_dir)
        .with_context(|| format!("failed to create {}", thoughts_dir.display()))?;

    let lock_path = daemon_lock_path(thoughts_dir);
    let mut lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("failed to open daemon lock {}", lock_path.display()))?;

    match lock_file.try_lock_exclusive() {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::WouldBlock => {
            return Err(MonitorError::DaemonAlreadyRunning(lock_path).into());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to lock daemon file {}", lock_path.display()));
        }
    }

    let payload = DaemonLockPayload {
        pid: std::process::id(),
        started_at: Utc::now(),
        project_id: project_id.to_string(),
    };
    lock_file
        .set_len(0)
        .with_context(|| format!("failed to truncate daemon lock {}", lock_path.display()))?;
    writeln!(&mut lock_file, "{}", serde_json::to_string(&payload)?)
        .with_context(|| format!("failed to write daemon lock {}", lock_path.display()))?;

    Ok(DaemonLock {
        path: lock_path,
        _file: lock_file,
    })
}

pub fn read_payload(thoughts_dir: &Path) -> Result<Option<DaemonLockPayload>> {
    let lock_path = daemon_lock_path(thoughts_dir);
    if !lock_path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&lock_path)
        .with_context(|| format!("failed to read daemon lock {}", lock_path.display()))?;
    Ok(serde_json::from_str(raw.trim()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_is_rejected_while_held() {
        let tmp = tempdir().expect("tempdir");
        let lock = acquire(tmp.path(), "p1").expect("first lock");
        let err = acquire(tmp.path(), "p1").expect_err("already held");
        assert!(matches!(
            err.downcast_ref::<MonitorError>(),
            Some(MonitorError::DaemonAlreadyRunning(_))
        ));

        let payload = read_payload(tmp.path()).expect("read").expect("payload");
        assert_eq!(payload.pid, std::process::id());
        assert_eq!(payload.project_id, "p1");

        drop(lock);
        acquire(tmp.path(), "p1").expect("reacquire after release");
    }
}
