use std::path::{Path, PathBuf};

/// Filesystem locations one watcher instance works with.
#[derive(Debug, Clone)]
pub struct TrackerPaths {
    pub log_dir: PathBuf,
    pub repo_root: PathBuf,
    pub thoughts_dir: PathBuf,
}

impl TrackerPaths {
    pub fn new(log_dir: PathBuf, repo_root: PathBuf) -> Self {
        let thoughts_dir = thoughts_dir_for(&repo_root);
        Self {
            log_dir,
            repo_root,
            thoughts_dir,
        }
    }
}

pub fn thoughts_dir_for(repo_root: &Path) -> PathBuf {
    repo_root.join("thoughts")
}

fn log_dir_candidates(home: &Path) -> Vec<PathBuf> {
    vec![
        home.join(".claude").join("logs"),
        home.join(".config").join("claude").join("logs"),
        home.join("Library")
            .join("Application Support")
            .join("Claude")
            .join("logs"),
    ]
}

fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|p| p.is_dir())
}

/// First known assistant log location that exists under the home directory.
pub fn default_log_dir() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    first_existing(log_dir_candidates(&home))
}
