use crate::error::MonitorError;
use crate::monitor::compress::DEFAULT_MAX_FACTS_PER_TYPE;
use crate::monitor::paths::default_log_dir;
use crate::monitor::thresholds::DEFAULT_COMPACT_THRESHOLD;
use crate::store::http::{DEFAULT_STORE_URL, DEFAULT_TIMEOUT_SECS};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_HANDOFF_INTERVAL_SECS: u64 = 30 * 60;
pub const MAX_HANDOFF_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub log_dir: Option<PathBuf>,
    pub project_id: String,
    pub repo_root: Option<PathBuf>,
    pub smart_mode: bool,
    pub compact_threshold: u64,
    pub handoff_interval_secs: u64,
    pub max_facts_per_type: usize,
    /// Extensions swept at startup; empty means every regular file.
    pub extensions: Vec<String>,
    pub verbose: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            project_id: String::new(),
            repo_root: None,
            smart_mode: true,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            handoff_interval_secs: DEFAULT_HANDOFF_INTERVAL_SECS,
            max_facts_per_type: DEFAULT_MAX_FACTS_PER_TYPE,
            extensions: vec!["log".to_string()],
            verbose: false,
        }
    }
}

impl WatcherConfig {
    pub fn resolved_log_dir(&self) -> Option<PathBuf> {
        self.log_dir.clone().or_else(default_log_dir)
    }

    pub fn resolved_repo_root(&self) -> Result<PathBuf> {
        match &self.repo_root {
            Some(root) => Ok(root.clone()),
            None => env::current_dir()
                .map_err(|err| anyhow!("failed to resolve current directory: {err}")),
        }
    }

    pub fn sweeps(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STORE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrackerConfig {
    pub watcher: WatcherConfig,
    pub store: StoreConfig,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Some(custom) = env_path("CTX_CONFIG_PATH") {
        return Some(custom);
    }
    Some(dirs::config_dir()?.join("ctx-tracker").join("ctx.toml"))
}

fn parse_config_file(path: &Path) -> Result<TrackerConfig> {
    let raw = fs::read_to_string(path)?;
    toml::from_str(&raw).map_err(|err| {
        MonitorError::InvalidConfig(format!("failed to parse {}: {err}", path.display())).into()
    })
}

fn apply_env(cfg: &mut TrackerConfig) {
    let w = &mut cfg.watcher;
    if let Some(dir) = env_path("CTX_LOG_DIR") {
        w.log_dir = Some(dir);
    }
    if let Some(root) = env_path("CTX_REPO_ROOT") {
        w.repo_root = Some(root);
    }
    w.project_id = env_or_string("CTX_PROJECT_ID", &w.project_id);
    w.smart_mode = env_or_bool("CTX_SMART_MODE", w.smart_mode);
    w.compact_threshold = env_or_u64("CTX_COMPACT_THRESHOLD", w.compact_threshold);
    w.handoff_interval_secs = env_or_u64("CTX_HANDOFF_INTERVAL_SECS", w.handoff_interval_secs);
    w.max_facts_per_type =
        env_or_u64("CTX_MAX_FACTS_PER_TYPE", w.max_facts_per_type as u64) as usize;
    w.verbose = env_or_bool("CTX_VERBOSE", w.verbose);

    cfg.store.url = env_or_string("CTX_STORE_URL", &cfg.store.url);
    cfg.store.timeout_secs = env_or_u64("CTX_STORE_TIMEOUT_SECS", cfg.store.timeout_secs);
}

pub fn validate(cfg: &TrackerConfig) -> Result<()> {
    if cfg.watcher.compact_threshold == 0 {
        return Err(MonitorError::InvalidConfig(
            "compact_threshold must be >= 1".to_string(),
        )
        .into());
    }
    if cfg.watcher.max_facts_per_type == 0 {
        return Err(MonitorError::InvalidConfig(
            "max_facts_per_type must be >= 1".to_string(),
        )
        .into());
    }
    if !(1..=MAX_HANDOFF_INTERVAL_SECS).contains(&cfg.watcher.handoff_interval_secs) {
        return Err(MonitorError::InvalidConfig(format!(
            "handoff_interval_secs must be between 1 and {MAX_HANDOFF_INTERVAL_SECS}"
        ))
        .into());
    }
    if cfg.store.url.trim().is_empty() {
        return Err(MonitorError::InvalidConfig("store url cannot be empty".to_string()).into());
    }
    Ok(())
}

/// Defaults, then the TOML file, then `CTX_*` environment overrides.
/// Command-line flags are layered on top by the caller.
pub fn load_config() -> Result<TrackerConfig> {
    let mut cfg = match resolve_config_path() {
        Some(path) if path.exists() => parse_config_file(&path)?,
        _ => TrackerConfig::default(),
    };
    apply_env(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
