// src/config/app.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{env, fs, path::Path, path::PathBuf};

use crate::ingest::providers::{ctgov, euctr};
use crate::ingest::types::MAX_RECORDS_LIMIT;

pub const ENV_CONFIG_PATH: &str = "WAPYRUS_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/wapyrus.toml";
pub const DEFAULT_JSON_PATH: &str = "config/wapyrus.json";

fn default_ctgov_base_url() -> String {
    ctgov::DEFAULT_BASE_URL.to_string()
}
fn default_euctr_search_url() -> String {
    euctr::DEFAULT_SEARCH_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_keyword() -> String {
    "medtech".to_string()
}
fn default_max_records() -> usize {
    50
}
fn default_snapshot_path() -> PathBuf {
    PathBuf::from("knowledge_base.json")
}
fn default_bind_addr() -> String {
    "127.0.0.1:8501".to_string()
}
fn default_user_agent() -> String {
    euctr::BROWSER_USER_AGENT.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_ctgov_base_url")]
    pub ctgov_base_url: String,
    #[serde(default = "default_euctr_search_url")]
    pub euctr_search_url: String,
    /// Per-request timeout. Clamped to 1..=120.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_keyword")]
    pub default_keyword: String,
    /// Clamped to 1..=500.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Sent to the scraped registry only.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ctgov_base_url: default_ctgov_base_url(),
            euctr_search_url: default_euctr_search_url(),
            timeout_secs: default_timeout_secs(),
            default_keyword: default_keyword(),
            max_records: default_max_records(),
            snapshot_path: default_snapshot_path(),
            bind_addr: default_bind_addr(),
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Load from an explicit path. Supports TOML or JSON (by extension, then by sniffing).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolution order:
    /// 1) $WAPYRUS_CONFIG_PATH (must exist)
    /// 2) config/wapyrus.toml
    /// 3) config/wapyrus.json
    /// 4) built-in defaults
    ///
    /// Env overrides apply in every case.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for p in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
        }
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    /// `path` wins over the default resolution when given (CLI `--config`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(p),
            None => Self::load_default(),
        }
    }

    fn apply_env_overrides(&mut self) {
        let var = |k: &str| env::var(k).ok().filter(|v| !v.trim().is_empty());
        if let Some(v) = var("WAPYRUS_BIND") {
            self.bind_addr = v.trim().to_string();
        }
        if let Some(v) = var("WAPYRUS_SNAPSHOT_PATH") {
            self.snapshot_path = PathBuf::from(v.trim());
        }
        if let Some(v) = var("WAPYRUS_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.timeout_secs = v;
        }
        if let Some(v) = var("WAPYRUS_MAX_RECORDS").and_then(|v| v.trim().parse().ok()) {
            self.max_records = v;
        }
        if let Some(v) = var("WAPYRUS_CTGOV_URL") {
            self.ctgov_base_url = v.trim().to_string();
        }
        if let Some(v) = var("WAPYRUS_EUCTR_URL") {
            self.euctr_search_url = v.trim().to_string();
        }
    }

    fn sanitize(&mut self) {
        self.timeout_secs = self.timeout_secs.clamp(1, 120);
        self.max_records = self.max_records.clamp(1, MAX_RECORDS_LIMIT);
        if self.default_keyword.trim().is_empty() {
            self.default_keyword = default_keyword();
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = default_user_agent();
        }
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AppConfig> {
    if hint_ext == "json" {
        return Ok(serde_json::from_str(s)?);
    }
    if hint_ext == "toml" {
        return Ok(toml::from_str(s)?);
    }
    // Unknown extension: JSON documents start with `{`.
    if s.trim_start().starts_with('{') {
        Ok(serde_json::from_str(s)?)
    } else {
        Ok(toml::from_str(s)?)
    }
}
