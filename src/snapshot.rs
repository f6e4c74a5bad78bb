// src/snapshot.rs
//! Flat-file snapshot of the last successful aggregation: a JSON array of
//! `CanonicalTrial`, replaced wholesale on every save (last writer wins).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::CanonicalTrial;

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

/// File facts for the dashboard sidebar.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SnapshotInfo {
    pub path: String,
    pub exists: bool,
    pub bytes: u64,
    pub records: Option<usize>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the snapshot. Writes a sibling temp file first, then renames it over.
    pub fn save(&self, trials: &[CanonicalTrial]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating snapshot dir {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(trials).context("serializing snapshot")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing snapshot {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), records = trials.len(), "snapshot saved");
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<CanonicalTrial>> {
        let s = fs::read_to_string(&self.path)
            .with_context(|| format!("reading snapshot {}", self.path.display()))?;
        let trials = serde_json::from_str(&s)
            .with_context(|| format!("parsing snapshot {}", self.path.display()))?;
        Ok(trials)
    }

    /// Startup helper: a missing or unreadable snapshot means "nothing yet".
    pub fn load_or_empty(&self) -> Vec<CanonicalTrial> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "no snapshot yet");
            return Vec::new();
        }
        match self.load() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = ?e, "snapshot unreadable; starting empty");
                Vec::new()
            }
        }
    }

    pub fn info(&self) -> SnapshotInfo {
        let meta = fs::metadata(&self.path).ok();
        SnapshotInfo {
            path: self.path.display().to_string(),
            exists: meta.is_some(),
            bytes: meta.map(|m| m.len()).unwrap_or(0),
            records: self.load().ok().map(|v| v.len()),
        }
    }

    /// `info` off the async executor; reading and parsing the file blocks.
    pub async fn info_async(&self) -> SnapshotInfo {
        let store = self.clone();
        match tokio::task::spawn_blocking(move || store.info()).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = ?e, "snapshot info task failed");
                SnapshotInfo {
                    path: self.path.display().to_string(),
                    exists: false,
                    bytes: 0,
                    records: None,
                }
            }
        }
    }
}
