//! Timestamped JSON backups of the account list.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{info, warn};

use crate::error::{ProvisionError, Result};
use crate::models::AccountRecord;

const PREFIX: &str = "zivpn-backup-";
const SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    retention: usize,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            dir: dir.into(),
            retention: retention.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(at: DateTime<Utc>) -> String {
        format!("{}{}{}", PREFIX, at.format("%Y%m%d-%H%M%S"), SUFFIX)
    }

    /// Writes the snapshot, then prunes older files beyond the retention count.
    pub async fn write(&self, records: &[AccountRecord], at: DateTime<Utc>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(Self::file_name(at));
        let body = serde_json::to_vec_pretty(records)
            .map_err(|e| ProvisionError::Snapshot(e.to_string()))?;
        fs::write(&path, body).await?;
        info!(
            "Backup written to {} ({} accounts)",
            path.display(),
            records.len()
        );

        match self.prune().await {
            Ok(0) => {}
            Ok(n) => info!("Pruned {} old backups", n),
            Err(e) => warn!("Failed to prune backups in {}: {}", self.dir.display(), e),
        }

        Ok(path)
    }

    /// Snapshot files, oldest first.
    pub async fn list(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(PREFIX) && name.ends_with(SUFFIX) {
                files.push(entry.path());
            }
        }
        // Timestamps are zero-padded, so name order is time order.
        files.sort();
        Ok(files)
    }

    async fn prune(&self) -> Result<usize> {
        let files = self.list().await?;
        let excess = files.len().saturating_sub(self.retention);
        for path in &files[..excess] {
            fs::remove_file(path).await?;
        }
        Ok(excess)
    }
}

pub fn parse_snapshot(bytes: &[u8]) -> Result<Vec<AccountRecord>> {
    serde_json::from_slice(bytes).map_err(|e| ProvisionError::Snapshot(e.to_string()))
}
