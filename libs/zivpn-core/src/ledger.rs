use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{ProvisionError, Result};
use crate::models::Identity;

#[derive(Default)]
struct LedgerState {
    granted: HashSet<Identity>,
    /// Trials whose account creation is still in flight.
    pending: HashSet<Identity>,
    /// File does not end with a newline yet.
    unterminated: bool,
}

/// Append-only record of identities that consumed their trial.
#[derive(Clone)]
pub struct TrialLedger {
    path: PathBuf,
    state: Arc<RwLock<LedgerState>>,
}

impl TrialLedger {
    /// Reads the ledger file, one identity per line. A missing file is an empty ledger.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut granted = HashSet::new();
        let mut unterminated = false;

        match fs::read_to_string(&path).await {
            Ok(content) => {
                unterminated = !content.is_empty() && !content.ends_with('\n');
                for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    match line.parse::<Identity>() {
                        Ok(id) => {
                            granted.insert(id);
                        }
                        Err(e) => warn!("Skipping malformed trial ledger line '{}': {}", line, e),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Trial ledger {} not found, starting empty", path.display());
            }
            Err(e) => return Err(e.into()),
        }

        info!("Loaded {} trial users from {}", granted.len(), path.display());

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(LedgerState {
                granted,
                pending: HashSet::new(),
                unterminated,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn has_trial(&self, identity: Identity) -> bool {
        self.state.read().await.granted.contains(&identity)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.granted.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Claims the trial for the duration of the account creation call.
    pub async fn reserve_trial(&self, identity: Identity) -> Result<()> {
        let mut state = self.state.write().await;
        if state.granted.contains(&identity) {
            return Err(ProvisionError::TrialAlreadyUsed);
        }
        if !state.pending.insert(identity) {
            return Err(ProvisionError::TrialInProgress);
        }
        Ok(())
    }

    pub async fn release_trial(&self, identity: Identity) {
        self.state.write().await.pending.remove(&identity);
    }

    /// Records the grant. Check, insert and append happen under one write lock.
    ///
    /// A failed append still leaves the grant in memory, so the process keeps
    /// refusing a second trial; the error reports that the file is behind.
    pub async fn grant_trial(&self, identity: Identity) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.granted.insert(identity) {
            return Err(ProvisionError::AlreadyGranted);
        }
        state.pending.remove(&identity);

        let line = if state.unterminated {
            format!("\n{}\n", identity)
        } else {
            format!("{}\n", identity)
        };
        self.append(&line).await?;
        state.unterminated = false;
        info!("Trial granted to {}", identity);
        Ok(())
    }

    async fn append(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
