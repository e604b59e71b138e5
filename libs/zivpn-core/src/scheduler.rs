use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info, warn};

use crate::capabilities::{AccountProvider, NotificationParseMode, Notifier};
use crate::config::LifecycleSettings;
use crate::error::Result;
use crate::models::ChatTarget;
use crate::snapshot::SnapshotStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
    /// Records whose expiry could not be parsed; left untouched.
    pub unparsable: usize,
}

/// Expiry sweep and periodic backups, independent of chat traffic.
pub struct LifecycleScheduler {
    accounts: Arc<dyn AccountProvider>,
    notifier: Arc<dyn Notifier>,
    snapshots: SnapshotStore,
    settings: LifecycleSettings,
    operator_chat: Option<ChatTarget>,
}

impl LifecycleScheduler {
    pub fn new(
        accounts: Arc<dyn AccountProvider>,
        notifier: Arc<dyn Notifier>,
        settings: LifecycleSettings,
        operator_chat: Option<ChatTarget>,
    ) -> Self {
        let snapshots = SnapshotStore::new(settings.backup_dir.clone(), settings.backup_retention);
        Self {
            accounts,
            notifier,
            snapshots,
            settings,
            operator_chat,
        }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Starts the sweep and backup loops. Both run their first pass immediately.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let sweeper = self.clone();
        let sweep = tokio::spawn(async move {
            info!(
                "Expiry sweep running every {:?}",
                sweeper.settings.sweep_interval
            );
            let mut ticker = ticker(sweeper.settings.sweep_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = sweeper.sweep_expired(Utc::now()).await {
                    warn!("Expiry sweep skipped: {}", e);
                }
            }
        });

        let backup = tokio::spawn(async move {
            info!(
                "Auto backup running every {:?}",
                self.settings.backup_interval
            );
            let mut ticker = ticker(self.settings.backup_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.take_snapshot(Utc::now()).await {
                    error!("Auto backup failed: {}", e);
                    self.notify_operator(&format!("❌ Auto backup failed: {}", e))
                        .await;
                }
            }
        });

        vec![sweep, backup]
    }

    /// Deletes every account whose expiry is at or before `now`.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let accounts = self.accounts.list().await?;
        let mut report = SweepReport::default();

        for account in accounts {
            match account.is_expired(now) {
                Some(true) => {}
                Some(false) => continue,
                None => {
                    warn!(
                        "Cannot parse expiry '{}' of account {}",
                        account.expired, account.password
                    );
                    report.unparsable += 1;
                    continue;
                }
            }

            match self.accounts.delete(&account.password).await {
                Ok(()) => {
                    info!(
                        "Deleted expired account {} (expired {})",
                        account.password, account.expired
                    );
                    self.notify_operator(&format!(
                        "🗑️ Expired account deleted\nPassword: {}\nExpired: {}",
                        account.password, account.expired
                    ))
                    .await;
                    report.deleted.push(account.password);
                }
                Err(e) => {
                    warn!("Failed to delete expired account {}: {}", account.password, e);
                    report.failed.push(account.password);
                }
            }
        }

        Ok(report)
    }

    pub async fn take_snapshot(&self, now: DateTime<Utc>) -> Result<PathBuf> {
        let accounts = self.accounts.list().await?;
        let path = self.snapshots.write(&accounts, now).await?;
        self.notify_operator(&format!(
            "💾 Backup complete: {} accounts\nFile: {}",
            accounts.len(),
            path.display()
        ))
        .await;
        Ok(path)
    }

    async fn notify_operator(&self, text: &str) {
        let Some(chat) = self.operator_chat else {
            return;
        };
        if let Err(e) = self
            .notifier
            .send_text(chat, text, NotificationParseMode::Plain)
            .await
        {
            warn!("Failed to notify operator: {}", e);
        }
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
