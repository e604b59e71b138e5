//! Tunables for the provisioning engine.

use std::path::PathBuf;
use std::time::Duration;

/// Pricing and trial policy.
#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    /// Price of one day in the gateway currency (IDR).
    pub unit_price: u64,
    /// Smallest purchasable day count.
    pub min_days: u32,
    pub trial_days: u32,
    /// Length of generated trial passwords.
    pub password_length: usize,
    /// Gateway project slug.
    pub payment_project: String,
    /// Gateway payment method, e.g. `qris`.
    pub payment_method: String,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            unit_price: 334,
            min_days: 7,
            trial_days: 1,
            password_length: 8,
            payment_project: "zivpn_pay".to_string(),
            payment_method: "qris".to_string(),
        }
    }
}

/// Settlement polling cadence.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollSettings {
    /// Upper bound of the polling window.
    pub fn window(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

/// Background maintenance.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub sweep_interval: Duration,
    pub backup_interval: Duration,
    pub backup_dir: PathBuf,
    /// Number of snapshots kept after pruning.
    pub backup_retention: usize,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            backup_interval: Duration::from_secs(3 * 60 * 60),
            backup_dir: PathBuf::from("/etc/zivpn/backups"),
            backup_retention: 8,
        }
    }
}
