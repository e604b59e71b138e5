use crate::config::BotConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use zivpn_core::scheduler::LifecycleScheduler;
use zivpn_core::workflow::ProvisioningWorkflow;
use zivpn_core::{AccountProvider, Notifier};

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<ProvisioningWorkflow>,
    pub accounts: Arc<dyn AccountProvider>,
    pub scheduler: Arc<LifecycleScheduler>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<RwLock<BotConfig>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn is_admin(&self, identity: i64) -> bool {
        self.config.read().await.admin_id == identity
    }
}
