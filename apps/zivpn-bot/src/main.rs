use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zivpn_core::config::{LifecycleSettings, PollSettings, ProvisioningSettings};
use zivpn_core::conversation::ConversationStore;
use zivpn_core::ledger::TrialLedger;
use zivpn_core::payment::PaymentOrderMonitor;
use zivpn_core::scheduler::LifecycleScheduler;
use zivpn_core::workflow::ProvisioningWorkflow;
use zivpn_core::{AccountProvider, Notifier, PaymentGateway};

mod api_client;
mod bot;
mod config;
mod services;
mod state;

use crate::api_client::ZivpnApiClient;
use crate::config::BotConfig;
use crate::services::notifier::TelegramNotifier;
use crate::services::payment::PakasirGateway;
use crate::state::AppState;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zivpn_bot=info,zivpn_core=info,teloxide=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ZiVPN Bot...");

    let config = BotConfig::load()?;
    tracing::info!("Admin: {}", config.admin_id);
    tracing::info!("ZiVPN API: {}", config.api_url);
    tracing::info!("Payment gateway: {}", config.pakasir_base_url);

    let api_key = config.read_api_key()?;
    let accounts: Arc<dyn AccountProvider> = Arc::new(ZivpnApiClient::new(
        config.api_url.clone(),
        api_key,
        HTTP_TIMEOUT,
    )?);
    let gateway: Arc<dyn PaymentGateway> = Arc::new(PakasirGateway::new(
        config.pakasir_base_url.clone(),
        config.pakasir_api_key.clone(),
        HTTP_TIMEOUT,
    )?);

    let bot = Bot::new(config.bot_token.clone());
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot.clone()));
    let operator_chat = Some(config.operator_chat());

    let settings = ProvisioningSettings {
        payment_project: config.pakasir_project.clone(),
        ..ProvisioningSettings::default()
    };
    let ledger = TrialLedger::load(config.trial_db_file.clone())
        .await
        .context("Failed to load trial ledger")?;
    let conversations = ConversationStore::new();
    let monitor = PaymentOrderMonitor::new(
        gateway.clone(),
        accounts.clone(),
        notifier.clone(),
        conversations.clone(),
        settings.clone(),
        PollSettings::default(),
        operator_chat,
    );
    tracing::info!("Payments through {}", gateway.name());
    let workflow = Arc::new(ProvisioningWorkflow::new(
        accounts.clone(),
        notifier.clone(),
        conversations,
        ledger,
        monitor,
        settings,
    ));

    let scheduler = Arc::new(LifecycleScheduler::new(
        accounts.clone(),
        notifier.clone(),
        LifecycleSettings {
            backup_dir: config.backup_dir.clone(),
            ..LifecycleSettings::default()
        },
        operator_chat,
    ));
    let background = scheduler.clone().spawn();

    let state = AppState {
        workflow,
        accounts,
        scheduler,
        notifier,
        config: Arc::new(RwLock::new(config)),
        started_at: chrono::Utc::now(),
    };

    let (tx, rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(());
        }
    });

    bot::run_bot(bot, rx, state).await;

    for task in background {
        task.abort();
    }
    tracing::info!("ZiVPN Bot stopped");
    Ok(())
}
