pub mod callback;
pub mod command;

use crate::bot::keyboards::main_menu;
use crate::bot::utils::{format_uptime, format_user_list, format_vps_expiry};
use crate::state::AppState;
use chrono::Utc;
use teloxide::prelude::*;
use tracing::{error, info, warn};
use zivpn_core::conversation::AdminAction;
use zivpn_core::payment::{OrderHandle, OrderOutcome};

const USER_LIST_LIMIT: usize = 60;

async fn reply(bot: &Bot, chat: i64, text: impl Into<String>) {
    let _ = bot
        .send_message(ChatId(chat), text)
        .await
        .map_err(|e| error!("Failed to reply to {}: {}", chat, e));
}

pub(crate) async fn send_menu(bot: &Bot, state: &AppState, identity: i64, chat: i64) {
    let is_admin = state.is_admin(identity).await;
    let text = if is_admin {
        "⚙️ ZiVPN Admin Panel\nChoose an action:".to_string()
    } else {
        format!(
            "👋 Welcome to ZiVPN!\n\n🎁 Free trial: {} day\n💰 Price: Rp {}/day (minimum {} days)",
            state.workflow.settings().trial_days,
            state.workflow.settings().unit_price,
            state.workflow.settings().min_days
        )
    };
    let _ = bot
        .send_message(ChatId(chat), text)
        .reply_markup(main_menu(is_admin))
        .await
        .map_err(|e| error!("Failed to send menu to {}: {}", chat, e));
}

/// Issues the trial on its own task; the workflow reports back to the chat.
pub(crate) async fn start_trial(bot: &Bot, state: &AppState, identity: i64, chat: i64) {
    if state.is_admin(identity).await {
        reply(bot, chat, "ℹ️ Admins create accounts from the panel.").await;
        return;
    }
    let workflow = state.workflow.clone();
    tokio::spawn(async move {
        if let Err(e) = workflow.issue_trial(identity, chat).await {
            info!("Trial for {} not issued: {}", identity, e);
        }
    });
}

pub(crate) async fn start_purchase(state: &AppState, identity: i64, chat: i64) {
    if state.is_admin(identity).await {
        state
            .workflow
            .begin_admin(identity, chat, AdminAction::Create)
            .await;
        return;
    }
    if let Err(e) = state.workflow.begin_paid_purchase(identity, chat).await {
        info!("Purchase for {} not started: {}", identity, e);
    }
}

pub(crate) fn watch_order(handle: OrderHandle) {
    info!("Order {} placed for Rp {}", handle.order_id, handle.amount);
    tokio::spawn(async move {
        match handle.task.await {
            Ok(OrderOutcome::Provisioned { order_id, account }) => {
                info!("Order {} provisioned account {}", order_id, account.password)
            }
            Ok(OrderOutcome::SettledWithoutProvisioning { order_id }) => {
                error!("Order {} paid but no account was created", order_id)
            }
            Ok(OrderOutcome::Expired { order_id }) => info!("Order {} expired", order_id),
            Err(e) => error!("Polling task of order {} failed: {}", handle.order_id, e),
        }
    });
}

pub(crate) async fn system_info(bot: &Bot, state: &AppState, chat: i64) {
    let accounts = match state.accounts.list().await {
        Ok(list) => list.len().to_string(),
        Err(e) => {
            warn!("Cannot list accounts for system info: {}", e);
            "unavailable".to_string()
        }
    };
    let settings = state.workflow.settings();
    let vps = state
        .config
        .read()
        .await
        .vps_expired_date
        .as_deref()
        .map(|raw| format!("\n🖥️ VPS expires: {}", format_vps_expiry(raw, Utc::now())))
        .unwrap_or_default();
    let text = format!(
        "📊 System Info\n━━━━━━━━━━━━━━━━━━━━\n\
         ⏱️ Uptime: {}\n\
         👥 Accounts: {}\n\
         🎁 Trials used: {}\n\
         💰 Price: Rp {}/day\n\
         📅 Minimum purchase: {} days{}",
        format_uptime(Utc::now() - state.started_at),
        accounts,
        state.workflow.ledger().len().await,
        settings.unit_price,
        settings.min_days,
        vps
    );
    reply(bot, chat, text).await;
}

pub(crate) async fn uptime(bot: &Bot, state: &AppState, chat: i64) {
    let text = format!(
        "⏱️ Bot uptime: {}\nActive conversations: {}",
        format_uptime(Utc::now() - state.started_at),
        state.workflow.conversations().active_count().await
    );
    reply(bot, chat, text).await;
}

pub(crate) async fn list_users(bot: &Bot, state: &AppState, chat: i64) {
    let text = match state.accounts.list().await {
        Ok(accounts) => format_user_list(&accounts, USER_LIST_LIMIT),
        Err(e) => format!("❌ Cannot fetch accounts: {}", e),
    };
    reply(bot, chat, text).await;
}

pub(crate) async fn backup_now(bot: &Bot, state: &AppState, chat: i64) {
    match state.scheduler.take_snapshot(Utc::now()).await {
        Ok(path) => reply(bot, chat, format!("💾 Backup saved to {}", path.display())).await,
        Err(e) => {
            error!("Manual backup failed: {}", e);
            reply(bot, chat, format!("❌ Backup failed: {}", e)).await;
        }
    }
}

pub(crate) async fn sweep_now(bot: &Bot, state: &AppState, chat: i64) {
    let text = match state.scheduler.sweep_expired(Utc::now()).await {
        Ok(report) => format!(
            "🧹 Sweep finished\nDeleted: {}\nFailed: {}\nUnparsable expiry: {}",
            report.deleted.len(),
            report.failed.len(),
            report.unparsable
        ),
        Err(e) => format!("❌ Sweep failed: {}", e),
    };
    reply(bot, chat, text).await;
}
