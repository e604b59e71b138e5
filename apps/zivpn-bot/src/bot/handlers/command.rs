use crate::bot::handlers::{
    reply, send_menu, start_purchase, start_trial, system_info, watch_order,
};
use crate::bot::utils::{TextRoute, route_text};
use crate::state::AppState;
use chrono::Utc;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::Document;
use tracing::{error, info, warn};
use zivpn_core::conversation::FlowStep;
use zivpn_core::workflow::InputOutcome;

const MAX_BACKUP_BYTES: u32 = 5 * 1024 * 1024;

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let identity = user.id.0 as i64;
    let chat = msg.chat.id.0;

    let private_chat = msg.chat.is_private();

    if let Some(doc) = msg.document() {
        handle_document(&bot, &state, identity, chat, private_chat, doc).await?;
        return Ok(());
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };

    let flow_active = state
        .workflow
        .conversations()
        .current(identity)
        .await
        .is_some();

    match route_text(text, flow_active, private_chat) {
        TextRoute::Command(command, args) => {
            info!("Command /{} from {}", command, identity);
            match command.as_str() {
                "start" | "menu" | "panel" => send_menu(&bot, &state, identity, chat).await,
                "trial" => start_trial(&bot, &state, identity, chat).await,
                "create" => start_purchase(&state, identity, chat).await,
                "info" => system_info(&bot, &state, chat).await,
                "cancel" => {
                    let _ = state.workflow.cancel(identity, chat).await;
                }
                "setgroup" => set_group(&bot, &state, identity, chat, args).await,
                _ if private_chat => reply(&bot, chat, "Unknown command. Use /menu.").await,
                _ => {}
            }
        }
        TextRoute::FlowInput => match state.workflow.handle_input(identity, chat, text).await {
            Ok(InputOutcome::OrderPlaced(handle)) => watch_order(handle),
            Ok(outcome) => info!("Input from {} handled: {:?}", identity, outcome),
            Err(e) => warn!("Input from {} not processed: {}", identity, e),
        },
        TextRoute::Hint => reply(&bot, chat, "Use /menu to see what this bot can do.").await,
        TextRoute::Ignore => {}
    }
    Ok(())
}

async fn handle_document(
    bot: &Bot,
    state: &AppState,
    identity: i64,
    chat: i64,
    private_chat: bool,
    doc: &Document,
) -> Result<(), teloxide::RequestError> {
    let awaiting_restore = matches!(
        state.workflow.conversations().current(identity).await,
        Some(entry) if entry.step == FlowStep::AwaitingRestoreFile
    );
    if !awaiting_restore || !state.is_admin(identity).await {
        if private_chat {
            reply(bot, chat, "Files are only accepted during a backup restore.").await;
        }
        return Ok(());
    }
    if doc.file.size > MAX_BACKUP_BYTES {
        reply(bot, chat, "❌ Backup file is too large.").await;
        return Ok(());
    }

    let file = bot.get_file(doc.file.id.clone()).await?;
    let mut bytes = Vec::new();
    if let Err(e) = bot.download_file(&file.path, &mut bytes).await {
        error!("Failed to download backup {}: {}", file.path, e);
        reply(bot, chat, "❌ Could not download the file, send it again.").await;
        return Ok(());
    }
    info!(
        "Restoring backup {:?} ({} bytes) for {}",
        doc.file_name,
        bytes.len(),
        identity
    );

    if let Err(e) = state
        .workflow
        .restore_snapshot(identity, chat, &bytes, Utc::now())
        .await
    {
        warn!("Restore for {} failed: {}", identity, e);
    }
    Ok(())
}

async fn set_group(bot: &Bot, state: &AppState, identity: i64, chat: i64, args: &str) {
    if !state.is_admin(identity).await {
        reply(bot, chat, "⛔ Admin only.").await;
        return;
    }
    let group_id = match args.parse::<i64>() {
        Ok(id) => id,
        Err(_) => {
            reply(bot, chat, "Usage: /setgroup <chat id>").await;
            return;
        }
    };

    let mut config = state.config.write().await;
    config.notif_group_id = group_id;
    match config.save().await {
        Ok(()) => {
            info!("Notification group set to {}", group_id);
            reply(
                bot,
                chat,
                format!(
                    "✅ Notification group set to {}. Background alerts switch after a restart.",
                    group_id
                ),
            )
            .await;
        }
        Err(e) => {
            error!("Failed to save config: {:#}", e);
            reply(bot, chat, format!("❌ Could not save config: {}", e)).await;
        }
    }
}
