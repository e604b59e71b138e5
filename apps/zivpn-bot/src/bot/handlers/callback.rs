use crate::bot::handlers::{
    backup_now, list_users, reply, start_purchase, start_trial, sweep_now, system_info, uptime,
};
use crate::state::AppState;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{info, warn};
use zivpn_core::conversation::AdminAction;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    info!("Received callback: {:?}", q.data);
    if let Err(e) = state.notifier.answer(&q.id.to_string()).await {
        warn!("Failed to answer callback: {}", e);
    }

    let identity = q.from.id.0 as i64;
    let chat = q
        .message
        .as_ref()
        .map(|m| m.chat().id.0)
        .unwrap_or(identity);
    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };

    match data {
        "trial" => start_trial(&bot, &state, identity, chat).await,
        "create_paid" => start_purchase(&state, identity, chat).await,
        "system_info" => system_info(&bot, &state, chat).await,
        admin_action => {
            if !state.is_admin(identity).await {
                reply(&bot, chat, "⛔ Admin only.").await;
                return Ok(());
            }
            match admin_action {
                "create_user" => {
                    state
                        .workflow
                        .begin_admin(identity, chat, AdminAction::Create)
                        .await
                }
                "delete_user" => {
                    state
                        .workflow
                        .begin_admin(identity, chat, AdminAction::Delete)
                        .await
                }
                "renew_user" => {
                    state
                        .workflow
                        .begin_admin(identity, chat, AdminAction::Renew)
                        .await
                }
                "list_users" => list_users(&bot, &state, chat).await,
                "backup_users" => backup_now(&bot, &state, chat).await,
                "restore_backup" => state.workflow.begin_restore(identity, chat).await,
                "auto_delete" => sweep_now(&bot, &state, chat).await,
                "bot_uptime" => uptime(&bot, &state, chat).await,
                other => warn!("Unknown callback data '{}'", other),
            }
        }
    }
    Ok(())
}
