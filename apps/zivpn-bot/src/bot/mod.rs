use crate::state::AppState;
use teloxide::{dptree, prelude::*, types::Update};
use tracing::{error, info};

pub mod handlers;
pub mod keyboards;
pub mod utils;

pub async fn run_bot(
    bot: Bot,
    mut shutdown_signal: tokio::sync::broadcast::Receiver<()>,
    state: AppState,
) {
    match bot.get_me().await {
        Ok(me) => {
            let username = me.username.clone().unwrap_or("unknown".into());
            info!("Bot connected as: @{}", username);
        }
        Err(e) => {
            error!("CRITICAL: Bot failed to connect to Telegram: {}", e);
            return;
        }
    }

    let handler = Update::filter_message().endpoint(handlers::command::message_handler);
    let callback_handler =
        Update::filter_callback_query().endpoint(handlers::callback::callback_handler);

    let mut dispatcher = Dispatcher::builder(
        bot,
        dptree::entry().branch(handler).branch(callback_handler),
    )
    .dependencies(dptree::deps![state])
    .default_handler(|upd: std::sync::Arc<Update>| async move {
        info!("Unhandled update: {:?}", upd.id);
    })
    .build();

    tokio::select! {
        _ = dispatcher.dispatch() => {
            info!("Bot dispatcher exited naturally");
        }
        _ = shutdown_signal.recv() => {
            info!("Bot received shutdown signal, stopping...");
        }
    }
}
