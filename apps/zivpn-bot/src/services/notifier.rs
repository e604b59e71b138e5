use anyhow::Result;
use async_trait::async_trait;
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use zivpn_core::models::ChatTarget;
use zivpn_core::{NotificationParseMode, Notifier};

/// Sends engine notifications through the Telegram bot.
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn telegram_parse_mode(mode: NotificationParseMode) -> Option<ParseMode> {
    match mode {
        NotificationParseMode::Plain => None,
        NotificationParseMode::Html => Some(ParseMode::Html),
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(
        &self,
        chat: ChatTarget,
        text: &str,
        parse_mode: NotificationParseMode,
    ) -> Result<()> {
        let mut req = self.bot.send_message(ChatId(chat), text);
        if let Some(mode) = telegram_parse_mode(parse_mode) {
            req = req.parse_mode(mode);
        }
        req.await?;
        Ok(())
    }

    async fn send_photo(&self, chat: ChatTarget, image_url: &str, caption: &str) -> Result<()> {
        let url = Url::parse(image_url)?;
        self.bot
            .send_photo(ChatId(chat), InputFile::url(url))
            .caption(caption)
            .await?;
        Ok(())
    }

    async fn answer(&self, interaction_token: &str) -> Result<()> {
        self.bot
            .answer_callback_query(teloxide::types::CallbackQueryId(interaction_token.to_owned()))
            .await?;
        Ok(())
    }
}
