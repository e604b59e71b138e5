use anyhow::Result;
use async_trait::async_trait;

use crate::error::GatewayError;
use crate::models::{
    AccountCreateResult, AccountRecord, ChatTarget, OrderRequest, PaymentArtifact,
    PaymentStatusResult,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotificationParseMode {
    #[default]
    Plain,
    Html,
}

/// Escapes text interpolated into an `Html` message.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Outgoing side of the chat transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(
        &self,
        chat: ChatTarget,
        text: &str,
        parse_mode: NotificationParseMode,
    ) -> Result<()>;

    /// Send an image by URL with a caption (max 1024 chars on Telegram)
    async fn send_photo(&self, chat: ChatTarget, image_url: &str, caption: &str) -> Result<()>;

    /// Acknowledge an interactive button press
    async fn answer(&self, interaction_token: &str) -> Result<()>;
}

/// VPN account backend.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    async fn create(&self, password: &str, days: u32)
    -> Result<AccountCreateResult, GatewayError>;

    async fn renew(&self, password: &str, days: u32) -> Result<AccountCreateResult, GatewayError>;

    async fn delete(&self, password: &str) -> Result<(), GatewayError>;

    async fn list(&self) -> Result<Vec<AccountRecord>, GatewayError>;
}

/// Payment backend able to create an order and report its settlement.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: &OrderRequest) -> Result<PaymentArtifact, GatewayError>;

    async fn status(&self, order_id: &str) -> Result<PaymentStatusResult, GatewayError>;

    fn name(&self) -> &str;
}
