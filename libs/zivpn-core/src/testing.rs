//! In-memory capability fakes for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::capabilities::{AccountProvider, NotificationParseMode, Notifier, PaymentGateway};
use crate::error::GatewayError;
use crate::models::{
    AccountCreateResult, AccountRecord, ChatTarget, OrderRequest, PaymentArtifact,
    PaymentStatusResult,
};

#[derive(Default)]
pub struct FakeAccounts {
    pub created: Mutex<Vec<(String, u32)>>,
    pub renewed: Mutex<Vec<(String, u32)>>,
    pub deleted: Mutex<Vec<String>>,
    pub records: Mutex<Vec<AccountRecord>>,
    pub fail_create: Mutex<bool>,
    pub fail_list: Mutex<bool>,
    pub fail_delete: Mutex<HashSet<String>>,
    /// Artificial latency of `create`, to widen race windows.
    pub create_delay: Mutex<Option<std::time::Duration>>,
}

impl FakeAccounts {
    pub fn with_records(records: Vec<AccountRecord>) -> Self {
        let fake = Self::default();
        *fake.records.lock().unwrap() = records;
        fake
    }

    pub fn created(&self) -> Vec<(String, u32)> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn expiry(days: u32) -> String {
        (Utc::now() + Duration::days(days as i64))
            .format("%Y-%m-%d")
            .to_string()
    }
}

#[async_trait]
impl AccountProvider for FakeAccounts {
    async fn create(
        &self,
        password: &str,
        days: u32,
    ) -> Result<AccountCreateResult, GatewayError> {
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.created
            .lock()
            .unwrap()
            .push((password.to_string(), days));
        if *self.fail_create.lock().unwrap() {
            return Err(GatewayError::Rejected("user already exists".to_string()));
        }
        Ok(AccountCreateResult {
            password: password.to_string(),
            expired: Self::expiry(days),
        })
    }

    async fn renew(&self, password: &str, days: u32) -> Result<AccountCreateResult, GatewayError> {
        self.renewed
            .lock()
            .unwrap()
            .push((password.to_string(), days));
        Ok(AccountCreateResult {
            password: password.to_string(),
            expired: Self::expiry(days),
        })
    }

    async fn delete(&self, password: &str) -> Result<(), GatewayError> {
        if self.fail_delete.lock().unwrap().contains(password) {
            return Err(GatewayError::Transport("connection reset".to_string()));
        }
        self.deleted.lock().unwrap().push(password.to_string());
        self.records
            .lock()
            .unwrap()
            .retain(|r| r.password != password);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AccountRecord>, GatewayError> {
        if *self.fail_list.lock().unwrap() {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Gateway whose status turns settled on a chosen attempt.
#[derive(Default)]
pub struct FakeGateway {
    pub orders: Mutex<Vec<OrderRequest>>,
    pub status_calls: AtomicU32,
    pub settle_on_attempt: Option<u32>,
    /// Attempts (1-based) that fail with a transport error.
    pub failing_attempts: HashSet<u32>,
    pub fail_create: bool,
}

impl FakeGateway {
    pub fn settling_on(attempt: u32) -> Self {
        Self {
            settle_on_attempt: Some(attempt),
            ..Self::default()
        }
    }

    pub fn never_settling() -> Self {
        Self::default()
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: &OrderRequest) -> Result<PaymentArtifact, GatewayError> {
        if self.fail_create {
            return Err(GatewayError::Transport("timed out".to_string()));
        }
        self.orders.lock().unwrap().push(request.clone());
        Ok(PaymentArtifact {
            qris_image: format!("https://qr.example/{}.png", request.order_id),
        })
    }

    async fn status(&self, _order_id: &str) -> Result<PaymentStatusResult, GatewayError> {
        let attempt = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_attempts.contains(&attempt) {
            return Err(GatewayError::Transport("timed out".to_string()));
        }
        Ok(PaymentStatusResult {
            settled: self.settle_on_attempt.is_some_and(|n| attempt >= n),
        })
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text(ChatTarget, String),
    Photo(ChatTarget, String, String),
    Answer(String),
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Sent>>,
    /// Texts in this mode are refused, like a message Telegram cannot parse.
    pub refuse_mode: Mutex<Option<NotificationParseMode>>,
}

impl RecordingNotifier {
    pub fn texts_to(&self, chat: ChatTarget) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Text(c, t) if *c == chat => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn photos(&self) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| matches!(s, Sent::Photo(..)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(
        &self,
        chat: ChatTarget,
        text: &str,
        parse_mode: NotificationParseMode,
    ) -> Result<()> {
        if *self.refuse_mode.lock().unwrap() == Some(parse_mode) {
            anyhow::bail!("can't parse entities");
        }
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Text(chat, text.to_string()));
        Ok(())
    }

    async fn send_photo(&self, chat: ChatTarget, image_url: &str, caption: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Photo(
            chat,
            image_url.to_string(),
            caption.to_string(),
        ));
        Ok(())
    }

    async fn answer(&self, interaction_token: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Answer(interaction_token.to_string()));
        Ok(())
    }
}
