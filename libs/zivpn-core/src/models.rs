use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a chat participant (Telegram user id).
pub type Identity = i64;

/// Destination for outgoing notifications.
pub type ChatTarget = i64;

/// Account as reported by the VPN backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    #[serde(default)]
    pub host: String,
    pub password: String,
    pub expired: String,
    #[serde(default)]
    pub status: String,
}

impl AccountRecord {
    /// Parses `expired`. A date without time expires at the end of that day.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        parse_expiry(&self.expired)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> Option<bool> {
        self.expires_at().map(|at| at <= now)
    }
}

pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
}

/// Result of a create or renew call on the VPN backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreateResult {
    pub password: String,
    pub expired: String,
}

/// What the user is shown once an account exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub password: String,
    pub expired: String,
    pub days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRequest {
    pub project: String,
    pub order_id: String,
    pub amount: u64,
    pub method: String,
}

/// Payable artifact returned by the gateway, e.g. a QRIS image URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentArtifact {
    pub qris_image: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentStatusResult {
    pub settled: bool,
}
