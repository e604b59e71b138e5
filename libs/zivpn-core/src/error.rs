use thiserror::Error;

/// Failure talking to one of the remote backends (VPN API or payment gateway).
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("unexpected response shape: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("trial already used")]
    TrialAlreadyUsed,

    #[error("trial request already in progress")]
    TrialInProgress,

    #[error("trial already granted")]
    AlreadyGranted,

    #[error("a payment is already pending for this user")]
    PurchaseInProgress,

    #[error("no active conversation flow")]
    NoActiveFlow,

    #[error("conversation flow changed concurrently")]
    StaleFlow,

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("order {order_id} settled but the account could not be created")]
    SettlementWithoutProvisioning { order_id: String },

    #[error("order {order_id} expired without payment")]
    OrderExpired { order_id: String },

    #[error("invalid snapshot: {0}")]
    Snapshot(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ProvisionError {
    /// Plain status text safe to show to a non-admin user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ProvisionError::Validation(_) => "❌ Invalid input. Please try again.",
            ProvisionError::TrialAlreadyUsed | ProvisionError::AlreadyGranted => {
                "❌ You have already used your free trial."
            }
            ProvisionError::TrialInProgress => "⏳ Your trial is already being created.",
            ProvisionError::PurchaseInProgress => {
                "⏳ You already have a pending payment. Please complete it or wait for it to expire."
            }
            ProvisionError::NoActiveFlow | ProvisionError::StaleFlow => {
                "Nothing to continue. Use /start to open the menu."
            }
            ProvisionError::Gateway(_) | ProvisionError::Storage(_) => {
                "❌ Service is temporarily unavailable. Please try again later."
            }
            ProvisionError::SettlementWithoutProvisioning { .. } => {
                "⚠️ Your payment was received but the account could not be created. An administrator has been notified."
            }
            ProvisionError::OrderExpired { .. } => "❌ Payment timed out. Please try again.",
            ProvisionError::Snapshot(_) => "❌ The backup file could not be read.",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
