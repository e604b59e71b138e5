//! Account provisioning engine for the ZiVPN bot: trial ledger, conversation
//! flows, payment order polling and background account maintenance.

pub mod capabilities;
pub mod config;
pub mod conversation;
pub mod error;
pub mod ledger;
pub mod models;
pub mod payment;
pub mod scheduler;
pub mod snapshot;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use capabilities::{AccountProvider, NotificationParseMode, Notifier, PaymentGateway};
pub use error::{GatewayError, ProvisionError};
pub use models::{AccountRecord, ChatTarget, Identity};
