//! Payment order creation and settlement polling.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::capabilities::{
    AccountProvider, NotificationParseMode, Notifier, PaymentGateway, escape_html,
};
use crate::config::{PollSettings, ProvisioningSettings};
use crate::conversation::ConversationStore;
use crate::error::{GatewayError, Result};
use crate::models::{AccountSummary, ChatTarget, Identity, OrderRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Created,
    Polling,
    Settled,
    Expired,
    Failed,
}

/// A payable order. Owned by the task that polls it.
#[derive(Debug, Clone)]
pub struct PurchaseOrder {
    pub order_id: String,
    pub identity: Identity,
    pub chat: ChatTarget,
    pub password: String,
    pub requested_days: u32,
    pub amount: u64,
    pub state: OrderState,
}

impl PurchaseOrder {
    fn transition(&mut self, next: OrderState) {
        debug!("Order {}: {:?} -> {:?}", self.order_id, self.state, next);
        self.state = next;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    Provisioned {
        order_id: String,
        account: AccountSummary,
    },
    /// Money moved but no account exists. Needs manual reconciliation.
    SettledWithoutProvisioning { order_id: String },
    Expired { order_id: String },
}

#[derive(Debug)]
pub struct OrderHandle {
    pub order_id: String,
    pub amount: u64,
    pub task: JoinHandle<OrderOutcome>,
}

#[derive(Clone)]
pub struct PaymentOrderMonitor {
    gateway: Arc<dyn PaymentGateway>,
    accounts: Arc<dyn AccountProvider>,
    notifier: Arc<dyn Notifier>,
    conversations: ConversationStore,
    settings: ProvisioningSettings,
    poll: PollSettings,
    operator_chat: Option<ChatTarget>,
}

impl PaymentOrderMonitor {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        accounts: Arc<dyn AccountProvider>,
        notifier: Arc<dyn Notifier>,
        conversations: ConversationStore,
        settings: ProvisioningSettings,
        poll: PollSettings,
        operator_chat: Option<ChatTarget>,
    ) -> Self {
        Self {
            gateway,
            accounts,
            notifier,
            conversations,
            settings,
            poll,
            operator_chat,
        }
    }

    pub fn amount_for(&self, days: u32) -> u64 {
        days as u64 * self.settings.unit_price
    }

    pub fn next_order_id(&self, identity: Identity) -> String {
        format!("ZIVPN_{}_{}", Utc::now().timestamp_millis(), identity)
    }

    /// Registers the order with the gateway, shows the QR code and starts polling.
    pub async fn create_order(
        &self,
        identity: Identity,
        chat: ChatTarget,
        order_id: String,
        days: u32,
        password: String,
    ) -> Result<OrderHandle> {
        let amount = self.amount_for(days);
        let mut order = PurchaseOrder {
            order_id,
            identity,
            chat,
            password,
            requested_days: days,
            amount,
            state: OrderState::Created,
        };

        let request = OrderRequest {
            project: self.settings.payment_project.clone(),
            order_id: order.order_id.clone(),
            amount,
            method: self.settings.payment_method.clone(),
        };

        let artifact = match self.gateway.create_order(&request).await {
            Ok(artifact) => artifact,
            Err(e) => {
                order.transition(OrderState::Failed);
                warn!(
                    "Failed to create {} order {} for {}: {}",
                    self.gateway.name(),
                    order.order_id,
                    identity,
                    e
                );
                self.conversations
                    .clear_order(identity, &order.order_id)
                    .await;
                self.notify(chat, "❌ Failed to create the payment transaction. Please try again later.")
                    .await;
                return Err(e.into());
            }
        };

        info!(
            "Order {} created via {}: {} days, amount {}",
            order.order_id,
            self.gateway.name(),
            days,
            amount
        );

        let caption = format!(
            "Scan this QRIS to pay Rp {} ({} days).\nOrder ID: {}\n\nPay within {} minutes or the order is cancelled.",
            amount,
            days,
            order.order_id,
            self.poll.window().as_secs().div_ceil(60)
        );
        if let Err(e) = self
            .notifier
            .send_photo(chat, &artifact.qris_image, &caption)
            .await
        {
            warn!("Failed to send QRIS for order {}: {}", order.order_id, e);
        }

        order.transition(OrderState::Polling);
        let order_id = order.order_id.clone();
        let monitor = self.clone();
        let task = tokio::spawn(async move { monitor.poll_until_resolved(order).await });

        Ok(OrderHandle {
            order_id,
            amount,
            task,
        })
    }

    async fn poll_until_resolved(&self, mut order: PurchaseOrder) -> OrderOutcome {
        let mut ticker = interval(self.poll.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut settled = false;
        for attempt in 1..=self.poll.max_attempts {
            ticker.tick().await;
            match self.gateway.status(&order.order_id).await {
                Ok(status) if status.settled => {
                    info!("Order {} settled on attempt {}", order.order_id, attempt);
                    settled = true;
                    break;
                }
                Ok(_) => debug!("Order {} not paid yet ({})", order.order_id, attempt),
                // Counted against the budget like any other attempt.
                Err(e) => warn!(
                    "Status check {} for order {} failed: {}",
                    attempt, order.order_id, e
                ),
            }
        }

        if !settled {
            order.transition(OrderState::Expired);
            info!(
                "Order {} expired after {} attempts",
                order.order_id, self.poll.max_attempts
            );
            self.conversations
                .clear_order(order.identity, &order.order_id)
                .await;
            self.notify(order.chat, "❌ Payment timed out or failed. Please try again.")
                .await;
            return OrderOutcome::Expired {
                order_id: order.order_id,
            };
        }

        order.transition(OrderState::Settled);
        self.provision(order).await
    }

    async fn provision(&self, order: PurchaseOrder) -> OrderOutcome {
        let created = self
            .accounts
            .create(&order.password, order.requested_days)
            .await;
        self.conversations
            .clear_order(order.identity, &order.order_id)
            .await;

        match created {
            Ok(result) => {
                let text = format!(
                    "✅ <b>PAYMENT RECEIVED &amp; ACCOUNT CREATED</b>\n\
                     ━━━━━━━━━━━━━━━━━━━━\n\
                     🔑 <b>Password</b>: <code>{}</code>\n\
                     🗓️ <b>Expired</b>: <code>{}</code>\n\
                     ━━━━━━━━━━━━━━━━━━━━",
                    escape_html(&result.password),
                    escape_html(&result.expired)
                );
                if let Err(e) = self
                    .notifier
                    .send_text(order.chat, &text, NotificationParseMode::Html)
                    .await
                {
                    warn!("Failed to deliver account for order {}: {}", order.order_id, e);
                    self.notify(
                        order.chat,
                        &format!(
                            "✅ Payment received, account created.\nPassword: {}\nExpired: {}",
                            result.password, result.expired
                        ),
                    )
                    .await;
                }
                OrderOutcome::Provisioned {
                    order_id: order.order_id,
                    account: AccountSummary {
                        password: result.password,
                        expired: result.expired,
                        days: order.requested_days,
                    },
                }
            }
            Err(e) => {
                error!(
                    "Order {} settled but account creation failed: {}",
                    order.order_id, e
                );
                self.notify(
                    order.chat,
                    &format!(
                        "⚠️ Your payment was received but the account could not be created.\n\
                         An administrator has been notified. Order ID: {}",
                        order.order_id
                    ),
                )
                .await;
                self.alert_operator(&order, &e).await;
                OrderOutcome::SettledWithoutProvisioning {
                    order_id: order.order_id,
                }
            }
        }
    }

    async fn alert_operator(&self, order: &PurchaseOrder, cause: &GatewayError) {
        let Some(operator) = self.operator_chat else {
            warn!("No operator chat configured for order {}", order.order_id);
            return;
        };
        let text = format!(
            "🚨 MANUAL RECONCILIATION NEEDED\n\
             Order: {}\nUser: {}\nAmount: Rp {}\nDays: {}\nPassword: {}\nError: {}",
            order.order_id, order.identity, order.amount, order.requested_days, order.password, cause
        );
        self.notify(operator, &text).await;
    }

    async fn notify(&self, chat: ChatTarget, text: &str) {
        if let Err(e) = self
            .notifier
            .send_text(chat, text, NotificationParseMode::Plain)
            .await
        {
            warn!("Failed to notify {}: {}", chat, e);
        }
    }
}
