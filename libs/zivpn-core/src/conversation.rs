use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{ProvisionError, Result};
use crate::models::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Create,
    Renew,
    Delete,
}

impl AdminAction {
    pub fn needs_days(self) -> bool {
        !matches!(self, AdminAction::Delete)
    }
}

/// Position in a multi-turn flow. Each variant carries what was collected so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStep {
    AwaitingPassword,
    AwaitingDays { password: String },
    /// Held until the order resolves, so a second purchase cannot start.
    AwaitingPayment { order_id: String },
    AwaitingRestoreFile,
    AwaitingAdminPassword { action: AdminAction },
    AwaitingAdminDays { action: AdminAction, password: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub identity: Identity,
    pub step: FlowStep,
}

/// Per-identity flow state shared by the dispatcher and the workflow.
#[derive(Clone, Default)]
pub struct ConversationStore {
    entries: Arc<RwLock<HashMap<Identity, ConversationEntry>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a flow, replacing whatever the identity had before.
    pub async fn begin(&self, identity: Identity, first_step: FlowStep) {
        let mut entries = self.entries.write().await;
        entries.insert(
            identity,
            ConversationEntry {
                identity,
                step: first_step,
            },
        );
    }

    /// Like `begin`, but refuses while a payment is pending for the identity.
    pub async fn begin_unless_paying(&self, identity: Identity, first_step: FlowStep) -> Result<()> {
        let mut entries = self.entries.write().await;
        if is_paying(entries.get(&identity)) {
            return Err(ProvisionError::PurchaseInProgress);
        }
        entries.insert(
            identity,
            ConversationEntry {
                identity,
                step: first_step,
            },
        );
        Ok(())
    }

    pub async fn advance(&self, identity: Identity, next_step: FlowStep) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&identity)
            .ok_or(ProvisionError::NoActiveFlow)?;
        entry.step = next_step;
        Ok(())
    }

    /// Advances only if the current step still equals `expected`.
    pub async fn compare_and_advance(
        &self,
        identity: Identity,
        expected: &FlowStep,
        next_step: FlowStep,
    ) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&identity)
            .ok_or(ProvisionError::NoActiveFlow)?;
        if &entry.step != expected {
            return Err(ProvisionError::StaleFlow);
        }
        entry.step = next_step;
        Ok(())
    }

    pub async fn current(&self, identity: Identity) -> Option<ConversationEntry> {
        self.entries.read().await.get(&identity).cloned()
    }

    pub async fn clear(&self, identity: Identity) {
        self.entries.write().await.remove(&identity);
    }

    /// Drops any flow except a pending payment, which cannot be aborted.
    /// Returns whether a flow was removed.
    pub async fn clear_unless_paying(&self, identity: Identity) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if is_paying(entries.get(&identity)) {
            return Err(ProvisionError::PurchaseInProgress);
        }
        Ok(entries.remove(&identity).is_some())
    }

    /// Removes the entry only while it still waits on `order_id`.
    pub async fn clear_order(&self, identity: Identity, order_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let waiting = matches!(
            entries.get(&identity).map(|e| &e.step),
            Some(FlowStep::AwaitingPayment { order_id: current }) if current == order_id
        );
        if waiting {
            entries.remove(&identity);
        }
        waiting
    }

    pub async fn active_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn is_paying(entry: Option<&ConversationEntry>) -> bool {
    matches!(
        entry.map(|e| &e.step),
        Some(FlowStep::AwaitingPayment { .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_payment_cannot_be_restarted_or_cancelled() {
        let store = ConversationStore::new();
        store
            .begin(
                4,
                FlowStep::AwaitingPayment {
                    order_id: "o".into(),
                },
            )
            .await;

        assert!(matches!(
            store.begin_unless_paying(4, FlowStep::AwaitingPassword).await,
            Err(ProvisionError::PurchaseInProgress)
        ));
        assert!(matches!(
            store.clear_unless_paying(4).await,
            Err(ProvisionError::PurchaseInProgress)
        ));
        assert!(store.current(4).await.is_some());

        store.clear(4).await;
        store
            .begin_unless_paying(4, FlowStep::AwaitingPassword)
            .await
            .unwrap();
        assert!(store.clear_unless_paying(4).await.unwrap());
    }

    #[tokio::test]
    async fn advance_without_flow_fails() {
        let store = ConversationStore::new();
        let err = store
            .advance(1, FlowStep::AwaitingPassword)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NoActiveFlow));
    }

    #[tokio::test]
    async fn begin_overwrites_existing_flow() {
        let store = ConversationStore::new();
        store
            .begin(
                1,
                FlowStep::AwaitingDays {
                    password: "old".into(),
                },
            )
            .await;
        store.begin(1, FlowStep::AwaitingPassword).await;

        let entry = store.current(1).await.unwrap();
        assert_eq!(entry.step, FlowStep::AwaitingPassword);
    }

    #[tokio::test]
    async fn entries_are_isolated_per_identity() {
        let store = ConversationStore::new();
        store.begin(1, FlowStep::AwaitingPassword).await;
        store
            .begin(
                2,
                FlowStep::AwaitingDays {
                    password: "secret-of-two".into(),
                },
            )
            .await;

        let one = store.current(1).await.unwrap();
        assert_eq!(one.identity, 1);
        assert_eq!(one.step, FlowStep::AwaitingPassword);

        store.clear(2).await;
        assert!(store.current(2).await.is_none());
        assert!(store.current(1).await.is_some());
    }

    #[tokio::test]
    async fn compare_and_advance_lets_one_of_two_racers_win() {
        let store = ConversationStore::new();
        let expected = FlowStep::AwaitingDays {
            password: "pw".into(),
        };
        store.begin(7, expected.clone()).await;

        let (a, b) = tokio::join!(
            store.compare_and_advance(
                7,
                &expected,
                FlowStep::AwaitingPayment {
                    order_id: "a".into()
                }
            ),
            store.compare_and_advance(
                7,
                &expected,
                FlowStep::AwaitingPayment {
                    order_id: "b".into()
                }
            ),
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(loser, Err(ProvisionError::StaleFlow)));
    }

    #[tokio::test]
    async fn clear_order_only_removes_matching_order() {
        let store = ConversationStore::new();
        store
            .begin(
                3,
                FlowStep::AwaitingPayment {
                    order_id: "ZIVPN_1_3".into(),
                },
            )
            .await;

        assert!(!store.clear_order(3, "ZIVPN_0_3").await);
        assert!(store.current(3).await.is_some());
        assert!(store.clear_order(3, "ZIVPN_1_3").await);
        assert!(!store.clear_order(3, "ZIVPN_1_3").await);
    }
}
