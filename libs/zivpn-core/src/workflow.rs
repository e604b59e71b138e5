use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{error, info, warn};

use crate::capabilities::{AccountProvider, NotificationParseMode, Notifier, escape_html};
use crate::config::ProvisioningSettings;
use crate::conversation::{AdminAction, ConversationStore, FlowStep};
use crate::error::{ProvisionError, Result};
use crate::ledger::TrialLedger;
use crate::models::{AccountSummary, ChatTarget, Identity};
use crate::payment::{OrderHandle, PaymentOrderMonitor};
use crate::snapshot::parse_snapshot;

/// What a message did to the caller's flow.
#[derive(Debug)]
pub enum InputOutcome {
    /// Input rejected, same step prompted again.
    Reprompted,
    Advanced,
    OrderPlaced(OrderHandle),
    /// Flow is waiting on a payment and ignored the message.
    Pending,
    Completed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped_expired: usize,
    pub skipped_invalid: usize,
    pub failed: usize,
}

pub fn generate_password(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Parses a day count and enforces the lower bound.
pub fn parse_days(input: &str, min_days: u32) -> Result<u32> {
    let days: u32 = input
        .trim()
        .parse()
        .map_err(|_| ProvisionError::Validation(format!("'{}' is not a day count", input.trim())))?;
    if days < min_days {
        return Err(ProvisionError::Validation(format!(
            "{} is below the minimum of {} days",
            days, min_days
        )));
    }
    Ok(days)
}

pub struct ProvisioningWorkflow {
    accounts: Arc<dyn AccountProvider>,
    notifier: Arc<dyn Notifier>,
    conversations: ConversationStore,
    ledger: TrialLedger,
    monitor: PaymentOrderMonitor,
    settings: ProvisioningSettings,
}

impl ProvisioningWorkflow {
    pub fn new(
        accounts: Arc<dyn AccountProvider>,
        notifier: Arc<dyn Notifier>,
        conversations: ConversationStore,
        ledger: TrialLedger,
        monitor: PaymentOrderMonitor,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            accounts,
            notifier,
            conversations,
            ledger,
            monitor,
            settings,
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn ledger(&self) -> &TrialLedger {
        &self.ledger
    }

    pub fn settings(&self) -> &ProvisioningSettings {
        &self.settings
    }

    /// Creates the one free trial account of `identity`.
    pub async fn issue_trial(&self, identity: Identity, chat: ChatTarget) -> Result<AccountSummary> {
        let result = self.try_issue_trial(identity).await;
        match &result {
            Ok(summary) => {
                let text = format!(
                    "✅ <b>TRIAL CREATED</b>\n\
                     ━━━━━━━━━━━━━━━━━━━━\n\
                     🔑 <b>Password</b>: <code>{}</code>\n\
                     🗓️ <b>Expired</b>: <code>{}</code>\n\
                     ━━━━━━━━━━━━━━━━━━━━\n\
                     Note: the trial is available once per Telegram account.",
                    escape_html(&summary.password),
                    escape_html(&summary.expired)
                );
                self.send(chat, &text, NotificationParseMode::Html).await;
            }
            Err(e) => self.send_plain(chat, e.user_message()).await,
        }
        result
    }

    async fn try_issue_trial(&self, identity: Identity) -> Result<AccountSummary> {
        self.ledger.reserve_trial(identity).await?;

        let password = generate_password(self.settings.password_length);
        let days = self.settings.trial_days;
        let created = match self.accounts.create(&password, days).await {
            Ok(created) => created,
            Err(e) => {
                self.ledger.release_trial(identity).await;
                warn!("Trial creation for {} failed: {}", identity, e);
                return Err(e.into());
            }
        };

        if let Err(e) = self.ledger.grant_trial(identity).await {
            // The account exists; the user still gets it.
            error!("Trial for {} created but ledger write failed: {}", identity, e);
        }
        info!("Trial account issued to {}", identity);

        Ok(AccountSummary {
            password: created.password,
            expired: created.expired,
            days,
        })
    }

    pub async fn begin_paid_purchase(&self, identity: Identity, chat: ChatTarget) -> Result<()> {
        if let Err(e) = self
            .conversations
            .begin_unless_paying(identity, FlowStep::AwaitingPassword)
            .await
        {
            self.send_plain(chat, e.user_message()).await;
            return Err(e);
        }
        self.send_plain(
            chat,
            &format!(
                "Enter the password you want (free text):\n\nNote: minimum purchase is {} days.",
                self.settings.min_days
            ),
        )
        .await;
        Ok(())
    }

    pub async fn begin_admin(&self, identity: Identity, chat: ChatTarget, action: AdminAction) {
        self.conversations
            .begin(identity, FlowStep::AwaitingAdminPassword { action })
            .await;
        let verb = match action {
            AdminAction::Create => "new account",
            AdminAction::Renew => "account to renew",
            AdminAction::Delete => "account to delete",
        };
        self.send_plain(chat, &format!("Enter the password of the {}:", verb))
            .await;
    }

    pub async fn begin_restore(&self, identity: Identity, chat: ChatTarget) {
        self.conversations
            .begin(identity, FlowStep::AwaitingRestoreFile)
            .await;
        self.send_plain(chat, "Send the backup file (.json) to restore.")
            .await;
    }

    /// Drops the caller's flow. A pending payment cannot be cancelled.
    pub async fn cancel(&self, identity: Identity, chat: ChatTarget) -> Result<bool> {
        match self.conversations.clear_unless_paying(identity).await {
            Ok(removed) => {
                let text = if removed {
                    "Cancelled."
                } else {
                    "Nothing to cancel."
                };
                self.send_plain(chat, text).await;
                Ok(removed)
            }
            Err(e) => {
                self.send_plain(chat, e.user_message()).await;
                Err(e)
            }
        }
    }

    /// Feeds one text message into the caller's active flow.
    pub async fn handle_input(
        &self,
        identity: Identity,
        chat: ChatTarget,
        text: &str,
    ) -> Result<InputOutcome> {
        let entry = self
            .conversations
            .current(identity)
            .await
            .ok_or(ProvisionError::NoActiveFlow)?;

        match &entry.step {
            FlowStep::AwaitingPassword => {
                let password = text.trim();
                if password.is_empty() {
                    self.send_plain(chat, "❌ Password cannot be empty. Enter the password:")
                        .await;
                    return Ok(InputOutcome::Reprompted);
                }
                self.conversations
                    .compare_and_advance(
                        identity,
                        &entry.step,
                        FlowStep::AwaitingDays {
                            password: password.to_string(),
                        },
                    )
                    .await?;
                self.send_plain(
                    chat,
                    &format!("Enter the number of days (minimum {}):", self.settings.min_days),
                )
                .await;
                Ok(InputOutcome::Advanced)
            }
            FlowStep::AwaitingDays { password } => {
                let days = match parse_days(text, self.settings.min_days) {
                    Ok(days) => days,
                    Err(e) => {
                        info!("Rejected day count from {}: {}", identity, e);
                        self.send_plain(
                            chat,
                            &format!(
                                "❌ Invalid number of days or less than the minimum of {}. Try again.",
                                self.settings.min_days
                            ),
                        )
                        .await;
                        return Ok(InputOutcome::Reprompted);
                    }
                };

                let order_id = self.monitor.next_order_id(identity);
                self.conversations
                    .compare_and_advance(
                        identity,
                        &entry.step,
                        FlowStep::AwaitingPayment {
                            order_id: order_id.clone(),
                        },
                    )
                    .await?;

                let handle = self
                    .monitor
                    .create_order(identity, chat, order_id, days, password.clone())
                    .await?;
                Ok(InputOutcome::OrderPlaced(handle))
            }
            FlowStep::AwaitingPayment { order_id } => {
                self.send_plain(
                    chat,
                    &format!(
                        "⏳ Waiting for payment of order {}. Your account will be sent once it is paid.",
                        order_id
                    ),
                )
                .await;
                Ok(InputOutcome::Pending)
            }
            FlowStep::AwaitingRestoreFile => {
                self.send_plain(chat, "❌ Please send the backup file (.json).")
                    .await;
                Ok(InputOutcome::Reprompted)
            }
            FlowStep::AwaitingAdminPassword { action } => {
                let password = text.trim();
                if password.is_empty() {
                    self.send_plain(chat, "❌ Password cannot be empty.").await;
                    return Ok(InputOutcome::Reprompted);
                }
                if action.needs_days() {
                    self.conversations
                        .compare_and_advance(
                            identity,
                            &entry.step,
                            FlowStep::AwaitingAdminDays {
                                action: *action,
                                password: password.to_string(),
                            },
                        )
                        .await?;
                    self.send_plain(chat, "Enter the number of days:").await;
                    return Ok(InputOutcome::Advanced);
                }

                self.conversations.clear(identity).await;
                let text = match self.accounts.delete(password).await {
                    Ok(()) => format!("✅ Account <code>{}</code> deleted.", escape_html(password)),
                    Err(e) => format!("❌ Delete failed: {}", escape_html(&e.to_string())),
                };
                self.send(chat, &text, NotificationParseMode::Html).await;
                Ok(InputOutcome::Completed)
            }
            FlowStep::AwaitingAdminDays { action, password } => {
                let days = match parse_days(text, 1) {
                    Ok(days) => days,
                    Err(_) => {
                        self.send_plain(chat, "❌ Invalid number of days. Try again.")
                            .await;
                        return Ok(InputOutcome::Reprompted);
                    }
                };

                self.conversations.clear(identity).await;
                let result = match action {
                    AdminAction::Renew => self.accounts.renew(password, days).await,
                    _ => self.accounts.create(password, days).await,
                };
                let text = match result {
                    Ok(account) => format!(
                        "✅ Account <code>{}</code> ready, expires <code>{}</code>.",
                        escape_html(&account.password),
                        escape_html(&account.expired)
                    ),
                    // Admins see backend errors verbatim.
                    Err(e) => format!("❌ Failed: {}", escape_html(&e.to_string())),
                };
                self.send(chat, &text, NotificationParseMode::Html).await;
                Ok(InputOutcome::Completed)
            }
        }
    }

    /// Recreates every unexpired account of an uploaded snapshot.
    pub async fn restore_snapshot(
        &self,
        identity: Identity,
        chat: ChatTarget,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<RestoreReport> {
        match self.conversations.current(identity).await {
            Some(entry) if entry.step == FlowStep::AwaitingRestoreFile => {}
            _ => return Err(ProvisionError::NoActiveFlow),
        }
        self.conversations.clear(identity).await;

        let records = match parse_snapshot(bytes) {
            Ok(records) => records,
            Err(e) => {
                warn!("Rejected backup upload from {}: {}", identity, e);
                self.send_plain(chat, e.user_message()).await;
                return Err(e);
            }
        };

        let mut report = RestoreReport::default();
        for record in records {
            let Some(expires_at) = record.expires_at() else {
                report.skipped_invalid += 1;
                continue;
            };
            if expires_at <= now {
                report.skipped_expired += 1;
                continue;
            }
            let remaining = (expires_at - now).num_seconds();
            let days = remaining.div_euclid(86_400) + i64::from(remaining.rem_euclid(86_400) > 0);
            let days = u32::try_from(days).unwrap_or(u32::MAX);

            match self.accounts.create(&record.password, days).await {
                Ok(_) => report.restored += 1,
                Err(e) => {
                    warn!("Restore of {} failed: {}", record.password, e);
                    report.failed += 1;
                }
            }
        }

        info!("Restore by {} finished: {:?}", identity, report);
        self.send_plain(
            chat,
            &format!(
                "✅ Restore finished.\nRestored: {}\nSkipped (expired): {}\nSkipped (invalid): {}\nFailed: {}",
                report.restored, report.skipped_expired, report.skipped_invalid, report.failed
            ),
        )
        .await;
        Ok(report)
    }

    async fn send_plain(&self, chat: ChatTarget, text: &str) {
        self.send(chat, text, NotificationParseMode::Plain).await;
    }

    async fn send(&self, chat: ChatTarget, text: &str, parse_mode: NotificationParseMode) {
        if let Err(e) = self.notifier.send_text(chat, text, parse_mode).await {
            warn!("Failed to send message to {}: {}", chat, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollSettings;
    use crate::models::AccountRecord;
    use crate::payment::OrderOutcome;
    use crate::testing::{FakeAccounts, FakeGateway, RecordingNotifier};
    use chrono::{Duration, TimeZone};

    struct Harness {
        workflow: ProvisioningWorkflow,
        accounts: Arc<FakeAccounts>,
        gateway: Arc<FakeGateway>,
        notifier: Arc<RecordingNotifier>,
        _dir: tempfile::TempDir,
    }

    async fn harness(gateway: FakeGateway, accounts: FakeAccounts) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TrialLedger::load(dir.path().join("trial_users.db"))
            .await
            .unwrap();
        let accounts = Arc::new(accounts);
        let gateway = Arc::new(gateway);
        let notifier = Arc::new(RecordingNotifier::default());
        let conversations = ConversationStore::new();
        let settings = ProvisioningSettings::default();
        let monitor = PaymentOrderMonitor::new(
            gateway.clone(),
            accounts.clone(),
            notifier.clone(),
            conversations.clone(),
            settings.clone(),
            PollSettings::default(),
            None,
        );
        let workflow = ProvisioningWorkflow::new(
            accounts.clone(),
            notifier.clone(),
            conversations,
            ledger,
            monitor,
            settings,
        );
        Harness {
            workflow,
            accounts,
            gateway,
            notifier,
            _dir: dir,
        }
    }

    async fn step_of(h: &Harness, identity: Identity) -> Option<FlowStep> {
        h.workflow
            .conversations()
            .current(identity)
            .await
            .map(|e| e.step)
    }

    #[test]
    fn generated_passwords_are_alphanumeric() {
        let pw = generate_password(8);
        assert_eq!(pw.len(), 8);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn parse_days_enforces_minimum() {
        assert_eq!(parse_days(" 30 ", 7).unwrap(), 30);
        assert!(parse_days("abc", 7).is_err());
        assert!(parse_days("3", 7).is_err());
        assert!(parse_days("-7", 7).is_err());
    }

    #[tokio::test]
    async fn trial_is_issued_once() {
        let h = harness(FakeGateway::never_settling(), FakeAccounts::default()).await;

        let summary = h.workflow.issue_trial(1, 1).await.unwrap();
        assert_eq!(summary.days, 1);
        assert_eq!(summary.password.len(), 8);
        assert!(h.workflow.ledger().has_trial(1).await);

        let second = h.workflow.issue_trial(1, 1).await;
        assert!(matches!(second, Err(ProvisionError::TrialAlreadyUsed)));
        assert_eq!(h.accounts.created().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_trials_create_one_account() {
        let accounts = FakeAccounts::default();
        *accounts.create_delay.lock().unwrap() = Some(std::time::Duration::from_millis(50));
        let h = harness(FakeGateway::never_settling(), accounts).await;

        let (a, b) = tokio::join!(h.workflow.issue_trial(2, 2), h.workflow.issue_trial(2, 2));

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(h.accounts.created().len(), 1);
        let ledger_file = std::fs::read_to_string(h.workflow.ledger().path()).unwrap();
        assert_eq!(ledger_file, "2\n");
    }

    #[tokio::test]
    async fn failed_trial_creation_does_not_consume_trial() {
        let accounts = FakeAccounts::default();
        *accounts.fail_create.lock().unwrap() = true;
        let h = harness(FakeGateway::never_settling(), accounts).await;

        assert!(h.workflow.issue_trial(3, 3).await.is_err());
        assert!(!h.workflow.ledger().has_trial(3).await);

        *h.accounts.fail_create.lock().unwrap() = false;
        h.workflow.issue_trial(3, 3).await.unwrap();
        assert!(h.workflow.ledger().has_trial(3).await);
    }

    #[tokio::test]
    async fn invalid_day_counts_reprompt_without_advancing() {
        let h = harness(FakeGateway::never_settling(), FakeAccounts::default()).await;
        h.workflow.begin_paid_purchase(4, 4).await.unwrap();
        h.workflow.handle_input(4, 4, "hunter2").await.unwrap();

        for bad in ["abc", "3"] {
            let outcome = h.workflow.handle_input(4, 4, bad).await.unwrap();
            assert!(matches!(outcome, InputOutcome::Reprompted));
            assert_eq!(
                step_of(&h, 4).await,
                Some(FlowStep::AwaitingDays {
                    password: "hunter2".into()
                })
            );
        }
        assert!(h.gateway.orders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_password_is_reprompted() {
        let h = harness(FakeGateway::never_settling(), FakeAccounts::default()).await;
        h.workflow.begin_paid_purchase(5, 5).await.unwrap();

        let outcome = h.workflow.handle_input(5, 5, "   ").await.unwrap();
        assert!(matches!(outcome, InputOutcome::Reprompted));
        assert_eq!(step_of(&h, 5).await, Some(FlowStep::AwaitingPassword));
    }

    #[tokio::test(start_paused = true)]
    async fn paid_purchase_runs_to_account_creation() {
        let h = harness(FakeGateway::settling_on(2), FakeAccounts::default()).await;
        h.workflow.begin_paid_purchase(6, 60).await.unwrap();
        h.workflow.handle_input(6, 60, "mypass").await.unwrap();

        let outcome = h.workflow.handle_input(6, 60, "7").await.unwrap();
        let InputOutcome::OrderPlaced(handle) = outcome else {
            panic!("expected an order");
        };
        assert_eq!(handle.amount, 2338);
        assert!(matches!(
            step_of(&h, 6).await,
            Some(FlowStep::AwaitingPayment { .. })
        ));

        // Mid-payment, a new purchase is refused.
        assert!(matches!(
            h.workflow.begin_paid_purchase(6, 60).await,
            Err(ProvisionError::PurchaseInProgress)
        ));

        let result = handle.task.await.unwrap();
        assert!(matches!(result, OrderOutcome::Provisioned { .. }));
        assert_eq!(h.accounts.created(), vec![("mypass".to_string(), 7)]);
        assert!(step_of(&h, 6).await.is_none());
        let orders = h.gateway.orders.lock().unwrap().clone();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].project, "zivpn_pay");
        assert_eq!(orders[0].method, "qris");
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_day_messages_place_one_order() {
        let h = harness(FakeGateway::never_settling(), FakeAccounts::default()).await;
        h.workflow.begin_paid_purchase(8, 8).await.unwrap();
        h.workflow.handle_input(8, 8, "pw").await.unwrap();

        let (a, b) = tokio::join!(
            h.workflow.handle_input(8, 8, "7"),
            h.workflow.handle_input(8, 8, "14")
        );

        let placed = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Ok(InputOutcome::OrderPlaced(_))))
            .count();
        assert_eq!(placed, 1);
        assert_eq!(h.gateway.orders.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_clears_collecting_flow() {
        let h = harness(FakeGateway::never_settling(), FakeAccounts::default()).await;
        h.workflow.begin_paid_purchase(9, 9).await.unwrap();

        assert!(h.workflow.cancel(9, 9).await.unwrap());
        assert!(step_of(&h, 9).await.is_none());
        assert!(!h.workflow.cancel(9, 9).await.unwrap());
    }

    #[tokio::test]
    async fn input_without_flow_is_rejected() {
        let h = harness(FakeGateway::never_settling(), FakeAccounts::default()).await;
        assert!(matches!(
            h.workflow.handle_input(10, 10, "7").await,
            Err(ProvisionError::NoActiveFlow)
        ));
    }

    #[tokio::test]
    async fn admin_renew_flow_calls_renew() {
        let h = harness(FakeGateway::never_settling(), FakeAccounts::default()).await;
        h.workflow.begin_admin(1, 1, AdminAction::Renew).await;
        h.workflow.handle_input(1, 1, "alice").await.unwrap();
        let outcome = h.workflow.handle_input(1, 1, "30").await.unwrap();

        assert!(matches!(outcome, InputOutcome::Completed));
        assert_eq!(
            h.accounts.renewed.lock().unwrap().clone(),
            vec![("alice".to_string(), 30)]
        );
        assert!(step_of(&h, 1).await.is_none());
    }

    #[tokio::test]
    async fn admin_delete_needs_only_password() {
        let h = harness(FakeGateway::never_settling(), FakeAccounts::default()).await;
        h.workflow.begin_admin(1, 1, AdminAction::Delete).await;
        let outcome = h.workflow.handle_input(1, 1, "bob").await.unwrap();

        assert!(matches!(outcome, InputOutcome::Completed));
        assert_eq!(h.accounts.deleted(), vec!["bob".to_string()]);
        let texts = h.notifier.texts_to(1);
        assert!(texts.last().unwrap().contains("deleted"));
    }

    #[tokio::test]
    async fn admin_result_escapes_free_form_password() {
        let h = harness(FakeGateway::never_settling(), FakeAccounts::default()).await;
        h.workflow.begin_admin(1, 1, AdminAction::Create).await;
        h.workflow.handle_input(1, 1, "p`q<r>").await.unwrap();
        h.workflow.handle_input(1, 1, "5").await.unwrap();

        let texts = h.notifier.texts_to(1);
        let result = texts.last().unwrap();
        assert!(result.contains("<code>p`q&lt;r&gt;</code>"));
        assert!(!result.contains("<r>"));
    }

    #[tokio::test]
    async fn restore_recreates_unexpired_accounts() {
        let h = harness(FakeGateway::never_settling(), FakeAccounts::default()).await;
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let records = vec![
            AccountRecord {
                host: String::new(),
                password: "future".into(),
                expired: (now + Duration::hours(36))
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
                status: "active".into(),
            },
            AccountRecord {
                host: String::new(),
                password: "past".into(),
                expired: "2026-04-01".into(),
                status: "expired".into(),
            },
            AccountRecord {
                host: String::new(),
                password: "garbled".into(),
                expired: "next tuesday".into(),
                status: "active".into(),
            },
        ];
        let bytes = serde_json::to_vec(&records).unwrap();

        assert!(matches!(
            h.workflow.restore_snapshot(1, 1, &bytes, now).await,
            Err(ProvisionError::NoActiveFlow)
        ));

        h.workflow.begin_restore(1, 1).await;
        let report = h.workflow.restore_snapshot(1, 1, &bytes, now).await.unwrap();

        assert_eq!(
            report,
            RestoreReport {
                restored: 1,
                skipped_expired: 1,
                skipped_invalid: 1,
                failed: 0,
            }
        );
        assert_eq!(h.accounts.created(), vec![("future".to_string(), 2)]);
        assert!(step_of(&h, 1).await.is_none());
    }
}
