use chrono::{DateTime, Duration, Utc};
use zivpn_core::models::{AccountRecord, parse_expiry};

/// Splits `/cmd@botname args` into a lowercase command and its arguments.
pub fn parse_command(text: &str) -> Option<(String, &str)> {
    let rest = text.trim().strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let command = head.split('@').next().unwrap_or(head);
    if command.is_empty() {
        return None;
    }
    Some((command.to_lowercase(), args))
}

/// Where an incoming text message goes.
#[derive(Debug, PartialEq, Eq)]
pub enum TextRoute<'a> {
    Command(String, &'a str),
    /// Free text (including slash-prefixed passwords) for the active flow.
    FlowInput,
    /// No flow, private chat: point the user at the menu.
    Hint,
    Ignore,
}

/// Commands that stay available while a flow is waiting for input.
const FLOW_COMMANDS: &[&str] = &["cancel", "start", "menu", "panel"];

pub fn route_text(text: &str, flow_active: bool, private_chat: bool) -> TextRoute<'_> {
    match parse_command(text) {
        Some((command, args)) if !flow_active || FLOW_COMMANDS.contains(&command.as_str()) => {
            TextRoute::Command(command, args)
        }
        _ if flow_active => TextRoute::FlowInput,
        _ if private_chat => TextRoute::Hint,
        _ => TextRoute::Ignore,
    }
}

pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (
        secs / 86_400,
        secs % 86_400 / 3_600,
        secs % 3_600 / 60,
        secs % 60,
    );
    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else {
        format!("{}m {}s", minutes, seconds)
    }
}

/// `2027-01-01 (12 days left)`, or the raw text when it is not a date.
pub fn format_vps_expiry(raw: &str, now: DateTime<Utc>) -> String {
    match parse_expiry(raw) {
        Some(at) if at > now => {
            let days = (at - now).num_days();
            format!("{} ({} days left)", raw.trim(), days)
        }
        Some(_) => format!("{} (expired)", raw.trim()),
        None => raw.trim().to_string(),
    }
}

/// Renders at most `limit` accounts; Telegram caps a message at 4096 chars.
pub fn format_user_list(accounts: &[AccountRecord], limit: usize) -> String {
    if accounts.is_empty() {
        return "📋 No accounts.".to_string();
    }
    let mut out = format!("📋 Accounts ({})\n━━━━━━━━━━━━━━━━━━━━\n", accounts.len());
    for (i, account) in accounts.iter().take(limit).enumerate() {
        let status = if account.status.is_empty() {
            "-"
        } else {
            account.status.as_str()
        };
        out.push_str(&format!(
            "{}. {} | {} | {}\n",
            i + 1,
            account.password,
            account.expired,
            status
        ));
    }
    if accounts.len() > limit {
        out.push_str(&format!("…and {} more", accounts.len() - limit));
    }
    out
}
