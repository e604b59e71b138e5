use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

pub fn main_menu(is_admin: bool) -> InlineKeyboardMarkup {
    if !is_admin {
        return InlineKeyboardMarkup::new(vec![
            vec![
                InlineKeyboardButton::callback("🎁 Free Trial", "trial"),
                InlineKeyboardButton::callback("🛒 Buy Account", "create_paid"),
            ],
            vec![InlineKeyboardButton::callback("📊 System Info", "system_info")],
        ]);
    }

    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("👤 Create User", "create_user"),
            InlineKeyboardButton::callback("🗑️ Delete User", "delete_user"),
        ],
        vec![
            InlineKeyboardButton::callback("🔄 Renew User", "renew_user"),
            InlineKeyboardButton::callback("📋 List Users", "list_users"),
        ],
        vec![
            InlineKeyboardButton::callback("💾 Backup Now", "backup_users"),
            InlineKeyboardButton::callback("♻️ Restore Backup", "restore_backup"),
        ],
        vec![
            InlineKeyboardButton::callback("🧹 Sweep Expired", "auto_delete"),
            InlineKeyboardButton::callback("⏱️ Bot Uptime", "bot_uptime"),
        ],
        vec![InlineKeyboardButton::callback("📊 System Info", "system_info")],
    ])
}
