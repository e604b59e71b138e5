use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "/etc/zivpn/bot-config.json";

fn default_api_url() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_api_key_file() -> PathBuf {
    PathBuf::from("/etc/zivpn/apikey")
}

fn default_pakasir_base_url() -> String {
    "https://app.pakasir.com/api".to_string()
}

fn default_pakasir_project() -> String {
    "zivpn_pay".to_string()
}

fn default_trial_db_file() -> PathBuf {
    PathBuf::from("/etc/zivpn/trial_users.db")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("/etc/zivpn/backups")
}

/// Bot settings, stored in the same JSON file the installer writes.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub admin_id: i64,
    #[serde(default)]
    pub notif_group_id: i64,
    /// Date the VPS rental runs out, `YYYY-MM-DD`.
    #[serde(default)]
    pub vps_expired_date: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_api_key_file")]
    pub api_key_file: PathBuf,
    #[serde(default = "default_pakasir_base_url")]
    pub pakasir_base_url: String,
    #[serde(default = "default_pakasir_project")]
    pub pakasir_project: String,
    #[serde(default)]
    pub pakasir_api_key: String,
    #[serde(default = "default_trial_db_file")]
    pub trial_db_file: PathBuf,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    #[serde(skip)]
    pub path: PathBuf,
}

impl BotConfig {
    pub fn load() -> Result<Self> {
        let path = std::env::var("ZIVPN_BOT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path, |key| std::env::var(key).ok())
    }

    /// Reads `path` if it exists, then applies overrides looked up through `env`.
    pub fn load_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!("Loading config from {}", path.display());
                serde_json::from_str::<BotConfig>(&contents)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Loading config from environment");
                serde_json::from_str::<BotConfig>("{}")?
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Cannot read {}", path.display()));
            }
        };
        config.path = path.to_path_buf();

        if let Some(v) = env("BOT_TOKEN") {
            config.bot_token = v;
        }
        if let Some(v) = env("ADMIN_ID") {
            config.admin_id = v.trim().parse().context("ADMIN_ID is not a number")?;
        }
        if let Some(v) = env("NOTIF_GROUP_ID") {
            config.notif_group_id = v.trim().parse().context("NOTIF_GROUP_ID is not a number")?;
        }
        if let Some(v) = env("ZIVPN_API_URL") {
            config.api_url = v;
        }
        if let Some(v) = env("ZIVPN_API_KEY_FILE") {
            config.api_key_file = PathBuf::from(v);
        }
        if let Some(v) = env("PAKASIR_BASE_URL") {
            config.pakasir_base_url = v;
        }
        if let Some(v) = env("PAKASIR_PROJECT") {
            config.pakasir_project = v;
        }
        if let Some(v) = env("PAKASIR_API_KEY") {
            config.pakasir_api_key = v;
        }
        if let Some(v) = env("TRIAL_DB_FILE") {
            config.trial_db_file = PathBuf::from(v);
        }
        if let Some(v) = env("BACKUP_DIR") {
            config.backup_dir = PathBuf::from(v);
        }

        if config.bot_token.trim().is_empty() {
            anyhow::bail!("bot_token is empty (set it in the config file or BOT_TOKEN)");
        }
        if config.admin_id == 0 {
            anyhow::bail!("admin_id is not set (config file or ADMIN_ID)");
        }
        Ok(config)
    }

    /// Chat that receives operator notifications: the group if set, else the admin.
    pub fn operator_chat(&self) -> i64 {
        if self.notif_group_id != 0 {
            self.notif_group_id
        } else {
            self.admin_id
        }
    }

    pub fn read_api_key(&self) -> Result<String> {
        let key = std::fs::read_to_string(&self.api_key_file)
            .with_context(|| format!("Cannot read API key from {}", self.api_key_file.display()))?;
        Ok(key.trim().to_string())
    }

    /// Writes `notif_group_id` into the config file. Every other key on disk is kept
    /// as is, and values that came from the environment are never written.
    pub async fn save(&self) -> Result<()> {
        let mut doc = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => serde_json::from_str::<serde_json::Value>(&contents)
                .with_context(|| format!("Invalid config file {}", self.path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::json!({}),
            Err(e) => {
                return Err(e).with_context(|| format!("Cannot read {}", self.path.display()));
            }
        };
        doc.as_object_mut()
            .context("config file is not a JSON object")?
            .insert("notif_group_id".to_string(), self.notif_group_id.into());

        let json = serde_json::to_string_pretty(&doc)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Cannot write {}", self.path.display()))?;
        Ok(())
    }
}
