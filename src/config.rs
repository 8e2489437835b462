use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RelayError;

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080/callback";
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_ERROR_LOG: &str = "logs/errores.log";
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Telegram refuses texts longer than this.
pub const TELEGRAM_TEXT_LIMIT: usize = 4096;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub gmail: GmailConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelegramConfig {
    pub token: String,
    #[serde(deserialize_with = "string_or_int")]
    pub chat_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GmailConfig {
    pub credentials_file: PathBuf,
    pub token_file: PathBuf,
    pub subject: String,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_error_log")]
    pub error_log: PathBuf,
    #[serde(default)]
    pub lookback_secs: u64,
    #[serde(default = "default_max_chars")]
    pub max_message_chars: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            error_log: default_error_log(),
            lookback_secs: 0,
            max_message_chars: MAX_MESSAGE_CHARS,
        }
    }
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_error_log() -> PathBuf {
    PathBuf::from(DEFAULT_ERROR_LOG)
}

fn default_max_chars() -> usize {
    MAX_MESSAGE_CHARS
}

/// chat ids are often written as bare integers (`-100123`); accept both.
fn string_or_int<'de, D>(de: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }
    Ok(match Raw::deserialize(de)? {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
    })
}

impl Config {
    pub fn redirect_uri(&self) -> &str {
        self.gmail
            .redirect_uri
            .as_deref()
            .unwrap_or(DEFAULT_REDIRECT_URI)
    }

    /// Gmail search query for unread mail with the configured subject.
    pub fn search_query(&self, after_epoch: Option<i64>) -> String {
        // Gmail search has no escape for quotes inside a quoted term.
        let subject = self.gmail.subject.replace('"', "");
        let mut q = format!("is:unread subject:\"{subject}\"");
        if let Some(epoch) = after_epoch {
            q.push_str(&format!(" after:{epoch}"));
        }
        q
    }

    fn validate(&self) -> std::result::Result<(), RelayError> {
        if self.telegram.token.trim().is_empty() {
            return Err(RelayError::Config("telegram.token is empty".into()));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(RelayError::Config("telegram.chat_id is empty".into()));
        }
        if self.gmail.subject.trim().is_empty() {
            return Err(RelayError::Config("gmail.subject is empty".into()));
        }
        if self.relay.interval_secs == 0 {
            return Err(RelayError::Config("relay.interval_secs must be >= 1".into()));
        }
        // Leaves room under the Telegram limit for the "(parte N)" header.
        let max = self.relay.max_message_chars;
        if max == 0 || max > MAX_MESSAGE_CHARS {
            return Err(RelayError::Config(format!(
                "relay.max_message_chars must be within 1..={MAX_MESSAGE_CHARS}"
            )));
        }
        Ok(())
    }

    /// Relative file paths are taken relative to the config file's directory.
    fn resolve_paths(&mut self, base: &Path) {
        for p in [
            &mut self.gmail.credentials_file,
            &mut self.gmail.token_file,
            &mut self.relay.error_log,
        ] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("mail_relay"))
}

pub fn default_config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

fn template() -> Config {
    Config {
        telegram: TelegramConfig {
            token: "123456:YOUR_BOT_TOKEN".to_string(),
            chat_id: "-1001234567890".to_string(),
        },
        gmail: GmailConfig {
            credentials_file: PathBuf::from("credentials.json"),
            token_file: PathBuf::from("token.json"),
            subject: "PLACE YOUR SUBJECT".to_string(),
            redirect_uri: Some(DEFAULT_REDIRECT_URI.to_string()),
        },
        relay: RelayConfig::default(),
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    if !path.exists() {
        // create a template config for users to edit
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tom = toml::to_string_pretty(&template())?;
        fs::write(&path, tom)?;
        return Err(anyhow::anyhow!(
            "Created template config at {}; edit it and run again",
            path.display()
        ));
    }
    let s = fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&s, path.parent().unwrap_or(Path::new(".")))
}

pub fn parse_config(s: &str, base: &Path) -> Result<Config> {
    let mut cfg: Config = toml::from_str(s).context("parsing config")?;
    cfg.validate()?;
    cfg.resolve_paths(base);
    Ok(cfg)
}
