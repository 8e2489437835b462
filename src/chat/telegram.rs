//! Blocking wrapper around the Telegram Bot API `sendMessage` call.

use anyhow::{Context, Result, anyhow};
use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::chat::ChatSink;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Envelope wrapping every Bot API response.
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

/// Sends to one fixed chat.
pub struct TelegramClient {
    http: Client,
    /// `https://api.telegram.org/bot{token}` by default.
    base_url: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(token: &str, chat_id: impl Into<String>) -> Self {
        Self::with_base_url(format!("https://api.telegram.org/bot{token}"), chat_id)
    }

    pub fn with_base_url(base_url: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            chat_id: chat_id.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ChatSink for TelegramClient {
    fn send_text(&self, text: &str) -> Result<()> {
        let url = format!("{}/sendMessage", self.base_url);
        debug!("sending {} chars to chat {}", text.chars().count(), self.chat_id);

        let resp = self
            .http
            .post(&url)
            .json(&SendMessageRequest {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .context("Telegram sendMessage request failed")?;

        let status = resp.status();
        let body: TelegramResponse = resp
            .json()
            .with_context(|| format!("unreadable Telegram response ({status})"))?;

        if !body.ok {
            let desc = body.description.unwrap_or_else(|| "unknown error".into());
            return Err(anyhow!("Telegram rejected message ({status}): {desc}"));
        }
        Ok(())
    }
}
