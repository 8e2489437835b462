pub mod telegram;

use anyhow::Result;

/// A destination that accepts plain-text messages.
pub trait ChatSink {
    fn send_text(&self, text: &str) -> Result<()>;
}
