pub mod decoders;
pub mod gmail;
pub mod payload;

use anyhow::Result;

use crate::domain::message::{MessageContent, MessageSummary};

/// The mailbox operations one relay cycle needs.
pub trait Mailbox {
    /// Ids of messages matching a provider search query, in provider order.
    fn search(&self, query: &str) -> Result<Vec<MessageSummary>>;
    fn fetch(&self, id: &str) -> Result<MessageContent>;
    /// Clear the unread flag so later searches skip the message.
    fn mark_read(&self, id: &str) -> Result<()>;
}
