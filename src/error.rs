use thiserror::Error;

/// Stage failures inside a relay cycle.
///
/// Attached as context on top of the underlying cause, so the loop can
/// `downcast_ref::<RelayError>()` to decide recovery while the error log
/// still gets the whole chain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("authorization failed")]
    AuthFailure,

    #[error("mailbox search failed for query {query}")]
    ScanFailure { query: String },

    #[error("could not fetch message {id}")]
    FetchFailure { id: String },

    #[error("chat delivery failed for message {id} (part {part}/{total})")]
    SendFailure { id: String, part: usize, total: usize },

    #[error("could not mark message {id} as read")]
    MarkReadFailure { id: String },

    #[error("configuration error: {0}")]
    Config(String),
}
