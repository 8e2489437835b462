/// Provider-assigned message id as returned by the list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: Option<String>,
}

/// Subject and decoded plain-text body of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub subject: Option<String>,
    pub body: String,
}

impl MessageContent {
    pub fn subject_or_placeholder(&self) -> &str {
        self.subject.as_deref().unwrap_or("(no subject)")
    }
}
