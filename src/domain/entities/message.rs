use chrono::{DateTime, Utc};

/// Message content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Command { name: String, args: Vec<String> },
    Empty,
}

/// Represents an incoming message from the front-end
#[derive(Debug, Clone)]
pub struct Message {
    pub chat_id: String,
    /// Messenger-side user id of the sender, if known
    pub sender: Option<i64>,
    pub content: Content,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(chat_id: impl Into<String>, content: Content) -> Self {
        Self {
            chat_id: chat_id.into(),
            sender: None,
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn with_sender(mut self, external_user_id: i64) -> Self {
        self.sender = Some(external_user_id);
        self
    }

    pub fn with_sender_opt(mut self, external_user_id: Option<i64>) -> Self {
        self.sender = external_user_id;
        self
    }
}
