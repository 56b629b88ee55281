//! Message parser - Parses raw console lines into structured messages

use crate::domain::entities::{Content, Message};

/// Parses incoming text into structured Message objects
pub struct MessageParser {
    command_prefix: String,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    /// Parse a text message
    pub fn parse(&self, chat_id: impl Into<String>, text: &str, sender: Option<i64>) -> Message {
        Message::new(chat_id, self.parse_content(text)).with_sender_opt(sender)
    }

    /// Classify a line as a command, plain text, or nothing.
    ///
    /// Both `/` and the configured prefix start a command. Command names are
    /// lowercased; arguments keep their case.
    pub fn parse_content(&self, text: &str) -> Content {
        let text = text.trim();
        if text.is_empty() {
            return Content::Empty;
        }

        let cmd_text = text
            .strip_prefix('/')
            .or_else(|| {
                if self.command_prefix.is_empty() {
                    None
                } else {
                    text.strip_prefix(self.command_prefix.as_str())
                }
            });

        let Some(cmd_text) = cmd_text else {
            return Content::Text(text.to_string());
        };

        let mut parts = cmd_text.split_whitespace();
        let name = match parts.next() {
            Some(name) => name.to_lowercase(),
            None => return Content::Empty,
        };
        let args = parts.map(str::to_string).collect();

        Content::Command { name, args }
    }
}
