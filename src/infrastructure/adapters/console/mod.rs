//! Console adapter for development/testing

use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, Mutex};
use crate::domain::traits::{Bot, BotInfo};
use crate::application::errors::BotError;

/// Console bot adapter for local development.
///
/// Every outgoing line is printed and, when a sender is attached, also
/// forwarded over the channel.
pub struct ConsoleAdapter {
    info: BotInfo,
    sender: Option<mpsc::Sender<String>>,
    input: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: BotInfo {
                id: "console".to_string(),
                name: name.into(),
                username: "console".to_string(),
            },
            sender: None,
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    pub fn with_sender(mut self, sender: mpsc::Sender<String>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Prompt and read one line; `None` at end of input.
    pub async fn read_line(&self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        let _ = std::io::stdout().flush();
        match self.input.lock().await.next_line().await {
            Ok(line) => line.map(|l| l.trim().to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read console input");
                None
            }
        }
    }

    async fn emit(&self, line: String) -> Result<(), BotError> {
        println!("{}", line);
        if let Some(sender) = &self.sender {
            sender
                .send(line)
                .await
                .map_err(|e| BotError::Delivery(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Bot for ConsoleAdapter {
    async fn start(&self) -> Result<(), BotError> {
        tracing::info!(name = %self.info.name, "Starting console bot (dev mode)");
        Ok(())
    }

    async fn send_message(&self, _chat_id: &str, text: &str) -> Result<(), BotError> {
        self.emit(format!("[BOT] {}", text)).await
    }

    async fn notify_user(&self, external_user_id: i64, text: &str) -> Result<(), BotError> {
        self.emit(format!("[NOTIFY {}] {}", external_user_id, text)).await
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}
