//! Telegram Bot API adapter for reporting pipeline progress and results.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Reporter;

/// Telegram rejects messages longer than this many characters
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Telegram Bot API client
pub struct TelegramClient {
    /// Bot token
    bot_token: String,
    /// Target chat ID
    chat_id: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response from Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Message result from sendMessage
#[derive(Debug, Deserialize)]
struct MessageResult {
    message_id: i64,
}

/// Configuration for Telegram client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramClient {
    /// Create a new Telegram client
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            client: reqwest::Client::new(),
        }
    }

    /// Create from config
    pub fn from_config(config: TelegramConfig) -> Self {
        Self::new(config.bot_token, config.chat_id)
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    /// Send a text message, split into several if it is too long.
    ///
    /// Returns the ID of the last message sent.
    pub async fn send_message(&self, text: &str) -> Result<i64> {
        let mut last_id = 0;
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            last_id = self.send_single(&chunk).await?;
        }
        Ok(last_id)
    }

    async fn send_single(&self, text: &str) -> Result<i64> {
        let url = self.api_url("sendMessage");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
            }))
            .send()
            .await
            .context("Failed to send Telegram message")?;

        let result: TelegramResponse<MessageResult> = response
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            );
        }

        Ok(result.result.map(|r| r.message_id).unwrap_or(0))
    }
}

#[async_trait]
impl Reporter for TelegramClient {
    async fn report(&self, text: &str) -> Result<()> {
        self.send_message(text).await.map(|_| ())
    }
}

/// Split text into chunks of at most `max_chars` characters, preferring
/// line breaks as split points. Empty text yields no chunks.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > max_chars {
            // A single overlong line is cut hard
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                let piece: String = piece.iter().collect();
                if piece.chars().count() == max_chars {
                    chunks.push(piece);
                } else {
                    current_len = piece.chars().count();
                    current = piece;
                }
            }
            continue;
        }

        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let client = TelegramClient::new("TOKEN".to_string(), "123".to_string());
        assert_eq!(
            client.api_url("sendMessage"),
            "https://api.telegram.org/botTOKEN/sendMessage"
        );
    }

    #[test]
    fn test_split_short_message_is_untouched() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
        assert!(split_message("", 10).is_empty());
    }

    #[test]
    fn test_split_prefers_line_breaks() {
        let chunks = split_message("aaaa\nbbbb\ncccc", 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc"]);
    }

    #[test]
    fn test_split_overlong_line_by_characters() {
        let text = "あ".repeat(25);
        let chunks = split_message(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }
}
