//! Adapter interfaces for external systems.
//!
//! The vault never talks to these directly; the ingest pipeline wires them
//! together: a [`Transcriber`] turns audio into text, a [`Summarizer`] turns
//! text into a [`Summary`], and a [`Reporter`] posts progress and results to
//! a chat.

pub mod audio;
pub mod openai;
pub mod telegram;
pub mod whisper;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::{OpenAiClient, OpenAiError};
pub use telegram::{TelegramClient, TelegramConfig};
pub use whisper::WhisperCli;

/// Structured summarization result. Both fields are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Paragraph-length summary stored in the note
    pub summary: String,

    /// Short social-post rendition, only sent to the chat
    #[serde(alias = "x")]
    pub shortform: String,
}

/// Speech-to-text backend
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Transcribe an audio file to text
    async fn transcribe(&self, audio_path: &Path) -> Result<String>;
}

/// Text summarization backend
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<Summary>;
}

/// Destination for chat messages (progress and results)
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, text: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_requires_both_fields() {
        let parsed: Summary =
            serde_json::from_str(r#"{"summary": "long", "shortform": "short"}"#).unwrap();
        assert_eq!(parsed.shortform, "short");

        let aliased: Summary = serde_json::from_str(r#"{"summary": "long", "x": "post"}"#).unwrap();
        assert_eq!(aliased.shortform, "post");

        assert!(serde_json::from_str::<Summary>(r#"{"summary": "long"}"#).is_err());
    }
}
