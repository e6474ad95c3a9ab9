//! OpenAI API client for transcription and summarization.
//!
//! Transcription: `POST /audio/transcriptions` (multipart, `whisper-1`).
//! Files with an extension the API does not reliably accept are converted to
//! MP3 first. If the API still rejects the file (HTTP 400), the original is
//! force-converted to WAV and sent exactly once more.
//!
//! Summarization: `POST /chat/completions` in JSON mode, parsed into a
//! [`Summary`].

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::audio::{self, AudioFormat};
use super::{Summarizer, Summary, Transcriber};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const SUMMARY_PROMPT: &str = "You summarize voice memo transcripts. \
Reply with a JSON object with exactly two string fields: \
\"summary\", a concise paragraph covering the key points, and \
\"shortform\", a single short social media post (under 140 characters). \
Write both in the same language as the transcript.";

/// Errors from the OpenAI API
#[derive(Debug, Error)]
pub enum OpenAiError {
    /// The request was rejected as invalid (e.g. unsupported audio format)
    #[error("OpenAI rejected the request: {0}")]
    BadRequest(String),

    #[error("OpenAI API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected response: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI REST client
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    transcription_model: String,
    chat_model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
        })
    }

    /// Point at an OpenAI-compatible server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Turn a non-success response into an [`OpenAiError`]
    async fn error_from(response: reqwest::Response) -> OpenAiError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(ErrorResponse { error: Some(detail) }) => detail.message,
            _ => body,
        };

        if status == 400 {
            OpenAiError::BadRequest(message)
        } else {
            OpenAiError::Api { status, message }
        }
    }

    /// One transcription request, no conversion or retry
    async fn transcribe_once(&self, path: &Path) -> Result<String, OpenAiError> {
        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let bytes = tokio::fs::read(path).await?;

        let form = Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = self
            .client
            .post(self.api_url("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let converted = if audio::is_supported(audio_path) {
            None
        } else {
            debug!(path = %audio_path.display(), "converting audio to mp3 before upload");
            Some(audio::convert(audio_path, AudioFormat::Mp3).await?)
        };
        let upload = converted
            .as_ref()
            .map(|c| c.path())
            .unwrap_or(audio_path);

        match self.transcribe_once(upload).await {
            Ok(text) => Ok(text),
            Err(OpenAiError::BadRequest(message)) => {
                warn!(
                    path = %audio_path.display(),
                    reason = %message,
                    "transcription rejected, retrying as wav"
                );
                let wav = audio::convert(audio_path, AudioFormat::Wav).await?;
                Ok(self.transcribe_once(wav.path()).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiClient {
    async fn summarize(&self, text: &str) -> Result<Summary> {
        let response = self
            .client
            .post(self.api_url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.chat_model,
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": SUMMARY_PROMPT },
                    { "role": "user", "content": text },
                ],
            }))
            .send()
            .await
            .context("Failed to send summarization request")?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await.into());
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse summarization response")?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OpenAiError::Parse("summarization returned no content".to_string()))?;

        parse_summary(&content)
    }
}

/// Parse the model's JSON reply into a [`Summary`]
fn parse_summary(content: &str) -> Result<Summary> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(trimmed)
        .map_err(|e| OpenAiError::Parse(format!("invalid summary JSON ({}): {}", e, trimmed)).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let client = OpenAiClient::new("sk-test")
            .unwrap()
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(
            client.api_url("audio/transcriptions"),
            "http://localhost:8080/v1/audio/transcriptions"
        );
    }

    #[test]
    fn test_parse_summary() {
        let summary = parse_summary(r#"{"summary": "要点", "shortform": "短文"}"#).unwrap();
        assert_eq!(summary.summary, "要点");
        assert_eq!(summary.shortform, "短文");

        let fenced = parse_summary("```json\n{\"summary\": \"a\", \"x\": \"b\"}\n```").unwrap();
        assert_eq!(fenced.shortform, "b");
    }

    #[test]
    fn test_parse_summary_missing_field() {
        let err = parse_summary(r#"{"summary": "only"}"#).unwrap_err();
        assert!(err.downcast_ref::<OpenAiError>().is_some());
    }
}
