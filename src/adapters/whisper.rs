//! Local Whisper transcription backend.
//!
//! Shells out to a local whisper binary for transcription.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::Transcriber;

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
}

/// Transcriber backed by the `whisper` command-line tool
#[derive(Debug, Clone)]
pub struct WhisperCli {
    binary_path: String,
    model: String,
    language: Option<String>,
}

impl WhisperCli {
    /// Uses `WHISPER_PATH` if set, otherwise `whisper` from `PATH`
    pub fn new(model: impl Into<String>) -> Self {
        let binary_path = std::env::var("WHISPER_PATH").unwrap_or_else(|_| "whisper".to_string());
        Self {
            binary_path,
            model: model.into(),
            language: None,
        }
    }

    /// Force a language instead of letting whisper detect it
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[async_trait]
impl Transcriber for WhisperCli {
    fn name(&self) -> &str {
        "whisper-cli"
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;

        let mut command = Command::new(&self.binary_path);
        command
            .arg(audio_path)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(temp_dir.path())
            .arg("--output_format")
            .arg("json");
        if let Some(ref language) = self.language {
            command.arg("--language").arg(language);
        }

        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to run whisper")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Whisper failed: {}", stderr);
        }

        let stem = audio_path.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = temp_dir.path().join(format!("{}.json", stem));

        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .context("Failed to read whisper output")?;

        let whisper: WhisperOutput =
            serde_json::from_str(&json_content).context("Failed to parse whisper JSON")?;

        Ok(whisper.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_output_parsing() {
        let json = r#"{"text": "  hello there ", "language": "en", "segments": []}"#;
        let parsed: WhisperOutput = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text.trim(), "hello there");
    }

    #[test]
    fn test_language_override() {
        let whisper = WhisperCli::new("base").with_language("ja");
        assert_eq!(whisper.model, "base");
        assert_eq!(whisper.language.as_deref(), Some("ja"));
        assert_eq!(whisper.name(), "whisper-cli");
    }
}
