//! Audio → transcript → summary → linked vault note.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::adapters::{Reporter, Summarizer, Summary, Transcriber};
use crate::vault::{SaveFailure, SavedNote, Vault, VaultError};

/// Extensions treated as audio attachments (case-insensitive)
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "ogg", "oga", "webm"];

/// Progress message sent before transcription
pub const MSG_TRANSCRIBING: &str = "文字起こし中…";

/// Progress message sent before summarization
pub const MSG_SUMMARIZING: &str = "要約中…";

/// First line of every failure report
pub const MSG_FAILED: &str = "処理に失敗しました";

/// Failure report line when nothing was written to the vault
pub const MSG_NOT_SAVED: &str = "メモは保存されていません";

/// Failure report line when the note was written but not linked
pub const MSG_SAVED_UNLINKED: &str = "メモは保存されましたが、関連メモはリンクされていません";

/// Errors that can occur while ingesting one audio file
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Not an audio file: {0}")]
    NotAudio(PathBuf),

    #[error("Transcription failed: {0:#}")]
    Transcription(anyhow::Error),

    #[error("Summarization failed: {0:#}")]
    Summarization(anyhow::Error),

    #[error("Saving the note failed, nothing was written: {0}")]
    NotSaved(#[source] VaultError),

    #[error("Note {identifier} was saved but not linked: {source}")]
    Unlinked {
        identifier: String,
        #[source]
        source: VaultError,
    },
}

impl From<SaveFailure> for IngestError {
    fn from(failure: SaveFailure) -> Self {
        match failure.persisted {
            Some(identifier) => Self::Unlinked {
                identifier,
                source: failure.error,
            },
            None => Self::NotSaved(failure.error),
        }
    }
}

impl IngestError {
    /// Identifier of the note if it reached the vault before the failure
    pub fn saved_identifier(&self) -> Option<&str> {
        match self {
            Self::Unlinked { identifier, .. } => Some(identifier),
            _ => None,
        }
    }

    /// Failure report for the chat. Non-audio attachments are ignored
    /// silently, so they have none.
    pub fn chat_message(&self) -> Option<String> {
        match self {
            Self::NotAudio(_) => None,
            Self::Unlinked { identifier, source } => Some(format!(
                "{}: {}\n{}\nObsidian: {}",
                MSG_FAILED, source, MSG_SAVED_UNLINKED, identifier
            )),
            other => Some(format!("{}: {}\n{}", MSG_FAILED, other, MSG_NOT_SAVED)),
        }
    }
}

/// Whether a path has one of the accepted audio extensions
pub fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Note title for an audio file: its file name up to the first `.`
pub fn note_title(path: &Path) -> String {
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    file_name.split('.').next().unwrap_or_default().to_string()
}

/// Note body stored in the vault (the heading is added by the store)
pub fn note_body(transcript: &str, summary: &Summary) -> String {
    format!(
        "**書き起こし**\n\n{}\n\n---\n\n{}\n",
        transcript, summary.summary
    )
}

/// Everything produced by ingesting one audio file
#[derive(Debug, Clone)]
pub struct ProcessedNote {
    pub transcript: String,
    pub summary: Summary,
    pub saved: SavedNote,
}

impl ProcessedNote {
    /// Result messages for the chat, in the order they are sent
    pub fn chat_messages(&self) -> Vec<String> {
        vec![
            self.transcript.clone(),
            format!("{}\n\n{}", self.summary.summary, self.summary.shortform),
            format!("Obsidian: {}", self.saved.identifier),
        ]
    }
}

/// Wires transcription, summarization, the vault and chat reporting
pub struct IngestPipeline {
    transcriber: Arc<dyn Transcriber>,
    summarizer: Arc<dyn Summarizer>,
    vault: Vault,
    reporter: Option<Arc<dyn Reporter>>,
}

impl IngestPipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn Summarizer>,
        vault: Vault,
    ) -> Self {
        Self {
            transcriber,
            summarizer,
            vault,
            reporter: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Reporting is best-effort; a failed chat message never fails the run
    async fn report(&self, text: &str) {
        if let Some(ref reporter) = self.reporter {
            if let Err(e) = reporter.report(text).await {
                warn!(error = %e, "failed to report to chat");
            }
        }
    }

    /// Transcribe, summarize, save and link one audio file, then report
    /// the results (or the failure) to the chat.
    pub async fn process(&self, audio_path: &Path) -> Result<ProcessedNote, IngestError> {
        if !is_audio(audio_path) {
            return Err(IngestError::NotAudio(audio_path.to_path_buf()));
        }

        match self.run(audio_path).await {
            Ok(processed) => {
                for message in processed.chat_messages() {
                    self.report(&message).await;
                }
                Ok(processed)
            }
            Err(e) => {
                if let Some(message) = e.chat_message() {
                    self.report(&message).await;
                }
                Err(e)
            }
        }
    }

    async fn run(&self, audio_path: &Path) -> Result<ProcessedNote, IngestError> {
        self.report(MSG_TRANSCRIBING).await;
        let transcript = self
            .transcriber
            .transcribe(audio_path)
            .await
            .map_err(IngestError::Transcription)?;
        info!(
            backend = self.transcriber.name(),
            chars = transcript.chars().count(),
            "transcribed audio"
        );

        self.report(MSG_SUMMARIZING).await;
        let summary = self
            .summarizer
            .summarize(&transcript)
            .await
            .map_err(IngestError::Summarization)?;

        let title = note_title(audio_path);
        let saved = self
            .vault
            .save_note(&title, &note_body(&transcript, &summary))
            .await?;

        Ok(ProcessedNote {
            transcript,
            summary,
            saved,
        })
    }
}
