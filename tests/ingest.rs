//! Ingest Pipeline Integration Tests
//!
//! Runs the audio-to-note pipeline with in-process transcriber, summarizer
//! and reporter stand-ins.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use voxnote::adapters::{Reporter, Summarizer, Summary, Transcriber};
use voxnote::ingest::pipeline::{
    MSG_FAILED, MSG_NOT_SAVED, MSG_SAVED_UNLINKED, MSG_SUMMARIZING, MSG_TRANSCRIBING,
};
use voxnote::ingest::{IngestError, IngestPipeline};
use voxnote::linker::{EmbeddingProvider, HashingEmbeddingProvider, SimilarityLinker};
use voxnote::vault::{Vault, VaultError};

struct FixedTranscriber(&'static str);

#[async_trait]
impl Transcriber for FixedTranscriber {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct BrokenTranscriber;

#[async_trait]
impl Transcriber for BrokenTranscriber {
    fn name(&self) -> &str {
        "broken"
    }

    async fn transcribe(&self, _audio_path: &Path) -> Result<String> {
        anyhow::bail!("unsupported format")
    }
}

struct EchoSummarizer;

#[async_trait]
impl Summarizer for EchoSummarizer {
    async fn summarize(&self, text: &str) -> Result<Summary> {
        Ok(Summary {
            summary: format!("Summary: {}", text),
            shortform: "Short post".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingReporter {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report(&self, text: &str) -> Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct DownReporter;

#[async_trait]
impl Reporter for DownReporter {
    async fn report(&self, _text: &str) -> Result<()> {
        anyhow::bail!("chat unavailable")
    }
}

fn vault_in(temp: &TempDir) -> Vault {
    let linker = SimilarityLinker::new(Arc::new(HashingEmbeddingProvider::new(256)));
    Vault::open(temp.path().join("vault"), linker).unwrap()
}

#[tokio::test]
async fn test_process_saves_note_and_reports_in_order() {
    let temp = TempDir::new().unwrap();
    let reporter = Arc::new(RecordingReporter::default());
    let pipeline = IngestPipeline::new(
        Arc::new(FixedTranscriber("hello from the voice memo")),
        Arc::new(EchoSummarizer),
        vault_in(&temp),
    )
    .with_reporter(reporter.clone());

    let processed = pipeline
        .process(Path::new("/uploads/standup.notes.m4a"))
        .await
        .unwrap();

    let id = &processed.saved.identifier;
    assert!(id.contains("_[standup]"));

    let content = pipeline.vault().store().read(id).await.unwrap();
    assert_eq!(
        content,
        "# standup\n\n**書き起こし**\n\nhello from the voice memo\n\n---\n\nSummary: hello from the voice memo\n"
    );

    let messages = reporter.messages.lock().unwrap().clone();
    assert_eq!(
        messages,
        vec![
            MSG_TRANSCRIBING.to_string(),
            MSG_SUMMARIZING.to_string(),
            "hello from the voice memo".to_string(),
            "Summary: hello from the voice memo\n\nShort post".to_string(),
            format!("Obsidian: {}", id),
        ]
    );
}

#[tokio::test]
async fn test_non_audio_attachment_is_rejected() {
    let temp = TempDir::new().unwrap();
    let pipeline = IngestPipeline::new(
        Arc::new(FixedTranscriber("unused")),
        Arc::new(EchoSummarizer),
        vault_in(&temp),
    );

    let err = pipeline.process(Path::new("photo.jpg")).await.unwrap_err();
    assert!(matches!(err, IngestError::NotAudio(_)));
    assert!(!temp.path().join("vault").exists());
}

#[tokio::test]
async fn test_transcription_failure_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let pipeline = IngestPipeline::new(
        Arc::new(BrokenTranscriber),
        Arc::new(EchoSummarizer),
        vault_in(&temp),
    );

    let err = pipeline.process(Path::new("memo.ogg")).await.unwrap_err();
    assert!(matches!(err, IngestError::Transcription(_)));
    assert!(err.to_string().contains("unsupported format"));
    assert!(pipeline.vault().store().list_others("").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reporter_failure_does_not_fail_processing() {
    let temp = TempDir::new().unwrap();
    let pipeline = IngestPipeline::new(
        Arc::new(FixedTranscriber("text")),
        Arc::new(EchoSummarizer),
        vault_in(&temp),
    )
    .with_reporter(Arc::new(DownReporter));

    let processed = pipeline.process(Path::new("memo.webm")).await.unwrap();
    assert!(pipeline
        .vault()
        .store()
        .path_of(&processed.saved.identifier)
        .exists());
}

#[tokio::test]
async fn test_second_memo_links_to_first() {
    let temp = TempDir::new().unwrap();
    let pipeline = IngestPipeline::new(
        Arc::new(FixedTranscriber("weekly planning")),
        Arc::new(EchoSummarizer),
        vault_in(&temp),
    );

    let first = pipeline.process(Path::new("monday.mp3")).await.unwrap();
    let second = pipeline.process(Path::new("tuesday.mp3")).await.unwrap();

    assert_eq!(second.saved.related, vec![first.saved.identifier]);
}

/// Embedding service that is always down
struct FailingProvider;

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("connection refused")
    }
    fn dimensions(&self) -> usize {
        8
    }
    fn model_name(&self) -> &str {
        "failing"
    }
}

#[tokio::test]
async fn test_link_failure_reports_the_saved_note() {
    let temp = TempDir::new().unwrap();
    let vault = Vault::open(
        temp.path().join("vault"),
        SimilarityLinker::new(Arc::new(FailingProvider)),
    )
    .unwrap();
    let reporter = Arc::new(RecordingReporter::default());
    let pipeline = IngestPipeline::new(
        Arc::new(FixedTranscriber("budget talk")),
        Arc::new(EchoSummarizer),
        vault,
    )
    .with_reporter(reporter.clone());

    // Nothing to compare against, so no embedding is needed
    pipeline.process(Path::new("first.m4a")).await.unwrap();
    reporter.messages.lock().unwrap().clear();

    let err = pipeline.process(Path::new("second.m4a")).await.unwrap_err();
    let identifier = err.saved_identifier().unwrap().to_string();
    assert!(identifier.contains("_[second]"));
    match err {
        IngestError::Unlinked { ref source, .. } => {
            assert!(matches!(source, VaultError::Embedding(msg) if msg.contains("connection refused")))
        }
        ref other => panic!("unexpected error: {:?}", other),
    }
    assert!(pipeline.vault().store().path_of(&identifier).exists());

    let messages = reporter.messages.lock().unwrap().clone();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0], MSG_TRANSCRIBING);
    assert_eq!(messages[1], MSG_SUMMARIZING);
    assert!(messages[2].starts_with(MSG_FAILED));
    assert!(messages[2].contains("connection refused"));
    assert!(messages[2].contains(MSG_SAVED_UNLINKED));
    assert!(messages[2].ends_with(&format!("Obsidian: {}", identifier)));
}

#[tokio::test]
async fn test_write_failure_reports_nothing_saved() {
    let temp = TempDir::new().unwrap();
    let vault = vault_in(&temp);
    // A regular file where the vault directory should be
    std::fs::write(temp.path().join("vault"), "not a directory").unwrap();

    let reporter = Arc::new(RecordingReporter::default());
    let pipeline = IngestPipeline::new(
        Arc::new(FixedTranscriber("text")),
        Arc::new(EchoSummarizer),
        vault,
    )
    .with_reporter(reporter.clone());

    let err = pipeline.process(Path::new("memo.wav")).await.unwrap_err();
    assert!(matches!(err, IngestError::NotSaved(VaultError::Storage { .. })));
    assert!(err.saved_identifier().is_none());

    let messages = reporter.messages.lock().unwrap().clone();
    let last = messages.last().unwrap();
    assert!(last.starts_with(MSG_FAILED));
    assert!(last.contains(MSG_NOT_SAVED));
}
