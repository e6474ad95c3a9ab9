//! Command-line interface for voxnote.
//!
//! Provides commands for saving notes into the vault, processing voice
//! memos end to end, previewing related notes, and showing configuration.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::{OpenAiClient, Summarizer, TelegramClient, Transcriber, WhisperCli};
use crate::config::{self, EmbeddingBackend, ResolvedConfig};
use crate::ingest::{IngestError, IngestPipeline};
use crate::vault::{stem, SaveFailure};

/// voxnote - voice memos to linked vault notes
#[derive(Parser, Debug)]
#[command(name = "voxnote")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save a note to the vault and link related notes
    Save {
        /// Note title
        #[arg(short, long)]
        title: String,

        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Transcribe, summarize and save a voice memo
    Process {
        /// Audio file (wav, mp3, m4a, ogg, oga, webm)
        audio: PathBuf,

        /// Transcription backend
        #[arg(long, value_enum, default_value = "openai")]
        backend: TranscribeBackend,

        /// Whisper model (whisper backend only)
        #[arg(long, default_value = "base")]
        model: String,

        /// Spoken language, e.g. "ja" (whisper backend only; detected if omitted)
        #[arg(long)]
        language: Option<String>,

        /// Report progress and results to Telegram
        #[arg(long)]
        notify: bool,
    },

    /// Show which notes are most related to some text, without saving
    Related {
        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Number of notes to show (defaults to the configured top_k)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Speech-to-text backend selection
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TranscribeBackend {
    /// OpenAI transcription API
    Openai,

    /// Local whisper binary
    Whisper,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Save { title, input } => save_note(&title, input).await,
            Commands::Process {
                audio,
                backend,
                model,
                language,
                notify,
            } => process_audio(audio, backend, &model, language, notify).await,
            Commands::Related { input, limit } => show_related(input, limit).await,
            Commands::Config => show_config().await,
        }
    }
}

/// Read input from a file, or from stdin when it is piped
fn read_input(input_file: Option<PathBuf>) -> Result<String> {
    if let Some(path) = input_file {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()));
    }

    if io::stdin().is_terminal() {
        anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

/// Save a note and print its identifier and links
async fn save_note(title: &str, input_file: Option<PathBuf>) -> Result<()> {
    let content = read_input(input_file)?;
    let vault = config::config()?.open_vault()?;

    let saved = match vault.save_note(title, &content).await {
        Ok(saved) => saved,
        Err(SaveFailure {
            persisted: Some(identifier),
            error,
        }) => anyhow::bail!(
            "Linking related notes failed: {}\nThe note was saved as {} without a related-notes section.",
            error,
            vault.store().path_of(&identifier).display()
        ),
        Err(failure) => {
            return Err(failure.error).context("Saving the note failed, nothing was written")
        }
    };

    println!("{}", saved.identifier);
    if saved.related.is_empty() {
        eprintln!("[no related notes]");
    } else {
        for related in &saved.related {
            eprintln!("  → [[{}]]", stem(related));
        }
    }

    Ok(())
}

/// Build the transcriber for the chosen backend
fn build_transcriber(
    cfg: &ResolvedConfig,
    backend: TranscribeBackend,
    model: &str,
    language: Option<String>,
) -> Result<Arc<dyn Transcriber>> {
    let transcriber: Arc<dyn Transcriber> = match backend {
        TranscribeBackend::Openai => Arc::new(openai_client(cfg)?),
        TranscribeBackend::Whisper => {
            let mut whisper = WhisperCli::new(model);
            if let Some(language) = language {
                whisper = whisper.with_language(language);
            }
            Arc::new(whisper)
        }
    };
    Ok(transcriber)
}

fn openai_client(cfg: &ResolvedConfig) -> Result<OpenAiClient> {
    let api_key = cfg
        .openai_api_key
        .clone()
        .context("OpenAI API key not set. Set OPENAI_API_KEY or openai.api_key in .voxnote/config.yaml")?;

    Ok(OpenAiClient::new(api_key)?
        .with_base_url(cfg.openai_base_url.clone())
        .with_chat_model(cfg.chat_model.clone()))
}

/// Run the full voice memo pipeline on one file
async fn process_audio(
    audio: PathBuf,
    backend: TranscribeBackend,
    model: &str,
    language: Option<String>,
    notify: bool,
) -> Result<()> {
    let cfg = config::config()?;

    let transcriber = build_transcriber(cfg, backend, model, language)?;
    let summarizer: Arc<dyn Summarizer> = Arc::new(openai_client(cfg)?);
    let mut pipeline = IngestPipeline::new(transcriber, summarizer, cfg.open_vault()?);

    if notify {
        let telegram = cfg
            .telegram
            .clone()
            .context("--notify needs TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID")?;
        pipeline = pipeline.with_reporter(Arc::new(TelegramClient::from_config(telegram)));
    }

    match pipeline.process(&audio).await {
        Ok(processed) => {
            for message in processed.chat_messages() {
                println!("{}", message);
                println!();
            }
            Ok(())
        }
        Err(IngestError::Unlinked { identifier, source }) => {
            anyhow::bail!(
                "Linking related notes failed: {}\nThe note was saved as {} without a related-notes section.",
                source,
                pipeline.vault().store().path_of(&identifier).display()
            )
        }
        Err(e) => Err(e.into()),
    }
}

/// Print the notes most related to the input text
async fn show_related(input_file: Option<PathBuf>, limit: Option<usize>) -> Result<()> {
    let content = read_input(input_file)?;
    let cfg = config::config()?;

    let mut linker = cfg.linker()?;
    if let Some(limit) = limit {
        linker = linker.with_top_k(limit);
    }
    let vault = crate::vault::Vault::open(&cfg.vault, linker)?;

    let related = vault.find_related(&content).await?;
    if related.is_empty() {
        println!("(no notes in {})", vault.path().display());
    }
    for (i, identifier) in related.iter().enumerate() {
        println!("{}. [[{}]]", i + 1, stem(identifier));
    }

    Ok(())
}

/// Mask a secret for display
fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{}…", visible)
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("══════════════════════════════════════════════════════════════");
    println!("  voxnote Configuration");
    println!("══════════════════════════════════════════════════════════════");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Vault:");
    println!("  Path:          {}", cfg.vault.display());
    println!("  Link heading:  {}", cfg.link_heading);
    println!("  Related notes: {}", cfg.top_k);
    println!();
    println!("Embedding:");
    match &cfg.embedding.backend {
        EmbeddingBackend::FastEmbed { model, cache_dir } => {
            println!("  Provider:   fastembed (local)");
            println!("  Model:      {}", model);
            println!(
                "  Cache:      {}",
                cache_dir
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(fastembed default)".to_string())
            );
        }
        EmbeddingBackend::Http {
            url,
            model,
            api_key,
            dimensions,
        } => {
            println!("  Provider:   http");
            println!("  URL:        {}", url);
            println!("  Model:      {}", model);
            println!("  Dimensions: {}", dimensions);
            println!(
                "  API key:    {}",
                api_key.as_deref().map(mask).unwrap_or_else(|| "(none)".to_string())
            );
        }
    }
    match cfg.embedding.timeout {
        Some(t) => println!("  Timeout:    {}s", t.as_secs()),
        None => println!("  Timeout:    (none)"),
    }
    println!();
    println!("OpenAI:");
    println!("  Base URL:   {}", cfg.openai_base_url);
    println!("  Chat model: {}", cfg.chat_model);
    println!(
        "  API key:    {}",
        cfg.openai_api_key
            .as_deref()
            .map(mask)
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!();
    match &cfg.telegram {
        Some(t) => println!("Telegram: chat {} (token {})", t.chat_id, mask(&t.bot_token)),
        None => println!("Telegram: (not configured)"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_keeps_prefix_only() {
        assert_eq!(mask("sk-abcdef"), "sk-a…");
        assert_eq!(mask("ab"), "ab…");
    }

    #[test]
    fn test_cli_parses_process_command() {
        let cli = Cli::try_parse_from([
            "voxnote", "process", "memo.m4a", "--backend", "whisper", "--language", "ja",
            "--notify",
        ])
        .unwrap();
        match cli.command {
            Commands::Process {
                audio,
                backend,
                language,
                notify,
                ..
            } => {
                assert_eq!(audio, PathBuf::from("memo.m4a"));
                assert!(matches!(backend, TranscribeBackend::Whisper));
                assert_eq!(language.as_deref(), Some("ja"));
                assert!(notify);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_save_requires_title() {
        assert!(Cli::try_parse_from(["voxnote", "save"]).is_err());
        assert!(Cli::try_parse_from(["voxnote", "save", "--title", "Notes"]).is_ok());
    }
}
