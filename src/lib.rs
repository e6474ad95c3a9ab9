//! voxnote - voice memos to linked vault notes
//!
//! Transcribes an audio file, summarizes the transcript, and saves the result
//! as a markdown note in an Obsidian-style vault. Each new note gets a
//! related-notes section linking the existing notes whose content is most
//! similar to it.
//!
//! # Modules
//!
//! - `vault`: Note storage and `save_and_link`
//! - `linker`: Embeddings, cosine ranking, link rendering
//! - `adapters`: External systems (OpenAI, whisper, ffmpeg, Telegram)
//! - `ingest`: Audio-to-note pipeline
//! - `config`: Layered configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Save a note from stdin and link it
//! echo "Discussed X" | voxnote save --title "Meeting Notes"
//!
//! # Process a voice memo end to end
//! voxnote process memo.m4a --notify
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod ingest;
pub mod linker;
pub mod vault;

// Re-export main types at crate root for convenience
pub use adapters::{Reporter, Summarizer, Summary, Transcriber};
pub use ingest::{IngestError, IngestPipeline, ProcessedNote};
pub use linker::{EmbeddingProvider, SimilarityLinker};
pub use vault::{NoteStore, SaveFailure, SavedNote, Vault, VaultError};
