//! Voice note ingestion.
//!
//! ```text
//! audio file → Transcriber → Summarizer → Vault::save_and_link → Reporter
//!                                              ↓
//!                                   <vault>/<ts>_[<title>].md
//! ```
//!
//! Only one attachment is processed per run.

pub mod pipeline;

pub use pipeline::{is_audio, IngestError, IngestPipeline, ProcessedNote, AUDIO_EXTENSIONS};
