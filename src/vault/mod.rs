//! The note vault: a directory of markdown notes that link to each other.
//!
//! # Storage Layout
//!
//! ```text
//! <vault>/
//! ├── .voxnote.lock                         # Held while a save is running
//! ├── 20240101_093000_[Meeting_Notes].md
//! └── 20240101_101500_[Standup].md
//! ```
//!
//! A saved note is written once, then gets a related-notes section appended
//! once. Older notes are never touched by later saves.

pub mod naming;
pub mod store;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{info, warn};

use crate::linker::SimilarityLinker;

pub use naming::{sanitize_title, stem};
pub use store::NoteStore;

/// Name of the lock file that serializes saves within one vault
pub const LOCK_FILE: &str = ".voxnote.lock";

/// Errors raised by the vault and the linker
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl VaultError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type VaultResult<T> = Result<T, VaultError>;

/// A failed save, and whether the note reached the vault before it failed
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SaveFailure {
    /// Identifier of the note when it was written but not linked
    pub persisted: Option<String>,
    pub error: VaultError,
}

impl SaveFailure {
    fn not_written(error: VaultError) -> Self {
        Self {
            persisted: None,
            error,
        }
    }
}

/// Result of a save: the new note and the notes it links to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedNote {
    /// Identifier (file name) of the new note
    pub identifier: String,

    /// Related note identifiers, most similar first
    pub related: Vec<String>,
}

/// A vault directory plus the linker used to connect new notes
#[derive(Clone)]
pub struct Vault {
    store: NoteStore,
    linker: SimilarityLinker,
}

impl Vault {
    pub fn open(path: impl Into<PathBuf>, linker: SimilarityLinker) -> VaultResult<Self> {
        Ok(Self {
            store: NoteStore::new(path)?,
            linker,
        })
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn linker(&self) -> &SimilarityLinker {
        &self.linker
    }

    pub fn path(&self) -> &Path {
        self.store.root()
    }

    /// Save a note and link it to the most similar existing notes.
    ///
    /// The note is durably written before any linking happens. If linking
    /// fails the note stays in the vault without a related-notes section and
    /// the error is returned. Use [`Vault::save_note`] to also learn whether
    /// the note was written.
    pub async fn save_and_link(&self, title: &str, content: &str) -> VaultResult<SavedNote> {
        self.save_note(title, content).await.map_err(|f| f.error)
    }

    /// Same as [`Vault::save_and_link`], but a failure carries the
    /// identifier of the note when it was already written.
    pub async fn save_note(&self, title: &str, content: &str) -> Result<SavedNote, SaveFailure> {
        let _lock = self.lock().await.map_err(SaveFailure::not_written)?;

        let identifier = self
            .store
            .write(title, content)
            .await
            .map_err(SaveFailure::not_written)?;
        info!(identifier = %identifier, vault = %self.path().display(), "saved note");

        let related = match self.link(&identifier, content).await {
            Ok(related) => related,
            Err(error) => {
                warn!(identifier = %identifier, error = %error, "note saved but not linked");
                return Err(SaveFailure {
                    persisted: Some(identifier),
                    error,
                });
            }
        };

        if !related.is_empty() {
            info!(identifier = %identifier, related = ?related, "linked related notes");
        }

        Ok(SavedNote {
            identifier,
            related,
        })
    }

    /// Rank existing notes against `content` without writing anything
    pub async fn find_related(&self, content: &str) -> VaultResult<Vec<String>> {
        let others = self.store.list_others("").await?;
        self.linker.related(content, &others).await
    }

    async fn link(&self, identifier: &str, content: &str) -> VaultResult<Vec<String>> {
        let others = self.store.list_others(identifier).await?;
        if others.is_empty() {
            return Ok(Vec::new());
        }

        let related = self.linker.related(content, &others).await?;
        let block = self.linker.render_links(&related);
        if !block.is_empty() {
            self.store.append(identifier, &block).await?;
        }

        Ok(related)
    }

    /// Take the vault-wide exclusive lock; released when the guard drops
    async fn lock(&self) -> VaultResult<std::fs::File> {
        self.store.ensure_dir().await?;

        let lock_path = self.path().join(LOCK_FILE);
        tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&lock_path)
                .map_err(|e| VaultError::storage(&lock_path, e))?;
            file.lock_exclusive()
                .map_err(|e| VaultError::storage(&lock_path, e))?;
            Ok::<_, VaultError>(file)
        })
        .await
        .map_err(|e| {
            VaultError::storage(
                self.path().join(LOCK_FILE),
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?
    }
}
