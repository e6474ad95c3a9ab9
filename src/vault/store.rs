//! File-backed note store.
//!
//! One markdown file per note, directly inside the vault directory. Nothing
//! is cached between calls: every operation goes to disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::naming::{compose_identifier, is_note_file, sanitize_title, timestamp_prefix};
use super::{VaultError, VaultResult};

/// Upper bound on collision suffixes tried for one timestamp + title
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Append-only store of markdown notes in a single directory
#[derive(Debug, Clone)]
pub struct NoteStore {
    root: PathBuf,
}

impl NoteStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// the first write.
    pub fn new(root: impl Into<PathBuf>) -> VaultResult<Self> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(VaultError::Configuration(
                "vault path must not be empty".to_string(),
            ));
        }
        if root.is_file() {
            return Err(VaultError::Configuration(format!(
                "vault path is a file, not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// The vault directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a note
    pub fn path_of(&self, identifier: &str) -> PathBuf {
        self.root.join(identifier)
    }

    /// Ensure the vault directory exists
    pub async fn ensure_dir(&self) -> VaultResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| VaultError::storage(&self.root, e))
    }

    /// Persist a new note and return its identifier.
    ///
    /// The body is `# <title>\n\n<content>`. Files are created with
    /// create-new semantics, so a second note with the same title in the
    /// same second gets a `_2`, `_3`, ... suffix instead of overwriting.
    pub async fn write(&self, title: &str, content: &str) -> VaultResult<String> {
        self.ensure_dir().await?;

        let prefix = timestamp_prefix(Local::now());
        let safe_title = sanitize_title(title);
        let body = format!("# {}\n\n{}", title, content);

        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let identifier = compose_identifier(&prefix, &safe_title, attempt);
            let path = self.path_of(&identifier);

            let mut file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(identifier = %identifier, "note name taken, trying next suffix");
                    continue;
                }
                Err(e) => return Err(VaultError::storage(&path, e)),
            };

            file.write_all(body.as_bytes())
                .await
                .map_err(|e| VaultError::storage(&path, e))?;
            file.flush()
                .await
                .map_err(|e| VaultError::storage(&path, e))?;

            return Ok(identifier);
        }

        Err(VaultError::storage(
            self.path_of(&compose_identifier(&prefix, &safe_title, 1)),
            std::io::Error::new(
                ErrorKind::AlreadyExists,
                "no free note name left for this timestamp and title",
            ),
        ))
    }

    /// Read a note's full content
    pub async fn read(&self, identifier: &str) -> VaultResult<String> {
        let path = self.path_of(identifier);
        fs::read_to_string(&path)
            .await
            .map_err(|e| VaultError::storage(&path, e))
    }

    /// Every note except `exclude`, read fully into memory.
    ///
    /// Results are sorted by identifier, but callers must not depend on any
    /// particular order. The first unreadable note aborts the whole listing.
    pub async fn list_others(&self, exclude: &str) -> VaultResult<Vec<(String, String)>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(VaultError::storage(&self.root, e)),
        };

        let mut identifiers = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VaultError::storage(&self.root, e))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name == exclude || !is_note_file(&name) {
                continue;
            }
            let is_file = entry
                .file_type()
                .await
                .map_err(|e| VaultError::storage(entry.path(), e))?
                .is_file();
            if is_file {
                identifiers.push(name);
            }
        }
        identifiers.sort();

        let mut notes = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            let content = self.read(&identifier).await?;
            notes.push((identifier, content));
        }

        Ok(notes)
    }

    /// Append text to an existing note. Never re-creates a vanished note.
    pub async fn append(&self, identifier: &str, text: &str) -> VaultResult<()> {
        let path = self.path_of(identifier);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| VaultError::storage(&path, e))?;

        file.write_all(text.as_bytes())
            .await
            .map_err(|e| VaultError::storage(&path, e))?;
        file.flush()
            .await
            .map_err(|e| VaultError::storage(&path, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read_returns_heading_and_content() {
        let temp = TempDir::new().unwrap();
        let store = NoteStore::new(temp.path().join("vault")).unwrap();

        let id = store.write("Meeting Notes", "Discussed X").await.unwrap();
        let content = store.read(&id).await.unwrap();

        assert_eq!(content, "# Meeting Notes\n\nDiscussed X");
        assert!(id.contains("_[Meeting_Notes]"));
        assert!(id.ends_with(".md"));
    }

    #[tokio::test]
    async fn test_same_title_same_second_gets_distinct_identifiers() {
        // Retry with a fresh vault until both writes land in the same second
        loop {
            let temp = TempDir::new().unwrap();
            let store = NoteStore::new(temp.path()).unwrap();

            let first = store.write("Same Title", "one").await.unwrap();
            let second = store.write("Same Title", "two").await.unwrap();
            if first[..15] != second[..15] {
                continue;
            }

            assert_ne!(first, second);
            assert!(second.ends_with("_[Same_Title]_2.md"), "got {}", second);
            assert_eq!(store.read(&first).await.unwrap(), "# Same Title\n\none");
            assert_eq!(store.read(&second).await.unwrap(), "# Same Title\n\ntwo");
            break;
        }
    }

    #[tokio::test]
    async fn test_list_others_excludes_and_filters() {
        let temp = TempDir::new().unwrap();
        let store = NoteStore::new(temp.path()).unwrap();

        let a = store.write("A", "alpha").await.unwrap();
        let b = store.write("B", "beta").await.unwrap();
        std::fs::write(temp.path().join("picture.png"), b"png").unwrap();
        std::fs::create_dir(temp.path().join("folder.md")).unwrap();

        let others = store.list_others(&b).await.unwrap();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].0, a);
        assert_eq!(others[0].1, "# A\n\nalpha");
    }

    #[tokio::test]
    async fn test_list_others_on_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = NoteStore::new(temp.path().join("not-yet")).unwrap();
        assert!(store.list_others("x.md").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_to_vanished_note_fails() {
        let temp = TempDir::new().unwrap();
        let store = NoteStore::new(temp.path()).unwrap();

        let id = store.write("Gone", "soon").await.unwrap();
        std::fs::remove_file(store.path_of(&id)).unwrap();

        let err = store.append(&id, "more").await.unwrap_err();
        assert!(matches!(err, VaultError::Storage { .. }));
        assert!(!store.path_of(&id).exists());
    }

    #[test]
    fn test_vault_path_that_is_a_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("vault.md");
        std::fs::write(&file, "x").unwrap();

        assert!(matches!(
            NoteStore::new(&file),
            Err(VaultError::Configuration(_))
        ));
        assert!(matches!(
            NoteStore::new(""),
            Err(VaultError::Configuration(_))
        ));
    }
}
