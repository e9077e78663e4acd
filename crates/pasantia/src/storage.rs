//! Content directory for uploaded documents.
//!
//! Physical names are `{uuid}_{original}` so concurrent uploads never collide; the
//! original name is kept as metadata by the caller. Stored paths are relative to the
//! content root.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::solicitudes::domain::IncomingFile;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("stored file '{0}' is missing from the content directory")]
    Missing(String),
    #[error("stored path '{0}' escapes the content directory")]
    InvalidPath(String),
    #[error("content directory i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A file written to disk, ready to be recorded in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Writes `file` under a randomized name.
    pub async fn store(&self, file: &IncomingFile) -> Result<StoredFile, StorageError> {
        self.ensure_root().await?;

        let original = display_name(&file.file_name);
        let physical = format!("{}_{}", Uuid::new_v4(), sanitize(&original));
        tokio::fs::write(self.root.join(&physical), &file.bytes).await?;
        debug!(file = %physical, bytes = file.bytes.len(), "document stored");

        let content_type = file.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&original)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });

        Ok(StoredFile {
            file_name: original,
            storage_path: physical,
            content_type,
        })
    }

    /// Stores every file, removing the ones already written if any write fails.
    pub async fn store_all(&self, files: &[IncomingFile]) -> Result<Vec<StoredFile>, StorageError> {
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            match self.store(file).await {
                Ok(written) => stored.push(written),
                Err(err) => {
                    self.discard(&stored).await;
                    return Err(err);
                }
            }
        }
        Ok(stored)
    }

    pub async fn read(&self, storage_path: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(storage_path)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::Missing(storage_path.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Best-effort removal of files whose database write did not commit.
    pub async fn discard(&self, files: &[StoredFile]) {
        for file in files {
            let Ok(path) = self.resolve(&file.storage_path) else {
                continue;
            };
            if let Err(err) = tokio::fs::remove_file(&path).await {
                warn!(file = %file.storage_path, error = %err, "unable to remove orphaned upload");
            }
        }
    }

    fn resolve(&self, storage_path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(storage_path);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !plain || storage_path.is_empty() {
            return Err(StorageError::InvalidPath(storage_path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

/// Final path component of a client-supplied name (browsers may send full paths).
fn display_name(raw: &str) -> String {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() {
        "archivo".to_string()
    } else {
        name.to_string()
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incoming(name: &str) -> IncomingFile {
        IncomingFile {
            file_name: name.to_string(),
            content_type: None,
            bytes: b"%PDF-1.7".to_vec(),
        }
    }

    #[tokio::test]
    async fn stores_under_randomized_name_and_reads_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::new(dir.path());

        let stored = store.store(&incoming("acta nacimiento.pdf")).await.expect("stored");
        assert_eq!(stored.file_name, "acta nacimiento.pdf");
        assert!(stored.storage_path.ends_with("_acta_nacimiento.pdf"));
        assert_eq!(stored.content_type, "application/pdf");

        let bytes = store.read(&stored.storage_path).await.expect("read back");
        assert_eq!(bytes, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn same_name_twice_does_not_collide() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::new(dir.path());

        let first = store.store(&incoming("cedula.png")).await.expect("first");
        let second = store.store(&incoming("cedula.png")).await.expect("second");
        assert_ne!(first.storage_path, second.storage_path);
    }

    #[tokio::test]
    async fn strips_client_directories_from_names() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::new(dir.path());

        let stored = store
            .store(&incoming("C:\\Users\\juan\\..\\carta.pdf"))
            .await
            .expect("stored");
        assert_eq!(stored.file_name, "carta.pdf");
        assert!(!stored.storage_path.contains(".."));
    }

    #[tokio::test]
    async fn missing_and_escaping_paths_are_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::new(dir.path());

        assert!(matches!(
            store.read("no-such-file.pdf").await,
            Err(StorageError::Missing(_))
        ));
        assert!(matches!(
            store.read("../etc/passwd").await,
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn discard_removes_written_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::new(dir.path());

        let stored = store
            .store_all(&[incoming("a.pdf"), incoming("b.pdf")])
            .await
            .expect("stored");
        store.discard(&stored).await;

        for file in &stored {
            assert!(matches!(
                store.read(&file.storage_path).await,
                Err(StorageError::Missing(_))
            ));
        }
    }
}
