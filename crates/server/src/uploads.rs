// On-disk image store backing the upload, list and delete endpoints.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use gallery_common::filename::{generate_stored_name, validate_stored_name, FilenameError};
use gallery_common::media::list_images;
use gallery_common::types::{upload_url, ImageEntry, UploadedFile};
use thiserror::Error;
use tracing::{info, warn};

/// Largest accepted single upload.
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Most files accepted in one upload request.
pub const MAX_FILES_PER_UPLOAD: usize = 20;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidName(#[from] FilenameError),

    #[error("image `{0}` not found")]
    NotFound(String),

    #[error("file exceeds maximum size of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("uploads I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Flat directory of uploaded images.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    max_file_bytes: usize,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), max_file_bytes: MAX_FILE_BYTES }
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    /// Create the uploads directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        if !self.dir.is_dir() {
            std::fs::create_dir_all(&self.dir)?;
            info!(uploads_dir = %self.dir.display(), "created uploads directory");
        }
        Ok(())
    }

    /// Write `bytes` under a freshly generated name derived from `original_name`.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<UploadedFile, StoreError> {
        if bytes.len() > self.max_file_bytes {
            return Err(StoreError::TooLarge { limit: self.max_file_bytes });
        }
        let filename = generate_stored_name(original_name, Utc::now().timestamp_millis())
            .ok_or_else(|| FilenameError::NotAnImage(original_name.to_string()))?;

        tokio::fs::write(self.dir.join(&filename), bytes).await?;
        info!(filename = %filename, original_name, bytes = bytes.len(), "stored upload");

        Ok(UploadedFile {
            url: upload_url(&filename),
            filename,
            original_name: original_name.to_string(),
        })
    }

    /// Best-effort removal of files written earlier in a failed request.
    pub async fn discard(&self, files: &[UploadedFile]) {
        for file in files {
            if let Err(error) = tokio::fs::remove_file(self.dir.join(&file.filename)).await {
                warn!(%error, filename = %file.filename, "failed to discard partial upload");
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<ImageEntry>, StoreError> {
        Ok(self.image_names().await?.into_iter().map(ImageEntry::new).collect())
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.image_names().await?.len())
    }

    /// Directory scan on the blocking pool.
    async fn image_names(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.dir.clone();
        let names = tokio::task::spawn_blocking(move || list_images(&dir))
            .await
            .map_err(io::Error::other)??;
        Ok(names)
    }

    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let name = validate_stored_name(name)?;
        match tokio::fs::remove_file(self.dir.join(name)).await {
            Ok(()) => {
                info!(filename = %name, "deleted image");
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_dir_creates_nested_directory() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path().join("a").join("uploads"));

        store.ensure_dir().unwrap();
        assert!(store.dir().is_dir());
        store.ensure_dir().unwrap();
    }

    #[tokio::test]
    async fn save_writes_file_under_generated_name() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path());

        let file = store.save("Cake.PNG", b"png-bytes").await.unwrap();
        assert!(file.filename.ends_with(".png"));
        assert_eq!(file.url, format!("/uploads/{}", file.filename));
        assert_eq!(file.original_name, "Cake.PNG");
        assert_eq!(std::fs::read(tmp.path().join(&file.filename)).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn save_rejects_non_images_and_oversized_files() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path()).with_max_file_bytes(4);

        assert!(matches!(
            store.save("notes.txt", b"hi").await,
            Err(StoreError::InvalidName(FilenameError::NotAnImage(_)))
        ));
        assert!(matches!(
            store.save("big.jpg", b"12345").await,
            Err(StoreError::TooLarge { limit: 4 })
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_and_delete() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.jpg"), b"b").unwrap();
        std::fs::write(tmp.path().join("a.gif"), b"a").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), b"r").unwrap();
        let store = ImageStore::new(tmp.path());

        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|e| e.filename).collect();
        assert_eq!(names, vec!["a.gif", "b.jpg"]);

        store.delete("a.gif").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        assert!(matches!(store.delete("a.gif").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete("../b.jpg").await, Err(StoreError::InvalidName(_))));
        assert!(matches!(store.delete("readme.txt").await, Err(StoreError::InvalidName(_))));
    }

    #[tokio::test]
    async fn discard_removes_written_files() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path());
        let file = store.save("a.jpg", b"a").await.unwrap();

        store.discard(&[file]).await;
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn scans_share_single_threaded_runtime_with_writes() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path());
        store.save("a.jpg", b"a").await.unwrap();
        store.save("b.webp", b"b").await.unwrap();

        let (listed, counted) = tokio::join!(store.list(), store.count());

        assert_eq!(listed.unwrap().len(), 2);
        assert_eq!(counted.unwrap(), 2);
    }

    #[tokio::test]
    async fn scanning_missing_directory_is_an_io_error() {
        let tmp = TempDir::new().unwrap();
        let store = ImageStore::new(tmp.path().join("missing"));

        assert!(matches!(store.list().await, Err(StoreError::Io(_))));
        assert!(matches!(store.count().await, Err(StoreError::Io(_))));
    }
}
