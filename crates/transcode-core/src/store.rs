//! Blob store adapter.
//!
//! The core only requires open/stat/put/delete from whatever resource
//! provider backs the cache — a filesystem directory, an object store,
//! anything else. [`FsBlobStore`] is the one concrete implementation
//! this crate ships (sufficient for ranged HTTP serving and for tests);
//! any other implementor of [`BlobStore`] is equally valid.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobInstance: Send + Sync {
    async fn exists(&self) -> bool;

    /// Stores the contents read from `reader`, overwriting any existing
    /// entry. On failure the instance is deleted so a half-written
    /// artifact is never left observable via [`Self::exists`].
    async fn put(&self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<(), StoreError>;

    /// Returns a ranged reader if, and only if, the artifact is fully
    /// written and durable. `None` means "absent or incomplete" — the
    /// caller must not distinguish the two.
    async fn open_range_reader(
        &self,
    ) -> Option<Box<dyn AsyncRangeRead>>;

    async fn delete(&self) -> Result<(), StoreError>;
}

pub trait AsyncRangeRead: AsyncRead + AsyncSeek + Unpin + Send {}
impl<T: AsyncRead + AsyncSeek + Unpin + Send> AsyncRangeRead for T {}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns a stable, idempotent handle for `name` — repeated calls
    /// for the same name address the same logical entry.
    async fn instance(&self, name: &str) -> Result<Box<dyn BlobInstance>, StoreError>;
}

/// Filesystem-backed blob store rooted at a configured directory.
#[derive(Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn instance(&self, name: &str) -> Result<Box<dyn BlobInstance>, StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(Box::new(FsBlobInstance {
            path: self.root.join(name),
        }))
    }
}

struct FsBlobInstance {
    path: PathBuf,
}

#[async_trait]
impl BlobInstance for FsBlobInstance {
    async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path).await.is_ok()
    }

    async fn put(&self, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<(), StoreError> {
        let result = async {
            let mut file = File::create(&self.path).await?;
            tokio::io::copy(reader, &mut file).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&self.path).await;
        }
        result.map_err(StoreError::from)
    }

    async fn open_range_reader(&self) -> Option<Box<dyn AsyncRangeRead>> {
        let file = File::open(&self.path).await.ok()?;
        Some(Box::new(file))
    }

    async fn delete(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn put_then_exists_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let instance = store.instance("out.mp4").await.unwrap();
        assert!(!instance.exists().await);
        assert!(instance.open_range_reader().await.is_none());

        let mut data = Cursor::new(b"hello world".to_vec());
        instance.put(&mut data).await.unwrap();
        assert!(instance.exists().await);
        assert!(instance.open_range_reader().await.is_some());

        instance.delete().await.unwrap();
        assert!(!instance.exists().await);
    }

    #[tokio::test]
    async fn instance_is_idempotent_for_the_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let a = store.instance("x.mp4").await.unwrap();
        let mut data = Cursor::new(b"abc".to_vec());
        a.put(&mut data).await.unwrap();

        let b = store.instance("x.mp4").await.unwrap();
        assert!(b.exists().await);
    }

    #[tokio::test]
    async fn delete_of_missing_entry_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let instance = store.instance("never-written.mp4").await.unwrap();
        instance.delete().await.unwrap();
    }
}
