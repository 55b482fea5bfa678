//! Cross-thread access to one handle.
//!
//! [`IndexedFile`] reads need `&mut self` because the gzip index moves its
//! decoder around. [`SharedIndexedFile`] serializes those calls behind a
//! mutex so clones can be handed to several threads or tasks.

use crate::config::IndexConfig;
use crate::error::{IgzError, Result};
use crate::file_handler::detection::Format;
use crate::file_handler::indexed::IndexedFile;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Cloneable, mutex-guarded [`IndexedFile`]
#[derive(Debug, Clone)]
pub struct SharedIndexedFile {
    inner: Arc<Mutex<IndexedFile>>,
}

impl SharedIndexedFile {
    pub fn new(file: IndexedFile) -> Self {
        Self {
            inner: Arc::new(Mutex::new(file)),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        IndexedFile::open(path).map(Self::new)
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: IndexConfig) -> Result<Self> {
        IndexedFile::open_with_config(path, config).map(Self::new)
    }

    /// See [`IndexedFile::read`]
    pub fn read(&self, buf: &mut [u8], off: u64) -> Result<usize> {
        self.inner.lock().read(buf, off)
    }

    /// See [`IndexedFile::read_vec`]
    pub fn read_vec(&self, len: u64, off: u64) -> Result<Vec<u8>> {
        self.inner.lock().read_vec(len, off)
    }

    /// Run [`read_vec`](Self::read_vec) on tokio's blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn read_async(&self, len: u64, off: u64) -> Result<Vec<u8>> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.lock().read_vec(len, off))
            .await
            .map_err(|e| IgzError::decompress_read(format!("read task failed: {}", e)))?
    }

    /// See [`IndexedFile::build_full_index`]
    pub fn build_full_index(&self) -> Result<()> {
        self.inner.lock().build_full_index()
    }

    pub fn format(&self) -> Format {
        self.inner.lock().format()
    }

    pub fn compressed_size(&self) -> u64 {
        self.inner.lock().compressed_size()
    }

    pub fn logical_size(&self) -> Option<u64> {
        self.inner.lock().logical_size()
    }

    pub fn checkpoint_count(&self) -> usize {
        self.inner.lock().checkpoint_count()
    }

    /// Recover the handle once no other clone is alive
    pub fn try_into_inner(self) -> std::result::Result<IndexedFile, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content).expect("Failed to write test content");
        file.flush().expect("Failed to flush test file");
        file
    }

    #[test]
    fn test_clones_share_one_handle() {
        let file = temp_file(b"shared content");
        let shared = SharedIndexedFile::open(file.path()).unwrap();
        let clone = shared.clone();

        assert_eq!(clone.read_vec(6, 0).unwrap(), b"shared");
        assert_eq!(shared.format(), Format::Plain);
        assert_eq!(shared.logical_size(), Some(14));

        let shared = shared.try_into_inner().unwrap_err();
        drop(clone);
        let handle = shared.try_into_inner().unwrap();
        handle.close();
    }

    #[test]
    fn test_reads_from_threads() {
        let content: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        let file = temp_file(&content);
        let shared = SharedIndexedFile::open(file.path()).unwrap();

        let workers: Vec<_> = (0..4u64)
            .map(|i| {
                let shared = shared.clone();
                std::thread::spawn(move || shared.read_vec(1000, i * 10_000).unwrap())
            })
            .collect();

        for (i, worker) in workers.into_iter().enumerate() {
            let start = i * 10_000;
            assert_eq!(worker.join().unwrap(), &content[start..start + 1000]);
        }
    }

    #[tokio::test]
    async fn test_read_async() {
        let file = temp_file(b"async read path");
        let shared = SharedIndexedFile::open(file.path()).unwrap();
        assert_eq!(shared.read_async(4, 6).await.unwrap(), b"read");
    }
}
