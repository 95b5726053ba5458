use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::{Blobstore, BlobstoreError, Fetched};

/// A [Blobstore] that keeps every blob in process memory and never persists
/// anything. Clones share the same entries.
///
/// It always moves bytes itself: no operation ever redirects.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobstore {
    entries: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemoryBlobstore {
    /// The number of stored blobs
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no blob is stored
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Every stored path, in lexicographic order
    pub async fn paths(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl Blobstore for MemoryBlobstore {
    async fn get(&self, path: &str) -> Result<Fetched, BlobstoreError> {
        let entries = self.entries.read().await;
        entries
            .get(path)
            .cloned()
            .map(Fetched::Body)
            .ok_or_else(|| BlobstoreError::NotFound(path.to_string()))
    }

    async fn head(&self, path: &str) -> Result<Option<Url>, BlobstoreError> {
        if self.entries.read().await.contains_key(path) {
            Ok(None)
        } else {
            Err(BlobstoreError::NotFound(path.to_string()))
        }
    }

    async fn put(&self, path: &str, content: Option<Bytes>) -> Result<Option<Url>, BlobstoreError> {
        let content = content.ok_or_else(|| {
            BlobstoreError::Unsupported("the memory blobstore cannot hand out upload URLs".into())
        })?;

        debug!(path, size = content.len(), "Storing blob in memory");
        self.entries.write().await.insert(path.to_string(), content);
        Ok(None)
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<Option<Url>, BlobstoreError> {
        let mut entries = self.entries.write().await;
        let content = entries
            .get(source)
            .cloned()
            .ok_or_else(|| BlobstoreError::NotFound(source.to_string()))?;

        debug!(source, destination, "Copying blob in memory");
        entries.insert(destination.to_string(), content);
        Ok(None)
    }

    async fn exists(&self, path: &str) -> Result<bool, BlobstoreError> {
        Ok(self.entries.read().await.contains_key(path))
    }

    async fn delete(&self, path: &str) -> Result<(), BlobstoreError> {
        debug!(path, "Deleting blob from memory");
        self.entries
            .write()
            .await
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BlobstoreError::NotFound(path.to_string()))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), BlobstoreError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|path, _| !path.starts_with(prefix));

        debug!(prefix, deleted = before - entries.len(), "Deleted blobs from memory");
        Ok(())
    }
}
