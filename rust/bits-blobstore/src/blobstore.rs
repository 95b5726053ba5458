use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::BlobstoreError;

/// The outcome of [Blobstore::get]: either the blob itself, or a location the
/// caller must fetch it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// The blob content
    Body(Bytes),
    /// A (usually signed) URL that serves the blob
    Redirect(Url),
}

impl Fetched {
    /// The redirect location, if this is a redirect
    pub fn redirect(&self) -> Option<&Url> {
        match self {
            Fetched::Redirect(location) => Some(location),
            Fetched::Body(_) => None,
        }
    }
}

/// A [Blobstore] stores opaque blobs under `/`-delimited paths.
///
/// Operations complete the backend round trip before returning. A backend
/// may answer with a redirect instead of moving bytes itself: callers turn
/// `Some(url)` / [Fetched::Redirect] into a redirect response and everything
/// else into a direct one.
#[async_trait]
pub trait Blobstore: Send + Sync {
    /// Retrieve the blob at `path`, or a location serving it
    async fn get(&self, path: &str) -> Result<Fetched, BlobstoreError>;

    /// Check that the blob at `path` exists, optionally redirecting to it.
    /// Fails with [BlobstoreError::NotFound] when it does not.
    async fn head(&self, path: &str) -> Result<Option<Url>, BlobstoreError>;

    /// Store `content` at `path`, or return a URL the caller must PUT the
    /// bytes to. Redirecting backends ignore `content`; proxying backends
    /// require it.
    async fn put(&self, path: &str, content: Option<Bytes>) -> Result<Option<Url>, BlobstoreError>;

    /// Copy the blob at `source` to `destination` without re-uploading it
    async fn copy(&self, source: &str, destination: &str) -> Result<Option<Url>, BlobstoreError>;

    /// Whether a blob exists at `path`
    async fn exists(&self, path: &str) -> Result<bool, BlobstoreError>;

    /// Remove the blob at `path`
    async fn delete(&self, path: &str) -> Result<(), BlobstoreError>;

    /// Remove every blob whose path starts with `prefix`; `""` removes all
    async fn delete_prefix(&self, prefix: &str) -> Result<(), BlobstoreError>;
}

#[async_trait]
impl<T> Blobstore for Arc<T>
where
    T: Blobstore + ?Sized,
{
    async fn get(&self, path: &str) -> Result<Fetched, BlobstoreError> {
        self.as_ref().get(path).await
    }

    async fn head(&self, path: &str) -> Result<Option<Url>, BlobstoreError> {
        self.as_ref().head(path).await
    }

    async fn put(&self, path: &str, content: Option<Bytes>) -> Result<Option<Url>, BlobstoreError> {
        self.as_ref().put(path, content).await
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<Option<Url>, BlobstoreError> {
        self.as_ref().copy(source, destination).await
    }

    async fn exists(&self, path: &str) -> Result<bool, BlobstoreError> {
        self.as_ref().exists(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), BlobstoreError> {
        self.as_ref().delete(path).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), BlobstoreError> {
        self.as_ref().delete_prefix(prefix).await
    }
}
