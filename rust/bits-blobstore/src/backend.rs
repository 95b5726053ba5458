use std::sync::Arc;

use async_trait::async_trait;
use bits_common::Clock;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

use crate::{
    Blobstore, BlobstoreConfig, BlobstoreError, Fetched, LocalResourceSigner,
    PartitioningPathDecorator, PartitioningPathResourceSigner, ResourceSigner, SigningError, Verb,
};

mod fs;
pub use fs::*;

mod memory;
pub use memory::*;

pub mod s3;
pub use s3::{S3Blobstore, S3ResourceSigner, TransferStyle};

/// The backends a [BlobstoreConfig] can select.
#[derive(Debug, Clone)]
pub enum Backend {
    /// See [MemoryBlobstore]
    Memory(MemoryBlobstore),
    /// See [LocalBlobstore]
    Local(LocalBlobstore),
    /// See [S3Blobstore]
    S3(S3Blobstore),
}

/// The signers a [BlobstoreConfig] can select.
#[derive(Debug, Clone)]
pub enum Signer {
    /// See [LocalResourceSigner]
    Local(LocalResourceSigner),
    /// See [S3ResourceSigner]
    S3(S3ResourceSigner),
}

/// A blobstore opened from configuration, decorated as configured.
#[derive(Clone)]
pub struct Opened {
    /// The blobstore
    pub blobstore: Arc<dyn Blobstore>,
    /// The matching signer, when the backend can have one
    pub signer: Option<Arc<dyn ResourceSigner>>,
}

impl Backend {
    /// Open the backend `config` describes, together with its signer.
    ///
    /// When path partitioning is configured both are wrapped, so signed URLs
    /// name the same sharded paths the blobstore writes to.
    pub async fn open(
        config: &BlobstoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Opened, BlobstoreError> {
        let (backend, signer) = match config {
            BlobstoreConfig::Memory { signing, .. } => {
                let signer = match signing {
                    Some(signing) => Some(Signer::Local(signing.signer(clock.clone())?)),
                    None => None,
                };
                (Backend::Memory(MemoryBlobstore::default()), signer)
            }
            BlobstoreConfig::Local { root, signing, .. } => {
                let signer = match signing {
                    Some(signing) => Some(Signer::Local(signing.signer(clock.clone())?)),
                    None => None,
                };
                (Backend::Local(LocalBlobstore::new(root).await?), signer)
            }
            BlobstoreConfig::S3(s3) => {
                let credentials = s3.credentials()?;
                let signer = S3ResourceSigner::new(credentials.clone(), clock.clone());
                (
                    Backend::S3(S3Blobstore::new(credentials, s3.style, clock)),
                    Some(Signer::S3(signer)),
                )
            }
        };

        debug!(
            ?backend,
            partitioned = config.path_partitioning(),
            "Opened blobstore"
        );

        Ok(if config.path_partitioning() {
            Opened {
                blobstore: Arc::new(PartitioningPathDecorator::new(backend)),
                signer: signer.map(|signer| {
                    Arc::new(PartitioningPathResourceSigner::new(signer)) as Arc<dyn ResourceSigner>
                }),
            }
        } else {
            Opened {
                blobstore: Arc::new(backend),
                signer: signer.map(|signer| Arc::new(signer) as Arc<dyn ResourceSigner>),
            }
        })
    }
}

#[async_trait]
impl Blobstore for Backend {
    async fn get(&self, path: &str) -> Result<Fetched, BlobstoreError> {
        match self {
            Backend::Memory(store) => store.get(path).await,
            Backend::Local(store) => store.get(path).await,
            Backend::S3(store) => store.get(path).await,
        }
    }

    async fn head(&self, path: &str) -> Result<Option<Url>, BlobstoreError> {
        match self {
            Backend::Memory(store) => store.head(path).await,
            Backend::Local(store) => store.head(path).await,
            Backend::S3(store) => store.head(path).await,
        }
    }

    async fn put(&self, path: &str, content: Option<Bytes>) -> Result<Option<Url>, BlobstoreError> {
        match self {
            Backend::Memory(store) => store.put(path, content).await,
            Backend::Local(store) => store.put(path, content).await,
            Backend::S3(store) => store.put(path, content).await,
        }
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<Option<Url>, BlobstoreError> {
        match self {
            Backend::Memory(store) => store.copy(source, destination).await,
            Backend::Local(store) => store.copy(source, destination).await,
            Backend::S3(store) => store.copy(source, destination).await,
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, BlobstoreError> {
        match self {
            Backend::Memory(store) => store.exists(path).await,
            Backend::Local(store) => store.exists(path).await,
            Backend::S3(store) => store.exists(path).await,
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobstoreError> {
        match self {
            Backend::Memory(store) => store.delete(path).await,
            Backend::Local(store) => store.delete(path).await,
            Backend::S3(store) => store.delete(path).await,
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), BlobstoreError> {
        match self {
            Backend::Memory(store) => store.delete_prefix(prefix).await,
            Backend::Local(store) => store.delete_prefix(prefix).await,
            Backend::S3(store) => store.delete_prefix(prefix).await,
        }
    }
}

impl ResourceSigner for Signer {
    fn sign(&self, path: &str, verb: Verb, expiration: DateTime<Utc>) -> Result<Url, SigningError> {
        match self {
            Signer::Local(signer) => signer.sign(path, verb, expiration),
            Signer::S3(signer) => signer.sign(path, verb, expiration),
        }
    }
}
