//! Directory sharding for blob paths.
//!
//! Hierarchical stores degrade when one directory holds millions of entries.
//! [shard] spreads identifiers over two levels of directories named after
//! their leading characters, so `e0c6189f...` lands in `e0/c6/e0c6189f...`.
//! [PartitioningPathDecorator] and [PartitioningPathResourceSigner] apply the
//! same rewrite in front of a [Blobstore] and a [ResourceSigner], so signed
//! URLs always point where the content was written.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::trace;
use url::Url;

use crate::{Blobstore, BlobstoreError, Fetched, ResourceSigner, SigningError, Verb};

/// Rewrite `identifier` into its sharded path.
///
/// | identifier | sharded path |
/// |---|---|
/// | `""` | `""` |
/// | `"a"` | `"a/a"` |
/// | `"ab"` | `"ab/ab"` |
/// | `"abc"` | `"ab/c/abc"` |
/// | `"abcdef"` | `"ab/cd/abcdef"` |
///
/// Slices count characters, so a multi-byte character is never split.
pub fn shard(identifier: &str) -> String {
    let boundary = |position: usize| {
        identifier
            .char_indices()
            .nth(position)
            .map(|(offset, _)| offset)
            .unwrap_or(identifier.len())
    };

    match identifier.chars().count() {
        0 => String::new(),
        1 | 2 => format!("{identifier}/{identifier}"),
        _ => {
            let first = boundary(2);
            let second = boundary(4);
            format!(
                "{}/{}/{identifier}",
                &identifier[..first],
                &identifier[first..second]
            )
        }
    }
}

/// A [Blobstore] that shards every path with [shard] before delegating.
#[derive(Debug, Clone)]
pub struct PartitioningPathDecorator<B> {
    delegate: B,
}

impl<B> PartitioningPathDecorator<B>
where
    B: Blobstore,
{
    /// Wrap `delegate`
    pub fn new(delegate: B) -> Self {
        Self { delegate }
    }

    /// The wrapped [Blobstore]
    pub fn delegate(&self) -> &B {
        &self.delegate
    }

    /// Unwrap the decorated [Blobstore]
    pub fn into_inner(self) -> B {
        self.delegate
    }
}

fn partitioned(path: &str) -> String {
    let sharded = shard(path);
    trace!(path, sharded, "Partitioned blob path");
    sharded
}

#[async_trait]
impl<B> Blobstore for PartitioningPathDecorator<B>
where
    B: Blobstore,
{
    async fn get(&self, path: &str) -> Result<Fetched, BlobstoreError> {
        self.delegate.get(&partitioned(path)).await
    }

    async fn head(&self, path: &str) -> Result<Option<Url>, BlobstoreError> {
        self.delegate.head(&partitioned(path)).await
    }

    async fn put(&self, path: &str, content: Option<Bytes>) -> Result<Option<Url>, BlobstoreError> {
        self.delegate.put(&partitioned(path), content).await
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<Option<Url>, BlobstoreError> {
        self.delegate
            .copy(&partitioned(source), &partitioned(destination))
            .await
    }

    async fn exists(&self, path: &str) -> Result<bool, BlobstoreError> {
        self.delegate.exists(&partitioned(path)).await
    }

    async fn delete(&self, path: &str) -> Result<(), BlobstoreError> {
        self.delegate.delete(&partitioned(path)).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), BlobstoreError> {
        if prefix.is_empty() {
            self.delegate.delete_prefix(prefix).await
        } else {
            self.delegate.delete_prefix(&partitioned(prefix)).await
        }
    }
}

/// A [ResourceSigner] that shards the path with [shard] before delegating.
#[derive(Debug, Clone)]
pub struct PartitioningPathResourceSigner<S> {
    delegate: S,
}

impl<S> PartitioningPathResourceSigner<S>
where
    S: ResourceSigner,
{
    /// Wrap `delegate`
    pub fn new(delegate: S) -> Self {
        Self { delegate }
    }

    /// The wrapped [ResourceSigner]
    pub fn delegate(&self) -> &S {
        &self.delegate
    }
}

impl<S> ResourceSigner for PartitioningPathResourceSigner<S>
where
    S: ResourceSigner,
{
    fn sign(&self, path: &str, verb: Verb, expiration: DateTime<Utc>) -> Result<Url, SigningError> {
        self.delegate.sign(&partitioned(path), verb, expiration)
    }
}
