#![warn(missing_docs)]

//! This crate stores opaque blobs behind one narrow [Blobstore] trait, with
//! interchangeable backends ([MemoryBlobstore], [LocalBlobstore],
//! [S3Blobstore]) and behavior layered on by wrapping:
//!
//! - [ContentAddressableStore] files content under its SHA-256 digest, with
//!   optional aliases, and refuses to serve content that no longer matches.
//! - [PartitioningPathDecorator] shards paths (`e0c6...` becomes
//!   `e0/c6/e0c6...`) so no directory grows unbounded, and
//!   [PartitioningPathResourceSigner] shards the paths it signs the same way.
//! - [ResourceSigner]s issue time-boxed URLs for direct access to a blob, and
//!   [SignResourceHandler] serves them for one hour at a time.
//!
//! ```rust
//! use bits_blobstore::{ContentAddressableStore, MemoryBlobstore, PartitioningPathDecorator};
//!
//! # fn main() -> anyhow::Result<()> {
//! # tokio::runtime::Builder::new_current_thread().build()?.block_on(async {
//! let store = ContentAddressableStore::new(PartitioningPathDecorator::new(
//!     MemoryBlobstore::default(),
//! ));
//!
//! let (digest, _) = store.put_with_id("greeting", &b"here-is-some-content"[..]).await?;
//! assert_eq!(
//!     digest.to_string(),
//!     "sha256:e0c6189f72b0e909e963116fb71625186098e75a843abffc6f7f5ab53df8cdd3"
//! );
//!
//! let mut content = Vec::new();
//! store.get("greeting", &mut content).await?;
//! assert_eq!(content, b"here-is-some-content");
//! # Ok(())
//! # })
//! # }
//! ```
//!
//! Deployments usually pick a backend through [BlobstoreConfig] and
//! [Backend::open], which also applies path partitioning when configured.

mod error;
pub use error::*;

mod blobstore;
pub use blobstore::*;

mod signer;
pub use signer::*;

mod partitioning;
pub use partitioning::*;

mod content_addressed;
pub use content_addressed::*;

mod handler;
pub use handler::*;

mod backend;
pub use backend::*;

mod config;
pub use config::*;

/// In-process S3-compatible server for integration tests
#[cfg(any(test, feature = "helpers"))]
pub mod helpers;

pub use bits_common::{Clock, Digest, FixedClock, SystemClock};
