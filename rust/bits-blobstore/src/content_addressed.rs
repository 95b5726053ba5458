use bits_common::Digest;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::{Blobstore, BlobstoreError, Fetched};

const ALIAS_SUFFIX: &str = ".alias";

/// A store that files content under its SHA-256 [Digest], with optional
/// caller-chosen aliases pointing at a digest.
///
/// Content lives at the lowercase hex of its digest; an alias lives at
/// `<alias>.alias` and holds the digest string. Reads recompute the digest and
/// refuse to serve content that does not match it.
///
/// Deleting content leaves aliases pointing at it in place (they then read as
/// [BlobstoreError::NotFound]), and deleting an alias leaves its content.
///
/// The wrapped [Blobstore] must move bytes itself: redirecting backends make
/// every read and write fail with [BlobstoreError::Unsupported].
#[derive(Debug, Clone)]
pub struct ContentAddressableStore<B> {
    blobstore: B,
}

/// A key into a [ContentAddressableStore]
#[derive(Debug, Clone, PartialEq, Eq)]
enum Key<'a> {
    Digest(Digest),
    Alias(&'a str),
}

impl<'a> Key<'a> {
    fn parse(key: &'a str) -> Result<Self, BlobstoreError> {
        if let Ok(digest) = key.parse::<Digest>() {
            return Ok(Key::Digest(digest));
        }
        if key.is_empty() {
            return Err(BlobstoreError::InvalidAlias(key.to_string()));
        }
        Ok(Key::Alias(key))
    }
}

fn content_path(digest: &Digest) -> String {
    digest.hex()
}

fn alias_path(alias: &str) -> String {
    format!("{alias}{ALIAS_SUFFIX}")
}

impl<B> ContentAddressableStore<B>
where
    B: Blobstore,
{
    /// Wrap `blobstore`
    pub fn new(blobstore: B) -> Self {
        Self { blobstore }
    }

    /// The wrapped [Blobstore]
    pub fn blobstore(&self) -> &B {
        &self.blobstore
    }

    /// Store everything `content` yields under its digest.
    ///
    /// The digest is computed before the single write, so the blob is either
    /// stored in full or not at all. Storing the same bytes twice is a no-op
    /// that returns the same digest.
    pub async fn put<R>(&self, content: R) -> Result<(Digest, u64), BlobstoreError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut content = content;
        let mut buffer = Vec::new();
        content.read_to_end(&mut buffer).await?;

        let digest = Digest::of(&buffer);
        let size = buffer.len() as u64;

        self.write(&content_path(&digest), Bytes::from(buffer))
            .await?;

        debug!(%digest, size, "Stored content");
        Ok((digest, size))
    }

    /// Store `content` like [ContentAddressableStore::put], then point
    /// `alias` at its digest. Re-pointing an existing alias replaces it.
    pub async fn put_with_id<R>(
        &self,
        alias: &str,
        content: R,
    ) -> Result<(Digest, u64), BlobstoreError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let Key::Alias(alias) = Key::parse(alias)? else {
            return Err(BlobstoreError::InvalidAlias(alias.to_string()));
        };

        let (digest, size) = self.put(content).await?;
        self.write(&alias_path(alias), Bytes::from(digest.to_string()))
            .await?;

        debug!(alias, %digest, "Stored alias");
        Ok((digest, size))
    }

    /// The digest `key` names: `key` itself when it is a digest string, the
    /// digest its alias points at otherwise.
    pub async fn resolve(&self, key: &str) -> Result<Digest, BlobstoreError> {
        match Key::parse(key)? {
            Key::Digest(digest) => Ok(digest),
            Key::Alias(alias) => {
                let pointer = self.read(&alias_path(alias)).await?;
                std::str::from_utf8(&pointer)
                    .ok()
                    .and_then(|pointer| pointer.parse::<Digest>().ok())
                    .ok_or_else(|| {
                        warn!(alias, "Alias does not hold a digest");
                        BlobstoreError::Integrity(format!("alias '{alias}' does not hold a digest"))
                    })
            }
        }
    }

    /// Write the content `key` names into `sink`, returning its size.
    pub async fn get<W>(&self, key: &str, sink: &mut W) -> Result<u64, BlobstoreError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let digest = self.resolve(key).await?;
        let content = self.read(&content_path(&digest)).await?;

        if !digest.matches(&content) {
            warn!(%digest, "Stored content does not match its digest");
            return Err(BlobstoreError::Integrity(format!(
                "content stored under {digest} hashes to {}",
                Digest::of(&content)
            )));
        }

        sink.write_all(&content).await?;
        sink.flush().await?;
        Ok(content.len() as u64)
    }

    /// Whether `key` names stored content. A dangling alias does not.
    pub async fn contains(&self, key: &str) -> Result<bool, BlobstoreError> {
        let digest = match self.resolve(key).await {
            Ok(digest) => digest,
            Err(BlobstoreError::NotFound(_)) => return Ok(false),
            Err(error) => return Err(error),
        };
        self.blobstore.exists(&content_path(&digest)).await
    }

    /// Remove the record `key` names: the content for a digest, the pointer
    /// for an alias.
    pub async fn delete(&self, key: &str) -> Result<(), BlobstoreError> {
        let path = match Key::parse(key)? {
            Key::Digest(digest) => content_path(&digest),
            Key::Alias(alias) => alias_path(alias),
        };
        self.blobstore.delete(&path).await
    }

    async fn write(&self, path: &str, content: Bytes) -> Result<(), BlobstoreError> {
        match self.blobstore.put(path, Some(content)).await? {
            None => Ok(()),
            Some(_) => Err(BlobstoreError::Unsupported(
                "content addressing needs a backend that stores bytes itself".into(),
            )),
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes, BlobstoreError> {
        match self.blobstore.get(path).await? {
            Fetched::Body(content) => Ok(content),
            Fetched::Redirect(_) => Err(BlobstoreError::Unsupported(
                "content addressing needs a backend that serves bytes itself".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryBlobstore, PartitioningPathDecorator};
    use anyhow::Result;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use url::Url;

    const CONTENT: &[u8] = b"here-is-some-content";
    const CONTENT_DIGEST: &str =
        "sha256:e0c6189f72b0e909e963116fb71625186098e75a843abffc6f7f5ab53df8cdd3";

    async fn read_back<B: Blobstore>(
        store: &ContentAddressableStore<B>,
        key: &str,
    ) -> Result<Vec<u8>, BlobstoreError> {
        let mut sink = Vec::new();
        let size = store.get(key, &mut sink).await?;
        assert_eq!(size, sink.len() as u64);
        Ok(sink)
    }

    #[tokio::test]
    async fn it_files_content_under_its_digest() -> Result<()> {
        let store = ContentAddressableStore::new(MemoryBlobstore::default());

        let (digest, size) = store.put(CONTENT).await?;

        assert_eq!(digest.to_string(), CONTENT_DIGEST);
        assert_eq!(size, CONTENT.len() as u64);
        assert_eq!(read_back(&store, CONTENT_DIGEST).await?, CONTENT);
        assert!(
            store
                .blobstore()
                .exists("e0c6189f72b0e909e963116fb71625186098e75a843abffc6f7f5ab53df8cdd3")
                .await?
        );

        Ok(())
    }

    #[tokio::test]
    async fn it_stores_identical_content_once() -> Result<()> {
        let store = ContentAddressableStore::new(MemoryBlobstore::default());

        let first = store.put(CONTENT).await?;
        let second = store.put(CONTENT).await?;

        assert_eq!(first, second);
        assert_eq!(store.blobstore().len().await, 1);

        Ok(())
    }

    #[tokio::test]
    async fn it_reads_content_through_an_alias() -> Result<()> {
        let store = ContentAddressableStore::new(MemoryBlobstore::default());

        let (digest, _) = store.put_with_id("my-id", CONTENT).await?;

        assert_eq!(store.resolve("my-id").await?, digest);
        assert_eq!(
            read_back(&store, "my-id").await?,
            read_back(&store, &digest.to_string()).await?
        );

        Ok(())
    }

    #[tokio::test]
    async fn it_repoints_an_alias() -> Result<()> {
        let store = ContentAddressableStore::new(MemoryBlobstore::default());

        store.put_with_id("my-id", CONTENT).await?;
        store.put_with_id("my-id", &b"newer content"[..]).await?;

        assert_eq!(read_back(&store, "my-id").await?, b"newer content");
        assert_eq!(read_back(&store, CONTENT_DIGEST).await?, CONTENT);

        Ok(())
    }

    #[tokio::test]
    async fn it_refuses_aliases_that_look_like_digests() -> Result<()> {
        let store = ContentAddressableStore::new(MemoryBlobstore::default());

        assert!(matches!(
            store.put_with_id(CONTENT_DIGEST, CONTENT).await,
            Err(BlobstoreError::InvalidAlias(_))
        ));
        assert!(matches!(
            store.put_with_id("", CONTENT).await,
            Err(BlobstoreError::InvalidAlias(_))
        ));
        assert!(store.blobstore().is_empty().await);

        Ok(())
    }

    #[tokio::test]
    async fn it_reports_missing_keys_as_not_found() -> Result<()> {
        let store = ContentAddressableStore::new(MemoryBlobstore::default());

        assert!(matches!(
            read_back(&store, CONTENT_DIGEST).await,
            Err(BlobstoreError::NotFound(_))
        ));
        assert!(matches!(
            read_back(&store, "no-such-alias").await,
            Err(BlobstoreError::NotFound(_))
        ));
        assert!(!store.contains("no-such-alias").await?);
        assert!(!store.contains(CONTENT_DIGEST).await?);

        Ok(())
    }

    #[tokio::test]
    async fn it_refuses_to_serve_corrupted_content() -> Result<()> {
        let store = ContentAddressableStore::new(MemoryBlobstore::default());
        let (digest, _) = store.put(CONTENT).await?;

        store
            .blobstore()
            .put(&digest.hex(), Some(Bytes::from_static(b"tampered")))
            .await?;

        assert!(matches!(
            read_back(&store, CONTENT_DIGEST).await,
            Err(BlobstoreError::Integrity(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn it_refuses_aliases_that_do_not_hold_a_digest() -> Result<()> {
        let store = ContentAddressableStore::new(MemoryBlobstore::default());

        store
            .blobstore()
            .put("broken.alias", Some(Bytes::from_static(b"not a digest")))
            .await?;

        assert!(matches!(
            store.resolve("broken").await,
            Err(BlobstoreError::Integrity(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn it_deletes_without_cascading() -> Result<()> {
        let store = ContentAddressableStore::new(MemoryBlobstore::default());
        store.put_with_id("kept", CONTENT).await?;
        store.put_with_id("dropped", CONTENT).await?;

        store.delete("dropped").await?;
        assert!(!store.contains("dropped").await?);
        assert_eq!(read_back(&store, "kept").await?, CONTENT);

        store.delete(CONTENT_DIGEST).await?;
        assert!(!store.contains("kept").await?);
        assert_eq!(
            store.resolve("kept").await?.to_string(),
            CONTENT_DIGEST
        );
        assert!(matches!(
            read_back(&store, "kept").await,
            Err(BlobstoreError::NotFound(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn it_works_over_a_partitioned_backend() -> Result<()> {
        let store =
            ContentAddressableStore::new(PartitioningPathDecorator::new(MemoryBlobstore::default()));

        store.put_with_id("my-id", CONTENT).await?;

        let backend = store.blobstore().delegate();
        assert!(
            backend
                .exists("e0/c6/e0c6189f72b0e909e963116fb71625186098e75a843abffc6f7f5ab53df8cdd3")
                .await?
        );
        assert!(backend.exists("my/-i/my-id.alias").await?);
        assert_eq!(read_back(&store, "my-id").await?, CONTENT);

        Ok(())
    }

    struct Redirecting;

    #[async_trait]
    impl Blobstore for Redirecting {
        async fn get(&self, _path: &str) -> Result<Fetched, BlobstoreError> {
            Ok(Fetched::Redirect(Url::parse("http://elsewhere.example.com/").unwrap()))
        }

        async fn head(&self, _path: &str) -> Result<Option<Url>, BlobstoreError> {
            Ok(None)
        }

        async fn put(
            &self,
            _path: &str,
            _content: Option<Bytes>,
        ) -> Result<Option<Url>, BlobstoreError> {
            Ok(Some(Url::parse("http://elsewhere.example.com/").unwrap()))
        }

        async fn copy(
            &self,
            _source: &str,
            _destination: &str,
        ) -> Result<Option<Url>, BlobstoreError> {
            Ok(None)
        }

        async fn exists(&self, _path: &str) -> Result<bool, BlobstoreError> {
            Ok(true)
        }

        async fn delete(&self, _path: &str) -> Result<(), BlobstoreError> {
            Ok(())
        }

        async fn delete_prefix(&self, _prefix: &str) -> Result<(), BlobstoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn it_needs_a_backend_that_moves_bytes() -> Result<()> {
        let store = ContentAddressableStore::new(Redirecting);

        assert!(matches!(
            store.put(CONTENT).await,
            Err(BlobstoreError::Unsupported(_))
        ));
        assert!(matches!(
            read_back(&store, CONTENT_DIGEST).await,
            Err(BlobstoreError::Unsupported(_))
        ));

        Ok(())
    }
}
