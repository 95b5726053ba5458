use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::{Blobstore, BlobstoreError, Fetched};

static PARTIAL_WRITES: AtomicU64 = AtomicU64::new(0);

/// A [Blobstore] that stores each blob as a file under a root directory, at
/// the blob path's segments.
///
/// Writes land in a temporary sibling file that is renamed into place, so a
/// blob is either absent or complete. Deleting removes directories left
/// empty, up to (but never including) the root.
#[derive(Debug, Clone)]
pub struct LocalBlobstore {
    root: PathBuf,
}

impl LocalBlobstore {
    /// Creates a [LocalBlobstore] that stores files under `root`, creating
    /// it if needed.
    pub async fn new<Pathlike>(root: Pathlike) -> Result<Self, BlobstoreError>
    where
        Pathlike: AsRef<Path>,
    {
        let root = root.as_ref().to_owned();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// The directory blobs are stored under
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn make_path(&self, path: &str) -> Result<PathBuf, BlobstoreError> {
        if path.is_empty() || path.starts_with('/') {
            return Err(BlobstoreError::InvalidPath(path.to_string()));
        }

        let mut resolved = self.root.clone();
        for segment in path.split('/') {
            if matches!(segment, "" | "." | "..") || segment.contains('\\') {
                return Err(BlobstoreError::InvalidPath(path.to_string()));
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    async fn write_atomically(&self, target: &Path, content: &[u8]) -> Result<(), BlobstoreError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(target);
        if let Err(error) = tokio::fs::write(&partial, content).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(error.into());
        }
        if let Err(error) = tokio::fs::rename(&partial, target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(error.into());
        }
        Ok(())
    }

    /// Remove empty directories from `directory` up towards the root.
    async fn prune(&self, directory: Option<&Path>) -> Result<(), BlobstoreError> {
        let mut current = directory;
        while let Some(directory) = current {
            if directory == self.root || !directory.starts_with(&self.root) {
                break;
            }
            if !is_empty_dir(directory).await? {
                break;
            }
            match tokio::fs::remove_dir(directory).await {
                Ok(()) => {}
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }
            current = directory.parent();
        }
        Ok(())
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sequence = PARTIAL_WRITES.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{name}.{}.{sequence}.partial", std::process::id()))
}

async fn is_empty_dir(directory: &Path) -> Result<bool, BlobstoreError> {
    match tokio::fs::read_dir(directory).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_none()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error.into()),
    }
}

fn not_found(path: &str) -> impl FnOnce(std::io::Error) -> BlobstoreError + '_ {
    move |error| match error.kind() {
        ErrorKind::NotFound => BlobstoreError::NotFound(path.to_string()),
        _ => BlobstoreError::Io(error),
    }
}

#[async_trait]
impl Blobstore for LocalBlobstore {
    async fn get(&self, path: &str) -> Result<Fetched, BlobstoreError> {
        let file = self.make_path(path)?;
        let content = tokio::fs::read(&file).await.map_err(not_found(path))?;
        Ok(Fetched::Body(Bytes::from(content)))
    }

    async fn head(&self, path: &str) -> Result<Option<Url>, BlobstoreError> {
        if self.exists(path).await? {
            Ok(None)
        } else {
            Err(BlobstoreError::NotFound(path.to_string()))
        }
    }

    async fn put(&self, path: &str, content: Option<Bytes>) -> Result<Option<Url>, BlobstoreError> {
        let content = content.ok_or_else(|| {
            BlobstoreError::Unsupported("the local blobstore cannot hand out upload URLs".into())
        })?;
        let file = self.make_path(path)?;

        debug!(path, size = content.len(), "Writing blob to disk");
        self.write_atomically(&file, &content).await?;
        Ok(None)
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<Option<Url>, BlobstoreError> {
        let from = self.make_path(source)?;
        let to = self.make_path(destination)?;
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(source, destination, "Copying blob on disk");
        let partial = partial_path(&to);
        if let Err(error) = tokio::fs::copy(&from, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(not_found(source)(error));
        }
        if let Err(error) = tokio::fs::rename(&partial, &to).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(error.into());
        }
        Ok(None)
    }

    async fn exists(&self, path: &str) -> Result<bool, BlobstoreError> {
        let file = self.make_path(path)?;
        match tokio::fs::metadata(&file).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobstoreError> {
        let file = self.make_path(path)?;

        debug!(path, "Deleting blob from disk");
        tokio::fs::remove_file(&file).await.map_err(not_found(path))?;
        self.prune(file.parent()).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), BlobstoreError> {
        if prefix.starts_with('/') || prefix.split('/').any(|segment| segment == "..") {
            return Err(BlobstoreError::InvalidPath(prefix.to_string()));
        }

        let mut pending = vec![(self.root.clone(), String::new())];
        let mut visited = Vec::new();
        let mut deleted = 0usize;

        while let Some((directory, relative)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&directory).await {
                Ok(entries) => entries,
                Err(error) if error.kind() == ErrorKind::NotFound => continue,
                Err(error) => return Err(error.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let path = format!("{relative}{name}");

                if entry.file_type().await?.is_dir() {
                    let nested = format!("{path}/");
                    if nested.starts_with(prefix) || prefix.starts_with(&nested) {
                        pending.push((entry.path(), nested));
                    }
                } else if path.starts_with(prefix) {
                    match tokio::fs::remove_file(entry.path()).await {
                        Ok(()) => deleted += 1,
                        Err(error) if error.kind() == ErrorKind::NotFound => {}
                        Err(error) => return Err(error.into()),
                    }
                }
            }

            visited.push(directory);
        }

        // Deepest directories were visited last.
        for directory in visited.iter().rev() {
            self.prune(Some(directory)).await?;
        }

        debug!(prefix, deleted, "Deleted blobs from disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn store() -> Result<(TempDir, LocalBlobstore)> {
        let directory = tempfile::tempdir()?;
        let store = LocalBlobstore::new(directory.path().join("blobs")).await?;
        Ok((directory, store))
    }

    fn body(content: &'static [u8]) -> Option<Bytes> {
        Some(Bytes::from_static(content))
    }

    #[tokio::test]
    async fn it_writes_blobs_under_the_root() -> Result<()> {
        let (_directory, store) = store().await?;

        store.put("ab/cd/abcd", body(b"blob")).await?;

        assert_eq!(
            tokio::fs::read(store.root().join("ab").join("cd").join("abcd")).await?,
            b"blob"
        );
        assert_eq!(store.get("ab/cd/abcd").await?, Fetched::Body(Bytes::from_static(b"blob")));
        assert_eq!(store.head("ab/cd/abcd").await?, None);
        assert!(store.exists("ab/cd/abcd").await?);

        Ok(())
    }

    #[tokio::test]
    async fn it_overwrites_without_leaving_partial_files() -> Result<()> {
        let (_directory, store) = store().await?;

        store.put("ab/ab", body(b"first")).await?;
        store.put("ab/ab", body(b"second")).await?;

        assert_eq!(store.get("ab/ab").await?, Fetched::Body(Bytes::from_static(b"second")));
        let mut entries = tokio::fs::read_dir(store.root().join("ab")).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["ab".to_string()]);

        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_paths_outside_the_root() -> Result<()> {
        let (_directory, store) = store().await?;

        for path in ["", "/etc/passwd", "../escape", "a/../../escape", "a//b", "a/./b", "a/"] {
            assert!(
                matches!(store.put(path, body(b"x")).await, Err(BlobstoreError::InvalidPath(_))),
                "{path} should be rejected"
            );
        }
        assert!(matches!(
            store.delete_prefix("../").await,
            Err(BlobstoreError::InvalidPath(_))
        ));

        Ok(())
    }

    #[tokio::test]
    async fn it_reports_missing_blobs() -> Result<()> {
        let (_directory, store) = store().await?;

        assert!(matches!(store.get("ab/ab").await, Err(BlobstoreError::NotFound(_))));
        assert!(matches!(store.head("ab/ab").await, Err(BlobstoreError::NotFound(_))));
        assert!(matches!(store.delete("ab/ab").await, Err(BlobstoreError::NotFound(_))));
        assert!(matches!(
            store.copy("ab/ab", "cd/cd").await,
            Err(BlobstoreError::NotFound(_))
        ));
        assert!(!store.exists("ab/ab").await?);

        Ok(())
    }

    #[tokio::test]
    async fn it_cannot_hand_out_upload_urls() -> Result<()> {
        let (_directory, store) = store().await?;

        assert!(matches!(store.put("a/a", None).await, Err(BlobstoreError::Unsupported(_))));

        Ok(())
    }

    #[tokio::test]
    async fn it_copies_blobs() -> Result<()> {
        let (_directory, store) = store().await?;
        store.put("so/ur/source", body(b"blob")).await?;

        assert_eq!(store.copy("so/ur/source", "de/st/dest").await?, None);

        assert_eq!(store.get("de/st/dest").await?, Fetched::Body(Bytes::from_static(b"blob")));
        assert!(store.exists("so/ur/source").await?);

        Ok(())
    }

    #[tokio::test]
    async fn it_prunes_directories_left_empty() -> Result<()> {
        let (_directory, store) = store().await?;
        store.put("ab/cd/abcd", body(b"x")).await?;
        store.put("ab/ce/abce", body(b"y")).await?;

        store.delete("ab/cd/abcd").await?;

        assert!(!store.root().join("ab").join("cd").exists());
        assert!(store.root().join("ab").join("ce").exists());
        assert!(store.root().exists());

        Ok(())
    }

    #[tokio::test]
    async fn it_deletes_by_prefix() -> Result<()> {
        let (_directory, store) = store().await?;
        for path in ["ab/cd/abcd", "ab/ce/abce", "ac/ac", "b/b"] {
            store.put(path, body(b"x")).await?;
        }

        store.delete_prefix("ab/c").await?;

        assert!(!store.exists("ab/cd/abcd").await?);
        assert!(!store.exists("ab/ce/abce").await?);
        assert!(!store.root().join("ab").exists());
        assert!(store.exists("ac/ac").await?);
        assert!(store.exists("b/b").await?);

        store.delete_prefix("").await?;

        assert!(!store.exists("ac/ac").await?);
        assert!(!store.exists("b/b").await?);
        let mut entries = tokio::fs::read_dir(store.root()).await?;
        assert!(entries.next_entry().await?.is_none());

        Ok(())
    }
}
