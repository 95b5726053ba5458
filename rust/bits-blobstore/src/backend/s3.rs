//! S3-compatible object storage.
//!
//! [S3Blobstore] never sees a client's bytes on the way out: reads are
//! answered with a presigned GET URL. Uploads depend on the
//! [TransferStyle]: the service either proxies the bytes itself, or hands the
//! client a presigned PUT URL and stays out of the transfer entirely.
//!
//! Every request is presigned with SigV4 query parameters through
//! [bits_s3_credentials::Credentials], using the injected [Clock] as "now".

use std::sync::Arc;

use async_trait::async_trait;
use bits_common::Clock;
use bits_s3_credentials::{Credentials, DEFAULT_EXPIRES, MAX_EXPIRES, RequestInfo, encode_key};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

use crate::{Blobstore, BlobstoreError, Fetched, ResourceSigner, SigningError, Verb};

pub mod list;

mod request;
use request::{CopyObject, Delete, Head, List, Put, Request};

/// How an [S3Blobstore] moves blob bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStyle {
    /// Uploads pass through the service; downloads redirect to presigned URLs
    #[default]
    Proxy,
    /// Uploads and downloads both redirect to presigned URLs
    PureRedirect,
}

/// Issues SigV4 presigned URLs for objects in one bucket.
///
/// `X-Amz-Date` is the clock's "now" and `X-Amz-Expires` the whole seconds
/// left until the requested expiration, which must be in the future and at
/// most seven days away.
#[derive(Clone)]
pub struct S3ResourceSigner {
    credentials: Credentials,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for S3ResourceSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ResourceSigner")
            .field("address", self.credentials.address())
            .finish_non_exhaustive()
    }
}

impl S3ResourceSigner {
    /// Sign with `credentials`, reading time from `clock`
    pub fn new(credentials: Credentials, clock: Arc<dyn Clock>) -> Self {
        Self { credentials, clock }
    }

    /// The credentials URLs are signed with
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

impl ResourceSigner for S3ResourceSigner {
    fn sign(&self, path: &str, verb: Verb, expiration: DateTime<Utc>) -> Result<Url, SigningError> {
        let now = self.clock.now();
        let seconds = (expiration - now).num_seconds();
        if seconds <= 0 {
            return Err(SigningError::InvalidExpiration(format!(
                "{expiration} is not in the future"
            )));
        }
        let seconds = seconds as u64;
        if seconds > MAX_EXPIRES {
            return Err(SigningError::InvalidExpiration(format!(
                "{expiration} is more than {MAX_EXPIRES} seconds away"
            )));
        }

        let url = self.credentials.build_url(path)?;
        let request = RequestInfo::new(verb.as_str(), url, now).with_expires(seconds);
        let authorization = self.credentials.authorize(&request)?;

        debug!(path, %verb, %expiration, "Presigned S3 URL");
        Ok(authorization.url)
    }
}

/// A [Blobstore] over one S3 bucket.
///
/// | operation | [TransferStyle::Proxy] | [TransferStyle::PureRedirect] |
/// |---|---|---|
/// | `put` | uploads the bytes | presigned PUT URL, nothing uploaded |
/// | `get` | HEAD probe, then presigned GET URL | presigned GET URL |
/// | `head` | HEAD probe, then presigned HEAD URL | same |
/// | `copy` | server-side copy | same |
///
/// `exists`, `delete` and `delete_prefix` talk to the bucket directly in
/// both styles. Paths are used as object keys unchanged, so a sharded path
/// names the same object in the bucket as it does on disk.
#[derive(Clone)]
pub struct S3Blobstore {
    credentials: Credentials,
    client: reqwest::Client,
    style: TransferStyle,
    signer: S3ResourceSigner,
}

impl std::fmt::Debug for S3Blobstore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Blobstore")
            .field("address", self.credentials.address())
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

impl S3Blobstore {
    /// A blobstore over the bucket `credentials` sign for
    pub fn new(credentials: Credentials, style: TransferStyle, clock: Arc<dyn Clock>) -> Self {
        Self {
            signer: S3ResourceSigner::new(credentials.clone(), clock),
            credentials,
            client: reqwest::Client::new(),
            style,
        }
    }

    /// Send requests through `client` instead of a default one
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// How bytes are moved
    pub fn style(&self) -> TransferStyle {
        self.style
    }

    /// A signer for the same bucket and clock
    pub fn signer(&self) -> &S3ResourceSigner {
        &self.signer
    }

    fn now(&self) -> DateTime<Utc> {
        self.signer.clock.now()
    }

    fn key_url(&self, key: &str) -> Result<Url, BlobstoreError> {
        self.credentials
            .build_url(key)
            .map_err(|error| BlobstoreError::Backend(error.to_string()))
    }

    fn object_url(&self, path: &str) -> Result<Url, BlobstoreError> {
        if path.is_empty() {
            return Err(BlobstoreError::InvalidPath(path.to_string()));
        }
        self.key_url(path)
    }

    fn presign(&self, path: &str, verb: Verb) -> Result<Url, BlobstoreError> {
        let expiration = self.now() + Duration::seconds(DEFAULT_EXPIRES as i64);
        Ok(self.signer.sign(path, verb, expiration)?)
    }

    async fn probe(&self, path: &str) -> Result<bool, BlobstoreError> {
        let response = Head::new(self.object_url(path)?, self.now())
            .perform(&self.credentials, &self.client)
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(failure("HEAD", path, response).await),
        }
    }
}

/// Turn an unexpected response into a [BlobstoreError::Backend], preferring
/// the message of an S3 error document.
async fn failure(operation: &str, path: &str, response: reqwest::Response) -> BlobstoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match list::error_message(&body) {
        Some(message) => BlobstoreError::Backend(format!("{operation} {path}: {message}")),
        None => BlobstoreError::Backend(format!("{operation} {path} failed: {status}")),
    }
}

#[async_trait]
impl Blobstore for S3Blobstore {
    async fn get(&self, path: &str) -> Result<Fetched, BlobstoreError> {
        if self.style == TransferStyle::Proxy && !self.probe(path).await? {
            return Err(BlobstoreError::NotFound(path.to_string()));
        }
        Ok(Fetched::Redirect(self.presign(path, Verb::Get)?))
    }

    async fn head(&self, path: &str) -> Result<Option<Url>, BlobstoreError> {
        if !self.probe(path).await? {
            return Err(BlobstoreError::NotFound(path.to_string()));
        }
        Ok(Some(self.presign(path, Verb::Head)?))
    }

    async fn put(&self, path: &str, content: Option<Bytes>) -> Result<Option<Url>, BlobstoreError> {
        match (self.style, content) {
            (TransferStyle::PureRedirect, _) => Ok(Some(self.presign(path, Verb::Put)?)),
            (TransferStyle::Proxy, None) => Err(BlobstoreError::Unsupported(
                "proxied uploads need the blob content".into(),
            )),
            (TransferStyle::Proxy, Some(content)) => {
                debug!(path, size = content.len(), "Uploading blob to S3");
                let response = Put::new(self.object_url(path)?, self.now(), content)
                    .perform(&self.credentials, &self.client)
                    .await?;

                if response.status().is_success() {
                    Ok(None)
                } else {
                    Err(failure("PUT", path, response).await)
                }
            }
        }
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<Option<Url>, BlobstoreError> {
        if source.is_empty() {
            return Err(BlobstoreError::InvalidPath(source.to_string()));
        }
        let copy_source = format!("{}/{}", self.credentials.bucket(), encode_key(source));

        debug!(source, destination, "Copying blob within S3");
        let response = CopyObject::new(self.object_url(destination)?, self.now(), copy_source)
            .perform(&self.credentials, &self.client)
            .await?;

        match response.status() {
            status if status.is_success() => Ok(None),
            StatusCode::NOT_FOUND => Err(BlobstoreError::NotFound(source.to_string())),
            _ => Err(failure("COPY", source, response).await),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, BlobstoreError> {
        self.probe(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), BlobstoreError> {
        // S3 answers DELETE of a missing key with success.
        if !self.probe(path).await? {
            return Err(BlobstoreError::NotFound(path.to_string()));
        }

        debug!(path, "Deleting blob from S3");
        let response = Delete::new(self.object_url(path)?, self.now())
            .perform(&self.credentials, &self.client)
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(BlobstoreError::NotFound(path.to_string())),
            _ => Err(failure("DELETE", path, response).await),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), BlobstoreError> {
        let bucket = self.key_url("")?;
        let mut continuation: Option<String> = None;
        let mut deleted = 0usize;

        loop {
            let response = List::new(bucket.clone(), self.now(), prefix, continuation.as_deref())
                .perform(&self.credentials, &self.client)
                .await?;
            if !response.status().is_success() {
                return Err(failure("LIST", prefix, response).await);
            }
            let page = list::parse(&response.text().await?)?;

            for key in page.keys {
                trace!(key, "Deleting listed blob from S3");
                let response = Delete::new(self.key_url(&key)?, self.now())
                    .perform(&self.credentials, &self.client)
                    .await?;
                match response.status() {
                    status if status.is_success() => deleted += 1,
                    StatusCode::NOT_FOUND => {}
                    _ => return Err(failure("DELETE", &key, response).await),
                }
            }

            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        debug!(prefix, deleted, "Deleted blobs from S3");
        Ok(())
    }
}
