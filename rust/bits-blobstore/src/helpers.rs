//! An in-process S3-compatible server for integration tests.
//!
//! [LocalS3] serves an [InMemoryS3] bucket store over HTTP on a random
//! loopback port, optionally checking SigV4 signatures for one key pair:
//!
//! ```rs
//! # async fn example() -> anyhow::Result<()> {
//! use bits_blobstore::helpers::LocalS3;
//!
//! let server = LocalS3::start_with_auth("access-key", "secret-key", &["blobs"]).await?;
//! println!("S3 listening on {}", server.endpoint);
//! server.stop();
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use s3s::dto::{
    CopyObjectInput, CopyObjectOutput, CopyObjectResult, CopySource, DeleteObjectInput,
    DeleteObjectOutput, ETag, GetObjectInput, GetObjectOutput, HeadObjectInput, HeadObjectOutput,
    ListObjectsV2Input, ListObjectsV2Output, Object, PutObjectInput, PutObjectOutput,
    StreamingBlob, Timestamp,
};
use s3s::service::S3ServiceBuilder;
use s3s::{S3, S3Request, S3Response, S3Result, s3_error};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::debug;

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    e_tag: String,
    last_modified: Timestamp,
}

impl StoredObject {
    fn new(data: Bytes) -> Self {
        Self {
            e_tag: format!("{:x}", md5::compute(&data)),
            data,
            last_modified: Timestamp::from(SystemTime::now()),
        }
    }
}

type Buckets = HashMap<String, BTreeMap<String, StoredObject>>;

/// Objects kept in memory, by bucket then key.
#[derive(Clone, Default)]
pub struct InMemoryS3 {
    buckets: Arc<RwLock<Buckets>>,
}

impl InMemoryS3 {
    /// Create `bucket` if it does not exist yet.
    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    /// The keys stored in `bucket`, in order.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|contents| contents.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl S3 for InMemoryS3 {
    async fn get_object(
        &self,
        req: S3Request<GetObjectInput>,
    ) -> S3Result<S3Response<GetObjectOutput>> {
        let buckets = self.buckets.read().await;
        let object = buckets
            .get(&req.input.bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?
            .get(&req.input.key)
            .ok_or_else(|| s3_error!(NoSuchKey))?;

        let output = GetObjectOutput {
            body: Some(StreamingBlob::from(s3s::Body::from(object.data.clone()))),
            content_length: Some(object.data.len() as i64),
            e_tag: Some(ETag::Strong(object.e_tag.clone())),
            last_modified: Some(object.last_modified.clone()),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    async fn put_object(
        &self,
        req: S3Request<PutObjectInput>,
    ) -> S3Result<S3Response<PutObjectOutput>> {
        let bucket = req.input.bucket.clone();
        let key = req.input.key.clone();

        let mut data = Vec::new();
        if let Some(mut body) = req.input.body {
            use futures_util::StreamExt;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|_| s3_error!(IncompleteBody))?;
                data.extend_from_slice(&chunk);
            }
        }
        let stored = StoredObject::new(Bytes::from(data));
        let e_tag = stored.e_tag.clone();

        let mut buckets = self.buckets.write().await;
        let contents = buckets
            .get_mut(&bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?;
        debug!(bucket, key, "Stored object");
        contents.insert(key, stored);

        let output = PutObjectOutput {
            e_tag: Some(ETag::Strong(e_tag)),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    async fn copy_object(
        &self,
        req: S3Request<CopyObjectInput>,
    ) -> S3Result<S3Response<CopyObjectOutput>> {
        let (source_bucket, source_key) = match &req.input.copy_source {
            CopySource::Bucket { bucket, key, .. } => (bucket.to_string(), key.to_string()),
            _ => return Err(s3_error!(NotImplemented)),
        };

        let mut buckets = self.buckets.write().await;
        let source = buckets
            .get(&source_bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?
            .get(&source_key)
            .ok_or_else(|| s3_error!(NoSuchKey))?
            .data
            .clone();

        let copied = StoredObject::new(source);
        let result = CopyObjectResult {
            e_tag: Some(ETag::Strong(copied.e_tag.clone())),
            last_modified: Some(copied.last_modified.clone()),
            ..Default::default()
        };
        buckets
            .get_mut(&req.input.bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?
            .insert(req.input.key.clone(), copied);

        let output = CopyObjectOutput {
            copy_object_result: Some(result),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    async fn delete_object(
        &self,
        req: S3Request<DeleteObjectInput>,
    ) -> S3Result<S3Response<DeleteObjectOutput>> {
        let mut buckets = self.buckets.write().await;
        if let Some(contents) = buckets.get_mut(&req.input.bucket) {
            contents.remove(&req.input.key);
        }

        Ok(S3Response::new(DeleteObjectOutput::default()))
    }

    async fn head_object(
        &self,
        req: S3Request<HeadObjectInput>,
    ) -> S3Result<S3Response<HeadObjectOutput>> {
        let buckets = self.buckets.read().await;
        let object = buckets
            .get(&req.input.bucket)
            .and_then(|contents| contents.get(&req.input.key))
            .ok_or_else(|| s3_error!(NoSuchKey))?;

        let output = HeadObjectOutput {
            content_length: Some(object.data.len() as i64),
            e_tag: Some(ETag::Strong(object.e_tag.clone())),
            last_modified: Some(object.last_modified.clone()),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }

    async fn list_objects_v2(
        &self,
        req: S3Request<ListObjectsV2Input>,
    ) -> S3Result<S3Response<ListObjectsV2Output>> {
        let prefix = req.input.prefix.as_deref().unwrap_or("");

        let buckets = self.buckets.read().await;
        let contents = buckets
            .get(&req.input.bucket)
            .ok_or_else(|| s3_error!(NoSuchBucket))?;

        let objects = contents
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| Object {
                key: Some(key.clone()),
                size: Some(object.data.len() as i64),
                e_tag: Some(ETag::Strong(object.e_tag.clone())),
                last_modified: Some(object.last_modified.clone()),
                ..Default::default()
            })
            .collect::<Vec<_>>();

        let output = ListObjectsV2Output {
            key_count: Some(objects.len() as i32),
            contents: Some(objects),
            is_truncated: Some(false),
            ..Default::default()
        };
        Ok(S3Response::new(output))
    }
}

/// A running S3 test server.
pub struct LocalS3 {
    /// The endpoint URL the server listens on
    pub endpoint: String,
    /// The objects the server holds
    pub storage: InMemoryS3,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl LocalS3 {
    /// Start a server that accepts anonymous requests, with `buckets`
    /// already created.
    pub async fn start(buckets: &[&str]) -> anyhow::Result<Self> {
        Self::start_internal(None, buckets).await
    }

    /// Start a server that only accepts requests signed with this key pair.
    pub async fn start_with_auth(
        access_key: &str,
        secret_key: &str,
        buckets: &[&str],
    ) -> anyhow::Result<Self> {
        let auth = s3s::auth::SimpleAuth::from_single(access_key, secret_key);
        Self::start_internal(Some(auth), buckets).await
    }

    async fn start_internal(
        auth: Option<s3s::auth::SimpleAuth>,
        buckets: &[&str],
    ) -> anyhow::Result<Self> {
        let storage = InMemoryS3::default();
        for bucket in buckets {
            storage.create_bucket(bucket).await;
        }

        let mut builder = S3ServiceBuilder::new(storage.clone());
        if let Some(auth) = auth {
            builder.set_auth(auth);
        }
        let service = ServiceBuilder::new()
            .layer(CorsLayer::very_permissive())
            .service(builder.build());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let endpoint = format!("http://{}", listener.local_addr()?);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = listener.accept() => {
                        if let Ok((stream, _)) = result {
                            let hyper_service = TowerToHyperService::new(service.clone());
                            tokio::spawn(async move {
                                let _ = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), hyper_service)
                                    .await;
                            });
                        }
                    }
                }
            }
        });

        debug!(endpoint, "Started local S3");
        Ok(Self {
            endpoint,
            storage,
            shutdown_tx,
        })
    }

    /// Stop accepting connections.
    pub fn stop(self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn it_serves_anonymous_requests() -> Result<()> {
        let server = LocalS3::start(&["public"]).await?;
        let object = format!("{}/public/ab/ab", server.endpoint);
        let client = reqwest::Client::new();

        client
            .put(&object)
            .body("blob")
            .send()
            .await?
            .error_for_status()?;
        let body = client.get(&object).send().await?.error_for_status()?.bytes().await?;
        assert_eq!(&body[..], b"blob");

        let missing = client
            .get(format!("{}/public/cd/cd", server.endpoint))
            .send()
            .await?;
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        server.stop();
        Ok(())
    }
}
