//! Requests the S3 backend sends itself, and how they are executed.

use async_trait::async_trait;
use bits_s3_credentials::{Checksum, Credentials, Hasher, Invocation};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use url::Url;

use crate::BlobstoreError;

/// A PUT uploading a body, guarded by its SHA-256 checksum.
#[derive(Debug)]
pub struct Put {
    url: Url,
    time: DateTime<Utc>,
    body: Bytes,
    checksum: Checksum,
}

impl Put {
    pub fn new(url: Url, time: DateTime<Utc>, body: Bytes) -> Self {
        let checksum = Hasher::Sha256.checksum(&body);
        Self {
            url,
            time,
            body,
            checksum,
        }
    }
}

impl Invocation for Put {
    fn method(&self) -> &str {
        "PUT"
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn checksum(&self) -> Option<&Checksum> {
        Some(&self.checksum)
    }
}

impl Request for Put {
    fn body(&self) -> Option<Bytes> {
        Some(self.body.clone())
    }
}

/// A server-side copy: a PUT to the destination naming the source in
/// `x-amz-copy-source`.
#[derive(Debug)]
pub struct CopyObject {
    url: Url,
    time: DateTime<Utc>,
    headers: Vec<(String, String)>,
}

impl CopyObject {
    /// `source` is `<bucket>/<encoded key>`
    pub fn new(url: Url, time: DateTime<Utc>, source: String) -> Self {
        Self {
            url,
            time,
            headers: vec![("x-amz-copy-source".into(), source)],
        }
    }
}

impl Invocation for CopyObject {
    fn method(&self) -> &str {
        "PUT"
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

impl Request for CopyObject {}

/// A HEAD probing for an object.
#[derive(Debug, Clone)]
pub struct Head {
    url: Url,
    time: DateTime<Utc>,
}

impl Head {
    pub fn new(url: Url, time: DateTime<Utc>) -> Self {
        Self { url, time }
    }
}

impl Invocation for Head {
    fn method(&self) -> &str {
        "HEAD"
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

impl Request for Head {}

/// A DELETE removing an object.
#[derive(Debug, Clone)]
pub struct Delete {
    url: Url,
    time: DateTime<Utc>,
}

impl Delete {
    pub fn new(url: Url, time: DateTime<Utc>) -> Self {
        Self { url, time }
    }
}

impl Invocation for Delete {
    fn method(&self) -> &str {
        "DELETE"
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

impl Request for Delete {}

/// A GET of one ListObjectsV2 page.
#[derive(Debug, Clone)]
pub struct List {
    url: Url,
    time: DateTime<Utc>,
}

impl List {
    /// `bucket` is the bucket URL; an empty `prefix` lists everything.
    pub fn new(bucket: Url, time: DateTime<Utc>, prefix: &str, continuation: Option<&str>) -> Self {
        let mut url = bucket;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("list-type", "2");
            if !prefix.is_empty() {
                query.append_pair("prefix", prefix);
            }
            if let Some(token) = continuation {
                query.append_pair("continuation-token", token);
            }
        }
        Self { url, time }
    }
}

impl Invocation for List {
    fn method(&self) -> &str {
        "GET"
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

impl Request for List {}

/// An [Invocation] that can be sent.
///
/// [Invocation] only carries what signing needs; the body is added here.
#[async_trait]
pub trait Request: Invocation + Sized + Sync {
    /// The request body, if any.
    fn body(&self) -> Option<Bytes> {
        None
    }

    /// Sign this request with `credentials` and send it.
    async fn perform(
        &self,
        credentials: &Credentials,
        client: &reqwest::Client,
    ) -> Result<reqwest::Response, BlobstoreError> {
        let authorized = credentials
            .authorize(self)
            .map_err(|error| BlobstoreError::Backend(error.to_string()))?;

        let method = reqwest::Method::from_bytes(self.method().as_bytes())
            .map_err(|error| BlobstoreError::Backend(error.to_string()))?;
        let mut builder = client.request(method, authorized.url);

        for (name, value) in authorized.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = self.body() {
            builder = builder.body(body);
        }

        Ok(builder.send().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 7, 5, 48, 59).unwrap()
    }

    #[test]
    fn it_checksums_uploads() {
        let put = Put::new(
            Url::parse("http://127.0.0.1:9000/bucket/key").unwrap(),
            time(),
            Bytes::from_static(b"hello world"),
        );

        assert_eq!(
            put.checksum().map(|checksum| checksum.to_string()),
            Some("uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=".to_string())
        );
        assert_eq!(put.body(), Some(Bytes::from_static(b"hello world")));
    }

    #[test]
    fn it_names_the_copy_source() {
        let copy = CopyObject::new(
            Url::parse("http://127.0.0.1:9000/bucket/dest").unwrap(),
            time(),
            "bucket/ab/cd/abcd".into(),
        );

        assert_eq!(copy.method(), "PUT");
        assert_eq!(
            copy.headers(),
            &[("x-amz-copy-source".to_string(), "bucket/ab/cd/abcd".to_string())]
        );
        assert_eq!(copy.body(), None);
    }

    #[test]
    fn it_builds_listing_urls() {
        let bucket = Url::parse("http://127.0.0.1:9000/bucket/").unwrap();

        let first = List::new(bucket.clone(), time(), "ab/", None);
        assert_eq!(first.url().query(), Some("list-type=2&prefix=ab%2F"));

        let everything = List::new(bucket, time(), "", Some("token123"));
        assert_eq!(
            everything.url().query(),
            Some("list-type=2&continuation-token=token123")
        );
    }
}
