//! Where an S3-compatible bucket lives.

use serde::{Deserialize, Serialize};

/// Endpoint, signing region and bucket of an S3-compatible store.
///
/// Plain data: the endpoint is only parsed when
/// [`Credentials`](crate::Credentials) are built from it.
///
/// ```
/// use bits_s3_credentials::Address;
///
/// let aws = Address::new("https://s3.eu-west-1.amazonaws.com", "eu-west-1", "droplets");
/// let minio = Address::new("http://localhost:9000", "us-east-1", "droplets");
/// assert_eq!(aws.bucket(), minio.bucket());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    endpoint: String,
    region: String,
    bucket: String,
}

impl Address {
    /// Create an address. Use `"auto"` as the region for R2-style services.
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: region.into(),
            bucket: bucket.into(),
        }
    }

    /// The endpoint URL, e.g. `https://s3.us-east-1.amazonaws.com`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The region used in the signing scope.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}
