use std::{path::PathBuf, sync::Arc};

use bits_common::Clock;
use bits_s3_credentials::{Address, Credentials};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{BlobstoreError, LocalResourceSigner, TransferStyle};

/// Which backend to open and how, as read from a settings file.
///
/// ```json
/// { "provider": "s3", "endpoint": "https://s3.amazonaws.com", "bucket": "blobs",
///   "access_key_id": "...", "secret_access_key": "...", "style": "pure-redirect",
///   "path_partitioning": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum BlobstoreConfig {
    /// Blobs in process memory
    Memory {
        /// Shard paths before storing
        #[serde(default)]
        path_partitioning: bool,
        /// Hand out URLs signed by this service
        #[serde(default)]
        signing: Option<LocalSigningConfig>,
    },
    /// Blobs as files under `root`
    Local {
        /// The directory blobs are stored under
        root: PathBuf,
        /// Shard paths before storing
        #[serde(default)]
        path_partitioning: bool,
        /// Hand out URLs signed by this service
        #[serde(default)]
        signing: Option<LocalSigningConfig>,
    },
    /// Blobs in an S3-compatible bucket
    S3(S3Config),
}

impl BlobstoreConfig {
    /// Whether paths are sharded before reaching the backend
    pub fn path_partitioning(&self) -> bool {
        match self {
            BlobstoreConfig::Memory {
                path_partitioning, ..
            }
            | BlobstoreConfig::Local {
                path_partitioning, ..
            } => *path_partitioning,
            BlobstoreConfig::S3(config) => config.path_partitioning,
        }
    }
}

/// Settings for URLs signed by this service itself.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSigningConfig {
    /// The shared HMAC secret
    pub secret: String,
    /// Where the service serves signed URLs from
    pub public_url: Url,
}

impl std::fmt::Debug for LocalSigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigningConfig")
            .field("public_url", &self.public_url)
            .finish_non_exhaustive()
    }
}

impl LocalSigningConfig {
    /// Build the signer these settings describe.
    pub fn signer(&self, clock: Arc<dyn Clock>) -> Result<LocalResourceSigner, BlobstoreError> {
        if self.secret.is_empty() {
            return Err(BlobstoreError::Configuration(
                "signing secret must not be empty".into(),
            ));
        }
        LocalResourceSigner::new(self.public_url.clone(), self.secret.as_bytes(), clock)
            .map_err(|error| BlobstoreError::Configuration(error.to_string()))
    }
}

fn default_region() -> String {
    "us-east-1".into()
}

/// Settings for an S3-compatible bucket.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    /// The service endpoint, e.g. `https://s3.amazonaws.com`
    pub endpoint: String,
    /// The signing region
    #[serde(default = "default_region")]
    pub region: String,
    /// The bucket blobs are stored in
    pub bucket: String,
    /// AWS access key ID
    pub access_key_id: String,
    /// AWS secret access key
    pub secret_access_key: String,
    /// How blob bytes are moved
    #[serde(default)]
    pub style: TransferStyle,
    /// Shard paths before storing
    #[serde(default)]
    pub path_partitioning: bool,
    /// Force path-style (`true`) or virtual-hosted (`false`) object URLs.
    /// Defaults to path-style for IP and localhost endpoints only.
    #[serde(default)]
    pub path_style: Option<bool>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("style", &self.style)
            .field("path_partitioning", &self.path_partitioning)
            .field("path_style", &self.path_style)
            .finish_non_exhaustive()
    }
}

impl S3Config {
    /// Validate the settings and build the credentials they describe.
    pub fn credentials(&self) -> Result<Credentials, BlobstoreError> {
        for (name, value) in [
            ("endpoint", &self.endpoint),
            ("bucket", &self.bucket),
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
        ] {
            if value.trim().is_empty() {
                return Err(BlobstoreError::Configuration(format!(
                    "S3 {name} must not be empty"
                )));
            }
        }

        let address = Address::new(&self.endpoint, &self.region, &self.bucket);
        let credentials = Credentials::new(address, &self.access_key_id, &self.secret_access_key)
            .map_err(|error| BlobstoreError::Configuration(error.to_string()))?;

        Ok(match self.path_style {
            Some(path_style) => credentials.with_path_style(path_style),
            None => credentials,
        })
    }
}
