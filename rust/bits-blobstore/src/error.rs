use bits_s3_credentials::AuthorizationError;
use thiserror::Error;

/// The common error type of blobstore operations
#[derive(Error, Debug)]
pub enum BlobstoreError {
    /// The requested path, digest or alias does not exist
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// Stored content does not hash to the digest it is filed under
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// The backing store failed (transport, authorization, unexpected status)
    #[error("Blobstore backend error: {0}")]
    Backend(String),

    /// The path cannot be mapped onto the backing store
    #[error("Invalid blob path '{0}'")]
    InvalidPath(String),

    /// The alias is empty or looks like a digest
    #[error("Invalid alias '{0}'")]
    InvalidAlias(String),

    /// The backend cannot perform the operation in its transfer style
    #[error("Unsupported blobstore operation: {0}")]
    Unsupported(String),

    /// Settings are missing or malformed
    #[error("Invalid blobstore configuration: {0}")]
    Configuration(String),

    /// A local filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for BlobstoreError {
    fn from(error: reqwest::Error) -> Self {
        BlobstoreError::Backend(error.to_string())
    }
}

impl From<SigningError> for BlobstoreError {
    fn from(error: SigningError) -> Self {
        BlobstoreError::Backend(error.to_string())
    }
}

/// Errors produced while issuing or checking a signed URL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// The expiration is in the past or beyond what the signer can issue
    #[error("Invalid expiration: {0}")]
    InvalidExpiration(String),

    /// The underlying credentials refused to sign
    #[error("Authorization failed: {0}")]
    Authorization(#[from] AuthorizationError),

    /// The URL cannot be built, or is not one this signer issued
    #[error("Invalid signed URL: {0}")]
    InvalidUrl(String),

    /// The signature does not match the URL
    #[error("Signature mismatch")]
    InvalidSignature,

    /// The URL was valid but its expiration has passed
    #[error("Signed URL expired")]
    Expired,
}
