//! Checksums for the `x-amz-checksum-{algorithm}` upload header.
//!
//! When a signed upload carries one of these headers, the store recomputes
//! the checksum over the received body and rejects the upload on mismatch.
//! See [Checking object integrity].
//!
//! [Checking object integrity]: https://docs.aws.amazon.com/AmazonS3/latest/userguide/checking-object-integrity-upload.html

use base64::Engine;
use sha2::{Digest, Sha256};

/// A checksum algorithm.
///
/// ```
/// use bits_s3_credentials::Hasher;
/// let checksum = Hasher::Sha256.checksum(b"hello world");
/// assert_eq!(checksum.header_name(), "x-amz-checksum-sha256");
/// ```
#[derive(Debug, Clone, Copy)]
pub enum Hasher {
    /// SHA-256.
    Sha256,
}

impl Hasher {
    /// Compute the checksum of `data`.
    pub fn checksum(&self, data: &[u8]) -> Checksum {
        match self {
            Self::Sha256 => Checksum::Sha256(Sha256::digest(data).into()),
        }
    }
}

/// A computed checksum. Displays as standard base64, the header encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    /// SHA-256 checksum.
    Sha256([u8; 32]),
}

impl Checksum {
    /// The raw checksum bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Sha256(checksum) => checksum,
        }
    }

    /// The algorithm name used in the header (e.g. "sha256").
    pub fn name(&self) -> &str {
        match self {
            Self::Sha256(_) => "sha256",
        }
    }

    /// The header that carries this checksum.
    pub fn header_name(&self) -> String {
        format!("x-amz-checksum-{}", self.name())
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&base64::engine::general_purpose::STANDARD.encode(self.as_bytes()))
    }
}
