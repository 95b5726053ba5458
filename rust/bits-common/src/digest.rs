use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// The size of a SHA-256 digest in bytes.
pub const SHA256_DIGEST_SIZE: usize = 32;

/// The algorithm name that prefixes the textual form of a [`Digest`].
pub const SHA256_ALGORITHM: &str = "sha256";

/// A SHA-256 content digest.
///
/// The textual form is `sha256:<64 lowercase hex chars>`, which is what
/// [`Display`](fmt::Display), [`FromStr`] and serde use.
///
/// # Examples
///
/// ```rust
/// use bits_common::Digest;
///
/// let digest = Digest::of(b"here-is-some-content");
/// assert_eq!(
///     digest.to_string(),
///     "sha256:e0c6189f72b0e909e963116fb71625186098e75a843abffc6f7f5ab53df8cdd3"
/// );
/// ```
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Digest([u8; SHA256_DIGEST_SIZE]);

impl Digest {
    /// Computes the SHA-256 digest of the given bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Computes the digest of a sequence of chunks as if they were one
    /// contiguous buffer.
    pub fn of_chunks<'a, I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut hasher = Sha256::new();
        for chunk in chunks {
            hasher.update(chunk);
        }
        Self(hasher.finalize().into())
    }

    /// The raw digest bytes.
    pub fn bytes(&self) -> &[u8; SHA256_DIGEST_SIZE] {
        &self.0
    }

    /// The digest as 64 lowercase hex chars, without the algorithm prefix.
    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses 64 lowercase hex chars (no algorithm prefix).
    pub fn from_hex(encoded: &str) -> Result<Self, DigestError> {
        if encoded.len() != SHA256_DIGEST_SIZE * 2 {
            return Err(DigestError::Length(encoded.len()));
        }
        // Upper-case hex names the same bytes but is not the canonical form.
        if let Some(other) = encoded
            .chars()
            .find(|character| !matches!(character, '0'..='9' | 'a'..='f'))
        {
            return Err(DigestError::Character(other));
        }

        let mut bytes = [0u8; SHA256_DIGEST_SIZE];
        hex::decode_to_slice(encoded, &mut bytes)
            .map_err(|_| DigestError::Length(encoded.len()))?;
        Ok(Self(bytes))
    }

    /// Whether `bytes` hash to this digest.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::of(bytes) == *self
    }
}

/// Reasons a string is not a valid [`Digest`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    /// The `algorithm:` prefix is missing.
    #[error("digest is missing the '{SHA256_ALGORITHM}:' prefix")]
    MissingAlgorithm,

    /// The prefix names an algorithm other than SHA-256.
    #[error("unsupported digest algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    /// The hex part has the wrong length.
    #[error("digest must have 64 hex chars, got {0}")]
    Length(usize),

    /// The hex part contains a character outside `[0-9a-f]`.
    #[error("invalid digest character '{0}'")]
    Character(char),
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SHA256_ALGORITHM}:{}", self.hex())
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (algorithm, hex) = value
            .split_once(':')
            .ok_or(DigestError::MissingAlgorithm)?;
        if algorithm != SHA256_ALGORITHM {
            return Err(DigestError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        Self::from_hex(hex)
    }
}

impl From<[u8; SHA256_DIGEST_SIZE]> for Digest {
    fn from(value: [u8; SHA256_DIGEST_SIZE]) -> Self {
        Digest(value)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CONTENT_DIGEST: &str =
        "sha256:e0c6189f72b0e909e963116fb71625186098e75a843abffc6f7f5ab53df8cdd3";

    #[test]
    fn it_names_content_by_its_sha256() {
        assert_eq!(
            Digest::of(b"here-is-some-content").to_string(),
            CONTENT_DIGEST
        );
    }

    #[test]
    fn it_hashes_chunks_like_a_single_buffer() {
        let chunked = Digest::of_chunks([b"here-is-".as_slice(), b"some-content".as_slice()]);
        assert_eq!(chunked, Digest::of(b"here-is-some-content"));
    }

    #[test]
    fn it_parses_its_own_textual_form() {
        let digest: Digest = CONTENT_DIGEST.parse().unwrap();
        assert!(digest.matches(b"here-is-some-content"));
        assert!(!digest.matches(b"here-is-other-content"));
    }

    #[test]
    fn it_rejects_malformed_digests() {
        assert_eq!(
            "e0c6".parse::<Digest>(),
            Err(DigestError::MissingAlgorithm)
        );
        assert_eq!(
            "md5:e0c6".parse::<Digest>(),
            Err(DigestError::UnsupportedAlgorithm("md5".into()))
        );
        assert_eq!("sha256:e0c6".parse::<Digest>(), Err(DigestError::Length(4)));
        assert_eq!(
            CONTENT_DIGEST.to_uppercase().replace("SHA256", "sha256").parse::<Digest>(),
            Err(DigestError::Character('E'))
        );
    }

    #[test]
    fn it_serializes_as_a_string() {
        let digest = Digest::of(b"here-is-some-content");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{CONTENT_DIGEST}\""));
        assert_eq!(serde_json::from_str::<Digest>(&json).unwrap(), digest);
    }

    #[test]
    fn it_explains_a_wrong_length() {
        assert_eq!(
            DigestError::Length(4).to_string(),
            "digest must have 64 hex chars, got 4"
        );
        assert_eq!(
            Digest::from_hex(&"é".repeat(32)),
            Err(DigestError::Character('é'))
        );
    }

    proptest! {
        #[test]
        fn it_reparses_any_computed_digest(content in proptest::collection::vec(any::<u8>(), 0..256)) {
            let digest = Digest::of(&content);
            prop_assert_eq!(digest.to_string().parse::<Digest>(), Ok(digest));
            prop_assert_eq!(Digest::from_hex(&digest.hex()), Ok(digest));
        }
    }
}
