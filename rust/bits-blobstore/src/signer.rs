use std::{fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use url::Url;

use crate::SigningError;

mod local;
pub use local::*;

/// The operation a signed URL grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Read the blob
    Get,
    /// Upload the blob
    Put,
    /// Probe the blob
    Head,
    /// Remove the blob
    Delete,
}

impl Verb {
    /// The HTTP method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Put => "PUT",
            Verb::Head => "HEAD",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verb outside `get | put | head | delete`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown verb '{0}'")]
pub struct UnknownVerb(pub String);

impl FromStr for Verb {
    type Err = UnknownVerb;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "get" => Ok(Verb::Get),
            "put" => Ok(Verb::Put),
            "head" => Ok(Verb::Head),
            "delete" => Ok(Verb::Delete),
            _ => Err(UnknownVerb(value.to_string())),
        }
    }
}

/// A [ResourceSigner] issues URLs that let a client perform one verb on one
/// path directly against the store, until `expiration`.
///
/// Signed URLs are computed on demand and never recorded; there is no way
/// to revoke one before it expires.
pub trait ResourceSigner: Send + Sync {
    /// Sign `verb` on `path`, valid until `expiration`
    fn sign(&self, path: &str, verb: Verb, expiration: DateTime<Utc>) -> Result<Url, SigningError>;
}

impl<T> ResourceSigner for Arc<T>
where
    T: ResourceSigner + ?Sized,
{
    fn sign(&self, path: &str, verb: Verb, expiration: DateTime<Utc>) -> Result<Url, SigningError> {
        self.as_ref().sign(path, verb, expiration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_parses_verbs_case_insensitively() {
        assert_eq!("get".parse::<Verb>(), Ok(Verb::Get));
        assert_eq!("PUT".parse::<Verb>(), Ok(Verb::Put));
        assert_eq!("Head".parse::<Verb>(), Ok(Verb::Head));
        assert_eq!("delete".parse::<Verb>(), Ok(Verb::Delete));
        assert_eq!(
            "post".parse::<Verb>(),
            Err(UnknownVerb("post".to_string()))
        );
        assert!("".parse::<Verb>().is_err());
    }

    #[test]
    fn it_renders_verbs_upper_case() {
        assert_eq!(Verb::Get.to_string(), "GET");
        assert_eq!(Verb::Delete.as_str(), "DELETE");
    }
}
