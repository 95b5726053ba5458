use std::sync::Arc;

use bits_common::Clock;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use url::Url;

use crate::{ResourceSigner, SigningError, Verb};

/// What a verified signed URL grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAccess {
    /// The blob path, as it appears in the URL
    pub path: String,
    /// The granted verb
    pub verb: Verb,
    /// When the grant lapses
    pub expiration: DateTime<Utc>,
}

/// Signs URLs that point back at this service rather than at a backing
/// store, for backends that cannot sign URLs themselves.
///
/// A URL for `path` looks like
/// `<base>/<path>?verb=GET&expires=<unix seconds>&signature=<hex>`, where the
/// signature is HMAC-SHA256 over `"<verb>\n<path>\n<expires>"` with a shared
/// secret. The serving side checks it with [LocalResourceSigner::verify].
#[derive(Clone)]
pub struct LocalResourceSigner {
    base: Url,
    prefix: String,
    secret: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LocalResourceSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalResourceSigner")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl LocalResourceSigner {
    /// Create a signer for URLs under `base`.
    pub fn new(
        base: Url,
        secret: impl Into<Vec<u8>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SigningError> {
        if base.cannot_be_a_base() {
            return Err(SigningError::InvalidUrl(format!(
                "{base} cannot be used as a base URL"
            )));
        }

        let mut base = base;
        base.set_query(None);
        base.set_fragment(None);
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let prefix = base.path().to_string();

        Ok(Self {
            base,
            prefix,
            secret: secret.into(),
            clock,
        })
    }

    /// The URL every signed URL starts with.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Check that `url` was issued by this signer, is unaltered, and has not
    /// expired according to the signer's clock.
    pub fn verify(&self, url: &Url) -> Result<SignedAccess, SigningError> {
        if url.origin() != self.base.origin() {
            return Err(SigningError::InvalidUrl(format!(
                "{url} is not under {}",
                self.base
            )));
        }
        let path = self.resource_path(url)?;

        let parameter = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .ok_or_else(|| SigningError::InvalidUrl(format!("missing '{name}' parameter")))
        };

        let verb: Verb = parameter("verb")?
            .parse()
            .map_err(|error| SigningError::InvalidUrl(format!("{error}")))?;
        let expires: i64 = parameter("expires")?
            .parse()
            .map_err(|_| SigningError::InvalidUrl("malformed 'expires' parameter".into()))?;
        let signature =
            hex::decode(parameter("signature")?).map_err(|_| SigningError::InvalidSignature)?;

        self.mac(&path, verb, expires)
            .verify_slice(&signature)
            .map_err(|_| SigningError::InvalidSignature)?;

        let expiration = DateTime::<Utc>::from_timestamp(expires, 0)
            .ok_or_else(|| SigningError::InvalidUrl("'expires' out of range".into()))?;
        if self.clock.now() >= expiration {
            return Err(SigningError::Expired);
        }

        Ok(SignedAccess {
            path,
            verb,
            expiration,
        })
    }

    fn resource_path(&self, url: &Url) -> Result<String, SigningError> {
        url.path()
            .strip_prefix(self.prefix.as_str())
            .map(str::to_string)
            .ok_or_else(|| SigningError::InvalidUrl(format!("{url} is not under {}", self.base)))
    }

    fn mac(&self, path: &str, verb: Verb, expires: i64) -> Hmac<Sha256> {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.secret).expect("HMAC-SHA256 accepts keys of any size");
        mac.update(format!("{verb}\n{path}\n{expires}").as_bytes());
        mac
    }
}

impl ResourceSigner for LocalResourceSigner {
    fn sign(&self, path: &str, verb: Verb, expiration: DateTime<Utc>) -> Result<Url, SigningError> {
        if expiration <= self.clock.now() {
            return Err(SigningError::InvalidExpiration(format!(
                "{expiration} is not in the future"
            )));
        }
        let expires = expiration.timestamp();

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SigningError::InvalidUrl(format!("{} cannot have a path", self.base)))?
            .pop_if_empty()
            .extend(path.split('/'));
        let resource = self.resource_path(&url)?;

        let signature = self.mac(&resource, verb, expires).finalize().into_bytes();

        url.query_pairs_mut()
            .append_pair("verb", verb.as_str())
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &hex::encode(signature));

        debug!(path, %verb, %expiration, "Signed local URL");
        Ok(url)
    }
}
