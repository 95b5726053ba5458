use bits_common::{Clock, SystemClock};
use chrono::Duration;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::{ResourceSigner, SigningError, UnknownVerb, Verb};

/// How long a URL issued by [SignResourceHandler] stays valid.
pub const SIGNED_URL_LIFETIME: Duration = Duration::hours(1);

/// Why [SignResourceHandler::sign] produced no URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignResourceError {
    /// The `verb` query parameter is not one of get, put, head or delete
    #[error("Invalid verb: {0}")]
    InvalidVerb(String),

    /// The signer refused
    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl From<UnknownVerb> for SignResourceError {
    fn from(error: UnknownVerb) -> Self {
        SignResourceError::InvalidVerb(error.0)
    }
}

impl SignResourceError {
    /// The HTTP status a router should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            SignResourceError::InvalidVerb(_) => StatusCode::BAD_REQUEST,
            SignResourceError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Serves `GET /sign/{resource}?verb=<verb>`: answers with a URL granting
/// `verb` on `resource` for one hour, as a plain-text body.
#[derive(Debug, Clone)]
pub struct SignResourceHandler<S, C = SystemClock> {
    signer: S,
    clock: C,
}

impl<S> SignResourceHandler<S, SystemClock>
where
    S: ResourceSigner,
{
    /// A handler reading the system clock
    pub fn new(signer: S) -> Self {
        Self::with_clock(signer, SystemClock)
    }
}

impl<S, C> SignResourceHandler<S, C>
where
    S: ResourceSigner,
    C: Clock,
{
    /// A handler reading `clock`
    pub fn with_clock(signer: S, clock: C) -> Self {
        Self { signer, clock }
    }

    /// Sign `resource` for the verb named in `query` (`get` when absent or
    /// empty).
    pub fn sign(&self, resource: &str, query: Option<&str>) -> Result<String, SignResourceError> {
        let verb = match query.and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "verb")
                .map(|(_, value)| value.into_owned())
                .filter(|verb| !verb.is_empty())
        }) {
            Some(verb) => verb.parse::<Verb>()?,
            None => Verb::Get,
        };

        let expiration = self.clock.now() + SIGNED_URL_LIFETIME;
        let url = self.signer.sign(resource, verb, expiration)?;

        debug!(resource, %verb, %expiration, "Issued signed URL");
        Ok(url.into())
    }
}
