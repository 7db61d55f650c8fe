//! Error types for the kms-jwt crate.

use crate::key::{KeyIdentity, KeyReference};
use thiserror::Error;

/// Boxed error used to carry the underlying cause of a key service failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by a key protection backend.
#[derive(Debug, Error)]
pub enum KeyOperationError {
    /// The key service rejected the request or could not be reached.
    #[error("key service request failed: {message}")]
    Service {
        message: String,
        #[source]
        source: BoxError,
    },

    /// The key service answered, but without the fields we need.
    #[error("key service returned a malformed response: {0}")]
    MalformedResponse(String),

    /// The ciphertext could not be decoded or decrypted locally.
    #[error("ciphertext is malformed: {0}")]
    MalformedCiphertext(String),

    /// The ciphertext was decrypted by a key outside the trust set.
    #[error("ciphertext signed by unexpected key {identity}")]
    UntrustedKey { identity: KeyIdentity },

    /// The key service does not know the referenced key.
    #[error("key {0} not found")]
    UnknownKey(KeyReference),

    /// `wrap` was called on a backend that has no wrapping key.
    #[error("no wrapping key has been configured")]
    NoWrappingKey,
}

impl KeyOperationError {
    /// Wrap a service-side failure, keeping it as the error source.
    pub fn service(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Service {
            message: message.into(),
            source: source.into(),
        }
    }
}

/// A caller-supplied value violates a precondition checked before any
/// remote call is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidArgumentError {
    /// Token text was empty or blank.
    #[error("token value is empty")]
    EmptyToken,

    /// A claim uses a name the protocol writes itself.
    #[error("claim name `{0}` is reserved")]
    ReservedClaim(String),

    /// `exp` cannot be represented as an unsigned epoch timestamp.
    #[error("expiration {0} is before the Unix epoch")]
    ExpirationBeforeEpoch(i64),
}

/// Errors that can occur while issuing a token.
#[derive(Debug, Error)]
pub enum TokenEncodingError {
    /// Wrapping the signing key failed.
    #[error(transparent)]
    KeyOperation(#[from] KeyOperationError),

    /// The claims cannot be issued as given.
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgumentError),

    /// The token library failed to serialize or sign the token.
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Errors that can occur while decoding and verifying a token.
#[derive(Debug, Error)]
pub enum TokenVerificationError {
    /// The input was rejected before any parsing happened.
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgumentError),

    /// The token does not have the expected structure or encoding.
    #[error("unable to read token: {0}")]
    Unreadable(String),

    /// The header has no `kid` carrying the wrapped signing key.
    #[error("no key identifier found in token header")]
    MissingKeyId,

    /// The wrapped signing key could not be recovered or is not trusted.
    #[error("key decryption failed")]
    KeyDecryption(#[source] KeyOperationError),

    /// The signature does not match the recovered key.
    #[error("signature should not be trusted")]
    UntrustedSignature,

    /// The token is past its expiration, clock skew included.
    #[error("token expired")]
    Expired,
}
