//! Key protection: wrapping and unwrapping of per-token signing keys.
//!
//! A [`KeyProtection`] backend encrypts ("wraps") the signing key generated
//! for each token and later decrypts ("unwraps") it again, reporting which
//! key performed the decryption. Whether that key is acceptable is decided
//! locally by a [`TrustSet`], never by the backend.
//!
//! | Backend | Wraps with | Identity reported by unwrap |
//! |---------|------------|-----------------------------|
//! | [`KmsKeyProtection`] | AWS KMS `Encrypt` | `KeyId` (ARN) from `Decrypt` |
//! | [`LocalKeyProtection`] | AES-256-GCM, fixed key | the configured identity |

pub mod kms;
pub mod local;
pub mod signing;
pub mod trust;

pub use kms::KmsKeyProtection;
pub use local::LocalKeyProtection;
pub use signing::SigningKey;
pub use trust::TrustSet;

use crate::error::KeyOperationError;
use async_trait::async_trait;
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// URL-safe alphabet that accepts input with or without padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Canonical identifier of a key as known to the key service (an ARN for KMS).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyIdentity(String);

/// Any caller-supplied name for a key: ARN, key id, alias or alias ARN.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyReference(String);

macro_rules! string_newtype {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_newtype!(KeyIdentity);
string_newtype!(KeyReference);

impl KeyReference {
    /// Treat this reference as already canonical.
    pub fn to_identity(&self) -> KeyIdentity {
        KeyIdentity(self.0.clone())
    }
}

/// Ciphertext of a signing key, opaque to everyone but the key service.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    pub fn new(ciphertext: impl Into<Vec<u8>>) -> Self {
        Self(ciphertext.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode for the `kid` header field (base64url, unpadded).
    pub fn to_kid(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    /// Decode a `kid` header value.
    ///
    /// Accepts base64url with or without padding, then the standard alphabet.
    pub fn from_kid(kid: &str) -> Result<Self, KeyOperationError> {
        URL_SAFE_LENIENT
            .decode(kid)
            .or_else(|_| STANDARD.decode(kid))
            .map(Self)
            .map_err(|e| KeyOperationError::MalformedCiphertext(format!("invalid key identifier encoding: {e}")))
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedKey").field("len", &self.0.len()).finish()
    }
}

/// Result of an unwrap: the plaintext key and the key that decrypted it.
#[derive(Debug)]
pub struct UnwrappedKey {
    pub key: SigningKey,
    pub identity: KeyIdentity,
}

/// Wraps and unwraps signing keys through a key service.
#[async_trait]
pub trait KeyProtection: Send + Sync {
    /// Encrypt `plaintext` under the backend's designated wrapping key.
    async fn wrap(&self, plaintext: &[u8]) -> Result<WrappedKey, KeyOperationError>;

    /// Decrypt `ciphertext`, reporting the identity of the key that did so.
    ///
    /// Implementations do not check the identity; see [`TrustSet::admit`].
    async fn unwrap(&self, ciphertext: &[u8]) -> Result<UnwrappedKey, KeyOperationError>;
}

/// Resolves key references to canonical identities.
#[async_trait]
pub trait KeyIdentityResolver: Send + Sync {
    async fn resolve_identity(&self, reference: &KeyReference) -> Result<KeyIdentity, KeyOperationError>;
}
