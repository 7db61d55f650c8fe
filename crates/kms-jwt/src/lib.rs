//! # kms-jwt
//!
//! JSON Web Tokens whose signing key is never stored in the clear.
//!
//! This crate provides functionality for:
//! - Issuing HS256 tokens signed with a fresh random key per token
//! - Wrapping that key with AWS KMS and embedding the ciphertext as `kid`
//! - Verifying tokens by unwrapping the key, checking it against a trust set,
//!   then checking signature and expiration
//!
//! ## Token Model
//!
//! | Part | Contains |
//! |------|----------|
//! | **Header** | `alg` = `HS256`, `kid` = base64url(KMS ciphertext of the signing key) |
//! | **Payload** | Caller claims (strings or string lists) and `exp` |
//! | **Signature** | HMAC-SHA256 with the per-token key |
//!
//! ## Why a trust set?
//!
//! KMS decrypts any ciphertext produced under a key the caller may use, and
//! tells us which key that was. A verifier must only accept keys it
//! recognizes, so the decrypting key's ARN is checked against an explicit
//! allowlist before the recovered key is used for anything.
//!
//! ## Example
//!
//! ```no_run
//! use chrono::{Duration, Utc};
//! use kms_jwt::{Claims, KmsConfig, KmsKeyProtection, TokenDecoder, TokenEncoder};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KmsConfig::new("eu-west-2").client().await;
//! let key = "alias/token-signing";
//!
//! let encoder = TokenEncoder::new(Arc::new(KmsKeyProtection::with_wrapping_key(client.clone(), key)));
//! let claims = Claims::new().with("usr", "alice");
//! let token = encoder.encode(&claims, Utc::now() + Duration::days(2)).await?;
//!
//! let decoder = TokenDecoder::resolve(Arc::new(KmsKeyProtection::new(client)), [key]).await;
//! assert_eq!(decoder.decode(&token).await?, claims);
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod config;
pub mod error;
pub mod key;
pub mod token;

pub use claims::{ClaimValue, Claims};
pub use config::KmsConfig;
pub use error::{InvalidArgumentError, KeyOperationError, TokenEncodingError, TokenVerificationError};
pub use key::{
    KeyIdentity, KeyIdentityResolver, KeyProtection, KeyReference, KmsKeyProtection, LocalKeyProtection, SigningKey,
    TrustSet, UnwrappedKey, WrappedKey,
};
pub use token::{CLOCK_SKEW_SECONDS, TokenDecoder, TokenEncoder};
