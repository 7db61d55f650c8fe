//! AWS KMS key protection.
//!
//! ## Wrap
//!
//! `kms:Encrypt` under the configured key. The ciphertext blob carries the
//! key metadata, so no key id needs to travel with the token.
//!
//! ## Unwrap
//!
//! `kms:Decrypt` without a key id. KMS picks the key from the ciphertext and
//! reports its ARN in `KeyId`; that ARN is what the trust set checks. Any key
//! the caller's credentials can use will decrypt successfully, which is why
//! the identity check cannot be delegated to KMS.
//!
//! ## Resolve
//!
//! `kms:DescribeKey` maps aliases, alias ARNs and key ids to the key ARN.

use super::{KeyIdentity, KeyIdentityResolver, KeyProtection, KeyReference, SigningKey, UnwrappedKey, WrappedKey};
use crate::error::KeyOperationError;
use async_trait::async_trait;
use aws_sdk_kms::Client as KmsClient;
use aws_sdk_kms::error::DisplayErrorContext;
use aws_sdk_kms::primitives::Blob;
use tracing::{debug, info};

/// KMS-backed key protection.
#[derive(Debug, Clone)]
pub struct KmsKeyProtection {
    client: KmsClient,
    wrapping_key: Option<KeyReference>,
}

impl KmsKeyProtection {
    /// Create a backend that can only unwrap and resolve keys.
    pub fn new(client: KmsClient) -> Self {
        Self {
            client,
            wrapping_key: None,
        }
    }

    /// Create a backend that wraps under `wrapping_key`.
    pub fn with_wrapping_key(client: KmsClient, wrapping_key: impl Into<KeyReference>) -> Self {
        Self {
            client,
            wrapping_key: Some(wrapping_key.into()),
        }
    }

    pub fn wrapping_key(&self) -> Option<&KeyReference> {
        self.wrapping_key.as_ref()
    }
}

#[async_trait]
impl KeyProtection for KmsKeyProtection {
    async fn wrap(&self, plaintext: &[u8]) -> Result<WrappedKey, KeyOperationError> {
        let key_id = self.wrapping_key.as_ref().ok_or(KeyOperationError::NoWrappingKey)?;
        debug!(key_id = %key_id, "Encrypting signing key");

        let response = self
            .client
            .encrypt()
            .key_id(key_id.as_str())
            .plaintext(Blob::new(plaintext))
            .send()
            .await
            .map_err(|e| KeyOperationError::service(format!("Encrypt failed: {}", DisplayErrorContext(&e)), e))?;

        let ciphertext = response
            .ciphertext_blob()
            .ok_or_else(|| KeyOperationError::MalformedResponse("no ciphertext in Encrypt response".to_string()))?;

        info!(key_id = %key_id, ciphertext_len = ciphertext.as_ref().len(), "Signing key encrypted");
        Ok(WrappedKey::new(ciphertext.as_ref()))
    }

    async fn unwrap(&self, ciphertext: &[u8]) -> Result<UnwrappedKey, KeyOperationError> {
        debug!(ciphertext_len = ciphertext.len(), "Decrypting signing key");

        let response = self
            .client
            .decrypt()
            .ciphertext_blob(Blob::new(ciphertext))
            .send()
            .await
            .map_err(|e| KeyOperationError::service(format!("Decrypt failed: {}", DisplayErrorContext(&e)), e))?;

        let identity = response
            .key_id()
            .map(KeyIdentity::from)
            .ok_or_else(|| KeyOperationError::MalformedResponse("no key id in Decrypt response".to_string()))?;
        let plaintext = response
            .plaintext()
            .ok_or_else(|| KeyOperationError::MalformedResponse("no plaintext in Decrypt response".to_string()))?;

        info!(key_id = %identity, "Signing key decrypted");
        Ok(UnwrappedKey {
            key: SigningKey::from_bytes(plaintext.as_ref().to_vec()),
            identity,
        })
    }
}

#[async_trait]
impl KeyIdentityResolver for KmsKeyProtection {
    async fn resolve_identity(&self, reference: &KeyReference) -> Result<KeyIdentity, KeyOperationError> {
        let response = self
            .client
            .describe_key()
            .key_id(reference.as_str())
            .send()
            .await
            .map_err(|e| KeyOperationError::service(format!("DescribeKey failed: {}", DisplayErrorContext(&e)), e))?;

        response
            .key_metadata()
            .and_then(|metadata| metadata.arn())
            .map(KeyIdentity::from)
            .ok_or_else(|| KeyOperationError::MalformedResponse("no key ARN in DescribeKey response".to_string()))
    }
}
