//! Fixed-key protection for tests and offline development.
//!
//! Wrapped keys are `nonce (12 bytes) || AES-256-GCM ciphertext`, with the
//! key identity bound as associated data. A blob produced under a different
//! key or identity fails authentication instead of decrypting to garbage.

use super::{KeyIdentity, KeyIdentityResolver, KeyProtection, KeyReference, SigningKey, UnwrappedKey, WrappedKey};
use crate::error::KeyOperationError;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use rand::RngCore;
use std::fmt;
use tracing::debug;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Key protection backed by a single in-process AES-256 key.
#[derive(Clone)]
pub struct LocalKeyProtection {
    cipher: Aes256Gcm,
    identity: KeyIdentity,
    aliases: Vec<KeyReference>,
}

impl LocalKeyProtection {
    /// Create a backend from fixed key material.
    pub fn new(identity: impl Into<KeyIdentity>, key: [u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
            identity: identity.into(),
            aliases: Vec::new(),
        }
    }

    /// Create a backend with a random key.
    pub fn generate(identity: impl Into<KeyIdentity>) -> Self {
        let mut key = zeroize::Zeroizing::new([0u8; 32]);
        rand::rng().fill_bytes(&mut key[..]);
        Self::new(identity, *key)
    }

    /// Register another name that resolves to this key.
    pub fn with_alias(mut self, alias: impl Into<KeyReference>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn identity(&self) -> &KeyIdentity {
        &self.identity
    }
}

impl fmt::Debug for LocalKeyProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeyProtection")
            .field("identity", &self.identity)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyProtection for LocalKeyProtection {
    async fn wrap(&self, plaintext: &[u8]) -> Result<WrappedKey, KeyOperationError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: self.identity.as_str().as_bytes(),
                },
            )
            .map_err(|_| KeyOperationError::MalformedCiphertext("local encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);

        debug!(key_id = %self.identity, ciphertext_len = blob.len(), "Signing key encrypted locally");
        Ok(WrappedKey::new(blob))
    }

    async fn unwrap(&self, ciphertext: &[u8]) -> Result<UnwrappedKey, KeyOperationError> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(KeyOperationError::MalformedCiphertext(format!(
                "ciphertext is {} bytes, expected at least {}",
                ciphertext.len(),
                NONCE_LEN + TAG_LEN
            )));
        }

        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: self.identity.as_str().as_bytes(),
                },
            )
            .map_err(|_| KeyOperationError::MalformedCiphertext("ciphertext was not produced by this key".to_string()))?;

        Ok(UnwrappedKey {
            key: SigningKey::from_bytes(plaintext),
            identity: self.identity.clone(),
        })
    }
}

#[async_trait]
impl KeyIdentityResolver for LocalKeyProtection {
    async fn resolve_identity(&self, reference: &KeyReference) -> Result<KeyIdentity, KeyOperationError> {
        if reference.as_str() == self.identity.as_str() || self.aliases.contains(reference) {
            Ok(self.identity.clone())
        } else {
            Err(KeyOperationError::UnknownKey(reference.clone()))
        }
    }
}
