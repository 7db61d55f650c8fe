//! One-time HMAC signing keys.

use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

/// Width of an HS256 signing key in bytes.
pub const SIGNING_KEY_LEN: usize = 32;

/// Symmetric key material used to sign exactly one token.
///
/// The bytes are zeroized on drop and never printed.
pub struct SigningKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl SigningKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut bytes = Zeroizing::new(vec![0u8; SIGNING_KEY_LEN]);
        rng.fill_bytes(bytes.as_mut_slice());

        Self { bytes }
    }

    /// Take ownership of key material recovered from a key service.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}
