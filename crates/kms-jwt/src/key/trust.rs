//! The set of keys a verifier accepts as legitimate signers.

use super::{KeyIdentity, KeyIdentityResolver, KeyReference, SigningKey, UnwrappedKey};
use crate::error::KeyOperationError;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Immutable allowlist of trusted keys.
///
/// Every caller-supplied reference maps to exactly one resolved identity.
/// An identity is trusted when it equals either side of any entry, so aliases,
/// key ids and ARNs can be passed interchangeably.
#[derive(Debug, Clone, Default)]
pub struct TrustSet {
    entries: BTreeMap<KeyReference, KeyIdentity>,
}

impl TrustSet {
    /// Resolve each reference through the key service.
    ///
    /// A reference that cannot be resolved is kept as already canonical.
    pub async fn resolve<I, R>(references: I, resolver: &R) -> Self
    where
        I: IntoIterator,
        I::Item: Into<KeyReference>,
        R: KeyIdentityResolver + ?Sized,
    {
        let mut entries = BTreeMap::new();
        for reference in references {
            let reference = reference.into();
            if entries.contains_key(&reference) {
                continue;
            }

            let identity = match resolver.resolve_identity(&reference).await {
                Ok(identity) => {
                    debug!(reference = %reference, identity = %identity, "Resolved trusted key");
                    identity
                }
                Err(e) => {
                    debug!(reference = %reference, error = %e, "Key resolution failed, using reference as-is");
                    reference.to_identity()
                }
            };
            entries.insert(reference, identity);
        }

        Self { entries }
    }

    /// Build a trust set without consulting a key service.
    pub fn canonical<I>(references: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<KeyReference>,
    {
        let entries = references
            .into_iter()
            .map(|reference| {
                let reference = reference.into();
                let identity = reference.to_identity();
                (reference, identity)
            })
            .collect();

        Self { entries }
    }

    /// Check whether `identity` names a trusted key.
    pub fn contains(&self, identity: &KeyIdentity) -> bool {
        self.entries
            .iter()
            .any(|(reference, resolved)| resolved == identity || reference.as_str() == identity.as_str())
    }

    /// Hand back the key only if it was unwrapped by a trusted key.
    ///
    /// On rejection the plaintext is dropped here and never reaches a verifier.
    pub fn admit(&self, unwrapped: UnwrappedKey) -> Result<SigningKey, KeyOperationError> {
        let UnwrappedKey { key, identity } = unwrapped;
        if !self.contains(&identity) {
            warn!(identity = %identity, "Rejecting key outside the trust set");
            return Err(KeyOperationError::UntrustedKey { identity });
        }
        Ok(key)
    }

    /// The resolved identity for each caller-supplied reference.
    pub fn entries(&self) -> impl Iterator<Item = (&KeyReference, &KeyIdentity)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
