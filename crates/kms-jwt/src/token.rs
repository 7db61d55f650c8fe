//! Token issuing and verification.
//!
//! Every token is signed (HS256) with its own random key. That key travels
//! inside the token, wrapped by a [`KeyProtection`] backend and stored in the
//! header's `kid` field:
//!
//! ```text
//! encode: claims -> fresh key -> wrap -> kid -> sign
//! decode: kid -> unwrap -> trust check -> verify signature -> check exp -> claims
//! ```

use crate::claims::{Claims, EXPIRATION_CLAIM, Payload};
use crate::error::{InvalidArgumentError, KeyOperationError, TokenEncodingError, TokenVerificationError};
use crate::key::{KeyIdentityResolver, KeyProtection, KeyReference, SigningKey, TrustSet, WrappedKey};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Signature algorithm for every token.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Tolerance applied to `exp`, in seconds.
pub const CLOCK_SKEW_SECONDS: u64 = 60;

/// Issues tokens signed with a fresh, wrapped key.
#[derive(Clone)]
pub struct TokenEncoder {
    protection: Arc<dyn KeyProtection>,
}

impl TokenEncoder {
    /// Create a new encoder wrapping keys through `protection`.
    pub fn new(protection: Arc<dyn KeyProtection>) -> Self {
        Self { protection }
    }

    /// Issue a token carrying `claims` that expires at `expires_at`.
    ///
    /// Exactly one wrap call is made; its failure fails the whole encode.
    pub async fn encode(&self, claims: &Claims, expires_at: DateTime<Utc>) -> Result<String, TokenEncodingError> {
        if claims.contains(EXPIRATION_CLAIM) {
            return Err(InvalidArgumentError::ReservedClaim(EXPIRATION_CLAIM.to_string()).into());
        }

        let exp = expires_at.timestamp();
        if exp < 0 {
            return Err(InvalidArgumentError::ExpirationBeforeEpoch(exp).into());
        }

        let signing_key = SigningKey::generate();
        let wrapped = self.protection.wrap(signing_key.as_bytes()).await?;

        let mut header = Header::new(ALGORITHM);
        header.kid = Some(wrapped.to_kid());

        let payload = Payload {
            claims: claims.clone(),
            exp,
        };

        let token = jsonwebtoken::encode(&header, &payload, &EncodingKey::from_secret(signing_key.as_bytes()))?;

        info!(claims = ?claims.names(), exp = payload.exp, "Token issued");
        Ok(token)
    }
}

/// Verifies tokens whose signing key is wrapped in the `kid` header.
#[derive(Clone)]
pub struct TokenDecoder {
    protection: Arc<dyn KeyProtection>,
    trust_set: TrustSet,
    validation: Validation,
}

impl TokenDecoder {
    /// Create a decoder accepting keys unwrapped by members of `trust_set`.
    pub fn new(protection: Arc<dyn KeyProtection>, trust_set: TrustSet) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = CLOCK_SKEW_SECONDS;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&[EXPIRATION_CLAIM]);

        Self {
            protection,
            trust_set,
            validation,
        }
    }

    /// Create a decoder, resolving `trusted` references through the backend.
    ///
    /// Costs one lookup per reference. Lookup failures are not fatal.
    pub async fn resolve<P, I>(protection: Arc<P>, trusted: I) -> Self
    where
        P: KeyProtection + KeyIdentityResolver + 'static,
        I: IntoIterator,
        I::Item: Into<KeyReference>,
    {
        let trust_set = TrustSet::resolve(trusted, protection.as_ref()).await;
        debug!(trusted_keys = trust_set.len(), "Trust set resolved");
        Self::new(protection, trust_set)
    }

    pub fn trust_set(&self) -> &TrustSet {
        &self.trust_set
    }

    /// Verify `token` and return its claims.
    ///
    /// Checks run in a fixed order and the first failure wins: emptiness,
    /// structure, key identifier, key recovery and trust, signature, expiry.
    pub async fn decode(&self, token: &str) -> Result<Claims, TokenVerificationError> {
        let result = self.verify(token).await;
        match &result {
            Ok(claims) => info!(claims = ?claims.names(), "Token verified"),
            Err(e) => warn!(error = %e, "Token rejected"),
        }
        result
    }

    async fn verify(&self, token: &str) -> Result<Claims, TokenVerificationError> {
        if token.trim().is_empty() {
            return Err(InvalidArgumentError::EmptyToken.into());
        }

        let header = read_header(token)?;
        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(TokenVerificationError::MissingKeyId)?;

        let signing_key = self
            .recover_key(&kid)
            .await
            .map_err(TokenVerificationError::KeyDecryption)?;

        let data = jsonwebtoken::decode::<Payload>(
            token,
            &DecodingKey::from_secret(signing_key.as_bytes()),
            &self.validation,
        )
        .map_err(classify)?;

        Ok(data.claims.claims)
    }

    /// Unwrap the key and release it only if a trusted key unwrapped it.
    async fn recover_key(&self, kid: &str) -> Result<SigningKey, KeyOperationError> {
        let wrapped = WrappedKey::from_kid(kid)?;
        let unwrapped = self.protection.unwrap(wrapped.as_bytes()).await?;
        self.trust_set.admit(unwrapped)
    }
}

/// Check the three-part framing and parse the header.
fn read_header(token: &str) -> Result<Header, TokenVerificationError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenVerificationError::Unreadable(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    }

    for (name, segment) in ["header", "payload", "signature"].iter().zip(&segments) {
        URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|e| TokenVerificationError::Unreadable(format!("{name} is not valid base64url: {e}")))?;
    }

    let header = jsonwebtoken::decode_header(token).map_err(|e| TokenVerificationError::Unreadable(e.to_string()))?;
    if header.alg != ALGORITHM {
        return Err(TokenVerificationError::Unreadable(format!(
            "unsupported algorithm {:?}",
            header.alg
        )));
    }

    Ok(header)
}

fn classify(err: jsonwebtoken::errors::Error) -> TokenVerificationError {
    match err.kind() {
        ErrorKind::InvalidSignature => TokenVerificationError::UntrustedSignature,
        ErrorKind::ExpiredSignature => TokenVerificationError::Expired,
        _ => TokenVerificationError::Unreadable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ClaimValue;
    use crate::key::{KeyIdentity, LocalKeyProtection, UnwrappedKey};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    const SECRET: &[u8; 32] = b"0123456789ABCDEF0123456789ABCDEF";
    const OTHER_SECRET: &[u8; 32] = b"FEDCBA9876543210FEDCBA9876543210";
    const IDENTITY: &str = "local/test";

    /// kid = base64("0123456789ABCDEF0123456789ABCDEF")
    const KID_HEADER: &str = "eyJhbGciOiJIUzI1NiIsImtpZCI6Ik1ERXlNelExTmpjNE9VRkNRMFJGUmpBeE1qTTBOVFkzT0RsQlFrTkVSVVk9In0";

    /// Unwraps every ciphertext to a fixed key and records what it was given.
    struct FixedUnwrap {
        key: Vec<u8>,
        identity: &'static str,
        seen: Mutex<Vec<Vec<u8>>>,
    }

    impl FixedUnwrap {
        fn new(key: &[u8], identity: &'static str) -> Self {
            Self {
                key: key.to_vec(),
                identity,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl KeyProtection for FixedUnwrap {
        async fn wrap(&self, plaintext: &[u8]) -> Result<WrappedKey, KeyOperationError> {
            Ok(WrappedKey::new(plaintext))
        }

        async fn unwrap(&self, ciphertext: &[u8]) -> Result<UnwrappedKey, KeyOperationError> {
            self.seen.lock().unwrap().push(ciphertext.to_vec());
            Ok(UnwrappedKey {
                key: SigningKey::from_bytes(self.key.clone()),
                identity: KeyIdentity::from(self.identity),
            })
        }
    }

    /// Fails every operation.
    struct Unavailable;

    #[async_trait]
    impl KeyProtection for Unavailable {
        async fn wrap(&self, _plaintext: &[u8]) -> Result<WrappedKey, KeyOperationError> {
            Err(KeyOperationError::MalformedResponse("X".to_string()))
        }

        async fn unwrap(&self, _ciphertext: &[u8]) -> Result<UnwrappedKey, KeyOperationError> {
            Err(KeyOperationError::MalformedResponse("X".to_string()))
        }
    }

    fn local() -> Arc<LocalKeyProtection> {
        Arc::new(LocalKeyProtection::new(IDENTITY, *SECRET))
    }

    fn decoder_for(protection: Arc<dyn KeyProtection>) -> TokenDecoder {
        TokenDecoder::new(protection, TrustSet::canonical([IDENTITY]))
    }

    #[tokio::test]
    async fn test_encode_and_decode_work_together() {
        let protection = local();
        let encoder = TokenEncoder::new(protection.clone());
        let decoder = decoder_for(protection);

        let claims = Claims::new().with("usr", "friendly_name");
        let token = encoder.encode(&claims, Utc::now() + Duration::days(2)).await.unwrap();

        assert_eq!(decoder.decode(&token).await.unwrap(), claims);
    }

    #[tokio::test]
    async fn test_header_carries_wrapped_key() {
        let protection = local();
        let encoder = TokenEncoder::new(protection.clone());

        let token = encoder
            .encode(&Claims::new().with("usr", "alice"), Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();

        assert_eq!(header.alg, Algorithm::HS256);
        let wrapped = WrappedKey::from_kid(&header.kid.unwrap()).unwrap();
        let unwrapped = protection.unwrap(wrapped.as_bytes()).await.unwrap();
        assert_eq!(unwrapped.key.len(), 32);
    }

    #[tokio::test]
    async fn test_encode_rejects_reserved_claim() {
        let encoder = TokenEncoder::new(local());
        let claims = Claims::new().with(EXPIRATION_CLAIM, "never");

        let err = encoder.encode(&claims, Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            TokenEncodingError::InvalidArgument(InvalidArgumentError::ReservedClaim(_))
        ));
    }

    #[tokio::test]
    async fn test_encode_rejects_expiration_before_epoch() {
        let encoder = TokenEncoder::new(Arc::new(Unavailable));
        let expires_at = DateTime::<Utc>::from_timestamp(-10, 0).unwrap();

        // Rejected before the backend is asked to wrap anything.
        let err = encoder
            .encode(&Claims::new().with("usr", "alice"), expires_at)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TokenEncodingError::InvalidArgument(InvalidArgumentError::ExpirationBeforeEpoch(-10))
        ));
    }

    #[tokio::test]
    async fn test_epoch_expiration_decodes_as_expired() {
        let protection = local();
        let encoder = TokenEncoder::new(protection.clone());
        let token = encoder
            .encode(&Claims::new().with("usr", "alice"), DateTime::<Utc>::from_timestamp(0, 0).unwrap())
            .await
            .unwrap();

        let err = decoder_for(protection).decode(&token).await.unwrap_err();
        assert!(matches!(err, TokenVerificationError::Expired));
    }

    #[tokio::test]
    async fn test_non_string_key_id_is_unreadable() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","kid":12}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"usr":"alice","exp":0}"#);
        let protection = Arc::new(FixedUnwrap::new(SECRET, IDENTITY));
        let decoder = decoder_for(protection.clone());

        let err = decoder.decode(&format!("{header}.{payload}.c2ln")).await.unwrap_err();

        assert!(matches!(err, TokenVerificationError::Unreadable(_)), "{err}");
        assert!(protection.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_encode_propagates_wrap_failure() {
        let encoder = TokenEncoder::new(Arc::new(Unavailable));

        let err = encoder
            .encode(&Claims::new().with("usr", "alice"), Utc::now() + Duration::days(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TokenEncodingError::KeyOperation(KeyOperationError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_decode_rejects_empty_token() {
        let decoder = decoder_for(local());

        for token in ["", "   "] {
            let err = decoder.decode(token).await.unwrap_err();
            assert!(err.to_string().contains("empty"));
            assert!(matches!(
                err,
                TokenVerificationError::InvalidArgument(InvalidArgumentError::EmptyToken)
            ));
        }
    }

    #[tokio::test]
    async fn test_decode_rejects_invalid_token() {
        let decoder = decoder_for(local());

        for token in ["X.Y.X", "a.b", "a.b.c.d", "e30.e30.!!"] {
            let err = decoder.decode(token).await.unwrap_err();
            assert!(err.to_string().contains("unable to read"), "{token}: {err}");
        }
    }

    #[tokio::test]
    async fn test_decode_rejects_valid_token_without_key_id() {
        let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9\
                     .eyJzdWIiOiIxMjM0NTY3ODkwIiwibmFtZSI6IkpvaG4gRG9lIiwiYWRtaW4iOnRydWV9\
                     .TJVA95OrM7E2cBab30RMHrHDcEfxjoYZgeFONFh7HgQ";
        let decoder = decoder_for(local());

        let err = decoder.decode(token).await.unwrap_err();
        assert!(matches!(err, TokenVerificationError::MissingKeyId));
        assert!(err.to_string().contains("no key identifier"));
    }

    #[tokio::test]
    async fn test_decode_rejects_if_key_cannot_be_decrypted() {
        let token = format!("{KID_HEADER}.eyJ1c3IiOiJmcmllbmRseV9uYW1lIn0.wvWzfuRlAa1nKgOsagwq7at-U6zsrMzzdHfxJiV4d_c");
        let decoder = decoder_for(Arc::new(Unavailable));

        let err = decoder.decode(&token).await.unwrap_err();
        assert!(err.to_string().contains("key decryption failed"));
        assert!(matches!(err, TokenVerificationError::KeyDecryption(_)));
    }

    #[tokio::test]
    async fn test_decode_uses_key_id_to_obtain_key() {
        let token = format!("{KID_HEADER}.eyJ1c3IiOiJmcmllbmRseV9uYW1lIn0.wvWzfuRlAa1nKgOsagwq7at-U6zsrMzzdHfxJiV4d_c");
        let protection = Arc::new(FixedUnwrap::new(SECRET, IDENTITY));
        let decoder = decoder_for(protection.clone());

        let _ = decoder.decode(&token).await;

        assert_eq!(*protection.seen.lock().unwrap(), vec![SECRET.to_vec()]);
    }

    #[tokio::test]
    async fn test_decode_rejects_if_expiration_date_in_the_past() {
        let token = format!("{KID_HEADER}.eyJleHAiOjAsInVzciI6ImZyaWVuZGx5X25hbWUifQ.nXiyXh-8P23T_5e4Pf5LwyG4QX4-DatK95D3fEQqc-I");
        let decoder = decoder_for(Arc::new(FixedUnwrap::new(SECRET, IDENTITY)));

        let err = decoder.decode(&token).await.unwrap_err();
        assert!(matches!(err, TokenVerificationError::Expired));
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn test_decode_rejects_if_keys_do_not_match() {
        let token = format!(
            "{KID_HEADER}.eyJzdWIiOiIxMjM0NTY3ODkwIiwibmFtZSI6IkpvaG4gRG9lIiwiYWRtaW4iOnRydWV9.IzAFrMM0MbFJB9a35yQcp-jLSk7pBJP036CK5C144cI"
        );
        let decoder = decoder_for(Arc::new(FixedUnwrap::new(OTHER_SECRET, IDENTITY)));

        let err = decoder.decode(&token).await.unwrap_err();
        assert!(matches!(err, TokenVerificationError::UntrustedSignature));
        assert!(err.to_string().contains("should not be trusted"));
    }

    #[tokio::test]
    async fn test_decode_rejects_untrusted_key_before_verifying() {
        let token = format!("{KID_HEADER}.eyJleHAiOjAsInVzciI6ImZyaWVuZGx5X25hbWUifQ.nXiyXh-8P23T_5e4Pf5LwyG4QX4-DatK95D3fEQqc-I");
        let decoder = decoder_for(Arc::new(FixedUnwrap::new(SECRET, "local/attacker")));

        // The token is expired, but the trust check runs first.
        let err = decoder.decode(&token).await.unwrap_err();
        match err {
            TokenVerificationError::KeyDecryption(KeyOperationError::UntrustedKey { identity }) => {
                assert_eq!(identity.as_str(), "local/attacker");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_decode_rejects_other_algorithms() {
        let protection = local();
        let key = SigningKey::generate();
        let wrapped = protection.wrap(key.as_bytes()).await.unwrap();

        let mut header = Header::new(Algorithm::HS512);
        header.kid = Some(wrapped.to_kid());
        let payload = Payload {
            claims: Claims::new().with("usr", "alice"),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
        };
        let token = jsonwebtoken::encode(&header, &payload, &EncodingKey::from_secret(key.as_bytes())).unwrap();

        let err = decoder_for(protection).decode(&token).await.unwrap_err();
        assert!(err.to_string().contains("unsupported algorithm"));
    }

    #[tokio::test]
    async fn test_decode_returns_list_claims() {
        let protection = local();
        let encoder = TokenEncoder::new(protection.clone());
        let decoder = decoder_for(protection);

        let claims = Claims::new()
            .with("usr", "alice")
            .with("tdl_wrm", vec!["SUM", "HLO"])
            .with("tdl_chx", "UPR");
        let token = encoder.encode(&claims, Utc::now() + Duration::minutes(5)).await.unwrap();

        let decoded = decoder.decode(&token).await.unwrap();
        assert_eq!(decoded.get("tdl_wrm"), Some(&ClaimValue::from(vec!["SUM", "HLO"])));
        assert!(!decoded.contains(EXPIRATION_CLAIM));
    }

    #[tokio::test]
    async fn test_resolve_builds_trust_set_from_aliases() {
        let protection = Arc::new(LocalKeyProtection::new(IDENTITY, *SECRET).with_alias("alias/test"));
        let encoder = TokenEncoder::new(protection.clone());
        let decoder = TokenDecoder::resolve(protection, ["alias/test"]).await;

        let claims = Claims::new().with("usr", "alice");
        let token = encoder.encode(&claims, Utc::now() + Duration::days(2)).await.unwrap();

        assert_eq!(decoder.trust_set().len(), 1);
        assert_eq!(decoder.decode(&token).await.unwrap(), claims);
    }
}
