//! Bearer token validation.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The algorithm is pinned by configuration: RS256 against the JWKS, or
//!   HS256 against a shared secret. The token header never chooses how it is
//!   verified, and RSA material is never used as an HMAC key.
//! - Issuer, audience and expiry are checked after the signature
//! - Callers get a typed [`RejectionReason`]; clients only ever see a generic
//!   "unauthorized"

use crate::auth::jwks::{KeyLookupError, KeySetCache};
use common::jwt::{
    extract_bearer_token, parse_header, validate_exp_at, Claims, JwtValidationError,
};
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Why a request was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("missing bearer token")]
    MissingToken,

    #[error("malformed token")]
    MalformedToken,

    #[error("unknown signing key")]
    UnknownSigningKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("token expired")]
    ExpiredToken,

    #[error("wrong issuer")]
    WrongIssuer,

    #[error("wrong audience")]
    WrongAudience,

    #[error("signing keys unavailable")]
    KeyFetchFailure,
}

impl RejectionReason {
    /// Bounded label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::MissingToken => "missing_token",
            RejectionReason::MalformedToken => "malformed_token",
            RejectionReason::UnknownSigningKey => "unknown_signing_key",
            RejectionReason::InvalidSignature => "invalid_signature",
            RejectionReason::ExpiredToken => "expired_token",
            RejectionReason::WrongIssuer => "wrong_issuer",
            RejectionReason::WrongAudience => "wrong_audience",
            RejectionReason::KeyFetchFailure => "key_fetch_failure",
        }
    }
}

impl From<JwtValidationError> for RejectionReason {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::MissingToken => RejectionReason::MissingToken,
            JwtValidationError::Expired => RejectionReason::ExpiredToken,
            JwtValidationError::MalformedAuthorizationHeader
            | JwtValidationError::TokenTooLarge
            | JwtValidationError::MalformedToken
            | JwtValidationError::MissingKid => RejectionReason::MalformedToken,
        }
    }
}

impl From<KeyLookupError> for RejectionReason {
    fn from(err: KeyLookupError) -> Self {
        match err {
            KeyLookupError::NotFound => RejectionReason::UnknownSigningKey,
            KeyLookupError::FetchFailed(_) => RejectionReason::KeyFetchFailure,
        }
    }
}

/// Outcome of admitting one request.
pub type AuthResult = Result<Claims, RejectionReason>;

/// How signatures are verified.
enum Verifier {
    /// RS256 against keys from the identity provider's JWKS.
    Jwks(Arc<KeySetCache>),

    /// HS256 against a shared secret.
    SharedSecret(SecretString),
}

/// Validates bearer tokens against a fixed issuer, audience and algorithm.
pub struct TokenValidator {
    verifier: Verifier,
    issuer: String,
    audience: String,
    clock_skew: Duration,
}

impl TokenValidator {
    /// Validator verifying RS256 signatures with keys from `key_cache`.
    pub fn with_jwks(
        key_cache: Arc<KeySetCache>,
        issuer: String,
        audience: String,
        clock_skew: Duration,
    ) -> Self {
        Self {
            verifier: Verifier::Jwks(key_cache),
            issuer,
            audience,
            clock_skew,
        }
    }

    /// Validator verifying HS256 signatures with a shared secret.
    pub fn with_shared_secret(
        secret: SecretString,
        issuer: String,
        audience: String,
        clock_skew: Duration,
    ) -> Self {
        Self {
            verifier: Verifier::SharedSecret(secret),
            issuer,
            audience,
            clock_skew,
        }
    }

    /// The only algorithm this validator accepts.
    pub fn algorithm(&self) -> Algorithm {
        match self.verifier {
            Verifier::Jwks(_) => Algorithm::RS256,
            Verifier::SharedSecret(_) => Algorithm::HS256,
        }
    }

    /// Validate a raw `Authorization` header value against the current time.
    pub async fn validate(&self, authorization: Option<&str>) -> AuthResult {
        self.validate_at(authorization, chrono::Utc::now().timestamp())
            .await
    }

    /// Validate a raw `Authorization` header value at Unix time `now`.
    ///
    /// Checks run in a fixed order and stop at the first failure:
    ///
    /// 1. Bearer scheme present
    /// 2. Size, three segments, JSON header with `alg` (and `kid` for JWKS)
    /// 3. `alg` equals the pinned algorithm
    /// 4. Verification key resolved
    /// 5. Signature
    /// 6. Claims decode
    /// 7. `iss`
    /// 8. `aud`
    /// 9. `exp` with clock skew
    #[instrument(skip_all, name = "gateway.auth.validate")]
    pub async fn validate_at(&self, authorization: Option<&str>, now: i64) -> AuthResult {
        let token = extract_bearer_token(authorization).map_err(|e| {
            tracing::debug!(target: "gateway.auth.jwt", error = ?e, "Bearer token extraction failed");
            RejectionReason::from(e)
        })?;

        let header = parse_header(token).map_err(|e| {
            tracing::debug!(target: "gateway.auth.jwt", error = ?e, "Token header parse failed");
            RejectionReason::from(e)
        })?;

        let kid = match &self.verifier {
            Verifier::Jwks(_) => Some(header.require_kid().map_err(|e| {
                tracing::debug!(target: "gateway.auth.jwt", "Token header has no kid");
                RejectionReason::from(e)
            })?),
            Verifier::SharedSecret(_) => None,
        };

        let expected_alg = self.algorithm();
        if header.alg != algorithm_name(expected_alg) {
            tracing::debug!(
                target: "gateway.auth.jwt",
                alg = %header.alg,
                expected = algorithm_name(expected_alg),
                "Token algorithm does not match pinned algorithm"
            );
            return Err(RejectionReason::InvalidSignature);
        }

        let decoding_key = self.resolve_key(kid).await?;

        let claims = verify_signature(token, &decoding_key, expected_alg)?;

        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            tracing::debug!(target: "gateway.auth.jwt", iss = ?claims.iss, "Token issuer mismatch");
            return Err(RejectionReason::WrongIssuer);
        }

        if !claims.has_audience(&self.audience) {
            tracing::debug!(target: "gateway.auth.jwt", aud = ?claims.aud, "Token audience mismatch");
            return Err(RejectionReason::WrongAudience);
        }

        validate_exp_at(claims.exp, self.clock_skew, now)?;

        tracing::debug!(target: "gateway.auth.jwt", "Token validated successfully");
        Ok(claims)
    }

    async fn resolve_key(&self, kid: Option<&str>) -> Result<DecodingKey, RejectionReason> {
        match (&self.verifier, kid) {
            (Verifier::Jwks(cache), Some(kid)) => {
                let key = cache.get_key(kid).await?;
                key.decoding_key().map_err(|e| {
                    tracing::warn!(target: "gateway.auth.jwt", kid = %kid, error = %e, "Invalid RSA key material");
                    RejectionReason::InvalidSignature
                })
            }
            (Verifier::Jwks(_), None) => Err(RejectionReason::MalformedToken),
            (Verifier::SharedSecret(secret), _) => {
                Ok(DecodingKey::from_secret(secret.expose_secret().as_bytes()))
            }
        }
    }
}

fn algorithm_name(alg: Algorithm) -> &'static str {
    match alg {
        Algorithm::HS256 => "HS256",
        _ => "RS256",
    }
}

/// Verify the signature and decode the payload. No claim checks happen here.
fn verify_signature(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
) -> Result<Claims, RejectionReason> {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    decode::<Claims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::InvalidKeyFormat
                | ErrorKind::InvalidRsaKey(_)
                | ErrorKind::Crypto(_) => RejectionReason::InvalidSignature,
                _ => RejectionReason::MalformedToken,
            };
            tracing::debug!(target: "gateway.auth.jwt", error = %e, reason = reason.as_str(), "Token verification failed");
            reason
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const ISSUER: &str = "https://auth.example.com";
    const AUDIENCE: &str = "weather-api";
    const NOW: i64 = 1_700_000_000;

    fn validator() -> TokenValidator {
        TokenValidator::with_shared_secret(
            SecretString::from(SECRET),
            ISSUER.to_string(),
            AUDIENCE.to_string(),
            Duration::from_secs(30),
        )
    }

    fn sign(claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn good_claims() -> serde_json::Value {
        json!({"iss": ISSUER, "aud": AUDIENCE, "exp": NOW + 600, "sub": "user-1", "scope": "user"})
    }

    async fn check(header: Option<&str>) -> AuthResult {
        validator().validate_at(header, NOW).await
    }

    #[tokio::test]
    async fn test_valid_token_is_admitted() {
        let token = sign(good_claims());
        let claims = check(Some(&format!("Bearer {token}"))).await.unwrap();

        assert_eq!(claims.sub, "user-1");
        assert!(claims.has_scope("user"));
    }

    #[tokio::test]
    async fn test_missing_and_malformed_headers() {
        assert_eq!(check(None).await.unwrap_err(), RejectionReason::MissingToken);
        assert_eq!(check(Some("")).await.unwrap_err(), RejectionReason::MissingToken);
        assert_eq!(
            check(Some("Basic dXNlcjpwYXNz")).await.unwrap_err(),
            RejectionReason::MalformedToken
        );
        assert_eq!(
            check(Some("bearer abc.def.ghi")).await.unwrap_err(),
            RejectionReason::MalformedToken
        );
        assert_eq!(
            check(Some("Bearer not-a-jwt")).await.unwrap_err(),
            RejectionReason::MalformedToken
        );
    }

    #[tokio::test]
    async fn test_oversized_token_is_malformed() {
        let token = "a".repeat(9000);
        assert_eq!(
            check(Some(&format!("Bearer {token}"))).await.unwrap_err(),
            RejectionReason::MalformedToken
        );
    }

    #[tokio::test]
    async fn test_algorithm_mismatch_is_invalid_signature() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(good_claims().to_string());
        let token = format!("{header}.{payload}.c2ln");

        assert_eq!(
            check(Some(&format!("Bearer {token}"))).await.unwrap_err(),
            RejectionReason::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_tampered_payload_is_invalid_signature() {
        let token = sign(good_claims());
        let (header, rest) = token.split_once('.').unwrap();
        let (_, signature) = rest.split_once('.').unwrap();
        let mut forged = good_claims();
        forged["sub"] = json!("admin");
        let tampered = format!(
            "{header}.{}.{signature}",
            URL_SAFE_NO_PAD.encode(forged.to_string())
        );

        assert_eq!(
            check(Some(&format!("Bearer {tampered}"))).await.unwrap_err(),
            RejectionReason::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_is_invalid_signature() {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &good_claims(),
            &EncodingKey::from_secret(b"another-secret-another-secret-xx"),
        )
        .unwrap();

        assert_eq!(
            check(Some(&format!("Bearer {token}"))).await.unwrap_err(),
            RejectionReason::InvalidSignature
        );
    }

    #[tokio::test]
    async fn test_issuer_checked_before_audience() {
        let mut claims = good_claims();
        claims["iss"] = json!("https://evil.example.com");
        claims["aud"] = json!("other-api");
        let token = sign(claims);

        assert_eq!(
            check(Some(&format!("Bearer {token}"))).await.unwrap_err(),
            RejectionReason::WrongIssuer
        );
    }

    #[tokio::test]
    async fn test_missing_issuer_is_wrong_issuer() {
        let mut claims = good_claims();
        claims.as_object_mut().unwrap().remove("iss");
        let token = sign(claims);

        assert_eq!(
            check(Some(&format!("Bearer {token}"))).await.unwrap_err(),
            RejectionReason::WrongIssuer
        );
    }

    #[tokio::test]
    async fn test_audience_list_must_contain_expected() {
        let mut claims = good_claims();
        claims["aud"] = json!(["billing", AUDIENCE]);
        assert!(check(Some(&format!("Bearer {}", sign(claims.clone())))).await.is_ok());

        claims["aud"] = json!(["billing", "admin"]);
        assert_eq!(
            check(Some(&format!("Bearer {}", sign(claims)))).await.unwrap_err(),
            RejectionReason::WrongAudience
        );
    }

    #[tokio::test]
    async fn test_expiry_respects_clock_skew() {
        let mut claims = good_claims();

        // Expired 30s ago: still inside the 30s skew
        claims["exp"] = json!(NOW - 30);
        assert!(check(Some(&format!("Bearer {}", sign(claims.clone())))).await.is_ok());

        claims["exp"] = json!(NOW - 31);
        assert_eq!(
            check(Some(&format!("Bearer {}", sign(claims)))).await.unwrap_err(),
            RejectionReason::ExpiredToken
        );
    }

    #[tokio::test]
    async fn test_missing_exp_is_malformed() {
        let mut claims = good_claims();
        claims.as_object_mut().unwrap().remove("exp");

        assert_eq!(
            check(Some(&format!("Bearer {}", sign(claims)))).await.unwrap_err(),
            RejectionReason::MalformedToken
        );
    }

    #[tokio::test]
    async fn test_extra_claims_are_preserved() {
        let mut claims = good_claims();
        claims["tenant"] = json!("acme");
        let admitted = check(Some(&format!("Bearer {}", sign(claims)))).await.unwrap();

        assert_eq!(admitted.extra.get("tenant"), Some(&json!("acme")));
    }

    #[test]
    fn test_rejection_reason_labels_are_unique() {
        let all = [
            RejectionReason::MissingToken,
            RejectionReason::MalformedToken,
            RejectionReason::UnknownSigningKey,
            RejectionReason::InvalidSignature,
            RejectionReason::ExpiredToken,
            RejectionReason::WrongIssuer,
            RejectionReason::WrongAudience,
            RejectionReason::KeyFetchFailure,
        ];
        let labels: HashSet<&str> = all.iter().map(RejectionReason::as_str).collect();
        assert_eq!(labels.len(), all.len());
    }

    #[test]
    fn test_pinned_algorithm() {
        assert_eq!(validator().algorithm(), Algorithm::HS256);
    }
}
