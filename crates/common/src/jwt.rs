//! JWT utilities shared by the gateway and the tool servers.
//!
//! This module provides the pre-verification parsing steps of the
//! admission pipeline and the validated claims type:
//! - Bearer token extraction from the `Authorization` header
//! - Size limits for DoS prevention
//! - Header parsing (`alg`, `kid`) without signature verification
//! - Expiry validation with clock skew tolerance
//! - The [`Claims`] record handed to tool handlers
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing in this module verifies signatures; header values are only used
//!   to select the verification key and to pin the algorithm
//! - The `sub` field in [`Claims`] is redacted in Debug output

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical access tokens are well under 2KB. Oversized tokens are rejected
/// before base64 decoding or any cryptographic work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Case-sensitive scheme prefix of the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Default clock skew tolerance applied to the `exp` claim.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(30);

/// Maximum configurable clock skew tolerance (10 minutes).
///
/// Prevents misconfiguration that would keep expired tokens usable for long
/// periods.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors from the parsing steps that run before signature verification.
///
/// Display messages are intentionally generic; callers log the variant.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtValidationError {
    /// No `Authorization` header, or an empty one.
    #[error("The access token is missing")]
    MissingToken,

    /// `Authorization` header does not use the `Bearer` scheme or carries no token.
    #[error("The access token is invalid or expired")]
    MalformedAuthorizationHeader,

    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not three base64url segments with a JSON header.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Header has no usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// `exp` is in the past beyond the clock skew tolerance.
    #[error("The access token is invalid or expired")]
    Expired,
}

// =============================================================================
// Header
// =============================================================================

/// The parts of a JWT header needed before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared signing algorithm, exactly as written in the token.
    pub alg: String,

    /// Key ID, if present. Empty strings are treated as absent.
    pub kid: Option<String>,
}

impl TokenHeader {
    /// Return the key ID or fail with [`JwtValidationError::MissingKid`].
    ///
    /// # Errors
    ///
    /// Returns `MissingKid` when the header carried no non-empty `kid`.
    pub fn require_kid(&self) -> Result<&str, JwtValidationError> {
        self.kid.as_deref().ok_or(JwtValidationError::MissingKid)
    }
}

// =============================================================================
// Claims
// =============================================================================

/// The `aud` claim, which RFC 7519 allows as a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "weather-api"`
    Single(String),
    /// `"aud": ["weather-api", "other-api"]`
    Multiple(Vec<String>),
}

impl Audience {
    /// True if `expected` is the audience or a member of the audience list.
    #[must_use]
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == expected,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Validated access token claims.
///
/// Registered claims are typed; everything else the identity provider puts in
/// the payload is kept in [`Claims::extra`].
///
/// # Security
///
/// The `sub` field is redacted in Debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience (string or list).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration timestamp (Unix epoch seconds, fractional part dropped).
    #[serde(deserialize_with = "deserialize_numeric_date")]
    pub exp: i64,

    /// Subject - redacted in Debug output.
    #[serde(default)]
    pub sub: String,

    /// Issued-at timestamp (Unix epoch seconds, fractional part dropped).
    #[serde(
        default,
        deserialize_with = "deserialize_optional_numeric_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,

    /// Space-separated scopes granted to this token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// All other claims, untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// RFC 7519 NumericDate: seconds since the epoch, integer or fractional.
///
/// Fractions are floored, so a token with `exp: 10.9` is expired at 11.
fn deserialize_numeric_date<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    numeric_date_from(f64::deserialize(deserializer)?)
}

fn deserialize_optional_numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)?
        .map(numeric_date_from)
        .transpose()
}

fn numeric_date_from<E: de::Error>(value: f64) -> Result<i64, E> {
    if !value.is_finite() {
        return Err(E::custom("NumericDate must be a finite number"));
    }
    // Saturates outside the i64 range
    #[allow(clippy::cast_possible_truncation)]
    Ok(value.floor() as i64)
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("sub", &"[REDACTED]")
            .field("iat", &self.iat)
            .field("scope", &self.scope)
            .field("extra_claims", &self.extra.len())
            .finish()
    }
}

impl Claims {
    /// True if the `aud` claim contains `expected`. A missing `aud` never matches.
    #[must_use]
    pub fn has_audience(&self, expected: &str) -> bool {
        self.aud.as_ref().is_some_and(|aud| aud.contains(expected))
    }

    /// Check if the token has a specific scope.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(&scope)
    }

    /// Get all scopes as a vector.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Extract the bearer token from a raw `Authorization` header value.
///
/// The scheme prefix is matched case-sensitively (`Bearer `).
///
/// # Errors
///
/// - `MissingToken` - header absent or empty
/// - `MalformedAuthorizationHeader` - other scheme, or no token after the prefix
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str, JwtValidationError> {
    let header = match header {
        Some(h) if !h.trim().is_empty() => h,
        _ => return Err(JwtValidationError::MissingToken),
    };

    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or(JwtValidationError::MalformedAuthorizationHeader)?
        .trim();

    if token.is_empty() {
        return Err(JwtValidationError::MalformedAuthorizationHeader);
    }

    Ok(token)
}

/// Parse the JWT header without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - The returned `alg` must be compared against a pinned algorithm; it must
///   never be used to choose how to verify
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - not three non-empty segments, bad base64url, header not
///   a JSON object, or `alg` missing / not a string
pub fn parse_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtValidationError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg = header
        .get("alg")
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MalformedToken)?;

    let kid = header
        .get("kid")
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    Ok(TokenHeader { alg, kid })
}

/// Validate the `exp` claim against an explicit `now` timestamp.
///
/// A token is usable up to and including `exp + clock_skew`.
///
/// # Errors
///
/// Returns `Expired` if `now > exp + clock_skew`.
pub fn validate_exp_at(exp: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW by configuration
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let deadline = exp.saturating_add(clock_skew_secs);

    if now > deadline {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        format!("{}.payload.signature", URL_SAFE_NO_PAD.encode(header))
    }

    // -------------------------------------------------------------------------
    // extract_bearer_token
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_bearer_token_valid() {
        assert_eq!(extract_bearer_token(Some("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
    }

    #[test]
    fn test_extract_bearer_token_missing_header() {
        assert_eq!(extract_bearer_token(None), Err(JwtValidationError::MissingToken));
        assert_eq!(extract_bearer_token(Some("")), Err(JwtValidationError::MissingToken));
        assert_eq!(extract_bearer_token(Some("   ")), Err(JwtValidationError::MissingToken));
    }

    #[test]
    fn test_extract_bearer_token_scheme_is_case_sensitive() {
        assert_eq!(
            extract_bearer_token(Some("bearer abc.def.ghi")),
            Err(JwtValidationError::MalformedAuthorizationHeader)
        );
        assert_eq!(
            extract_bearer_token(Some("BEARER abc.def.ghi")),
            Err(JwtValidationError::MalformedAuthorizationHeader)
        );
    }

    #[test]
    fn test_extract_bearer_token_other_scheme() {
        assert_eq!(
            extract_bearer_token(Some("Basic dXNlcjpwYXNz")),
            Err(JwtValidationError::MalformedAuthorizationHeader)
        );
    }

    #[test]
    fn test_extract_bearer_token_empty_token() {
        assert_eq!(
            extract_bearer_token(Some("Bearer ")),
            Err(JwtValidationError::MalformedAuthorizationHeader)
        );
        assert_eq!(
            extract_bearer_token(Some("Bearer    ")),
            Err(JwtValidationError::MalformedAuthorizationHeader)
        );
    }

    // -------------------------------------------------------------------------
    // parse_header
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_header_valid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"key-01"}"#);
        let header = parse_header(&token).unwrap();
        assert_eq!(header.alg, "RS256");
        assert_eq!(header.kid.as_deref(), Some("key-01"));
        assert_eq!(header.require_kid(), Ok("key-01"));
    }

    #[test]
    fn test_parse_header_without_kid() {
        let token = token_with_header(r#"{"alg":"HS256","typ":"JWT"}"#);
        let header = parse_header(&token).unwrap();
        assert_eq!(header.alg, "HS256");
        assert!(header.kid.is_none());
        assert_eq!(header.require_kid(), Err(JwtValidationError::MissingKid));
    }

    #[test]
    fn test_parse_header_empty_or_non_string_kid_is_absent() {
        let token = token_with_header(r#"{"alg":"RS256","kid":""}"#);
        assert!(parse_header(&token).unwrap().kid.is_none());

        let token = token_with_header(r#"{"alg":"RS256","kid":12345}"#);
        assert!(parse_header(&token).unwrap().kid.is_none());
    }

    #[test]
    fn test_parse_header_missing_alg() {
        let token = token_with_header(r#"{"typ":"JWT","kid":"key-01"}"#);
        assert_eq!(parse_header(&token), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_parse_header_wrong_segment_count() {
        for token in ["", "single", "only.two", "one.two.three.four", "a..c", ".b.c"] {
            assert_eq!(
                parse_header(token),
                Err(JwtValidationError::MalformedToken),
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_parse_header_invalid_base64() {
        assert_eq!(
            parse_header("!!!invalid!!!.payload.signature"),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_parse_header_invalid_json() {
        let token = token_with_header("not-json");
        assert_eq!(parse_header(&token), Err(JwtValidationError::MalformedToken));
    }

    #[test]
    fn test_parse_header_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(parse_header(&oversized), Err(JwtValidationError::TokenTooLarge));
    }

    #[test]
    fn test_parse_header_at_size_limit() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","kid":"key"}"#);
        let remaining = MAX_JWT_SIZE_BYTES - header_b64.len() - 2;
        let payload_len = remaining / 2;
        let token = format!(
            "{}.{}.{}",
            header_b64,
            "a".repeat(payload_len),
            "b".repeat(remaining - payload_len)
        );
        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);
        assert!(parse_header(&token).is_ok());
    }

    // -------------------------------------------------------------------------
    // validate_exp_at
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_exp_at_skew_boundary() {
        let now = 1_700_000_000_i64;

        // exp + skew == now is the last accepted instant
        assert!(validate_exp_at(now - 30, DEFAULT_CLOCK_SKEW, now).is_ok());

        // one second later is rejected
        assert_eq!(
            validate_exp_at(now - 31, DEFAULT_CLOCK_SKEW, now),
            Err(JwtValidationError::Expired)
        );
    }

    #[test]
    fn test_validate_exp_zero_skew() {
        let now = 1_700_000_000_i64;
        assert!(validate_exp_at(now, Duration::ZERO, now).is_ok());
        assert!(validate_exp_at(now - 1, Duration::ZERO, now).is_err());
    }

    // -------------------------------------------------------------------------
    // Claims
    // -------------------------------------------------------------------------

    #[test]
    fn test_claims_audience_single_and_list() {
        let single: Claims = serde_json::from_value(serde_json::json!({
            "iss": "https://issuer.example.com",
            "aud": "weather-api",
            "exp": 1_900_000_000_i64,
            "sub": "client-1"
        }))
        .unwrap();
        assert!(single.has_audience("weather-api"));
        assert!(!single.has_audience("other-api"));

        let multiple: Claims = serde_json::from_value(serde_json::json!({
            "aud": ["other-api", "weather-api"],
            "exp": 1_900_000_000_i64
        }))
        .unwrap();
        assert!(multiple.has_audience("weather-api"));
        assert!(!multiple.has_audience("weather"));
    }

    #[test]
    fn test_claims_missing_audience_never_matches() {
        let claims: Claims =
            serde_json::from_value(serde_json::json!({ "exp": 1_900_000_000_i64 })).unwrap();
        assert!(!claims.has_audience("weather-api"));
        assert!(claims.iss.is_none());
        assert_eq!(claims.sub, "");
    }

    #[test]
    fn test_claims_missing_exp_fails_to_decode() {
        let result: Result<Claims, _> =
            serde_json::from_value(serde_json::json!({ "aud": "weather-api" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_claims_fractional_numeric_dates_are_floored() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "exp": 4_000_000_000.5,
            "iat": 1_700_000_000.999
        }))
        .unwrap();
        assert_eq!(claims.exp, 4_000_000_000);
        assert_eq!(claims.iat, Some(1_700_000_000));

        // Integer dates still decode exactly
        let claims: Claims =
            serde_json::from_value(serde_json::json!({ "exp": 1_900_000_001_i64 })).unwrap();
        assert_eq!(claims.exp, 1_900_000_001);
        assert_eq!(claims.iat, None);
    }

    #[test]
    fn test_claims_non_numeric_exp_fails_to_decode() {
        let result: Result<Claims, _> =
            serde_json::from_value(serde_json::json!({ "exp": "tomorrow" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_claims_keeps_unknown_claims() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "exp": 1_900_000_000_i64,
            "azp": "cli-client",
            "tenant": { "id": "t-1" }
        }))
        .unwrap();
        assert_eq!(claims.extra.get("azp"), Some(&serde_json::json!("cli-client")));
        assert_eq!(claims.extra.get("tenant"), Some(&serde_json::json!({ "id": "t-1" })));
        assert!(!claims.extra.contains_key("exp"));
    }

    #[test]
    fn test_claims_debug_redacts_sub() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "exp": 1_900_000_000_i64,
            "sub": "secret-user-id"
        }))
        .unwrap();

        let debug_str = format!("{claims:?}");
        assert!(!debug_str.contains("secret-user-id"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_claims_scopes() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "exp": 1_900_000_000_i64,
            "scope": "user weather:read"
        }))
        .unwrap();
        assert_eq!(claims.scopes(), vec!["user", "weather:read"]);
        assert!(claims.has_scope("user"));
        assert!(!claims.has_scope("use"));
    }
}
