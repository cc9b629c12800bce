//! Builder for test bearer tokens.

use crate::crypto_fixtures::TestKey;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};

/// Issuer used by default in test tokens and test gateway configs.
pub const TEST_ISSUER: &str = "https://idp.test/realms/tools";

/// Audience used by default in test tokens and test gateway configs.
pub const TEST_AUDIENCE: &str = "mcp-gateway";

/// Fluent builder for JWT claims and signed tokens.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_scope("weather:read")
///     .expires_in(300)
///     .sign_rs256(&KEY_ONE);
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
    kid: Option<String>,
}

impl TestTokenBuilder {
    /// Claims valid for the default test gateway: issuer, audience, one hour expiry.
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(TEST_ISSUER));
        claims.insert("aud".to_string(), json!(TEST_AUDIENCE));
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims, kid: None }
    }

    /// Set the subject.
    pub fn for_user(self, subject: &str) -> Self {
        self.claim("sub", json!(subject))
    }

    /// Set the issuer.
    pub fn issuer(self, issuer: &str) -> Self {
        self.claim("iss", json!(issuer))
    }

    /// Set a single-string audience.
    pub fn audience(self, audience: &str) -> Self {
        self.claim("aud", json!(audience))
    }

    /// Set a list audience.
    pub fn audiences(self, audiences: &[&str]) -> Self {
        self.claim("aud", json!(audiences))
    }

    /// Set the scope (space-separated).
    pub fn with_scope(self, scope: &str) -> Self {
        self.claim("scope", json!(scope))
    }

    /// Set expiration in seconds from now (negative for already expired).
    pub fn expires_in(self, seconds: i64) -> Self {
        self.claim("exp", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    /// Set an arbitrary claim.
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim.
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Override the `kid` header (defaults to the signing key's kid).
    pub fn kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// The claims as a JSON value.
    pub fn build(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Sign with RS256 using `key`.
    pub fn sign_rs256(&self, key: &TestKey) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone().unwrap_or_else(|| key.kid.to_string()));
        encode(&header, &self.claims, &key.encoding_key()).expect("RS256 signing should succeed")
    }

    /// Sign with RS256 using `key` without a `kid` header.
    pub fn sign_rs256_without_kid(&self, key: &TestKey) -> String {
        let header = Header::new(Algorithm::RS256);
        encode(&header, &self.claims, &key.encoding_key()).expect("RS256 signing should succeed")
    }

    /// Sign with HS256 using a shared secret.
    pub fn sign_hs256(&self, secret: &str) -> String {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = self.kid.clone();
        encode(
            &header,
            &self.claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("HS256 signing should succeed")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `Authorization` header value for `token`.
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
