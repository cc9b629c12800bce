//! Key set cache for the identity provider's JWKS.
//!
//! Fetches RSA signing keys from the configured JWKS URL and keeps the most
//! recent successfully fetched set in memory.
//!
//! # Refresh protocol
//!
//! - Readers take a shared lock on the current set; a hit never blocks on I/O.
//! - A miss (unknown `kid`) triggers one refresh, then one retry of the lookup.
//! - Refreshes are serialized by an async mutex. Each completed refresh bumps a
//!   generation counter; a caller that observed generation `g` before its miss
//!   and finds a newer generation once it holds the mutex reuses that
//!   refresh's outcome instead of fetching again. Concurrent misses therefore
//!   cost one fetch.
//! - A failed refresh leaves the previous set in place.
//!
//! # Security
//!
//! - Only `kty = RSA` keys usable for RS256 signatures are kept
//! - Every fetch is bounded by a timeout
//! - HTTPS should be used in production (enforced by deployment config)

use crate::observability::metrics::record_jwks_fetch;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// A public signing key from the JWKS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKey {
    /// Key ID.
    pub kid: String,

    /// Algorithm this key verifies (always RS256).
    pub algorithm: Algorithm,

    /// RSA modulus, base64url encoded.
    pub modulus: String,

    /// RSA public exponent, base64url encoded.
    pub exponent: String,
}

impl SigningKey {
    /// Build the verification key.
    ///
    /// # Errors
    ///
    /// Returns the `jsonwebtoken` error if the components are not valid base64url.
    pub fn decoding_key(&self) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
        DecodingKey::from_rsa_components(&self.modulus, &self.exponent)
    }
}

/// A JSON Web Key as published by the identity provider.
///
/// Every field is optional so one odd entry does not poison the whole set.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kty: Option<String>,

    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus.
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent.
    #[serde(default)]
    pub e: Option<String>,
}

impl Jwk {
    /// Convert to a [`SigningKey`] if this is an RSA signing key usable with RS256.
    pub fn to_signing_key(&self) -> Option<SigningKey> {
        if self.kty.as_deref() != Some("RSA") {
            return None;
        }
        if self.key_use.as_deref().is_some_and(|u| u != "sig") {
            return None;
        }
        if self.alg.as_deref().is_some_and(|a| a != "RS256") {
            return None;
        }

        let kid = self.kid.as_deref().filter(|k| !k.is_empty())?;
        let modulus = self.n.as_deref().filter(|n| !n.is_empty())?;
        let exponent = self.e.as_deref().filter(|e| !e.is_empty())?;

        let key = SigningKey {
            kid: kid.to_string(),
            algorithm: Algorithm::RS256,
            modulus: modulus.to_string(),
            exponent: exponent.to_string(),
        };

        // Reject material that cannot be turned into a verification key
        key.decoding_key().ok()?;
        Some(key)
    }
}

/// JWKS document. Entries are kept raw and converted one at a time.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<serde_json::Value>,
}

/// An immutable set of signing keys from one successful fetch.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: HashMap<String, SigningKey>,
    fetched_at: DateTime<Utc>,
}

impl KeySet {
    /// Build a key set from JWKS entries, skipping unusable ones.
    pub fn from_jwks(entries: Vec<serde_json::Value>) -> Self {
        let mut keys = HashMap::new();

        for entry in entries {
            let jwk: Jwk = match serde_json::from_value(entry) {
                Ok(jwk) => jwk,
                Err(e) => {
                    tracing::debug!(target: "gateway.auth.jwks", error = %e, "Skipping unparseable JWK");
                    continue;
                }
            };

            match jwk.to_signing_key() {
                // First entry wins on duplicate kids
                Some(key) => {
                    keys.entry(key.kid.clone()).or_insert(key);
                }
                None => {
                    tracing::debug!(
                        target: "gateway.auth.jwks",
                        kid = ?jwk.kid,
                        kty = ?jwk.kty,
                        alg = ?jwk.alg,
                        "Skipping JWK not usable for RS256 signatures"
                    );
                }
            }
        }

        Self {
            keys,
            fetched_at: Utc::now(),
        }
    }

    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs in the set, sorted.
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }

    /// When this set was fetched.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Why a JWKS fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyFetchError {
    #[error("JWKS request failed: {0}")]
    Network(String),

    #[error("JWKS request timed out")]
    Timeout,

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    #[error("JWKS response could not be parsed: {0}")]
    Parse(String),

    #[error("JWKS contained no usable signing keys")]
    EmptyKeySet,
}

impl KeyFetchError {
    /// Bounded label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFetchError::Network(_) => "network",
            KeyFetchError::Timeout => "timeout",
            KeyFetchError::Status(_) => "status",
            KeyFetchError::Parse(_) => "parse",
            KeyFetchError::EmptyKeySet => "empty",
        }
    }
}

/// Result of [`KeySetCache::get_key`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyLookupError {
    /// The key ID is not in the set, even after a refresh.
    #[error("signing key not found")]
    NotFound,

    /// The key ID was unknown and the refresh failed.
    #[error("signing keys unavailable: {0}")]
    FetchFailed(KeyFetchError),
}

struct RefreshState {
    generation: u64,
    last_outcome: Result<(), KeyFetchError>,
}

/// Process-wide cache of the identity provider's signing keys.
pub struct KeySetCache {
    /// URL of the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Upper bound on a single fetch.
    fetch_timeout: Duration,

    /// Current key set, swapped wholesale on refresh.
    keys: RwLock<Option<Arc<KeySet>>>,

    /// Serializes refreshes; holds the outcome of the latest one.
    refresh: Mutex<RefreshState>,

    /// Mirror of `RefreshState::generation` readable without the mutex.
    generation: AtomicU64,
}

impl KeySetCache {
    /// Create an empty cache for the given JWKS URL.
    pub fn new(jwks_url: String, fetch_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gateway.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            fetch_timeout,
            keys: RwLock::new(None),
            refresh: Mutex::new(RefreshState {
                generation: 0,
                last_outcome: Ok(()),
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// URL this cache fetches from.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Look up a signing key by ID, refreshing once on a miss.
    ///
    /// # Errors
    ///
    /// - `NotFound` - the key is absent from a freshly fetched set
    /// - `FetchFailed` - the key was unknown and the refresh failed
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<SigningKey, KeyLookupError> {
        // Observe the generation before reading so a refresh that lands in
        // between is detected and reused.
        let observed = self.generation.load(Ordering::Acquire);

        if let Some(key) = self.lookup(kid).await {
            tracing::debug!(target: "gateway.auth.jwks", kid = %kid, "JWKS cache hit");
            return Ok(key);
        }

        tracing::debug!(target: "gateway.auth.jwks", kid = %kid, "JWKS cache miss, refreshing");
        self.refresh_if_unchanged(observed)
            .await
            .map_err(KeyLookupError::FetchFailed)?;

        match self.lookup(kid).await {
            Some(key) => Ok(key),
            None => {
                tracing::warn!(target: "gateway.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
                Err(KeyLookupError::NotFound)
            }
        }
    }

    /// Fetch the JWKS now and replace the cached set on success.
    ///
    /// Used by startup priming and the scheduled refresher. Serialized with
    /// miss-triggered refreshes.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure; the previous set is kept.
    pub async fn refresh(&self) -> Result<(), KeyFetchError> {
        let mut state = self.refresh.lock().await;
        self.run_refresh(&mut state).await
    }

    /// Current key set, if one has ever been fetched.
    pub async fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.keys.read().await.clone()
    }

    async fn lookup(&self, kid: &str) -> Option<SigningKey> {
        let keys = self.keys.read().await;
        keys.as_ref().and_then(|set| set.get(kid).cloned())
    }

    async fn refresh_if_unchanged(&self, observed: u64) -> Result<(), KeyFetchError> {
        let mut state = self.refresh.lock().await;

        if state.generation != observed {
            tracing::debug!(
                target: "gateway.auth.jwks",
                observed = observed,
                current = state.generation,
                "Reusing concurrent JWKS refresh"
            );
            return state.last_outcome.clone();
        }

        self.run_refresh(&mut state).await
    }

    /// Caller must hold the refresh mutex.
    async fn run_refresh(&self, state: &mut RefreshState) -> Result<(), KeyFetchError> {
        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.fetch_timeout, self.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(KeyFetchError::Timeout),
        };
        let duration = start.elapsed();

        let outcome = match outcome {
            Ok(key_set) => {
                tracing::info!(
                    target: "gateway.auth.jwks",
                    key_count = key_set.len(),
                    "JWKS cache refreshed"
                );
                record_jwks_fetch("success", duration);
                *self.keys.write().await = Some(Arc::new(key_set));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    target: "gateway.auth.jwks",
                    error = %e,
                    "JWKS refresh failed, keeping previous key set"
                );
                record_jwks_fetch(e.as_str(), duration);
                Err(e)
            }
        };

        state.generation = state.generation.wrapping_add(1);
        state.last_outcome = outcome.clone();
        self.generation.store(state.generation, Ordering::Release);

        outcome
    }

    async fn fetch(&self) -> Result<KeySet, KeyFetchError> {
        tracing::debug!(target: "gateway.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    KeyFetchError::Timeout
                } else {
                    KeyFetchError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(KeyFetchError::Status(response.status().as_u16()));
        }

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|e| KeyFetchError::Parse(e.to_string()))?;

        let key_set = KeySet::from_jwks(document.keys);
        if key_set.is_empty() {
            return Err(KeyFetchError::EmptyKeySet);
        }

        Ok(key_set)
    }
}
