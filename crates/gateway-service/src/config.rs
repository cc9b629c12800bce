//! Gateway configuration.
//!
//! Configuration is loaded from environment variables. The HS256 shared
//! secret is held in a [`SecretString`] and redacted in Debug output.

use crate::routing::{RouteParseError, RouteTable, DEFAULT_ROUTES};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::{validate_hmac_secret, SecretString};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Lowest port the gateway will bind (0 requests an ephemeral port).
pub const MIN_BIND_PORT: u16 = 1024;

/// Default interval between background JWKS refreshes in seconds.
pub const DEFAULT_JWKS_REFRESH_INTERVAL_SECONDS: u64 = 300;

/// Default timeout for a single JWKS fetch in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 5;

/// Default timeout for upstream tool server requests in seconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 30;

/// Default shutdown drain period in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// Path appended to the issuer URL when `JWKS_URL` is not set.
pub const JWKS_WELL_KNOWN_PATH: &str = "/.well-known/jwks.json";

/// Signature algorithm pinned for all tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAlgorithm {
    /// RSA signatures verified with keys from the JWKS endpoint.
    Rs256,

    /// HMAC signatures verified with `SECRET_KEY`.
    Hs256,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Gateway configuration.
#[derive(Debug)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Expected `iss` claim.
    pub issuer: String,

    /// Expected `aud` member.
    pub audience: String,

    /// Pinned token algorithm.
    pub auth_algorithm: AuthAlgorithm,

    /// Shared secret, present iff `auth_algorithm` is HS256.
    pub secret_key: Option<SecretString>,

    /// JWKS endpoint of the identity provider.
    pub jwks_url: String,

    /// Tolerance applied to `exp`.
    pub jwt_clock_skew: Duration,

    /// Interval between background JWKS refreshes.
    pub jwks_refresh_interval: Duration,

    /// Upper bound on a single JWKS fetch.
    pub jwks_fetch_timeout: Duration,

    /// Path-prefix route table.
    pub routes: RouteTable,

    /// Timeout for requests forwarded to upstream tool servers.
    pub upstream_timeout: Duration,

    /// Public URL of this gateway, advertised in RFC 9728 metadata.
    pub resource_url: Option<String>,

    /// Origins accepted on tool requests.
    pub allowed_origins: Vec<String>,

    /// Whether requests without an `Origin` header are accepted.
    pub allow_no_origin: bool,

    /// Time to keep serving in-flight requests after a shutdown signal.
    pub drain_period: Duration,

    /// Log output format.
    pub log_format: LogFormat,

    /// Settings for the in-process weather tool.
    pub weather: weather_tool::config::Config,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid auth algorithm: {0}")]
    InvalidAuthAlgorithm(String),

    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid route table: {0}")]
    InvalidRoutes(#[from] RouteParseError),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("Invalid weather tool configuration: {0}")]
    Weather(#[from] weather_tool::config::ConfigError),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
        validate_bind_address(&bind_address)?;

        let issuer = required(vars, "ISSUER_URL")?;
        let audience = required(vars, "AUDIENCE")?;

        let auth_algorithm = match vars.get("AUTH_ALGORITHM").map(String::as_str) {
            None | Some("RS256") => AuthAlgorithm::Rs256,
            Some("HS256") => AuthAlgorithm::Hs256,
            Some(other) => {
                return Err(ConfigError::InvalidAuthAlgorithm(format!(
                    "AUTH_ALGORITHM must be RS256 or HS256, got '{}'",
                    other
                )))
            }
        };

        let secret_key = match auth_algorithm {
            AuthAlgorithm::Hs256 => {
                let secret = SecretString::from(required(vars, "SECRET_KEY")?);
                validate_hmac_secret(&secret)
                    .map_err(|e| ConfigError::InvalidSecretKey(e.to_string()))?;
                Some(secret)
            }
            AuthAlgorithm::Rs256 => None,
        };

        let jwks_url = match vars.get("JWKS_URL") {
            Some(url) => url.clone(),
            None => format!("{}{}", issuer.trim_end_matches('/'), JWKS_WELL_KNOWN_PATH),
        };
        if auth_algorithm == AuthAlgorithm::Rs256 {
            validate_http_url("JWKS_URL", &jwks_url)?;
        }

        // Zero skew is allowed; the upper bound keeps expired tokens from
        // being honoured for long.
        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let jwks_refresh_interval = positive_seconds(
            vars,
            "JWKS_REFRESH_INTERVAL_SECONDS",
            DEFAULT_JWKS_REFRESH_INTERVAL_SECONDS,
        )?;
        let jwks_fetch_timeout = positive_seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
        )?;
        let upstream_timeout = positive_seconds(
            vars,
            "UPSTREAM_TIMEOUT_SECONDS",
            DEFAULT_UPSTREAM_TIMEOUT_SECONDS,
        )?;

        let routes = RouteTable::parse(
            vars.get("ROUTES")
                .map(String::as_str)
                .unwrap_or(DEFAULT_ROUTES),
        )?;

        let resource_url = match vars.get("RESOURCE_URL") {
            Some(url) => {
                validate_http_url("RESOURCE_URL", url)?;
                Some(url.trim_end_matches('/').to_string())
            }
            None => None,
        };

        let allowed_origins = vars
            .get("ALLOWED_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let allow_no_origin = vars
            .get("ALLOW_NO_ORIGIN")
            .map(|v| parse_bool(v))
            .unwrap_or(true);

        // Drain may be zero for tests and local runs
        let drain_period = if let Some(value_str) = vars.get("GATEWAY_DRAIN_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidDuration(format!(
                    "GATEWAY_DRAIN_SECONDS must be a valid non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?;
            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_DRAIN_SECONDS)
        };

        let log_format = match vars.get("LOG_FORMAT").map(String::as_str) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidLogFormat(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{}'",
                    other
                )))
            }
        };

        let weather = weather_tool::config::Config::from_vars(vars)?;

        Ok(Config {
            bind_address,
            issuer,
            audience,
            auth_algorithm,
            secret_key,
            jwks_url,
            jwt_clock_skew,
            jwks_refresh_interval,
            jwks_fetch_timeout,
            routes,
            upstream_timeout,
            resource_url,
            allowed_origins,
            allow_no_origin,
            drain_period,
            log_format,
            weather,
        })
    }

    /// URL of the RFC 9728 metadata document, when a resource URL is set.
    pub fn resource_metadata_url(&self) -> Option<String> {
        self.resource_url
            .as_ref()
            .map(|url| format!("{}/.well-known/oauth-protected-resource", url))
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    match vars.get(name) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

fn positive_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(Duration::from_secs(default));
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(Duration::from_secs(value))
}

fn validate_bind_address(bind_address: &str) -> Result<(), ConfigError> {
    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        ConfigError::InvalidBindAddress(format!(
            "BIND_ADDRESS must be host:port, got '{}': {}",
            bind_address, e
        ))
    })?;

    if addr.port() != 0 && addr.port() < MIN_BIND_PORT {
        return Err(ConfigError::InvalidBindAddress(format!(
            "BIND_ADDRESS port must be at least {}, got {}",
            MIN_BIND_PORT,
            addr.port()
        )));
    }

    Ok(())
}

fn validate_http_url(name: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl(format!(
            "{} must be an http(s) URL, got '{}'",
            name, url
        )))
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y"
    )
}
