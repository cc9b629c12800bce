//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] types and adds validation for the HS256 shared
//! secret used by the symmetric verification fallback.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` and holds one (e.g. the gateway `Config`) is safe to log.
//!
//! ```rust
//! use common::secret::{validate_hmac_secret, SecretString};
//!
//! let secret = SecretString::from("0123456789abcdef0123456789abcdef");
//! assert!(validate_hmac_secret(&secret).is_ok());
//! assert!(!format!("{secret:?}").contains("0123"));
//! ```

use thiserror::Error;

pub use secrecy::{ExposeSecret, SecretString};

/// Minimum HS256 key length in bytes.
///
/// RFC 7518 §3.2 requires a key at least as long as the hash output
/// (256 bits for HS256).
pub const MIN_HMAC_SECRET_BYTES: usize = 32;

/// Errors produced when validating secret material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// Shared secret is shorter than [`MIN_HMAC_SECRET_BYTES`].
    #[error("shared secret must be at least {min} bytes, got {actual}")]
    TooShort {
        /// Required minimum length.
        min: usize,
        /// Actual length.
        actual: usize,
    },
}

/// Check that a shared secret is long enough to be used as an HS256 key.
///
/// # Errors
///
/// Returns [`SecretError::TooShort`] if the secret has fewer than
/// [`MIN_HMAC_SECRET_BYTES`] bytes.
pub fn validate_hmac_secret(secret: &SecretString) -> Result<(), SecretError> {
    let actual = secret.expose_secret().len();
    if actual < MIN_HMAC_SECRET_BYTES {
        return Err(SecretError::TooShort {
            min: MIN_HMAC_SECRET_BYTES,
            actual,
        });
    }
    Ok(())
}
