//! Request admission: bearer token validation against the identity provider.
//!
//! # Components
//!
//! - `jwks` - Key set cache for the identity provider's public keys
//! - `jwt` - Token validator producing [`AuthResult`]

pub mod jwks;
pub mod jwt;

pub use common::jwt::Claims;
pub use jwks::{KeyFetchError, KeyLookupError, KeySet, KeySetCache, SigningKey};
pub use jwt::{AuthResult, RejectionReason, TokenValidator};
