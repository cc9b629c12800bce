//! Common utilities and types shared across the MCP gateway components.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (bearer extraction, header parsing, claims, constants)
pub mod jwt;
