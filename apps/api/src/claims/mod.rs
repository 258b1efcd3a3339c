//! Access token validation.
//!
//! Tokens are HS256 JWTs minted by an external issuer. This module only
//! validates them; it never signs.

pub mod resolver;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Why a token was refused. Every variant is terminal for the request.
///
/// `Display` is the recipient-facing message; `kind()` is the stable code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimsError {
    #[error("No access token provided. Please use a valid newsletter link.")]
    TokenMissing,

    /// The detail is for logs only and never shown to the recipient.
    #[error("Invalid token format. Please check your newsletter link.")]
    TokenMalformed(String),

    #[error("This newsletter link has expired. Please request a new one.")]
    TokenExpired { expired_at: DateTime<Utc> },

    #[error("Invalid or corrupted token. Please check your newsletter link.")]
    TokenUnverified,
}

impl ClaimsError {
    pub fn kind(&self) -> &'static str {
        match self {
            ClaimsError::TokenMissing => "token_missing",
            ClaimsError::TokenMalformed(_) => "token_malformed",
            ClaimsError::TokenExpired { .. } => "token_expired",
            ClaimsError::TokenUnverified => "token_unverified",
        }
    }
}
