//! Error types for key sourcing and the claims codec

use thiserror::Error;

/// Failure to obtain key material from a key provider.
///
/// `Clone` because the caching decorator replays a memoized failure to every
/// later caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid key source configuration: {0}")]
    Configuration(String),

    #[error("Failed to read key file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to fetch keys from {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Key endpoint {url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid key document: {0}")]
    Parse(String),
}

/// Failure to sign, parse or validate an identity token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Key retrieval failed: {0}")]
    KeyRetrieval(#[from] KeyError),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Failed to serialize token: {0}")]
    Serialization(String),

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Signature verification failed: {0}")]
    Verification(String),

    #[error("Invalid claims payload: {0}")]
    InvalidClaims(String),

    #[error("Token expired at {exp}")]
    Expired { exp: i64 },

    #[error("Token not valid before {nbf}")]
    NotYetValid { nbf: i64 },

    #[error("Token audience {found:?} does not match {expected}")]
    InvalidAudience {
        expected: String,
        found: Option<String>,
    },

    #[error("Token issuer {found} does not match {expected}")]
    InvalidIssuer { expected: String, found: String },
}

pub type Result<T, E = TokenError> = std::result::Result<T, E>;
