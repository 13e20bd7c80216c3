//! Credential errors and their gRPC status mapping

use thiserror::Error;
use tonic::Status;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Invalid credential configuration: {0}")]
    Configuration(String),

    #[error("Credential exchange failed: {0}")]
    Fetch(String),

    #[error("Cancelled while waiting for credentials")]
    Cancelled,

    #[error("Invalid authorization metadata: {0}")]
    InvalidMetadata(String),

    #[error("Failed to connect: {0}")]
    Transport(String),
}

impl From<CredentialError> for Status {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Fetch(_) => Status::unauthenticated(err.to_string()),
            CredentialError::Cancelled => Status::cancelled(err.to_string()),
            CredentialError::InvalidMetadata(_) => Status::internal(err.to_string()),
            CredentialError::Configuration(_) => Status::failed_precondition(err.to_string()),
            CredentialError::Transport(_) => Status::unavailable(err.to_string()),
        }
    }
}
