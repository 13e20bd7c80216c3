//! Per-call gRPC credentials
//!
//! Credentials attached to a broker connection and consulted before every
//! outbound call to produce its `authorization` metadata.
//!
//! ## Components
//!
//! - [`BasicAuthCredentials`]: static username/password
//! - [`RefreshedBearerCredentials`]: bearer token obtained from a
//!   [`TokenSource`] and refreshed in the background
//! - [`CredentialsLayer`]: tower middleware attaching credentials to requests
//! - [`DialConfig`], [`dial`], [`dial_lazy`]: connection setup
//!
//! ## Usage
//!
//! ```rust,no_run
//! use grpc_credentials::{dial, BasicAuthCredentials, DialConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), grpc_credentials::CredentialError> {
//! let config = DialConfig::from_env()?;
//! let credentials = Arc::new(BasicAuthCredentials::new("admin", "secret", config.insecure)?);
//! let channel = dial(&config, credentials, CancellationToken::new()).await?;
//!
//! // let mut client = RoutesServiceClient::new(channel);
//! # Ok(())
//! # }
//! ```

mod basic;
pub mod client;
mod config;
mod credentials;
pub mod error;
mod refresh;

pub use basic::BasicAuthCredentials;
pub use client::{BoxError, CredentialsLayer, CredentialsService};
pub use config::{dial, dial_lazy, AuthenticatedChannel, DialConfig};
pub use credentials::{PerRpcCredentials, AUTHORIZATION};
pub use error::CredentialError;
pub use refresh::{AccessToken, RefreshConfig, RefreshedBearerCredentials, TokenSource};
