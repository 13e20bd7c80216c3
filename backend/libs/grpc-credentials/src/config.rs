//! Broker connection configuration
//!
//! Builds the transport endpoint for the broker's RPC services and dials it
//! with per-call credentials attached.

use std::env;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tower::Layer;
use tracing::info;

use crate::client::{CredentialsLayer, CredentialsService};
use crate::credentials::PerRpcCredentials;
use crate::error::CredentialError;

/// Channel that attaches credentials to every call
pub type AuthenticatedChannel = CredentialsService<Channel>;

#[derive(Debug, Clone)]
pub struct DialConfig {
    /// Broker address, `host:port` or a full URI
    pub address: String,

    /// Plaintext connection (local development only)
    pub insecure: bool,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// HTTP/2 keep-alive interval in seconds
    pub keepalive_interval_secs: u64,

    /// HTTP/2 keep-alive timeout in seconds
    pub keepalive_timeout_secs: u64,

    /// Optional domain name for TLS SNI/verification
    pub tls_domain_name: Option<String>,

    /// Path to CA certificate (PEM); native roots are used when unset
    pub tls_ca_cert_path: Option<String>,
}

impl DialConfig {
    /// Load configuration from environment variables
    ///
    /// **Environment Variables**:
    /// - `BROKER_ADDRESS`: broker address (required)
    /// - `BROKER_INSECURE`: `true`/`1` for a plaintext connection (default: false)
    /// - `BROKER_CONNECT_TIMEOUT_SECS` (default: 10)
    /// - `BROKER_REQUEST_TIMEOUT_SECS` (default: 30)
    /// - `BROKER_KEEPALIVE_INTERVAL_SECS` (default: 30)
    /// - `BROKER_KEEPALIVE_TIMEOUT_SECS` (default: 10)
    /// - `BROKER_TLS_DOMAIN_NAME`: optional SNI override
    /// - `BROKER_TLS_CA_CERT_PATH`: optional CA certificate
    pub fn from_env() -> Result<Self, CredentialError> {
        let address = env::var("BROKER_ADDRESS")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CredentialError::Configuration("BROKER_ADDRESS not set".to_string()))?;

        let config = Self {
            address,
            insecure: env::var("BROKER_INSECURE")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE"))
                .unwrap_or(false),
            connect_timeout_secs: env_secs("BROKER_CONNECT_TIMEOUT_SECS", 10),
            request_timeout_secs: env_secs("BROKER_REQUEST_TIMEOUT_SECS", 30),
            keepalive_interval_secs: env_secs("BROKER_KEEPALIVE_INTERVAL_SECS", 30),
            keepalive_timeout_secs: env_secs("BROKER_KEEPALIVE_TIMEOUT_SECS", 10),
            tls_domain_name: env::var("BROKER_TLS_DOMAIN_NAME").ok(),
            tls_ca_cert_path: env::var("BROKER_TLS_CA_CERT_PATH").ok(),
        };

        info!(
            address = %config.address,
            insecure = config.insecure,
            "Broker connection configuration loaded"
        );

        Ok(config)
    }

    /// Plaintext configuration for a local broker
    pub fn development(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            insecure: true,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            keepalive_interval_secs: 30,
            keepalive_timeout_secs: 10,
            tls_domain_name: None,
            tls_ca_cert_path: None,
        }
    }

    /// Address with a scheme matching the security mode
    pub fn uri(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else if self.insecure {
            format!("http://{}", self.address)
        } else {
            format!("https://{}", self.address)
        }
    }

    /// Build a tonic Endpoint with timeouts/keepalive and TLS unless insecure
    pub fn make_endpoint(&self) -> Result<Endpoint, CredentialError> {
        let uri = self.uri();
        let mut ep = Endpoint::from_shared(uri.clone())
            .map_err(|e| CredentialError::Configuration(format!("invalid address {uri:?}: {e}")))?
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .http2_keep_alive_interval(Duration::from_secs(self.keepalive_interval_secs))
            .keep_alive_timeout(Duration::from_secs(self.keepalive_timeout_secs))
            .tcp_nodelay(true);

        if !self.insecure {
            let mut tls = ClientTlsConfig::new();

            if let Some(ca_path) = &self.tls_ca_cert_path {
                let ca_pem = fs::read(ca_path).map_err(|e| {
                    CredentialError::Configuration(format!("read CA certificate {ca_path}: {e}"))
                })?;
                tls = tls.ca_certificate(Certificate::from_pem(ca_pem));
            } else {
                tls = tls.with_native_roots();
            }

            if let Some(domain) = &self.tls_domain_name {
                tls = tls.domain_name(domain);
            }

            ep = ep
                .tls_config(tls)
                .map_err(|e| CredentialError::Configuration(format!("TLS: {e}")))?;
        }

        Ok(ep)
    }

    fn check_credentials(&self, credentials: &dyn PerRpcCredentials) -> Result<(), CredentialError> {
        if self.insecure && credentials.require_transport_security() {
            return Err(CredentialError::Configuration(
                "credentials require transport security but the connection is insecure"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn env_secs(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Connect to the broker and attach `credentials` to every call
///
/// `lifetime` bounds how long calls wait for credentials; cancel it when the
/// connection is torn down.
pub async fn dial(
    config: &DialConfig,
    credentials: Arc<dyn PerRpcCredentials>,
    lifetime: CancellationToken,
) -> Result<AuthenticatedChannel, CredentialError> {
    config.check_credentials(credentials.as_ref())?;

    let channel = config
        .make_endpoint()?
        .connect()
        .await
        .map_err(|e| CredentialError::Transport(format!("{}: {e}", config.address)))?;

    info!(address = %config.address, "Connected to broker");
    Ok(CredentialsLayer::new(credentials, lifetime).layer(channel))
}

/// Like [`dial`], but connects on first use
///
/// ## Errors
///
/// `Configuration` on an invalid configuration or outside a Tokio runtime
pub fn dial_lazy(
    config: &DialConfig,
    credentials: Arc<dyn PerRpcCredentials>,
    lifetime: CancellationToken,
) -> Result<AuthenticatedChannel, CredentialError> {
    config.check_credentials(credentials.as_ref())?;
    Handle::try_current()
        .map_err(|e| CredentialError::Configuration(format!("no async runtime: {e}")))?;

    let channel = config.make_endpoint()?.connect_lazy();
    Ok(CredentialsLayer::new(credentials, lifetime).layer(channel))
}
