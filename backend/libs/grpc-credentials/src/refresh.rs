//! Bearer credential refreshed in the background
//!
//! A single task per credential performs the token exchange, publishes the
//! resulting header, and schedules the next exchange at a fraction of the
//! token's validity. Callers read the header under a shared lock; until the
//! first exchange succeeds they wait on a one-shot readiness gate.
//!
//! ## Lifecycle
//!
//! ```text
//! spawn ──► awaiting first token ──► ready (refreshing in place)
//!                  │                        │
//!                  └──── lifetime cancelled ┴──► stopped
//! ```
//!
//! Once ready, a credential stays ready: later exchange failures are logged
//! and retried while the last good header keeps being served.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tonic::codegen::http::{HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use crate::credentials::{PerRpcCredentials, AUTHORIZATION};
use crate::error::CredentialError;

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Result of one token exchange
#[derive(Clone)]
pub struct AccessToken {
    /// Authorization scheme, e.g. `Bearer`; empty means `Bearer`
    pub token_type: String,
    pub access_token: String,
    /// Validity of the token from the moment it was issued
    pub expires_in: Duration,
}

impl AccessToken {
    pub fn bearer(access_token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            token_type: DEFAULT_TOKEN_TYPE.to_string(),
            access_token: access_token.into(),
            expires_in,
        }
    }

    fn header_value(&self) -> Result<HeaderValue, CredentialError> {
        let scheme = if self.token_type.is_empty() {
            DEFAULT_TOKEN_TYPE
        } else {
            &self.token_type
        };

        let mut value = HeaderValue::try_from(format!("{scheme} {}", self.access_token))
            .map_err(|e| CredentialError::InvalidMetadata(format!("access token: {e}")))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Token exchange performed by the refresh task
///
/// Implementations wrap whatever grant the deployment uses (client
/// credentials, token file, ...); the credential only needs the token and
/// its validity.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn fetch_token(&self) -> Result<AccessToken, CredentialError>;
}

/// Refresh scheduling
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Fraction of a token's validity after which it is refreshed
    pub refresh_ratio: f64,
    /// Delay before retrying a failed exchange
    pub retry_backoff: Duration,
    /// Upper bound on a single exchange
    pub exchange_timeout: Duration,
    /// Lower bound on the delay between two exchanges
    pub min_refresh_interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_ratio: 0.75,
            retry_backoff: Duration::from_secs(5),
            exchange_timeout: Duration::from_secs(30),
            min_refresh_interval: Duration::from_secs(1),
        }
    }
}

impl RefreshConfig {
    fn refresh_delay(&self, expires_in: Duration) -> Duration {
        let ratio = self.refresh_ratio.clamp(0.0, 1.0);
        expires_in.mul_f64(ratio).max(self.min_refresh_interval)
    }
}

/// State written by the refresh task and read by callers
#[derive(Default)]
struct SharedState {
    header: RwLock<Option<HeaderValue>>,
    last_error: Mutex<Option<CredentialError>>,
}

/// Bearer credential kept fresh by a background task
///
/// ```rust,no_run
/// use grpc_credentials::{AccessToken, CredentialError, RefreshedBearerCredentials, TokenSource};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// struct StaticToken;
///
/// #[async_trait::async_trait]
/// impl TokenSource for StaticToken {
///     async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
///         Ok(AccessToken::bearer("opaque", Duration::from_secs(3600)))
///     }
/// }
///
/// # async fn example() -> Result<(), CredentialError> {
/// let lifetime = CancellationToken::new();
/// let credentials = RefreshedBearerCredentials::spawn(StaticToken, lifetime.child_token(), false)?;
/// # Ok(())
/// # }
/// ```
pub struct RefreshedBearerCredentials {
    state: Arc<SharedState>,
    ready: watch::Receiver<bool>,
    insecure: bool,
}

impl RefreshedBearerCredentials {
    /// Start the refresh task with the default schedule
    ///
    /// The task runs until `lifetime` is cancelled.
    ///
    /// ## Errors
    ///
    /// `Configuration` when called outside a Tokio runtime
    pub fn spawn<S: TokenSource>(
        source: S,
        lifetime: CancellationToken,
        insecure: bool,
    ) -> Result<Self, CredentialError> {
        Self::with_config(source, lifetime, insecure, RefreshConfig::default())
    }

    pub fn with_config<S: TokenSource>(
        source: S,
        lifetime: CancellationToken,
        insecure: bool,
        config: RefreshConfig,
    ) -> Result<Self, CredentialError> {
        let runtime = Handle::try_current()
            .map_err(|e| CredentialError::Configuration(format!("no async runtime: {e}")))?;

        let state = Arc::new(SharedState::default());
        let (ready_tx, ready) = watch::channel(false);

        runtime.spawn(refresh_loop(
            source,
            Arc::clone(&state),
            ready_tx,
            lifetime,
            config,
        ));

        Ok(Self {
            state,
            ready,
            insecure,
        })
    }

    /// Whether the first token has been obtained
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    fn not_ready_error(&self) -> CredentialError {
        self.state
            .last_error
            .lock()
            .clone()
            .unwrap_or(CredentialError::Cancelled)
    }
}

impl fmt::Debug for RefreshedBearerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedBearerCredentials")
            .field("ready", &self.is_ready())
            .field("insecure", &self.insecure)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PerRpcCredentials for RefreshedBearerCredentials {
    async fn request_metadata(
        &self,
        ctx: &CancellationToken,
    ) -> Result<HeaderMap, CredentialError> {
        if !self.is_ready() {
            let mut ready = self.ready.clone();
            let released = tokio::select! {
                biased;
                released = async { ready.wait_for(|ready| *ready).await.is_ok() } => released,
                _ = ctx.cancelled() => false,
            };
            if !released {
                return Err(self.not_ready_error());
            }
        }

        let header = self
            .state
            .header
            .read()
            .clone()
            .ok_or_else(|| CredentialError::InvalidMetadata("no token published".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header);
        Ok(headers)
    }

    fn require_transport_security(&self) -> bool {
        !self.insecure
    }
}

async fn refresh_loop<S: TokenSource>(
    source: S,
    state: Arc<SharedState>,
    ready: watch::Sender<bool>,
    lifetime: CancellationToken,
    config: RefreshConfig,
) {
    loop {
        let exchanged = tokio::select! {
            _ = lifetime.cancelled() => break,
            result = exchange(&source, config.exchange_timeout) => result,
        };

        let delay = match exchanged {
            Ok((header, expires_in)) => {
                *state.header.write() = Some(header);
                state.last_error.lock().take();

                let delay = config.refresh_delay(expires_in);
                if ready.send_replace(true) {
                    debug!(next_refresh = ?delay, "Refreshed access token");
                } else {
                    info!(next_refresh = ?delay, "Obtained first access token");
                }
                delay
            }
            Err(err) => {
                warn!(error = %err, retry_in = ?config.retry_backoff, "Access token exchange failed");
                *state.last_error.lock() = Some(err);
                config.retry_backoff
            }
        };

        tokio::select! {
            _ = lifetime.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("Access token refresh stopped");
}

async fn exchange<S: TokenSource>(
    source: &S,
    timeout: Duration,
) -> Result<(HeaderValue, Duration), CredentialError> {
    let token = tokio::time::timeout(timeout, source.fetch_token())
        .await
        .map_err(|_| CredentialError::Fetch(format!("exchange timed out after {timeout:?}")))?
        .map_err(|err| match err {
            CredentialError::Fetch(_) => err,
            other => CredentialError::Fetch(other.to_string()),
        })?;

    Ok((token.header_value()?, token.expires_in))
}
