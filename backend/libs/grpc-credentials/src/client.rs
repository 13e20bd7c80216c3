//! Client-side credential middleware
//!
//! Attaches per-call credentials to every outgoing gRPC request. Unlike a
//! tonic interceptor, the middleware can wait: a credential that is still
//! obtaining its first token holds the request until it is ready.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tonic::codegen::http::Request;
use tonic::Status;
use tower::{Layer, Service};

use crate::credentials::PerRpcCredentials;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Tower layer wrapping a transport in [`CredentialsService`]
///
/// `ctx` bounds how long a request may wait for credentials. A request can
/// narrow it by carrying its own [`CancellationToken`] in its extensions.
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_credentials::{BasicAuthCredentials, CredentialsLayer};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use tonic::transport::Channel;
/// use tower::Layer;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let credentials = Arc::new(BasicAuthCredentials::new("admin", "secret", false)?);
/// let channel = Channel::from_static("https://broker.example.com:443").connect().await?;
/// let channel = CredentialsLayer::new(credentials, CancellationToken::new()).layer(channel);
///
/// // let mut client = SomeServiceClient::new(channel);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CredentialsLayer {
    credentials: Arc<dyn PerRpcCredentials>,
    ctx: CancellationToken,
}

impl CredentialsLayer {
    pub fn new(credentials: Arc<dyn PerRpcCredentials>, ctx: CancellationToken) -> Self {
        Self { credentials, ctx }
    }
}

impl<S> Layer<S> for CredentialsLayer {
    type Service = CredentialsService<S>;

    fn layer(&self, service: S) -> Self::Service {
        CredentialsService {
            inner: service,
            credentials: Arc::clone(&self.credentials),
            ctx: self.ctx.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CredentialsService<S> {
    inner: S,
    credentials: Arc<dyn PerRpcCredentials>,
    ctx: CancellationToken,
}

impl<S> CredentialsService<S> {
    pub fn credentials(&self) -> &Arc<dyn PerRpcCredentials> {
        &self.credentials
    }
}

impl<S, B> Service<Request<B>> for CredentialsService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // Keep the service that was polled ready, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let credentials = Arc::clone(&self.credentials);
        let ctx = req
            .extensions()
            .get::<CancellationToken>()
            .cloned()
            .unwrap_or_else(|| self.ctx.clone());

        Box::pin(async move {
            let metadata = credentials
                .request_metadata(&ctx)
                .await
                .map_err(|err| Box::new(Status::from(err)) as BoxError)?;

            req.headers_mut().extend(metadata);
            inner.call(req).await.map_err(Into::into)
        })
    }
}
