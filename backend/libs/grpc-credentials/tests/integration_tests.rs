//! Credentials attached through the middleware and the dial helpers

use async_trait::async_trait;
use grpc_credentials::{
    dial, dial_lazy, AccessToken, BasicAuthCredentials, CredentialError, CredentialsLayer,
    DialConfig, PerRpcCredentials, RefreshedBearerCredentials, TokenSource, AUTHORIZATION,
};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tonic::codegen::http::Request;
use tonic::{Code, Status};
use tower::{service_fn, Layer, ServiceExt};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("grpc_credentials=debug")
        .with_test_writer()
        .try_init();
}

async fn echo_authorization(req: Request<()>) -> Result<Option<String>, Infallible> {
    Ok(req
        .headers()
        .get(AUTHORIZATION)
        .map(|v| v.to_str().unwrap().to_string()))
}

/// Issues `token-1`, `token-2`, ... after a fixed exchange latency
struct CountingSource {
    calls: Arc<AtomicUsize>,
    latency: Duration,
    validity: Duration,
}

#[async_trait]
impl TokenSource for CountingSource {
    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.latency).await;
        Ok(AccessToken::bearer(format!("token-{n}"), self.validity))
    }
}

struct NeverReady;

#[async_trait]
impl TokenSource for NeverReady {
    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_requests_wait_for_first_token() {
    init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let lifetime = CancellationToken::new();
    let source = CountingSource {
        calls: Arc::clone(&calls),
        latency: Duration::from_secs(1),
        validity: Duration::from_secs(60),
    };
    let credentials =
        Arc::new(RefreshedBearerCredentials::spawn(source, lifetime.clone(), true).unwrap());

    let service = CredentialsLayer::new(credentials.clone(), lifetime.clone())
        .layer(service_fn(echo_authorization));

    let requests = (0..4).map(|_| service.clone().oneshot(Request::new(())));
    for seen in spawn_all(requests).await {
        assert_eq!(seen.unwrap().as_deref(), Some("Bearer token-1"));
    }
    assert!(credentials.is_ready());

    // First token issued at 1s, refreshed 45s later
    tokio::time::sleep(Duration::from_secs(47)).await;
    let seen = service.clone().oneshot(Request::new(())).await.unwrap();
    assert_eq!(seen.as_deref(), Some("Bearer token-2"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    lifetime.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_request_token_bounds_the_wait() {
    let lifetime = CancellationToken::new();
    let credentials =
        Arc::new(RefreshedBearerCredentials::spawn(NeverReady, lifetime.clone(), true).unwrap());
    let service =
        CredentialsLayer::new(credentials, lifetime).layer(service_fn(echo_authorization));

    let ctx = CancellationToken::new();
    let mut req = Request::new(());
    req.extensions_mut().insert(ctx.clone());

    let call = tokio::spawn(service.oneshot(req));
    tokio::time::sleep(Duration::from_secs(1)).await;
    ctx.cancel();

    let err = call.await.unwrap().unwrap_err();
    let status = err.downcast::<Status>().unwrap();
    assert_eq!(status.code(), Code::Cancelled);
}

#[tokio::test]
async fn test_dial_lazy_rejects_secure_credentials_on_insecure_connection() {
    let config = DialConfig::development("localhost:1884");
    let credentials = Arc::new(BasicAuthCredentials::new("admin", "secret", false).unwrap());

    let result = dial_lazy(&config, credentials, CancellationToken::new());
    assert!(matches!(result, Err(CredentialError::Configuration(_))));
}

#[tokio::test]
async fn test_dial_lazy_with_insecure_credentials() {
    let config = DialConfig::development("localhost:1884");
    let credentials = Arc::new(BasicAuthCredentials::new("admin", "secret", true).unwrap());

    let channel = dial_lazy(&config, credentials, CancellationToken::new()).unwrap();
    assert!(!channel.credentials().require_transport_security());
}

#[tokio::test]
async fn test_dial_unreachable_broker() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let mut config = DialConfig::development(format!("127.0.0.1:{port}"));
    config.connect_timeout_secs = 1;
    let credentials = Arc::new(BasicAuthCredentials::new("admin", "secret", true).unwrap());

    let result = dial(&config, credentials, CancellationToken::new()).await;
    assert!(matches!(result, Err(CredentialError::Transport(_))));
}

#[test]
fn test_dial_lazy_outside_runtime() {
    let config = DialConfig::development("localhost:1884");
    let credentials = Arc::new(BasicAuthCredentials::new("admin", "secret", true).unwrap());

    let result = dial_lazy(&config, credentials, CancellationToken::new());
    assert!(matches!(result, Err(CredentialError::Configuration(_))));
}

/// Run the futures as concurrent tasks and collect their outputs in order
async fn spawn_all<F>(futures: impl Iterator<Item = F>) -> Vec<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handles: Vec<_> = futures.map(tokio::spawn).collect();
    let mut outputs = Vec::with_capacity(handles.len());
    for handle in handles {
        outputs.push(handle.await.unwrap());
    }
    outputs
}
