//! Credential Flow Integration Tests
//!
//! Purpose: Verify that an identity token issued by the claims codec travels
//! through the refreshed bearer credential and the credentials middleware,
//! and is verified on the receiving side.
//!
//! Test Coverage:
//! 1. Issuer signs claims with a file-sourced private key
//! 2. Bearer credential publishes the token on outbound requests
//! 3. Receiver parses the token against the cached public key set
//! 4. Receiver enforces expiry and network authorization explicitly
//!
//! Run: cargo test --test credential_flow_test

use async_trait::async_trait;
use broker_admin::grpc_credentials::{
    AccessToken, CredentialError, CredentialsLayer, RefreshedBearerCredentials, TokenSource,
    AUTHORIZATION,
};
use broker_admin::network_claims::{
    generate_ed25519, parse, sign, CachedKeyProvider, Claims, ClaimsValidation, KeyConfig,
    KeySource, NetId, NetworkIdentity,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tonic::codegen::http::Request;
use tonic::Status;
use tower::{service_fn, Layer, ServiceExt};

const ISSUER: &str = "iam.example.com";
const AUDIENCE: &str = "broker";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("network_claims=debug,grpc_credentials=debug")
        .with_test_writer()
        .try_init();
}

/// Key files for one issuer, removed when dropped
struct KeyFixture {
    _dir: TempDir,
    config: KeyConfig,
}

fn key_fixture() -> KeyFixture {
    let dir = TempDir::new().unwrap();
    let pair = generate_ed25519("2024-01");
    let private_path = dir.path().join("key.json");
    let public_path = dir.path().join("jwks.json");
    std::fs::write(&private_path, pair.private_jwk.to_string()).unwrap();
    std::fs::write(&public_path, pair.public_key_set().to_string()).unwrap();

    KeyFixture {
        config: KeyConfig {
            public_keys: Some(public_path.display().to_string()),
            private_key: Some(private_path.display().to_string()),
        },
        _dir: dir,
    }
}

/// Token source that issues identity tokens for a router
struct IssuingSource {
    signer: CachedKeyProvider<KeySource>,
    claims: Claims,
    ttl: Duration,
}

#[async_trait]
impl TokenSource for IssuingSource {
    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        let token = sign(&self.signer, &self.claims)
            .await
            .map_err(|e| CredentialError::Fetch(e.to_string()))?;
        Ok(AccessToken::bearer(token, self.ttl))
    }
}

fn router_claims(ttl: Duration) -> Claims {
    Claims::new(ISSUER, "router-eu1", ttl)
        .with_audience(AUDIENCE)
        .with_network(NetworkIdentity::tenant(NetId::new(0x13).unwrap(), "ttn"))
}

/// Receiving side: verify the bearer token and return the authorized subject
async fn authorize(
    verifier: &CachedKeyProvider<KeySource>,
    req: &Request<()>,
) -> Result<String, Status> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Status::unauthenticated("Missing authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| Status::unauthenticated("Expected a bearer token"))?;

    let claims = parse(verifier, token)
        .await
        .map_err(|e| Status::unauthenticated(e.to_string()))?;
    ClaimsValidation::new()
        .with_audience(AUDIENCE)
        .with_issuer(ISSUER)
        .validate(&claims)
        .map_err(|e| Status::unauthenticated(e.to_string()))?;

    if !claims.is_authorized_for(NetId::new(0x13).unwrap(), Some("ttn")) {
        return Err(Status::permission_denied("Not authorized for tenant"));
    }
    Ok(claims.sub)
}

#[tokio::test]
async fn test_issued_token_is_verified_by_receiver() {
    init_tracing();
    let keys = key_fixture();
    let verifier = Arc::new(keys.config.public_key_provider().unwrap());
    let lifetime = CancellationToken::new();

    let source = IssuingSource {
        signer: keys.config.private_key_provider().unwrap(),
        claims: router_claims(Duration::from_secs(3600)),
        ttl: Duration::from_secs(3600),
    };
    let credentials =
        Arc::new(RefreshedBearerCredentials::spawn(source, lifetime.clone(), true).unwrap());

    let receiver = {
        let verifier = Arc::clone(&verifier);
        service_fn(move |req: Request<()>| {
            let verifier = Arc::clone(&verifier);
            async move { authorize(&verifier, &req).await }
        })
    };
    let service = CredentialsLayer::new(credentials, lifetime.clone()).layer(receiver);

    for _ in 0..3 {
        let subject = service.clone().oneshot(Request::new(())).await.unwrap();
        assert_eq!(subject, "router-eu1");
    }

    lifetime.cancel();
}

#[tokio::test]
async fn test_expired_identity_is_rejected_by_explicit_validation() {
    init_tracing();
    let keys = key_fixture();
    let verifier = keys.config.public_key_provider().unwrap();
    let signer = keys.config.private_key_provider().unwrap();

    let mut claims = router_claims(Duration::from_secs(60));
    claims.iat -= 600;
    claims.exp -= 600;
    let token = sign(&signer, &claims).await.unwrap();

    // Signature is fine, so parsing succeeds
    let parsed = parse(&verifier, &token).await.unwrap();
    assert_eq!(parsed, claims);

    let mut req = Request::new(());
    req.headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());

    let status = authorize(&verifier, &req).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unauthenticated);
}

#[tokio::test]
async fn test_token_from_another_issuer_is_rejected() {
    let trusted = key_fixture();
    let rogue = key_fixture();
    let verifier = trusted.config.public_key_provider().unwrap();
    let signer = rogue.config.private_key_provider().unwrap();

    let token = sign(&signer, &router_claims(Duration::from_secs(3600)))
        .await
        .unwrap();

    let mut req = Request::new(());
    req.headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());

    let status = authorize(&verifier, &req).await.unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unauthenticated);
}
