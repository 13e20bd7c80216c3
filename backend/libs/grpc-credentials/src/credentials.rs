use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::codegen::http::HeaderMap;

use crate::error::CredentialError;

/// Name of the metadata entry carrying the credential
pub const AUTHORIZATION: &str = "authorization";

/// Credential attached to a connection and consulted before every call
///
/// `ctx` is the calling operation's cancellation token; an implementation that
/// may block must give up once it is cancelled.
#[async_trait]
pub trait PerRpcCredentials: Send + Sync {
    /// Metadata entries to attach to one outbound call
    async fn request_metadata(&self, ctx: &CancellationToken)
        -> Result<HeaderMap, CredentialError>;

    /// Whether the credential may only be sent over an encrypted channel
    fn require_transport_security(&self) -> bool;
}

#[async_trait]
impl<C: PerRpcCredentials + ?Sized> PerRpcCredentials for Arc<C> {
    async fn request_metadata(
        &self,
        ctx: &CancellationToken,
    ) -> Result<HeaderMap, CredentialError> {
        (**self).request_metadata(ctx).await
    }

    fn require_transport_security(&self) -> bool {
        (**self).require_transport_security()
    }
}
