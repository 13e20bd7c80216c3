use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tonic::codegen::http::{HeaderMap, HeaderValue};

use crate::credentials::{PerRpcCredentials, AUTHORIZATION};
use crate::error::CredentialError;

/// Static username/password credential
///
/// The header value is computed once at construction; every call returns the
/// same `Basic` authorization without blocking.
///
/// ```rust
/// use grpc_credentials::BasicAuthCredentials;
///
/// let credentials = BasicAuthCredentials::new("alice", "secret", false).unwrap();
/// ```
#[derive(Clone)]
pub struct BasicAuthCredentials {
    /// Pre-formatted "Basic {base64(username:password)}"
    auth_header: HeaderValue,
    insecure: bool,
}

impl BasicAuthCredentials {
    /// ## Errors
    ///
    /// `InvalidMetadata` if the encoded value is not a valid header value,
    /// which cannot happen for base64 output
    pub fn new(username: &str, password: &str, insecure: bool) -> Result<Self, CredentialError> {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        let mut auth_header = HeaderValue::try_from(format!("Basic {encoded}"))
            .map_err(|e| CredentialError::InvalidMetadata(e.to_string()))?;
        auth_header.set_sensitive(true);

        Ok(Self {
            auth_header,
            insecure,
        })
    }
}

impl fmt::Debug for BasicAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthCredentials")
            .field("insecure", &self.insecure)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PerRpcCredentials for BasicAuthCredentials {
    async fn request_metadata(
        &self,
        _ctx: &CancellationToken,
    ) -> Result<HeaderMap, CredentialError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.auth_header.clone());
        Ok(headers)
    }

    fn require_transport_security(&self) -> bool {
        !self.insecure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_auth_header() {
        let credentials = BasicAuthCredentials::new("alice", "secret", false).unwrap();
        let ctx = CancellationToken::new();

        for _ in 0..3 {
            let headers = credentials.request_metadata(&ctx).await.unwrap();
            assert_eq!(headers.len(), 1);
            assert_eq!(headers[AUTHORIZATION], "Basic YWxpY2U6c2VjcmV0");
        }
    }

    #[tokio::test]
    async fn test_cancelled_context_is_not_checked() {
        let credentials = BasicAuthCredentials::new("alice", "secret", false).unwrap();
        let ctx = CancellationToken::new();
        ctx.cancel();

        assert!(credentials.request_metadata(&ctx).await.is_ok());
    }

    #[test]
    fn test_transport_security() {
        assert!(BasicAuthCredentials::new("a", "b", false)
            .unwrap()
            .require_transport_security());
        assert!(!BasicAuthCredentials::new("a", "b", true)
            .unwrap()
            .require_transport_security());
    }

    #[test]
    fn test_debug_hides_password() {
        let credentials = BasicAuthCredentials::new("alice", "secret", false).unwrap();
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("YWxpY2U6c2VjcmV0"));
    }
}
