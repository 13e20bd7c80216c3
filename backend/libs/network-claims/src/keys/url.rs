use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

use super::{PrivateKey, PrivateKeyProvider, PublicKeyProvider, PublicKeySet};
use crate::error::KeyError;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Key provider fetching a key document over HTTP(S)
///
/// Every call performs a fresh GET. Non-2xx responses fail with
/// [`KeyError::Status`]; transport failures with [`KeyError::Fetch`].
#[derive(Debug, Clone)]
pub struct UrlKeyProvider {
    client: Client,
    url: Url,
}

impl UrlKeyProvider {
    pub fn new(url: Url) -> Result<Self, KeyError> {
        Self::with_timeout(url, Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }

    /// Create a provider whose fetches are bounded by `timeout`
    pub fn with_timeout(url: Url, timeout: Duration) -> Result<Self, KeyError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(KeyError::Configuration(format!(
                "unsupported key URL scheme {:?}",
                url.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeyError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<u8>, KeyError> {
        debug!(url = %self.url, "Fetching key document");

        let fetch_error = |e: reqwest::Error| KeyError::Fetch {
            url: self.url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyError::Status {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(fetch_error)?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl PublicKeyProvider for UrlKeyProvider {
    async fn public_keys(&self) -> Result<PublicKeySet, KeyError> {
        PublicKeySet::from_json(&self.fetch().await?)
    }
}

#[async_trait]
impl PrivateKeyProvider for UrlKeyProvider {
    async fn private_key(&self) -> Result<PrivateKey, KeyError> {
        PrivateKey::from_json(&self.fetch().await?)
    }
}
