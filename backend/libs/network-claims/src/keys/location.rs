//! Key source configuration
//!
//! Key documents are referenced by location: an `http(s)://` URL, a
//! `file://` URL, or a plain filesystem path.

use async_trait::async_trait;
use reqwest::Url;
use std::env;
use std::path::PathBuf;
use tracing::info;

use super::{
    CachedKeyProvider, FileKeyProvider, PrivateKey, PrivateKeyProvider, PublicKeyProvider,
    PublicKeySet, UrlKeyProvider,
};
use crate::error::KeyError;

/// Where a key document lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLocation {
    File(PathBuf),
    Url(Url),
}

impl KeyLocation {
    pub fn parse(location: &str) -> Result<Self, KeyError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(KeyError::Configuration("empty key location".to_string()));
        }

        if !location.contains("://") {
            return Ok(Self::File(PathBuf::from(location)));
        }

        let url = Url::parse(location)
            .map_err(|e| KeyError::Configuration(format!("invalid key location {location:?}: {e}")))?;

        match url.scheme() {
            "http" | "https" => Ok(Self::Url(url)),
            "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|_| KeyError::Configuration(format!("invalid file URL {location:?}"))),
            scheme => Err(KeyError::Configuration(format!(
                "unsupported key location scheme {scheme:?}"
            ))),
        }
    }

    /// Build the uncached provider for this location
    pub fn into_source(self) -> Result<KeySource, KeyError> {
        match self {
            Self::File(path) => Ok(KeySource::File(FileKeyProvider::new(path))),
            Self::Url(url) => Ok(KeySource::Url(UrlKeyProvider::new(url)?)),
        }
    }
}

/// File- or URL-backed key provider selected at startup
#[derive(Debug, Clone)]
pub enum KeySource {
    File(FileKeyProvider),
    Url(UrlKeyProvider),
}

impl KeySource {
    pub fn from_location(location: &str) -> Result<Self, KeyError> {
        KeyLocation::parse(location)?.into_source()
    }
}

#[async_trait]
impl PublicKeyProvider for KeySource {
    async fn public_keys(&self) -> Result<PublicKeySet, KeyError> {
        match self {
            Self::File(provider) => provider.public_keys().await,
            Self::Url(provider) => provider.public_keys().await,
        }
    }
}

#[async_trait]
impl PrivateKeyProvider for KeySource {
    async fn private_key(&self) -> Result<PrivateKey, KeyError> {
        match self {
            Self::File(provider) => provider.private_key().await,
            Self::Url(provider) => provider.private_key().await,
        }
    }
}

/// Key locations used by a process
#[derive(Debug, Clone, Default)]
pub struct KeyConfig {
    /// Location of the JWKS used to verify identity tokens
    pub public_keys: Option<String>,
    /// Location of the JWK used to sign identity tokens
    pub private_key: Option<String>,
}

impl KeyConfig {
    /// Load key locations from environment variables
    ///
    /// **Environment Variables**:
    /// - `IAM_PUBLIC_KEYS`: JWKS location (verifying services)
    /// - `IAM_PRIVATE_KEY`: private JWK location (issuing services)
    pub fn from_env() -> Self {
        let config = Self {
            public_keys: env::var("IAM_PUBLIC_KEYS").ok().filter(|v| !v.is_empty()),
            private_key: env::var("IAM_PRIVATE_KEY").ok().filter(|v| !v.is_empty()),
        };

        info!(
            public_keys = config.public_keys.is_some(),
            private_key = config.private_key.is_some(),
            "Identity key configuration loaded"
        );

        config
    }

    /// Cache-wrapped provider for the configured public key set
    pub fn public_key_provider(&self) -> Result<CachedKeyProvider<KeySource>, KeyError> {
        let location = self
            .public_keys
            .as_deref()
            .ok_or_else(|| KeyError::Configuration("IAM_PUBLIC_KEYS not set".to_string()))?;
        Ok(CachedKeyProvider::new(KeySource::from_location(location)?))
    }

    /// Cache-wrapped provider for the configured private key
    pub fn private_key_provider(&self) -> Result<CachedKeyProvider<KeySource>, KeyError> {
        let location = self
            .private_key
            .as_deref()
            .ok_or_else(|| KeyError::Configuration("IAM_PRIVATE_KEY not set".to_string()))?;
        Ok(CachedKeyProvider::new(KeySource::from_location(location)?))
    }
}
