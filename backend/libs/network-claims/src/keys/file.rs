use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{PrivateKey, PrivateKeyProvider, PublicKeyProvider, PublicKeySet};
use crate::error::KeyError;

/// Key provider reading a key document from the local filesystem
///
/// The file is read and parsed on every call, so an updated file is picked
/// up without a restart unless the provider is wrapped in a cache.
#[derive(Debug, Clone)]
pub struct FileKeyProvider {
    path: PathBuf,
}

impl FileKeyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Vec<u8>, KeyError> {
        debug!(path = %self.path.display(), "Reading key document");

        tokio::fs::read(&self.path)
            .await
            .map_err(|e| KeyError::Read {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl PublicKeyProvider for FileKeyProvider {
    async fn public_keys(&self) -> Result<PublicKeySet, KeyError> {
        PublicKeySet::from_json(&self.read().await?)
    }
}

#[async_trait]
impl PrivateKeyProvider for FileKeyProvider {
    async fn private_key(&self) -> Result<PrivateKey, KeyError> {
        PrivateKey::from_json(&self.read().await?)
    }
}
