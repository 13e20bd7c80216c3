//! Key material and the providers that source it
//!
//! Two narrow capabilities, [`PublicKeyProvider`] and [`PrivateKeyProvider`],
//! are implemented by the file-backed and URL-backed sources. Neither source
//! caches; wrap one in [`CachedKeyProvider`] to memoize its first result.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::error::KeyError;

mod cache;
mod file;
mod jwk;
mod location;
mod url;

pub use cache::CachedKeyProvider;
pub use file::FileKeyProvider;
pub use jwk::{generate_ed25519, GeneratedKeyPair};
pub use location::{KeyConfig, KeyLocation, KeySource};
pub use url::UrlKeyProvider;

/// Source of the public key set used to verify tokens
#[async_trait]
pub trait PublicKeyProvider: Send + Sync {
    async fn public_keys(&self) -> Result<PublicKeySet, KeyError>;
}

/// Source of the private key used to sign tokens
#[async_trait]
pub trait PrivateKeyProvider: Send + Sync {
    async fn private_key(&self) -> Result<PrivateKey, KeyError>;
}

#[async_trait]
impl<P: PublicKeyProvider + ?Sized> PublicKeyProvider for Arc<P> {
    async fn public_keys(&self) -> Result<PublicKeySet, KeyError> {
        (**self).public_keys().await
    }
}

#[async_trait]
impl<P: PrivateKeyProvider + ?Sized> PrivateKeyProvider for Arc<P> {
    async fn private_key(&self) -> Result<PrivateKey, KeyError> {
        (**self).private_key().await
    }
}

/// Verification key with its identifier and algorithm
#[derive(Clone)]
pub struct PublicKey {
    pub kid: Option<String>,
    pub algorithm: Algorithm,
    pub(crate) decoding: DecodingKey,
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Ordered set of verification keys
#[derive(Debug, Clone, Default)]
pub struct PublicKeySet {
    keys: Vec<PublicKey>,
}

impl PublicKeySet {
    /// Parse a JWKS document (`{"keys": [...]}`)
    pub fn from_json(document: &[u8]) -> Result<Self, KeyError> {
        jwk::parse_public_key_set(document)
    }

    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys to try for a token signed with `algorithm`
    ///
    /// With a key ID only the keys carrying that ID qualify; without one every
    /// key of the right algorithm does, in set order.
    pub fn candidates<'a>(
        &'a self,
        kid: Option<&'a str>,
        algorithm: Algorithm,
    ) -> impl Iterator<Item = &'a PublicKey> + 'a {
        self.keys.iter().filter(move |key| {
            key.algorithm == algorithm
                && match kid {
                    Some(kid) => key.kid.as_deref() == Some(kid),
                    None => true,
                }
        })
    }

    pub(crate) fn from_keys(keys: Vec<PublicKey>) -> Self {
        Self { keys }
    }
}

/// Private key material, kept in the form it was sourced in
#[derive(Clone)]
pub(crate) enum PrivateKeyMaterial {
    /// Ed25519 seed (32 bytes)
    Ed25519(Zeroizing<Vec<u8>>),
    /// HMAC secret
    Secret(Zeroizing<Vec<u8>>),
}

impl PrivateKeyMaterial {
    fn key_type(&self) -> &'static str {
        match self {
            Self::Ed25519(_) => "OKP",
            Self::Secret(_) => "oct",
        }
    }
}

/// Signing key with its identifier and declared algorithm
///
/// The algorithm is kept as declared in the key document and only
/// interpreted when signing.
#[derive(Clone)]
pub struct PrivateKey {
    pub kid: Option<String>,
    pub alg: String,
    pub(crate) material: PrivateKeyMaterial,
}

impl PrivateKey {
    /// Parse a single private JWK document
    pub fn from_json(document: &[u8]) -> Result<Self, KeyError> {
        jwk::parse_private_key(document)
    }

    /// Resolve the declared algorithm and build the signing key for it
    pub(crate) fn signing_key(&self) -> Result<(Algorithm, EncodingKey), String> {
        let algorithm: Algorithm = self
            .alg
            .parse()
            .map_err(|_| format!("unknown algorithm {:?}", self.alg))?;

        match (&self.material, algorithm) {
            (PrivateKeyMaterial::Ed25519(seed), Algorithm::EdDSA) => {
                let der = jwk::ed25519_pkcs8_der(seed)?;
                Ok((algorithm, EncodingKey::from_ed_der(&der)))
            }
            (
                PrivateKeyMaterial::Secret(secret),
                Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512,
            ) => Ok((algorithm, EncodingKey::from_secret(secret))),
            (material, _) => Err(format!(
                "{} cannot be used with a {} key",
                self.alg,
                material.key_type()
            )),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("kty", &self.material.key_type())
            .finish_non_exhaustive()
    }
}
