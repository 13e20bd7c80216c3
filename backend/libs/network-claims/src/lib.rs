//! Network identity tokens
//!
//! Issues and verifies signed identity tokens (compact JWS) for participants
//! of the routing broker. A token names its subject and the networks, tenants
//! and clusters the subject acts for.
//!
//! ## Components
//!
//! - [`keys`]: public key sets and private keys, sourced from a file or a URL
//!   and optionally memoized with [`CachedKeyProvider`]
//! - [`sign`] / [`parse`]: the claims codec
//! - [`ClaimsValidation`]: expiry, not-before, audience and issuer checks,
//!   applied by the caller after [`parse`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use network_claims::{parse, sign, Claims, ClaimsValidation, KeyConfig, NetId, NetworkIdentity};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KeyConfig::from_env();
//! let signer = config.private_key_provider()?;
//! let verifier = config.public_key_provider()?;
//!
//! let claims = Claims::new("iam.example.com", "router-eu1", Duration::from_secs(3600))
//!     .with_network(NetworkIdentity::tenant(NetId::new(0x13)?, "ttn"));
//!
//! let token = sign(&signer, &claims).await?;
//! let parsed = parse(&verifier, &token).await?;
//! ClaimsValidation::new().validate(&parsed)?;
//! # Ok(())
//! # }
//! ```

mod claims;
mod codec;
pub mod error;
pub mod keys;
mod validation;

pub use claims::{Claims, InvalidNetId, NetId, NetworkIdentity, NETWORKS_CLAIM};
pub use codec::{parse, sign};
pub use error::{KeyError, TokenError};
pub use keys::{
    generate_ed25519, CachedKeyProvider, FileKeyProvider, GeneratedKeyPair, KeyConfig,
    KeyLocation, KeySource, PrivateKey, PrivateKeyProvider, PublicKey, PublicKeyProvider,
    PublicKeySet, UrlKeyProvider,
};
pub use validation::ClaimsValidation;
