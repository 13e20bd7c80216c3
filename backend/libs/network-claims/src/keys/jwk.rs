//! JWK / JWKS key documents
//!
//! Public key sets are standard JWKS documents. A private key is a single JWK
//! carrying its private component (`d` for Ed25519, `k` for HMAC secrets).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use jsonwebtoken::{Algorithm, DecodingKey};
use rand::RngCore;
use serde::Deserialize;
use serde_json::{json, Value};
use zeroize::Zeroizing;

use super::{PrivateKey, PrivateKeyMaterial, PublicKey, PublicKeySet};
use crate::error::KeyError;

const ED25519_SEED_LEN: usize = 32;

#[derive(Deserialize)]
struct JwkDocument {
    kty: String,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    k: Option<String>,
    #[serde(default)]
    d: Option<String>,
}

impl JwkDocument {
    fn member<'a>(&'a self, value: &'a Option<String>, name: &str) -> Result<&'a str, KeyError> {
        value.as_deref().ok_or_else(|| {
            KeyError::Parse(format!("{} key is missing member \"{name}\"", self.kty))
        })
    }

    fn require_curve(&self, expected: &str) -> Result<(), KeyError> {
        match self.crv.as_deref() {
            Some(crv) if crv == expected => Ok(()),
            other => Err(KeyError::Parse(format!(
                "{} key has curve {other:?}, expected {expected}",
                self.kty
            ))),
        }
    }

    /// Algorithm implied by the key type when `alg` is absent
    fn inferred_algorithm(&self) -> Result<Algorithm, KeyError> {
        match (self.kty.as_str(), self.crv.as_deref()) {
            ("OKP", Some("Ed25519")) => Ok(Algorithm::EdDSA),
            ("RSA", _) => Ok(Algorithm::RS256),
            ("EC", Some("P-256")) => Ok(Algorithm::ES256),
            ("EC", Some("P-384")) => Ok(Algorithm::ES384),
            ("oct", _) => Ok(Algorithm::HS256),
            (kty, crv) => Err(KeyError::Parse(format!(
                "cannot infer algorithm for key type {kty} (curve {crv:?})"
            ))),
        }
    }
}

#[derive(Deserialize)]
struct JwkSetDocument {
    keys: Vec<JwkDocument>,
}

fn decode_b64(value: &str, member: &str) -> Result<Vec<u8>, KeyError> {
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| KeyError::Parse(format!("member \"{member}\" is not base64url: {e}")))
}

pub(super) fn parse_public_key_set(document: &[u8]) -> Result<PublicKeySet, KeyError> {
    let set: JwkSetDocument = serde_json::from_slice(document)
        .map_err(|e| KeyError::Parse(format!("not a JWK set: {e}")))?;

    let keys = set
        .keys
        .into_iter()
        .map(public_key)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PublicKeySet::from_keys(keys))
}

fn public_key(jwk: JwkDocument) -> Result<PublicKey, KeyError> {
    if jwk.d.is_some() {
        return Err(KeyError::Parse(
            "public key set contains private key material".to_string(),
        ));
    }

    let algorithm = match jwk.alg.as_deref() {
        Some(alg) => alg
            .parse::<Algorithm>()
            .map_err(|_| KeyError::Parse(format!("unknown algorithm {alg:?}")))?,
        None => jwk.inferred_algorithm()?,
    };

    let invalid = |e: jsonwebtoken::errors::Error| KeyError::Parse(format!("invalid key: {e}"));

    let decoding = match (jwk.kty.as_str(), algorithm) {
        ("OKP", Algorithm::EdDSA) => {
            jwk.require_curve("Ed25519")?;
            DecodingKey::from_ed_components(jwk.member(&jwk.x, "x")?).map_err(invalid)?
        }
        (
            "RSA",
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512,
        ) => DecodingKey::from_rsa_components(jwk.member(&jwk.n, "n")?, jwk.member(&jwk.e, "e")?)
            .map_err(invalid)?,
        ("EC", Algorithm::ES256) => {
            jwk.require_curve("P-256")?;
            DecodingKey::from_ec_components(jwk.member(&jwk.x, "x")?, jwk.member(&jwk.y, "y")?)
                .map_err(invalid)?
        }
        ("EC", Algorithm::ES384) => {
            jwk.require_curve("P-384")?;
            DecodingKey::from_ec_components(jwk.member(&jwk.x, "x")?, jwk.member(&jwk.y, "y")?)
                .map_err(invalid)?
        }
        ("oct", Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) => {
            let secret = Zeroizing::new(decode_b64(jwk.member(&jwk.k, "k")?, "k")?);
            DecodingKey::from_secret(&secret)
        }
        (kty, algorithm) => {
            return Err(KeyError::Parse(format!(
                "algorithm {algorithm:?} cannot be used with key type {kty}"
            )))
        }
    };

    Ok(PublicKey {
        kid: jwk.kid,
        algorithm,
        decoding,
    })
}

pub(super) fn parse_private_key(document: &[u8]) -> Result<PrivateKey, KeyError> {
    let jwk: JwkDocument = serde_json::from_slice(document)
        .map_err(|e| KeyError::Parse(format!("not a JWK: {e}")))?;

    let (material, default_alg) = match jwk.kty.as_str() {
        "OKP" => {
            jwk.require_curve("Ed25519")?;
            let seed = Zeroizing::new(decode_b64(jwk.member(&jwk.d, "d")?, "d")?);
            let signing = ed25519_signing_key(&seed).map_err(KeyError::Parse)?;

            if let Some(x) = jwk.x.as_deref() {
                let declared = decode_b64(x, "x")?;
                if declared != signing.verifying_key().to_bytes() {
                    return Err(KeyError::Parse(
                        "public component does not match private key".to_string(),
                    ));
                }
            }

            (PrivateKeyMaterial::Ed25519(seed), "EdDSA")
        }
        "oct" => {
            let secret = Zeroizing::new(decode_b64(jwk.member(&jwk.k, "k")?, "k")?);
            (PrivateKeyMaterial::Secret(secret), "HS256")
        }
        kty => {
            return Err(KeyError::Parse(format!(
                "unsupported private key type {kty}"
            )))
        }
    };

    Ok(PrivateKey {
        kid: jwk.kid,
        alg: jwk.alg.unwrap_or_else(|| default_alg.to_string()),
        material,
    })
}

fn ed25519_signing_key(seed: &[u8]) -> Result<Ed25519SigningKey, String> {
    let seed: &[u8; ED25519_SEED_LEN] = seed
        .try_into()
        .map_err(|_| format!("Ed25519 seed must be {ED25519_SEED_LEN} bytes, got {}", seed.len()))?;
    Ok(Ed25519SigningKey::from_bytes(seed))
}

/// PKCS#8 DER encoding of an Ed25519 seed, the form jsonwebtoken signs with
pub(super) fn ed25519_pkcs8_der(seed: &[u8]) -> Result<Zeroizing<Vec<u8>>, String> {
    let der = ed25519_signing_key(seed)?
        .to_pkcs8_der()
        .map_err(|e| format!("encode Ed25519 key: {e}"))?;
    Ok(Zeroizing::new(der.as_bytes().to_vec()))
}

/// Freshly generated key pair as JWK documents
pub struct GeneratedKeyPair {
    /// Private JWK (contains `d`; store it as a secret)
    pub private_jwk: Value,
    /// Public JWK
    pub public_jwk: Value,
}

impl GeneratedKeyPair {
    /// JWKS document holding only this pair's public key
    pub fn public_key_set(&self) -> Value {
        json!({ "keys": [self.public_jwk.clone()] })
    }
}

/// Generate an Ed25519 key pair with the given key ID
pub fn generate_ed25519(kid: &str) -> GeneratedKeyPair {
    let mut seed = Zeroizing::new([0u8; ED25519_SEED_LEN]);
    rand::thread_rng().fill_bytes(&mut *seed);
    let public = Ed25519SigningKey::from_bytes(&seed).verifying_key().to_bytes();
    let x = URL_SAFE_NO_PAD.encode(public);

    GeneratedKeyPair {
        private_jwk: json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "kid": kid,
            "alg": "EdDSA",
            "x": x,
            "d": URL_SAFE_NO_PAD.encode(&*seed),
        }),
        public_jwk: json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "kid": kid,
            "alg": "EdDSA",
            "use": "sig",
            "x": x,
        }),
    }
}
