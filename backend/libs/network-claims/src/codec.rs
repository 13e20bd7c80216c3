//! Identity token codec
//!
//! Signs [`Claims`] into compact JWS tokens and verifies compact tokens back
//! into claims.
//!
//! ## Security Design
//!
//! - **Algorithm pinned per key**: a token is only checked against keys whose
//!   algorithm matches its header, so a key can never be used with another
//!   family (no HS/RS confusion)
//! - **Key ID first**: a `kid` in the header restricts verification to that key
//! - **Signature only**: `parse` checks the signature and nothing else;
//!   expiry, not-before, audience and issuer are checked by
//!   [`crate::ClaimsValidation`]

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use std::collections::HashSet;
use tracing::debug;

use crate::claims::Claims;
use crate::error::{Result, TokenError};
use crate::keys::{PrivateKeyProvider, PublicKey, PublicKeyProvider};

// ============================================================================
// Signing
// ============================================================================

/// Sign claims with the key supplied by `provider`
///
/// The token header carries the key's algorithm and, when the key has one,
/// its key ID.
///
/// ## Errors
///
/// - `KeyRetrieval` if the provider fails
/// - `UnsupportedAlgorithm` if the key's declared algorithm cannot sign with it
/// - `Serialization` if the claims cannot be encoded
pub async fn sign<P>(provider: &P, claims: &Claims) -> Result<String>
where
    P: PrivateKeyProvider + ?Sized,
{
    let key = provider.private_key().await?;
    let (algorithm, encoding_key) = key
        .signing_key()
        .map_err(TokenError::UnsupportedAlgorithm)?;

    let mut header = Header::new(algorithm);
    header.kid = key.kid.clone();

    let token = encode(&header, claims, &encoding_key)
        .map_err(|e| TokenError::Serialization(e.to_string()))?;

    debug!(kid = ?key.kid, alg = ?algorithm, sub = %claims.sub, "Signed identity token");
    Ok(token)
}

// ============================================================================
// Parsing
// ============================================================================

/// Verify a compact token against the key set supplied by `provider`
///
/// Only the signature is verified. An expired token with a valid signature
/// parses successfully; call [`crate::ClaimsValidation::validate`] on the
/// result to enforce temporal and audience constraints.
///
/// ## Errors
///
/// - `Malformed` if the input is not a three-segment token with a valid header
/// - `KeyRetrieval` if the provider fails
/// - `Verification` if no key in the set validates the signature
/// - `InvalidClaims` if the signature is valid but the payload is not claims
pub async fn parse<P>(provider: &P, token: &str) -> Result<Claims>
where
    P: PublicKeyProvider + ?Sized,
{
    let header = structural_header(token)?;
    let key_set = provider.public_keys().await?;

    let mut last_err = None;
    for key in key_set.candidates(header.kid.as_deref(), header.alg) {
        match verify_with(key, token) {
            Ok(claims) => {
                debug!(kid = ?key.kid, sub = %claims.sub, "Verified identity token");
                return Ok(claims);
            }
            Err(err @ TokenError::InvalidClaims(_)) => return Err(err),
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        TokenError::Verification(match header.kid {
            Some(kid) => format!("no {:?} key with key ID {kid:?}", header.alg),
            None => format!("no {:?} key in key set", header.alg),
        })
    }))
}

fn structural_header(token: &str) -> Result<Header> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(TokenError::Malformed(
            "expected three non-empty dot-separated segments".to_string(),
        ));
    }

    decode_header(token).map_err(|e| TokenError::Malformed(format!("invalid header: {e}")))
}

fn verify_with(key: &PublicKey, token: &str) -> Result<Claims> {
    decode::<Claims>(token, &key.decoding, &signature_only(key.algorithm))
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::Json(_) | ErrorKind::Utf8(_) => TokenError::InvalidClaims(e.to_string()),
            _ => TokenError::Verification(e.to_string()),
        })
}

/// Validation settings that check the signature and nothing else
fn signature_only(algorithm: Algorithm) -> Validation {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation
}

// ============================================================================
// Tests
// ============================================================================
