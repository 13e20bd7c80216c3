use chrono::{DateTime, Utc};

use crate::claims::Claims;
use crate::error::{Result, TokenError};

/// Temporal and audience checks applied to claims after parsing
///
/// [`crate::parse`] only verifies signatures, so a caller that needs to
/// reject expired or foreign tokens runs the parsed claims through this.
#[derive(Debug, Clone, Default)]
pub struct ClaimsValidation {
    /// Clock skew tolerated on `exp` and `nbf`, in seconds
    pub leeway: u64,
    /// Required `aud`, if any
    pub audience: Option<String>,
    /// Required `iss`, if any
    pub issuer: Option<String>,
}

impl ClaimsValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn validate(&self, claims: &Claims) -> Result<()> {
        self.validate_at(claims, Utc::now())
    }

    pub fn validate_at(&self, claims: &Claims, now: DateTime<Utc>) -> Result<()> {
        let now = now.timestamp();
        let leeway = i64::try_from(self.leeway).unwrap_or(i64::MAX);

        if claims.exp.saturating_add(leeway) <= now {
            return Err(TokenError::Expired { exp: claims.exp });
        }

        if let Some(nbf) = claims.nbf {
            if nbf.saturating_sub(leeway) > now {
                return Err(TokenError::NotYetValid { nbf });
            }
        }

        if let Some(expected) = &self.audience {
            if claims.aud.as_deref() != Some(expected.as_str()) {
                return Err(TokenError::InvalidAudience {
                    expected: expected.clone(),
                    found: claims.aud.clone(),
                });
            }
        }

        if let Some(expected) = &self.issuer {
            if &claims.iss != expected {
                return Err(TokenError::InvalidIssuer {
                    expected: expected.clone(),
                    found: claims.iss.clone(),
                });
            }
        }

        Ok(())
    }
}
