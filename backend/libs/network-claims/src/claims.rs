//! Identity Claims Structure
//!
//! Claims carried by identity tokens issued to participants of the routing
//! broker. Besides the registered JWT claims, a token carries an ordered list
//! of network identities (NetID, optional tenant, optional cluster).
//!
//! Claims are plain values: the codec builds them from a verified token and
//! callers decide what to trust via [`crate::ClaimsValidation`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Name of the custom claim holding the network identities
pub const NETWORKS_CLAIM: &str = "https://iam.packetbroker.net/networks";

const NET_ID_MAX: u32 = 0x00FF_FFFF;

/// LoRaWAN NetID (24 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct NetId(u32);

impl NetId {
    pub fn new(value: u32) -> Result<Self, InvalidNetId> {
        if value > NET_ID_MAX {
            return Err(InvalidNetId(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid NetID {0}: must be a 24-bit value")]
pub struct InvalidNetId(String);

impl TryFrom<u32> for NetId {
    type Error = InvalidNetId;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NetId> for u32 {
    fn from(net_id: NetId) -> Self {
        net_id.0
    }
}

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

impl FromStr for NetId {
    type Err = InvalidNetId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = u32::from_str_radix(s, 16).map_err(|_| InvalidNetId(s.to_string()))?;
        Self::new(value)
    }
}

/// Identity of a network, optionally narrowed to a tenant and a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    /// NetID of the network
    #[serde(rename = "nid")]
    pub net_id: NetId,

    /// Tenant within the network
    #[serde(rename = "tid", default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Deployment cluster within the tenant
    #[serde(rename = "cid", default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
}

impl NetworkIdentity {
    pub fn network(net_id: NetId) -> Self {
        Self {
            net_id,
            tenant_id: None,
            cluster_id: None,
        }
    }

    pub fn tenant(net_id: NetId, tenant_id: impl Into<String>) -> Self {
        Self {
            net_id,
            tenant_id: Some(tenant_id.into()),
            cluster_id: None,
        }
    }

    pub fn with_cluster(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }
}

/// Identity token claims
///
/// ## Design Notes
///
/// - Fields are public for direct access (no getter boilerplate)
/// - Immutable value once produced by the codec; no behavior beyond lookups
/// - `networks` keeps the issuer's order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer
    pub iss: String,

    /// Subject
    pub sub: String,

    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Not before (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Unique token identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Network identities the subject acts for
    #[serde(
        rename = "https://iam.packetbroker.net/networks",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub networks: Vec<NetworkIdentity>,
}

impl Claims {
    /// Create claims issued now and valid for `ttl`, with a random `jti`
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        Self {
            iss: issuer.into(),
            sub: subject.into(),
            aud: None,
            iat: now,
            exp: now.saturating_add(ttl),
            nbf: None,
            jti: Some(Uuid::new_v4().to_string()),
            networks: Vec::new(),
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.aud = Some(audience.into());
        self
    }

    pub fn with_network(mut self, identity: NetworkIdentity) -> Self {
        self.networks.push(identity);
        self
    }

    /// Check whether the claims cover a network, or a tenant within it
    ///
    /// A network-wide identity (no tenant) covers every tenant of that network.
    pub fn is_authorized_for(&self, net_id: NetId, tenant_id: Option<&str>) -> bool {
        self.networks.iter().any(|identity| {
            identity.net_id == net_id
                && match (identity.tenant_id.as_deref(), tenant_id) {
                    (None, _) => true,
                    (Some(granted), Some(requested)) => granted == requested,
                    (Some(_), None) => false,
                }
        })
    }
}
