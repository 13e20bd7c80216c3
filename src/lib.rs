//! Credential and trust-token subsystem of the broker administration tools.
//!
//! The command-line tools depend on this facade rather than on the individual
//! libraries:
//!
//! - [`grpc_credentials`]: per-call authorization metadata for outbound RPCs
//! - [`network_claims`]: signed network/tenant/cluster identity tokens

pub use grpc_credentials;
pub use network_claims;
