//! Vote-eligibility identity
//!
//! One ballot per [`VoterId`] per round. The default resolver derives the id
//! from the observer's network origin, which is weak and collision-prone: a
//! NAT shares one vote across everyone behind it, and a spoofed
//! `X-Forwarded-For` header mints fresh identities. The trait exists so a
//! stronger scheme (session token, account id) can replace it without
//! touching the voting state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Opaque vote-deduplication key; not persisted beyond the current round
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoterId(String);

impl VoterId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps a transport connection to the identity its votes count under
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, forwarded_for: Option<&str>, peer: SocketAddr) -> VoterId;
}

/// Default resolver: first `X-Forwarded-For` hop, else the peer address
#[derive(Debug, Clone, Default)]
pub struct ForwardedIpResolver;

impl IdentityResolver for ForwardedIpResolver {
    fn resolve(&self, forwarded_for: Option<&str>, peer: SocketAddr) -> VoterId {
        forwarded_for
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .map(VoterId::new)
            .unwrap_or_else(|| VoterId::new(peer.ip().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "203.0.113.7:52100".parse().unwrap()
    }

    #[test]
    fn forwarded_header_takes_first_hop() {
        let resolver = ForwardedIpResolver;
        let id = resolver.resolve(Some("198.51.100.4, 10.0.0.1"), peer());
        assert_eq!(id.as_str(), "198.51.100.4");
    }

    #[test]
    fn falls_back_to_peer_ip() {
        let resolver = ForwardedIpResolver;
        assert_eq!(resolver.resolve(None, peer()).as_str(), "203.0.113.7");
        // Blank header is treated as absent
        assert_eq!(resolver.resolve(Some("  "), peer()).as_str(), "203.0.113.7");
    }

    #[test]
    fn same_origin_same_identity() {
        let resolver = ForwardedIpResolver;
        let a = resolver.resolve(Some("198.51.100.4"), peer());
        let b = resolver.resolve(Some("198.51.100.4, 172.16.0.9"), peer());
        assert_eq!(a, b);
    }
}
