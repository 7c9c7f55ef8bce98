//! Bookkeeping for the version/verack exchange that opens a connection.
//!
//! Four things have to happen before a connection is usable: our version is sent, the peer's
//! version is received, and each side acknowledges the other with a verack. The peer's messages
//! may arrive in any order.

use crate::p2p::config::PeerConfig;
use crate::p2p::message::{NetworkAddress, Services, VersionMessage};
use crate::p2p::params::{CHECKSUM_PROTOCOL_VERSION, MIN_PEER_PROTOCOL_VERSION};
use crate::{Error, Result};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeState {
    pub version_sent: bool,
    pub verack_sent: bool,
    pub verack_received: bool,
    /// The peer's version, once received.
    pub peer_version: Option<VersionMessage>,
}

impl HandshakeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        self.version_sent && self.version_received() && self.verack_sent && self.verack_received
    }

    pub fn version_received(&self) -> bool {
        self.peer_version.is_some()
    }

    pub fn mark_version_sent(&mut self) {
        self.version_sent = true;
    }

    pub fn mark_version_received(&mut self, version: VersionMessage) {
        self.peer_version = Some(version);
    }

    pub fn mark_verack_sent(&mut self) {
        self.verack_sent = true;
    }

    pub fn mark_verack_received(&mut self) {
        self.verack_received = true;
    }
}

/// Our version message for a connection to `peer`.
pub fn version_message(
    config: &PeerConfig,
    peer: SocketAddr,
    nonce: u64,
    start_height: u32,
) -> VersionMessage {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    VersionMessage {
        version: config.protocol_version,
        services: config.services,
        timestamp,
        recv_addr: NetworkAddress::new(peer, Services::NETWORK),
        from_addr: NetworkAddress {
            services: config.services,
            ..NetworkAddress::default()
        },
        nonce,
        user_agent: config.user_agent.clone(),
        start_height,
        relay: config.relay,
    }
}

/// Check the version a peer announced. `our_nonce` is the nonce of our own version message.
pub fn validate_version(version: &VersionMessage, our_nonce: u64) -> Result<()> {
    if version.version < MIN_PEER_PROTOCOL_VERSION {
        return Err(Error::HandshakeFailed(format!(
            "peer protocol version {} is older than {}",
            version.version, MIN_PEER_PROTOCOL_VERSION
        )));
    }
    if version.nonce == our_nonce {
        return Err(Error::HandshakeFailed("connected to ourselves".to_string()));
    }
    Ok(())
}

/// Whether messages to and from a peer of `peer_version` carry a checksum.
pub fn uses_checksum(peer_version: u32) -> bool {
    peer_version >= CHECKSUM_PROTOCOL_VERSION
}
