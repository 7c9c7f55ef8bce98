use crate::p2p::message::{Services, VersionMessage};
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// Lifecycle of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Running,
    Disconnecting,
    Disconnected,
}

impl ConnectionState {
    /// Whether the state may move to `next`. Any state may drop straight to Disconnected.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Handshaking)
                | (Handshaking, Running)
                | (Connecting | Handshaking | Running, Disconnecting)
                | (_, Disconnected)
        ) && *self != Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What we know about a connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Identifies the connection in logs and events, the address may be reused.
    pub id: Uuid,
    pub address: SocketAddr,
    /// Negotiated protocol version, zero until the handshake is done.
    pub version: u32,
    pub user_agent: String,
    pub services: Services,
    /// Best height the peer reported in its version message.
    pub start_height: u32,
}

impl PeerInfo {
    pub fn new(address: SocketAddr) -> PeerInfo {
        PeerInfo {
            id: Uuid::new_v4(),
            address,
            version: 0,
            user_agent: String::new(),
            services: Services::NONE,
            start_height: 0,
        }
    }

    pub(crate) fn update_from_version(&mut self, version: &VersionMessage) {
        self.version = version.version;
        self.user_agent = version.user_agent.clone();
        self.services = version.services;
        self.start_height = version.start_height;
    }
}
