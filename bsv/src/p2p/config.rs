use crate::bitcoin::BlockchainId;
use crate::p2p::message::Services;
use crate::p2p::params::{
    NetworkParams, DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, PROTOCOL_VERSION, USER_AGENT,
};
use std::net::SocketAddr;
use std::time::Duration;

/// Size of the command channel of connection and group actors.
pub const ACTOR_CHANNEL_SIZE: usize = 100;

/// Configuration of a single peer connection.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub blockchain: BlockchainId,
    /// Protocol version announced in our version message.
    pub protocol_version: u32,
    pub user_agent: String,
    pub services: Services,
    /// Whether the peer should relay loose transactions to us.
    pub relay: bool,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    /// Largest non-block payload accepted.
    pub max_payload_size: u32,
    /// Largest block payload accepted.
    pub max_block_size: u32,
    /// Request the blocks and transactions announced by the peer.
    pub download_data: bool,
    /// Open the handshake without checksums, for peers older than protocol version 209.
    pub legacy_framing: bool,
    /// Number of block hashes below the head put into a block locator.
    pub locator_depth: usize,
    pub command_channel_size: usize,
}

impl PeerConfig {
    /// Get default configuration for a particular blockchain.
    pub fn default(blockchain: BlockchainId) -> PeerConfig {
        PeerConfig {
            blockchain,
            protocol_version: PROTOCOL_VERSION,
            user_agent: USER_AGENT.to_string(),
            services: Services::NONE,
            relay: true,
            connect_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(30),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            download_data: true,
            legacy_framing: false,
            locator_depth: 50,
            command_channel_size: ACTOR_CHANNEL_SIZE,
        }
    }

    pub fn network(&self) -> NetworkParams {
        NetworkParams::from(self.blockchain)
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig::default(BlockchainId::Main)
    }
}

/// Configuration of a [PeerGroup](crate::p2p::PeerGroup).
#[derive(Debug, Clone)]
pub struct PeerGroupConfig {
    /// Most connections open at the same time.
    pub max_connections: usize,
    /// Pause between connection attempts, and before retrying when all slots are taken.
    pub connection_delay: Duration,
    /// Addresses queued when the group is created.
    pub initial_addresses: Vec<SocketAddr>,
    /// Queue addresses that peers announce in `addr` messages.
    pub use_discovered_addresses: bool,
    pub peer: PeerConfig,
}

impl PeerGroupConfig {
    /// Get default configuration for a particular blockchain.
    pub fn default(blockchain: BlockchainId) -> PeerGroupConfig {
        PeerGroupConfig {
            max_connections: 4,
            connection_delay: Duration::from_secs(5),
            initial_addresses: Vec::new(),
            use_discovered_addresses: false,
            peer: PeerConfig::default(blockchain),
        }
    }
}

impl Default for PeerGroupConfig {
    fn default() -> Self {
        PeerGroupConfig::default(BlockchainId::Main)
    }
}
