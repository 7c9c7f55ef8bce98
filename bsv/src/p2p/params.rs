use crate::bitcoin::BlockchainId;

/// Protocol version we announce.
pub const PROTOCOL_VERSION: u32 = 70015;

/// Peers older than this are refused.
pub const MIN_PEER_PROTOCOL_VERSION: u32 = 209;

/// From this version on, message headers carry a checksum.
pub const CHECKSUM_PROTOCOL_VERSION: u32 = 209;

/// Largest payload accepted by default (32MB). Blocks have their own limit.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 0x0200_0000;

/// Largest block payload accepted by default (64MB).
pub const DEFAULT_MAX_BLOCK_SIZE: u32 = 0x0400_0000;

/// User agent announced in our version message.
pub const USER_AGENT: &str = concat!("/bitcoinsv-spv:", env!("CARGO_PKG_VERSION"), "/");

/// Network Parameters for Bitcoin SV.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkParams {
    /// The magic bytes.
    pub magic: [u8; 4],
    /// default port.
    pub port: u16,
}

impl From<BlockchainId> for NetworkParams {
    fn from(blockchain_id: BlockchainId) -> Self {
        let (magic, port) = match blockchain_id {
            BlockchainId::Main => ([0xe3, 0xe1, 0xf3, 0xe8], 8333),
            BlockchainId::Test => ([0xf4, 0xe5, 0xf3, 0xf4], 18333),
            BlockchainId::Stn => ([0xfb, 0xce, 0xc4, 0xf9], 9333),
            BlockchainId::Regtest => ([0xda, 0xb5, 0xbf, 0xfa], 18444),
        };
        NetworkParams { magic, port }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn networks_differ() {
        let main = NetworkParams::from(BlockchainId::Main);
        assert_eq!(main.port, 8333);
        assert_ne!(main.magic, NetworkParams::from(BlockchainId::Regtest).magic);
        assert!(USER_AGENT.starts_with("/bitcoinsv-spv:"));
    }
}
