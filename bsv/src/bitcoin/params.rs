use crate::bitcoin::pow::target_from_compact;
use crate::bitcoin::{BlockHeader, Hash};
use num::BigUint;
use serde::{Deserialize, Serialize};

/// Bitcoin has multiple blockchains: "main", "test", "regtest", and "stn" chains.
///
/// The blockchain defines the parameters used by the P2P network, not the other way around.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockchainId {
    #[serde(alias = "mainnet")]
    Main = 0,
    #[serde(alias = "testnet")]
    Test = 1,
    Stn = 2,
    Regtest = 3,
}

// raw (internal order) merkle root shared by all genesis blocks
const GENESIS_MERKLE_ROOT: [u8; 32] = [
    0x3b, 0xa3, 0xed, 0xfd, 0x7a, 0x7b, 0x12, 0xb2, 0x7a, 0xc7, 0x2c, 0x3e, 0x67, 0x76, 0x8f, 0x61,
    0x7f, 0xc8, 0x1b, 0xc3, 0x88, 0x8a, 0x51, 0x32, 0x3a, 0x9f, 0xb8, 0xaa, 0x4b, 0x1e, 0x5e, 0x4a,
];

/// Consensus parameters of a blockchain that the chain tracker needs.
#[derive(Clone, Debug)]
pub struct ChainParams {
    pub blockchain: BlockchainId,
    /// Header of block 0.
    pub genesis: BlockHeader,
    /// Easiest allowed target, in compact form.
    pub pow_limit_bits: u32,
    /// Number of blocks between difficulty retargets.
    pub interval: u32,
    /// Expected duration of one retarget interval, in seconds.
    pub target_timespan: u32,
    /// Expected seconds between blocks.
    pub target_spacing: u32,
    /// Regtest never retargets.
    pub no_retargeting: bool,
    /// Test networks accept min-difficulty blocks between retargets.
    pub allow_min_difficulty: bool,
}

impl ChainParams {
    pub fn for_chain(blockchain: BlockchainId) -> ChainParams {
        let genesis = |timestamp: u32, bits: u32, nonce: u32| BlockHeader {
            version: 1,
            prev_hash: Hash::ZERO,
            merkle_root: Hash::from(GENESIS_MERKLE_ROOT),
            timestamp,
            bits,
            nonce,
        };
        let base = ChainParams {
            blockchain,
            genesis: genesis(1231006505, 0x1d00ffff, 2083236893),
            pow_limit_bits: 0x1d00ffff,
            interval: 2016,
            target_timespan: 14 * 24 * 60 * 60,
            target_spacing: 10 * 60,
            no_retargeting: false,
            allow_min_difficulty: false,
        };
        match blockchain {
            BlockchainId::Main => base,
            BlockchainId::Test | BlockchainId::Stn => ChainParams {
                genesis: genesis(1296688602, 0x1d00ffff, 414098458),
                allow_min_difficulty: true,
                ..base
            },
            BlockchainId::Regtest => ChainParams {
                genesis: genesis(1296688602, 0x207fffff, 2),
                pow_limit_bits: 0x207fffff,
                no_retargeting: true,
                allow_min_difficulty: true,
                ..base
            },
        }
    }

    /// The easiest allowed target.
    pub fn pow_limit(&self) -> BigUint {
        target_from_compact(self.pow_limit_bits).unwrap_or_default()
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis.hash()
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        ChainParams::for_chain(BlockchainId::Main)
    }
}
