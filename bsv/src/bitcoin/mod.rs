//! Bitcoin data types: hashes, transactions, blocks, scripts and network parameters.

mod block;
mod crypto;
mod encoding;
pub mod hash;
pub mod hash160;
mod header;
mod merkle;
mod params;
pub mod pow;
pub mod script;
mod tx;
mod var_int;

pub use self::block::Block;
pub use self::crypto::{PrivateKey, PublicKey};
pub use self::encoding::Encodable;
pub use self::hash::Hash;
pub use self::hash160::Hash160;
pub use self::header::{BlockHash, BlockHeader, MerkleRoot};
pub use self::merkle::calculate_merkle_root;
pub use self::params::{BlockchainId, ChainParams};
pub use self::script::{Operation, Script};
pub use self::tx::{Outpoint, Tx, TxHash, TxInput, TxOutput};
pub use self::var_int::{varint_decode, varint_decode_len, varint_encode, varint_size};
pub use hex::{FromHex, ToHex};
