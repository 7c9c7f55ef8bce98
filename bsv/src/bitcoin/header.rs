use crate::bitcoin::hash::Hash;
use crate::bitcoin::pow::{check_proof_of_work, target_from_compact, work_from_compact};
use crate::bitcoin::Encodable;
use crate::Error;
use bytes::{Buf, BufMut};
use hex::{FromHex, ToHex};
use num::BigUint;
use serde::{Deserialize, Serialize};

/// The BlockHash is used to identify block headers and enforce proof of work.
pub type BlockHash = Hash;
/// The MerkleRoot is the root of the merkle tree of this block's transaction hashes.
pub type MerkleRoot = Hash;

/// BlockHeaders are linked to together to form a blockchain.
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block version.
    pub version: u32,
    /// Hash of the previous block header.
    pub prev_hash: BlockHash,
    /// Root of the merkle tree of this block's transaction hashes.
    pub merkle_root: MerkleRoot,
    /// Timestamp when this block was created as recorded by the miner.
    pub timestamp: u32,
    /// Target difficulty bits.
    pub bits: u32,
    /// Nonce used to mine the block.
    pub nonce: u32,
}

impl BlockHeader {
    /// Size of the BlockHeader in bytes
    pub const SIZE: usize = 80;

    /// Calculates the hash for this block header
    pub fn hash(&self) -> BlockHash {
        Hash::sha256d(&self.encode_array())
    }

    /// The full difficulty target, None if `bits` is not a valid encoding.
    pub fn target(&self) -> Option<BigUint> {
        target_from_compact(self.bits)
    }

    /// The amount of work this header represents.
    pub fn work(&self) -> BigUint {
        work_from_compact(self.bits)
    }

    /// Check the header hash against its own target and the chain's easiest target.
    pub fn check_proof_of_work(&self, pow_limit: &BigUint) -> crate::Result<()> {
        check_proof_of_work(&self.hash(), self.bits, pow_limit)
    }

    fn encode_array(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_hash.raw);
        out[36..68].copy_from_slice(&self.merkle_root.raw);
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }
}

impl Encodable for BlockHeader {
    fn from_binary(buffer: &mut dyn Buf) -> crate::Result<Self>
    where
        Self: Sized,
    {
        if buffer.remaining() < Self::SIZE {
            return Err(Error::DataTooSmall);
        }
        Ok(BlockHeader {
            version: buffer.get_u32_le(),
            prev_hash: Hash::from_binary(buffer)?,
            merkle_root: Hash::from_binary(buffer)?,
            timestamp: buffer.get_u32_le(),
            bits: buffer.get_u32_le(),
            nonce: buffer.get_u32_le(),
        })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> crate::Result<()> {
        buffer.put_slice(&self.encode_array());
        Ok(())
    }

    fn encoded_size(&self) -> u64 {
        Self::SIZE as u64
    }
}

impl FromHex for BlockHeader {
    type Error = Error;

    fn from_hex<T: AsRef<[u8]>>(hex: T) -> Result<Self, Self::Error> {
        let bytes = Vec::<u8>::from_hex(hex)?;
        BlockHeader::from_binary(&mut bytes.as_slice())
    }
}

impl ToHex for BlockHeader {
    fn encode_hex<T: FromIterator<char>>(&self) -> T {
        self.encode_array().encode_hex()
    }

    fn encode_hex_upper<T: FromIterator<char>>(&self) -> T {
        self.encode_array().encode_hex_upper()
    }
}
