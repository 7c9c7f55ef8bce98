use hex::ToHex;
use ring::digest::{digest, SHA256};
use ripemd::{Digest, Ripemd160};
use std::fmt;

/// A 160-bit hash, RIPEMD160(SHA256(data)). Used for public key and script hashes.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash160 {
    pub hash: [u8; Self::SIZE],
}

impl Hash160 {
    pub const SIZE: usize = 20;

    /// Generate the hash from the given data.
    pub fn generate(data: &[u8]) -> Hash160 {
        let sha256 = digest(&SHA256, data);
        let ripemd = Ripemd160::digest(sha256.as_ref());
        let mut hash = [0; Self::SIZE];
        hash.copy_from_slice(ripemd.as_ref());
        Hash160 { hash }
    }

    /// Plain RIPEMD160 of the data, without the SHA256 round.
    pub fn ripemd160(data: &[u8]) -> [u8; Self::SIZE] {
        let mut out = [0; Self::SIZE];
        out.copy_from_slice(Ripemd160::digest(data).as_ref());
        out
    }
}

impl AsRef<[u8]> for Hash160 {
    fn as_ref(&self) -> &[u8] {
        &self.hash
    }
}

impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.hash.encode_hex::<String>())
    }
}
