use crate::bitcoin::Encodable;
use crate::Error;
use bytes::{Buf, BufMut};
use hex::{FromHex, ToHex};
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A SHA256d hash, the hash used for transaction ids, block ids and merkle nodes.
///
/// [TxHash], [BlockHash] and [MerkleRoot] are aliases of this type and should be preferred where
/// the meaning is known.
///
/// [MerkleRoot]: crate::bitcoin::MerkleRoot
/// [TxHash]: crate::bitcoin::TxHash
/// [BlockHash]: crate::bitcoin::BlockHash
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash {
    pub raw: [u8; 32],
}

impl Hash {
    pub const SIZE: u64 = 32;
    pub const HEX_SIZE: u64 = Hash::SIZE * 2;
    pub const ZERO: Hash = Hash {
        raw: [0; Self::SIZE as usize],
    };

    /// Double SHA256 hash the given data.
    pub fn sha256d(data: &[u8]) -> Hash {
        let first = digest(&SHA256, data);
        Hash::sha256(first.as_ref())
    }

    /// Single round SHA256 of the given data.
    pub fn sha256(data: &[u8]) -> Hash {
        let d = digest(&SHA256, data);
        let mut raw = [0; 32];
        raw.copy_from_slice(d.as_ref());
        Hash { raw }
    }

    /// Build a hash from exactly 32 bytes in internal (little-endian) order.
    pub fn from_slice(slice: &[u8]) -> crate::Result<Hash> {
        let raw = <[u8; 32]>::try_from(slice)
            .map_err(|_| {
                Error::BadArgument(format!("hash must be 32 bytes, got {}", slice.len()))
            })?;
        Ok(Hash { raw })
    }

    /// The hash bytes in display order, most significant byte first.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut r = self.raw;
        r.reverse();
        r
    }
}

impl Encodable for Hash {
    fn from_binary(buffer: &mut dyn Buf) -> crate::Result<Self>
    where
        Self: Sized,
    {
        if buffer.remaining() < Self::SIZE as usize {
            Err(Error::DataTooSmall)
        } else {
            let mut raw = [0; 32];
            buffer.copy_to_slice(&mut raw);
            Ok(Self { raw })
        }
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> crate::Result<()> {
        buffer.put_slice(&self.raw);
        Ok(())
    }

    fn encoded_size(&self) -> u64 {
        Self::SIZE
    }
}

impl FromHex for Hash {
    type Error = Error;

    /// Parse 64 hex characters. The hex form is byte-reversed relative to the internal form.
    fn from_hex<T: AsRef<[u8]>>(hex: T) -> Result<Self, Self::Error> {
        let hex = hex.as_ref();
        if hex.len() != Hash::HEX_SIZE as usize {
            return Err(Error::BadArgument(format!(
                "Length of hex encoded hash must be 64. Len is {:}.",
                hex.len()
            )));
        }
        let mut bytes = hex::decode(hex)?;
        bytes.reverse();
        Hash::from_slice(&bytes)
    }
}

impl ToHex for Hash {
    fn encode_hex<T: FromIterator<char>>(&self) -> T {
        hex::encode(self.to_be_bytes()).chars().collect()
    }

    fn encode_hex_upper<T: FromIterator<char>>(&self) -> T {
        hex::encode_upper(self.to_be_bytes()).chars().collect()
    }
}

impl From<[u8; 32]> for Hash {
    fn from(value: [u8; 32]) -> Self {
        Hash { raw: value }
    }
}

impl From<Hash> for [u8; 32] {
    fn from(value: Hash) -> Self {
        value.raw
    }
}

impl Ord for Hash {
    /// Orders hashes the way their hex representations sort, comparing from the last raw byte.
    fn cmp(&self, other: &Hash) -> Ordering {
        self.raw.iter().rev().cmp(other.raw.iter().rev())
    }
}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Hash) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.encode_hex::<String>())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.encode_hex::<String>())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.encode_hex::<String>().as_ref())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn sha256d_test() {
        let x = hex!("0123456789abcdef");
        assert_eq!(
            hex::encode(Hash::sha256d(&x).raw),
            "137ad663f79da06e282ed0abbec4d70523ced5ff8e39d5c2e5641d978c5925aa"
        );
    }

    #[test]
    fn hash_decode() {
        assert!(Hash::from_hex(&"f".repeat(64)).is_ok());
        // 63 chars, 65 chars, non-hex
        assert!(Hash::from_hex(&"0".repeat(63)).is_err());
        assert!(Hash::from_hex(&"0".repeat(65)).is_err());
        assert!(Hash::from_hex(&format!("{}g", "0".repeat(63))).is_err());
    }

    #[test]
    fn ordering_follows_hex() {
        let lo = Hash::from_hex(&format!("0{}", "5".repeat(63))).unwrap();
        let hi = Hash::from_hex(&format!("{}0", "5".repeat(63))).unwrap();
        assert!(lo < hi);
        assert_eq!(hi.cmp(&hi), Ordering::Equal);
    }

    #[test]
    fn binary_is_reversed_hex() {
        let s = "684b2f7e73dec228a7bf9a73495eeb6a28f2cda66b7f8e1627fdff8922ec754f";
        let h = Hash::from_hex(s).unwrap();
        let mut v = Vec::new();
        h.to_binary(&mut v).unwrap();
        assert_eq!(v[0], 0x4f);
        assert_eq!(v[31], 0x68);
        let back = Hash::from_binary(&mut v.as_slice()).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn short_buffer_rejected() {
        let mut b: &[u8] = &[0u8; 31];
        assert!(matches!(Hash::from_binary(&mut b), Err(Error::DataTooSmall)));
    }

    #[test]
    fn json_is_hex_string() {
        let hex = "0000000000000000069347185643c805ff7e00fae025316393e34fa67274df4e";
        let hash = Hash::from_hex(hex).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hex));
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
