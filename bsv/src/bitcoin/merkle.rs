use crate::bitcoin::{Hash, MerkleRoot, TxHash};
use crate::{Error, Result};

/// Calculate the merkle root of a list of transaction hashes.
///
/// Pairs are hashed with double SHA256. A level with an odd count pairs its last hash with itself.
pub fn calculate_merkle_root(tx_hashes: &[TxHash]) -> Result<MerkleRoot> {
    if tx_hashes.is_empty() {
        return Err(Error::BadArgument(
            "Cannot calculate merkle root of empty transaction list".to_string(),
        ));
    }
    let mut level: Vec<Hash> = tx_hashes.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| hash_merkle_branches(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    Ok(level[0])
}

fn hash_merkle_branches(left: &Hash, right: &Hash) -> Hash {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(&left.raw);
    data[32..].copy_from_slice(&right.raw);
    Hash::sha256d(&data)
}
