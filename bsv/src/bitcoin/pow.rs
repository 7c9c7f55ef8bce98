//! Compact difficulty targets and chain work.

use crate::bitcoin::Hash;
use crate::{Error, Result};
use num::traits::{One, ToPrimitive, Zero};
use num::BigUint;

/// Expand the compact `bits` form into a full target.
///
/// Returns None for negative or overflowing encodings, which can never be satisfied.
pub fn target_from_compact(bits: u32) -> Option<BigUint> {
    let size = bits >> 24;
    let word = bits & 0x007f_ffff;
    if word != 0 && bits & 0x0080_0000 != 0 {
        return None;
    }
    let target = if size <= 3 {
        BigUint::from(word >> (8 * (3 - size)))
    } else {
        BigUint::from(word) << (8 * (size - 3) as usize)
    };
    if target.bits() > 256 {
        None
    } else {
        Some(target)
    }
}

/// Encode a target in compact form, the inverse of [target_from_compact] up to precision loss.
pub fn target_to_compact(target: &BigUint) -> u32 {
    let mut size = target.bits().div_ceil(8) as u32;
    let mut compact = if size <= 3 {
        (target.to_u64().unwrap_or(0) << (8 * (3 - size))) as u32
    } else {
        (target >> (8 * (size - 3) as usize)).to_u32().unwrap_or(0)
    };
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Expected number of hashes to find a block at this target: 2^256 / (target + 1).
pub fn work_from_compact(bits: u32) -> BigUint {
    match target_from_compact(bits) {
        Some(target) if !target.is_zero() => (BigUint::one() << 256usize) / (target + 1u32),
        _ => BigUint::zero(),
    }
}

/// The hash read as a 256-bit little-endian number.
pub fn hash_to_uint(hash: &Hash) -> BigUint {
    BigUint::from_bytes_le(&hash.raw)
}

/// Check that `hash` satisfies `bits` and that `bits` is no easier than `pow_limit`.
pub fn check_proof_of_work(hash: &Hash, bits: u32, pow_limit: &BigUint) -> Result<()> {
    let target = target_from_compact(bits)
        .ok_or_else(|| Error::Verification(format!("invalid difficulty bits {:#010x}", bits)))?;
    if target.is_zero() || &target > pow_limit {
        return Err(Error::Verification(format!(
            "difficulty target out of range {:#010x}",
            bits
        )));
    }
    if hash_to_uint(hash) > target {
        return Err(Error::Verification(format!(
            "hash {} is higher than target {:#010x}",
            hash, bits
        )));
    }
    Ok(())
}
