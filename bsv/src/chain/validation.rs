//! Block rules: checks that need nothing but the block, and checks against its predecessors.

use crate::bitcoin::pow::{target_from_compact, target_to_compact};
use crate::bitcoin::script::{ScriptInterpreter, TxContext, VerifyFlags};
use crate::bitcoin::{Block, BlockHeader, ChainParams, Outpoint, TxOutput};
use crate::chain::{BlockStore, OutputSource, StoredBlock};
use crate::{Error, Result};
use num::BigUint;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// How far into the future a block timestamp may be.
pub const MAX_FUTURE_BLOCK_TIME: u32 = 2 * 60 * 60;

/// Check everything that can be checked without knowing where the block sits in the chain.
///
/// Header-only blocks pass after the header checks.
pub fn verify_block(block: &Block, params: &ChainParams, now: u32) -> Result<()> {
    let header = &block.header;
    header.check_proof_of_work(&params.pow_limit())?;
    if header.timestamp > now.saturating_add(MAX_FUTURE_BLOCK_TIME) {
        return Err(Error::Verification(format!(
            "block {} timestamp {} too far in the future",
            block.hash(),
            header.timestamp
        )));
    }
    if block.is_header_only() {
        return Ok(());
    }

    if !block.txs[0].is_coinbase() {
        return Err(Error::Verification("first transaction is not a coinbase".to_string()));
    }
    if block.txs.iter().skip(1).any(|tx| tx.is_coinbase()) {
        return Err(Error::Verification("more than one coinbase".to_string()));
    }
    let merkle_root = block.calculate_merkle_root()?;
    if merkle_root != header.merkle_root {
        return Err(Error::Verification(format!(
            "merkle root mismatch, header {} calculated {}",
            header.merkle_root, merkle_root
        )));
    }

    let mut spent = HashSet::new();
    for tx in block.txs.iter() {
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(Error::Verification(format!(
                "transaction {} has no inputs or outputs",
                tx.hash()
            )));
        }
        if tx.total_output_value().is_none() {
            return Err(Error::Verification(format!(
                "transaction {} output value overflows",
                tx.hash()
            )));
        }
        if tx.is_coinbase() {
            continue;
        }
        for input in tx.inputs.iter() {
            if !spent.insert(input.outpoint) {
                return Err(Error::Verification(format!(
                    "outpoint {}:{} spent twice in block",
                    input.outpoint.tx_hash, input.outpoint.index
                )));
            }
        }
    }
    Ok(())
}

/// Check the difficulty `header` claims against the chain it extends.
///
/// Between retargets the bits must not change, except on networks that allow min-difficulty
/// blocks. At a retarget the new target is the previous one scaled by how long the last interval
/// took. When the first block of the interval is not in the store the check is skipped.
pub async fn check_difficulty_transition(
    store: &dyn BlockStore,
    prev: &StoredBlock,
    header: &BlockHeader,
    params: &ChainParams,
) -> Result<()> {
    if params.no_retargeting {
        return Ok(());
    }
    let height = prev.height + 1;
    if height % params.interval != 0 {
        if params.allow_min_difficulty || header.bits == prev.header.bits {
            return Ok(());
        }
        return Err(Error::Verification(format!(
            "unexpected change in difficulty at height {}: {:#010x} after {:#010x}",
            height, header.bits, prev.header.bits
        )));
    }

    let mut cursor = prev.clone();
    for _ in 0..params.interval - 1 {
        match store.get(&cursor.header.prev_hash).await? {
            Some(b) => cursor = b,
            None => {
                debug!(height, "start of difficulty interval not stored, skipping retarget check");
                return Ok(());
            }
        }
    }

    let target_timespan = params.target_timespan as i64;
    let timespan = (prev.header.timestamp as i64 - cursor.header.timestamp as i64)
        .clamp(target_timespan / 4, target_timespan * 4);
    let prev_target = target_from_compact(prev.header.bits).ok_or_else(|| {
        Error::Verification(format!("invalid difficulty bits {:#010x}", prev.header.bits))
    })?;
    let mut target =
        prev_target * BigUint::from(timespan as u64) / BigUint::from(target_timespan as u64);
    let limit = params.pow_limit();
    if target > limit {
        target = limit;
    }
    let expected = target_to_compact(&target);
    if expected != header.bits {
        return Err(Error::Verification(format!(
            "difficulty at height {} should be {:#010x}, block has {:#010x}",
            height, expected, header.bits
        )));
    }
    Ok(())
}

/// Run the scripts of every input whose spent output can be found, in this block or through
/// `source`.
///
/// When every input of a transaction was resolved, its inputs must also cover its outputs.
pub fn verify_scripts(
    block: &Block,
    source: &dyn OutputSource,
    interpreter: &ScriptInterpreter,
    flags: VerifyFlags,
) -> Result<()> {
    let mut created: HashMap<Outpoint, TxOutput> = HashMap::new();
    for tx in block.txs.iter() {
        let tx_hash = tx.hash();
        if !tx.is_coinbase() {
            let mut input_value = Some(0u64);
            for (index, input) in tx.inputs.iter().enumerate() {
                let spent = created
                    .get(&input.outpoint)
                    .cloned()
                    .or_else(|| source.get(&input.outpoint));
                let Some(spent) = spent else {
                    input_value = None;
                    continue;
                };
                input_value = input_value.and_then(|v| v.checked_add(spent.value));
                let ctx = TxContext::new(tx, index);
                if let Err(e) = interpreter.execute(&ctx, &input.script, &spent.script, flags) {
                    warn!(tx = %tx_hash, input = index, error = %e, "script verification failed");
                    return Err(Error::Script(e));
                }
            }
            if let (Some(inputs), Some(outputs)) = (input_value, tx.total_output_value()) {
                if inputs < outputs {
                    return Err(Error::Verification(format!(
                        "transaction {} spends {} but its inputs hold {}",
                        tx_hash, outputs, inputs
                    )));
                }
            }
        }
        for (index, output) in tx.outputs.iter().enumerate() {
            created.insert(Outpoint::new(tx_hash, index as u32), output.clone());
        }
    }
    Ok(())
}
