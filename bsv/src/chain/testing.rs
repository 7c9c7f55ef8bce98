//! Regtest block building for the chain tests.

use crate::bitcoin::pow::target_from_compact;
use crate::bitcoin::script::num::encode_num;
use crate::bitcoin::{Block, BlockHeader, Operation, Outpoint, Script, Tx, TxInput, TxOutput};

pub const REGTEST_BITS: u32 = 0x207fffff;

/// A coinbase paying 50 coins to `script`, made unique by `tag`.
pub fn coinbase(tag: i64, script: Script) -> Tx {
    Tx {
        version: 1,
        inputs: vec![TxInput::new(
            Outpoint::NULL,
            Script::from_chunks(&[Operation::push(encode_num(tag)), Operation::OP_0]),
        )],
        outputs: vec![TxOutput::new(50_0000_0000, script)],
        lock_time: 0,
    }
}

/// Build a block on `prev` and grind the nonce until it meets the regtest target.
pub fn mine(prev: &BlockHeader, txs: Vec<Tx>, timestamp: u32) -> Block {
    let mut block = Block::new(
        BlockHeader {
            version: 1,
            prev_hash: prev.hash(),
            merkle_root: Default::default(),
            timestamp,
            bits: REGTEST_BITS,
            nonce: 0,
        },
        txs,
    );
    if !block.txs.is_empty() {
        block.header.merkle_root = block.calculate_merkle_root().unwrap();
    }
    let limit = target_from_compact(REGTEST_BITS).unwrap();
    while block.header.check_proof_of_work(&limit).is_err() {
        block.header.nonce += 1;
    }
    block
}

/// `count` blocks on top of `prev`, each with its own coinbase. `tag` keeps branches apart.
pub fn mine_chain(prev: &BlockHeader, count: usize, tag: i64, timestamp: u32) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::with_capacity(count);
    let mut prev = prev.clone();
    for i in 0..count {
        let tx = coinbase(tag * 1000 + i as i64, Script::default());
        let block = mine(&prev, vec![tx], timestamp + i as u32);
        prev = block.header.clone();
        blocks.push(block);
    }
    blocks
}
