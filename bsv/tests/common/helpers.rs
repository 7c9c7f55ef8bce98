use bitcoinsv_spv::bitcoin::pow::target_from_compact;
use bitcoinsv_spv::bitcoin::script::ScriptBuilder;
use bitcoinsv_spv::bitcoin::{
    Block, BlockHeader, BlockchainId, ChainParams, Outpoint, Script, Tx, TxInput, TxOutput,
};
use bitcoinsv_spv::chain::{BlockChain, BlockStore, MemoryBlockStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const T0: u32 = 1_700_000_000;

/// Initialize test logging. Safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::DEBUG.into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn regtest_params() -> ChainParams {
    ChainParams::for_chain(BlockchainId::Regtest)
}

pub async fn regtest_chain() -> Arc<BlockChain> {
    let params = regtest_params();
    let store = Arc::new(MemoryBlockStore::new(&params));
    chain_with_store(store).await
}

pub async fn chain_with_store(store: Arc<dyn BlockStore>) -> Arc<BlockChain> {
    Arc::new(BlockChain::new(regtest_params(), store).await.unwrap())
}

/// A coinbase made unique by `tag`.
pub fn coinbase(tag: i64) -> Tx {
    Tx {
        version: 1,
        inputs: vec![TxInput::new(
            Outpoint::NULL,
            ScriptBuilder::new().push_int(tag).push_int(0).build(),
        )],
        outputs: vec![TxOutput::new(50_0000_0000, Script::default())],
        lock_time: 0,
    }
}

/// `count` regtest blocks on top of `prev`.
pub fn mine_chain(prev: &BlockHeader, count: usize, tag: i64) -> Vec<Block> {
    let limit = target_from_compact(prev.bits).unwrap();
    let mut prev = prev.clone();
    let mut blocks = Vec::with_capacity(count);
    for i in 0..count {
        let mut block = Block::new(
            BlockHeader {
                version: 1,
                prev_hash: prev.hash(),
                merkle_root: Default::default(),
                timestamp: T0 + i as u32,
                bits: prev.bits,
                nonce: 0,
            },
            vec![coinbase(tag * 1000 + i as i64 + 1000)],
        );
        block.header.merkle_root = block.calculate_merkle_root().unwrap();
        while block.header.check_proof_of_work(&limit).is_err() {
            block.header.nonce += 1;
        }
        prev = block.header.clone();
        blocks.push(block);
    }
    blocks
}

/// Poll `check` until it returns true, panicking after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
