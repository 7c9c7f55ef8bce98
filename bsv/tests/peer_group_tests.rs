mod common;

use async_trait::async_trait;
use bitcoinsv_spv::bitcoin::{Block, BlockHash, Script, Tx, TxOutput};
use bitcoinsv_spv::chain::{BlockStore, MemoryBlockStore, StoredBlock};
use bitcoinsv_spv::p2p::{DownloadProgress, Message, PeerGroup, PeerGroupConfig, PeerGroupState};
use bitcoinsv_spv::{Error, Result};
use common::helpers::{
    chain_with_store, coinbase, eventually, init_test_logging, mine_chain, regtest_chain,
    regtest_params,
};
use common::remote::FakeNode;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

fn group_config(max_connections: usize) -> PeerGroupConfig {
    let mut config = PeerGroupConfig::default(bitcoinsv_spv::bitcoin::BlockchainId::Regtest);
    config.max_connections = max_connections;
    config.connection_delay = Duration::from_millis(10);
    config.peer.connect_timeout = Duration::from_secs(2);
    config.peer.handshake_timeout = Duration::from_secs(2);
    config
}

async fn wait_for_peers(group: &PeerGroup, count: usize) {
    eventually("peers to connect", move || async move {
        group.peer_count().await.unwrap() == count
    })
    .await;
}

#[tokio::test]
async fn downloads_chain_from_peers() {
    init_test_logging();
    let params = regtest_params();
    let blocks = mine_chain(&params.genesis, 5, 1);
    let a = FakeNode::start(params.genesis_hash(), blocks.clone()).await;
    let b = FakeNode::start(params.genesis_hash(), blocks.clone()).await;

    let chain = regtest_chain().await;
    let mut config = group_config(4);
    config.initial_addresses = vec![a.address, b.address];
    let (group, join) = PeerGroup::new(config, chain.clone());
    group.start().await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), group.download_block_chain())
        .await
        .expect("download did not finish")
        .unwrap();
    assert_eq!(chain.best_height().await, 5);
    assert_eq!(chain.chain_head().await.hash(), blocks[4].hash());
    wait_for_peers(&group, 2).await;

    group.stop().await;
    assert!(join.await.unwrap().is_ok());
}

#[tokio::test]
async fn connections_are_capped() {
    init_test_logging();
    let genesis = regtest_params().genesis_hash();
    let nodes = vec![
        FakeNode::start(genesis, vec![]).await,
        FakeNode::start(genesis, vec![]).await,
        FakeNode::start(genesis, vec![]).await,
    ];
    let (group, join) = PeerGroup::new(group_config(2), regtest_chain().await);
    for node in &nodes {
        group.add_address(node.address).await.unwrap();
    }
    group.start().await.unwrap();
    wait_for_peers(&group, 2).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(group.peer_count().await.unwrap(), 2);
    assert_eq!(nodes.iter().map(|n| n.live_connections()).sum::<usize>(), 2);

    group.stop().await;
    assert!(join.await.unwrap().is_ok());
}

#[tokio::test]
async fn stop_closes_every_connection() {
    init_test_logging();
    let genesis = regtest_params().genesis_hash();
    let mut nodes = Vec::new();
    for _ in 0..4 {
        nodes.push(FakeNode::start(genesis, vec![]).await);
    }
    let mut config = group_config(4);
    config.initial_addresses = nodes.iter().map(|n| n.address).collect();
    let (group, join) = PeerGroup::new(config, regtest_chain().await);
    group.start().await.unwrap();
    wait_for_peers(&group, 4).await;
    let peers = group.connected_peers().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), group.stop()).await.unwrap();
    assert_eq!(group.state(), PeerGroupState::Stopped);
    assert!(join.await.unwrap().is_ok());
    for peer in &peers {
        assert!(!peer.is_running());
    }
    let nodes = &nodes;
    eventually("sockets to close", move || async move {
        nodes.iter().all(|n| n.live_connections() == 0)
    })
    .await;
    assert!(group.peer_count().await.is_err());
}

#[tokio::test]
async fn broadcast_reaches_every_peer() {
    init_test_logging();
    let genesis = regtest_params().genesis_hash();
    let mut a = FakeNode::start(genesis, vec![]).await;
    let mut b = FakeNode::start(genesis, vec![]).await;
    let mut config = group_config(4);
    config.initial_addresses = vec![a.address, b.address];
    let (group, join) = PeerGroup::new(config, regtest_chain().await);
    group.start().await.unwrap();
    wait_for_peers(&group, 2).await;

    let tx = coinbase(77);
    assert!(group.broadcast_transaction(tx.clone()).await.unwrap());
    for node in [&mut a, &mut b] {
        let msg = node.wait_for(|m| matches!(m, Message::Tx(_))).await;
        assert_eq!(msg, Message::Tx(tx.clone()));
    }

    group.stop().await;
    assert!(join.await.unwrap().is_ok());
}

#[tokio::test]
async fn download_moves_on_when_download_peer_dies() {
    init_test_logging();
    let params = regtest_params();
    let genesis = params.genesis_hash();
    let blocks = mine_chain(&params.genesis, 3, 1);
    // claims a longer chain, so it is picked first, but never sends any blocks
    let mut silent = FakeNode::muted(genesis, mine_chain(&params.genesis, 10, 2)).await;
    let helpful = FakeNode::start(genesis, blocks.clone()).await;

    let chain = regtest_chain().await;
    let mut config = group_config(4);
    config.initial_addresses = vec![silent.address];
    let (group, join) = PeerGroup::new(config, chain.clone());
    let progress = Arc::new(DownloadProgress::new());
    group.start_block_chain_download(progress.clone()).await.unwrap();
    group.start().await.unwrap();

    silent.wait_for(|m| matches!(m, Message::GetBlocks(_))).await;
    assert_eq!(progress.blocks_left(), Some(10));
    group.add_address(helpful.address).await.unwrap();
    wait_for_peers(&group, 2).await;
    silent.kill();

    tokio::time::timeout(Duration::from_secs(10), progress.wait())
        .await
        .expect("download did not resume");
    assert_eq!(chain.chain_head().await.hash(), blocks[2].hash());

    group.stop().await;
    assert!(join.await.unwrap().is_ok());
}

// A transaction of roughly `size` bytes.
fn large_tx(size: usize) -> Tx {
    let mut tx = coinbase(5);
    tx.outputs.push(TxOutput::new(0, Script::new(vec![0x6a; size])));
    tx
}

#[tokio::test]
async fn stop_completes_when_a_peer_stops_reading() {
    init_test_logging();
    let node = FakeNode::stalled(regtest_params().genesis_hash()).await;
    let mut config = group_config(4);
    config.peer.command_channel_size = 1;
    config.initial_addresses = vec![node.address];
    let (group, join) = PeerGroup::new(config, regtest_chain().await);
    group.start().await.unwrap();
    wait_for_peers(&group, 1).await;

    let tx = large_tx(4_000_000);
    let broadcasts = join_all((0..40).map(|_| group.broadcast_transaction(tx.clone())));
    let results = tokio::time::timeout(Duration::from_secs(5), broadcasts)
        .await
        .expect("broadcast waited on the peer");
    assert!(results.iter().all(|r| r.is_ok()));

    tokio::time::timeout(Duration::from_secs(5), group.stop())
        .await
        .expect("stop waited on the peer");
    assert_eq!(group.state(), PeerGroupState::Stopped);
    assert!(join.await.unwrap().is_ok());
}

// Reads work, writes fail.
struct ReadOnlyStore(MemoryBlockStore);

#[async_trait]
impl BlockStore for ReadOnlyStore {
    async fn get(&self, hash: &BlockHash) -> Result<Option<StoredBlock>> {
        self.0.get(hash).await
    }
    async fn put(&self, _block: StoredBlock) -> Result<()> {
        Err(Error::BlockStore("read-only".to_string()))
    }
    async fn get_block(&self, hash: &BlockHash) -> Result<Option<Block>> {
        self.0.get_block(hash).await
    }
    async fn put_block(&self, _block: &Block) -> Result<()> {
        Err(Error::BlockStore("read-only".to_string()))
    }
    async fn chain_head(&self) -> Result<StoredBlock> {
        self.0.chain_head().await
    }
    async fn set_chain_head(&self, _head: &StoredBlock) -> Result<()> {
        Err(Error::BlockStore("read-only".to_string()))
    }
}

#[tokio::test]
async fn store_failure_stops_group() {
    init_test_logging();
    let params = regtest_params();
    let node = FakeNode::start(params.genesis_hash(), mine_chain(&params.genesis, 2, 1)).await;
    let chain = chain_with_store(Arc::new(ReadOnlyStore(MemoryBlockStore::new(&params)))).await;

    let mut config = group_config(4);
    config.initial_addresses = vec![node.address];
    let (group, join) = PeerGroup::new(config, chain.clone());
    group.start().await.unwrap();
    group.start_block_chain_download(Arc::new(DownloadProgress::new())).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), join)
        .await
        .expect("group kept running")
        .unwrap();
    assert!(matches!(result, Err(Error::BlockStore(_))));
    assert_eq!(group.state(), PeerGroupState::Stopped);
    assert_eq!(chain.best_height().await, 0);
    let node = &node;
    eventually("sockets to close", move || async move { node.live_connections() == 0 }).await;
}
