// The live tests need a real node. Set BSV_TEST_NODE to run them, for example:
// BSV_TEST_NODE=192.168.1.100:8333 cargo test --test p2p_integration_tests

mod common;

use bitcoinsv_spv::bitcoin::BlockchainId;
use bitcoinsv_spv::p2p::{ConnectionState, DownloadProgress, Message, PeerConfig, PeerConnection};
use common::config::{test_network, test_node_address, test_timeout_secs};
use common::helpers::{init_test_logging, mine_chain, regtest_chain, regtest_params};
use common::remote::FakeNode;
use std::sync::Arc;
use std::time::Duration;

fn blockchain_for(network: &str) -> BlockchainId {
    match network {
        "test" | "testnet" => BlockchainId::Test,
        "stn" => BlockchainId::Stn,
        "regtest" => BlockchainId::Regtest,
        _ => BlockchainId::Main,
    }
}

#[tokio::test]
async fn handshake_with_real_node() {
    init_test_logging();
    let Some(address) = test_node_address() else {
        eprintln!("skipping: BSV_TEST_NODE not set");
        return;
    };
    let blockchain = blockchain_for(&test_network());
    let params = bitcoinsv_spv::bitcoin::ChainParams::for_chain(blockchain);
    let store = Arc::new(bitcoinsv_spv::chain::MemoryBlockStore::new(&params));
    let chain = Arc::new(bitcoinsv_spv::chain::BlockChain::new(params, store).await.unwrap());
    let mut config = PeerConfig::default(blockchain);
    config.connect_timeout = Duration::from_secs(test_timeout_secs());
    config.handshake_timeout = Duration::from_secs(test_timeout_secs());

    let (peer, task) = PeerConnection::spawn(address, Arc::new(config), chain).await.unwrap();
    tracing::info!(peer = ?peer.info(), "connected to test node");
    assert_eq!(peer.state(), ConnectionState::Running);
    assert!(peer.info().start_height > 0);

    peer.disconnect();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn chain_download_from_local_node() {
    init_test_logging();
    let params = regtest_params();
    let blocks = mine_chain(&params.genesis, 4, 1);
    let mut node = FakeNode::start(params.genesis_hash(), blocks.clone()).await;
    let chain = regtest_chain().await;

    let config = Arc::new(PeerConfig::default(BlockchainId::Regtest));
    let (peer, task) = PeerConnection::spawn(node.address, config, chain.clone()).await.unwrap();
    assert_eq!(peer.info().start_height, 4);
    let progress = Arc::new(DownloadProgress::new());
    peer.start_block_chain_download(progress.clone()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), progress.wait()).await.unwrap();
    assert_eq!(chain.chain_head().await.hash(), blocks[3].hash());

    // an explicitly requested block comes back through the request
    let request = peer.get_block(blocks[1].hash()).await.unwrap();
    assert_eq!(request.await.unwrap(), blocks[1]);

    peer.send(Message::Ping(3)).await.unwrap();
    node.wait_for(|m| *m == Message::Ping(3)).await;

    node.kill();
    assert!(task.await.unwrap().is_err());
    assert_eq!(peer.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn long_chain_downloads_in_batches() {
    init_test_logging();
    let params = regtest_params();
    // more than one inv batch, so the download needs the continuation round trip
    let blocks = mine_chain(&params.genesis, 620, 1);
    let mut node = FakeNode::start(params.genesis_hash(), blocks.clone()).await;
    let chain = regtest_chain().await;

    let config = Arc::new(PeerConfig::default(BlockchainId::Regtest));
    let (peer, task) = PeerConnection::spawn(node.address, config, chain.clone()).await.unwrap();
    let progress = Arc::new(DownloadProgress::new());
    peer.start_block_chain_download(progress.clone()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(60), progress.wait())
        .await
        .expect("download did not finish");
    assert_eq!(chain.best_height().await, 620);
    assert_eq!(chain.chain_head().await.hash(), blocks[619].hash());

    // the first getblocks is followed by a second one once the tip has been announced
    node.wait_for(|m| matches!(m, Message::GetBlocks(_))).await;
    node.wait_for(|m| matches!(m, Message::GetBlocks(_))).await;

    peer.disconnect();
    assert!(task.await.unwrap().is_ok());
}
