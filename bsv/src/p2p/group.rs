use crate::bitcoin::Tx;
use crate::chain::BlockChain;
use crate::p2p::config::{PeerConfig, PeerGroupConfig, ACTOR_CHANNEL_SIZE};
use crate::p2p::connection::PeerConnection;
use crate::p2p::events::{DownloadListener, DownloadProgress, PeerEvent};
use crate::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerGroupState {
    /// Created, not yet connecting.
    Idle,
    Running,
    Stopping,
    Stopped,
}

enum GroupCommand {
    AddAddress(SocketAddr),
    Start,
    Broadcast { tx: Tx, reply: oneshot::Sender<bool> },
    StartDownload(Arc<dyn DownloadListener>),
    ConnectedPeers { reply: oneshot::Sender<Vec<PeerConnection>> },
}

/// Keeps up to `max_connections` peers connected and drives the block chain download through one
/// of them.
///
/// Addresses wait in a queue. Every `connection_delay` the supervisor takes the next one and
/// connects to it if a slot is free. When a connection ends, for whatever reason, its address goes
/// to the back of the queue so every other address is tried before it is retried.
///
/// The PeerGroup struct is a handle to an actor running on its own tokio task. A block store
/// failure in any connection stops the actor.
#[derive(Clone)]
pub struct PeerGroup {
    sender: mpsc::Sender<GroupCommand>,
    cancel: CancellationToken,
    state: watch::Receiver<PeerGroupState>,
}

impl PeerGroup {
    /// Create a new PeerGroup.
    ///
    /// Returns the handle and the join handle of the actor, which finishes after
    /// [stop()](Self::stop) or with the error that made it stop.
    pub fn new(
        config: PeerGroupConfig,
        chain: Arc<BlockChain>,
    ) -> (PeerGroup, JoinHandle<Result<()>>) {
        let (sender, inbox) = mpsc::channel(ACTOR_CHANNEL_SIZE);
        let (state_tx, state_rx) = watch::channel(PeerGroupState::Idle);
        let (events_tx, events_rx) = mpsc::channel(ACTOR_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let actor = PeerGroupActor {
            inbox,
            addresses: config.initial_addresses.iter().copied().collect(),
            peer_config: Arc::new(config.peer.clone()),
            config,
            chain,
            cancel: cancel.clone(),
            state: state_tx,
            tasks: JoinSet::new(),
            peers: HashMap::new(),
            events_tx,
            events_rx,
            download_listener: None,
            download_peer: None,
        };
        let handle = PeerGroup {
            sender,
            cancel,
            state: state_rx,
        };
        (handle, tokio::spawn(actor.run()))
    }

    /// Queue an address to connect to.
    pub async fn add_address(&self, address: SocketAddr) -> Result<()> {
        self.command(GroupCommand::AddAddress(address)).await
    }

    /// Start connecting to peers.
    pub async fn start(&self) -> Result<()> {
        self.command(GroupCommand::Start).await
    }

    /// Stop the group and wait until every connection is closed.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == PeerGroupState::Stopped).await;
    }

    pub fn state(&self) -> PeerGroupState {
        *self.state.borrow()
    }

    /// Send `tx` to every connected peer. True if at least one send succeeded.
    pub async fn broadcast_transaction(&self, tx: Tx) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.command(GroupCommand::Broadcast { tx, reply }).await?;
        Ok(rx.await?)
    }

    /// Download the block chain from one of the peers, now or as soon as one is connected.
    pub async fn start_block_chain_download(
        &self,
        listener: Arc<dyn DownloadListener>,
    ) -> Result<()> {
        self.command(GroupCommand::StartDownload(listener)).await
    }

    /// Download the block chain and wait until it is done.
    pub async fn download_block_chain(&self) -> Result<()> {
        let progress = Arc::new(DownloadProgress::new());
        self.start_block_chain_download(progress.clone()).await?;
        let mut state = self.state.clone();
        tokio::select! {
            _ = progress.wait() => Ok(()),
            _ = state.wait_for(|s| *s == PeerGroupState::Stopped) => {
                Err(Error::Internal("peer group stopped during download".to_string()))
            }
        }
    }

    pub async fn connected_peers(&self) -> Result<Vec<PeerConnection>> {
        let (reply, rx) = oneshot::channel();
        self.command(GroupCommand::ConnectedPeers { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn peer_count(&self) -> Result<usize> {
        Ok(self.connected_peers().await?.len())
    }

    async fn command(&self, command: GroupCommand) -> Result<()> {
        self.sender.send(command).await.map_err(|_| Error::ChannelSendError)
    }
}

// What a connection task hands back to the supervisor when it ends.
struct PeerExit {
    address: SocketAddr,
    peer: Option<Uuid>,
    result: Result<()>,
}

struct PeerGroupActor {
    inbox: mpsc::Receiver<GroupCommand>,
    config: PeerGroupConfig,
    peer_config: Arc<PeerConfig>,
    chain: Arc<BlockChain>,
    cancel: CancellationToken,
    state: watch::Sender<PeerGroupState>,
    addresses: VecDeque<SocketAddr>,
    /// One task per connection, never more than `max_connections`.
    tasks: JoinSet<PeerExit>,
    peers: HashMap<Uuid, PeerConnection>,
    events_tx: mpsc::Sender<PeerEvent>,
    events_rx: mpsc::Receiver<PeerEvent>,
    download_listener: Option<Arc<dyn DownloadListener>>,
    download_peer: Option<Uuid>,
}

impl PeerGroupActor {
    async fn run(mut self) -> Result<()> {
        let result = self.supervise().await;
        self.shutdown().await;
        result
    }

    async fn supervise(&mut self) -> Result<()> {
        let mut next_attempt = Instant::now();
        loop {
            let can_connect = *self.state.borrow() == PeerGroupState::Running
                && !self.addresses.is_empty()
                && self.tasks.len() < self.config.max_connections;
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                Some(command) = self.inbox.recv() => self.on_command(command),
                Some(event) = self.events_rx.recv() => self.on_event(event),
                Some(joined) = self.tasks.join_next() => self.on_exit(joined)?,
                _ = sleep_until(next_attempt), if can_connect => {
                    self.connect_next();
                    next_attempt = Instant::now() + self.config.connection_delay;
                }
            }
        }
    }

    fn on_command(&mut self, command: GroupCommand) {
        match command {
            GroupCommand::AddAddress(address) => self.queue_address(address),
            GroupCommand::Start => {
                if *self.state.borrow() == PeerGroupState::Idle {
                    info!(addresses = self.addresses.len(), "starting peer group");
                    self.state.send_replace(PeerGroupState::Running);
                }
            }
            GroupCommand::Broadcast { tx, reply } => {
                let _ = reply.send(self.broadcast(tx));
            }
            GroupCommand::StartDownload(listener) => {
                self.download_listener = Some(listener);
                self.select_download_peer();
            }
            GroupCommand::ConnectedPeers { reply } => {
                let _ = reply.send(self.peers.values().cloned().collect());
            }
        }
    }

    fn on_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Ready(peer) => {
                if !peer.is_running() {
                    return;
                }
                debug!(peer = %peer.address(), peers = self.peers.len() + 1, "peer connected");
                self.peers.insert(peer.info().id, peer);
                self.select_download_peer();
            }
            PeerEvent::Addresses { peer, addresses } => {
                if !self.config.use_discovered_addresses {
                    return;
                }
                debug!(peer = %peer, count = addresses.len(), "queueing discovered addresses");
                for address in addresses {
                    self.queue_address(address);
                }
            }
        }
    }

    fn on_exit(&mut self, joined: std::result::Result<PeerExit, JoinError>) -> Result<()> {
        let exit = match joined {
            Ok(exit) => exit,
            Err(e) => {
                // the address of a panicked task is lost
                error!(error = %e, "peer task failed");
                return Ok(());
            }
        };
        self.addresses.push_back(exit.address);
        if let Some(id) = exit.peer {
            self.peers.remove(&id);
            if self.download_peer == Some(id) {
                info!(peer = %exit.address, "download peer lost");
                self.download_peer = None;
                self.select_download_peer();
            }
        }
        match exit.result {
            Ok(()) => debug!(peer = %exit.address, "peer disconnected"),
            Err(e) if e.is_fatal_to_group() => {
                error!(
                    peer = %exit.address,
                    error = %e,
                    "block store failure, stopping peer group"
                );
                return Err(e);
            }
            Err(e) => debug!(peer = %exit.address, error = %e, "peer connection ended"),
        }
        Ok(())
    }

    fn queue_address(&mut self, address: SocketAddr) {
        let known = self.addresses.contains(&address)
            || self.peers.values().any(|p| p.address() == address);
        if !known {
            self.addresses.push_back(address);
        }
    }

    fn connect_next(&mut self) {
        let Some(address) = self.addresses.pop_front() else {
            return;
        };
        debug!(peer = %address, "trying peer");
        let config = self.peer_config.clone();
        let chain = self.chain.clone();
        let events = self.events_tx.clone();
        self.tasks.spawn(async move {
            match PeerConnection::connect(address, config, chain).await {
                Ok((peer, task)) => {
                    let id = peer.info().id;
                    let _ = events.send(PeerEvent::Ready(peer)).await;
                    PeerExit {
                        address,
                        peer: Some(id),
                        result: task.with_events(events).run().await,
                    }
                }
                Err(e) => PeerExit {
                    address,
                    peer: None,
                    result: Err(e),
                },
            }
        });
    }

    /// Hand the download to a connected peer if one is wanted and none is doing it.
    ///
    /// The actor never waits on a peer: a peer whose command queue is full is disconnected, and
    /// the download moves on when its exit is seen.
    fn select_download_peer(&mut self) {
        let Some(listener) = self.download_listener.clone() else {
            return;
        };
        if self.download_peer.is_some() {
            return;
        }
        let candidate = self
            .peers
            .values()
            .filter(|p| p.is_running())
            .max_by_key(|p| p.info().start_height)
            .cloned();
        let Some(peer) = candidate else {
            return;
        };
        match peer.try_start_block_chain_download(listener) {
            Ok(()) => {
                info!(
                    peer = %peer.address(),
                    height = peer.info().start_height,
                    "selected download peer"
                );
                self.download_peer = Some(peer.info().id);
            }
            Err(e) => {
                warn!(peer = %peer.address(), error = %e, "could not start download");
                peer.disconnect();
            }
        }
    }

    fn broadcast(&self, tx: Tx) -> bool {
        let hash = tx.hash();
        let mut sent = false;
        for peer in self.peers.values() {
            match peer.try_broadcast_transaction(tx.clone()) {
                Ok(()) => sent = true,
                Err(e) => {
                    warn!(peer = %peer.address(), tx = %hash, error = %e, "broadcast failed");
                    // a peer that cannot keep up is dropped rather than waited on
                    if matches!(e, Error::PeerBusy) {
                        peer.disconnect();
                    }
                }
            }
        }
        debug!(tx = %hash, peers = self.peers.len(), sent, "broadcast transaction");
        sent
    }

    async fn shutdown(&mut self) {
        self.state.send_replace(PeerGroupState::Stopping);
        for peer in self.peers.values() {
            peer.disconnect();
        }
        // aborts connection attempts and receive loops alike
        self.tasks.shutdown().await;
        self.peers.clear();
        self.state.send_replace(PeerGroupState::Stopped);
        info!("peer group stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::{BlockchainId, ChainParams};
    use crate::chain::MemoryBlockStore;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn regtest_chain() -> Arc<BlockChain> {
        let params = ChainParams::for_chain(BlockchainId::Regtest);
        let store = Arc::new(MemoryBlockStore::new(&params));
        Arc::new(BlockChain::new(params, store).await.unwrap())
    }

    fn config() -> PeerGroupConfig {
        let mut config = PeerGroupConfig::default(BlockchainId::Regtest);
        config.connection_delay = Duration::from_millis(10);
        config.peer.connect_timeout = Duration::from_secs(1);
        config
    }

    #[tokio::test]
    async fn start_and_stop_without_peers() {
        let (group, join) = PeerGroup::new(config(), regtest_chain().await);
        assert_eq!(group.state(), PeerGroupState::Idle);
        group.start().await.unwrap();
        assert_eq!(group.peer_count().await.unwrap(), 0);
        assert_eq!(group.state(), PeerGroupState::Running);
        let tx = crate::chain::testing::coinbase(1, Default::default());
        assert!(!group.broadcast_transaction(tx).await.unwrap());

        group.stop().await;
        assert_eq!(group.state(), PeerGroupState::Stopped);
        assert!(join.await.unwrap().is_ok());
        assert!(group.start().await.is_err());
    }

    #[tokio::test]
    async fn unreachable_addresses_are_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let (group, join) = PeerGroup::new(config(), regtest_chain().await);
        group.add_address(address).await.unwrap();
        group.add_address(address).await.unwrap();
        group.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(group.peer_count().await.unwrap(), 0);
        assert_eq!(group.state(), PeerGroupState::Running);

        tokio::time::timeout(Duration::from_secs(5), group.stop()).await.unwrap();
        assert!(join.await.unwrap().is_ok());
    }
}
