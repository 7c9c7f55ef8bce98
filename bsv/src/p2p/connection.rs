use crate::bitcoin::{Block, BlockHash, Hash, Tx, TxHash};
use crate::chain::BlockChain;
use crate::p2p::config::PeerConfig;
use crate::p2p::events::{DownloadListener, PeerEvent};
use crate::p2p::framer::MessageFramer;
use crate::p2p::handshake::{self, HandshakeState};
use crate::p2p::message::{
    GetBlocksMessage, InvType, Inventory, Message, TimestampedAddress, VersionMessage,
};
use crate::p2p::peer::{ConnectionState, PeerInfo};
use crate::p2p::pending::{PendingRequest, PendingTable, Waiter};
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

// Bound on flushing queued messages when the connection closes.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

enum Command {
    Send(Message),
    GetBlock(BlockHash, Waiter<Block>),
    GetTransaction(TxHash, Waiter<Tx>),
    StartDownload(Arc<dyn DownloadListener>),
}

/// Handle to a connection with one remote peer.
///
/// The connection itself is driven by a [ConnectionTask]. Handles are cheap to clone, and all of
/// them stop working once the task has ended.
#[derive(Clone)]
pub struct PeerConnection {
    info: Arc<PeerInfo>,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl PeerConnection {
    /// Open a TCP connection to `addr` and complete the handshake.
    ///
    /// Nothing is read from the peer after the handshake until the returned task is run.
    pub async fn connect(
        addr: SocketAddr,
        config: Arc<PeerConfig>,
        chain: Arc<BlockChain>,
    ) -> Result<(PeerConnection, ConnectionTask)> {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        debug!(peer = %addr, "connecting");
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)??;

        state_tx.send_replace(ConnectionState::Handshaking);
        let framer = MessageFramer::new(config.network().magic)
            .with_max_payload_size(config.max_payload_size)
            .with_max_block_size(config.max_block_size)
            .with_checksum(!config.legacy_framing);
        let mut framed = Framed::new(stream, framer);
        let start_height = chain.best_height().await;
        let version = timeout(
            config.handshake_timeout,
            perform_handshake(&mut framed, &config, addr, start_height),
        )
        .await
        .map_err(|_| Error::HandshakeTimeout)??;

        let mut info = PeerInfo::new(addr);
        info.update_from_version(&version);
        info!(
            peer = %addr,
            version = info.version,
            user_agent = %info.user_agent,
            height = info.start_height,
            "handshake complete"
        );
        state_tx.send_replace(ConnectionState::Running);

        let info = Arc::new(info);
        let (commands_tx, commands_rx) = mpsc::channel(config.command_channel_size);
        let cancel = CancellationToken::new();
        let handle = PeerConnection {
            info: info.clone(),
            commands: commands_tx,
            state: state_rx,
            cancel: cancel.clone(),
        };
        let task = ConnectionTask {
            info,
            download_data: config.download_data,
            config,
            chain,
            framed,
            commands: commands_rx,
            cancel,
            state: state_tx,
            events: None,
            blocks: PendingTable::new(),
            txs: PendingTable::new(),
            listener: None,
        };
        Ok((handle, task))
    }

    /// [connect()](Self::connect) and run the receive loop on a new tokio task.
    pub async fn spawn(
        addr: SocketAddr,
        config: Arc<PeerConfig>,
        chain: Arc<BlockChain>,
    ) -> Result<(PeerConnection, JoinHandle<Result<()>>)> {
        let (handle, task) = Self::connect(addr, config, chain).await?;
        Ok((handle, tokio::spawn(task.run())))
    }

    pub fn info(&self) -> &PeerInfo {
        &self.info
    }

    pub fn address(&self) -> SocketAddr {
        self.info.address
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ConnectionState::Running
    }

    /// Queue a message for the peer.
    pub async fn send(&self, msg: Message) -> Result<()> {
        self.command(Command::Send(msg)).await
    }

    /// Send a transaction to the peer.
    pub async fn broadcast_transaction(&self, tx: Tx) -> Result<()> {
        debug!(peer = %self.address(), tx = %tx.hash(), "broadcasting transaction");
        self.send(Message::Tx(tx)).await
    }

    /// Like [broadcast_transaction()](Self::broadcast_transaction), but fails with
    /// [Error::PeerBusy] instead of waiting when the peer is not keeping up.
    pub fn try_broadcast_transaction(&self, tx: Tx) -> Result<()> {
        self.try_command(Command::Send(Message::Tx(tx)))
    }

    /// Ask the peer for one block. The block is handed to the request and not added to the chain.
    pub async fn get_block(&self, hash: BlockHash) -> Result<PendingRequest<Block>> {
        let (waiter, request) = Waiter::new(hash);
        self.command(Command::GetBlock(hash, waiter)).await?;
        Ok(request)
    }

    /// Ask the peer for one transaction.
    pub async fn get_transaction(&self, hash: TxHash) -> Result<PendingRequest<Tx>> {
        let (waiter, request) = Waiter::new(hash);
        self.command(Command::GetTransaction(hash, waiter)).await?;
        Ok(request)
    }

    /// Download every block the peer has and we lack, reporting progress to `listener`.
    pub async fn start_block_chain_download(
        &self,
        listener: Arc<dyn DownloadListener>,
    ) -> Result<()> {
        self.command(Command::StartDownload(listener)).await
    }

    /// Like [start_block_chain_download()](Self::start_block_chain_download), without waiting.
    pub fn try_start_block_chain_download(
        &self,
        listener: Arc<dyn DownloadListener>,
    ) -> Result<()> {
        self.try_command(Command::StartDownload(listener))
    }

    /// Ask the connection to close. Does not wait for it.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        // the task marks itself Disconnected before the sender goes away
        let _ = state.wait_for(|s| *s == ConnectionState::Disconnected).await;
    }

    async fn command(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| Error::ConnectionClosed)
    }

    fn try_command(&self, command: Command) -> Result<()> {
        self.commands.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::PeerBusy,
            mpsc::error::TrySendError::Closed(_) => Error::ConnectionClosed,
        })
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("info", &self.info)
            .field("state", &self.state())
            .finish()
    }
}

async fn perform_handshake(
    framed: &mut Framed<TcpStream, MessageFramer>,
    config: &PeerConfig,
    addr: SocketAddr,
    start_height: u32,
) -> Result<VersionMessage> {
    let nonce: u64 = rand::random();
    let mut state = HandshakeState::new();
    framed
        .send(Message::Version(handshake::version_message(config, addr, nonce, start_height)))
        .await?;
    state.mark_version_sent();

    while !state.is_complete() {
        match framed.next().await.ok_or(Error::ConnectionClosed)?? {
            Message::Version(version) => {
                handshake::validate_version(&version, nonce)?;
                if config.legacy_framing && handshake::uses_checksum(version.version) {
                    framed.codec_mut().set_checksum(true);
                }
                framed.send(Message::Verack).await?;
                state.mark_verack_sent();
                state.mark_version_received(version);
            }
            Message::Verack => state.mark_verack_received(),
            other => debug!(peer = %addr, message = ?other, "ignoring message during handshake"),
        }
    }
    state
        .peer_version
        .ok_or_else(|| Error::Internal("handshake finished without a version".to_string()))
}

/// The receive loop of one connection.
///
/// Messages are processed strictly in arrival order. Blocks that fail validation are logged and
/// the connection carries on; only I/O errors, protocol errors and block store failures end it.
pub struct ConnectionTask {
    info: Arc<PeerInfo>,
    config: Arc<PeerConfig>,
    chain: Arc<BlockChain>,
    framed: Framed<TcpStream, MessageFramer>,
    commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
    events: Option<mpsc::Sender<PeerEvent>>,
    blocks: PendingTable<Block>,
    txs: PendingTable<Tx>,
    listener: Option<Arc<dyn DownloadListener>>,
    download_data: bool,
}

impl ConnectionTask {
    /// Report discovered addresses to `events`.
    pub fn with_events(mut self, events: mpsc::Sender<PeerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run until the peer goes away, the connection is asked to close, or a fatal error occurs.
    ///
    /// Requests still pending when this returns fail with [Error::ConnectionClosed].
    pub async fn run(mut self) -> Result<()> {
        let cancel = self.cancel.clone();
        // a write to a peer that stopped reading must not hold off a disconnect
        let result = tokio::select! {
            result = self.receive_loop() => result,
            _ = cancel.cancelled() => Ok(()),
        };
        self.state.send_replace(ConnectionState::Disconnecting);
        match timeout(CLOSE_TIMEOUT, SinkExt::<Message>::close(&mut self.framed)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!(peer = %self.info.address, error = %e, "error closing connection"),
            Err(_) => trace!(peer = %self.info.address, "gave up flushing on close"),
        }
        match &result {
            Ok(()) => info!(peer = %self.info.address, "disconnected"),
            Err(e) => info!(peer = %self.info.address, error = %e, "connection lost"),
        }
        result
    }

    async fn receive_loop(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await?,
                    // every handle is gone
                    None => return Ok(()),
                },
                msg = self.framed.next() => match msg {
                    Some(msg) => self.dispatch(msg?).await?,
                    None => return Err(Error::ConnectionClosed),
                },
            }
        }
    }

    async fn on_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Send(msg) => self.send(msg).await,
            Command::GetBlock(hash, waiter) => {
                // registered before the getdata goes out, so the answer cannot be missed
                self.blocks.register(hash, waiter);
                self.send(Message::GetData(vec![Inventory::block(hash)])).await
            }
            Command::GetTransaction(hash, waiter) => {
                self.txs.register(hash, waiter);
                self.send(Message::GetData(vec![Inventory::tx(hash)])).await
            }
            Command::StartDownload(listener) => self.start_download(listener).await,
        }
    }

    async fn dispatch(&mut self, msg: Message) -> Result<()> {
        match msg {
            Message::Inv(items) => self.on_inv(items).await,
            Message::Block(block) => self.on_block(block).await,
            Message::Tx(tx) => {
                let hash = tx.hash();
                if !self.txs.fulfil(&hash, &tx) {
                    trace!(peer = %self.info.address, tx = %hash, "received transaction");
                    self.chain.receive_pending(&tx);
                }
                Ok(())
            }
            Message::Ping(nonce) => self.send(Message::Pong(nonce)).await,
            Message::Addr(addresses) => {
                self.on_addr(addresses);
                Ok(())
            }
            Message::NotFound(items) => {
                debug!(
                    peer = %self.info.address,
                    count = items.len(),
                    "peer does not have requested items"
                );
                Ok(())
            }
            Message::Reject(reject) => {
                warn!(
                    peer = %self.info.address,
                    message = %reject.message,
                    code = reject.code,
                    reason = %reject.reason,
                    "peer rejected a message"
                );
                Ok(())
            }
            other => {
                trace!(peer = %self.info.address, message = ?other, "ignoring message");
                Ok(())
            }
        }
    }

    async fn on_inv(&mut self, items: Vec<Inventory>) -> Result<()> {
        if !self.download_data {
            return Ok(());
        }
        // a lone inv for our newest unconnected block means the peer has more blocks for us
        if let [item] = items.as_slice() {
            if item.inv_type == InvType::Block
                && self.chain.unconnected_block().await == Some(item.hash)
            {
                return self.block_chain_download(item.hash).await;
            }
        }
        let wanted: Vec<Inventory> = items
            .into_iter()
            .filter(|item| match item.inv_type {
                InvType::Block => !self.blocks.contains(&item.hash),
                InvType::Tx => !self.txs.contains(&item.hash),
                _ => false,
            })
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }
        self.send(Message::GetData(wanted)).await
    }

    async fn on_block(&mut self, block: Block) -> Result<()> {
        let hash = block.hash();
        if self.blocks.fulfil(&hash, &block) {
            debug!(peer = %self.info.address, block = %hash, "received requested block");
            return Ok(());
        }
        match self.chain.add(block).await {
            Ok(true) => {
                if let Some(listener) = self.listener.clone() {
                    let blocks_left = self.blocks_left().await;
                    listener.on_blocks_downloaded(self.info.address, &hash, blocks_left);
                }
                Ok(())
            }
            // missing ancestors, ask for the blocks between our head and this one
            Ok(false) => self.block_chain_download(hash).await,
            Err(e) if e.is_fatal_to_group() => Err(e),
            Err(e) => {
                warn!(peer = %self.info.address, block = %hash, error = %e, "block rejected");
                Ok(())
            }
        }
    }

    fn on_addr(&self, addresses: Vec<TimestampedAddress>) {
        debug!(peer = %self.info.address, count = addresses.len(), "received addresses");
        let Some(events) = &self.events else {
            return;
        };
        let event = PeerEvent::Addresses {
            peer: self.info.id,
            addresses: addresses.iter().map(|a| a.address.socket_addr()).collect(),
        };
        // never block the receive loop on the group
        if events.try_send(event).is_err() {
            debug!(peer = %self.info.address, "dropped discovered addresses");
        }
    }

    async fn start_download(&mut self, listener: Arc<dyn DownloadListener>) -> Result<()> {
        self.download_data = true;
        let blocks_left = self.blocks_left().await;
        listener.on_chain_download_started(self.info.address, blocks_left);
        self.listener = Some(listener);
        self.block_chain_download(Hash::ZERO).await
    }

    /// Send a getblocks for everything after our head, up to `stop` (zero for no limit).
    async fn block_chain_download(&mut self, stop: BlockHash) -> Result<()> {
        let locator = self.chain.block_locator(self.config.locator_depth).await?;
        debug!(
            peer = %self.info.address,
            stop = %stop,
            locator = locator.len(),
            "requesting blocks"
        );
        self.send(Message::GetBlocks(GetBlocksMessage {
            version: self.config.protocol_version,
            locator_hashes: locator,
            hash_stop: stop,
        }))
        .await
    }

    async fn blocks_left(&self) -> u32 {
        self.info.start_height.saturating_sub(self.chain.best_height().await)
    }

    async fn send(&mut self, msg: Message) -> Result<()> {
        self.framed.send(msg).await
    }
}

impl Drop for ConnectionTask {
    fn drop(&mut self) {
        self.state.send_replace(ConnectionState::Disconnected);
    }
}
