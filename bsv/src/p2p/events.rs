use crate::bitcoin::BlockHash;
use crate::p2p::connection::PeerConnection;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

/// Notifications sent from connections to the group that owns them.
#[derive(Debug)]
pub enum PeerEvent {
    /// The handshake with a peer finished and its receive loop is about to start.
    Ready(PeerConnection),
    /// A peer told us about other nodes.
    Addresses { peer: Uuid, addresses: Vec<SocketAddr> },
}

/// Progress callbacks of a block chain download.
pub trait DownloadListener: Send + Sync {
    /// The download from `peer` started with `blocks_left` blocks to fetch.
    fn on_chain_download_started(&self, peer: SocketAddr, blocks_left: u32);

    /// A block was added to the chain. `blocks_left` never goes below zero.
    fn on_blocks_downloaded(&self, peer: SocketAddr, hash: &BlockHash, blocks_left: u32);
}

/// A [DownloadListener] that logs progress and lets callers wait for the end of the download.
#[derive(Debug)]
pub struct DownloadProgress {
    remaining: watch::Sender<Option<u32>>,
}

impl DownloadProgress {
    pub fn new() -> DownloadProgress {
        let (remaining, _) = watch::channel(None);
        DownloadProgress { remaining }
    }

    /// Blocks still to fetch, `None` until a download started.
    pub fn blocks_left(&self) -> Option<u32> {
        *self.remaining.borrow()
    }

    pub fn is_done(&self) -> bool {
        self.blocks_left() == Some(0)
    }

    /// Wait until the chain has caught up with the download peer.
    pub async fn wait(&self) {
        let mut rx = self.remaining.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|left| *left == Some(0)).await;
    }

    fn update(&self, blocks_left: u32) {
        self.remaining.send_replace(Some(blocks_left));
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        DownloadProgress::new()
    }
}

impl DownloadListener for DownloadProgress {
    fn on_chain_download_started(&self, peer: SocketAddr, blocks_left: u32) {
        info!(peer = %peer, blocks_left, "block chain download started");
        self.update(blocks_left);
    }

    fn on_blocks_downloaded(&self, peer: SocketAddr, hash: &BlockHash, blocks_left: u32) {
        if blocks_left % 1000 == 0 {
            info!(peer = %peer, hash = %hash, blocks_left, "block chain download progress");
        }
        self.update(blocks_left);
    }
}
