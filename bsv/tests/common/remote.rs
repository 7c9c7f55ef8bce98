use bitcoinsv_spv::bitcoin::{Block, BlockHash, BlockchainId};
use bitcoinsv_spv::p2p::{Inventory, Message, MessageFramer, NetworkParams};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;

/// A scripted regtest node on a local port.
///
/// It completes the handshake, answers pings, and serves `blocks` (built on genesis) through the
/// usual getblocks / inv / getdata exchange, in batches of 500 with a continuation inv like a real
/// node. A muted node completes the handshake and then only answers pings. A stalled node
/// completes the handshake and then stops reading its socket. Every message it receives is copied
/// to `received`.
pub struct FakeNode {
    pub address: SocketAddr,
    pub received: mpsc::UnboundedReceiver<Message>,
    live: Arc<AtomicUsize>,
    server: tokio::task::JoinHandle<()>,
}

// Largest inv sent in answer to getblocks.
const INV_BATCH: usize = 500;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serving,
    Muted,
    Stalled,
}

#[derive(Clone)]
struct Behaviour {
    blocks: Arc<Vec<Block>>,
    genesis: BlockHash,
    mode: Mode,
}

impl FakeNode {
    pub async fn start(genesis: BlockHash, blocks: Vec<Block>) -> FakeNode {
        Self::start_with(genesis, blocks, Mode::Serving).await
    }

    pub async fn muted(genesis: BlockHash, blocks: Vec<Block>) -> FakeNode {
        Self::start_with(genesis, blocks, Mode::Muted).await
    }

    pub async fn stalled(genesis: BlockHash) -> FakeNode {
        Self::start_with(genesis, vec![], Mode::Stalled).await
    }

    async fn start_with(genesis: BlockHash, blocks: Vec<Block>, mode: Mode) -> FakeNode {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (seen, received) = mpsc::unbounded_channel();
        let live = Arc::new(AtomicUsize::new(0));
        let behaviour = Behaviour {
            blocks: Arc::new(blocks),
            genesis,
            mode,
        };
        let server = {
            let live = live.clone();
            tokio::spawn(async move {
                let mut connections = JoinSet::new();
                while let Ok((stream, _)) = listener.accept().await {
                    let live = live.clone();
                    let seen = seen.clone();
                    let behaviour = behaviour.clone();
                    live.fetch_add(1, Ordering::SeqCst);
                    let guard = LiveGuard(live);
                    connections.spawn(async move {
                        let _guard = guard;
                        serve(stream, behaviour, seen).await;
                    });
                }
            })
        };
        FakeNode {
            address,
            received,
            live,
            server,
        }
    }

    /// Connections currently open to this node.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Wait for a received message matching `pred`, discarding the others.
    pub async fn wait_for(&mut self, pred: impl Fn(&Message) -> bool) -> Message {
        let wait = async {
            loop {
                match self.received.recv().await {
                    Some(msg) if pred(&msg) => return msg,
                    Some(_) => continue,
                    None => panic!("fake node stopped"),
                }
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(5), wait)
            .await
            .expect("timed out waiting for message")
    }

    /// Close the listener and every open connection.
    pub fn kill(&self) {
        // dropping the JoinSet aborts the connection tasks
        self.server.abort();
    }
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.server.abort();
    }
}

// Counts a connection as live until its task ends or is aborted.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn serve(stream: TcpStream, behaviour: Behaviour, seen: mpsc::UnboundedSender<Message>) {
    let magic = NetworkParams::from(BlockchainId::Regtest).magic;
    let mut framed = Framed::new(stream, MessageFramer::new(magic));
    // last block of a truncated inv batch
    let mut hash_continue = None;
    while let Some(Ok(msg)) = framed.next().await {
        let _ = seen.send(msg.clone());
        let handshake = matches!(msg, Message::Version(_));
        for reply in respond(&behaviour, msg, &mut hash_continue) {
            if framed.send(reply).await.is_err() {
                return;
            }
        }
        if handshake && behaviour.mode == Mode::Stalled {
            // keep the socket open without ever reading from it again
            std::future::pending::<()>().await;
        }
    }
}

fn respond(
    behaviour: &Behaviour,
    msg: Message,
    hash_continue: &mut Option<BlockHash>,
) -> Vec<Message> {
    match msg {
        Message::Version(theirs) => {
            let mut ours = theirs;
            ours.nonce = ours.nonce.wrapping_add(1);
            ours.user_agent = "/Bitcoin SV:1.0.16/".to_string();
            ours.start_height = behaviour.blocks.len() as u32;
            vec![Message::Version(ours), Message::Verack]
        }
        Message::Ping(nonce) => vec![Message::Pong(nonce)],
        _ if behaviour.mode != Mode::Serving => vec![],
        Message::GetBlocks(getblocks) => {
            // the locator runs from the tip down, so the first hash we know is the best one
            let start = getblocks
                .locator_hashes
                .iter()
                .find_map(|hash| {
                    if *hash == behaviour.genesis {
                        Some(0)
                    } else {
                        behaviour.blocks.iter().position(|b| b.hash() == *hash).map(|i| i + 1)
                    }
                })
                .unwrap_or(0);
            let items: Vec<Inventory> = behaviour.blocks[start..]
                .iter()
                .take(INV_BATCH)
                .map(|b| Inventory::block(b.hash()))
                .collect();
            if start + items.len() < behaviour.blocks.len() {
                *hash_continue = items.last().map(|item| item.hash);
            }
            if items.is_empty() {
                vec![]
            } else {
                vec![Message::Inv(items)]
            }
        }
        Message::GetData(items) => {
            let mut replies: Vec<Message> = items
                .iter()
                .filter_map(|item| behaviour.blocks.iter().find(|b| b.hash() == item.hash))
                .map(|block| Message::Block(block.clone()))
                .collect();
            // once the end of a batch is fetched, announce the tip so the peer asks for more
            if let Some(last) = *hash_continue {
                if items.iter().any(|item| item.hash == last) {
                    *hash_continue = None;
                    if let Some(tip) = behaviour.blocks.last() {
                        replies.push(Message::Inv(vec![Inventory::block(tip.hash())]));
                    }
                }
            }
            replies
        }
        _ => vec![],
    }
}
