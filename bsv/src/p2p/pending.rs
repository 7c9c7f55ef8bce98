use crate::bitcoin::Hash;
use crate::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// The answer to an explicit `getdata` request for one block or transaction.
///
/// Resolves with the item once the peer sends it, or with [Error::ConnectionClosed] if the
/// connection ends first. The `getdata` itself cannot be taken back: [PendingRequest::cancel()]
/// only stops this future from waiting.
#[derive(Debug)]
pub struct PendingRequest<T> {
    hash: Hash,
    rx: oneshot::Receiver<T>,
    cancelled: Arc<AtomicBool>,
}

impl<T> PendingRequest<T> {
    /// Hash of the requested item.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<T> Future for PendingRequest<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        if self.is_cancelled() {
            return Poll::Ready(Err(Error::RequestCancelled));
        }
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(item)) => Poll::Ready(Ok(item)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// Connection side of a PendingRequest.
#[derive(Debug)]
pub(crate) struct Waiter<T> {
    tx: oneshot::Sender<T>,
    cancelled: Arc<AtomicBool>,
}

impl<T> Waiter<T> {
    pub(crate) fn new(hash: Hash) -> (Waiter<T>, PendingRequest<T>) {
        let (tx, rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let request = PendingRequest {
            hash,
            rx,
            cancelled: cancelled.clone(),
        };
        (Waiter { tx, cancelled }, request)
    }
}

/// Outstanding requests of one connection, keyed by item hash.
///
/// Owned by the receive loop, so every request is completed at most once and only from there.
/// Dropping the table fails whatever is still waiting.
#[derive(Debug)]
pub(crate) struct PendingTable<T> {
    waiting: HashMap<Hash, Vec<Waiter<T>>>,
}

impl<T: Clone> PendingTable<T> {
    pub(crate) fn new() -> Self {
        PendingTable {
            waiting: HashMap::new(),
        }
    }

    pub(crate) fn register(&mut self, hash: Hash, waiter: Waiter<T>) {
        self.waiting.entry(hash).or_default().push(waiter);
    }

    pub(crate) fn contains(&self, hash: &Hash) -> bool {
        self.waiting.contains_key(hash)
    }

    /// Hand `item` to everyone waiting for `hash`. Returns false if nothing was requested.
    ///
    /// A cancelled request still counts as requested, the item was asked for explicitly.
    pub(crate) fn fulfil(&mut self, hash: &Hash, item: &T) -> bool {
        let Some(waiters) = self.waiting.remove(hash) else {
            return false;
        };
        for waiter in waiters {
            if !waiter.cancelled.load(Ordering::SeqCst) {
                // the caller may have dropped its future
                let _ = waiter.tx.send(item.clone());
            }
        }
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.waiting.values().map(|w| w.len()).sum()
    }
}
