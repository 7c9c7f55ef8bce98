use crate::bitcoin::{Block, BlockHash, ChainParams};
use crate::chain::StoredBlock;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Persistent storage for the block chain.
///
/// All methods are async to support non-blocking I/O operations. Implementations must be
/// thread-safe. Any error returned is treated as storage failure and stops the peer group that
/// owns the chain, so implementations should only fail when the store itself is broken.
#[async_trait::async_trait]
pub trait BlockStore: Send + Sync {
    /// Retrieve a stored header by hash.
    async fn get(&self, hash: &BlockHash) -> Result<Option<StoredBlock>>;

    /// Store a header. Storing the same block twice is not an error.
    async fn put(&self, block: StoredBlock) -> Result<()>;

    /// Retrieve the transactions of a block as well as its header.
    async fn get_block(&self, hash: &BlockHash) -> Result<Option<Block>>;

    /// Store a full block.
    async fn put_block(&self, block: &Block) -> Result<()>;

    /// The block currently at the tip of the best chain.
    async fn chain_head(&self) -> Result<StoredBlock>;

    /// Move the chain head. The block must already have been stored with [BlockStore::put()].
    async fn set_chain_head(&self, head: &StoredBlock) -> Result<()>;
}

/// In-memory block store.
///
/// A fresh store holds the genesis block of its network as its chain head.
pub struct MemoryBlockStore {
    inner: Mutex<MemoryInner>,
}

struct MemoryInner {
    headers: HashMap<BlockHash, StoredBlock>,
    blocks: HashMap<BlockHash, Block>,
    head: BlockHash,
}

impl MemoryBlockStore {
    pub fn new(params: &ChainParams) -> MemoryBlockStore {
        let genesis = StoredBlock::genesis(params.genesis.clone());
        let head = genesis.hash();
        let mut headers = HashMap::new();
        headers.insert(head, genesis);
        MemoryBlockStore {
            inner: Mutex::new(MemoryInner {
                headers,
                blocks: HashMap::new(),
                head,
            }),
        }
    }

    /// Number of stored headers, genesis included.
    pub fn len(&self) -> usize {
        self.lock().map(|i| i.headers.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| Error::BlockStore("block store lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl BlockStore for MemoryBlockStore {
    async fn get(&self, hash: &BlockHash) -> Result<Option<StoredBlock>> {
        Ok(self.lock()?.headers.get(hash).cloned())
    }

    async fn put(&self, block: StoredBlock) -> Result<()> {
        self.lock()?.headers.insert(block.hash(), block);
        Ok(())
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<Option<Block>> {
        Ok(self.lock()?.blocks.get(hash).cloned())
    }

    async fn put_block(&self, block: &Block) -> Result<()> {
        self.lock()?.blocks.insert(block.hash(), block.clone());
        Ok(())
    }

    async fn chain_head(&self) -> Result<StoredBlock> {
        let inner = self.lock()?;
        inner
            .headers
            .get(&inner.head)
            .cloned()
            .ok_or_else(|| Error::BlockStore(format!("chain head {} missing", inner.head)))
    }

    async fn set_chain_head(&self, head: &StoredBlock) -> Result<()> {
        let mut inner = self.lock()?;
        let hash = head.hash();
        if !inner.headers.contains_key(&hash) {
            return Err(Error::BlockStore(format!(
                "chain head {} has not been stored",
                hash
            )));
        }
        inner.head = hash;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::BlockchainId;

    #[tokio::test]
    async fn seeded_with_genesis() {
        let params = ChainParams::for_chain(BlockchainId::Main);
        let store = MemoryBlockStore::new(&params);
        let head = store.chain_head().await.unwrap();
        assert_eq!(head.height, 0);
        assert_eq!(head.hash(), params.genesis_hash());
        assert_eq!(store.len(), 1);
        assert!(store.get(&params.genesis_hash()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn head_must_be_stored() {
        let params = ChainParams::for_chain(BlockchainId::Regtest);
        let store = MemoryBlockStore::new(&params);
        let genesis = store.chain_head().await.unwrap();
        let mut header = params.genesis.clone();
        header.prev_hash = genesis.hash();
        let child = genesis.build(header);
        assert!(matches!(
            store.set_chain_head(&child).await,
            Err(Error::BlockStore(_))
        ));
        store.put(child.clone()).await.unwrap();
        store.set_chain_head(&child).await.unwrap();
        assert_eq!(store.chain_head().await.unwrap(), child);
    }

    #[tokio::test]
    async fn full_blocks() {
        let params = ChainParams::for_chain(BlockchainId::Regtest);
        let store = MemoryBlockStore::new(&params);
        let block = Block::from(params.genesis.clone());
        assert!(store.get_block(&block.hash()).await.unwrap().is_none());
        store.put_block(&block).await.unwrap();
        assert_eq!(store.get_block(&block.hash()).await.unwrap(), Some(block));
    }
}
