use crate::bitcoin::script::{ScriptInterpreter, VerifyFlags};
use crate::bitcoin::{Block, BlockHash, ChainParams, Tx};
use crate::chain::validation::{check_difficulty_transition, verify_block, verify_scripts};
use crate::chain::{BlockKind, BlockStore, OutputSource, StoredBlock, Wallet};
use crate::util::epoch_secs_u32;
use crate::{Error, Result};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

/// Default number of unconnected blocks kept while waiting for their parents.
pub const DEFAULT_MAX_UNCONNECTED: usize = 500;

/// Tracks the best chain of blocks.
///
/// All changes go through [BlockChain::add()], which holds one lock for its whole run, so chain
/// head transitions are linearizable no matter how many peers deliver blocks.
pub struct BlockChain {
    params: ChainParams,
    flags: VerifyFlags,
    interpreter: ScriptInterpreter,
    store: Arc<dyn BlockStore>,
    output_source: Option<Arc<dyn OutputSource>>,
    wallets: RwLock<Vec<Arc<dyn Wallet>>>,
    max_unconnected: usize,
    state: Mutex<ChainState>,
}

struct ChainState {
    head: StoredBlock,
    // oldest first
    unconnected: VecDeque<Block>,
    invalid: HashSet<BlockHash>,
}

impl BlockChain {
    /// Open the chain stored in `store`.
    pub async fn new(params: ChainParams, store: Arc<dyn BlockStore>) -> Result<BlockChain> {
        let head = store.chain_head().await?;
        info!(height = head.height, hash = %head.hash(), "opened block chain");
        Ok(BlockChain {
            params,
            flags: VerifyFlags::CONSENSUS,
            interpreter: ScriptInterpreter::new(),
            store,
            output_source: None,
            wallets: RwLock::new(Vec::new()),
            max_unconnected: DEFAULT_MAX_UNCONNECTED,
            state: Mutex::new(ChainState {
                head,
                unconnected: VecDeque::new(),
                invalid: HashSet::new(),
            }),
        })
    }

    /// Flags used to run the scripts of contained transactions.
    pub fn with_flags(mut self, flags: VerifyFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Enable script validation, resolving spent outputs through `source`.
    pub fn with_output_source(mut self, source: Arc<dyn OutputSource>) -> Self {
        self.output_source = Some(source);
        self
    }

    pub fn with_max_unconnected(mut self, max: usize) -> Self {
        self.max_unconnected = max;
        self
    }

    pub fn add_wallet(&self, wallet: Arc<dyn Wallet>) {
        self.wallets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(wallet);
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    /// Add a block received from the network.
    ///
    /// Returns `Ok(true)` when the block was connected to the chain, on the best branch or a side
    /// branch, or was already known. Returns `Ok(false)` when its parent is unknown, the block is
    /// then kept until the parent arrives. Blocks that break a rule are rejected with
    /// [Error::Verification] or [Error::Script] and never become the head.
    pub async fn add(&self, block: Block) -> Result<bool> {
        let mut state = self.state.lock().await;
        let hash = block.hash();
        if state.head.hash() == hash {
            return Ok(true);
        }
        if state.invalid.contains(&hash) {
            return Err(Error::Verification(format!("block {} was already rejected", hash)));
        }
        if state.invalid.contains(&block.prev_hash()) {
            state.invalid.insert(hash);
            return Err(Error::Verification(format!(
                "block {} builds on rejected block {}",
                hash,
                block.prev_hash()
            )));
        }
        if self.store.get(&hash).await?.is_some() {
            trace!(hash = %hash, "block already stored");
            return Ok(true);
        }
        verify_block(&block, &self.params, epoch_secs_u32())?;

        let connected = self.try_connect(&mut state, block).await?;
        if connected {
            self.connect_unconnected(&mut state).await?;
        }
        Ok(connected)
    }

    /// The tip of the best chain.
    pub async fn chain_head(&self) -> StoredBlock {
        self.state.lock().await.head.clone()
    }

    pub async fn best_height(&self) -> u32 {
        self.state.lock().await.head.height
    }

    /// Hash of the most recently received block whose parent is still unknown.
    pub async fn unconnected_block(&self) -> Option<BlockHash> {
        self.state.lock().await.unconnected.back().map(|b| b.hash())
    }

    pub async fn unconnected_count(&self) -> usize {
        self.state.lock().await.unconnected.len()
    }

    pub async fn get(&self, hash: &BlockHash) -> Result<Option<StoredBlock>> {
        self.store.get(hash).await
    }

    /// Hashes describing the best chain to a peer: the head first, then up to `depth` of its
    /// ancestors, always ending with genesis.
    pub async fn block_locator(&self, depth: usize) -> Result<Vec<BlockHash>> {
        let head = self.chain_head().await;
        let genesis = self.params.genesis_hash();
        let mut locator = Vec::with_capacity(depth + 2);
        let mut cursor = head;
        locator.push(cursor.hash());
        while locator.len() <= depth && cursor.height > 0 {
            match self.store.get(&cursor.header.prev_hash).await? {
                Some(prev) => {
                    locator.push(prev.hash());
                    cursor = prev;
                }
                None => break,
            }
        }
        if locator.last() != Some(&genesis) {
            locator.push(genesis);
        }
        Ok(locator)
    }

    /// The last block two branches have in common.
    pub async fn find_split(&self, a: &StoredBlock, b: &StoredBlock) -> Result<StoredBlock> {
        find_split(self.store.as_ref(), a, b).await
    }

    /// Blocks from `from` back to, but excluding, its ancestor `to`, highest first.
    pub async fn partial_chain(
        &self,
        from: &StoredBlock,
        to: &StoredBlock,
    ) -> Result<Vec<StoredBlock>> {
        partial_chain(self.store.as_ref(), from, to).await
    }

    /// Rough unix time at which `height` will be (or was) reached, extrapolated from the head.
    pub async fn estimate_block_time(&self, height: u32) -> i64 {
        let head = self.chain_head().await;
        let blocks = height as i64 - head.height as i64;
        head.header.timestamp as i64 + blocks * self.params.target_spacing as i64
    }

    /// Pass a loose transaction relayed by a peer to the interested wallets.
    pub fn receive_pending(&self, tx: &Tx) {
        for wallet in self.wallets() {
            if wallet.is_transaction_relevant(tx) {
                wallet.receive_pending(tx);
            }
        }
    }

    fn wallets(&self) -> Vec<Arc<dyn Wallet>> {
        self.wallets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // Ok(false) when the parent is unknown and the block was parked.
    async fn try_connect(&self, state: &mut ChainState, block: Block) -> Result<bool> {
        let hash = block.hash();
        let Some(prev) = self.store.get(&block.prev_hash()).await? else {
            if !state.unconnected.iter().any(|b| b.hash() == hash) {
                debug!(
                    hash = %hash,
                    prev = %block.prev_hash(),
                    "parent unknown, keeping block unconnected"
                );
                state.unconnected.push_back(block);
                while state.unconnected.len() > self.max_unconnected {
                    state.unconnected.pop_front();
                }
            }
            return Ok(false);
        };

        if let Err(e) =
            check_difficulty_transition(self.store.as_ref(), &prev, &block.header, &self.params)
                .await
        {
            if !e.is_fatal_to_group() {
                state.invalid.insert(hash);
            }
            return Err(e);
        }
        let stored = prev.build(block.header.clone());

        if prev.hash() == state.head.hash() {
            if let Err(e) = self.validate_scripts(&block) {
                state.invalid.insert(hash);
                return Err(e);
            }
            self.store_block(&stored, &block).await?;
            self.store.set_chain_head(&stored).await?;
            debug!(height = stored.height, hash = %hash, "new chain head");
            state.head = stored.clone();
            self.notify_transactions(&block, &stored, BlockKind::BestChain);
            for wallet in self.wallets() {
                wallet.notify_new_best_block(&stored);
            }
            return Ok(true);
        }

        self.store_block(&stored, &block).await?;
        if stored.more_work_than(&state.head) {
            self.reorganize(state, stored).await?;
        } else {
            debug!(height = stored.height, hash = %hash, "block added to side chain");
            self.notify_transactions(&block, &stored, BlockKind::SideChain);
        }
        Ok(true)
    }

    // Switch the head to `new_head`. Every block of the new branch is validated before anything
    // changes, a failure leaves the old head in place.
    async fn reorganize(&self, state: &mut ChainState, new_head: StoredBlock) -> Result<()> {
        let store = self.store.as_ref();
        let split = find_split(store, &new_head, &state.head).await?;
        let old_blocks = partial_chain(store, &state.head, &split).await?;
        let new_blocks = partial_chain(store, &new_head, &split).await?;

        for (index, stored) in new_blocks.iter().enumerate().rev() {
            let Some(block) = store.get_block(&stored.hash()).await? else {
                continue;
            };
            if let Err(e) = self.validate_scripts(&block) {
                warn!(
                    height = stored.height,
                    hash = %stored.hash(),
                    error = %e,
                    "block on heavier branch failed validation, keeping current chain"
                );
                // the failed block and everything built on it
                for s in new_blocks[..=index].iter() {
                    state.invalid.insert(s.hash());
                }
                return Err(e);
            }
        }

        info!(
            split_height = split.height,
            old_head = %state.head.hash(),
            new_head = %new_head.hash(),
            new_height = new_head.height,
            "chain reorganization"
        );
        for wallet in self.wallets() {
            wallet.reorganize(&split, &old_blocks, &new_blocks);
        }
        store.set_chain_head(&new_head).await?;
        state.head = new_head;
        for wallet in self.wallets() {
            wallet.notify_new_best_block(&state.head);
        }
        Ok(())
    }

    // Retry parked blocks until a pass connects nothing new.
    async fn connect_unconnected(&self, state: &mut ChainState) -> Result<()> {
        loop {
            let mut progress = false;
            let waiting = std::mem::take(&mut state.unconnected);
            for block in waiting {
                if self.store.get(&block.prev_hash()).await?.is_none() {
                    state.unconnected.push_back(block);
                    continue;
                }
                progress = true;
                let hash = block.hash();
                match self.try_connect(state, block).await {
                    Ok(_) => trace!(hash = %hash, "connected previously unconnected block"),
                    Err(e) if e.is_fatal_to_group() => return Err(e),
                    Err(e) => warn!(hash = %hash, error = %e, "dropping unconnected block"),
                }
            }
            if !progress {
                return Ok(());
            }
        }
    }

    fn validate_scripts(&self, block: &Block) -> Result<()> {
        match &self.output_source {
            Some(source) if !block.is_header_only() => {
                verify_scripts(block, source.as_ref(), &self.interpreter, self.flags)
            }
            _ => Ok(()),
        }
    }

    async fn store_block(&self, stored: &StoredBlock, block: &Block) -> Result<()> {
        self.store.put(stored.clone()).await?;
        if !block.is_header_only() {
            self.store.put_block(block).await?;
        }
        Ok(())
    }

    fn notify_transactions(&self, block: &Block, stored: &StoredBlock, kind: BlockKind) {
        let wallets = self.wallets();
        if wallets.is_empty() {
            return;
        }
        for tx in block.txs.iter() {
            for wallet in wallets.iter() {
                if wallet.is_transaction_relevant(tx) {
                    wallet.receive_from_block(tx, stored, kind);
                }
            }
        }
    }
}

pub(crate) async fn find_split(
    store: &dyn BlockStore,
    a: &StoredBlock,
    b: &StoredBlock,
) -> Result<StoredBlock> {
    let mut a = a.clone();
    let mut b = b.clone();
    while a.hash() != b.hash() {
        if a.height >= b.height {
            a = parent(store, &a).await?;
        } else {
            b = parent(store, &b).await?;
        }
    }
    Ok(a)
}

pub(crate) async fn partial_chain(
    store: &dyn BlockStore,
    from: &StoredBlock,
    to: &StoredBlock,
) -> Result<Vec<StoredBlock>> {
    let target = to.hash();
    let mut result = Vec::new();
    let mut cursor = from.clone();
    while cursor.hash() != target {
        if cursor.height <= to.height {
            return Err(Error::BadArgument(format!(
                "{} is not an ancestor of {}",
                target,
                from.hash()
            )));
        }
        let prev = parent(store, &cursor).await?;
        result.push(cursor);
        cursor = prev;
    }
    Ok(result)
}

async fn parent(store: &dyn BlockStore, block: &StoredBlock) -> Result<StoredBlock> {
    if block.height == 0 {
        return Err(Error::BlockStore("walked past genesis".to_string()));
    }
    store
        .get(&block.header.prev_hash)
        .await?
        .ok_or_else(|| {
            Error::BlockStore(format!("parent of stored block {} missing", block.hash()))
        })
}
