use crate::bitcoin::{Outpoint, Tx, TxOutput};
use crate::chain::StoredBlock;

/// Whether a block carrying a transaction is on the best chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    BestChain,
    SideChain,
}

/// Receives chain events for the transactions it cares about.
///
/// Key management stays with the wallet. Callbacks run while the chain is locked, they must not
/// call back into the [BlockChain](crate::chain::BlockChain).
pub trait Wallet: Send + Sync {
    /// Only relevant transactions are passed to [Wallet::receive_from_block()].
    fn is_transaction_relevant(&self, tx: &Tx) -> bool;

    /// A relevant transaction was found in a block.
    fn receive_from_block(&self, tx: &Tx, block: &StoredBlock, kind: BlockKind);

    /// The best chain is about to switch branches. `old_blocks` and `new_blocks` run from the tip
    /// down to, but excluding, `split_point`.
    fn reorganize(
        &self,
        split_point: &StoredBlock,
        old_blocks: &[StoredBlock],
        new_blocks: &[StoredBlock],
    );

    /// The chain head moved.
    fn notify_new_best_block(&self, _block: &StoredBlock) {}

    /// A loose transaction was relayed by a peer.
    fn receive_pending(&self, _tx: &Tx) {}
}

/// Looks up outputs created by earlier transactions, used to validate the scripts of inputs.
pub trait OutputSource: Send + Sync {
    fn get(&self, outpoint: &Outpoint) -> Option<TxOutput>;
}
