//! The block chain: storage of headers, validation, and selection of the best chain.

mod blockchain;
mod store;
mod stored;
mod validation;
mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use blockchain::{BlockChain, DEFAULT_MAX_UNCONNECTED};
pub use store::{BlockStore, MemoryBlockStore};
pub use stored::StoredBlock;
pub use validation::{
    check_difficulty_transition, verify_block, verify_scripts, MAX_FUTURE_BLOCK_TIME,
};
pub use wallet::{BlockKind, OutputSource, Wallet};
