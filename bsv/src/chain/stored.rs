use crate::bitcoin::{BlockHash, BlockHeader};
use num::BigUint;

/// A header placed in the chain: its height and the total work from genesis up to and including it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub header: BlockHeader,
    pub height: u32,
    pub chain_work: BigUint,
}

impl StoredBlock {
    /// The first block of a chain.
    pub fn genesis(header: BlockHeader) -> StoredBlock {
        let chain_work = header.work();
        StoredBlock {
            header,
            height: 0,
            chain_work,
        }
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// The stored form of `header` built on top of this block.
    pub fn build(&self, header: BlockHeader) -> StoredBlock {
        let chain_work = &self.chain_work + header.work();
        StoredBlock {
            header,
            height: self.height + 1,
            chain_work,
        }
    }

    /// Strictly more cumulative work. Ties are not more work.
    pub fn more_work_than(&self, other: &StoredBlock) -> bool {
        self.chain_work > other.chain_work
    }
}
