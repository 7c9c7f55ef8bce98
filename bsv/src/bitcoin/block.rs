use crate::bitcoin::merkle::calculate_merkle_root;
use crate::bitcoin::{
    varint_decode_len, varint_encode, varint_size, BlockHash, BlockHeader, Encodable, MerkleRoot,
    Tx,
};
use crate::Result;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// A block: a header and its ordered transactions.
///
/// Blocks announced through `headers` messages carry no transactions, these are header-only
/// blocks and only the header checks apply to them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Tx>,
}

impl Block {
    pub fn new(header: BlockHeader, txs: Vec<Tx>) -> Block {
        Block { header, txs }
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn prev_hash(&self) -> BlockHash {
        self.header.prev_hash
    }

    pub fn is_header_only(&self) -> bool {
        self.txs.is_empty()
    }

    /// Merkle root of the contained transactions.
    pub fn calculate_merkle_root(&self) -> Result<MerkleRoot> {
        let hashes: Vec<_> = self.txs.iter().map(|t| t.hash()).collect();
        calculate_merkle_root(&hashes)
    }
}

impl From<BlockHeader> for Block {
    fn from(header: BlockHeader) -> Self {
        Block {
            header,
            txs: Vec::new(),
        }
    }
}

impl Encodable for Block {
    fn from_binary(buffer: &mut dyn Buf) -> Result<Self>
    where
        Self: Sized,
    {
        let header = BlockHeader::from_binary(buffer)?;
        // a transaction is at least 10 bytes
        let n = varint_decode_len(buffer, 10)?;
        let mut txs = Vec::with_capacity(n);
        for _ in 0..n {
            txs.push(Tx::from_binary(buffer)?);
        }
        Ok(Block { header, txs })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> Result<()> {
        self.header.to_binary(buffer)?;
        varint_encode(buffer, self.txs.len() as u64)?;
        for tx in &self.txs {
            tx.to_binary(buffer)?;
        }
        Ok(())
    }

    fn encoded_size(&self) -> u64 {
        BlockHeader::SIZE as u64
            + varint_size(self.txs.len() as u64)
            + self.txs.iter().map(|t| t.encoded_size()).sum::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::{BlockchainId, ChainParams, Hash, Outpoint, Script, TxInput, TxOutput};

    fn coinbase(tag: u8) -> Tx {
        Tx {
            version: 1,
            inputs: vec![TxInput::new(Outpoint::NULL, Script::from(vec![0x01, tag]))],
            outputs: vec![TxOutput::new(50, Script::from(vec![0x51]))],
            lock_time: 0,
        }
    }

    #[test]
    fn encode_decode_with_transactions() {
        let params = ChainParams::for_chain(BlockchainId::Regtest);
        let txs = vec![coinbase(1), coinbase(2)];
        let mut header = params.genesis.clone();
        header.prev_hash = params.genesis_hash();
        let block = Block::new(header, txs);
        let bytes = block.to_bytes().unwrap();
        assert_eq!(bytes.len() as u64, block.encoded_size());
        let back = Block::from_binary(&mut bytes.clone()).unwrap();
        assert_eq!(back, block);
        assert_eq!(back.hash(), block.hash());
    }

    #[test]
    fn single_tx_root_is_tx_hash() {
        let tx = coinbase(7);
        let block = Block::new(BlockHeader::default(), vec![tx.clone()]);
        assert_eq!(block.calculate_merkle_root().unwrap(), tx.hash());
    }

    #[test]
    fn header_only_block() {
        let block = Block::from(BlockHeader::default());
        assert!(block.is_header_only());
        assert!(block.calculate_merkle_root().is_err());
        assert_eq!(block.prev_hash(), Hash::ZERO);
    }
}
