use crate::bitcoin::hash::Hash;
use crate::bitcoin::script::Script;
use crate::bitcoin::{varint_decode_len, varint_encode, varint_size, Encodable};
use crate::Error;
use bytes::{Buf, BufMut, Bytes};
use hex::{FromHex, ToHex};
use serde::{Deserialize, Serialize};

/// The TxHash is used to identify transactions.
pub type TxHash = Hash;

/// A Bitcoin transaction.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Serialize, Deserialize)]
pub struct Tx {
    /// transaction version number
    pub version: u32,
    /// Vector of inputs.
    pub inputs: Vec<TxInput>,
    /// Vector of outputs.
    pub outputs: Vec<TxOutput>,
    /// lock time
    pub lock_time: u32,
}

impl Tx {
    /// Lock times below this value are block heights, at or above are unix timestamps.
    pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

    pub fn hash(&self) -> TxHash {
        Hash::sha256d(&self.encode_vec())
    }

    /// A coinbase has exactly one input and that input spends the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].outpoint.is_null()
    }

    /// Sum of all output values, None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value))
    }

    pub(crate) fn encode_vec(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(self.encoded_size() as usize);
        // writing into a Vec does not fail
        let _ = self.to_binary(&mut v);
        v
    }
}

impl FromHex for Tx {
    type Error = Error;

    fn from_hex<T: AsRef<[u8]>>(hex: T) -> Result<Self, Self::Error> {
        let mut bytes = Bytes::from(hex::decode(hex)?);
        Tx::from_binary(&mut bytes)
    }
}

impl ToHex for Tx {
    fn encode_hex<T: FromIterator<char>>(&self) -> T {
        self.encode_vec().encode_hex()
    }

    fn encode_hex_upper<T: FromIterator<char>>(&self) -> T {
        self.encode_vec().encode_hex_upper()
    }
}

impl Encodable for Tx {
    fn from_binary(buffer: &mut dyn Buf) -> crate::Result<Self>
    where
        Self: Sized,
    {
        let version = buffer.try_get_u32_le().map_err(|_| Error::DataTooSmall)?;
        // smallest input is outpoint + empty script + sequence
        let num_inputs = varint_decode_len(buffer, 41)?;
        let mut inputs = Vec::with_capacity(num_inputs);
        for _ in 0..num_inputs {
            inputs.push(TxInput::from_binary(buffer)?);
        }
        let num_outputs = varint_decode_len(buffer, 9)?;
        let mut outputs = Vec::with_capacity(num_outputs);
        for _ in 0..num_outputs {
            outputs.push(TxOutput::from_binary(buffer)?);
        }
        let lock_time = buffer.try_get_u32_le().map_err(|_| Error::DataTooSmall)?;
        Ok(Tx {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> crate::Result<()> {
        buffer.put_u32_le(self.version);
        varint_encode(buffer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.to_binary(buffer)?;
        }
        varint_encode(buffer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.to_binary(buffer)?;
        }
        buffer.put_u32_le(self.lock_time);
        Ok(())
    }

    fn encoded_size(&self) -> u64 {
        let ins: u64 = self.inputs.iter().map(|i| i.encoded_size()).sum();
        let outs: u64 = self.outputs.iter().map(|o| o.encoded_size()).sum();
        8 + varint_size(self.inputs.len() as u64)
            + ins
            + varint_size(self.outputs.len() as u64)
            + outs
    }
}

/// An Outpoint is a reference to a specific output of a specific transaction.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Outpoint {
    pub tx_hash: TxHash,
    pub index: u32,
}

impl Outpoint {
    pub const SIZE: u64 = 36;
    /// The outpoint spent by coinbase inputs.
    pub const NULL: Outpoint = Outpoint {
        tx_hash: Hash::ZERO,
        index: u32::MAX,
    };

    pub fn new(tx_hash: TxHash, index: u32) -> Outpoint {
        Outpoint { tx_hash, index }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl Encodable for Outpoint {
    fn from_binary(buffer: &mut dyn Buf) -> crate::Result<Self>
    where
        Self: Sized,
    {
        if buffer.remaining() < Self::SIZE as usize {
            return Err(Error::DataTooSmall);
        }
        let tx_hash = Hash::from_binary(buffer)?;
        let index = buffer.get_u32_le();
        Ok(Outpoint { tx_hash, index })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> crate::Result<()> {
        self.tx_hash.to_binary(buffer)?;
        buffer.put_u32_le(self.index);
        Ok(())
    }

    fn encoded_size(&self) -> u64 {
        Self::SIZE
    }
}

/// A TxInput is an input to a transaction.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Serialize, Deserialize)]
pub struct TxInput {
    pub outpoint: Outpoint,
    pub script: Script,
    pub sequence: u32,
}

impl TxInput {
    /// Sequence value marking an input as final.
    pub const SEQUENCE_FINAL: u32 = u32::MAX;

    pub fn new(outpoint: Outpoint, script: Script) -> TxInput {
        TxInput {
            outpoint,
            script,
            sequence: Self::SEQUENCE_FINAL,
        }
    }

    pub fn is_final(&self) -> bool {
        self.sequence == Self::SEQUENCE_FINAL
    }
}

impl Encodable for TxInput {
    fn from_binary(buffer: &mut dyn Buf) -> crate::Result<Self> {
        let outpoint = Outpoint::from_binary(buffer)?;
        let script = Script::from_binary(buffer)?;
        let sequence = buffer.try_get_u32_le().map_err(|_| Error::DataTooSmall)?;
        Ok(TxInput {
            outpoint,
            script,
            sequence,
        })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> crate::Result<()> {
        self.outpoint.to_binary(buffer)?;
        self.script.to_binary(buffer)?;
        buffer.put_u32_le(self.sequence);
        Ok(())
    }

    fn encoded_size(&self) -> u64 {
        Outpoint::SIZE + self.script.encoded_size() + 4
    }
}

/// A TxOutput is an output from a transaction.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub script: Script,
}

impl TxOutput {
    pub fn new(value: u64, script: Script) -> TxOutput {
        TxOutput { value, script }
    }
}

impl Encodable for TxOutput {
    fn from_binary(buffer: &mut dyn Buf) -> crate::Result<Self>
    where
        Self: Sized,
    {
        let value = buffer.try_get_u64_le().map_err(|_| Error::DataTooSmall)?;
        let script = Script::from_binary(buffer)?;
        Ok(TxOutput { value, script })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> crate::Result<()> {
        buffer.put_u64_le(self.value);
        self.script.to_binary(buffer)
    }

    fn encoded_size(&self) -> u64 {
        8 + self.script.encoded_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TX1_HEX: &str = "01000000018a052edc7ae2136bfc0a860cdc91185ab0d7329107802f0a9c1cd0026c815f75010000006b483045022100e587ef1b4497a6694cad646cab468b6ece2fa98c7f49f9488611ca34eecebd1002205c4ea9066484bd1bffb7fdd7d84b5ae0ee6b7cdc20a8a513e41e420e0633b98841210262142850483b6728b8ecd299e4d0c8cf30ea0636f66205166814e52d73b64b4bffffffff0200000000000000000a006a075354554b2e434fb8ce3f01000000001976a91454cba8da8701174e34aac2bb31d42a88e2c302d088ac00000000";
    const TX1_HASH: &str = "3abc31f8ff40ffb66d9037e156842fe782e6fa1ae728759263471c68660095f1";

    fn tx1() -> Tx {
        Tx::from_hex(TX1_HEX).unwrap()
    }

    #[test]
    fn tx_read() {
        let tx = tx1();
        assert_eq!(tx.version, 1);
        assert_eq!(tx.hash(), Hash::from_hex(TX1_HASH).unwrap());
        assert_eq!(tx.encoded_size(), (TX1_HEX.len() / 2) as u64);
        assert_eq!(tx.encode_hex::<String>(), TX1_HEX);
    }

    #[test]
    fn check_fields() {
        let tx = tx1();
        assert_eq!(tx.inputs.len(), 1);
        let i = &tx.inputs[0];
        assert_eq!(
            i.outpoint.tx_hash,
            Hash::from_hex("755f816c02d01c9c0a2f80079132d7b05a1891dc0c860afc6b13e27adc2e058a")
                .unwrap()
        );
        assert_eq!(i.outpoint.index, 1);
        assert!(i.is_final());
        assert_eq!(tx.outputs.len(), 2);
        assert!(!tx.is_coinbase());
    }

    /// If the binary is incomplete, we should get an error
    #[test]
    fn read_short() {
        let bin = hex::decode(TX1_HEX).unwrap();
        assert!(Tx::from_binary(&mut &bin[..200]).is_err());
    }

    #[test]
    fn trailing_bytes_left_in_buffer() {
        let mut bin = hex::decode(TX1_HEX).unwrap();
        bin.extend_from_slice(&[0u8; 100]);
        let mut buf = &bin[..];
        let tx = Tx::from_binary(&mut buf).unwrap();
        assert_eq!(tx.hash(), Hash::from_hex(TX1_HASH).unwrap());
        assert_eq!(buf.len(), 100);
    }

    #[test]
    fn json_round_trip() {
        let tx = tx1();
        let json = serde_json::to_string(&tx).unwrap();
        let tx2: Tx = serde_json::from_str(&json).unwrap();
        assert_eq!(tx2.hash(), tx.hash());
    }

    #[test]
    fn coinbase_detection() {
        let tx = Tx {
            version: 1,
            inputs: vec![TxInput::new(Outpoint::NULL, Script::from(vec![0x51]))],
            outputs: vec![TxOutput::new(50, Script::default())],
            lock_time: 0,
        };
        assert!(tx.is_coinbase());
        assert_eq!(tx.total_output_value(), Some(50));
    }
}
