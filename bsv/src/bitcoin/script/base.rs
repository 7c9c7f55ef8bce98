use crate::bitcoin::hash160::Hash160;
use crate::bitcoin::script::{Operation, ScriptError};
use crate::bitcoin::{varint_decode_len, varint_encode, varint_size, Encodable};
use crate::Error;
use bytes::{Buf, BufMut, Bytes};
use hex::{FromHex, ToHex};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest script the interpreter will run.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Bitcoin Scripts are used to lock and unlock outputs.
///
/// This struct is a Script in its encoded form and is read-only. Use [Script::chunks()]
/// to examine a script or [ScriptBuilder](crate::bitcoin::script::ScriptBuilder) to build one.
#[derive(PartialEq, Eq, Hash, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    pub raw: Bytes,
}

impl Script {
    pub fn new(raw: impl Into<Bytes>) -> Script {
        Script { raw: raw.into() }
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Parse the script into operations.
    pub fn chunks(&self) -> Result<Vec<Operation>, ScriptError> {
        Ok(self.chunks_with_offsets()?.into_iter().map(|(_, op)| op).collect())
    }

    /// Parse the script, pairing each operation with the byte offset just past it.
    pub fn chunks_with_offsets(&self) -> Result<Vec<(usize, Operation)>, ScriptError> {
        let mut result = Vec::new();
        let mut buf = self.raw.clone();
        while buf.has_remaining() {
            let op = Operation::read(&mut buf)?;
            result.push((self.raw.len() - buf.remaining(), op));
        }
        Ok(result)
    }

    /// Serialize a list of operations.
    pub fn from_chunks(ops: &[Operation]) -> Script {
        let mut buffer = Vec::with_capacity(ops.iter().map(|o| o.size()).sum());
        for op in ops {
            op.write(&mut buffer);
        }
        Script::from(buffer)
    }

    /// The script from byte `offset` onwards.
    pub fn subscript_from(&self, offset: usize) -> Script {
        Script {
            raw: self.raw.slice(offset.min(self.raw.len())..),
        }
    }

    /// Exactly `OP_HASH160 <20 bytes> OP_EQUAL`, byte for byte.
    pub fn is_pay_to_script_hash(&self) -> bool {
        let r = &self.raw;
        r.len() == 23 && r[0] == 0xa9 && r[1] == 0x14 && r[22] == 0x87
    }

    /// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn is_pay_to_pubkey_hash(&self) -> bool {
        let r = &self.raw;
        r.len() == 25
            && r[0] == 0x76
            && r[1] == 0xa9
            && r[2] == 0x14
            && r[23] == 0x88
            && r[24] == 0xac
    }

    /// The script parses and contains nothing but pushes. A malformed script is not push-only.
    pub fn is_push_only(&self) -> bool {
        match self.chunks() {
            Ok(ops) => ops.iter().all(|o| o.is_push()),
            Err(_) => false,
        }
    }

    /// Count signature operations.
    ///
    /// When `accurate` is set a CHECKMULTISIG preceded by OP_1..OP_16 counts as that many keys,
    /// otherwise it counts 20. Parsing stops silently at a malformed push.
    pub fn sig_op_count(&self, accurate: bool) -> usize {
        let mut count = 0;
        let mut last: Option<Operation> = None;
        let mut buf = self.raw.clone();
        while buf.has_remaining() {
            let Ok(op) = Operation::read(&mut buf) else {
                break;
            };
            match op {
                Operation::OP_CHECKSIG | Operation::OP_CHECKSIGVERIFY => count += 1,
                Operation::OP_CHECKMULTISIG | Operation::OP_CHECKMULTISIGVERIFY => {
                    count += match last.as_ref().and_then(|l| l.small_int_value()) {
                        Some(n) if accurate && (1..=16).contains(&n) => n as usize,
                        _ => 20,
                    }
                }
                _ => {}
            }
            last = Some(op);
        }
        count
    }

    /// Signature operations of a P2SH spend, counted in the redeem script pushed last by
    /// `script_sig`. A non-P2SH output counts its own operations, a scriptSig that is not
    /// push-only counts zero.
    pub fn p2sh_sig_op_count(&self, script_sig: &Script) -> usize {
        if !self.is_pay_to_script_hash() {
            return self.sig_op_count(true);
        }
        let Ok(ops) = script_sig.chunks() else {
            return 0;
        };
        if !ops.iter().all(|o| o.is_push()) {
            return 0;
        }
        match ops.last().and_then(|o| o.push_data()) {
            Some(data) => Script::new(data.clone()).sig_op_count(true),
            None => 0,
        }
    }

    /// Remove every operation whose encoding equals `pattern`.
    pub fn find_and_delete(&self, pattern: &Script) -> Script {
        if pattern.is_empty() {
            return self.clone();
        }
        let Ok(ops) = self.chunks() else {
            return self.clone();
        };
        let mut buffer = Vec::with_capacity(self.raw.len());
        let mut removed = false;
        for op in ops {
            let mut encoded = Vec::with_capacity(op.size());
            op.write(&mut encoded);
            if encoded == pattern.raw.as_ref() {
                removed = true;
            } else {
                buffer.extend_from_slice(&encoded);
            }
        }
        if removed {
            Script::from(buffer)
        } else {
            self.clone()
        }
    }

    /// The script with every OP_CODESEPARATOR removed.
    pub fn without_code_separators(&self) -> Script {
        match self.chunks() {
            Ok(ops) => {
                let kept: Vec<Operation> = ops
                    .into_iter()
                    .filter(|o| *o != Operation::OP_CODESEPARATOR)
                    .collect();
                Script::from_chunks(&kept)
            }
            Err(_) => self.clone(),
        }
    }

    /// Standard pay to public key hash locking script.
    pub fn p2pkh(pubkey_hash: &Hash160) -> Script {
        Script::from_chunks(&[
            Operation::OP_DUP,
            Operation::OP_HASH160,
            Operation::push(pubkey_hash.hash.to_vec()),
            Operation::OP_EQUALVERIFY,
            Operation::OP_CHECKSIG,
        ])
    }

    /// Pay to script hash of `redeem`.
    pub fn p2sh(redeem: &Script) -> Script {
        let hash = Hash160::generate(&redeem.raw);
        Script::from_chunks(&[
            Operation::OP_HASH160,
            Operation::push(hash.hash.to_vec()),
            Operation::OP_EQUAL,
        ])
    }

    /// Bare `m`-of-n multisig over `pubkeys` in the given order.
    pub fn multisig(required: usize, pubkeys: &[Vec<u8>]) -> crate::Result<Script> {
        if required > pubkeys.len() || pubkeys.len() > 16 {
            return Err(Error::BadArgument(format!(
                "cannot build {}-of-{} multisig",
                required,
                pubkeys.len()
            )));
        }
        let mut ops = Vec::with_capacity(pubkeys.len() + 3);
        ops.push(Operation::small_int(required as i64).unwrap_or(Operation::OP_0));
        for key in pubkeys {
            ops.push(Operation::push(key.clone()));
        }
        ops.push(Operation::small_int(pubkeys.len() as i64).unwrap_or(Operation::OP_0));
        ops.push(Operation::OP_CHECKMULTISIG);
        Ok(Script::from_chunks(&ops))
    }
}

impl From<Vec<u8>> for Script {
    fn from(value: Vec<u8>) -> Self {
        Self {
            raw: Bytes::from(value),
        }
    }
}

impl From<&[u8]> for Script {
    fn from(value: &[u8]) -> Self {
        Self {
            raw: Bytes::copy_from_slice(value),
        }
    }
}

impl FromHex for Script {
    type Error = Error;

    /// Hex encoding is not prefixed by the length.
    fn from_hex<T: AsRef<[u8]>>(hex: T) -> Result<Self, Self::Error> {
        Ok(Script::from(hex::decode(hex)?))
    }
}

impl ToHex for Script {
    fn encode_hex<T: FromIterator<char>>(&self) -> T {
        self.raw.encode_hex()
    }

    fn encode_hex_upper<T: FromIterator<char>>(&self) -> T {
        self.raw.encode_hex_upper()
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", self.encode_hex::<String>())
    }
}

/// A script is always encoded with its size.
impl Encodable for Script {
    fn from_binary(buffer: &mut dyn Buf) -> crate::Result<Self>
    where
        Self: Sized,
    {
        let size = varint_decode_len(buffer, 1)?;
        Ok(Script {
            raw: buffer.copy_to_bytes(size),
        })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> crate::Result<()> {
        varint_encode(buffer, self.raw.len() as u64)?;
        buffer.put_slice(&self.raw);
        Ok(())
    }

    fn encoded_size(&self) -> u64 {
        varint_size(self.raw.len() as u64) + self.raw.len() as u64
    }
}
