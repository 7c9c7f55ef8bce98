use crate::bitcoin::script::num::encode_num;
use crate::bitcoin::script::{Operation, Script};
use crate::{Error, Result};
use bytes::Bytes;

/// ScriptBuilder can be used to build [Script]s.
#[derive(Default)]
pub struct ScriptBuilder {
    ops: Vec<Operation>,
}

impl ScriptBuilder {
    /// Create a new ScriptBuilder for constructing a [Script].
    pub fn new() -> ScriptBuilder {
        Self::default()
    }

    /// Build the script.
    pub fn build(&self) -> Script {
        Script::from_chunks(&self.ops)
    }

    /// Add an operation to the script.
    pub fn add(&mut self, op: Operation) -> &mut ScriptBuilder {
        self.ops.push(op);
        self
    }

    /// Push data with the smallest encoding.
    pub fn push_data(&mut self, data: impl Into<Bytes>) -> &mut ScriptBuilder {
        self.add(Operation::push(data))
    }

    /// Push a number, as OP_1NEGATE..OP_16 where possible.
    pub fn push_int(&mut self, n: i64) -> &mut ScriptBuilder {
        match Operation::small_int(n) {
            Some(op) => self.add(op),
            None => self.add(Operation::push(encode_num(n))),
        }
    }

    /// Return a copy of a multisig `script_sig` with `sig` inserted as the `position`th
    /// signature.
    ///
    /// `script_sig` must start with the OP_0 consumed by CHECKMULTISIG, positions count the
    /// pushes after it. The input script is not modified.
    pub fn insert_signature(script_sig: &Script, sig: &[u8], position: usize) -> Result<Script> {
        let mut ops = script_sig
            .chunks()
            .map_err(|e| Error::BadArgument(format!("unparsable scriptSig: {}", e)))?;
        if ops.first() != Some(&Operation::OP_0) {
            return Err(Error::BadArgument(
                "multisig scriptSig must start with OP_0".to_string(),
            ));
        }
        if position > ops.len() - 1 {
            return Err(Error::BadArgument(format!(
                "signature position {} beyond {} existing entries",
                position,
                ops.len() - 1
            )));
        }
        ops.insert(position + 1, Operation::push(Bytes::copy_from_slice(sig)));
        Ok(Script::from_chunks(&ops))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn create_p2pkh_output_script() {
        // from tx d2bb697e3555cb0e4a82f0d4990d1c826eee9f648a5efc598f648bdb524093ff output 0
        use Operation::*;
        let script = ScriptBuilder::new()
            .add(OP_DUP)
            .add(OP_HASH160)
            .push_data(hex!("6f67988ec4b7bf498c9164d76b52dffdc805ff8c").to_vec())
            .add(OP_EQUALVERIFY)
            .add(OP_CHECKSIG)
            .build();
        assert_eq!(script.raw.len(), 25);
        assert_eq!(
            script.raw,
            Bytes::from(&hex!("76a9146f67988ec4b7bf498c9164d76b52dffdc805ff8c88ac")[..])
        );
    }

    #[test]
    fn push_int_uses_small_ints() {
        let s = ScriptBuilder::new().push_int(16).push_int(-1).push_int(17).build();
        assert_eq!(s.raw.as_ref(), &[0x60, 0x4f, 0x01, 0x11]);
    }

    #[test]
    fn insert_signature_returns_new_script() {
        let original = ScriptBuilder::new().add(Operation::OP_0).push_data(vec![0xbb; 3]).build();
        let updated = ScriptBuilder::insert_signature(&original, &[0xaa; 3], 0).unwrap();
        assert_eq!(
            updated.raw.as_ref(),
            &[0x00, 0x03, 0xaa, 0xaa, 0xaa, 0x03, 0xbb, 0xbb, 0xbb]
        );
        assert_eq!(original.raw.as_ref(), &[0x00, 0x03, 0xbb, 0xbb, 0xbb]);

        let appended = ScriptBuilder::insert_signature(&original, &[0xaa; 3], 1).unwrap();
        assert_eq!(appended.chunks().unwrap()[2], Operation::push(vec![0xaa; 3]));
        assert!(ScriptBuilder::insert_signature(&original, &[0xaa], 3).is_err());
        assert!(ScriptBuilder::insert_signature(&Script::from(vec![0x51]), &[0xaa], 0).is_err());
    }
}
