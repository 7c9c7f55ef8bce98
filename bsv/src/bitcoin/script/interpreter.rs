use crate::bitcoin::hash160::Hash160;
use crate::bitcoin::script::num::{
    cast_to_bool, decode_num, encode_num, MAX_LOCKTIME_NUM_SIZE, MAX_NUM_SIZE,
};
use crate::bitcoin::script::sighash::{
    is_canonical_pubkey, is_canonical_signature, signature_hash, signature_pattern,
    Secp256k1Verifier, SignatureVerifier,
};
use crate::bitcoin::script::{
    Operation, Script, ScriptError, VerifyFlags, MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE,
};
use crate::bitcoin::{Hash, Tx};
use bytes::Bytes;
use ring::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY};
use std::sync::Arc;

/// Maximum number of operations above OP_16 in one script, multisig keys included.
pub const MAX_OPS_PER_SCRIPT: usize = 201;
/// Maximum combined size of the main and alt stacks.
pub const MAX_STACK_SIZE: usize = 1000;
pub const MAX_PUBKEYS_PER_MULTISIG: i64 = 20;

type Result<T> = std::result::Result<T, ScriptError>;

/// The transaction input being verified.
#[derive(Debug, Clone, Copy)]
pub struct TxContext<'a> {
    pub tx: &'a Tx,
    pub input_index: usize,
}

impl<'a> TxContext<'a> {
    pub fn new(tx: &'a Tx, input_index: usize) -> TxContext<'a> {
        TxContext { tx, input_index }
    }
}

/// Evaluates scripts.
///
/// The interpreter itself holds no evaluation state, every call works on its own stacks, so a
/// single instance can be shared between tasks.
#[derive(Clone)]
pub struct ScriptInterpreter {
    verifier: Arc<dyn SignatureVerifier>,
}

impl Default for ScriptInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptInterpreter {
    /// An interpreter verifying signatures with libsecp256k1.
    pub fn new() -> Self {
        Self::with_verifier(Arc::new(Secp256k1Verifier::new()))
    }

    pub fn with_verifier(verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { verifier }
    }

    /// Check that `script_sig` satisfies `script_pubkey` for the input described by `ctx`.
    pub fn execute(
        &self,
        ctx: &TxContext,
        script_sig: &Script,
        script_pubkey: &Script,
        flags: VerifyFlags,
    ) -> Result<()> {
        if ctx.input_index >= ctx.tx.inputs.len() {
            return Err(ScriptError::NoTransactionContext);
        }
        self.verify_spend(Some(ctx), script_sig, script_pubkey, flags)
    }

    /// Same as [ScriptInterpreter::execute()] without a transaction. Signature and locktime
    /// checks fail with [ScriptError::NoTransactionContext].
    pub fn execute_without_tx(
        &self,
        script_sig: &Script,
        script_pubkey: &Script,
        flags: VerifyFlags,
    ) -> Result<()> {
        self.verify_spend(None, script_sig, script_pubkey, flags)
    }

    fn verify_spend(
        &self,
        ctx: Option<&TxContext>,
        script_sig: &Script,
        script_pubkey: &Script,
        flags: VerifyFlags,
    ) -> Result<()> {
        if flags.contains(VerifyFlags::SIGPUSHONLY) && !script_sig.is_push_only() {
            return Err(ScriptError::SigPushOnly);
        }

        let mut stack = Vec::new();
        self.eval(&mut stack, script_sig, ctx, flags)?;
        let p2sh_stack = stack.clone();
        self.eval(&mut stack, script_pubkey, ctx, flags)?;
        if !stack.last().is_some_and(|top| cast_to_bool(top)) {
            return Err(ScriptError::EvalFalse);
        }

        let p2sh = flags.contains(VerifyFlags::P2SH);
        if p2sh && script_pubkey.is_pay_to_script_hash() {
            if !script_sig.is_push_only() {
                return Err(ScriptError::P2shNotPushOnly);
            }
            stack = p2sh_stack;
            let redeem = stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
            self.eval(&mut stack, &Script::new(redeem), ctx, flags)?;
            if !stack.last().is_some_and(|top| cast_to_bool(top)) {
                return Err(ScriptError::EvalFalse);
            }
        }

        if p2sh && flags.contains(VerifyFlags::CLEANSTACK) && stack.len() != 1 {
            return Err(ScriptError::CleanStack);
        }
        Ok(())
    }

    /// Run a single script on `stack`. The stack is left as the script left it, on error too.
    pub fn eval(
        &self,
        stack: &mut Vec<Bytes>,
        script: &Script,
        ctx: Option<&TxContext>,
        flags: VerifyFlags,
    ) -> Result<()> {
        if script.len() > MAX_SCRIPT_SIZE {
            return Err(ScriptError::ScriptSize);
        }
        let ops = script.chunks_with_offsets()?;
        let mut machine = Machine {
            stack,
            alt: Vec::new(),
            if_stack: Vec::new(),
            op_count: 0,
            code_sep: 0,
            script,
            ctx,
            flags,
            verifier: self.verifier.as_ref(),
        };
        for (end, op) in ops.iter() {
            machine.step(op, *end)?;
        }
        if !machine.if_stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional);
        }
        Ok(())
    }
}

// State of one script evaluation.
struct Machine<'a> {
    stack: &'a mut Vec<Bytes>,
    alt: Vec<Bytes>,
    if_stack: Vec<bool>,
    op_count: usize,
    // offset of the byte after the last executed OP_CODESEPARATOR
    code_sep: usize,
    script: &'a Script,
    ctx: Option<&'a TxContext<'a>>,
    flags: VerifyFlags,
    verifier: &'a dyn SignatureVerifier,
}

impl<'a> Machine<'a> {
    fn step(&mut self, op: &Operation, end: usize) -> Result<()> {
        let executing = self.if_stack.iter().all(|b| *b);

        if op.push_data().is_some_and(|d| d.len() > MAX_SCRIPT_ELEMENT_SIZE) {
            return Err(ScriptError::PushSize);
        }
        if op.counts_toward_limit() {
            self.op_count += 1;
            if self.op_count > MAX_OPS_PER_SCRIPT {
                return Err(ScriptError::OpCount);
            }
        }
        if op.is_disabled() {
            return Err(ScriptError::DisabledOpcode(op.opcode()));
        }
        if matches!(op, Operation::OP_VERIF | Operation::OP_VERNOTIF) {
            return Err(ScriptError::BadOpcode(op.opcode()));
        }

        match op {
            Operation::OP_0 if executing => self.stack.push(Bytes::new()),
            Operation::OP_PUSH(data)
            | Operation::OP_PUSHDATA1(data)
            | Operation::OP_PUSHDATA2(data)
            | Operation::OP_PUSHDATA4(data)
                if executing =>
            {
                if self.flags.contains(VerifyFlags::MINIMALDATA) && !op.is_minimal_push() {
                    return Err(ScriptError::MinimalData);
                }
                self.stack.push(data.clone());
            }
            _ if executing || op.is_conditional() => self.execute(op, executing, end)?,
            _ => {}
        }

        if self.stack.len() + self.alt.len() > MAX_STACK_SIZE {
            return Err(ScriptError::StackSize);
        }
        Ok(())
    }

    fn execute(&mut self, op: &Operation, executing: bool, end: usize) -> Result<()> {
        use Operation::*;

        match op {
            OP_1NEGATE | OP_1 | OP_2 | OP_3 | OP_4 | OP_5 | OP_6 | OP_7 | OP_8 | OP_9 | OP_10
            | OP_11 | OP_12 | OP_13 | OP_14 | OP_15 | OP_16 => {
                let n = op.small_int_value().ok_or(ScriptError::BadOpcode(op.opcode()))?;
                self.push_num(n);
            }
            OP_NOP => {}
            OP_CHECKLOCKTIMEVERIFY => {
                if self.flags.contains(VerifyFlags::CHECKLOCKTIMEVERIFY) {
                    self.check_lock_time()?;
                } else {
                    self.upgradable_nop()?;
                }
            }
            _ if op.is_upgradable_nop() => self.upgradable_nop()?,

            OP_IF | OP_NOTIF => {
                let mut value = false;
                if executing {
                    let top = self.stack.pop().ok_or(ScriptError::UnbalancedConditional)?;
                    value = cast_to_bool(&top);
                    if *op == OP_NOTIF {
                        value = !value;
                    }
                }
                self.if_stack.push(value);
            }
            OP_ELSE => {
                let last = self
                    .if_stack
                    .last_mut()
                    .ok_or(ScriptError::UnbalancedConditional)?;
                *last = !*last;
            }
            OP_ENDIF => {
                self.if_stack.pop().ok_or(ScriptError::UnbalancedConditional)?;
            }
            OP_VERIFY => {
                if !cast_to_bool(self.top(0)?) {
                    return Err(ScriptError::VerifyFailed("OP_VERIFY"));
                }
                self.pop()?;
            }
            OP_RETURN => return Err(ScriptError::OpReturn),

            OP_TOALTSTACK => {
                let v = self.pop()?;
                self.alt.push(v);
            }
            OP_FROMALTSTACK => {
                let v = self.alt.pop().ok_or(ScriptError::InvalidAltStackOperation)?;
                self.stack.push(v);
            }
            OP_2DROP => {
                self.require(2)?;
                self.stack.truncate(self.stack.len() - 2);
            }
            OP_2DUP => {
                self.require(2)?;
                let (a, b) = (self.top(1)?.clone(), self.top(0)?.clone());
                self.stack.extend([a, b]);
            }
            OP_3DUP => {
                self.require(3)?;
                let (a, b, c) = (self.top(2)?.clone(), self.top(1)?.clone(), self.top(0)?.clone());
                self.stack.extend([a, b, c]);
            }
            OP_2OVER => {
                self.require(4)?;
                let (a, b) = (self.top(3)?.clone(), self.top(2)?.clone());
                self.stack.extend([a, b]);
            }
            OP_2ROT => {
                self.require(6)?;
                let start = self.stack.len() - 6;
                let moved: Vec<Bytes> = self.stack.drain(start..start + 2).collect();
                self.stack.extend(moved);
            }
            OP_2SWAP => {
                self.require(4)?;
                let len = self.stack.len();
                self.stack.swap(len - 4, len - 2);
                self.stack.swap(len - 3, len - 1);
            }
            OP_IFDUP => {
                let top = self.top(0)?.clone();
                if cast_to_bool(&top) {
                    self.stack.push(top);
                }
            }
            OP_DEPTH => self.push_num(self.stack.len() as i64),
            OP_DROP => {
                self.pop()?;
            }
            OP_DUP => {
                let top = self.top(0)?.clone();
                self.stack.push(top);
            }
            OP_NIP => {
                self.require(2)?;
                let len = self.stack.len();
                self.stack.remove(len - 2);
            }
            OP_OVER => {
                let v = self.top(1)?.clone();
                self.stack.push(v);
            }
            OP_PICK | OP_ROLL => {
                let n = self.pop_num(MAX_NUM_SIZE)?;
                if n < 0 || n as usize >= self.stack.len() {
                    return Err(ScriptError::InvalidStackOperation);
                }
                let n = n as usize;
                let v = self.top(n)?.clone();
                if *op == OP_ROLL {
                    let len = self.stack.len();
                    self.stack.remove(len - 1 - n);
                }
                self.stack.push(v);
            }
            OP_ROT => {
                self.require(3)?;
                let len = self.stack.len();
                self.stack.swap(len - 3, len - 2);
                self.stack.swap(len - 2, len - 1);
            }
            OP_SWAP => {
                self.require(2)?;
                let len = self.stack.len();
                self.stack.swap(len - 2, len - 1);
            }
            OP_TUCK => {
                self.require(2)?;
                let v = self.top(0)?.clone();
                let len = self.stack.len();
                self.stack.insert(len - 2, v);
            }
            OP_SIZE => {
                let size = self.top(0)?.len();
                self.push_num(size as i64);
            }

            OP_EQUAL | OP_EQUALVERIFY => {
                self.require(2)?;
                let b = self.pop()?;
                let a = self.pop()?;
                let equal = a == b;
                if *op == OP_EQUALVERIFY {
                    if !equal {
                        return Err(ScriptError::VerifyFailed("OP_EQUALVERIFY"));
                    }
                } else {
                    self.push_bool(equal);
                }
            }

            OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                let n = self.pop_num(MAX_NUM_SIZE)?;
                let r = match op {
                    OP_1ADD => n + 1,
                    OP_1SUB => n - 1,
                    OP_NEGATE => -n,
                    OP_ABS => n.abs(),
                    OP_NOT => (n == 0) as i64,
                    _ => (n != 0) as i64,
                };
                self.push_num(r);
            }
            OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMEQUALVERIFY
            | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_GREATERTHAN | OP_LESSTHANOREQUAL
            | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                self.require(2)?;
                let b = self.pop_num(MAX_NUM_SIZE)?;
                let a = self.pop_num(MAX_NUM_SIZE)?;
                let r = match op {
                    OP_ADD => a + b,
                    OP_SUB => a - b,
                    OP_BOOLAND => (a != 0 && b != 0) as i64,
                    OP_BOOLOR => (a != 0 || b != 0) as i64,
                    OP_NUMEQUAL | OP_NUMEQUALVERIFY => (a == b) as i64,
                    OP_NUMNOTEQUAL => (a != b) as i64,
                    OP_LESSTHAN => (a < b) as i64,
                    OP_GREATERTHAN => (a > b) as i64,
                    OP_LESSTHANOREQUAL => (a <= b) as i64,
                    OP_GREATERTHANOREQUAL => (a >= b) as i64,
                    OP_MIN => a.min(b),
                    _ => a.max(b),
                };
                if *op == OP_NUMEQUALVERIFY {
                    if r == 0 {
                        return Err(ScriptError::VerifyFailed("OP_NUMEQUALVERIFY"));
                    }
                } else {
                    self.push_num(r);
                }
            }
            OP_WITHIN => {
                self.require(3)?;
                let max = self.pop_num(MAX_NUM_SIZE)?;
                let min = self.pop_num(MAX_NUM_SIZE)?;
                let x = self.pop_num(MAX_NUM_SIZE)?;
                self.push_bool(min <= x && x < max);
            }

            OP_RIPEMD160 | OP_SHA1 | OP_SHA256 | OP_HASH160 | OP_HASH256 => {
                let data = self.pop()?;
                let hashed = match op {
                    OP_RIPEMD160 => Hash160::ripemd160(&data).to_vec(),
                    OP_SHA1 => digest(&SHA1_FOR_LEGACY_USE_ONLY, &data).as_ref().to_vec(),
                    OP_SHA256 => Hash::sha256(&data).raw.to_vec(),
                    OP_HASH160 => Hash160::generate(&data).hash.to_vec(),
                    _ => Hash::sha256d(&data).raw.to_vec(),
                };
                self.stack.push(Bytes::from(hashed));
            }

            OP_CODESEPARATOR => self.code_sep = end,

            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                self.require(2)?;
                let pubkey = self.pop()?;
                let sig = self.pop()?;
                let connected = self
                    .script
                    .subscript_from(self.code_sep)
                    .find_and_delete(&signature_pattern(&sig));
                let ok = self.check_sig(&sig, &pubkey, &connected)?;
                if *op == OP_CHECKSIGVERIFY {
                    if !ok {
                        return Err(ScriptError::VerifyFailed("OP_CHECKSIGVERIFY"));
                    }
                } else {
                    self.push_bool(ok);
                }
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                let ok = self.check_multisig()?;
                if *op == OP_CHECKMULTISIGVERIFY {
                    if !ok {
                        return Err(ScriptError::VerifyFailed("OP_CHECKMULTISIGVERIFY"));
                    }
                } else {
                    self.push_bool(ok);
                }
            }

            _ => return Err(ScriptError::BadOpcode(op.opcode())),
        }
        Ok(())
    }

    fn upgradable_nop(&self) -> Result<()> {
        if self.flags.contains(VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
            return Err(ScriptError::DiscourageUpgradableNops);
        }
        Ok(())
    }

    // Leaves the operand on the stack, the opcode still behaves as a NOP for old nodes.
    fn check_lock_time(&self) -> Result<()> {
        let minimal = self.flags.contains(VerifyFlags::MINIMALDATA);
        let lock_time = decode_num(self.top(0)?, minimal, MAX_LOCKTIME_NUM_SIZE)?;
        if lock_time < 0 {
            return Err(ScriptError::NegativeLockTime);
        }
        let ctx = self.ctx.ok_or(ScriptError::NoTransactionContext)?;
        let tx_lock_time = ctx.tx.lock_time as i64;
        let threshold = Tx::LOCKTIME_THRESHOLD as i64;
        if (tx_lock_time < threshold) != (lock_time < threshold) {
            return Err(ScriptError::LockTimeTypeMismatch);
        }
        if lock_time > tx_lock_time {
            return Err(ScriptError::LockTimeNotSatisfied);
        }
        let input = ctx
            .tx
            .inputs
            .get(ctx.input_index)
            .ok_or(ScriptError::NoTransactionContext)?;
        if input.is_final() {
            return Err(ScriptError::FinalInputForLockTime);
        }
        Ok(())
    }

    fn check_multisig(&mut self) -> Result<bool> {
        let key_count = self.pop_num(MAX_NUM_SIZE)?;
        if !(0..=MAX_PUBKEYS_PER_MULTISIG).contains(&key_count) {
            return Err(ScriptError::PubKeyCount);
        }
        self.op_count += key_count as usize;
        if self.op_count > MAX_OPS_PER_SCRIPT {
            return Err(ScriptError::OpCount);
        }
        let key_count = key_count as usize;
        self.require(key_count)?;
        // popping yields keys, then signatures, from the last pushed to the first
        let keys: Vec<Bytes> = (0..key_count).map(|_| self.pop()).collect::<Result<_>>()?;

        let sig_count = self.pop_num(MAX_NUM_SIZE)?;
        if sig_count < 0 || sig_count as usize > key_count {
            return Err(ScriptError::SigCount);
        }
        let sig_count = sig_count as usize;
        // the signatures plus the extra element consumed for compatibility
        self.require(sig_count + 1)?;
        let sigs: Vec<Bytes> = (0..sig_count).map(|_| self.pop()).collect::<Result<_>>()?;

        let mut connected = self.script.subscript_from(self.code_sep);
        for sig in sigs.iter() {
            connected = connected.find_and_delete(&signature_pattern(sig));
        }

        let mut success = true;
        let (mut isig, mut ikey) = (0, 0);
        let (mut sigs_left, mut keys_left) = (sig_count, key_count);
        while success && sigs_left > 0 {
            if self.check_sig(&sigs[isig], &keys[ikey], &connected)? {
                isig += 1;
                sigs_left -= 1;
            }
            ikey += 1;
            keys_left -= 1;
            // a skipped key can not be used later
            if sigs_left > keys_left {
                success = false;
            }
        }

        let dummy = self.pop()?;
        if self.flags.contains(VerifyFlags::NULLDUMMY) && !dummy.is_empty() {
            return Err(ScriptError::NullDummy);
        }
        Ok(success)
    }

    // Err only when there is no transaction to check against, a bad signature is Ok(false).
    fn check_sig(&self, sig: &[u8], pubkey: &[u8], connected: &Script) -> Result<bool> {
        let ctx = self.ctx.ok_or(ScriptError::NoTransactionContext)?;
        let Some((&hash_type, der)) = sig.split_last() else {
            return Ok(false);
        };
        if !is_canonical_signature(sig, self.flags) || !is_canonical_pubkey(pubkey, self.flags) {
            return Ok(false);
        }
        let Ok(hash) = signature_hash(ctx.tx, ctx.input_index, connected, hash_type) else {
            return Ok(false);
        };
        Ok(self.verifier.verify(&hash, der, pubkey))
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.stack.len() < n {
            return Err(ScriptError::InvalidStackOperation);
        }
        Ok(())
    }

    // depth 0 is the top of the stack
    fn top(&self, depth: usize) -> Result<&Bytes> {
        let len = self.stack.len();
        if depth >= len {
            return Err(ScriptError::InvalidStackOperation);
        }
        Ok(&self.stack[len - 1 - depth])
    }

    fn pop(&mut self) -> Result<Bytes> {
        self.stack.pop().ok_or(ScriptError::InvalidStackOperation)
    }

    fn pop_num(&mut self, max_len: usize) -> Result<i64> {
        let v = self.pop()?;
        decode_num(&v, self.flags.contains(VerifyFlags::MINIMALDATA), max_len)
    }

    fn push_num(&mut self, n: i64) {
        self.stack.push(encode_num(n));
    }

    fn push_bool(&mut self, b: bool) {
        self.stack.push(if b { Bytes::from_static(&[1]) } else { Bytes::new() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::script::sighash::{sign_input, SigHashType};
    use crate::bitcoin::script::ScriptBuilder;
    use crate::bitcoin::{Outpoint, PrivateKey, TxInput, TxOutput};

    fn run(ops: &[Operation]) -> Result<Vec<Bytes>> {
        let mut stack = Vec::new();
        let script = Script::from_chunks(ops);
        ScriptInterpreter::new().eval(&mut stack, &script, None, VerifyFlags::NONE)?;
        Ok(stack)
    }

    fn nums(values: &[i64]) -> Vec<Bytes> {
        values.iter().map(|v| encode_num(*v)).collect()
    }

    // a spend of output 0 of a made up transaction
    fn spending_tx(lock_time: u32, sequence: u32) -> Tx {
        let mut input = TxInput::new(Outpoint::new(Hash::sha256d(b"prev"), 0), Script::default());
        input.sequence = sequence;
        Tx {
            version: 1,
            inputs: vec![input],
            outputs: vec![TxOutput::new(50_000, Script::from(vec![0x51]))],
            lock_time,
        }
    }

    #[test]
    fn stack_operations() {
        use Operation::*;
        assert_eq!(run(&[OP_1, OP_2, OP_SWAP]).unwrap(), nums(&[2, 1]));
        assert_eq!(run(&[OP_1, OP_2, OP_3, OP_ROT]).unwrap(), nums(&[2, 3, 1]));
        assert_eq!(run(&[OP_1, OP_2, OP_TUCK]).unwrap(), nums(&[2, 1, 2]));
        assert_eq!(run(&[OP_1, OP_2, OP_3, OP_4, OP_2SWAP]).unwrap(), nums(&[3, 4, 1, 2]));
        assert_eq!(
            run(&[OP_1, OP_2, OP_3, OP_4, OP_5, OP_6, OP_2ROT]).unwrap(),
            nums(&[3, 4, 5, 6, 1, 2])
        );
        assert_eq!(run(&[OP_1, OP_2, OP_3, OP_2, OP_PICK]).unwrap(), nums(&[1, 2, 3, 1]));
        assert_eq!(run(&[OP_1, OP_2, OP_3, OP_2, OP_ROLL]).unwrap(), nums(&[2, 3, 1]));
        assert_eq!(run(&[OP_1, OP_2, OP_DEPTH]).unwrap(), nums(&[1, 2, 2]));
        assert_eq!(run(&[OP_1, OP_TOALTSTACK, OP_2, OP_FROMALTSTACK]).unwrap(), nums(&[2, 1]));
    }

    #[test]
    fn underflow_is_an_error() {
        use Operation::*;
        assert_eq!(run(&[OP_DUP]), Err(ScriptError::InvalidStackOperation));
        assert_eq!(run(&[OP_1, OP_SWAP]), Err(ScriptError::InvalidStackOperation));
        assert_eq!(run(&[OP_1, OP_5, OP_PICK]), Err(ScriptError::InvalidStackOperation));
        assert_eq!(run(&[OP_FROMALTSTACK]), Err(ScriptError::InvalidAltStackOperation));
    }

    #[test]
    fn arithmetic() {
        use Operation::*;
        assert_eq!(run(&[OP_2, OP_3, OP_ADD]).unwrap(), nums(&[5]));
        assert_eq!(run(&[OP_2, OP_3, OP_SUB]).unwrap(), nums(&[-1]));
        assert_eq!(run(&[OP_1NEGATE, OP_ABS]).unwrap(), nums(&[1]));
        assert_eq!(run(&[OP_3, OP_2, OP_5, OP_WITHIN]).unwrap(), nums(&[1]));
        assert_eq!(run(&[OP_5, OP_2, OP_5, OP_WITHIN]).unwrap(), nums(&[0]));
        assert_eq!(run(&[OP_2, OP_7, OP_MAX]).unwrap(), nums(&[7]));
        assert_eq!(run(&[OP_0, OP_NOT]).unwrap(), nums(&[1]));
    }

    #[test]
    fn five_byte_operand_overflows() {
        let ops = [Operation::push(vec![1u8, 2, 3, 4, 5]), Operation::OP_1ADD];
        assert_eq!(run(&ops), Err(ScriptError::NumberOverflow));
    }

    #[test]
    fn disabled_opcodes_fail_even_unexecuted() {
        use Operation::*;
        assert_eq!(run(&[OP_0, OP_IF, OP_CAT, OP_ENDIF]), Err(ScriptError::DisabledOpcode(0x7e)));
        assert_eq!(run(&[OP_0, OP_IF, OP_VERIF, OP_ENDIF]), Err(ScriptError::BadOpcode(0x65)));
        // reserved opcodes only fail when executed
        assert!(run(&[OP_0, OP_IF, OP_RESERVED, OP_ENDIF]).is_ok());
        assert_eq!(run(&[OP_RESERVED]), Err(ScriptError::BadOpcode(0x50)));
        assert_eq!(run(&[OP_UNKNOWN(0xba)]), Err(ScriptError::BadOpcode(0xba)));
    }

    #[test]
    fn conditionals() {
        use Operation::*;
        assert_eq!(run(&[OP_1, OP_IF, OP_2, OP_ELSE, OP_3, OP_ENDIF]).unwrap(), nums(&[2]));
        assert_eq!(run(&[OP_0, OP_IF, OP_2, OP_ELSE, OP_3, OP_ENDIF]).unwrap(), nums(&[3]));
        assert_eq!(run(&[OP_0, OP_NOTIF, OP_2, OP_ENDIF]).unwrap(), nums(&[2]));
        // nested inside an unexecuted branch
        assert_eq!(
            run(&[OP_0, OP_IF, OP_1, OP_IF, OP_2, OP_ENDIF, OP_ELSE, OP_3, OP_ENDIF]).unwrap(),
            nums(&[3])
        );
    }

    #[test]
    fn unbalanced_conditionals_always_fail() {
        use Operation::*;
        assert_eq!(run(&[OP_1, OP_IF, OP_2]), Err(ScriptError::UnbalancedConditional));
        assert_eq!(run(&[OP_0, OP_NOTIF, OP_2]), Err(ScriptError::UnbalancedConditional));
        assert_eq!(run(&[OP_0, OP_IF, OP_ELSE]), Err(ScriptError::UnbalancedConditional));
        assert_eq!(run(&[OP_ENDIF]), Err(ScriptError::UnbalancedConditional));
        assert_eq!(run(&[OP_ELSE]), Err(ScriptError::UnbalancedConditional));
        assert_eq!(run(&[OP_IF, OP_ENDIF]), Err(ScriptError::UnbalancedConditional));
    }

    #[test]
    fn empty_result_is_not_success() {
        let interpreter = ScriptInterpreter::new();
        let empty = Script::default();
        assert_eq!(
            interpreter.execute_without_tx(&empty, &empty, VerifyFlags::NONE),
            Err(ScriptError::EvalFalse)
        );
        let drop = Script::from_chunks(&[Operation::OP_1, Operation::OP_DROP]);
        assert_eq!(
            interpreter.execute_without_tx(&empty, &drop, VerifyFlags::NONE),
            Err(ScriptError::EvalFalse)
        );
        let truthy = Script::from_chunks(&[Operation::OP_1]);
        assert!(interpreter.execute_without_tx(&empty, &truthy, VerifyFlags::NONE).is_ok());
    }

    #[test]
    fn limits() {
        let big_push = Script::from_chunks(&[Operation::push(vec![1u8; 521])]);
        let mut stack = Vec::new();
        let i = ScriptInterpreter::new();
        assert_eq!(
            i.eval(&mut stack, &big_push, None, VerifyFlags::NONE),
            Err(ScriptError::PushSize)
        );

        let nops = Script::from(vec![0x61u8; 202]);
        assert_eq!(i.eval(&mut stack, &nops, None, VerifyFlags::NONE), Err(ScriptError::OpCount));
        let nops = Script::from(vec![0x61u8; 201]);
        assert!(i.eval(&mut stack, &nops, None, VerifyFlags::NONE).is_ok());

        let huge = Script::from(vec![0x61u8; MAX_SCRIPT_SIZE + 1]);
        assert_eq!(
            i.eval(&mut stack, &huge, None, VerifyFlags::NONE),
            Err(ScriptError::ScriptSize)
        );

        // pushes do not count as operations, so only the stack limit applies
        assert_eq!(run(&vec![Operation::OP_1; 1001]), Err(ScriptError::StackSize));
        assert_eq!(run(&vec![Operation::OP_1; 1000]).unwrap().len(), 1000);
    }

    #[test]
    fn hashes() {
        let stack = run(&[Operation::OP_0, Operation::OP_SHA1]).unwrap();
        assert_eq!(hex::encode(&stack[0]), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        let stack = run(&[Operation::OP_0, Operation::OP_SHA256]).unwrap();
        assert_eq!(
            hex::encode(&stack[0]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let stack = run(&[Operation::OP_0, Operation::OP_HASH160]).unwrap();
        assert_eq!(hex::encode(&stack[0]), "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb");
    }

    #[test]
    fn minimal_data() {
        let i = ScriptInterpreter::new();
        let non_minimal = Script::from(vec![0x01, 0x05]);
        let mut stack = Vec::new();
        assert_eq!(
            i.eval(&mut stack, &non_minimal, None, VerifyFlags::MINIMALDATA),
            Err(ScriptError::MinimalData)
        );
        assert!(i.eval(&mut stack, &non_minimal, None, VerifyFlags::NONE).is_ok());
    }

    #[test]
    fn empty_pushdata_is_not_minimal() {
        let i = ScriptInterpreter::new();
        for raw in [vec![0x4c, 0x00], vec![0x4d, 0, 0], vec![0x4e, 0, 0, 0, 0]] {
            let script = Script::from(raw);
            let mut stack = Vec::new();
            assert_eq!(
                i.eval(&mut stack, &script, None, VerifyFlags::MINIMALDATA),
                Err(ScriptError::MinimalData)
            );
            let mut stack = Vec::new();
            assert!(i.eval(&mut stack, &script, None, VerifyFlags::NONE).is_ok());
            assert_eq!(stack, vec![Bytes::new()]);
        }
        let mut stack = Vec::new();
        assert!(i
            .eval(&mut stack, &Script::from(vec![0x00]), None, VerifyFlags::MINIMALDATA)
            .is_ok());
    }

    #[test]
    fn upgradable_nops() {
        let i = ScriptInterpreter::new();
        let script = Script::from_chunks(&[Operation::OP_NOP5, Operation::OP_1]);
        assert!(i.execute_without_tx(&Script::default(), &script, VerifyFlags::NONE).is_ok());
        assert_eq!(
            i.execute_without_tx(
                &Script::default(),
                &script,
                VerifyFlags::DISCOURAGE_UPGRADABLE_NOPS
            ),
            Err(ScriptError::DiscourageUpgradableNops)
        );
    }

    fn cltv_script(lock: i64) -> Script {
        ScriptBuilder::new()
            .add(Operation::push(encode_num(lock)))
            .add(Operation::OP_CHECKLOCKTIMEVERIFY)
            .add(Operation::OP_DROP)
            .add(Operation::OP_1)
            .build()
    }

    #[test]
    fn lock_time_not_satisfied() {
        let tx = spending_tx(499_999, 0);
        let ctx = TxContext::new(&tx, 0);
        let r = ScriptInterpreter::new().execute(
            &ctx,
            &Script::default(),
            &cltv_script(500_000),
            VerifyFlags::CHECKLOCKTIMEVERIFY,
        );
        assert_eq!(r, Err(ScriptError::LockTimeNotSatisfied));
        assert_eq!(
            r.unwrap_err().to_string(),
            "Locktime requirement not satisfied"
        );
    }

    #[test]
    fn lock_time_rules() {
        let i = ScriptInterpreter::new();
        let f = VerifyFlags::CHECKLOCKTIMEVERIFY;
        let empty = Script::default();

        let tx = spending_tx(500_000, 0);
        assert!(i.execute(&TxContext::new(&tx, 0), &empty, &cltv_script(500_000), f).is_ok());
        // height against timestamp
        assert_eq!(
            i.execute(&TxContext::new(&tx, 0), &empty, &cltv_script(600_000_000), f),
            Err(ScriptError::LockTimeTypeMismatch)
        );
        assert_eq!(
            i.execute(&TxContext::new(&tx, 0), &empty, &cltv_script(-1), f),
            Err(ScriptError::NegativeLockTime)
        );
        let final_tx = spending_tx(500_000, TxInput::SEQUENCE_FINAL);
        assert_eq!(
            i.execute(&TxContext::new(&final_tx, 0), &empty, &cltv_script(1), f),
            Err(ScriptError::FinalInputForLockTime)
        );
        // without the flag the opcode is a NOP
        assert!(i
            .execute(&TxContext::new(&tx, 0), &empty, &cltv_script(600_000_000), VerifyFlags::NONE)
            .is_ok());
    }

    fn p2pkh_spend(key: &PrivateKey, spent_with: &PrivateKey) -> (Tx, Script, Script) {
        let script_pubkey = Script::p2pkh(&key.public_key().pubkey_hash());
        let tx = spending_tx(0, TxInput::SEQUENCE_FINAL);
        let sig = sign_input(&tx, 0, &script_pubkey, spent_with, SigHashType::ALL).unwrap();
        let script_sig = ScriptBuilder::new()
            .add(Operation::push(sig))
            .add(Operation::push(spent_with.public_key().to_bytes()))
            .build();
        (tx, script_sig, script_pubkey)
    }

    #[test]
    fn pay_to_pubkey_hash() {
        let key = PrivateKey::generate();
        let (tx, script_sig, script_pubkey) = p2pkh_spend(&key, &key);
        let i = ScriptInterpreter::new();
        let ctx = TxContext::new(&tx, 0);
        assert!(i.execute(&ctx, &script_sig, &script_pubkey, VerifyFlags::STANDARD).is_ok());

        let other = PrivateKey::generate();
        let (tx, script_sig, script_pubkey) = p2pkh_spend(&key, &other);
        assert_eq!(
            i.execute(&TxContext::new(&tx, 0), &script_sig, &script_pubkey, VerifyFlags::STANDARD),
            Err(ScriptError::VerifyFailed("OP_EQUALVERIFY"))
        );
    }

    #[test]
    fn signature_over_other_tx_fails() {
        let key = PrivateKey::generate();
        let (tx, script_sig, script_pubkey) = p2pkh_spend(&key, &key);
        let mut changed = tx.clone();
        changed.outputs[0].value = 1;
        let r = ScriptInterpreter::new().execute(
            &TxContext::new(&changed, 0),
            &script_sig,
            &script_pubkey,
            VerifyFlags::STANDARD,
        );
        assert_eq!(r, Err(ScriptError::EvalFalse));
    }

    fn multisig_spend(order: [usize; 2]) -> Result<()> {
        let keys = [PrivateKey::generate(), PrivateKey::generate()];
        let pubkeys: Vec<Vec<u8>> = keys.iter().map(|k| k.public_key().to_bytes()).collect();
        let script_pubkey = Script::multisig(2, &pubkeys).unwrap();
        let tx = spending_tx(0, TxInput::SEQUENCE_FINAL);
        let mut builder = ScriptBuilder::new();
        builder.add(Operation::OP_0);
        for i in order {
            let sig = sign_input(&tx, 0, &script_pubkey, &keys[i], SigHashType::ALL).unwrap();
            builder.add(Operation::push(sig));
        }
        ScriptInterpreter::new().execute(
            &TxContext::new(&tx, 0),
            &builder.build(),
            &script_pubkey,
            VerifyFlags::P2SH | VerifyFlags::NULLDUMMY,
        )
    }

    #[test]
    fn multisig_requires_key_order() {
        assert!(multisig_spend([0, 1]).is_ok());
        assert_eq!(multisig_spend([1, 0]), Err(ScriptError::EvalFalse));
    }

    #[test]
    fn multisig_counts() {
        use Operation::*;
        let i = ScriptInterpreter::new();
        let mut stack = Vec::new();
        let too_many = Script::from_chunks(&[Operation::push(encode_num(21)), OP_CHECKMULTISIG]);
        assert_eq!(
            i.eval(&mut stack, &too_many, None, VerifyFlags::NONE),
            Err(ScriptError::PubKeyCount)
        );
        stack.clear();
        // 0-of-0 succeeds without a transaction
        let zero = Script::from_chunks(&[OP_0, OP_0, OP_0, OP_CHECKMULTISIG]);
        assert!(i.eval(&mut stack, &zero, None, VerifyFlags::NONE).is_ok());
        assert_eq!(stack, vec![Bytes::from_static(&[1])]);
        stack.clear();
        let dummy = Script::from_chunks(&[OP_1, OP_0, OP_0, OP_CHECKMULTISIG]);
        assert_eq!(
            i.eval(&mut stack, &dummy, None, VerifyFlags::NULLDUMMY),
            Err(ScriptError::NullDummy)
        );
    }

    #[test]
    fn pay_to_script_hash() {
        use Operation::*;
        let i = ScriptInterpreter::new();
        let redeem = Script::from_chunks(&[OP_2, OP_EQUAL]);
        let script_pubkey = Script::p2sh(&redeem);
        let good = Script::from_chunks(&[OP_2, Operation::push(redeem.raw.clone())]);
        let bad = Script::from_chunks(&[OP_3, Operation::push(redeem.raw.clone())]);

        assert!(i.execute_without_tx(&good, &script_pubkey, VerifyFlags::P2SH).is_ok());
        assert_eq!(
            i.execute_without_tx(&bad, &script_pubkey, VerifyFlags::P2SH),
            Err(ScriptError::EvalFalse)
        );
        // without the flag only the hash is checked
        assert!(i.execute_without_tx(&bad, &script_pubkey, VerifyFlags::NONE).is_ok());

        let not_push_only =
            Script::from_chunks(&[OP_2, OP_NOP, Operation::push(redeem.raw.clone())]);
        assert_eq!(
            i.execute_without_tx(&not_push_only, &script_pubkey, VerifyFlags::P2SH),
            Err(ScriptError::P2shNotPushOnly)
        );
        let extra = Script::from_chunks(&[OP_1, OP_2, Operation::push(redeem.raw.clone())]);
        assert_eq!(
            i.execute_without_tx(
                &extra,
                &script_pubkey,
                VerifyFlags::P2SH | VerifyFlags::CLEANSTACK
            ),
            Err(ScriptError::CleanStack)
        );
    }

    #[test]
    fn sig_push_only() {
        let i = ScriptInterpreter::new();
        let sig = Script::from_chunks(&[Operation::OP_1, Operation::OP_NOP]);
        let pubkey = Script::from_chunks(&[Operation::OP_1]);
        assert!(i.execute_without_tx(&sig, &pubkey, VerifyFlags::NONE).is_ok());
        assert_eq!(
            i.execute_without_tx(&sig, &pubkey, VerifyFlags::SIGPUSHONLY),
            Err(ScriptError::SigPushOnly)
        );
    }

    struct AcceptAll;

    impl SignatureVerifier for AcceptAll {
        fn verify(&self, _: &Hash, _: &[u8], _: &[u8]) -> bool {
            true
        }
    }

    #[test]
    fn verifier_is_pluggable() {
        let i = ScriptInterpreter::with_verifier(Arc::new(AcceptAll));
        let tx = spending_tx(0, TxInput::SEQUENCE_FINAL);
        let script_sig = Script::from_chunks(&[
            Operation::push(vec![0x30, 0x01]),
            Operation::push(vec![0x02; 33]),
        ]);
        let script_pubkey = Script::from_chunks(&[Operation::OP_CHECKSIG]);
        assert!(i
            .execute(&TxContext::new(&tx, 0), &script_sig, &script_pubkey, VerifyFlags::NONE)
            .is_ok());
        // canonical encoding rules apply before the verifier is asked
        assert_eq!(
            i.execute(&TxContext::new(&tx, 0), &script_sig, &script_pubkey, VerifyFlags::DERSIG),
            Err(ScriptError::EvalFalse)
        );
    }
}
