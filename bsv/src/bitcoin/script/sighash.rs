use crate::bitcoin::script::{Operation, Script, VerifyFlags};
use crate::bitcoin::{Encodable, Hash, PrivateKey, Tx, TxOutput};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, Secp256k1, VerifyOnly};

/// The signature hash type byte appended to every script signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigHashType(pub u8);

impl SigHashType {
    /// Sign all inputs and outputs.
    pub const ALL: SigHashType = SigHashType(0x01);
    /// Sign all inputs but no outputs.
    pub const NONE: SigHashType = SigHashType(0x02);
    /// Sign all inputs and the output with the same index.
    pub const SINGLE: SigHashType = SigHashType(0x03);
    /// Combined with one of the above, sign only the current input.
    pub const ANYONECANPAY: SigHashType = SigHashType(0x80);

    /// The type without the ANYONECANPAY bit.
    pub fn base(&self) -> u8 {
        self.0 & 0x1f
    }

    pub fn anyone_can_pay(&self) -> bool {
        self.0 & Self::ANYONECANPAY.0 != 0
    }

    /// ALL, NONE or SINGLE with or without ANYONECANPAY and no other bits.
    pub fn is_defined(&self) -> bool {
        matches!(self.0 & !Self::ANYONECANPAY.0, 0x01..=0x03)
    }

    pub fn with_anyone_can_pay(self) -> SigHashType {
        SigHashType(self.0 | Self::ANYONECANPAY.0)
    }
}

/// Legacy signature hash of input `input_index`.
///
/// `connected_script` is the script being satisfied, from the last executed OP_CODESEPARATOR
/// onwards. `sighash` is the full type byte from the signature, including any undefined bits.
pub fn signature_hash(
    tx: &Tx,
    input_index: usize,
    connected_script: &Script,
    sighash: u8,
) -> Result<Hash> {
    if input_index >= tx.inputs.len() {
        return Err(Error::BadArgument(format!(
            "input {} of a transaction with {} inputs",
            input_index,
            tx.inputs.len()
        )));
    }
    let hash_type = SigHashType(sighash);

    // SIGHASH_SINGLE without a matching output signs the value one, kept for compatibility
    if hash_type.base() == SigHashType::SINGLE.0 && input_index >= tx.outputs.len() {
        let mut one = [0u8; 32];
        one[0] = 1;
        return Ok(Hash::from(one));
    }

    let mut copy = tx.clone();
    for input in copy.inputs.iter_mut() {
        input.script = Script::default();
    }
    copy.inputs[input_index].script = connected_script.without_code_separators();

    match hash_type.base() {
        0x02 => {
            copy.outputs.clear();
            zero_other_sequences(&mut copy, input_index);
        }
        0x03 => {
            copy.outputs.truncate(input_index + 1);
            for output in copy.outputs.iter_mut().take(input_index) {
                *output = TxOutput::new(u64::MAX, Script::default());
            }
            zero_other_sequences(&mut copy, input_index);
        }
        _ => {}
    }

    if hash_type.anyone_can_pay() {
        let input = copy.inputs.swap_remove(input_index);
        copy.inputs = vec![input];
    }

    let mut buffer = BytesMut::with_capacity(copy.encoded_size() as usize + 4);
    copy.to_binary(&mut buffer)?;
    buffer.put_u32_le(sighash as u32);
    Ok(Hash::sha256d(&buffer))
}

fn zero_other_sequences(tx: &mut Tx, input_index: usize) {
    for (i, input) in tx.inputs.iter_mut().enumerate() {
        if i != input_index {
            input.sequence = 0;
        }
    }
}

/// Sign an input, returning the DER signature followed by the hash type byte.
pub fn sign_input(
    tx: &Tx,
    input_index: usize,
    subscript: &Script,
    private_key: &PrivateKey,
    hash_type: SigHashType,
) -> Result<Bytes> {
    let sighash = signature_hash(tx, input_index, subscript, hash_type.0)?;
    let message = Message::from_digest(sighash.raw);
    let secp = Secp256k1::signing_only();
    let signature = secp.sign_ecdsa(&message, &private_key.inner);
    let mut sig = signature.serialize_der().to_vec();
    sig.push(hash_type.0);
    Ok(Bytes::from(sig))
}

/// Checks an ECDSA signature over a signature hash.
///
/// The interpreter holds one of these so that tests and embedders can substitute the curve
/// implementation.
pub trait SignatureVerifier: Send + Sync {
    /// `sig_der` is the signature without its hash type byte, `pubkey` is in SEC encoding.
    fn verify(&self, hash: &Hash, sig_der: &[u8], pubkey: &[u8]) -> bool;
}

/// Verifies with libsecp256k1. Signatures are parsed leniently and normalized to low S.
pub struct Secp256k1Verifier {
    secp: Secp256k1<VerifyOnly>,
}

impl Secp256k1Verifier {
    pub fn new() -> Secp256k1Verifier {
        Secp256k1Verifier {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for Secp256k1Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(&self, hash: &Hash, sig_der: &[u8], pubkey: &[u8]) -> bool {
        let Ok(mut sig) = Signature::from_der_lax(sig_der) else {
            return false;
        };
        sig.normalize_s();
        let Ok(key) = secp256k1::PublicKey::from_slice(pubkey) else {
            return false;
        };
        let message = Message::from_digest(hash.raw);
        self.secp.verify_ecdsa(&message, &sig, &key).is_ok()
    }
}

/// Strict DER encoding check, including the trailing hash type byte.
pub fn is_valid_signature_encoding(sig: &[u8]) -> bool {
    // 0x30 [total-length] 0x02 [R-length] [R] 0x02 [S-length] [S] [sighash]
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 3 {
        return false;
    }
    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 7 != sig.len() {
        return false;
    }
    if sig[2] != 0x02 || len_r == 0 || sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }
    if sig[len_r + 4] != 0x02 || len_s == 0 || sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }
    true
}

/// S is in the lower half of the curve order. `sig_der` excludes the hash type byte.
pub fn is_low_s(sig_der: &[u8]) -> bool {
    let Ok(sig) = Signature::from_der_lax(sig_der) else {
        return false;
    };
    let mut normalized = sig;
    normalized.normalize_s();
    normalized == sig
}

/// Apply the signature encoding rules selected by `flags`. An empty signature always passes,
/// it simply fails verification later.
pub fn is_canonical_signature(sig: &[u8], flags: VerifyFlags) -> bool {
    if sig.is_empty() {
        return true;
    }
    let strict = flags.contains(VerifyFlags::STRICTENC);
    if (strict || flags.contains(VerifyFlags::DERSIG) || flags.contains(VerifyFlags::LOW_S))
        && !is_valid_signature_encoding(sig)
    {
        return false;
    }
    if flags.contains(VerifyFlags::LOW_S) && !is_low_s(&sig[..sig.len() - 1]) {
        return false;
    }
    if strict && !SigHashType(sig[sig.len() - 1]).is_defined() {
        return false;
    }
    true
}

/// Compressed or uncompressed SEC encoding, checked only under STRICTENC.
pub fn is_canonical_pubkey(pubkey: &[u8], flags: VerifyFlags) -> bool {
    if !flags.contains(VerifyFlags::STRICTENC) {
        return true;
    }
    match pubkey.first() {
        Some(0x04) => pubkey.len() == 65,
        Some(0x02) | Some(0x03) => pubkey.len() == 33,
        _ => false,
    }
}

/// The push encoding of a signature, as removed from the connected script before hashing.
pub(crate) fn signature_pattern(sig: &[u8]) -> Script {
    Script::from_chunks(&[Operation::push(Bytes::copy_from_slice(sig))])
}
