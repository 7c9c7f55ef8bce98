use crate::bitcoin::script::ScriptError;
use bytes::Bytes;

/// Default operand length for arithmetic.
pub const MAX_NUM_SIZE: usize = 4;
/// CHECKLOCKTIMEVERIFY accepts 5 byte operands so that it can reach the full range of lock times.
pub const MAX_LOCKTIME_NUM_SIZE: usize = 5;

/// Decode a little-endian sign-magnitude stack element.
///
/// Elements longer than `max_len` are rejected. With `require_minimal` set, elements with a
/// redundant trailing zero byte are rejected too.
pub fn decode_num(bytes: &[u8], require_minimal: bool, max_len: usize) -> Result<i64, ScriptError> {
    if bytes.len() > max_len {
        return Err(ScriptError::NumberOverflow);
    }
    if require_minimal && !is_minimally_encoded(bytes) {
        return Err(ScriptError::MinimalData);
    }
    let Some((&last, _)) = bytes.split_last() else {
        return Ok(0);
    };
    let mut result: i64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        result |= (b as i64) << (8 * i);
    }
    if last & 0x80 != 0 {
        result &= !(0x80_i64 << (8 * (bytes.len() - 1)));
        return Ok(-result);
    }
    Ok(result)
}

/// The most significant byte may only be 0x00 or 0x80 when the byte before it needs its top bit.
pub fn is_minimally_encoded(bytes: &[u8]) -> bool {
    match bytes {
        [] => true,
        [.., last] if last & 0x7f != 0 => true,
        [_] => false,
        [.., prev, _] => prev & 0x80 != 0,
    }
}

/// Minimal encoding of `value`, zero is the empty array.
pub fn encode_num(value: i64) -> Bytes {
    if value == 0 {
        return Bytes::new();
    }
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    let top = out.len() - 1;
    if out[top] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[top] |= 0x80;
    }
    Bytes::from(out)
}

/// Stack truthiness: false is any run of zero bytes, optionally ending in 0x80 (negative zero).
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    for (i, &b) in bytes.iter().enumerate() {
        if b != 0 {
            return !(i == bytes.len() - 1 && b == 0x80);
        }
    }
    false
}
