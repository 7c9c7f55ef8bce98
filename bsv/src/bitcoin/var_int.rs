use crate::Error;
use bytes::{Buf, BufMut};

/// The size of the value encoded as a varint.
pub fn varint_size(value: u64) -> u64 {
    match value {
        0..=252 => 1,
        253..=0xffff => 3,
        0x10000..=0xffffffff => 5,
        _ => 9,
    }
}

/// Read a varint from the buffer.
pub fn varint_decode(buffer: &mut dyn Buf) -> crate::Result<u64> {
    if !buffer.has_remaining() {
        return Err(Error::DataTooSmall);
    }
    let n0 = buffer.get_u8();
    let needed = match n0 {
        0xff => 8,
        0xfe => 4,
        0xfd => 2,
        _ => return Ok(n0 as u64),
    };
    if buffer.remaining() < needed {
        return Err(Error::DataTooSmall);
    }
    let v = match n0 {
        0xff => buffer.get_u64_le(),
        0xfe => buffer.get_u32_le() as u64,
        _ => buffer.get_u16_le() as u64,
    };
    Ok(v)
}

/// Write a varint to the buffer.
pub fn varint_encode(buffer: &mut dyn BufMut, value: u64) -> crate::Result<()> {
    match value {
        0..=252 => buffer.put_u8(value as u8),
        253..=0xffff => {
            buffer.put_u8(0xfd);
            buffer.put_u16_le(value as u16);
        }
        0x10000..=0xffffffff => {
            buffer.put_u8(0xfe);
            buffer.put_u32_le(value as u32);
        }
        _ => {
            buffer.put_u8(0xff);
            buffer.put_u64_le(value);
        }
    };
    Ok(())
}

/// Read a varint length prefix and check that the data it announces could be present.
///
/// `min_item_size` is the smallest encoded size of one item, this stops a hostile length from
/// causing a huge allocation before the data runs out.
pub fn varint_decode_len(buffer: &mut dyn Buf, min_item_size: usize) -> crate::Result<usize> {
    let n = varint_decode(buffer)?;
    if n.saturating_mul(min_item_size.max(1) as u64) > buffer.remaining() as u64 {
        return Err(Error::DataTooSmall);
    }
    Ok(n as usize)
}
