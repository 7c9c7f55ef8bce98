use crate::Result;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Read & write Bitcoin data structures to and from binary in Bitcoin encoding format.
pub trait Encodable {
    /// Read the data structure from a buffer.
    fn from_binary(buffer: &mut dyn Buf) -> Result<Self>
    where
        Self: Sized;

    /// Write the data structure to a buffer.
    fn to_binary(&self, buffer: &mut dyn BufMut) -> Result<()>;

    /// Return the size of the encoded form.
    // Implementations must compute this without encoding, it is used to size buffers.
    fn encoded_size(&self) -> u64;

    /// Encode into a freshly allocated buffer.
    fn to_bytes(&self) -> Result<Bytes> {
        let mut buffer = BytesMut::with_capacity(self.encoded_size() as usize);
        self.to_binary(&mut buffer)?;
        Ok(buffer.freeze())
    }
}
