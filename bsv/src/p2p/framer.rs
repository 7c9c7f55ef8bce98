use crate::bitcoin::Hash;
use crate::p2p::message::Message;
use crate::p2p::params::{DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Header size of a checksummed message.
pub const HEADER_SIZE: usize = 24;

/// Header size of a message without checksum, used by peers older than version 209.
pub const LEGACY_HEADER_SIZE: usize = 20;

// Buffer growth per decode call while a large payload is still arriving.
const READ_RESERVE: usize = 0x10_0000;

/// Frames messages on a byte stream: magic, command, payload length, optional checksum, payload.
///
/// Checksumming can be switched off for the opening of a handshake with legacy peers and switched
/// on once their version is known.
#[derive(Debug, Clone)]
pub struct MessageFramer {
    magic: [u8; 4],
    max_payload_size: u32,
    max_block_size: u32,
    checksum: bool,
}

impl MessageFramer {
    pub fn new(magic: [u8; 4]) -> MessageFramer {
        MessageFramer {
            magic,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            checksum: true,
        }
    }

    pub fn with_max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    pub fn with_max_block_size(mut self, size: u32) -> Self {
        self.max_block_size = size;
        self
    }

    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn set_checksum(&mut self, checksum: bool) {
        self.checksum = checksum;
    }

    pub fn uses_checksum(&self) -> bool {
        self.checksum
    }

    fn header_size(&self) -> usize {
        if self.checksum {
            HEADER_SIZE
        } else {
            LEGACY_HEADER_SIZE
        }
    }
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let hash = Hash::sha256d(payload);
    [hash.raw[0], hash.raw[1], hash.raw[2], hash.raw[3]]
}

fn command_bytes(command: &str) -> Result<[u8; 12]> {
    let raw = command.as_bytes();
    if raw.len() > 12 {
        return Err(Error::BadArgument(format!("command {:?} longer than 12 bytes", command)));
    }
    let mut bytes = [0u8; 12];
    bytes[..raw.len()].copy_from_slice(raw);
    Ok(bytes)
}

fn command_string(raw: &[u8]) -> Result<String> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    // everything after the terminator must be padding
    if raw[end..].iter().any(|b| *b != 0) || !raw[..end].is_ascii() {
        return Err(Error::Protocol(format!("bad command {:?}", raw)));
    }
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

impl Decoder for MessageFramer {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let header_size = self.header_size();
        if src.len() < header_size {
            return Ok(None);
        }
        if src[..4] != self.magic {
            return Err(Error::NetworkMismatch {
                expected: hex::encode(self.magic),
                received: hex::encode(&src[..4]),
            });
        }
        let command = command_string(&src[4..16])?;
        let payload_size = u32::from_le_bytes([src[16], src[17], src[18], src[19]]);
        let limit = if command == "block" {
            self.max_block_size
        } else {
            self.max_payload_size
        };
        if payload_size > limit {
            return Err(Error::Protocol(format!(
                "{} message of {} bytes exceeds limit {}",
                command, payload_size, limit
            )));
        }
        let total = header_size + payload_size as usize;
        if src.len() < total {
            src.reserve((total - src.len()).min(READ_RESERVE));
            return Ok(None);
        }

        let mut frame = src.split_to(total);
        let expected_checksum = if self.checksum {
            Some([frame[20], frame[21], frame[22], frame[23]])
        } else {
            None
        };
        frame.advance(header_size);
        let payload = frame.freeze();
        if let Some(expected) = expected_checksum {
            if checksum(&payload) != expected {
                return Err(Error::ChecksumMismatch);
            }
        }
        trace!(command = %command, size = payload_size, "received message");
        Message::decode(&command, payload).map(Some)
    }
}

impl Encoder<Message> for MessageFramer {
    type Error = Error;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<()> {
        <Self as Encoder<&Message>>::encode(self, &msg, dst)
    }
}

impl Encoder<&Message> for MessageFramer {
    type Error = Error;

    fn encode(&mut self, msg: &Message, dst: &mut BytesMut) -> Result<()> {
        // the checksum sits in front of the payload, so the payload is encoded first
        let payload = msg.encode_payload()?;
        dst.reserve(self.header_size() + payload.len());
        dst.put_slice(&self.magic);
        dst.put_slice(&command_bytes(msg.command())?);
        dst.put_u32_le(payload.len() as u32);
        if self.checksum {
            dst.put_slice(&checksum(&payload));
        }
        dst.put_slice(&payload);
        trace!(command = msg.command(), size = payload.len(), "sending message");
        Ok(())
    }
}
