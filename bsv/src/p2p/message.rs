use crate::bitcoin::{
    varint_decode, varint_decode_len, varint_encode, varint_size, Block, BlockHash, BlockHeader,
    Encodable, Hash, Tx,
};
use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Longest user agent we accept.
pub const MAX_USER_AGENT_LENGTH: usize = 256;

/// Most inventory items in one message.
pub const MAX_INV_ITEMS: usize = 50_000;

/// Services bitfield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Services(pub u64);

impl Services {
    /// No services
    pub const NONE: Services = Services(0);
    /// NODE_NETWORK - serves the full block chain
    pub const NETWORK: Services = Services(1);

    pub fn contains(&self, other: Services) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Address of a node as carried in version and addr messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkAddress {
    pub services: Services,
    pub addr: IpAddr,
    pub port: u16,
}

// IPv4-mapped IPv6 prefix
const IPV4_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

impl NetworkAddress {
    pub const SIZE: u64 = 26;

    pub fn new(address: SocketAddr, services: Services) -> NetworkAddress {
        NetworkAddress {
            services,
            addr: address.ip(),
            port: address.port(),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl Default for NetworkAddress {
    fn default() -> Self {
        NetworkAddress {
            services: Services::NONE,
            addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
        }
    }
}

impl Encodable for NetworkAddress {
    fn from_binary(buffer: &mut dyn Buf) -> Result<Self> {
        if buffer.remaining() < Self::SIZE as usize {
            return Err(Error::DataTooSmall);
        }
        let services = Services(buffer.get_u64_le());
        let mut ip = [0u8; 16];
        buffer.copy_to_slice(&mut ip);
        let addr = if ip[..12] == IPV4_PREFIX {
            IpAddr::V4(Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]))
        } else {
            IpAddr::V6(Ipv6Addr::from(ip))
        };
        // port is big-endian
        let port = buffer.get_u16();
        Ok(NetworkAddress { services, addr, port })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> Result<()> {
        buffer.put_u64_le(self.services.0);
        match self.addr {
            IpAddr::V4(addr) => {
                buffer.put_slice(&IPV4_PREFIX);
                buffer.put_slice(&addr.octets());
            }
            IpAddr::V6(addr) => buffer.put_slice(&addr.octets()),
        }
        buffer.put_u16(self.port);
        Ok(())
    }

    fn encoded_size(&self) -> u64 {
        Self::SIZE
    }
}

/// An entry of an `addr` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampedAddress {
    pub timestamp: u32,
    pub address: NetworkAddress,
}

impl Encodable for TimestampedAddress {
    fn from_binary(buffer: &mut dyn Buf) -> Result<Self> {
        let timestamp = buffer.try_get_u32_le().map_err(|_| Error::DataTooSmall)?;
        let address = NetworkAddress::from_binary(buffer)?;
        Ok(TimestampedAddress { timestamp, address })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> Result<()> {
        buffer.put_u32_le(self.timestamp);
        self.address.to_binary(buffer)
    }

    fn encoded_size(&self) -> u64 {
        4 + NetworkAddress::SIZE
    }
}

/// Payload of the `version` message that opens every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: u32,
    pub services: Services,
    pub timestamp: i64,
    pub recv_addr: NetworkAddress,
    pub from_addr: NetworkAddress,
    /// Random value used to detect connections to ourselves.
    pub nonce: u64,
    pub user_agent: String,
    /// Height of the best chain of the sender.
    pub start_height: u32,
    pub relay: bool,
}

impl Encodable for VersionMessage {
    fn from_binary(buffer: &mut dyn Buf) -> Result<Self> {
        if buffer.remaining() < 20 {
            return Err(Error::DataTooSmall);
        }
        let version = buffer.get_u32_le();
        let services = Services(buffer.get_u64_le());
        let timestamp = buffer.get_i64_le();
        let recv_addr = NetworkAddress::from_binary(buffer)?;
        // very old peers stop after the receiving address
        let mut msg = VersionMessage {
            version,
            services,
            timestamp,
            recv_addr,
            from_addr: NetworkAddress::default(),
            nonce: 0,
            user_agent: String::new(),
            start_height: 0,
            relay: true,
        };
        if !buffer.has_remaining() {
            return Ok(msg);
        }
        msg.from_addr = NetworkAddress::from_binary(buffer)?;
        msg.nonce = buffer.try_get_u64_le().map_err(|_| Error::DataTooSmall)?;
        msg.user_agent = read_var_str(buffer, MAX_USER_AGENT_LENGTH)?;
        msg.start_height = buffer.try_get_u32_le().map_err(|_| Error::DataTooSmall)?;
        if buffer.has_remaining() {
            msg.relay = buffer.get_u8() != 0;
        }
        Ok(msg)
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> Result<()> {
        buffer.put_u32_le(self.version);
        buffer.put_u64_le(self.services.0);
        buffer.put_i64_le(self.timestamp);
        self.recv_addr.to_binary(buffer)?;
        self.from_addr.to_binary(buffer)?;
        buffer.put_u64_le(self.nonce);
        write_var_str(buffer, &self.user_agent)?;
        buffer.put_u32_le(self.start_height);
        buffer.put_u8(self.relay as u8);
        Ok(())
    }

    fn encoded_size(&self) -> u64 {
        20 + 2 * NetworkAddress::SIZE + 8 + varint_size(self.user_agent.len() as u64)
            + self.user_agent.len() as u64
            + 5
    }
}

/// Inventory item type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvType {
    Error,
    Tx,
    Block,
    FilteredBlock,
    CompactBlock,
    Other(u32),
}

impl InvType {
    pub fn code(&self) -> u32 {
        match self {
            InvType::Error => 0,
            InvType::Tx => 1,
            InvType::Block => 2,
            InvType::FilteredBlock => 3,
            InvType::CompactBlock => 4,
            InvType::Other(c) => *c,
        }
    }
}

impl From<u32> for InvType {
    fn from(code: u32) -> Self {
        match code {
            0 => InvType::Error,
            1 => InvType::Tx,
            2 => InvType::Block,
            3 => InvType::FilteredBlock,
            4 => InvType::CompactBlock,
            c => InvType::Other(c),
        }
    }
}

/// Inventory item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inventory {
    pub inv_type: InvType,
    pub hash: Hash,
}

impl Inventory {
    pub const SIZE: u64 = 36;

    pub fn block(hash: BlockHash) -> Inventory {
        Inventory {
            inv_type: InvType::Block,
            hash,
        }
    }

    pub fn tx(hash: Hash) -> Inventory {
        Inventory {
            inv_type: InvType::Tx,
            hash,
        }
    }
}

impl Encodable for Inventory {
    fn from_binary(buffer: &mut dyn Buf) -> Result<Self> {
        let inv_type = InvType::from(buffer.try_get_u32_le().map_err(|_| Error::DataTooSmall)?);
        let hash = Hash::from_binary(buffer)?;
        Ok(Inventory { inv_type, hash })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> Result<()> {
        buffer.put_u32_le(self.inv_type.code());
        self.hash.to_binary(buffer)
    }

    fn encoded_size(&self) -> u64 {
        Self::SIZE
    }
}

/// Payload of `getblocks` and `getheaders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlocksMessage {
    pub version: u32,
    pub locator_hashes: Vec<BlockHash>,
    /// Last block wanted, zero for as many as the peer will send.
    pub hash_stop: BlockHash,
}

impl Encodable for GetBlocksMessage {
    fn from_binary(buffer: &mut dyn Buf) -> Result<Self> {
        let version = buffer.try_get_u32_le().map_err(|_| Error::DataTooSmall)?;
        let locator_hashes = read_list(buffer, Hash::SIZE as usize)?;
        let hash_stop = Hash::from_binary(buffer)?;
        Ok(GetBlocksMessage {
            version,
            locator_hashes,
            hash_stop,
        })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> Result<()> {
        buffer.put_u32_le(self.version);
        write_list(buffer, &self.locator_hashes)?;
        self.hash_stop.to_binary(buffer)
    }

    fn encoded_size(&self) -> u64 {
        let count = self.locator_hashes.len() as u64;
        4 + varint_size(count) + (count + 1) * Hash::SIZE
    }
}

/// Reject message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectMessage {
    pub message: String,
    pub code: u8,
    pub reason: String,
    /// Usually the hash of the rejected object.
    pub data: Bytes,
}

impl Encodable for RejectMessage {
    fn from_binary(buffer: &mut dyn Buf) -> Result<Self> {
        let message = read_var_str(buffer, 12)?;
        let code = buffer.try_get_u8().map_err(|_| Error::DataTooSmall)?;
        let reason = read_var_str(buffer, 111)?;
        let data = buffer.copy_to_bytes(buffer.remaining());
        Ok(RejectMessage {
            message,
            code,
            reason,
            data,
        })
    }

    fn to_binary(&self, buffer: &mut dyn BufMut) -> Result<()> {
        write_var_str(buffer, &self.message)?;
        buffer.put_u8(self.code);
        write_var_str(buffer, &self.reason)?;
        buffer.put_slice(&self.data);
        Ok(())
    }

    fn encoded_size(&self) -> u64 {
        varint_size(self.message.len() as u64)
            + self.message.len() as u64
            + 1
            + varint_size(self.reason.len() as u64)
            + self.reason.len() as u64
            + self.data.len() as u64
    }
}

/// Message types
#[derive(Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    Ping(u64),
    Pong(u64),
    Addr(Vec<TimestampedAddress>),
    GetAddr,
    Inv(Vec<Inventory>),
    GetData(Vec<Inventory>),
    NotFound(Vec<Inventory>),
    Block(Block),
    GetBlocks(GetBlocksMessage),
    GetHeaders(GetBlocksMessage),
    Headers(Vec<BlockHeader>),
    Tx(Tx),
    Mempool,
    Reject(RejectMessage),
    SendHeaders,
    FeeFilter(u64),
    /// A command we do not interpret, kept so it can be logged.
    Unknown { command: String, payload: Bytes },
}

impl Message {
    /// Get the command string for this message
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Addr(_) => "addr",
            Message::GetAddr => "getaddr",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::NotFound(_) => "notfound",
            Message::Block(_) => "block",
            Message::GetBlocks(_) => "getblocks",
            Message::GetHeaders(_) => "getheaders",
            Message::Headers(_) => "headers",
            Message::Tx(_) => "tx",
            Message::Mempool => "mempool",
            Message::Reject(_) => "reject",
            Message::SendHeaders => "sendheaders",
            Message::FeeFilter(_) => "feefilter",
            Message::Unknown { command, .. } => command,
        }
    }

    /// Encode the message payload
    pub fn encode_payload(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        match self {
            Message::Verack | Message::GetAddr | Message::Mempool | Message::SendHeaders => {}
            Message::Version(v) => v.to_binary(&mut buf)?,
            Message::Ping(nonce) | Message::Pong(nonce) | Message::FeeFilter(nonce) => {
                buf.put_u64_le(*nonce)
            }
            Message::Addr(addrs) => write_list(&mut buf, addrs)?,
            Message::Inv(items) | Message::GetData(items) | Message::NotFound(items) => {
                write_list(&mut buf, items)?
            }
            Message::Block(block) => block.to_binary(&mut buf)?,
            Message::GetBlocks(m) | Message::GetHeaders(m) => m.to_binary(&mut buf)?,
            Message::Headers(headers) => {
                varint_encode(&mut buf, headers.len() as u64)?;
                for header in headers {
                    header.to_binary(&mut buf)?;
                    // transaction count, always zero
                    buf.put_u8(0);
                }
            }
            Message::Tx(tx) => tx.to_binary(&mut buf)?,
            Message::Reject(r) => r.to_binary(&mut buf)?,
            Message::Unknown { payload, .. } => buf.put_slice(payload),
        }
        Ok(buf.freeze())
    }

    /// Decode the payload of a message with the given command.
    ///
    /// Malformed payloads give [Error::Protocol].
    pub fn decode(command: &str, mut payload: Bytes) -> Result<Message> {
        Message::decode_inner(command, &mut payload)
            .map_err(|e| Error::Protocol(format!("malformed {} message: {}", command, e)))
    }

    fn decode_inner(command: &str, buf: &mut Bytes) -> Result<Message> {
        let msg = match command {
            "version" => Message::Version(VersionMessage::from_binary(buf)?),
            "verack" => Message::Verack,
            "ping" => Message::Ping(read_nonce(buf)?),
            "pong" => Message::Pong(read_nonce(buf)?),
            "addr" => Message::Addr(read_list(buf, 30)?),
            "getaddr" => Message::GetAddr,
            "inv" => Message::Inv(read_inv(buf)?),
            "getdata" => Message::GetData(read_inv(buf)?),
            "notfound" => Message::NotFound(read_inv(buf)?),
            "block" => Message::Block(Block::from_binary(buf)?),
            "getblocks" => Message::GetBlocks(GetBlocksMessage::from_binary(buf)?),
            "getheaders" => Message::GetHeaders(GetBlocksMessage::from_binary(buf)?),
            "headers" => {
                let n = varint_decode_len(buf, BlockHeader::SIZE + 1)?;
                let mut headers = Vec::with_capacity(n);
                for _ in 0..n {
                    headers.push(BlockHeader::from_binary(buf)?);
                    varint_decode(buf)?;
                }
                Message::Headers(headers)
            }
            "tx" => Message::Tx(Tx::from_binary(buf)?),
            "mempool" => Message::Mempool,
            "reject" => Message::Reject(RejectMessage::from_binary(buf)?),
            "sendheaders" => Message::SendHeaders,
            "feefilter" => Message::FeeFilter(read_nonce(buf)?),
            _ => Message::Unknown {
                command: command.to_string(),
                payload: buf.split_off(0),
            },
        };
        Ok(msg)
    }
}

// Payloads are left out, blocks and inventories get large.
impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::Version(v) => write!(
                f,
                "Version({}, {:?}, height {})",
                v.version, v.user_agent, v.start_height
            ),
            Message::Ping(n) => write!(f, "Ping({})", n),
            Message::Pong(n) => write!(f, "Pong({})", n),
            Message::Inv(items) => write!(f, "Inv({} items)", items.len()),
            Message::GetData(items) => write!(f, "GetData({} items)", items.len()),
            Message::NotFound(items) => write!(f, "NotFound({} items)", items.len()),
            Message::Addr(addrs) => write!(f, "Addr({} addresses)", addrs.len()),
            Message::Block(b) => write!(f, "Block({}, {} txs)", b.hash(), b.txs.len()),
            Message::Headers(h) => write!(f, "Headers({})", h.len()),
            Message::Tx(tx) => write!(f, "Tx({})", tx.hash()),
            Message::GetBlocks(m) => {
                write!(f, "GetBlocks({} locators, stop {})", m.locator_hashes.len(), m.hash_stop)
            }
            Message::GetHeaders(m) => {
                write!(f, "GetHeaders({} locators, stop {})", m.locator_hashes.len(), m.hash_stop)
            }
            Message::Reject(r) => write!(f, "Reject({} {} {:?})", r.message, r.code, r.reason),
            Message::FeeFilter(rate) => write!(f, "FeeFilter({})", rate),
            Message::Unknown { command, payload } => {
                write!(f, "Unknown({:?}, {} bytes)", command, payload.len())
            }
            other => f.write_str(other.command()),
        }
    }
}

fn read_nonce(buf: &mut dyn Buf) -> Result<u64> {
    buf.try_get_u64_le().map_err(|_| Error::DataTooSmall)
}

fn read_inv(buf: &mut dyn Buf) -> Result<Vec<Inventory>> {
    let items: Vec<Inventory> = read_list(buf, Inventory::SIZE as usize)?;
    if items.len() > MAX_INV_ITEMS {
        return Err(Error::DataTooLarge);
    }
    Ok(items)
}

fn read_list<T: Encodable>(buf: &mut dyn Buf, min_item_size: usize) -> Result<Vec<T>> {
    let n = varint_decode_len(buf, min_item_size)?;
    let mut items = Vec::with_capacity(n);
    for _ in 0..n {
        items.push(T::from_binary(buf)?);
    }
    Ok(items)
}

fn write_list<T: Encodable>(buf: &mut dyn BufMut, items: &[T]) -> Result<()> {
    varint_encode(buf, items.len() as u64)?;
    for item in items {
        item.to_binary(buf)?;
    }
    Ok(())
}

fn read_var_str(buf: &mut dyn Buf, max_len: usize) -> Result<String> {
    let len = varint_decode_len(buf, 1)?;
    if len > max_len {
        return Err(Error::DataTooLarge);
    }
    let mut v = vec![0u8; len];
    buf.copy_to_slice(&mut v);
    Ok(String::from_utf8(v)?)
}

fn write_var_str(buf: &mut dyn BufMut, s: &str) -> Result<()> {
    varint_encode(buf, s.len() as u64)?;
    buf.put_slice(s.as_bytes());
    Ok(())
}
