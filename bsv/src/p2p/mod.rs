//! Peer-to-peer networking: the wire codec, single peer connections and the peer group.

mod config;
mod connection;
mod events;
mod framer;
mod group;
mod handshake;
mod message;
mod params;
mod peer;
mod pending;

pub use self::config::*;
pub use self::connection::*;
pub use self::events::*;
pub use self::framer::*;
pub use self::group::*;
pub use self::handshake::*;
pub use self::message::*;
pub use self::params::*;
pub use self::peer::*;
pub use self::pending::PendingRequest;
