//! Core of a lightweight Bitcoin SV node.
//!
//! Provides a script interpreter, a header-first block chain that follows the best branch, single
//! peer connections speaking the P2P wire protocol, and a peer group that keeps several of them
//! running and drives the block chain download.

/// Transactions, block headers, scripts and the other Bitcoin data structures.
pub mod bitcoin;

/// Block chain tracking and validation.
pub mod chain;

/// The peer-to-peer protocol and network.
pub mod p2p;

/// Small helpers.
pub mod util;

mod result;
pub use result::{Error, Result};

// re-export the secp256k1 crate
pub extern crate secp256k1;
