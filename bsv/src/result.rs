use crate::bitcoin::script::ScriptError;
use hex::FromHexError;
use std::io;
use std::string::FromUtf8Error;

/// Standard Result used in the library
pub type Result<T> = std::result::Result<T, Error>;

/// Standard error type used in the library
#[derive(Debug)]
pub enum Error {
    /// An argument provided is invalid
    BadArgument(String),
    /// The data provided is too small to perform the operation.
    DataTooSmall,
    /// The data provided is too large to perform the operation.
    DataTooLarge,
    /// The data did not match the checksum.
    ChecksumMismatch,
    /// Malformed wire data received from a peer.
    Protocol(String),
    /// A block or transaction broke a consensus rule.
    Verification(String),
    /// A script did not authorize a spend.
    Script(ScriptError),
    /// The block store failed. Fatal to the owning peer group.
    BlockStore(String),
    /// Internal error
    Internal(String),
    /// Hex string could not be decoded
    FromHexError(FromHexError),
    /// secp256k1 library error
    Secp256k1Error(secp256k1::Error),
    /// Standard library IO error
    IOError(io::Error),
    /// String conversion error
    Utf8Error(FromUtf8Error),

    // P2P errors
    /// Connection refused (retryable)
    ConnectionRefused,
    /// Connection timeout (retryable)
    ConnectionTimeout,
    /// Connection reset (retryable)
    ConnectionReset,
    /// The connection has closed.
    ConnectionClosed,
    /// The peer's command queue is full.
    PeerBusy,
    /// Handshake timeout (non-retryable)
    HandshakeTimeout,
    /// Handshake failed (non-retryable)
    HandshakeFailed(String),
    /// Network magic mismatch
    NetworkMismatch { expected: String, received: String },
    /// The request was cancelled by its owner.
    RequestCancelled,
    /// Channel send error
    ChannelSendError,
    /// Channel receive error
    ChannelReceiveError,
}

impl Error {
    /// Errors that must stop a peer group supervisor rather than a single connection.
    pub fn is_fatal_to_group(&self) -> bool {
        matches!(self, Error::BlockStore(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadArgument(s) => f.write_str(&format!("Bad argument: {}", s)),
            Error::DataTooSmall => f.write_str("data too small"),
            Error::DataTooLarge => f.write_str("data too large"),
            Error::ChecksumMismatch => f.write_str("Checksum mismatch"),
            Error::Protocol(s) => f.write_str(&format!("Protocol error: {}", s)),
            Error::Verification(s) => f.write_str(&format!("Verification failed: {}", s)),
            Error::Script(e) => f.write_str(&format!("Script failed: {}", e)),
            Error::BlockStore(s) => f.write_str(&format!("Block store error: {}", s)),
            Error::Internal(s) => f.write_str(&format!("Internal error: {}", s)),
            Error::FromHexError(e) => f.write_str(&format!("Hex decode error: {}", e)),
            Error::Secp256k1Error(e) => f.write_str(&format!("Secp256k1 error: {}", e)),
            Error::IOError(e) => f.write_str(&format!("IO error: {}", e)),
            Error::Utf8Error(e) => f.write_str(&format!("UTF-8 error: {}", e)),
            Error::ConnectionRefused => f.write_str("Connection refused"),
            Error::ConnectionTimeout => f.write_str("Connection timeout"),
            Error::ConnectionReset => f.write_str("Connection reset"),
            Error::ConnectionClosed => f.write_str("Connection closed"),
            Error::PeerBusy => f.write_str("Peer busy"),
            Error::HandshakeTimeout => f.write_str("Handshake timeout"),
            Error::HandshakeFailed(s) => f.write_str(&format!("Handshake failed: {}", s)),
            Error::NetworkMismatch { expected, received } => f.write_str(&format!(
                "Network mismatch: expected {}, received {}",
                expected, received
            )),
            Error::RequestCancelled => f.write_str("Request cancelled"),
            Error::ChannelSendError => f.write_str("Channel send error"),
            Error::ChannelReceiveError => f.write_str("Channel receive error"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FromHexError(e) => Some(e),
            Error::Secp256k1Error(e) => Some(e),
            Error::IOError(e) => Some(e),
            Error::Utf8Error(e) => Some(e),
            Error::Script(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FromHexError> for Error {
    fn from(e: FromHexError) -> Self {
        Error::FromHexError(e)
    }
}

impl From<secp256k1::Error> for Error {
    fn from(e: secp256k1::Error) -> Self {
        Error::Secp256k1Error(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => Error::ConnectionRefused,
            io::ErrorKind::ConnectionReset => Error::ConnectionReset,
            io::ErrorKind::TimedOut => Error::ConnectionTimeout,
            _ => Error::IOError(e),
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(e: FromUtf8Error) -> Self {
        Error::Utf8Error(e)
    }
}

impl From<ScriptError> for Error {
    fn from(e: ScriptError) -> Self {
        Error::Script(e)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelSendError
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::ChannelReceiveError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_connection_variants() {
        let e: Error = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        assert!(matches!(e, Error::ConnectionRefused));
        let e: Error = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(e, Error::IOError(_)));
    }

    #[test]
    fn only_store_errors_stop_the_group() {
        assert!(Error::BlockStore("disk".to_string()).is_fatal_to_group());
        assert!(!Error::Verification("bad pow".to_string()).is_fatal_to_group());
    }

    #[test]
    fn display_includes_detail() {
        let e = Error::Script(ScriptError::LockTimeNotSatisfied);
        assert_eq!(
            e.to_string(),
            "Script failed: Locktime requirement not satisfied"
        );
    }
}
