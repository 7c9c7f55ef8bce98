use std::net::{SocketAddr, ToSocketAddrs};

/// Address of a real node to test against, from `BSV_TEST_NODE` (`IP:PORT` or `hostname:PORT`).
///
/// Tests that need one are skipped when it is not set.
pub fn test_node_address() -> Option<SocketAddr> {
    let addr = std::env::var("BSV_TEST_NODE").ok()?;
    if let Ok(addr) = addr.parse::<SocketAddr>() {
        return Some(addr);
    }
    addr.to_socket_addrs().ok()?.next()
}

/// Network of the test node, from `BSV_TEST_NETWORK`. Defaults to main.
pub fn test_network() -> String {
    std::env::var("BSV_TEST_NETWORK").unwrap_or_else(|_| "main".to_string())
}

/// Seconds to wait for a real node, from `BSV_TEST_TIMEOUT`.
pub fn test_timeout_secs() -> u64 {
    std::env::var("BSV_TEST_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30)
}
