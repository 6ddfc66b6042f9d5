//! Basic type definitions for the chat relay
//!
//! Provides the `ClientId` newtype and the protocol constants shared by the
//! registry and the connection pipeline.

use std::net::SocketAddr;

/// The room every session joins automatically on registration.
pub const PUBLIC_ROOM: &str = "public";

/// Capacity of each session's outbound queue.
///
/// When a recipient's queue is full, further lines for that recipient are
/// dropped rather than blocking the sender.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 20;

/// Maximum accepted length of a single inbound line, in bytes.
pub const MAX_LINE_LENGTH: usize = 8192;

/// Unique client identifier (newtype pattern)
///
/// Wraps the peer socket address, which is stable for the lifetime of the
/// connection. Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(SocketAddr);

impl ClientId {
    /// Create a client ID from the connection's peer address
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// The peer address this ID was derived from
    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for ClientId {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_client_id_display() {
        let id = ClientId::new(addr(4000));
        assert_eq!(id.to_string(), "127.0.0.1:4000");
        assert_eq!(id.addr(), addr(4000));
    }

    #[test]
    fn test_client_id_equality() {
        assert_eq!(ClientId::new(addr(4000)), ClientId::from(addr(4000)));
        assert_ne!(ClientId::new(addr(4000)), ClientId::new(addr(4001)));
    }
}
