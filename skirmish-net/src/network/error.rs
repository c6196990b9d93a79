//! Network manager errors.

use std::net::SocketAddr;
use thiserror::Error;

use crate::network::protocol::EncodeError;

/// Errors surfaced by the [`NetworkManager`](super::NetworkManager) API.
///
/// Decode failures never appear here: a bad datagram is logged and dropped
/// on the receive loop.
#[derive(Debug, Error)]
pub enum NetError {
    /// Failed to bind the local address. `start()` leaves the manager stopped.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Local player id is empty or too long to put on the wire.
    #[error("Invalid local player id {0:?}")]
    InvalidPlayerId(String),

    /// API called in the wrong lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    /// The outbound queue is full or the receive loop is gone.
    #[error("Send failed: {0}")]
    Send(&'static str),

    /// Outbound message could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Host name or port could not be resolved.
    #[error("Cannot resolve {target}: {reason}")]
    Resolve {
        /// The `host:port` (or setting) being resolved.
        target: String,
        /// Why resolution failed.
        reason: String,
    },

    /// Runtime or thread setup failure during `start()`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
