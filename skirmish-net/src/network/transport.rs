//! UDP Transport
//!
//! One datagram socket per participant. Receives wait at most a caller-given
//! timeout so the loop above can observe its stop flag; sends are
//! fire-and-forget.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::network::error::NetError;
use crate::MAX_DATAGRAM_SIZE;

/// Result of one bounded receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A datagram arrived.
    Datagram {
        /// Payload bytes. One byte longer than the cap means the sender overflowed it.
        data: Vec<u8>,
        /// Source address.
        from: SocketAddr,
    },
    /// Nothing arrived within the timeout.
    Timeout,
}

/// Bound UDP socket.
#[derive(Debug)]
pub struct Transport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl Transport {
    /// Bind `addr`. Port 0 picks an ephemeral port.
    ///
    /// Must be called inside a tokio runtime context; the socket registers
    /// with that runtime's I/O driver.
    pub fn bind(addr: SocketAddr) -> Result<Self, NetError> {
        let std_socket = std::net::UdpSocket::bind(addr)
            .map_err(|source| NetError::Bind { addr, source })?;
        std_socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;

        Ok(Self { socket, local_addr })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one datagram. No confirmation, no retry.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(data, addr).await
    }

    /// Wait up to `timeout` for one datagram.
    pub async fn receive(&self, timeout: Duration) -> io::Result<Received> {
        // One spare byte so an oversized datagram shows up as oversized instead of silently truncated.
        let mut buf = [0u8; MAX_DATAGRAM_SIZE + 1];

        match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => Ok(Received::Datagram { data: buf[..len].to_vec(), from }),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(Received::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_bind_ephemeral() {
        let transport = Transport::bind(loopback()).unwrap();
        assert_ne!(transport.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_bind_error() {
        let first = Transport::bind(loopback()).unwrap();
        let err = Transport::bind(first.local_addr()).unwrap_err();
        match err {
            NetError::Bind { addr, .. } => assert_eq!(addr, first.local_addr()),
            other => panic!("expected bind error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let transport = Transport::bind(loopback()).unwrap();
        let received = transport.receive(Duration::from_millis(20)).await.unwrap();
        assert_eq!(received, Received::Timeout);
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let a = Transport::bind(loopback()).unwrap();
        let b = Transport::bind(loopback()).unwrap();

        a.send_to(b"hello", b.local_addr()).await.unwrap();
        let received = b.receive(Duration::from_secs(2)).await.unwrap();

        assert_eq!(received, Received::Datagram { data: b"hello".to_vec(), from: a.local_addr() });
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_not_truncated_to_cap() {
        let a = Transport::bind(loopback()).unwrap();
        let b = Transport::bind(loopback()).unwrap();

        a.send_to(&vec![b'x'; MAX_DATAGRAM_SIZE + 100], b.local_addr()).await.unwrap();
        match b.receive(Duration::from_secs(2)).await.unwrap() {
            Received::Datagram { data, .. } => assert_eq!(data.len(), MAX_DATAGRAM_SIZE + 1),
            Received::Timeout => panic!("datagram lost on loopback"),
        }
    }
}
