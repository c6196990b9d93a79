//! Network Configuration
//!
//! Tunables for a [`NetworkManager`](super::NetworkManager) and the role it
//! plays in the peer group. Both can be built in code or read from the
//! environment.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::core::PlayerId;
use crate::network::error::NetError;
use crate::DEFAULT_PORT;

/// Which side of the host-relay topology this participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Bind the advertised address and relay for everybody else.
    Host {
        /// Advertised address clients will send to.
        bind_addr: SocketAddr,
    },
    /// Bind an ephemeral port and talk only to the host.
    Client {
        /// Host's advertised address.
        host_addr: SocketAddr,
    },
}

impl Role {
    /// Host role on `(host, port)`.
    pub fn host(host: &str, port: u16) -> Result<Self, NetError> {
        Ok(Role::Host { bind_addr: resolve(host, port)? })
    }

    /// Client role targeting `(host, port)`.
    pub fn client(host: &str, port: u16) -> Result<Self, NetError> {
        Ok(Role::Client { host_addr: resolve(host, port)? })
    }

    /// Read the role from environment variables.
    ///
    /// `SKIRMISH_ROLE` is `host` or `client` (default `host`), `SKIRMISH_HOST`
    /// defaults to `localhost`, `SKIRMISH_PORT` to [`DEFAULT_PORT`].
    pub fn from_env() -> Result<Self, NetError> {
        let host = std::env::var("SKIRMISH_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = match std::env::var("SKIRMISH_PORT") {
            Ok(raw) => raw.parse().map_err(|_| NetError::Resolve {
                target: raw.clone(),
                reason: "port is not a number".to_string(),
            })?,
            Err(_) => DEFAULT_PORT,
        };

        match std::env::var("SKIRMISH_ROLE").as_deref() {
            Ok("client") => Self::client(&host, port),
            Ok("host") | Err(_) => Self::host(&host, port),
            Ok(other) => Err(NetError::Resolve {
                target: other.to_string(),
                reason: "SKIRMISH_ROLE must be `host` or `client`".to_string(),
            }),
        }
    }

    /// True for the relaying side.
    pub fn is_host(&self) -> bool {
        matches!(self, Role::Host { .. })
    }

    /// Address the transport binds for this role.
    ///
    /// Clients bind an ephemeral port on the unspecified address of the
    /// host's family so IPv4 and IPv6 hosts both work.
    pub fn local_bind_addr(&self) -> SocketAddr {
        match self {
            Role::Host { bind_addr } => *bind_addr,
            Role::Client { host_addr } => {
                let ip = match host_addr.ip() {
                    IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
                };
                SocketAddr::new(ip, 0)
            }
        }
    }
}

/// Resolve a host name, preferring IPv4 (`localhost` often lists `::1` first).
fn resolve(host: &str, port: u16) -> Result<SocketAddr, NetError> {
    let target = format!("{}:{}", host, port);
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| NetError::Resolve { target: target.clone(), reason: e.to_string() })?
        .collect();

    addrs.iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| NetError::Resolve { target, reason: "no addresses".to_string() })
}

/// Network manager configuration.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Local participant id. Generated at construction when `None`.
    pub player_id: Option<PlayerId>,
    /// Longest the receive loop waits before re-checking the stop flag.
    pub recv_timeout: Duration,
    /// Host evicts sessions silent for longer than this. `None` disables eviction.
    pub session_timeout: Option<Duration>,
    /// Capacity of the inbound event queue drained by the game loop.
    pub queue_capacity: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            player_id: None,
            recv_timeout: Duration::from_millis(100),
            session_timeout: Some(Duration::from_secs(10)),
            queue_capacity: 1024,
        }
    }
}

impl NetConfig {
    /// Create config from environment variables, falling back to defaults.
    ///
    /// `SKIRMISH_SESSION_TIMEOUT_SECS=0` disables session eviction.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let env_u64 = |key: &str| std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok());

        Self {
            player_id: std::env::var("SKIRMISH_PLAYER_ID").ok()
                .filter(|v| !v.is_empty())
                .map(PlayerId::new),
            recv_timeout: env_u64("SKIRMISH_RECV_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.recv_timeout),
            session_timeout: match env_u64("SKIRMISH_SESSION_TIMEOUT_SECS") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.session_timeout,
            },
            queue_capacity: env_u64("SKIRMISH_QUEUE_CAPACITY")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.queue_capacity),
        }
    }

    /// Builder-style id override.
    pub fn with_player_id(mut self, player_id: impl Into<PlayerId>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = NetConfig::default();
        assert!(config.player_id.is_none());
        assert_eq!(config.recv_timeout, Duration::from_millis(100));
        assert_eq!(config.session_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.queue_capacity, 1024);
    }

    #[test]
    fn test_with_player_id() {
        let config = NetConfig::default().with_player_id("H001");
        assert_eq!(config.player_id, Some(PlayerId::new("H001")));
    }

    #[test]
    fn test_host_role_binds_advertised_address() {
        let role = Role::host("127.0.0.1", 5555).unwrap();
        assert!(role.is_host());
        assert_eq!(role.local_bind_addr(), "127.0.0.1:5555".parse().unwrap());
    }

    #[test]
    fn test_client_role_binds_ephemeral() {
        let role = Role::client("127.0.0.1", 5555).unwrap();
        assert!(!role.is_host());
        assert_eq!(role.local_bind_addr(), "0.0.0.0:0".parse().unwrap());

        let v6 = Role::Client { host_addr: "[::1]:5555".parse().unwrap() };
        assert_eq!(v6.local_bind_addr(), "[::]:0".parse().unwrap());
    }

    #[test]
    fn test_localhost_prefers_ipv4() {
        let role = Role::client("localhost", 5555).unwrap();
        match role {
            Role::Client { host_addr } => {
                assert_eq!(host_addr.port(), 5555);
                assert!(host_addr.ip().is_loopback());
            }
            Role::Host { .. } => panic!("expected client role"),
        }
    }
}
