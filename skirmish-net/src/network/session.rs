//! Session Registry
//!
//! Host-side mapping from player id to the address datagrams for that
//! player go to, plus when the host last heard from it.
//! Owned and mutated only by the dispatcher on the receive loop.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};

use crate::core::PlayerId;

/// One known remote participant.
#[derive(Debug, Clone)]
pub struct Session {
    /// Player identifier.
    pub player_id: PlayerId,
    /// Where datagrams for this player are sent.
    pub addr: SocketAddr,
    /// Last time any datagram from this player was accepted.
    pub last_seen: Instant,
    /// Wall-clock time the session was created (for display).
    pub connected_at: DateTime<Utc>,
}

/// Read-only view of a session published to the game thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Player identifier.
    pub player_id: PlayerId,
    /// Current address.
    pub addr: SocketAddr,
    /// When the host first registered the player.
    pub connected_at: DateTime<Utc>,
}

/// What an upsert changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// New session.
    Inserted,
    /// Known player, new address (NAT rebind or a second Connect with the same id).
    Moved {
        /// Address that was overwritten.
        previous: SocketAddr,
    },
    /// Known player at the same address; only liveness was updated.
    Refreshed,
}

impl Upsert {
    /// True when the set of (player, address) pairs changed.
    pub fn changed_membership(&self) -> bool {
        !matches!(self, Upsert::Refreshed)
    }
}

/// Host-side session table.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<PlayerId, Session>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a datagram from `player_id` at `addr`. The address always wins.
    pub fn upsert(&mut self, player_id: &PlayerId, addr: SocketAddr, now: Instant) -> Upsert {
        match self.sessions.get_mut(player_id) {
            Some(session) => {
                session.last_seen = now;
                if session.addr == addr {
                    Upsert::Refreshed
                } else {
                    let previous = std::mem::replace(&mut session.addr, addr);
                    Upsert::Moved { previous }
                }
            }
            None => {
                self.sessions.insert(player_id.clone(), Session {
                    player_id: player_id.clone(),
                    addr,
                    last_seen: now,
                    connected_at: Utc::now(),
                });
                Upsert::Inserted
            }
        }
    }

    /// Address for a player.
    pub fn lookup(&self, player_id: &PlayerId) -> Option<SocketAddr> {
        self.sessions.get(player_id).map(|s| s.addr)
    }

    /// Full session record.
    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    /// Every `(player, address)` pair, ordered by player id.
    pub fn all(&self) -> impl Iterator<Item = (&PlayerId, SocketAddr)> {
        self.sessions.iter().map(|(id, s)| (id, s.addr))
    }

    /// Addresses of every session except `excluded`.
    pub fn addrs_except<'a>(&'a self, excluded: Option<&'a PlayerId>) -> impl Iterator<Item = SocketAddr> + 'a {
        self.sessions.values()
            .filter(move |s| Some(&s.player_id) != excluded)
            .map(|s| s.addr)
    }

    /// Remove a session.
    pub fn remove(&mut self, player_id: &PlayerId) -> Option<Session> {
        self.sessions.remove(player_id)
    }

    /// Drop sessions not heard from within `timeout`. Returns the evicted ids.
    pub fn evict_stale(&mut self, now: Instant, timeout: Duration) -> Vec<PlayerId> {
        let stale: Vec<PlayerId> = self.sessions.values()
            .filter(|s| now.saturating_duration_since(s.last_seen) > timeout)
            .map(|s| s.player_id.clone())
            .collect();

        for player_id in &stale {
            self.sessions.remove(player_id);
        }

        stale
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no client has been seen.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Copy suitable for publishing across threads.
    pub fn snapshot(&self) -> Vec<PeerInfo> {
        self.sessions.values()
            .map(|s| PeerInfo {
                player_id: s.player_id.clone(),
                addr: s.addr,
                connected_at: s.connected_at,
            })
            .collect()
    }
}
