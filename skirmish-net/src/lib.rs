//! # Skirmish Net
//!
//! Host-relayed UDP synchronization core for a small-group shooter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SKIRMISH NET                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Shared value types                       │
//! │  ├── id.rs        - Player identifiers                       │
//! │  └── vec3.rs      - 3-component float vector                 │
//! │                                                              │
//! │  network/         - Networking                               │
//! │  ├── protocol.rs  - Wire messages (JSON, one per datagram)   │
//! │  ├── transport.rs - UDP socket with bounded receive          │
//! │  ├── session.rs   - Host-side player → address registry      │
//! │  ├── dispatch.rs  - Relay and callback routing               │
//! │  ├── bridge.rs    - Game-facing callbacks and events         │
//! │  ├── config.rs    - Role and tunables                        │
//! │  └── manager.rs   - Lifecycle, receive loop, public API      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Topology
//!
//! One participant hosts. Clients send every message to the host only; the
//! host applies it locally and relays the exact bytes to every other known
//! client. Delivery is best-effort: no acks, no retransmission, no ordering
//! across peers.
//!
//! ## Threading
//!
//! Each [`NetworkManager`] runs its receive loop on a dedicated thread.
//! Inbound events are queued and applied to the game only when the game
//! loop calls [`NetworkManager::poll`], so game state stays single-threaded.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod network;

// Re-export commonly used types
pub use core::{PlayerId, Vec3};
pub use network::{
    GameStateBridge, GameStateProvider, Message, NetConfig, NetError, NetEvent,
    NetworkManager, PeerInfo, Role,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Port the host listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5555;

/// Largest accepted datagram, in bytes. Larger ones are dropped on both send and receive.
pub const MAX_DATAGRAM_SIZE: usize = 4096;
