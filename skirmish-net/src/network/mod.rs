//! Network Layer
//!
//! Host-relayed UDP synchronization. Clients talk only to the host; the host
//! keeps a session per client and relays each client's traffic to the rest.
//! Nothing here touches game state directly, see [`bridge`].

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod transport;

pub use bridge::{GameStateBridge, GameStateProvider, NetEvent};
pub use config::{NetConfig, Role};
pub use dispatch::{Dispatch, Dispatcher, Outgoing};
pub use error::NetError;
pub use manager::NetworkManager;
pub use protocol::{DecodeError, EncodeError, GameStatePayload, Message};
pub use session::{PeerInfo, Session, SessionRegistry, Upsert};
pub use transport::{Received, Transport};
