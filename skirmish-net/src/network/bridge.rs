//! Game State Bridge
//!
//! The boundary between the network core and the game code. The receive
//! loop never touches game objects: it queues [`NetEvent`]s, and the game
//! loop drains them once per tick through a [`GameStateBridge`] on its own
//! thread.

use std::net::SocketAddr;

use crate::core::{PlayerId, Vec3};
use crate::network::protocol::GameStatePayload;

/// Inbound event queued by the receive loop for the game thread.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    /// A remote player's transform.
    PlayerUpdate {
        /// Player that moved.
        player_id: PlayerId,
        /// World position.
        position: Vec3,
        /// Euler angles in degrees.
        rotation: Vec3,
    },
    /// A remote player fired.
    Shoot {
        /// Shooter.
        player_id: PlayerId,
        /// Muzzle position.
        position: Vec3,
        /// Shot direction.
        direction: Vec3,
    },
    /// A remote player dealt damage.
    Damage {
        /// Attacker.
        from_player: PlayerId,
        /// Player that was hit.
        target_id: PlayerId,
        /// Hit points removed.
        amount: f32,
    },
    /// Snapshot from the host (clients only).
    GameState {
        /// Opaque snapshot.
        payload: GameStatePayload,
    },
    /// A client registered with the host, or re-registered from a new address (host only).
    PeerConnected {
        /// Registered player.
        player_id: PlayerId,
        /// Address the host now sends to.
        addr: SocketAddr,
    },
    /// A client went silent past the session timeout and was evicted (host only).
    PeerTimedOut {
        /// Evicted player.
        player_id: PlayerId,
    },
}

impl NetEvent {
    /// Route this event to the matching bridge callback.
    pub fn apply<B: GameStateBridge + ?Sized>(self, bridge: &mut B) {
        match self {
            NetEvent::PlayerUpdate { player_id, position, rotation } => {
                bridge.on_player_update(&player_id, position, rotation);
            }
            NetEvent::Shoot { player_id, position, direction } => {
                bridge.on_shoot(&player_id, position, direction);
            }
            NetEvent::Damage { from_player, target_id, amount } => {
                bridge.on_damage(&from_player, &target_id, amount);
            }
            NetEvent::GameState { payload } => bridge.on_game_state(&payload),
            NetEvent::PeerConnected { player_id, addr } => bridge.on_peer_connected(&player_id, addr),
            NetEvent::PeerTimedOut { player_id } => bridge.on_peer_timed_out(&player_id),
        }
    }
}

/// Callbacks the game code implements to apply network events.
///
/// Invoked only from [`NetworkManager::poll`](super::NetworkManager::poll),
/// on the caller's thread, so implementations may freely mutate game state.
pub trait GameStateBridge {
    /// Remote transform update.
    fn on_player_update(&mut self, player_id: &PlayerId, position: Vec3, rotation: Vec3);

    /// Remote weapon fire.
    fn on_shoot(&mut self, player_id: &PlayerId, position: Vec3, direction: Vec3);

    /// Remote damage.
    fn on_damage(&mut self, from_player: &PlayerId, target_id: &PlayerId, amount: f32);

    /// Host snapshot received after connecting.
    fn on_game_state(&mut self, _payload: &GameStatePayload) {}

    /// A client joined (host only).
    fn on_peer_connected(&mut self, _player_id: &PlayerId, _addr: SocketAddr) {}

    /// A client was evicted for silence (host only).
    fn on_peer_timed_out(&mut self, _player_id: &PlayerId) {}
}

/// Host-side source of the authoritative snapshot handed to new clients.
///
/// Called from the receive loop thread, hence `Send + Sync`; implementations
/// should read from their own synchronized copy of the world, never from the
/// game loop's live objects.
pub trait GameStateProvider: Send + Sync {
    /// Current snapshot.
    fn get_game_state(&self) -> GameStatePayload;
}

impl<F> GameStateProvider for F
where
    F: Fn() -> GameStatePayload + Send + Sync,
{
    fn get_game_state(&self) -> GameStatePayload {
        self()
    }
}
