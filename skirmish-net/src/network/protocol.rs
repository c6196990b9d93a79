//! Protocol Messages
//!
//! Wire format for peer communication over UDP.
//! One JSON object per datagram; the `"type"` field carries the discriminant.
//!
//! ```text
//! {"type":"connect","player_id":"C002"}
//! {"type":"player_update","player_id":"C002","position":[1.0,0.0,2.0],"rotation":[0.0,90.0,0.0]}
//! {"type":"shoot","player_id":"C002","position":[...],"direction":[...]}
//! {"type":"damage","from_player":"C002","target_id":"H001","amount":10.0}
//! {"type":"game_state","state":{...}}
//! ```

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::{PlayerId, Vec3};
use crate::MAX_DATAGRAM_SIZE;

/// Opaque game-state snapshot produced by the host's state provider.
pub type GameStatePayload = serde_json::Value;

// =============================================================================
// MESSAGES
// =============================================================================

/// Every datagram exchanged between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A client announces itself to the host.
    Connect {
        /// Announcing player.
        player_id: PlayerId,
    },

    /// Periodic transform sample.
    PlayerUpdate {
        /// Player whose transform this is.
        player_id: PlayerId,
        /// World position.
        position: Vec3,
        /// Euler angles in degrees.
        rotation: Vec3,
    },

    /// Weapon fired.
    Shoot {
        /// Shooter.
        player_id: PlayerId,
        /// Muzzle position.
        position: Vec3,
        /// Shot direction.
        direction: Vec3,
    },

    /// Damage dealt by `from_player` to `target_id`.
    Damage {
        /// Attacker.
        from_player: PlayerId,
        /// Player that was hit.
        target_id: PlayerId,
        /// Hit points removed.
        amount: f32,
    },

    /// Host snapshot sent to a newly connected client.
    GameState {
        /// Snapshot from the host's state provider.
        #[serde(rename = "state")]
        payload: GameStatePayload,
    },
}

impl Message {
    /// Participant that originated this message. `None` for `GameState`.
    pub fn sender(&self) -> Option<&PlayerId> {
        match self {
            Message::Connect { player_id }
            | Message::PlayerUpdate { player_id, .. }
            | Message::Shoot { player_id, .. } => Some(player_id),
            Message::Damage { from_player, .. } => Some(from_player),
            Message::GameState { .. } => None,
        }
    }

    /// Short name of the variant for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Connect { .. } => "connect",
            Message::PlayerUpdate { .. } => "player_update",
            Message::Shoot { .. } => "shoot",
            Message::Damage { .. } => "damage",
            Message::GameState { .. } => "game_state",
        }
    }

    /// Whether the host rebroadcasts this message to the other sessions.
    pub fn is_relayed(&self) -> bool {
        !matches!(self, Message::Connect { .. } | Message::GameState { .. })
    }

    /// Serialize to datagram bytes.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        encode(self)
    }

    /// Parse datagram bytes.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        decode(data)
    }

    fn has_finite_fields(&self) -> bool {
        match self {
            Message::PlayerUpdate { position, rotation, .. } => {
                position.is_finite() && rotation.is_finite()
            }
            Message::Shoot { position, direction, .. } => {
                position.is_finite() && direction.is_finite()
            }
            Message::Damage { amount, .. } => amount.is_finite(),
            Message::Connect { .. } | Message::GameState { .. } => true,
        }
    }

    fn ids(&self) -> impl Iterator<Item = &PlayerId> {
        let (first, second) = match self {
            Message::Damage { from_player, target_id, .. } => (Some(from_player), Some(target_id)),
            other => (other.sender(), None),
        };
        first.into_iter().chain(second)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Failure to turn a datagram into a [`Message`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Datagram exceeds the protocol size cap.
    #[error("datagram of {len} bytes exceeds the {max} byte cap")]
    Oversized {
        /// Received length.
        len: usize,
        /// Protocol cap.
        max: usize,
    },

    /// Not valid JSON, unknown `type`, or missing/mistyped fields.
    #[error("malformed datagram: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A player id field is empty or too long.
    #[error("invalid player id {0:?}")]
    InvalidPlayerId(String),

    /// A float field overflowed `f32` or is otherwise not finite.
    #[error("{0} message contains a non-finite number")]
    NonFinite(&'static str),
}

/// Failure to turn a [`Message`] into datagram bytes.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A float field is NaN or infinite.
    #[error("{0} message contains a non-finite number")]
    NonFinite(&'static str),

    /// A player id field is empty or too long.
    #[error("invalid player id {0:?}")]
    InvalidPlayerId(String),

    /// Encoded message would not fit in one datagram.
    #[error("encoded message of {len} bytes exceeds the {max} byte cap")]
    Oversized {
        /// Encoded length.
        len: usize,
        /// Protocol cap.
        max: usize,
    },

    /// Serializer failure (payload maps with non-string keys and similar).
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode a message into one datagram.
pub fn encode(message: &Message) -> Result<Vec<u8>, EncodeError> {
    if !message.has_finite_fields() {
        return Err(EncodeError::NonFinite(message.kind()));
    }
    if let Some(bad) = message.ids().find(|id| !id.is_valid()) {
        return Err(EncodeError::InvalidPlayerId(bad.to_string()));
    }

    let bytes = serde_json::to_vec(message)?;
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(EncodeError::Oversized { len: bytes.len(), max: MAX_DATAGRAM_SIZE });
    }
    Ok(bytes)
}

/// Decode one datagram.
pub fn decode(data: &[u8]) -> Result<Message, DecodeError> {
    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(DecodeError::Oversized { len: data.len(), max: MAX_DATAGRAM_SIZE });
    }

    let message: Message = serde_json::from_slice(data)?;
    if let Some(bad) = message.ids().find(|id| !id.is_valid()) {
        return Err(DecodeError::InvalidPlayerId(bad.to_string()));
    }
    // Numbers past f32 range parse as infinity.
    if !message.has_finite_fields() {
        return Err(DecodeError::NonFinite(message.kind()));
    }
    Ok(message)
}
