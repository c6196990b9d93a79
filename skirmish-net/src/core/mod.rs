//! Core value types shared by every network layer.

pub mod id;
pub mod vec3;

// Re-export core types
pub use id::{PlayerId, MAX_PLAYER_ID_LEN};
pub use vec3::Vec3;
