//! Game simulation modules

pub mod ball;
pub mod field;
pub mod r#match;
pub mod physics;
pub mod player;
pub mod snapshot;

pub use r#match::{GameMatch, MatchHandle, MatchRegistry, RosterEntry};

use player::InputState;
use uuid::Uuid;

/// Player input received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub player_id: Uuid,
    pub input: InputState,
    /// Arrival time in unix millis, diagnostic only
    pub received_at: u64,
}

/// Commands a room drains at the start of each tick
#[derive(Debug, Clone)]
pub enum RoomCommand {
    Input(PlayerInput),
    Leave { player_id: Uuid },
    Stop,
}
