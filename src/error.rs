//! Error taxonomy for room and game operations
//!
//! Every variant maps to a stable wire code carried in acks and error
//! messages. Validation always happens before any room mutation, so a
//! returned error implies no state change.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room code must be 4-8 uppercase alphanumeric characters")]
    InvalidRoomCode,
    #[error("admin token does not match")]
    Forbidden,
    #[error("a display name is required to join")]
    NameMissing,
    #[error("room is locked while a round is in progress")]
    RoomLocked,
    #[error("only the host may perform this action")]
    Unauthorized,
    #[error("too many requests for this action")]
    RateLimited,
    #[error("input does not match the room's active mode")]
    StaleMode,
    #[error("vote target is not a connected player")]
    InvalidTarget,
    #[error("round is not accepting input")]
    RoundClosed,
    #[error("malformed or out-of-range input")]
    InvalidInput,
    #[error("unknown room")]
    UnknownRoom,
}

impl RoomError {
    /// Stable snake_case code sent over the wire
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::InvalidRoomCode => "invalid_room_code",
            RoomError::Forbidden => "forbidden",
            RoomError::NameMissing => "name_missing",
            RoomError::RoomLocked => "room_locked",
            RoomError::Unauthorized => "unauthorized",
            RoomError::RateLimited => "rate_limited",
            RoomError::StaleMode => "stale_mode",
            RoomError::InvalidTarget => "invalid_target",
            RoomError::RoundClosed => "round_closed",
            RoomError::InvalidInput => "invalid_input",
            RoomError::UnknownRoom => "unknown_room",
        }
    }
}
