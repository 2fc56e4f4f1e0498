//! Buzzer race: first accepted press wins the round
//!
//! The `winner` guard, not arrival order across connections, decides the
//! race; events are processed one at a time under the registry lock, so the
//! first press that sees `open && winner == None` is the winner.

use super::GameState;
use crate::error::RoomError;
use crate::protocol::ServerMessage;
use crate::state::room::Room;

#[derive(Debug, Clone, Default)]
pub struct BuzzerState {
    pub open: bool,
    pub winner: Option<String>,
}

/// Host opens a press window
pub fn admin_open(room: &mut Room) -> Result<(), RoomError> {
    let GameState::Buzzer(state) = &mut room.game else {
        return Err(RoomError::StaleMode);
    };
    state.open = true;
    state.winner = None;
    room.send(ServerMessage::RoundOpen);
    Ok(())
}

/// Participant press; winning awards +1 and closes the window
pub fn player_press(room: &mut Room, player: &str) -> Result<ServerMessage, RoomError> {
    {
        let GameState::Buzzer(state) = &mut room.game else {
            return Err(RoomError::StaleMode);
        };
        if !state.open || state.winner.is_some() {
            return Err(RoomError::RoundClosed);
        }
        state.open = false;
        state.winner = Some(player.to_string());
    }

    let score = room.apply_score_delta(player, 1);
    room.send(ServerMessage::RoundWinner {
        name: player.to_string(),
        score,
    });
    room.broadcast_players();

    Ok(ServerMessage::ack_name(player))
}
