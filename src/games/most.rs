//! Most-voted ("who is most likely to..."): presentation-only podium
//!
//! Valid targets are restricted to currently-connected names and the ledger
//! is never touched; the podium is the whole payoff.

use super::{clamp_seconds, clamp_text, GameState};
use crate::error::RoomError;
use crate::protocol::ServerMessage;
use crate::state::room::Room;
use crate::types::RankEntry;
use std::collections::HashMap;

const MAX_QUESTION_CHARS: usize = 220;

#[derive(Debug, Clone, Default)]
pub struct MostState {
    pub open: bool,
    pub question: String,
    pub seconds: u32,
    /// voter name -> target name, last vote per voter wins
    pub votes: HashMap<String, String>,
}

pub fn admin_start(room: &mut Room, question: &str, seconds: u32) -> Result<(), RoomError> {
    let question = clamp_text(question, MAX_QUESTION_CHARS);
    let seconds = clamp_seconds(seconds, 5, 30, 15);
    let choices = room.connected_names();

    room.game = GameState::Most(MostState {
        open: true,
        question: question.clone(),
        seconds,
        votes: HashMap::new(),
    });
    room.send(ServerMessage::MostQuestion {
        question,
        seconds,
        choices,
    });
    Ok(())
}

pub fn player_vote(room: &mut Room, voter: &str, target: &str) -> Result<ServerMessage, RoomError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(RoomError::InvalidInput);
    }
    if !room.is_connected(target) {
        return Err(RoomError::InvalidTarget);
    }
    let GameState::Most(state) = &mut room.game else {
        return Err(RoomError::StaleMode);
    };
    if !state.open {
        return Err(RoomError::RoundClosed);
    }
    state.votes.insert(voter.to_string(), target.to_string());
    Ok(ServerMessage::ack_ok())
}

pub fn admin_close(room: &mut Room) -> Result<(), RoomError> {
    let GameState::Most(state) = &mut room.game else {
        return Err(RoomError::StaleMode);
    };
    if !state.open {
        return Ok(());
    }
    state.open = false;

    let mut counts: HashMap<&String, u32> = HashMap::new();
    for target in state.votes.values() {
        *counts.entry(target).or_insert(0) += 1;
    }
    let mut ranking: Vec<RankEntry> = counts
        .into_iter()
        .map(|(name, votes)| RankEntry {
            name: name.clone(),
            votes,
        })
        .collect();
    ranking.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.name.cmp(&b.name)));

    let msg = ServerMessage::MostResult {
        question: state.question.clone(),
        podium: ranking.iter().take(3).cloned().collect(),
        ranking,
        total_votes: state.votes.len() as u32,
    };
    room.send(msg);
    Ok(())
}
