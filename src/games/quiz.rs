//! True/false quiz: one question, each player's first answer counts

use super::{clamp_seconds, clamp_text, GameState};
use crate::error::RoomError;
use crate::protocol::ServerMessage;
use crate::state::room::Room;
use std::collections::HashMap;

const MAX_QUESTION_CHARS: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct QuizState {
    pub open: bool,
    pub question: String,
    pub correct: bool,
    /// First answer per player; later answers are ignored so nobody can
    /// change their mind after watching the room
    pub answers: HashMap<String, bool>,
}

pub fn admin_start(
    room: &mut Room,
    question: &str,
    correct: bool,
    seconds: u32,
) -> Result<(), RoomError> {
    let question = clamp_text(question, MAX_QUESTION_CHARS);
    let seconds = clamp_seconds(seconds, 1, 30, 5);

    room.game = GameState::Quiz(QuizState {
        open: true,
        question: question.clone(),
        correct,
        answers: HashMap::new(),
    });
    room.send(ServerMessage::QuizQuestion { question, seconds });
    Ok(())
}

pub fn player_answer(room: &mut Room, player: &str, answer: bool) -> Result<ServerMessage, RoomError> {
    let GameState::Quiz(state) = &mut room.game else {
        return Err(RoomError::StaleMode);
    };
    if !state.open {
        return Err(RoomError::RoundClosed);
    }
    // First answer is retained; a repeat submission still acks ok
    state.answers.entry(player.to_string()).or_insert(answer);
    Ok(ServerMessage::ack_ok())
}

pub fn admin_close(room: &mut Room) -> Result<(), RoomError> {
    let (correct, answers) = {
        let GameState::Quiz(state) = &mut room.game else {
            return Err(RoomError::StaleMode);
        };
        if !state.open {
            return Ok(());
        }
        state.open = false;
        (state.correct, state.answers.clone())
    };

    let mut count_true = 0u32;
    let mut count_false = 0u32;
    let mut winners = Vec::new();
    let mut losers = Vec::new();
    for (name, answer) in &answers {
        if *answer {
            count_true += 1;
        } else {
            count_false += 1;
        }
        if *answer == correct {
            winners.push(name.clone());
        } else {
            losers.push(name.clone());
        }
    }
    let mut no_answer: Vec<String> = room
        .connected_names()
        .into_iter()
        .filter(|name| !answers.contains_key(name))
        .collect();
    winners.sort();
    losers.sort();
    no_answer.sort();

    for name in &winners {
        room.apply_score_delta(name, 1);
    }

    room.send(ServerMessage::QuizResult {
        correct,
        count_true,
        count_false,
        total: count_true + count_false,
        winners,
        losers,
        no_answer,
    });
    room.broadcast_players();
    Ok(())
}
