//! Guess-the-number: latest guess per player, live histogram, tolerance
//! scoring on close
//!
//! Unlike the quiz, a player's latest submitted value overwrites earlier
//! ones so they can keep adjusting until the host closes.

use super::{clamp_seconds, clamp_text, GameState};
use crate::error::RoomError;
use crate::protocol::ServerMessage;
use crate::state::room::Room;
use crate::types::GuessBin;
use std::collections::HashMap;

const MAX_QUESTION_CHARS: usize = 200;
const MAX_BUCKETS: i64 = 10;

#[derive(Debug, Clone)]
pub struct GuessState {
    pub open: bool,
    pub question: String,
    pub correct: i64,
    pub min: i64,
    pub max: i64,
    pub answers: HashMap<String, i64>,
}

impl Default for GuessState {
    fn default() -> Self {
        Self {
            open: false,
            question: String::new(),
            correct: 0,
            min: 0,
            max: 100,
            answers: HashMap::new(),
        }
    }
}

/// Bucket layout for the live histogram. Bucket width is span/count and may
/// be non-integer; boundaries are rounded for display only while counts use
/// the unrounded assignment.
fn make_bins(min: i64, max: i64, answers: &HashMap<String, i64>) -> (Vec<GuessBin>, u32) {
    let span = (max - min + 1).max(1);
    let n = span.min(MAX_BUCKETS).max(1);
    let size = span as f64 / n as f64;

    let mut counts = vec![0u32; n as usize];
    for value in answers.values() {
        let idx = (((value - min) as f64 / size).floor() as i64).clamp(0, n - 1);
        counts[idx as usize] += 1;
    }

    let bins = counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let i = i as i64;
            let from = (min as f64 + i as f64 * size).round() as i64;
            let to = if i == n - 1 {
                max
            } else {
                (min as f64 + (i + 1) as f64 * size - 1.0).round() as i64
            };
            GuessBin { from, to, count }
        })
        .collect();

    (bins, answers.len() as u32)
}

/// Tolerance for an "exact" win: 5% of the answer, at least 1
fn exact_tolerance(correct: i64) -> i64 {
    ((correct.abs() as f64) * 0.05).round().max(1.0) as i64
}

pub fn admin_start(
    room: &mut Room,
    question: &str,
    correct: i64,
    min: i64,
    max: i64,
    seconds: u32,
) -> Result<(), RoomError> {
    let question = clamp_text(question, MAX_QUESTION_CHARS);
    let seconds = clamp_seconds(seconds, 1, 60, 5);

    let (mut lo, mut hi) = (min, max);
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    if lo == hi {
        hi = lo + 1;
    }
    let correct = correct.clamp(lo, hi);

    let state = GuessState {
        open: true,
        question: question.clone(),
        correct,
        min: lo,
        max: hi,
        answers: HashMap::new(),
    };
    let (bins, total) = make_bins(lo, hi, &state.answers);
    room.game = GameState::Guess(state);

    room.send(ServerMessage::GuessStart {
        question,
        min: lo,
        max: hi,
        seconds,
    });
    // Initial empty histogram so the display renders an empty chart
    room.send(ServerMessage::GuessProgress {
        bins,
        total,
        min: lo,
        max: hi,
    });
    Ok(())
}

pub fn player_answer(room: &mut Room, player: &str, value: i64) -> Result<ServerMessage, RoomError> {
    let GameState::Guess(state) = &mut room.game else {
        return Err(RoomError::StaleMode);
    };
    if !state.open {
        return Err(RoomError::RoundClosed);
    }

    let clamped = value.clamp(state.min, state.max);
    state.answers.insert(player.to_string(), clamped);

    let (bins, total) = make_bins(state.min, state.max, &state.answers);
    let (min, max) = (state.min, state.max);
    room.send(ServerMessage::GuessProgress {
        bins,
        total,
        min,
        max,
    });
    Ok(ServerMessage::ack_ok())
}

pub fn admin_close(room: &mut Room) -> Result<(), RoomError> {
    let (correct, answers) = {
        let GameState::Guess(state) = &mut room.game else {
            return Err(RoomError::StaleMode);
        };
        if !state.open {
            return Ok(());
        }
        state.open = false;
        (state.correct, state.answers.clone())
    };

    let tol = exact_tolerance(correct);
    let diffs: Vec<(String, i64)> = answers
        .iter()
        .map(|(name, value)| (name.clone(), (value - correct).abs()))
        .collect();

    // Within tolerance counts as exact and pays double
    let mut exact: Vec<String> = diffs
        .iter()
        .filter(|(_, diff)| *diff <= tol)
        .map(|(name, _)| name.clone())
        .collect();
    exact.sort();

    if !exact.is_empty() {
        for name in &exact {
            room.apply_score_delta(name, 2);
        }
        room.send(ServerMessage::GuessResult {
            correct,
            winners: exact,
            best_diff: Some(0),
            tol,
        });
        room.broadcast_players();
        return Ok(());
    }

    if let Some(best) = diffs.iter().map(|(_, diff)| *diff).min() {
        // No exact answer: everyone tied for minimum distance shares +1
        let mut winners: Vec<String> = diffs
            .iter()
            .filter(|(_, diff)| *diff == best)
            .map(|(name, _)| name.clone())
            .collect();
        winners.sort();
        for name in &winners {
            room.apply_score_delta(name, 1);
        }
        room.send(ServerMessage::GuessResult {
            correct,
            winners,
            best_diff: Some(best),
            tol,
        });
        room.broadcast_players();
    } else {
        room.send(ServerMessage::GuessResult {
            correct,
            winners: Vec::new(),
            best_diff: None,
            tol,
        });
    }
    Ok(())
}
