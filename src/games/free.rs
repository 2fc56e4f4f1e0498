//! Free-text answers with deferred host validation
//!
//! Two mutually exclusive sub-modes per round: a single question whose
//! answers stay visible after close so the host can toggle validation, and a
//! host-paced series whose per-question answers are retained independently
//! for a review pass. Each validation toggle adjusts the ledger by ±1, so
//! toggling twice returns the score to where it was.

use super::{clamp_seconds, clamp_text, GameState};
use crate::error::RoomError;
use crate::protocol::ServerMessage;
use crate::state::room::Room;
use crate::types::{ConnId, FreeAnswer, FreeItem, ReviewItem};
use std::collections::HashMap;

const MAX_QUESTION_CHARS: usize = 300;
const MAX_ANSWER_CHARS: usize = 280;
const MAX_SERIES_ITEMS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreeSubMode {
    #[default]
    Single,
    Series,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreePhase {
    #[default]
    Idle,
    SingleActive,
    SeriesActive,
    Review,
}

#[derive(Debug, Clone, Default)]
pub struct FreeState {
    pub sub_mode: FreeSubMode,
    pub phase: FreePhase,
    // Single
    pub open: bool,
    pub question: String,
    pub seconds: u32,
    pub expected: String,
    pub answers: HashMap<String, FreeAnswer>,
    // Series
    pub series: Vec<FreeItem>,
    /// None until the first "next" request advances to item 0
    pub current_index: Option<usize>,
    /// Per-question answer maps, retained independently for review
    pub answers_by_index: HashMap<usize, HashMap<String, FreeAnswer>>,
    pub review_index: usize,
}

/// Union of connected players and everyone who answered, sorted by name
fn build_review_items(
    players: &HashMap<ConnId, String>,
    answers: &HashMap<String, FreeAnswer>,
) -> Vec<ReviewItem> {
    let mut items: HashMap<&str, ReviewItem> = HashMap::new();
    for name in players.values() {
        items.entry(name).or_insert_with(|| ReviewItem {
            name: name.clone(),
            text: String::new(),
            validated: false,
        });
    }
    for (name, answer) in answers {
        items.insert(
            name,
            ReviewItem {
                name: name.clone(),
                text: answer.text.clone(),
                validated: answer.validated,
            },
        );
    }
    let mut items: Vec<ReviewItem> = items.into_values().collect();
    items.sort_by(|a, b| a.name.cmp(&b.name));
    items
}

// ---------- single question ----------

pub fn admin_start(
    room: &mut Room,
    question: &str,
    seconds: u32,
    expected: &str,
) -> Result<(), RoomError> {
    let question = clamp_text(question, MAX_QUESTION_CHARS);
    let seconds = clamp_seconds(seconds, 5, 180, 30);
    let expected = clamp_text(expected, MAX_QUESTION_CHARS);

    room.game = GameState::Free(FreeState {
        sub_mode: FreeSubMode::Single,
        phase: FreePhase::SingleActive,
        open: true,
        question: question.clone(),
        seconds,
        expected,
        answers: HashMap::new(),
        ..FreeState::default()
    });
    room.send(ServerMessage::FreeQuestion {
        question,
        seconds,
        index: None,
        total: None,
    });
    Ok(())
}

pub fn player_answer(room: &mut Room, player: &str, text: &str) -> Result<ServerMessage, RoomError> {
    let GameState::Free(state) = &mut room.game else {
        return Err(RoomError::StaleMode);
    };
    let text: String = text.chars().take(MAX_ANSWER_CHARS).collect();

    match (state.sub_mode, state.phase) {
        (FreeSubMode::Single, FreePhase::SingleActive) if state.open => {
            // Last write wins; an earlier validation survives the rewrite
            let entry = state.answers.entry(player.to_string()).or_default();
            entry.text = text;
            Ok(ServerMessage::ack_ok())
        }
        (FreeSubMode::Series, FreePhase::SeriesActive) => {
            let Some(index) = state.current_index else {
                return Err(RoomError::RoundClosed);
            };
            let entry = state
                .answers_by_index
                .entry(index)
                .or_default()
                .entry(player.to_string())
                .or_default();
            entry.text = text;
            Ok(ServerMessage::ack_ok())
        }
        _ => Err(RoomError::RoundClosed),
    }
}

/// Close the single question. Phase becomes idle rather than resetting, so
/// answers stay available for validation toggles.
pub fn admin_close(room: &mut Room) -> Result<(), RoomError> {
    let GameState::Free(state) = &mut room.game else {
        return Err(RoomError::StaleMode);
    };
    if state.sub_mode != FreeSubMode::Single || state.phase != FreePhase::SingleActive {
        return Ok(());
    }
    state.open = false;
    state.phase = FreePhase::Idle;

    let items = build_review_items(&room.players, &state.answers);
    let msg = ServerMessage::FreeResults {
        question: state.question.clone(),
        expected: state.expected.clone(),
        items,
    };
    room.send(msg);
    Ok(())
}

/// Toggle validation of one player's answer; the ledger moves by ±1 so two
/// toggles cancel out exactly
pub fn admin_toggle_validate(room: &mut Room, player: &str) -> Result<(), RoomError> {
    enum Toggled {
        Single(bool),
        Review(usize, bool),
    }

    let toggled = {
        let GameState::Free(state) = &mut room.game else {
            return Err(RoomError::StaleMode);
        };
        match (state.sub_mode, state.phase) {
            (FreeSubMode::Single, FreePhase::Idle) => {
                let entry = state.answers.entry(player.to_string()).or_default();
                entry.validated = !entry.validated;
                Toggled::Single(entry.validated)
            }
            (FreeSubMode::Series, FreePhase::Review) => {
                let index = state.review_index;
                let entry = state
                    .answers_by_index
                    .entry(index)
                    .or_default()
                    .entry(player.to_string())
                    .or_default();
                entry.validated = !entry.validated;
                Toggled::Review(index, entry.validated)
            }
            _ => return Err(RoomError::RoundClosed),
        }
    };

    match toggled {
        Toggled::Single(validated) => {
            let score = room.apply_score_delta(player, if validated { 1 } else { -1 });
            room.send(ServerMessage::FreeValidated {
                name: player.to_string(),
                validated,
                score,
            });
        }
        Toggled::Review(index, validated) => {
            let score = room.apply_score_delta(player, if validated { 1 } else { -1 });
            room.send(ServerMessage::FreeReviewValidated {
                index,
                name: player.to_string(),
                validated,
                score,
            });
        }
    }
    room.broadcast_players();
    Ok(())
}

// ---------- series + review ----------

pub fn admin_series_start(room: &mut Room, items: &[FreeItem]) -> Result<(), RoomError> {
    if items.is_empty() {
        return Err(RoomError::InvalidInput);
    }
    let series: Vec<FreeItem> = items
        .iter()
        .take(MAX_SERIES_ITEMS)
        .map(|item| FreeItem {
            question: clamp_text(&item.question, MAX_QUESTION_CHARS),
            seconds: clamp_seconds(item.seconds, 5, 180, 30),
            answer: clamp_text(&item.answer, MAX_QUESTION_CHARS),
        })
        .collect();

    room.game = GameState::Free(FreeState {
        sub_mode: FreeSubMode::Series,
        phase: FreePhase::SeriesActive,
        series,
        current_index: None,
        ..FreeState::default()
    });
    Ok(())
}

/// Advance to the next question, entering review after the last one. The
/// host's client schedules timing; the engine never self-advances here.
pub fn admin_series_next(room: &mut Room) -> Result<(), RoomError> {
    let (question, seconds, index, total) = {
        let GameState::Free(state) = &mut room.game else {
            return Err(RoomError::StaleMode);
        };
        if state.sub_mode != FreeSubMode::Series || state.phase != FreePhase::SeriesActive {
            return Ok(());
        }
        let next = state.current_index.map_or(0, |i| i + 1);
        if next >= state.series.len() {
            return open_review(room, 0);
        }
        state.current_index = Some(next);
        let item = &state.series[next];
        (item.question.clone(), item.seconds, next, state.series.len())
    };

    room.send(ServerMessage::FreeQuestion {
        question,
        seconds,
        index: Some(index),
        total: Some(total),
    });
    Ok(())
}

/// Cut the series short and enter review at the first question
pub fn admin_series_finish(room: &mut Room) -> Result<(), RoomError> {
    let GameState::Free(state) = &room.game else {
        return Err(RoomError::StaleMode);
    };
    if state.sub_mode != FreeSubMode::Series || state.phase != FreePhase::SeriesActive {
        return Ok(());
    }
    open_review(room, 0)
}

/// Navigate the review to any question index (clamped)
pub fn admin_series_goto(room: &mut Room, index: i64) -> Result<(), RoomError> {
    let clamped = {
        let GameState::Free(state) = &room.game else {
            return Err(RoomError::StaleMode);
        };
        if state.sub_mode != FreeSubMode::Series || state.phase != FreePhase::Review {
            return Ok(());
        }
        index.clamp(0, state.series.len() as i64 - 1) as usize
    };
    open_review(room, clamped)
}

fn open_review(room: &mut Room, index: usize) -> Result<(), RoomError> {
    let GameState::Free(state) = &mut room.game else {
        return Err(RoomError::StaleMode);
    };
    state.phase = FreePhase::Review;
    state.review_index = index;

    let item = &state.series[index];
    let items = match state.answers_by_index.get(&index) {
        Some(answers) => build_review_items(&room.players, answers),
        None => build_review_items(&room.players, &HashMap::new()),
    };
    let msg = ServerMessage::FreeReviewOpen {
        index,
        total: state.series.len(),
        question: item.question.clone(),
        expected: item.answer.clone(),
        items,
    };
    room.send(msg);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn room() -> Room {
        let mut room = Room::new("ABCDE".into(), Instant::now());
        room.players.insert("c1".into(), "Ana".into());
        room.players.insert("c2".into(), "Ben".into());
        room
    }

    fn series(n: usize) -> Vec<FreeItem> {
        (0..n)
            .map(|i| FreeItem {
                question: format!("Q{i}"),
                seconds: 30,
                answer: format!("A{i}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_single_last_write_wins() {
        let mut room = room();
        admin_start(&mut room, "Capital of France?", 30, "Paris").unwrap();
        player_answer(&mut room, "Ana", "Lyon").unwrap();
        player_answer(&mut room, "Ana", "Paris").unwrap();

        let mut rx = room.tx.subscribe();
        admin_close(&mut room).unwrap();

        match rx.try_recv().unwrap() {
            ServerMessage::FreeResults {
                expected, items, ..
            } => {
                assert_eq!(expected, "Paris");
                let ana = items.iter().find(|i| i.name == "Ana").unwrap();
                assert_eq!(ana.text, "Paris");
                // Ben never answered but is listed for the host
                let ben = items.iter().find(|i| i.name == "Ben").unwrap();
                assert_eq!(ben.text, "");
            }
            other => panic!("Expected FreeResults, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_answer_after_close_rejected() {
        let mut room = room();
        admin_start(&mut room, "Q", 30, "").unwrap();
        admin_close(&mut room).unwrap();
        assert_eq!(
            player_answer(&mut room, "Ana", "late"),
            Err(RoomError::RoundClosed)
        );
    }

    #[tokio::test]
    async fn test_toggle_twice_cancels_out() {
        let mut room = room();
        room.apply_score_delta("Ana", 3);
        admin_start(&mut room, "Q", 30, "").unwrap();
        player_answer(&mut room, "Ana", "answer").unwrap();
        admin_close(&mut room).unwrap();

        admin_toggle_validate(&mut room, "Ana").unwrap();
        assert_eq!(room.scores.get("Ana"), Some(&4));
        admin_toggle_validate(&mut room, "Ana").unwrap();
        assert_eq!(room.scores.get("Ana"), Some(&3));
    }

    #[tokio::test]
    async fn test_toggle_rejected_while_question_active() {
        let mut room = room();
        admin_start(&mut room, "Q", 30, "").unwrap();
        assert_eq!(
            admin_toggle_validate(&mut room, "Ana"),
            Err(RoomError::RoundClosed)
        );
    }

    #[tokio::test]
    async fn test_series_walks_questions_then_reviews() {
        let mut room = room();
        let mut rx = room.tx.subscribe();
        admin_series_start(&mut room, &series(2)).unwrap();

        admin_series_next(&mut room).unwrap();
        player_answer(&mut room, "Ana", "first").unwrap();
        admin_series_next(&mut room).unwrap();
        player_answer(&mut room, "Ana", "second").unwrap();
        admin_series_next(&mut room).unwrap();

        let mut saw_q0 = false;
        let mut saw_q1 = false;
        let mut saw_review = false;
        while let Ok(msg) = rx.try_recv() {
            match msg {
                ServerMessage::FreeQuestion { index, total, .. } => {
                    assert_eq!(total, Some(2));
                    match index {
                        Some(0) => saw_q0 = true,
                        Some(1) => saw_q1 = true,
                        other => panic!("unexpected index {other:?}"),
                    }
                }
                ServerMessage::FreeReviewOpen {
                    index,
                    total,
                    question,
                    items,
                    ..
                } => {
                    saw_review = true;
                    assert_eq!(index, 0);
                    assert_eq!(total, 2);
                    assert_eq!(question, "Q0");
                    let ana = items.iter().find(|i| i.name == "Ana").unwrap();
                    assert_eq!(ana.text, "first");
                }
                _ => {}
            }
        }
        assert!(saw_q0 && saw_q1 && saw_review);
    }

    #[tokio::test]
    async fn test_series_review_keeps_per_question_answers() {
        let mut room = room();
        admin_series_start(&mut room, &series(3)).unwrap();
        admin_series_next(&mut room).unwrap();
        player_answer(&mut room, "Ana", "zero").unwrap();
        admin_series_next(&mut room).unwrap();
        player_answer(&mut room, "Ana", "one").unwrap();
        admin_series_finish(&mut room).unwrap();

        let mut rx = room.tx.subscribe();
        admin_series_goto(&mut room, 1).unwrap();
        match rx.try_recv().unwrap() {
            ServerMessage::FreeReviewOpen { index, items, .. } => {
                assert_eq!(index, 1);
                let ana = items.iter().find(|i| i.name == "Ana").unwrap();
                assert_eq!(ana.text, "one");
            }
            other => panic!("Expected FreeReviewOpen, got {other:?}"),
        }

        // Navigating back preserves the earlier question's own answers
        admin_series_goto(&mut room, 0).unwrap();
        match rx.try_recv().unwrap() {
            ServerMessage::FreeReviewOpen { index, items, .. } => {
                assert_eq!(index, 0);
                let ana = items.iter().find(|i| i.name == "Ana").unwrap();
                assert_eq!(ana.text, "zero");
            }
            other => panic!("Expected FreeReviewOpen, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_series_goto_clamps_index() {
        let mut room = room();
        admin_series_start(&mut room, &series(2)).unwrap();
        admin_series_finish(&mut room).unwrap();

        let mut rx = room.tx.subscribe();
        admin_series_goto(&mut room, 99).unwrap();
        match rx.try_recv().unwrap() {
            ServerMessage::FreeReviewOpen { index, .. } => assert_eq!(index, 1),
            other => panic!("Expected FreeReviewOpen, got {other:?}"),
        }
        admin_series_goto(&mut room, -4).unwrap();
        match rx.try_recv().unwrap() {
            ServerMessage::FreeReviewOpen { index, .. } => assert_eq!(index, 0),
            other => panic!("Expected FreeReviewOpen, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_review_toggle_twice_has_no_drift() {
        let mut room = room();
        admin_series_start(&mut room, &series(2)).unwrap();
        admin_series_next(&mut room).unwrap();
        player_answer(&mut room, "Ben", "x").unwrap();
        admin_series_finish(&mut room).unwrap();

        let before = room.scores.get("Ben").copied().unwrap_or(0);
        admin_toggle_validate(&mut room, "Ben").unwrap();
        admin_toggle_validate(&mut room, "Ben").unwrap();
        assert_eq!(room.scores.get("Ben").copied().unwrap_or(0), before);
    }

    #[tokio::test]
    async fn test_empty_series_rejected() {
        let mut room = room();
        assert_eq!(
            admin_series_start(&mut room, &[]),
            Err(RoomError::InvalidInput)
        );
    }

    #[tokio::test]
    async fn test_series_caps_at_fifty_items() {
        let mut room = room();
        admin_series_start(&mut room, &series(60)).unwrap();
        if let GameState::Free(state) = &room.game {
            assert_eq!(state.series.len(), 50);
        } else {
            panic!("Expected free state");
        }
    }
}
