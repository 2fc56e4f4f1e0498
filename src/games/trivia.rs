//! Auto-advancing trivia series with deferred marking
//!
//! The one mode that owns round timing: each question gets a single
//! scheduled close, re-armed for the next question when it fires. The engine
//! itself only reports the delay to arm; the registry owns the task and
//! cancels it whenever the room's mode or state is replaced, so a stale
//! timer can never fire against new state. Trivia marks feed a per-mini-game
//! tally and never touch the persistent ledger.

use super::{clamp_seconds, clamp_text, GameState};
use crate::error::RoomError;
use crate::protocol::ServerMessage;
use crate::state::room::Room;
use crate::types::{TriviaItem, TriviaReviewAnswer, TriviaScore};
use std::collections::HashMap;
use std::time::Duration;

const MAX_ITEMS: usize = 20;
const MAX_QUESTION_CHARS: usize = 300;
const MAX_ANSWER_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriviaPhase {
    #[default]
    Idle,
    Ask,
    Review,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct TriviaState {
    pub phase: TriviaPhase,
    pub index: usize,
    pub seconds: u32,
    pub items: Vec<TriviaItem>,
    /// Answers for the question currently on screen, latest value kept
    pub answers: HashMap<String, String>,
    pub answers_by_question: Vec<HashMap<String, String>>,
    pub marks_by_question: Vec<HashMap<String, bool>>,
    pub review_index: usize,
}

pub fn admin_setup(room: &mut Room, items: &[TriviaItem], seconds: u32) -> Result<(), RoomError> {
    if items.is_empty() {
        return Err(RoomError::InvalidInput);
    }
    let items: Vec<TriviaItem> = items
        .iter()
        .take(MAX_ITEMS)
        .map(|item| TriviaItem {
            question: clamp_text(&item.question, MAX_QUESTION_CHARS),
            answer: clamp_text(&item.answer, MAX_ANSWER_CHARS),
        })
        .collect();
    let seconds = clamp_seconds(seconds, 5, 60, 15);
    let total = items.len();

    room.cancel_timer();
    room.game = GameState::Trivia(TriviaState {
        phase: TriviaPhase::Idle,
        seconds,
        answers_by_question: vec![HashMap::new(); total],
        marks_by_question: vec![HashMap::new(); total],
        items,
        ..TriviaState::default()
    });
    room.send(ServerMessage::TriviaSetup { total, seconds });
    Ok(())
}

/// Start the series; returns the delay after which the first question closes
pub fn admin_start(room: &mut Room) -> Result<Duration, RoomError> {
    let seconds = {
        let GameState::Trivia(state) = &mut room.game else {
            return Err(RoomError::StaleMode);
        };
        if state.items.is_empty() || state.phase != TriviaPhase::Idle {
            return Err(RoomError::InvalidInput);
        }
        state.phase = TriviaPhase::Ask;
        state.index = 0;
        state.answers = HashMap::new();
        state.seconds
    };
    emit_question(room);
    Ok(Duration::from_secs(seconds as u64))
}

fn emit_question(room: &Room) {
    let GameState::Trivia(state) = &room.game else {
        return;
    };
    let item = &state.items[state.index];
    room.send(ServerMessage::TriviaQuestion {
        index: state.index + 1,
        total: state.items.len(),
        question: item.question.clone(),
        seconds: state.seconds,
    });
}

/// Close the question on screen: freeze its answers, then either advance
/// (returning the next close delay) or open the review. Called when the
/// scheduled advance fires; a no-op outside the ask phase.
pub fn close_current(room: &mut Room) -> Option<Duration> {
    let advanced = {
        let GameState::Trivia(state) = &mut room.game else {
            return None;
        };
        if state.phase != TriviaPhase::Ask {
            return None;
        }
        let index = state.index;
        state.answers_by_question[index] = std::mem::take(&mut state.answers);
        if index + 1 < state.items.len() {
            state.index = index + 1;
            Some((index, Duration::from_secs(state.seconds as u64)))
        } else {
            state.phase = TriviaPhase::Review;
            state.review_index = 0;
            None
        }
    };

    match advanced {
        Some((closed_index, delay)) => {
            room.send(ServerMessage::TriviaClosed {
                index: closed_index + 1,
            });
            emit_question(room);
            Some(delay)
        }
        None => {
            let total = match &room.game {
                GameState::Trivia(state) => state.items.len(),
                _ => 0,
            };
            room.send(ServerMessage::TriviaClosed { index: total });
            room.send(ServerMessage::TriviaReviewStart { total });
            emit_review(room);
            None
        }
    }
}

pub fn player_answer(room: &mut Room, player: &str, text: &str) -> Result<ServerMessage, RoomError> {
    let GameState::Trivia(state) = &mut room.game else {
        return Err(RoomError::StaleMode);
    };
    if state.phase != TriviaPhase::Ask {
        return Err(RoomError::RoundClosed);
    }
    let text: String = text.chars().take(MAX_ANSWER_CHARS).collect();
    state.answers.insert(player.to_string(), text);
    Ok(ServerMessage::ack_ok())
}

fn emit_review(room: &Room) {
    let GameState::Trivia(state) = &room.game else {
        return;
    };
    let index = state.review_index;
    let item = &state.items[index];
    let marks = &state.marks_by_question[index];
    let mut answers: Vec<TriviaReviewAnswer> = state.answers_by_question[index]
        .iter()
        .map(|(name, text)| TriviaReviewAnswer {
            name: name.clone(),
            text: text.clone(),
            correct: marks.get(name).copied().unwrap_or(false),
        })
        .collect();
    answers.sort_by(|a, b| a.name.cmp(&b.name));

    room.send(ServerMessage::TriviaReview {
        index: index + 1,
        total: state.items.len(),
        question: item.question.clone(),
        correct: item.answer.clone(),
        answers,
    });
}

/// Host marks one player's answer correct/incorrect for the question under
/// review
pub fn review_mark(room: &mut Room, player: &str, correct: bool) -> Result<(), RoomError> {
    let GameState::Trivia(state) = &mut room.game else {
        return Err(RoomError::StaleMode);
    };
    if state.phase != TriviaPhase::Review {
        return Err(RoomError::RoundClosed);
    }
    let index = state.review_index;
    state.marks_by_question[index].insert(player.to_string(), correct);
    room.send(ServerMessage::TriviaMarked {
        name: player.to_string(),
        correct,
    });
    Ok(())
}

/// Advance the review; after the last question, broadcast the mini-game
/// ranking and finish
pub fn review_next(room: &mut Room) -> Result<(), RoomError> {
    let finished = {
        let GameState::Trivia(state) = &mut room.game else {
            return Err(RoomError::StaleMode);
        };
        if state.phase != TriviaPhase::Review {
            return Err(RoomError::RoundClosed);
        }
        if state.review_index + 1 < state.items.len() {
            state.review_index += 1;
            false
        } else {
            state.phase = TriviaPhase::Done;
            true
        }
    };

    if finished {
        finish(room);
    } else {
        emit_review(room);
    }
    Ok(())
}

fn finish(room: &Room) {
    let GameState::Trivia(state) = &room.game else {
        return;
    };
    let mut tally: HashMap<&String, u32> = HashMap::new();
    for marks in &state.marks_by_question {
        for (name, correct) in marks {
            if *correct {
                *tally.entry(name).or_insert(0) += 1;
            }
        }
    }
    let mut scores: Vec<TriviaScore> = tally
        .into_iter()
        .map(|(name, score)| TriviaScore {
            name: name.clone(),
            score,
        })
        .collect();
    scores.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));

    room.send(ServerMessage::TriviaSummary { scores });
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

    fn items(n: usize) -> Vec<TriviaItem> {
        (0..n)
            .map(|i| TriviaItem {
                question: format!("Q{i}"),
                answer: format!("A{i}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_start_emits_first_question_and_close_delay() {
        let mut room = room();
        admin_setup(&mut room, &items(2), 10).unwrap();

        let mut rx = room.tx.subscribe();
        let delay = admin_start(&mut room).unwrap();
        assert_eq!(delay, Duration::from_secs(10));

        match rx.try_recv().unwrap() {
            ServerMessage::TriviaQuestion {
                index,
                total,
                question,
                seconds,
            } => {
                assert_eq!((index, total), (1, 2));
                assert_eq!(question, "Q0");
                assert_eq!(seconds, 10);
            }
            other => panic!("Expected TriviaQuestion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_advances_then_reviews() {
        let mut room = room();
        admin_setup(&mut room, &items(2), 10).unwrap();
        admin_start(&mut room).unwrap();
        player_answer(&mut room, "Ana", "first").unwrap();

        // Question 1 closes, question 2 opens, another close is scheduled
        assert!(close_current(&mut room).is_some());
        player_answer(&mut room, "Ana", "second").unwrap();

        // Last close enters review
        let mut rx = room.tx.subscribe();
        assert!(close_current(&mut room).is_none());

        let mut saw_review = false;
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::TriviaReview { index, answers, .. } = msg {
                saw_review = true;
                assert_eq!(index, 1);
                assert_eq!(answers.len(), 1);
                assert_eq!(answers[0].text, "first");
            }
        }
        assert!(saw_review);
    }

    #[tokio::test]
    async fn test_latest_answer_kept_per_question() {
        let mut room = room();
        admin_setup(&mut room, &items(1), 10).unwrap();
        admin_start(&mut room).unwrap();
        player_answer(&mut room, "Ana", "draft").unwrap();
        player_answer(&mut room, "Ana", "final").unwrap();
        close_current(&mut room);

        if let GameState::Trivia(state) = &room.game {
            assert_eq!(state.answers_by_question[0].get("Ana"), Some(&"final".to_string()));
        } else {
            panic!("Expected trivia state");
        }
    }

    #[tokio::test]
    async fn test_marks_tally_into_summary_without_touching_ledger() {
        let mut room = room();
        admin_setup(&mut room, &items(2), 10).unwrap();
        admin_start(&mut room).unwrap();
        player_answer(&mut room, "Ana", "a").unwrap();
        close_current(&mut room);
        player_answer(&mut room, "Ana", "b").unwrap();
        player_answer(&mut room, "Ben", "b").unwrap();
        close_current(&mut room);

        review_mark(&mut room, "Ana", true).unwrap();
        review_next(&mut room).unwrap();
        review_mark(&mut room, "Ana", true).unwrap();
        review_mark(&mut room, "Ben", true).unwrap();
        review_mark(&mut room, "Ben", false).unwrap(); // host corrects themselves

        let mut rx = room.tx.subscribe();
        review_next(&mut room).unwrap();

        match rx.try_recv().unwrap() {
            ServerMessage::TriviaSummary { scores } => {
                assert_eq!(scores[0], TriviaScore { name: "Ana".into(), score: 2 });
                assert!(scores.iter().all(|s| s.name != "Ben" || s.score == 0));
            }
            other => panic!("Expected TriviaSummary, got {other:?}"),
        }
        assert!(room.scores.is_empty());
    }

    #[tokio::test]
    async fn test_answer_outside_ask_phase_rejected() {
        let mut room = room();
        admin_setup(&mut room, &items(1), 10).unwrap();
        assert_eq!(
            player_answer(&mut room, "Ana", "early"),
            Err(RoomError::RoundClosed)
        );
    }

    #[tokio::test]
    async fn test_close_outside_ask_phase_is_noop() {
        let mut room = room();
        admin_setup(&mut room, &items(1), 10).unwrap();
        assert!(close_current(&mut room).is_none());
        if let GameState::Trivia(state) = &room.game {
            assert_eq!(state.phase, TriviaPhase::Idle);
        } else {
            panic!("Expected trivia state");
        }
    }
}
