//! Pluggable game mode engines
//!
//! Each mode owns one variant of the closed [`GameState`] union and a set of
//! free functions operating on `&mut Room`: `init` (via [`init_state`]), the
//! host's start/close actions, and the participant input. Engines broadcast
//! through the room's channel and return the immediate ack for the calling
//! connection; they never retain references past the current event.

pub mod buzzer;
pub mod free;
pub mod guess;
pub mod most;
pub mod quiz;
pub mod trivia;

use crate::types::ModeId;

/// Mode-specific round state; switching modes atomically replaces this whole
/// value, so no cross-mode fields can leak
#[derive(Debug, Clone)]
pub enum GameState {
    Buzzer(buzzer::BuzzerState),
    Quiz(quiz::QuizState),
    Guess(guess::GuessState),
    Free(free::FreeState),
    Most(most::MostState),
    Trivia(trivia::TriviaState),
}

/// Fresh state for a mode, as produced by that mode's `init`
pub fn init_state(mode: ModeId) -> GameState {
    match mode {
        ModeId::Buzzer => GameState::Buzzer(buzzer::BuzzerState::default()),
        ModeId::Quiz => GameState::Quiz(quiz::QuizState::default()),
        ModeId::Guess => GameState::Guess(guess::GuessState::default()),
        ModeId::Free => GameState::Free(free::FreeState::default()),
        ModeId::Most => GameState::Most(most::MostState::default()),
        ModeId::Trivia => GameState::Trivia(trivia::TriviaState::default()),
    }
}

/// Clamp a host-supplied duration into a mode's accepted range
pub(crate) fn clamp_seconds(value: u32, min: u32, max: u32, default: u32) -> u32 {
    if value == 0 {
        default
    } else {
        value.clamp(min, max)
    }
}

/// Trim and length-cap a host-supplied question or expected answer
pub(crate) fn clamp_text(value: &str, max_chars: usize) -> String {
    value.trim().chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_state_matches_mode() {
        assert!(matches!(init_state(ModeId::Buzzer), GameState::Buzzer(_)));
        assert!(matches!(init_state(ModeId::Most), GameState::Most(_)));
        assert!(matches!(init_state(ModeId::Trivia), GameState::Trivia(_)));
    }

    #[test]
    fn test_clamp_seconds() {
        assert_eq!(clamp_seconds(0, 5, 180, 30), 30);
        assert_eq!(clamp_seconds(3, 5, 180, 30), 5);
        assert_eq!(clamp_seconds(600, 5, 180, 30), 180);
        assert_eq!(clamp_seconds(42, 5, 180, 30), 42);
    }
}
