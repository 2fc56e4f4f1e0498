use crate::error::RoomError;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Host claims (or lazily creates) a room. An empty token claims a
    /// token-less room; a non-empty token must match the stored one.
    CreateRoom {
        code: String,
        #[serde(default)]
        admin_token: String,
    },
    /// Participant joins a room with a desired display name
    Join {
        room: String,
        name: String,
    },

    // Host room administration
    LockRoom {
        locked: bool,
    },
    SetMode {
        mode: String,
    },
    /// Rebroadcast a countdown to every screen in the room (presentational)
    CountdownStart {
        #[serde(default)]
        seconds: u32,
    },
    /// Re-init the active mode and unlock the room
    RoundReset,
    ScoresReset,
    ScoresAdjust {
        name: String,
        delta: i32,
    },

    // Buzzer
    BuzzOpen,
    BuzzPress,

    // True/false quiz
    QuizStart {
        question: String,
        correct: bool,
        #[serde(default)]
        seconds: u32,
    },
    QuizAnswer {
        answer: bool,
    },
    QuizClose,

    // Guess the number
    GuessStart {
        question: String,
        correct: i64,
        min: i64,
        max: i64,
        #[serde(default)]
        seconds: u32,
    },
    GuessAnswer {
        value: i64,
    },
    GuessClose,

    // Free text, single question
    FreeStart {
        question: String,
        #[serde(default)]
        seconds: u32,
        #[serde(default)]
        answer: String,
    },
    FreeAnswer {
        text: String,
    },
    FreeToggleValidate {
        name: String,
    },
    FreeClose,

    // Free text, series + deferred review
    FreeSeriesStart {
        items: Vec<FreeItem>,
    },
    FreeSeriesNext,
    FreeSeriesFinish,
    FreeSeriesGoto {
        index: i64,
    },

    // Most voted
    MostStart {
        question: String,
        #[serde(default)]
        seconds: u32,
    },
    MostVote {
        target: String,
    },
    MostClose,

    // Trivia, auto-advancing series
    TriviaSetup {
        items: Vec<TriviaItem>,
        #[serde(default)]
        seconds: u32,
    },
    TriviaStart,
    TriviaAnswer {
        text: String,
    },
    TriviaReviewMark {
        name: String,
        correct: bool,
    },
    TriviaReviewNext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent to the host after a successful room claim
    RoomReady {
        code: String,
        admin_token: String,
    },
    RoomState {
        locked: bool,
    },
    /// Merged roster + ledger view, score desc then name asc
    Players {
        list: Vec<RosterEntry>,
    },
    ModeChanged {
        mode: ModeId,
    },
    RoundReset,
    CountdownStart {
        seconds: u32,
    },
    ScoresReset,

    // Buzzer
    RoundOpen,
    RoundWinner {
        name: String,
        score: u32,
    },

    // Quiz
    QuizQuestion {
        question: String,
        seconds: u32,
    },
    QuizResult {
        correct: bool,
        count_true: u32,
        count_false: u32,
        total: u32,
        winners: Vec<String>,
        losers: Vec<String>,
        no_answer: Vec<String>,
    },

    // Guess
    GuessStart {
        question: String,
        min: i64,
        max: i64,
        seconds: u32,
    },
    GuessProgress {
        bins: Vec<GuessBin>,
        total: u32,
        min: i64,
        max: i64,
    },
    GuessResult {
        correct: i64,
        winners: Vec<String>,
        best_diff: Option<i64>,
        tol: i64,
    },

    // Free text
    FreeQuestion {
        question: String,
        seconds: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<usize>,
    },
    FreeResults {
        question: String,
        expected: String,
        items: Vec<ReviewItem>,
    },
    FreeValidated {
        name: String,
        validated: bool,
        score: u32,
    },
    FreeReviewOpen {
        index: usize,
        total: usize,
        question: String,
        expected: String,
        items: Vec<ReviewItem>,
    },
    FreeReviewValidated {
        index: usize,
        name: String,
        validated: bool,
        score: u32,
    },

    // Most voted
    MostQuestion {
        question: String,
        seconds: u32,
        choices: Vec<String>,
    },
    MostResult {
        question: String,
        ranking: Vec<RankEntry>,
        podium: Vec<RankEntry>,
        total_votes: u32,
    },

    // Trivia
    TriviaSetup {
        total: usize,
        seconds: u32,
    },
    TriviaQuestion {
        index: usize,
        total: usize,
        question: String,
        seconds: u32,
    },
    TriviaClosed {
        index: usize,
    },
    TriviaReviewStart {
        total: usize,
    },
    TriviaReview {
        index: usize,
        total: usize,
        question: String,
        correct: String,
        answers: Vec<TriviaReviewAnswer>,
    },
    TriviaMarked {
        name: String,
        correct: bool,
    },
    TriviaSummary {
        scores: Vec<TriviaScore>,
    },

    /// Immediate reply to the calling connection; never broadcast
    Ack {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Final display name on join, winner name on a winning buzz
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn ack_ok() -> Self {
        ServerMessage::Ack {
            ok: true,
            error: None,
            name: None,
        }
    }

    pub fn ack_name(name: impl Into<String>) -> Self {
        ServerMessage::Ack {
            ok: true,
            error: None,
            name: Some(name.into()),
        }
    }

    pub fn ack_err(err: RoomError) -> Self {
        ServerMessage::Ack {
            ok: false,
            error: Some(err.code().to_string()),
            name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_tagging() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"t":"join","room":"ABCDE","name":"Sam"}"#).unwrap();
        match msg {
            ClientMessage::Join { room, name } => {
                assert_eq!(room, "ABCDE");
                assert_eq!(name, "Sam");
            }
            _ => panic!("Expected Join"),
        }
    }

    #[test]
    fn test_create_room_token_defaults_empty() {
        let msg: ClientMessage = serde_json::from_str(r#"{"t":"create_room","code":"AB12"}"#)
            .unwrap();
        match msg {
            ClientMessage::CreateRoom { code, admin_token } => {
                assert_eq!(code, "AB12");
                assert!(admin_token.is_empty());
            }
            _ => panic!("Expected CreateRoom"),
        }
    }

    #[test]
    fn test_ack_skips_absent_fields() {
        let json = serde_json::to_string(&ServerMessage::ack_ok()).unwrap();
        assert_eq!(json, r#"{"t":"ack","ok":true}"#);

        let json = serde_json::to_string(&ServerMessage::ack_err(RoomError::RoomLocked)).unwrap();
        assert!(json.contains(r#""error":"room_locked""#));
    }
}
