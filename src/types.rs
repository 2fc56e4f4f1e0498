use serde::{Deserialize, Serialize};

/// Connection id assigned per WebSocket (ulid string)
pub type ConnId = String;

/// The pluggable round types a room can run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModeId {
    #[default]
    Buzzer,
    Quiz,
    Guess,
    Free,
    Most,
    Trivia,
}

impl ModeId {
    /// Unknown ids fall back to the default mode
    pub fn from_wire(s: &str) -> Self {
        match s {
            "buzzer" => ModeId::Buzzer,
            "quiz" => ModeId::Quiz,
            "guess" => ModeId::Guess,
            "free" => ModeId::Free,
            "most" => ModeId::Most,
            "trivia" => ModeId::Trivia,
            _ => ModeId::Buzzer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModeId::Buzzer => "buzzer",
            ModeId::Quiz => "quiz",
            ModeId::Guess => "guess",
            ModeId::Free => "free",
            ModeId::Most => "most",
            ModeId::Trivia => "trivia",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The display driving round flow for a room
    Host,
    /// A joined phone participant
    Player,
}

/// One row of the roster broadcast: merged view of the connection presence
/// and the persistent score ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterEntry {
    pub name: String,
    pub score: u32,
    pub connected: bool,
}

/// One item of a free-text series, host-supplied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeItem {
    pub question: String,
    pub seconds: u32,
    #[serde(default)]
    pub answer: String,
}

/// A player's free-text answer with its host-validation flag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreeAnswer {
    pub text: String,
    pub validated: bool,
}

/// Per-player row shown during free-text results/review
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewItem {
    pub name: String,
    pub text: String,
    pub validated: bool,
}

/// One histogram bucket of the guess progress broadcast. `from`/`to` are
/// rounded for display only; counts reflect the unrounded assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuessBin {
    pub from: i64,
    pub to: i64,
    pub count: u32,
}

/// One row of the most-voted ranking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankEntry {
    pub name: String,
    pub votes: u32,
}

/// One host-supplied trivia question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriviaItem {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

/// A player's answer as shown during trivia review
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriviaReviewAnswer {
    pub name: String,
    pub text: String,
    pub correct: bool,
}

/// Final per-player tally of a trivia mini-game (separate from the ledger)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriviaScore {
    pub name: String,
    pub score: u32,
}
