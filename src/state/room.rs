use crate::games::{self, GameState};
use crate::protocol::ServerMessage;
use crate::types::{ConnId, ModeId, RosterEntry};
use rand::Rng;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::broadcast;

/// Safe character set for room codes (excludes 0/O, 1/I/L to avoid confusion)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 5;
const ADMIN_TOKEN_LENGTH: usize = 48;

const MAX_NAME_CHARS: usize = 16;
const FALLBACK_NAME: &str = "Player";

/// Capacity of each room's fan-out channel; a lagging receiver drops
/// messages rather than backpressuring the game
const BROADCAST_CAPACITY: usize = 64;

/// Room codes are 4-8 uppercase alphanumeric characters everywhere a code
/// is accepted, regardless of what alphabet generated them
pub fn valid_room_code(code: &str) -> bool {
    (4..=8).contains(&code.len())
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Generate a random 5-character room code from the unambiguous alphabet
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

fn generate_admin_token() -> String {
    let mut rng = rand::rng();
    (0..ADMIN_TOKEN_LENGTH)
        .map(|_| char::from(rng.sample(rand::distr::Alphanumeric)))
        .collect()
}

/// Strip a desired display name down to alphanumerics plus limited
/// punctuation, length-capped; empty results fall back to a generic name
pub fn clean_name(desired: &str) -> String {
    let cleaned: String = desired
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-'))
        .collect();
    let cleaned = cleaned.trim();
    let capped: String = cleaned.chars().take(MAX_NAME_CHARS).collect();
    if capped.trim().is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        capped.trim().to_string()
    }
}

/// One isolated game session: roster, score ledger, active mode and its state
pub struct Room {
    pub code: String,
    /// Connected participants, connection-id -> display name
    pub players: HashMap<ConnId, String>,
    /// Persistent ledger keyed by name; survives disconnection until reset
    pub scores: HashMap<String, u32>,
    pub mode: ModeId,
    pub game: GameState,
    pub locked: bool,
    pub admin_token: String,
    pub last_activity: Instant,
    /// Room-scoped fan-out; delivery is fire-and-forget
    pub tx: broadcast::Sender<ServerMessage>,
    /// Pending auto-advance task (trivia only); aborted on any state swap
    pub(crate) timer: Option<tokio::task::JoinHandle<()>>,
    /// Bumped whenever the timer is cancelled so a stale fire is a no-op
    pub timer_gen: u64,
}

impl Room {
    pub fn new(code: String, now: Instant) -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            code,
            players: HashMap::new(),
            scores: HashMap::new(),
            mode: ModeId::Buzzer,
            game: games::init_state(ModeId::Buzzer),
            locked: false,
            admin_token: generate_admin_token(),
            last_activity: now,
            tx,
            timer: None,
            timer_gen: 0,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn send(&self, msg: ServerMessage) {
        let _ = self.tx.send(msg);
    }

    /// Abort any pending scheduled advance and invalidate its generation.
    /// Required whenever the mode or game state is replaced so a stale timer
    /// cannot fire against the new state.
    pub fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
        self.timer_gen = self.timer_gen.wrapping_add(1);
    }

    /// Replace the game state via the mode's init, cancelling pending timers
    pub fn reset_game(&mut self) {
        self.cancel_timer();
        self.game = games::init_state(self.mode);
    }

    /// Switch the active mode, atomically replacing the game state and
    /// announcing the switch. Participants mid-answer lose their in-flight
    /// answer by design.
    pub fn ensure_mode(&mut self, mode: ModeId) {
        self.mode = mode;
        self.reset_game();
        self.send(ServerMessage::ModeChanged { mode });
        self.send(ServerMessage::RoundReset);
    }

    /// Desired name, deduplicated within the room by suffixing #2, #3, ...
    pub fn unique_name(&self, desired: &str) -> String {
        let taken: std::collections::HashSet<&str> =
            self.players.values().map(|n| n.as_str()).collect();
        if !taken.contains(desired) {
            return desired.to_string();
        }
        let mut i = 2;
        loop {
            let candidate = format!("{desired}#{i}");
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            i += 1;
        }
    }

    pub fn connected_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.players.values().cloned().collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.players.values().any(|n| n == name)
    }

    /// Apply a relative delta to a player's ledger entry, clamped at zero.
    /// Returns the new score.
    pub fn apply_score_delta(&mut self, name: &str, delta: i32) -> u32 {
        let entry = self.scores.entry(name.to_string()).or_insert(0);
        *entry = entry.saturating_add_signed(delta);
        *entry
    }

    /// Broadcast the merged roster: every name in the ledger plus every
    /// connected player, sorted by score desc then name asc
    pub fn broadcast_players(&self) {
        let mut list: HashMap<String, RosterEntry> = self
            .scores
            .iter()
            .map(|(name, score)| {
                (
                    name.clone(),
                    RosterEntry {
                        name: name.clone(),
                        score: *score,
                        connected: false,
                    },
                )
            })
            .collect();
        for name in self.players.values() {
            list.entry(name.clone())
                .or_insert_with(|| RosterEntry {
                    name: name.clone(),
                    score: 0,
                    connected: true,
                })
                .connected = true;
        }
        let mut list: Vec<RosterEntry> = list.into_values().collect();
        list.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        self.send(ServerMessage::Players { list });
    }

    pub fn broadcast_room_state(&self) {
        self.send(ServerMessage::RoomState {
            locked: self.locked,
        });
    }
}

impl Drop for Room {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_room_code() {
        assert!(valid_room_code("ABCD"));
        assert!(valid_room_code("ABCDE"));
        assert!(valid_room_code("AB12CD34"));
        assert!(!valid_room_code("ABC"));
        assert!(!valid_room_code("ABCDEFGHI"));
        assert!(!valid_room_code("abcde"));
        assert!(!valid_room_code("AB CD"));
    }

    #[test]
    fn test_generated_codes_use_unambiguous_alphabet() {
        for _ in 0..50 {
            let code = generate_room_code();
            assert_eq!(code.len(), 5);
            assert!(valid_room_code(&code));
            assert!(!code.contains('O') && !code.contains('0'));
            assert!(!code.contains('I') && !code.contains('1') && !code.contains('L'));
        }
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("Sam"), "Sam");
        assert_eq!(clean_name("  Sam!@# "), "Sam");
        assert_eq!(clean_name("J_R. Dobbs-42"), "J_R. Dobbs-42");
        assert_eq!(clean_name("<script>"), "script");
        assert_eq!(clean_name("!!!"), "Player");
        assert_eq!(clean_name(""), "Player");
        assert!(clean_name("aaaaaaaaaaaaaaaaaaaaaaaa").len() <= 16);
    }

    #[tokio::test]
    async fn test_unique_name_suffixing() {
        let mut room = Room::new("ABCDE".into(), Instant::now());
        room.players.insert("c1".into(), "Sam".into());
        assert_eq!(room.unique_name("Sam"), "Sam#2");
        room.players.insert("c2".into(), "Sam#2".into());
        assert_eq!(room.unique_name("Sam"), "Sam#3");
        assert_eq!(room.unique_name("Alex"), "Alex");
    }

    #[tokio::test]
    async fn test_score_delta_clamps_at_zero() {
        let mut room = Room::new("ABCDE".into(), Instant::now());
        assert_eq!(room.apply_score_delta("Sam", -3), 0);
        assert_eq!(room.apply_score_delta("Sam", 2), 2);
        assert_eq!(room.apply_score_delta("Sam", -5), 0);
    }

    #[tokio::test]
    async fn test_roster_merges_ledger_and_presence() {
        let mut room = Room::new("ABCDE".into(), Instant::now());
        let mut rx = room.tx.subscribe();

        room.scores.insert("Gone".into(), 3);
        room.players.insert("c1".into(), "Here".into());
        room.apply_score_delta("Here", 1);
        room.broadcast_players();

        match rx.try_recv().unwrap() {
            ServerMessage::Players { list } => {
                assert_eq!(list.len(), 2);
                // Gone has the higher score, sorts first, but is disconnected
                assert_eq!(list[0].name, "Gone");
                assert!(!list[0].connected);
                assert_eq!(list[1].name, "Here");
                assert!(list[1].connected);
                assert_eq!(list[1].score, 1);
            }
            other => panic!("Expected Players, got {other:?}"),
        }
    }
}
