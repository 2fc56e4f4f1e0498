//! Room registry and lifecycle
//!
//! Rooms are created lazily on first reference, touched on every mutating
//! event, and evicted by a periodic sweep once empty and idle longer than
//! the TTL. All operations go through the registry's write lock; game mode
//! engines only ever see a `&mut Room` for the duration of one event.

use super::room::{clean_name, generate_room_code, valid_room_code, Room};
use super::AppState;
use crate::error::RoomError;
use crate::games::trivia;
use crate::protocol::ServerMessage;
use crate::types::ModeId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const MAX_ADJUST_DELTA: i32 = 5;

/// What the host gets back from claiming a room
#[derive(Debug)]
pub struct RoomClaim {
    pub code: String,
    pub admin_token: String,
    pub mode: ModeId,
    pub locked: bool,
    pub rx: broadcast::Receiver<ServerMessage>,
}

/// What a participant gets back from joining
#[derive(Debug)]
pub struct JoinedRoom {
    pub name: String,
    pub mode: ModeId,
    pub rx: broadcast::Receiver<ServerMessage>,
}

impl AppState {
    /// Claim (or lazily create) a room as host. An empty provided token
    /// claims any room, preserving compatibility with token-less displays;
    /// a non-empty token must match the stored one.
    pub async fn create_or_get_room(
        &self,
        code: &str,
        provided_token: &str,
        now: Instant,
    ) -> Result<RoomClaim, RoomError> {
        let code = if code.is_empty() {
            generate_room_code()
        } else {
            code.to_uppercase()
        };
        if !valid_room_code(&code) {
            return Err(RoomError::InvalidRoomCode);
        }

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(code.clone())
            .or_insert_with(|| Room::new(code.clone(), now));

        if !provided_token.is_empty() && provided_token != room.admin_token {
            return Err(RoomError::Forbidden);
        }
        room.touch(now);

        // Subscribe before broadcasting so the claiming connection cannot
        // miss its own join-time burst
        let rx = room.tx.subscribe();
        let claim = RoomClaim {
            code: room.code.clone(),
            admin_token: room.admin_token.clone(),
            mode: room.mode,
            locked: room.locked,
            rx,
        };
        room.broadcast_players();
        room.broadcast_room_state();
        tracing::info!(code = %claim.code, "host claimed room");
        Ok(claim)
    }

    /// Join a room as participant. Rooms are created lazily here too, so a
    /// participant can arrive before the display.
    pub async fn join_room(
        &self,
        code: &str,
        desired_name: &str,
        conn_id: &str,
        now: Instant,
    ) -> Result<JoinedRoom, RoomError> {
        let code = code.to_uppercase();
        if !valid_room_code(&code) {
            return Err(RoomError::InvalidRoomCode);
        }
        if desired_name.trim().is_empty() {
            return Err(RoomError::NameMissing);
        }
        let desired = clean_name(desired_name);

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(code.clone())
            .or_insert_with(|| Room::new(code.clone(), now));
        room.touch(now);
        if room.locked {
            return Err(RoomError::RoomLocked);
        }

        let name = room.unique_name(&desired);
        room.players.insert(conn_id.to_string(), name.clone());
        room.scores.entry(name.clone()).or_insert(0);

        let rx = room.tx.subscribe();
        let joined = JoinedRoom {
            name: name.clone(),
            mode: room.mode,
            rx,
        };
        room.broadcast_players();
        tracing::info!(code = %code, name = %name, "player joined");
        Ok(joined)
    }

    /// Drop a connection from a room's roster; the name's ledger entry
    /// survives until an explicit score reset
    pub async fn leave_room(&self, code: &str, conn_id: &str, now: Instant) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(code) {
            if room.players.remove(conn_id).is_some() {
                room.touch(now);
                room.broadcast_players();
            }
        }
    }

    /// Run one event against a room under the registry lock
    pub async fn with_room<R>(
        &self,
        code: &str,
        f: impl FnOnce(&mut Room) -> Result<R, RoomError>,
    ) -> Result<R, RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(code).ok_or(RoomError::UnknownRoom)?;
        let result = f(room)?;
        room.touch(Instant::now());
        Ok(result)
    }

    /// Zero the ledger for currently-connected names; names absent at reset
    /// time are dropped entirely
    pub async fn reset_scores(&self, code: &str) -> Result<(), RoomError> {
        self.with_room(code, |room| {
            room.scores = room
                .players
                .values()
                .map(|name| (name.clone(), 0))
                .collect();
            room.send(ServerMessage::ScoresReset);
            room.broadcast_players();
            Ok(())
        })
        .await
    }

    /// Manual host correction of one ledger entry, delta clamped to ±5
    pub async fn adjust_score(&self, code: &str, name: &str, delta: i32) -> Result<(), RoomError> {
        let delta = delta.clamp(-MAX_ADJUST_DELTA, MAX_ADJUST_DELTA);
        if name.is_empty() || delta == 0 {
            return Err(RoomError::InvalidInput);
        }
        self.with_room(code, |room| {
            room.apply_score_delta(name, delta);
            room.broadcast_players();
            Ok(())
        })
        .await
    }

    /// Delete rooms with zero connected participants idle beyond the TTL.
    /// Rooms with any connection are never removed regardless of idle time.
    pub async fn sweep_rooms(&self, now: Instant) -> usize {
        let ttl = self.config.room_ttl;
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|code, room| {
            let keep = !room.players.is_empty()
                || now.saturating_duration_since(room.last_activity) <= ttl;
            if !keep {
                tracing::info!(code = %code, "evicting idle room");
            }
            keep
        });
        before - rooms.len()
    }

    /// Start the trivia series and arm its first scheduled close. The
    /// engine validates before anything else, so a rejected start leaves
    /// the room unlocked and untouched.
    pub async fn trivia_start(self: &Arc<Self>, code: &str) -> Result<(), RoomError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(code).ok_or(RoomError::UnknownRoom)?;
        let delay = trivia::admin_start(room)?;
        room.locked = true;
        room.broadcast_room_state();
        room.touch(Instant::now());
        self.arm_trivia_timer(room, delay);
        Ok(())
    }

    /// Schedule the next trivia auto-close, invalidating any pending one
    pub(crate) fn arm_trivia_timer(self: &Arc<Self>, room: &mut Room, delay: Duration) {
        room.cancel_timer();
        let generation = room.timer_gen;
        let code = room.code.clone();
        let state = self.clone();
        room.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.trivia_tick(&code, generation).await;
        }));
    }

    /// Fired by the scheduled advance. Re-resolves the room fresh: a room
    /// deleted, reset, or switched to another mode since scheduling makes
    /// this a no-op.
    pub(crate) async fn trivia_tick(self: &Arc<Self>, code: &str, generation: u64) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(code) else {
            return;
        };
        if room.timer_gen != generation || room.mode != ModeId::Trivia {
            return;
        }
        // This task is the pending timer; drop the handle before re-arming
        room.timer = None;
        if let Some(next) = trivia::close_current(room) {
            self.arm_trivia_timer(room, next);
        }
        room.touch(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TriviaItem;

    fn state() -> AppState {
        AppState::default()
    }

    #[tokio::test]
    async fn test_create_or_get_is_idempotent() {
        let state = state();
        let now = Instant::now();
        let first = state.create_or_get_room("abcde", "", now).await.unwrap();
        assert_eq!(first.code, "ABCDE");

        let second = state.create_or_get_room("ABCDE", "", now).await.unwrap();
        assert_eq!(second.code, first.code);
        assert_eq!(second.admin_token, first.admin_token);
    }

    #[tokio::test]
    async fn test_wrong_admin_token_is_forbidden() {
        let state = state();
        let now = Instant::now();
        let claim = state.create_or_get_room("ABCDE", "", now).await.unwrap();

        let err = state
            .create_or_get_room("ABCDE", "not-the-token", now)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::Forbidden);

        // The real token reclaims fine (display reconnect)
        assert!(state
            .create_or_get_room("ABCDE", &claim.admin_token, now)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_invalid_codes_rejected() {
        let state = state();
        let now = Instant::now();
        for code in ["AB", "TOOLONGCODE", "AB CD", "ab!de"] {
            assert_eq!(
                state.create_or_get_room(code, "", now).await.unwrap_err(),
                RoomError::InvalidRoomCode
            );
        }
    }

    #[tokio::test]
    async fn test_empty_code_generates_one() {
        let state = state();
        let claim = state
            .create_or_get_room("", "", Instant::now())
            .await
            .unwrap();
        assert!(valid_room_code(&claim.code));
    }

    #[tokio::test]
    async fn test_join_dedupes_names() {
        let state = state();
        let now = Instant::now();
        let a = state.join_room("ABCDE", "Sam", "c1", now).await.unwrap();
        let b = state.join_room("ABCDE", "Sam", "c2", now).await.unwrap();
        let c = state.join_room("abcde", "Sam", "c3", now).await.unwrap();
        assert_eq!(a.name, "Sam");
        assert_eq!(b.name, "Sam#2");
        assert_eq!(c.name, "Sam#3");
    }

    #[tokio::test]
    async fn test_join_locked_room_rejected() {
        let state = state();
        let now = Instant::now();
        state.join_room("ABCDE", "Sam", "c1", now).await.unwrap();
        state
            .with_room("ABCDE", |room| {
                room.locked = true;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(
            state
                .join_room("ABCDE", "Late", "c2", now)
                .await
                .unwrap_err(),
            RoomError::RoomLocked
        );
    }

    #[tokio::test]
    async fn test_join_requires_name() {
        let state = state();
        assert_eq!(
            state
                .join_room("ABCDE", "   ", "c1", Instant::now())
                .await
                .unwrap_err(),
            RoomError::NameMissing
        );
    }

    #[tokio::test]
    async fn test_score_survives_disconnect_until_reset() {
        let state = state();
        let now = Instant::now();
        state.join_room("ABCDE", "Sam", "c1", now).await.unwrap();
        state.join_room("ABCDE", "Alex", "c2", now).await.unwrap();
        state
            .with_room("ABCDE", |room| {
                room.apply_score_delta("Sam", 3);
                room.apply_score_delta("Alex", 2);
                Ok(())
            })
            .await
            .unwrap();

        state.leave_room("ABCDE", "c1", now).await;
        let rooms = state.rooms.read().await;
        assert_eq!(rooms["ABCDE"].scores.get("Sam"), Some(&3));
        drop(rooms);

        // Reset zeroes connected names and drops the disconnected one
        state.reset_scores("ABCDE").await.unwrap();
        let rooms = state.rooms.read().await;
        assert!(!rooms["ABCDE"].scores.contains_key("Sam"));
        assert_eq!(rooms["ABCDE"].scores.get("Alex"), Some(&0));
    }

    #[tokio::test]
    async fn test_adjust_score_clamps_delta_and_floor() {
        let state = state();
        let now = Instant::now();
        state.join_room("ABCDE", "Sam", "c1", now).await.unwrap();

        state.adjust_score("ABCDE", "Sam", 99).await.unwrap();
        let rooms = state.rooms.read().await;
        assert_eq!(rooms["ABCDE"].scores.get("Sam"), Some(&5));
        drop(rooms);

        state.adjust_score("ABCDE", "Sam", -5).await.unwrap();
        state.adjust_score("ABCDE", "Sam", -5).await.unwrap();
        let rooms = state.rooms.read().await;
        assert_eq!(rooms["ABCDE"].scores.get("Sam"), Some(&0));
        drop(rooms);

        assert_eq!(
            state.adjust_score("ABCDE", "Sam", 0).await.unwrap_err(),
            RoomError::InvalidInput
        );
    }

    #[tokio::test]
    async fn test_sweep_removes_only_empty_expired_rooms() {
        let state = state();
        let now = Instant::now();
        let ttl = state.config.room_ttl;

        // Empty room, created now
        state.create_or_get_room("EMPTY", "", now).await.unwrap();
        // Occupied room
        state.join_room("BUSY1", "Sam", "c1", now).await.unwrap();

        // Nothing has expired yet
        assert_eq!(state.sweep_rooms(now).await, 0);

        let later = now + ttl + Duration::from_secs(1);
        let removed = state.sweep_rooms(later).await;
        assert_eq!(removed, 1);

        let rooms = state.rooms.read().await;
        assert!(!rooms.contains_key("EMPTY"));
        // A room with a connected participant is never removed
        assert!(rooms.contains_key("BUSY1"));
    }

    #[tokio::test]
    async fn test_mode_switch_cancels_pending_trivia_timer() {
        let state = Arc::new(state());
        let now = Instant::now();
        state.create_or_get_room("ABCDE", "", now).await.unwrap();
        state
            .with_room("ABCDE", |room| {
                room.ensure_mode(ModeId::Trivia);
                trivia::admin_setup(
                    room,
                    &[TriviaItem {
                        question: "Q".into(),
                        answer: "A".into(),
                    }],
                    5,
                )
            })
            .await
            .unwrap();
        state.trivia_start("ABCDE").await.unwrap();

        let generation_before = {
            let rooms = state.rooms.read().await;
            assert!(rooms["ABCDE"].timer.is_some());
            rooms["ABCDE"].timer_gen
        };

        state
            .with_room("ABCDE", |room| {
                room.ensure_mode(ModeId::Buzzer);
                Ok(())
            })
            .await
            .unwrap();

        let rooms = state.rooms.read().await;
        assert!(rooms["ABCDE"].timer.is_none());
        assert_ne!(rooms["ABCDE"].timer_gen, generation_before);
        drop(rooms);

        // A stale generation firing anyway is a no-op
        state.trivia_tick("ABCDE", generation_before).await;
        let rooms = state.rooms.read().await;
        assert!(matches!(
            rooms["ABCDE"].game,
            crate::games::GameState::Buzzer(_)
        ));
    }

    #[tokio::test]
    async fn test_trivia_timer_fires_against_deleted_room_as_noop() {
        let state = Arc::new(state());
        state.trivia_tick("GHOST", 0).await;
    }

    #[tokio::test]
    async fn test_rejected_trivia_start_leaves_room_unlocked() {
        let state = Arc::new(state());
        let now = Instant::now();
        state.create_or_get_room("ABCDE", "", now).await.unwrap();

        // Wrong mode: the room runs buzzer
        assert_eq!(
            state.trivia_start("ABCDE").await.unwrap_err(),
            RoomError::StaleMode
        );
        let rooms = state.rooms.read().await;
        assert!(!rooms["ABCDE"].locked);
        assert!(rooms["ABCDE"].timer.is_none());
        drop(rooms);

        // Right mode but no questions loaded yet
        state
            .with_room("ABCDE", |room| {
                room.ensure_mode(ModeId::Trivia);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(
            state.trivia_start("ABCDE").await.unwrap_err(),
            RoomError::InvalidInput
        );
        let rooms = state.rooms.read().await;
        assert!(!rooms["ABCDE"].locked);
        drop(rooms);

        // Participants can still join after the failed start
        assert!(state.join_room("ABCDE", "Sam", "c1", now).await.is_ok());
    }
}
