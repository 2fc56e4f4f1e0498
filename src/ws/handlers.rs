//! WebSocket message dispatch
//!
//! All validation happens here at the event-entry boundary: role checks,
//! rate limits, and room resolution. Once a game engine is called the input
//! is assumed valid. Every participant message is answered with an ack;
//! host-only violations get an `unauthorized` ack and nothing else, so
//! unauthorized callers learn nothing about the room.

use crate::error::RoomError;
use crate::limiter::{RateLimiter, INPUT_LIMIT, JOIN_LIMIT};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::{ConnId, ModeId, Role};
use crate::games::{buzzer, free, guess, most, quiz, trivia, GameState};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Per-connection context, owned by the socket task
pub struct ConnCtx {
    pub conn_id: ConnId,
    pub role: Option<Role>,
    pub room: Option<String>,
    pub name: Option<String>,
    pub limiter: RateLimiter,
}

impl ConnCtx {
    pub fn new() -> Self {
        Self {
            conn_id: ulid::Ulid::new().to_string(),
            role: None,
            room: None,
            name: None,
            limiter: RateLimiter::new(),
        }
    }
}

impl Default for ConnCtx {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of handling one message: direct replies for the calling
/// connection, plus a new room subscription when the connection joined one.
/// `drop_subscription` tells the socket task to discard its current room
/// feed even though no new one replaces it.
pub struct HandleOutcome {
    pub replies: Vec<ServerMessage>,
    pub subscription: Option<broadcast::Receiver<ServerMessage>>,
    pub drop_subscription: bool,
}

impl HandleOutcome {
    fn none() -> Self {
        Self {
            replies: Vec::new(),
            subscription: None,
            drop_subscription: false,
        }
    }

    fn reply(msg: ServerMessage) -> Self {
        Self {
            replies: vec![msg],
            subscription: None,
            drop_subscription: false,
        }
    }

    fn ack_err(err: RoomError) -> Self {
        Self::reply(ServerMessage::ack_err(err))
    }
}

fn ack_result(result: Result<(), RoomError>) -> HandleOutcome {
    match result {
        Ok(()) => HandleOutcome::reply(ServerMessage::ack_ok()),
        Err(err) => HandleOutcome::ack_err(err),
    }
}

/// Resolve the host's room or bail with an `unauthorized` ack
macro_rules! require_host {
    ($ctx:expr) => {
        match (&$ctx.role, &$ctx.room) {
            (Some(Role::Host), Some(code)) => code.clone(),
            _ => return HandleOutcome::ack_err(RoomError::Unauthorized),
        }
    };
}

/// Resolve a participant's room and name or bail with a failure ack
macro_rules! require_player {
    ($ctx:expr) => {
        match (&$ctx.room, &$ctx.name) {
            (Some(code), Some(name)) => (code.clone(), name.clone()),
            _ => return HandleOutcome::ack_err(RoomError::Unauthorized),
        }
    };
}

/// Admit one participant input through the sliding window or bail
macro_rules! require_rate {
    ($ctx:expr, $action:literal, $limit:expr) => {
        if !$ctx.limiter.check($action, $limit.0, $limit.1) {
            tracing::warn!(action = $action, "rate limited");
            return HandleOutcome::ack_err(RoomError::RateLimited);
        }
    };
}

pub async fn handle_message(
    state: &Arc<AppState>,
    ctx: &mut ConnCtx,
    msg: ClientMessage,
) -> HandleOutcome {
    match msg {
        ClientMessage::CreateRoom { code, admin_token } => {
            match state
                .create_or_get_room(&code, &admin_token, Instant::now())
                .await
            {
                Ok(claim) => {
                    ctx.role = Some(Role::Host);
                    ctx.room = Some(claim.code.clone());
                    HandleOutcome {
                        replies: vec![
                            ServerMessage::RoomReady {
                                code: claim.code,
                                admin_token: claim.admin_token,
                            },
                            ServerMessage::ModeChanged { mode: claim.mode },
                        ],
                        subscription: Some(claim.rx),
                        drop_subscription: false,
                    }
                }
                Err(err) => HandleOutcome::reply(ServerMessage::Error {
                    code: err.code().to_string(),
                    msg: err.to_string(),
                }),
            }
        }

        ClientMessage::Join { room, name } => {
            require_rate!(ctx, "join", JOIN_LIMIT);
            // A connection can hop rooms; drop its old roster entry first
            let left_old = if let Some(old) = ctx.room.take() {
                state.leave_room(&old, &ctx.conn_id, Instant::now()).await;
                ctx.name = None;
                true
            } else {
                false
            };
            match state
                .join_room(&room, &name, &ctx.conn_id, Instant::now())
                .await
            {
                Ok(joined) => {
                    ctx.role = Some(Role::Player);
                    ctx.room = Some(room.to_uppercase());
                    ctx.name = Some(joined.name.clone());
                    HandleOutcome {
                        replies: vec![
                            ServerMessage::ack_name(joined.name),
                            ServerMessage::ModeChanged { mode: joined.mode },
                        ],
                        subscription: Some(joined.rx),
                        drop_subscription: false,
                    }
                }
                Err(err) => {
                    // The old room was already left; the socket must stop
                    // listening to its feed too
                    let mut outcome = HandleOutcome::ack_err(err);
                    outcome.drop_subscription = left_old;
                    outcome
                }
            }
        }

        // Room administration
        ClientMessage::LockRoom { locked } => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        room.locked = locked;
                        room.broadcast_room_state();
                        Ok(())
                    })
                    .await,
            )
        }

        ClientMessage::SetMode { mode } => {
            let code = require_host!(ctx);
            let mode = ModeId::from_wire(&mode);
            ack_result(
                state
                    .with_room(&code, |room| {
                        room.ensure_mode(mode);
                        Ok(())
                    })
                    .await,
            )
        }

        ClientMessage::CountdownStart { seconds } => {
            let code = require_host!(ctx);
            let seconds = if seconds == 0 { 3 } else { seconds.clamp(1, 60) };
            ack_result(
                state
                    .with_room(&code, |room| {
                        room.send(ServerMessage::CountdownStart { seconds });
                        Ok(())
                    })
                    .await,
            )
        }

        ClientMessage::RoundReset => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        room.reset_game();
                        room.locked = false;
                        room.send(ServerMessage::RoundReset);
                        room.broadcast_room_state();
                        Ok(())
                    })
                    .await,
            )
        }

        ClientMessage::ScoresReset => {
            let code = require_host!(ctx);
            ack_result(state.reset_scores(&code).await)
        }

        ClientMessage::ScoresAdjust { name, delta } => {
            let code = require_host!(ctx);
            ack_result(state.adjust_score(&code, &name, delta).await)
        }

        // Buzzer
        ClientMessage::BuzzOpen => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        if room.mode != ModeId::Buzzer {
                            return Err(RoomError::StaleMode);
                        }
                        room.locked = true;
                        room.broadcast_room_state();
                        buzzer::admin_open(room)
                    })
                    .await,
            )
        }

        ClientMessage::BuzzPress => {
            let (code, name) = require_player!(ctx);
            require_rate!(ctx, "buzz_press", INPUT_LIMIT);
            let result = state
                .with_room(&code, |room| {
                    let ack = buzzer::player_press(room, &name)?;
                    // A winning press closes the round and unlocks the room
                    room.locked = false;
                    room.broadcast_room_state();
                    Ok(ack)
                })
                .await;
            match result {
                Ok(ack) => HandleOutcome::reply(ack),
                Err(err) => HandleOutcome::ack_err(err),
            }
        }

        // Quiz
        ClientMessage::QuizStart {
            question,
            correct,
            seconds,
        } => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        if room.mode != ModeId::Quiz {
                            room.ensure_mode(ModeId::Quiz);
                        }
                        room.locked = true;
                        room.broadcast_room_state();
                        quiz::admin_start(room, &question, correct, seconds)
                    })
                    .await,
            )
        }

        ClientMessage::QuizAnswer { answer } => {
            let (code, name) = require_player!(ctx);
            require_rate!(ctx, "quiz_answer", INPUT_LIMIT);
            player_result(state.with_room(&code, |room| quiz::player_answer(room, &name, answer)).await)
        }

        ClientMessage::QuizClose => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        quiz::admin_close(room)?;
                        room.locked = false;
                        room.broadcast_room_state();
                        Ok(())
                    })
                    .await,
            )
        }

        // Guess
        ClientMessage::GuessStart {
            question,
            correct,
            min,
            max,
            seconds,
        } => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        if room.mode != ModeId::Guess {
                            room.ensure_mode(ModeId::Guess);
                        }
                        room.locked = true;
                        room.broadcast_room_state();
                        guess::admin_start(room, &question, correct, min, max, seconds)
                    })
                    .await,
            )
        }

        ClientMessage::GuessAnswer { value } => {
            let (code, name) = require_player!(ctx);
            require_rate!(ctx, "guess_answer", INPUT_LIMIT);
            player_result(state.with_room(&code, |room| guess::player_answer(room, &name, value)).await)
        }

        ClientMessage::GuessClose => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        guess::admin_close(room)?;
                        room.locked = false;
                        room.broadcast_room_state();
                        Ok(())
                    })
                    .await,
            )
        }

        // Free text
        ClientMessage::FreeStart {
            question,
            seconds,
            answer,
        } => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        if room.mode != ModeId::Free {
                            room.ensure_mode(ModeId::Free);
                        }
                        room.locked = true;
                        room.broadcast_room_state();
                        free::admin_start(room, &question, seconds, &answer)
                    })
                    .await,
            )
        }

        ClientMessage::FreeAnswer { text } => {
            let (code, name) = require_player!(ctx);
            require_rate!(ctx, "free_answer", INPUT_LIMIT);
            player_result(state.with_room(&code, |room| free::player_answer(room, &name, &text)).await)
        }

        ClientMessage::FreeToggleValidate { name } => {
            let code = require_host!(ctx);
            let name: String = name.chars().take(32).collect();
            if name.is_empty() {
                return HandleOutcome::ack_err(RoomError::InvalidInput);
            }
            ack_result(
                state
                    .with_room(&code, |room| free::admin_toggle_validate(room, &name))
                    .await,
            )
        }

        ClientMessage::FreeClose => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        free::admin_close(room)?;
                        room.locked = false;
                        room.broadcast_room_state();
                        Ok(())
                    })
                    .await,
            )
        }

        ClientMessage::FreeSeriesStart { items } => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        if room.mode != ModeId::Free {
                            room.ensure_mode(ModeId::Free);
                        }
                        room.locked = true;
                        room.broadcast_room_state();
                        free::admin_series_start(room, &items)?;
                        // The first question opens immediately
                        free::admin_series_next(room)
                    })
                    .await,
            )
        }

        ClientMessage::FreeSeriesNext => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| free::admin_series_next(room))
                    .await,
            )
        }

        ClientMessage::FreeSeriesFinish => {
            // The room stays locked through the manual review; the host
            // unlocks via round reset or a mode switch when done
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| free::admin_series_finish(room))
                    .await,
            )
        }

        ClientMessage::FreeSeriesGoto { index } => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| free::admin_series_goto(room, index))
                    .await,
            )
        }

        // Most voted
        ClientMessage::MostStart { question, seconds } => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        if room.mode != ModeId::Most {
                            room.ensure_mode(ModeId::Most);
                        }
                        room.locked = true;
                        room.broadcast_room_state();
                        most::admin_start(room, &question, seconds)
                    })
                    .await,
            )
        }

        ClientMessage::MostVote { target } => {
            let (code, name) = require_player!(ctx);
            require_rate!(ctx, "most_vote", INPUT_LIMIT);
            player_result(state.with_room(&code, |room| most::player_vote(room, &name, &target)).await)
        }

        ClientMessage::MostClose => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        most::admin_close(room)?;
                        room.locked = false;
                        room.broadcast_room_state();
                        Ok(())
                    })
                    .await,
            )
        }

        // Trivia
        ClientMessage::TriviaSetup { items, seconds } => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        if room.mode != ModeId::Trivia {
                            room.ensure_mode(ModeId::Trivia);
                        }
                        trivia::admin_setup(room, &items, seconds)
                    })
                    .await,
            )
        }

        ClientMessage::TriviaStart => {
            let code = require_host!(ctx);
            ack_result(state.trivia_start(&code).await)
        }

        ClientMessage::TriviaAnswer { text } => {
            let (code, name) = require_player!(ctx);
            require_rate!(ctx, "trivia_answer", INPUT_LIMIT);
            player_result(state.with_room(&code, |room| trivia::player_answer(room, &name, &text)).await)
        }

        ClientMessage::TriviaReviewMark { name, correct } => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| trivia::review_mark(room, &name, correct))
                    .await,
            )
        }

        ClientMessage::TriviaReviewNext => {
            let code = require_host!(ctx);
            ack_result(
                state
                    .with_room(&code, |room| {
                        trivia::review_next(room)?;
                        if let GameState::Trivia(s) = &room.game {
                            if s.phase == trivia::TriviaPhase::Done {
                                room.locked = false;
                                room.broadcast_room_state();
                            }
                        }
                        Ok(())
                    })
                    .await,
            )
        }
    }
}

fn player_result(result: Result<ServerMessage, RoomError>) -> HandleOutcome {
    match result {
        Ok(ack) => HandleOutcome::reply(ack),
        Err(err) => HandleOutcome::ack_err(err),
    }
}

/// Called when the socket closes for any reason
pub async fn handle_disconnect(state: &Arc<AppState>, ctx: &ConnCtx) {
    if let Some(code) = &ctx.room {
        state.leave_room(code, &ctx.conn_id, Instant::now()).await;
    }
}
