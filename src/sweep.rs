use crate::state::AppState;
use std::sync::Arc;
use std::time::Instant;

/// Spawn a background task that drops rooms left empty past their TTL
pub fn spawn_room_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let interval = state.config.sweep_interval;
        loop {
            tokio::time::sleep(interval).await;
            let removed = state.sweep_rooms(Instant::now()).await;
            if removed > 0 {
                tracing::info!(removed, "swept expired rooms");
            }
        }
    });
}
