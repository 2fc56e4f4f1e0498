mod registry;
pub mod room;

pub use registry::{JoinedRoom, RoomClaim};
pub use room::Room;

use crate::config::ServerConfig;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Shared application state: the room registry is the sole owner and sole
/// mutator of all rooms. Every inbound event takes the write lock for its
/// whole mutation, so processing is effectively single-writer and
/// first-accepted-input semantics need no further synchronization.
pub struct AppState {
    pub rooms: RwLock<HashMap<String, Room>>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
