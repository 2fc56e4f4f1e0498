//! Server configuration from environment variables
//!
//! Idle-room TTL and sweep cadence match the historical deployment defaults
//! (6 hours / 10 minutes) and are floored so a typo in an env var cannot turn
//! the sweeper into a busy loop.

use std::time::Duration;

/// Minimum accepted room TTL (1 minute)
const MIN_ROOM_TTL_SECS: u64 = 60;
/// Minimum accepted sweep interval (30 seconds)
const MIN_SWEEP_SECS: u64 = 30;

const DEFAULT_ROOM_TTL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_SWEEP_SECS: u64 = 10 * 60;
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Rooms with no connected players are evicted once idle longer than this
    pub room_ttl: Duration,
    /// How often the idle sweep runs
    pub sweep_interval: Duration,
    /// Directory served for the display/participant frontends
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            room_ttl: Duration::from_secs(DEFAULT_ROOM_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_SECS),
            static_dir: "public".to_string(),
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let room_ttl_secs = env_u64("ROOM_TTL_SECS", DEFAULT_ROOM_TTL_SECS).max(MIN_ROOM_TTL_SECS);
        let sweep_secs = env_u64("ROOM_SWEEP_SECS", DEFAULT_SWEEP_SECS).max(MIN_SWEEP_SECS);

        let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "public".to_string());

        let config = Self {
            port,
            room_ttl: Duration::from_secs(room_ttl_secs),
            sweep_interval: Duration::from_secs(sweep_secs),
            static_dir,
        };

        tracing::info!(
            port = config.port,
            room_ttl_secs,
            sweep_secs,
            static_dir = %config.static_dir,
            "Server config loaded"
        );

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.room_ttl, Duration::from_secs(21600));
        assert_eq!(config.sweep_interval, Duration::from_secs(600));
    }

    #[test]
    fn test_ttl_floor() {
        // A sub-minute TTL would make rooms evaporate mid-game
        assert_eq!(
            env_u64("THIS_VAR_DOES_NOT_EXIST", 10).max(MIN_ROOM_TTL_SECS),
            MIN_ROOM_TTL_SECS
        );
    }
}
