// Public API for integration tests and potential library usage

pub mod config;
pub mod error;
pub mod games;
pub mod limiter;
pub mod protocol;
pub mod state;
pub mod sweep;
pub mod types;
pub mod ws;
