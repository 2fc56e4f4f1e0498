//! Per-connection sliding-window admission control
//!
//! Each WebSocket connection owns one limiter; windows are tracked per action
//! name so a flood of buzzer presses cannot starve a legitimate join. The
//! ceilings are deliberately small, sized for humans on phones.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Ceiling for join attempts: 10 per 10 seconds
pub const JOIN_LIMIT: (u32, Duration) = (10, Duration::from_secs(10));
/// Ceiling for per-round participant input: 20 per 3 seconds
pub const INPUT_LIMIT: (u32, Duration) = (20, Duration::from_secs(3));

#[derive(Debug)]
struct Window {
    count: u32,
    start: Instant,
}

/// Sliding-window counter keyed by action name, scoped to one connection
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: HashMap<&'static str, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request for `action` and report whether it is admitted
    pub fn check(&mut self, action: &'static str, limit: u32, window: Duration) -> bool {
        self.check_at(action, limit, window, Instant::now())
    }

    fn check_at(
        &mut self,
        action: &'static str,
        limit: u32,
        window: Duration,
        now: Instant,
    ) -> bool {
        let item = self.windows.entry(action).or_insert(Window {
            count: 0,
            start: now,
        });
        if now.duration_since(item.start) > window {
            item.count = 0;
            item.start = now;
        }
        item.count += 1;
        item.count <= limit
    }
}
