//! Fixed-window rate limiter for message consumption.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct WindowState {
    opened: Instant,
    used: u32,
}

/// Admits at most `max` acquisitions per fixed window.
pub struct RateLimiter {
    max: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max: max.max(1),
            window,
            state: Mutex::new(WindowState {
                opened: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Wait until the current window has a free slot, then take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                if now.duration_since(state.opened) >= self.window {
                    state.opened = now;
                    state.used = 0;
                }
                if state.used < self.max {
                    state.used += 1;
                    return;
                }
                self.window - now.duration_since(state.opened)
            };
            tokio::time::sleep(wait).await;
        }
    }
}
