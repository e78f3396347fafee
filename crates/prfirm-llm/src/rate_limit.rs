use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use prfirm_core::error::{PrFirmError, Result};

/// Fixed-window call counter.
///
/// At most `max_calls` are accepted per window of length `period`. A window
/// opens on the first call after the previous one expired; the call that
/// would exceed the cap fails immediately instead of waiting.
pub struct RateLimiter {
    max_calls: u32,
    period: Duration,
    window: Mutex<Window>,
}

struct Window {
    started: Option<Instant>,
    count: u32,
}

impl RateLimiter {
    pub fn new(max_calls: u32, period: Duration) -> Self {
        Self {
            max_calls,
            period,
            window: Mutex::new(Window {
                started: None,
                count: 0,
            }),
        }
    }

    /// Take one slot in the current window.
    pub fn try_acquire(&self) -> Result<()> {
        let now = Instant::now();
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());

        let expired = window
            .started
            .map_or(true, |start| now.duration_since(start) >= self.period);
        if expired {
            window.started = Some(now);
            window.count = 0;
        }

        if window.count >= self.max_calls {
            debug!(max_calls = self.max_calls, "Rate limit window full");
            return Err(PrFirmError::RateLimitExceeded {
                max_calls: self.max_calls,
                period_ms: self.period.as_millis() as u64,
            });
        }
        window.count += 1;
        Ok(())
    }

    /// Calls still accepted in the current window.
    pub fn remaining(&self) -> u32 {
        let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        match window.started {
            Some(start) if start.elapsed() < self.period => {
                self.max_calls.saturating_sub(window.count)
            }
            _ => self.max_calls,
        }
    }
}
