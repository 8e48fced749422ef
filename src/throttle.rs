//! Leading-edge rate limiter
//!
//! A pure per-engine value with no shared library-level state, so multiple
//! engine instances never interfere. The first trigger of a quiet window
//! fires immediately; triggers inside the window are suppressed.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    last_fired: Option<Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: None,
        }
    }

    /// Whether a trigger at `now` is allowed to fire.
    ///
    /// A zero window always allows.
    pub fn allow(&mut self, now: Instant) -> bool {
        if self.window.is_zero() {
            return true;
        }
        match self.last_fired {
            Some(last) if now.duration_since(last) < self.window => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }
}
