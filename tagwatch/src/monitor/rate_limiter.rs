//! Rate limiting for poll dispatches.
//!
//! Implements a fixed-window limiter: at most `permits` acquisitions succeed
//! per window, and the full budget is restored once a window has elapsed.
//! The first window opens when the limiter is created and later windows
//! follow on whole-window boundaries, so the cadence does not drift with call
//! timing.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

/// Configuration for a rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Permits available per window.
    pub permits: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            permits: 1,
            window: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    /// Create a validated configuration.
    pub fn new(permits: u32, window: Duration) -> crate::Result<Self> {
        if permits == 0 {
            return Err(crate::Error::config("rate limiter permits must be positive"));
        }
        if window.is_zero() {
            return Err(crate::Error::config("rate limiter window must be positive"));
        }
        Ok(Self { permits, window })
    }
}

#[derive(Debug)]
struct WindowState {
    /// Start of the current window.
    started: Instant,
    /// Permits consumed in the current window.
    used: u32,
}

/// Fixed-window rate limiter.
///
/// Safe to share between threads; the internal lock is held only for the
/// bookkeeping of a single call.
#[derive(Debug)]
pub struct RateLimiter {
    permits: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            permits: config.permits,
            window: config.window,
            state: Mutex::new(WindowState {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Try to acquire a permit without blocking.
    ///
    /// Returns `true` if a permit was consumed, `false` if the window is exhausted.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// [`try_acquire`](Self::try_acquire) against an explicit instant.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        self.roll_window(&mut state, now);

        if state.used < self.permits {
            state.used += 1;
            true
        } else {
            false
        }
    }

    /// Acquire a permit, waiting for the next window if necessary.
    ///
    /// Returns the duration waited.
    pub async fn acquire(&self) -> Duration {
        let mut total_wait = Duration::ZERO;

        loop {
            if self.try_acquire() {
                return total_wait;
            }

            let wait_duration = self.time_until_available();
            debug!("Rate limited, waiting {:?}", wait_duration);
            tokio::time::sleep(wait_duration).await;
            total_wait += wait_duration;
        }
    }

    /// Time until the next permit can be acquired.
    pub fn time_until_available(&self) -> Duration {
        self.time_until_available_at(Instant::now())
    }

    fn time_until_available_at(&self, now: Instant) -> Duration {
        let mut state = self.state.lock();
        self.roll_window(&mut state, now);

        if state.used < self.permits {
            Duration::ZERO
        } else {
            (state.started + self.window).saturating_duration_since(now)
        }
    }

    /// Move to the window containing `now`, restoring the full budget.
    fn roll_window(&self, state: &mut WindowState, now: Instant) {
        // A clock reading before the window start counts as the current window.
        let elapsed = now.saturating_duration_since(state.started);
        if elapsed < self.window {
            return;
        }

        let windows = elapsed.as_nanos() / self.window.as_nanos();
        let advance = self.window.as_nanos() * windows;
        state.started += Duration::from_nanos(advance.min(u64::MAX as u128) as u64);
        state.used = 0;

        trace!(windows = windows as u64, "Rate limiter window rolled over");
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
