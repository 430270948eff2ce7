//! Scheduling, rate limiting and the monitor loop.

pub mod clock;
mod pipeline;
mod rate_limiter;
mod scheduler;
mod service;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use pipeline::{Pipeline, PollOutcome};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use scheduler::{PriorityScheduler, ScheduleEntry};
pub use service::{Monitor, MonitorBuilder, MonitorState};
