/// SOS alert lifecycle, notification sinks and rate limiting
pub mod alert_manager;
pub mod rate_limiter;
pub mod sink;

pub use alert_manager::{Alert, AlertManager, DEFAULT_MAX_RETAINED};
pub use rate_limiter::RateLimiter;
pub use sink::{FanoutSink, LogSink, NotificationSink, TerminalBell, ThrottledSink};
