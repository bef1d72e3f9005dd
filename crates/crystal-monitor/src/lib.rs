//! Frame performance monitoring: rolling FPS history, periodic aggregate
//! samples of renderer counters, and threshold warnings with per-category
//! cooldowns.

mod history;
mod monitor;
mod warning;

pub use history::RingBuffer;
pub use monitor::{FrameMonitor, MonitorStats, PerformanceSample};
pub use warning::{PerformanceWarning, Severity, WarningCategory};
