//! Performance optimizer: owns the culling manager, the batch manager, and the
//! frame monitor, drives them once per frame, and tunes culling from measured
//! frame rate.
//!
//! ```text
//! records ──► BatchManager (pools, instanced batches)
//!        └──► FrustumCullingManager (bounding spheres)
//! frame ──► FrameMonitor ──► warnings ──► handlers
//!       ──► culling pass ──► instance visibility
//!       ──► every optimization_interval_ms: tighten / relax culling
//! ```

mod error;
mod optimizer;
mod report;
mod sync;
mod tuning;

pub use error::ReportError;
pub use optimizer::{ForceUpdateOutcome, OptimizerCounters, PerformanceOptimizer};
pub use report::{DetailedStats, OptimizerStats};
pub use tuning::TuningOutcome;
