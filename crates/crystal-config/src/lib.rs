//! Configuration for the crystal rendering optimizer.
//!
//! Settings persist to disk as RON, tolerate missing and unknown fields, and
//! can be overridden from the command line. Every numeric section exposes a
//! `sanitized` method that clamps out-of-range values to safe minimums
//! instead of rejecting them.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    BatchConfig, CONFIG_FILE, Config, CullingConfig, DebugConfig, MonitorConfig, OptimizerConfig,
    SimulationConfig, WarningThresholds,
};
pub use error::ConfigError;
