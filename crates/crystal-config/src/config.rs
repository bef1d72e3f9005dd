//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the persisted configuration inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Smallest culling distance the sanitizer lets through.
const MIN_CULL_DISTANCE: f32 = 1.0;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Frustum culling settings.
    pub culling: CullingConfig,
    /// Frame monitor settings.
    pub monitor: MonitorConfig,
    /// Orchestrator and auto-tuning settings.
    pub optimizer: OptimizerConfig,
    /// Resource pooling and instancing settings.
    pub batch: BatchConfig,
    /// Headless simulation settings used by the demo binary.
    pub simulation: SimulationConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Frustum culling configuration.
///
/// Mutated at runtime only by the optimizer's auto-tuning or explicit
/// configuration calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CullingConfig {
    /// Minimum time between culling passes, in milliseconds.
    pub update_interval_ms: f64,
    /// Visibility checks performed per culling pass.
    pub max_checks_per_frame: usize,
    /// Cull objects beyond `max_distance`.
    pub distance_culling: bool,
    /// Draw distance in world units.
    pub max_distance: f32,
    /// Bounding sphere inflation applied on top of the geometric extent (>= 1).
    pub margin_multiplier: f32,
    /// Interval between priority recomputations, in milliseconds.
    pub priority_recompute_interval_ms: f64,
    /// Numerator of the priority formula `scale * importance / (distance + 1)`.
    pub priority_scale: f32,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 100.0,
            max_checks_per_frame: 500,
            distance_culling: true,
            max_distance: 2500.0,
            margin_multiplier: 1.2,
            priority_recompute_interval_ms: 1000.0,
            priority_scale: 100.0,
        }
    }
}

impl CullingConfig {
    /// Clamp every field into its valid range.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.update_interval_ms = non_negative_or(self.update_interval_ms, 0.0);
        self.max_checks_per_frame = self.max_checks_per_frame.max(1);
        self.max_distance = if self.max_distance.is_finite() {
            self.max_distance.max(MIN_CULL_DISTANCE)
        } else {
            defaults.max_distance
        };
        self.margin_multiplier = if self.margin_multiplier.is_finite() {
            self.margin_multiplier.max(1.0)
        } else {
            defaults.margin_multiplier
        };
        self.priority_recompute_interval_ms =
            non_negative_or(self.priority_recompute_interval_ms, 0.0);
        if !(self.priority_scale.is_finite() && self.priority_scale > 0.0) {
            self.priority_scale = defaults.priority_scale;
        }
        self
    }
}

/// Warning thresholds evaluated against each performance sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WarningThresholds {
    /// Below this FPS a medium-severity warning fires.
    pub low_fps: f32,
    /// Below this FPS a high-severity warning fires.
    pub critical_fps: f32,
    /// Above this many megabytes a high-severity warning fires.
    pub max_memory_mb: f64,
    /// Above this many draw calls a medium-severity warning fires.
    pub max_draw_calls: u32,
    /// Above this many triangles a medium-severity warning fires.
    pub max_triangles: u64,
}

impl Default for WarningThresholds {
    fn default() -> Self {
        Self {
            low_fps: 30.0,
            critical_fps: 15.0,
            max_memory_mb: 512.0,
            max_draw_calls: 1000,
            max_triangles: 500_000,
        }
    }
}

impl WarningThresholds {
    /// Clamp thresholds into a usable range; `critical_fps` never exceeds `low_fps`.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.low_fps.is_finite() && self.low_fps >= 0.0) {
            self.low_fps = defaults.low_fps;
        }
        if !(self.critical_fps.is_finite() && self.critical_fps >= 0.0) {
            self.critical_fps = defaults.critical_fps;
        }
        self.critical_fps = self.critical_fps.min(self.low_fps);
        self.max_memory_mb = non_negative_or(self.max_memory_mb, defaults.max_memory_mb);
        self
    }
}

/// Frame performance monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Length of the rolling FPS history.
    pub history_len: usize,
    /// Minimum time between aggregate samples, in milliseconds.
    pub update_interval_ms: f64,
    /// Per category and severity cooldown between repeated warnings, in milliseconds.
    pub warning_cooldown_ms: f64,
    /// Maximum number of warnings retained; the oldest are dropped first.
    pub max_warnings: usize,
    /// Warning thresholds.
    pub thresholds: WarningThresholds,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_len: 60,
            update_interval_ms: 1000.0,
            warning_cooldown_ms: 5000.0,
            max_warnings: 100,
            thresholds: WarningThresholds::default(),
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.history_len = self.history_len.max(1);
        self.update_interval_ms = non_negative_or(self.update_interval_ms, 0.0);
        self.warning_cooldown_ms = non_negative_or(self.warning_cooldown_ms, 0.0);
        self.max_warnings = self.max_warnings.max(1);
        self.thresholds = self.thresholds.sanitized();
        self
    }
}

/// Orchestrator configuration: subsystem toggles and auto-tuning constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub enable_frustum_culling: bool,
    pub enable_instanced_rendering: bool,
    pub enable_resource_optimization: bool,
    pub enable_performance_monitoring: bool,
    /// Run the feedback loop every `optimization_interval_ms`.
    pub auto_optimization: bool,
    pub target_fps: f32,
    pub optimization_interval_ms: f64,
    /// Quiet window after a focus transition ends, in milliseconds.
    pub focus_stabilization_period_ms: f64,
    /// Tighten culling when FPS drops below `target_fps * tighten_fps_ratio`.
    pub tighten_fps_ratio: f32,
    /// Relax culling when FPS rises above `target_fps * relax_fps_ratio`.
    pub relax_fps_ratio: f32,
    /// Multiplier applied to `max_distance` when tightening (< 1).
    pub tighten_distance_factor: f32,
    /// Multiplier applied to `max_distance` when relaxing (> 1).
    pub relax_distance_factor: f32,
    /// Multiplier applied to `max_checks_per_frame` when tightening (< 1).
    pub tighten_checks_factor: f32,
    /// Multiplier applied to `max_checks_per_frame` when relaxing (> 1).
    pub relax_checks_factor: f32,
    /// Lower bound for `max_distance` under auto-tuning.
    pub min_cull_distance: f32,
    /// Upper bound for `max_distance` under auto-tuning.
    pub max_cull_distance: f32,
    /// Lower bound for `max_checks_per_frame` under auto-tuning.
    pub min_checks_per_frame: usize,
    /// Upper bound for `max_checks_per_frame` under auto-tuning.
    pub max_checks_per_frame: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enable_frustum_culling: true,
            enable_instanced_rendering: true,
            enable_resource_optimization: true,
            enable_performance_monitoring: true,
            auto_optimization: true,
            target_fps: 60.0,
            optimization_interval_ms: 5000.0,
            focus_stabilization_period_ms: 15_000.0,
            tighten_fps_ratio: 0.8,
            relax_fps_ratio: 1.1,
            tighten_distance_factor: 0.8,
            relax_distance_factor: 1.2,
            tighten_checks_factor: 0.75,
            relax_checks_factor: 1.25,
            min_cull_distance: 200.0,
            max_cull_distance: 5000.0,
            min_checks_per_frame: 50,
            max_checks_per_frame: 2000,
        }
    }
}

impl OptimizerConfig {
    /// Clamp constants so that tightening always shrinks, relaxing always
    /// grows, and the bounds are ordered.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            self.target_fps = d.target_fps;
        }
        self.optimization_interval_ms = non_negative_or(self.optimization_interval_ms, 0.0);
        self.focus_stabilization_period_ms =
            non_negative_or(self.focus_stabilization_period_ms, 0.0);
        if !(self.tighten_fps_ratio.is_finite() && self.tighten_fps_ratio > 0.0) {
            self.tighten_fps_ratio = d.tighten_fps_ratio;
        }
        if !(self.relax_fps_ratio.is_finite() && self.relax_fps_ratio > self.tighten_fps_ratio) {
            self.relax_fps_ratio = self.tighten_fps_ratio * (d.relax_fps_ratio / d.tighten_fps_ratio);
        }
        self.tighten_distance_factor = factor_in(self.tighten_distance_factor, false, d.tighten_distance_factor);
        self.tighten_checks_factor = factor_in(self.tighten_checks_factor, false, d.tighten_checks_factor);
        self.relax_distance_factor = factor_in(self.relax_distance_factor, true, d.relax_distance_factor);
        self.relax_checks_factor = factor_in(self.relax_checks_factor, true, d.relax_checks_factor);
        if !self.min_cull_distance.is_finite() {
            self.min_cull_distance = d.min_cull_distance;
        }
        self.min_cull_distance = self.min_cull_distance.max(MIN_CULL_DISTANCE);
        if !self.max_cull_distance.is_finite() {
            self.max_cull_distance = d.max_cull_distance;
        }
        self.max_cull_distance = self.max_cull_distance.max(self.min_cull_distance);
        self.min_checks_per_frame = self.min_checks_per_frame.max(1);
        self.max_checks_per_frame = self.max_checks_per_frame.max(self.min_checks_per_frame);
        self
    }
}

/// Resource pooling and instancing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// Crystal sizes are rounded to multiples of this step before keying geometry.
    pub size_quantum: f32,
    /// Number of importance buckets used to key materials.
    pub importance_buckets: u8,
    /// Number of sides of the crystal bipyramid geometry.
    pub crystal_sides: u32,
    /// Size buckets built eagerly during initialization.
    pub preload_sizes: Vec<f32>,
    /// Scale multiplier applied to highlighted instances.
    pub highlight_scale: f32,
    /// Emissive pulse frequency in Hz for batch animation (0 disables).
    pub pulse_hz: f32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size_quantum: 0.5,
            importance_buckets: 4,
            crystal_sides: 6,
            preload_sizes: vec![0.5, 1.0, 1.5, 2.0, 3.0],
            highlight_scale: 1.3,
            pulse_hz: 0.25,
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        if !(self.size_quantum.is_finite() && self.size_quantum > 0.0) {
            self.size_quantum = d.size_quantum;
        }
        self.importance_buckets = self.importance_buckets.max(1);
        self.crystal_sides = self.crystal_sides.max(3);
        self.preload_sizes.retain(|s| s.is_finite() && *s > 0.0);
        if !(self.highlight_scale.is_finite() && self.highlight_scale > 0.0) {
            self.highlight_scale = d.highlight_scale;
        }
        if !(self.pulse_hz.is_finite() && self.pulse_hz >= 0.0) {
            self.pulse_hz = 0.0;
        }
        self
    }
}

/// Headless simulation configuration used by the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of crystals in the field.
    pub crystal_count: usize,
    /// Number of frames to simulate.
    pub frames: u32,
    /// Radius of the crystal field in world units.
    pub field_radius: f32,
    /// Camera orbit radius in world units.
    pub orbit_radius: f32,
    /// RNG seed for the crystal field.
    pub seed: u64,
    /// Categories crystals are grouped by.
    pub categories: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            crystal_count: 3000,
            frames: 3600,
            field_radius: 3000.0,
            orbit_radius: 1200.0,
            seed: 42,
            categories: ["rock", "pop", "electronic", "jazz", "classical", "hiphop", "folk"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Directory for JSON log files in debug builds.
    pub log_dir: Option<String>,
    /// Write the final detailed report as JSON to this path.
    pub report_json: Option<String>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
            report_json: None,
        }
    }
}

fn non_negative_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { fallback }
}

/// Keep a growth (`grow = true`, > 1) or shrink (< 1, > 0) factor on the right side of 1.
fn factor_in(value: f32, grow: bool, fallback: f32) -> f32 {
    let ok = value.is_finite() && if grow { value > 1.0 } else { value > 0.0 && value < 1.0 };
    if ok { value } else { fallback }
}

// --- Load / Save / Reload ---

impl Config {
    /// Clamp every section into its valid range.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.culling = self.culling.sanitized();
        self.monitor = self.monitor.sanitized();
        self.optimizer = self.optimizer.sanitized();
        self.batch = self.batch.sanitized();
        self
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = read_config(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path,
            source,
        })
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = read_config(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
