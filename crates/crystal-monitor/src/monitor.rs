//! Frame timing and renderer counter sampling.

use std::collections::VecDeque;

use crystal_config::{MonitorConfig, WarningThresholds};
use crystal_scene::{RenderCounters, RendererInfo};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::history::RingBuffer;
use crate::warning::{PerformanceWarning, Severity, WarningCategory};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// Rough GPU footprint used when the platform reports no heap usage.
const ESTIMATED_BYTES_PER_TRIANGLE: f64 = 96.0;
const ESTIMATED_BYTES_PER_GEOMETRY: f64 = 16.0 * 1024.0;
const ESTIMATED_BYTES_PER_MATERIAL: f64 = 2.0 * 1024.0;
const ESTIMATED_BYTES_PER_PROGRAM: f64 = 64.0 * 1024.0;

/// Aggregate snapshot taken once per monitor interval.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PerformanceSample {
    pub timestamp_ms: f64,
    /// Average FPS over the rolling history.
    pub fps: f32,
    /// Average frame time over the rolling history.
    pub frame_time_ms: f32,
    pub memory_mb: f64,
    /// `true` when `memory_mb` was estimated from renderer counters.
    pub memory_estimated: bool,
    pub draw_calls: u32,
    pub triangles: u64,
    pub geometries: u32,
    pub materials: u32,
    pub programs: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MonitorStats {
    pub current: Option<PerformanceSample>,
    /// FPS of the most recent frame.
    pub instantaneous_fps: Option<f32>,
    pub average_fps: f32,
    pub min_fps: f32,
    pub max_fps: f32,
    /// 95th percentile frame time over the rolling history.
    pub p95_frame_time_ms: f32,
    /// Frames the history holds once warmed up.
    pub history_capacity: usize,
    /// `false` while the aggregates still cover fewer frames than the window.
    pub history_full: bool,
    pub frames: u64,
    pub samples: u64,
    pub warnings_emitted: u64,
}

/// Samples frame timing every frame and renderer counters once per interval.
///
/// Warnings fire when a sample crosses a threshold, at most once per
/// category and severity within `warning_cooldown_ms`.
pub struct FrameMonitor {
    config: MonitorConfig,
    fps_history: RingBuffer<f32>,
    frame_times: RingBuffer<f32>,
    last_frame_ms: Option<f64>,
    last_sample_ms: Option<f64>,
    current: Option<PerformanceSample>,
    warnings: VecDeque<PerformanceWarning>,
    last_fired: FxHashMap<(WarningCategory, Severity), f64>,
    frames: u64,
    samples: u64,
    warnings_emitted: u64,
}

impl FrameMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let config = config.sanitized();
        Self {
            fps_history: RingBuffer::new(config.history_len),
            frame_times: RingBuffer::new(config.history_len),
            last_frame_ms: None,
            last_sample_ms: None,
            current: None,
            warnings: VecDeque::new(),
            last_fired: FxHashMap::default(),
            frames: 0,
            samples: 0,
            warnings_emitted: 0,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &WarningThresholds {
        &self.config.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: WarningThresholds) {
        self.config.thresholds = thresholds.sanitized();
    }

    /// Record a frame ending at `now_ms`. Returns the warnings emitted by
    /// this call, which is empty unless an aggregate sample was taken.
    pub fn update(&mut self, now_ms: f64, renderer: &dyn RendererInfo) -> Vec<PerformanceWarning> {
        let Some(last_frame) = self.last_frame_ms.replace(now_ms) else {
            self.last_sample_ms = Some(now_ms);
            return Vec::new();
        };

        let delta = now_ms - last_frame;
        if delta > 0.0 {
            self.fps_history.push((1000.0 / delta) as f32);
            self.frame_times.push(delta as f32);
            self.frames += 1;
        }

        let last_sample = self.last_sample_ms.unwrap_or(now_ms);
        if now_ms - last_sample < self.config.update_interval_ms || self.fps_history.is_empty() {
            return Vec::new();
        }
        self.last_sample_ms = Some(now_ms);

        let sample = self.take_sample(now_ms, renderer.counters());
        self.current = Some(sample);
        self.samples += 1;
        debug!(
            fps = sample.fps,
            draw_calls = sample.draw_calls,
            triangles = sample.triangles,
            memory_mb = sample.memory_mb,
            "performance sample"
        );
        self.evaluate(&sample)
    }

    fn take_sample(&self, now_ms: f64, counters: RenderCounters) -> PerformanceSample {
        let fps = mean(self.fps_history.iter());
        let frame_time_ms = mean(self.frame_times.iter());
        let (memory_mb, memory_estimated) = match counters.heap_bytes {
            Some(bytes) => (bytes as f64 / BYTES_PER_MB, false),
            None => (estimate_memory_mb(&counters), true),
        };
        PerformanceSample {
            timestamp_ms: now_ms,
            fps,
            frame_time_ms,
            memory_mb,
            memory_estimated,
            draw_calls: counters.draw_calls,
            triangles: counters.triangles,
            geometries: counters.geometries,
            materials: counters.materials,
            programs: counters.programs,
        }
    }

    fn evaluate(&mut self, sample: &PerformanceSample) -> Vec<PerformanceWarning> {
        let t = self.config.thresholds;
        let mut candidates = Vec::new();

        // Only the most severe FPS warning is raised.
        if sample.fps < t.critical_fps {
            candidates.push((
                WarningCategory::LowFps,
                Severity::High,
                format!("critical frame rate: {:.1} fps (< {})", sample.fps, t.critical_fps),
            ));
        } else if sample.fps < t.low_fps {
            candidates.push((
                WarningCategory::LowFps,
                Severity::Medium,
                format!("low frame rate: {:.1} fps (< {})", sample.fps, t.low_fps),
            ));
        }
        if sample.memory_mb > t.max_memory_mb {
            candidates.push((
                WarningCategory::HighMemory,
                Severity::High,
                format!("high memory usage: {:.0} MB (> {})", sample.memory_mb, t.max_memory_mb),
            ));
        }
        if sample.draw_calls > t.max_draw_calls {
            candidates.push((
                WarningCategory::HighDrawCalls,
                Severity::Medium,
                format!("too many draw calls: {} (> {})", sample.draw_calls, t.max_draw_calls),
            ));
        }
        if sample.triangles > t.max_triangles {
            candidates.push((
                WarningCategory::HighTriangles,
                Severity::Medium,
                format!("too many triangles: {} (> {})", sample.triangles, t.max_triangles),
            ));
        }

        let mut emitted = Vec::new();
        for (category, severity, message) in candidates {
            let now = sample.timestamp_ms;
            if let Some(&fired) = self.last_fired.get(&(category, severity))
                && now - fired < self.config.warning_cooldown_ms
            {
                continue;
            }
            self.last_fired.insert((category, severity), now);
            warn!(%category, %severity, "{message}");
            let warning = PerformanceWarning {
                category,
                severity,
                message,
                timestamp_ms: now,
            };
            if self.warnings.len() == self.config.max_warnings {
                self.warnings.pop_front();
            }
            self.warnings.push_back(warning.clone());
            self.warnings_emitted += 1;
            emitted.push(warning);
        }
        emitted
    }

    /// Latest aggregate sample.
    pub fn current_sample(&self) -> Option<&PerformanceSample> {
        self.current.as_ref()
    }

    /// Best available FPS reading: the latest sample, else the rolling average.
    pub fn current_fps(&self) -> Option<f32> {
        match self.current {
            Some(sample) => Some(sample.fps),
            None if !self.fps_history.is_empty() => Some(mean(self.fps_history.iter())),
            None => None,
        }
    }

    pub fn stats(&self) -> MonitorStats {
        let history = self.fps_history.to_vec();
        MonitorStats {
            current: self.current,
            instantaneous_fps: self.fps_history.latest(),
            average_fps: mean(history.iter()),
            min_fps: history.iter().copied().reduce(f32::min).unwrap_or(0.0),
            max_fps: history.iter().copied().reduce(f32::max).unwrap_or(0.0),
            p95_frame_time_ms: percentile(self.frame_times.to_vec(), 0.95),
            history_capacity: self.fps_history.capacity(),
            history_full: self.fps_history.is_full(),
            frames: self.frames,
            samples: self.samples,
            warnings_emitted: self.warnings_emitted,
        }
    }

    /// Instantaneous FPS values from oldest to newest.
    pub fn fps_history(&self) -> Vec<f32> {
        self.fps_history.to_vec()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &PerformanceWarning> {
        self.warnings.iter()
    }

    /// Warnings emitted within `period_ms` of the most recent frame.
    pub fn recent_warnings(&self, period_ms: f64) -> Vec<PerformanceWarning> {
        let Some(now) = self.last_frame_ms else {
            return Vec::new();
        };
        self.warnings
            .iter()
            .filter(|w| now - w.timestamp_ms <= period_ms)
            .cloned()
            .collect()
    }

    /// Clear history, samples, warnings, and counters. Thresholds are kept.
    pub fn reset(&mut self) {
        self.fps_history.clear();
        self.frame_times.clear();
        self.last_frame_ms = None;
        self.last_sample_ms = None;
        self.current = None;
        self.warnings.clear();
        self.last_fired.clear();
        self.frames = 0;
        self.samples = 0;
        self.warnings_emitted = 0;
    }
}

fn mean<'a>(values: impl Iterator<Item = &'a f32>) -> f32 {
    let (sum, count) = values.fold((0.0f64, 0usize), |(s, n), v| (s + f64::from(*v), n + 1));
    if count == 0 { 0.0 } else { (sum / count as f64) as f32 }
}

fn percentile(mut values: Vec<f32>, q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f32::total_cmp);
    let rank = (q * (values.len() - 1) as f32).round() as usize;
    values[rank.min(values.len() - 1)]
}

fn estimate_memory_mb(counters: &RenderCounters) -> f64 {
    let bytes = counters.triangles as f64 * ESTIMATED_BYTES_PER_TRIANGLE
        + f64::from(counters.geometries) * ESTIMATED_BYTES_PER_GEOMETRY
        + f64::from(counters.materials) * ESTIMATED_BYTES_PER_MATERIAL
        + f64::from(counters.programs) * ESTIMATED_BYTES_PER_PROGRAM;
    bytes / BYTES_PER_MB
}
