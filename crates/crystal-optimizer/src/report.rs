//! Read-only views across the subsystems and the text report.

use crystal_batch::BatchStats;
use crystal_config::{CullingConfig, OptimizerConfig, WarningThresholds};
use crystal_culling::CullingStats;
use crystal_monitor::{MonitorStats, PerformanceWarning};
use serde::Serialize;

use crate::optimizer::OptimizerCounters;
use crate::tuning::TuningOutcome;

/// Headline numbers for a diagnostics overlay.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimizerStats {
    pub fps: Option<f32>,
    pub frame_time_ms: Option<f32>,
    pub total_objects: usize,
    pub visible_objects: usize,
    pub culled_objects: usize,
    pub culling_efficiency: f32,
    pub max_distance: f32,
    pub batches: usize,
    pub instances: usize,
    pub draw_calls: usize,
    pub warnings: u64,
    pub focus_guarded: bool,
}

/// Everything the optimizer knows, serializable for export.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetailedStats {
    pub clock_ms: f64,
    pub focus_guarded: bool,
    pub config: OptimizerConfig,
    pub culling_config: CullingConfig,
    pub thresholds: WarningThresholds,
    pub culling: CullingStats,
    pub batches: BatchStats,
    pub monitor: MonitorStats,
    pub recent_warnings: Vec<PerformanceWarning>,
    pub counters: OptimizerCounters,
    pub last_tuning: Option<TuningOutcome>,
}

impl DetailedStats {
    /// Suggestions derived from the latest sample and the current settings.
    pub fn recommendations(&self) -> Vec<String> {
        let mut out = Vec::new();
        let target = self.config.target_fps;
        if let Some(sample) = self.monitor.current {
            if sample.fps < target * self.config.tighten_fps_ratio {
                out.push(format!(
                    "Frame rate {:.1} is below target {target:.0}: reduce max distance (now {:.0}).",
                    sample.fps, self.culling_config.max_distance
                ));
            }
            if sample.draw_calls > self.thresholds.max_draw_calls {
                if self.config.enable_instanced_rendering {
                    out.push(format!(
                        "{} draw calls: coarsen size or importance buckets to merge batches.",
                        sample.draw_calls
                    ));
                } else {
                    out.push(format!(
                        "{} draw calls: enable instanced rendering.",
                        sample.draw_calls
                    ));
                }
            }
            if sample.triangles > self.thresholds.max_triangles {
                out.push(format!(
                    "{} triangles: lower crystal detail or the draw distance.",
                    sample.triangles
                ));
            }
            if sample.memory_mb > self.thresholds.max_memory_mb {
                out.push(format!(
                    "{:.0} MB in use: reclaim pooled resources and trim preloaded sizes.",
                    sample.memory_mb
                ));
            }
        }
        if !self.config.enable_frustum_culling {
            out.push("Frustum culling is disabled: enable it.".to_string());
        } else if self.culling.total_objects > 0
            && self.culling.culling_efficiency < 10.0
            && self
                .monitor
                .current
                .is_some_and(|s| s.fps < target * self.config.tighten_fps_ratio)
        {
            out.push("Almost every object is visible: tighten the max distance.".to_string());
        }
        if out.is_empty() {
            out.push("No action needed.".to_string());
        }
        out
    }

    /// Multi-line human-readable report.
    pub fn to_text(&self) -> String {
        let mut lines = vec![
            "=== Crystal rendering performance report ===".to_string(),
            format!("Time: {:.1} s", self.clock_ms / 1000.0),
        ];
        match self.monitor.current {
            Some(s) => {
                lines.push(format!(
                    "FPS: {:.1} (min {:.1}, max {:.1}, avg {:.1}, last {:.1}), frame time {:.2} ms, p95 {:.2} ms{}",
                    s.fps,
                    self.monitor.min_fps,
                    self.monitor.max_fps,
                    self.monitor.average_fps,
                    self.monitor.instantaneous_fps.unwrap_or(s.fps),
                    s.frame_time_ms,
                    self.monitor.p95_frame_time_ms,
                    if self.monitor.history_full { "" } else { " (warming up)" }
                ));
                lines.push(format!(
                    "Renderer: {} draw calls, {} triangles, {} geometries, {} materials, {:.1} MB{}",
                    s.draw_calls,
                    s.triangles,
                    s.geometries,
                    s.materials,
                    s.memory_mb,
                    if s.memory_estimated { " (estimated)" } else { "" }
                ));
            }
            None => lines.push("FPS: no sample yet".to_string()),
        }
        lines.push(format!(
            "Culling: {} objects, {} visible, {} culled ({:.1}%), max distance {:.0}, budget {}/pass",
            self.culling.total_objects,
            self.culling.visible_objects,
            self.culling.culled_objects,
            self.culling.culling_efficiency,
            self.culling_config.max_distance,
            self.culling_config.max_checks_per_frame
        ));
        lines.push(format!(
            "Batches: {} batches, {} instances ({} visible), {} draw calls, {} triangles",
            self.batches.batches,
            self.batches.instances,
            self.batches.visible_instances,
            self.batches.draw_calls,
            self.batches.triangles
        ));
        let pools = self.batches.resources;
        lines.push(format!(
            "Pools: {} geometries ({} hits / {} misses), {} materials ({} hits / {} misses)",
            pools.geometries.entries,
            pools.geometries.hits,
            pools.geometries.misses,
            pools.materials.entries,
            pools.materials.hits,
            pools.materials.misses
        ));
        lines.push(format!(
            "Tuning: {} cycles, {} skipped, {} tightened, {} relaxed, {} resources reclaimed",
            self.counters.optimization_cycles,
            self.counters.skipped_cycles,
            self.counters.tightenings,
            self.counters.relaxations,
            self.counters.resources_reclaimed
        ));
        if self.focus_guarded {
            lines.push("Focus guard: active".to_string());
        }
        if !self.recent_warnings.is_empty() {
            lines.push("Recent warnings:".to_string());
            for w in &self.recent_warnings {
                lines.push(format!("  [{}/{}] {}", w.category, w.severity, w.message));
            }
        }
        lines.push("Recommendations:".to_string());
        for r in self.recommendations() {
            lines.push(format!("  - {r}"));
        }
        lines.join("\n")
    }
}
