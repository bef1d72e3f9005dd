//! The orchestrator: frame loop, focus guard, warning handlers, auto-tuning.

use std::collections::BTreeSet;
use std::path::Path;
use std::rc::Rc;

use crystal_batch::{BatchManager, ReclaimStats};
use crystal_config::{Config, CullingConfig, OptimizerConfig};
use crystal_culling::FrustumCullingManager;
use crystal_monitor::{FrameMonitor, PerformanceWarning, WarningCategory};
use crystal_scene::{CameraPose, CrystalRecord, FocusState, NodeId, ObjectId, RendererInfo, SceneGraph};
use glam::Vec3;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ReportError;
use crate::report::{DetailedStats, OptimizerStats};
use crate::sync::VisibilityRecorder;
use crate::tuning::{self, TuningOutcome};

/// Window for [`DetailedStats::recent_warnings`], in milliseconds.
const RECENT_WARNING_WINDOW_MS: f64 = 60_000.0;

/// Running totals of what the optimizer has done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OptimizerCounters {
    pub frames: u64,
    pub optimization_cycles: u64,
    pub skipped_cycles: u64,
    pub tightenings: u64,
    pub relaxations: u64,
    pub warnings_handled: u64,
    pub warnings_skipped: u64,
    pub resources_reclaimed: u64,
}

/// Result of [`PerformanceOptimizer::force_update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForceUpdateOutcome {
    /// `false` when culling is disabled or a focus guard was active.
    pub culling_refreshed: bool,
    pub reclaimed: ReclaimStats,
}

/// Owns culling, batching, and monitoring and runs them on the render thread.
///
/// Time advances only through [`update`](Self::update): the optimizer keeps
/// its own clock in milliseconds, so behavior is fully determined by the
/// sequence of frame deltas it is fed.
pub struct PerformanceOptimizer {
    config: OptimizerConfig,
    culling: FrustumCullingManager,
    batches: BatchManager,
    monitor: FrameMonitor,
    focus: Rc<dyn FocusState>,
    clock_ms: f64,
    last_optimization_ms: f64,
    focus_ended_ms: Option<f64>,
    /// Owning object of each registered node, for mirroring culling into instances.
    node_owner: FxHashMap<NodeId, ObjectId>,
    last_tuning: Option<TuningOutcome>,
    counters: OptimizerCounters,
}

impl PerformanceOptimizer {
    pub fn new(config: &Config, focus: Rc<dyn FocusState>) -> Self {
        Self {
            config: config.optimizer.clone().sanitized(),
            culling: FrustumCullingManager::with_focus_state(config.culling.clone(), Rc::clone(&focus)),
            batches: BatchManager::new(config.batch.clone()),
            monitor: FrameMonitor::new(config.monitor.clone()),
            focus,
            clock_ms: 0.0,
            last_optimization_ms: 0.0,
            focus_ended_ms: None,
            node_owner: FxHashMap::default(),
            last_tuning: None,
            counters: OptimizerCounters::default(),
        }
    }

    /// One-time setup once the full record set is known: preload pooled
    /// resources, build instanced batches, and register every record for culling.
    pub fn initialize_optimization(&mut self, records: &[CrystalRecord], scene: &mut dyn SceneGraph) {
        let categories: Vec<&str> = records
            .iter()
            .map(|r| r.category.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if self.config.enable_resource_optimization {
            let sizes = self.batches.config().preload_sizes.clone();
            self.batches.preload_geometries(&categories, &sizes);
        }
        if self.config.enable_instanced_rendering {
            self.batches.create_instanced_objects_default(records);
        }

        for record in records {
            self.track(record, scene);
        }
        let enabled = self.config.enable_frustum_culling;
        self.with_visibility_sync(scene, |culling, scene| culling.set_enabled(enabled, scene));

        info!(
            records = records.len(),
            categories = categories.len(),
            batches = self.batches.batches().len(),
            culling = enabled,
            "optimization initialized"
        );
    }

    /// Per-frame entry point. Advances the clock by `delta_ms`, samples the
    /// monitor and handles its warnings, runs a culling pass, animates
    /// batches, and on cadence runs an auto-optimization cycle.
    ///
    /// Returns the warnings the monitor emitted this frame.
    pub fn update(
        &mut self,
        delta_ms: f64,
        camera: &CameraPose,
        scene: &mut dyn SceneGraph,
        renderer: &dyn RendererInfo,
    ) -> Vec<PerformanceWarning> {
        if delta_ms.is_finite() && delta_ms > 0.0 {
            self.clock_ms += delta_ms;
        }
        self.counters.frames += 1;

        let warnings = if self.config.enable_performance_monitoring {
            self.monitor.update(self.clock_ms, renderer)
        } else {
            Vec::new()
        };
        for warning in &warnings {
            self.handle_warning(warning);
        }

        // The culling manager pauses itself while a transition animates; the
        // settling period after it is enforced here.
        if self.config.enable_frustum_culling {
            if self.is_stabilizing() {
                debug!("culling pass skipped: focus stabilizing");
            } else {
                let now = self.clock_ms;
                self.with_visibility_sync(scene, |culling, scene| culling.update(now, camera, scene));
            }
        }
        if self.config.enable_instanced_rendering {
            self.batches.animate(self.clock_ms / 1000.0);
        }

        if self.config.auto_optimization
            && self.clock_ms - self.last_optimization_ms >= self.config.optimization_interval_ms
        {
            self.last_optimization_ms = self.clock_ms;
            self.perform_auto_optimization();
        }
        warnings
    }

    /// `true` while the focus controller reports any signal, or within the
    /// stabilization period after [`mark_focus_end`](Self::mark_focus_end).
    pub fn is_focus_guarded(&self) -> bool {
        self.focus.is_guarded() || self.is_stabilizing()
    }

    /// Within the settling period after a focus transition ended.
    fn is_stabilizing(&self) -> bool {
        self.focus.is_recently_ended()
            || self.focus_ended_ms.is_some_and(|ended| {
                self.clock_ms - ended < self.config.focus_stabilization_period_ms
            })
    }

    /// A focus transition has completed; start the stabilization period.
    pub fn mark_focus_end(&mut self) {
        self.focus_ended_ms = Some(self.clock_ms);
        debug!(at_ms = self.clock_ms, "focus ended, stabilizing");
    }

    /// Run one feedback cycle: tighten culling (and reclaim resources) when
    /// FPS is below the tighten threshold, relax it when above the relax
    /// threshold. Skipped entirely while the focus guard is active.
    pub fn perform_auto_optimization(&mut self) -> TuningOutcome {
        let outcome = self.auto_optimize();
        self.last_tuning = Some(outcome);
        outcome
    }

    fn auto_optimize(&mut self) -> TuningOutcome {
        if self.is_focus_guarded() {
            self.counters.skipped_cycles += 1;
            debug!("auto-optimization skipped: focus guard active");
            return TuningOutcome::Skipped;
        }
        let Some(fps) = self.monitor.current_fps() else {
            return TuningOutcome::NoData;
        };
        self.counters.optimization_cycles += 1;

        let outcome = tuning::decide(fps, &self.config);
        match outcome {
            TuningOutcome::Tightened => {
                self.tighten_culling(fps);
                if self.config.enable_resource_optimization {
                    self.reclaim_resources();
                }
            }
            TuningOutcome::Relaxed => self.relax_culling(fps),
            _ => debug!(fps, "frame rate within band, culling unchanged"),
        }
        outcome
    }

    fn tighten_culling(&mut self, fps: f32) {
        let next = tuning::tightened(self.culling.config(), &self.config);
        info!(
            fps,
            max_distance = next.max_distance,
            max_checks_per_frame = next.max_checks_per_frame,
            "tightening culling"
        );
        self.culling.set_config(next);
        self.counters.tightenings += 1;
    }

    fn relax_culling(&mut self, fps: f32) {
        let next = tuning::relaxed(self.culling.config(), &self.config);
        info!(
            fps,
            max_distance = next.max_distance,
            max_checks_per_frame = next.max_checks_per_frame,
            "relaxing culling"
        );
        self.culling.set_config(next);
        self.counters.relaxations += 1;
    }

    fn reclaim_resources(&mut self) -> ReclaimStats {
        let reclaimed = self.batches.optimize_resources();
        self.counters.resources_reclaimed += reclaimed.total() as u64;
        reclaimed
    }

    /// Apply the corrective action for one warning, unless the focus guard is active.
    fn handle_warning(&mut self, warning: &PerformanceWarning) {
        if self.is_focus_guarded() {
            self.counters.warnings_skipped += 1;
            debug!(category = %warning.category, "warning handler skipped: focus guard active");
            return;
        }
        self.counters.warnings_handled += 1;
        match warning.category {
            WarningCategory::LowFps => {
                if self.config.enable_frustum_culling {
                    let fps = self.monitor.current_fps().unwrap_or(0.0);
                    self.tighten_culling(fps);
                }
            }
            WarningCategory::HighMemory => {
                if self.config.enable_resource_optimization {
                    self.reclaim_resources();
                }
            }
            WarningCategory::HighDrawCalls => {
                if self.config.enable_instanced_rendering {
                    info!(
                        batches = self.batches.batches().len(),
                        "high draw calls with instancing on; coarser batch keys would merge batches"
                    );
                } else {
                    info!("high draw calls; instanced rendering is disabled");
                }
            }
            WarningCategory::HighTriangles => {
                info!(
                    max_distance = self.culling.config().max_distance,
                    "high triangle count; candidate for level-of-detail reduction"
                );
            }
        }
    }

    /// Refresh everything now. The culling pass respects the focus guard;
    /// resource reclamation always runs.
    pub fn force_update(&mut self, camera: &CameraPose, scene: &mut dyn SceneGraph) -> ForceUpdateOutcome {
        let culling_refreshed = if !self.config.enable_frustum_culling {
            false
        } else if self.is_focus_guarded() {
            debug!("forced culling refresh skipped: focus guard active");
            false
        } else {
            let now = self.clock_ms;
            self.with_visibility_sync(scene, |culling, scene| {
                culling.force_update_all(now, camera, scene)
            })
        };
        ForceUpdateOutcome {
            culling_refreshed,
            reclaimed: self.reclaim_resources(),
        }
    }

    /// Run `f` against the culling manager and mirror every node visibility
    /// change it makes into the owning instance slot.
    fn with_visibility_sync<R>(
        &mut self,
        scene: &mut dyn SceneGraph,
        f: impl FnOnce(&mut FrustumCullingManager, &mut dyn SceneGraph) -> R,
    ) -> R {
        let mut recorder = VisibilityRecorder::new(scene);
        let out = f(&mut self.culling, &mut recorder as &mut dyn SceneGraph);
        for (node, visible) in recorder.into_changes() {
            if let Some(id) = self.node_owner.get(&node) {
                self.batches.set_instance_visible(id, visible);
            }
        }
        out
    }

    /// Register a crystal added after setup. It is tracked for culling and,
    /// with instancing on, appended to the batch its keys resolve to. A
    /// record with a known id replaces the earlier one.
    pub fn add_object(&mut self, record: &CrystalRecord, scene: &mut dyn SceneGraph) {
        if self.config.enable_instanced_rendering {
            self.batches.remove_instance(&record.id);
            self.batches
                .create_instanced_objects_default(std::slice::from_ref(record));
        }
        self.track(record, scene);
    }

    fn track(&mut self, record: &CrystalRecord, scene: &mut dyn SceneGraph) {
        let id = record.id.clone();
        let node = record.node;
        let priority = 1.0 + record.importance.clamp(0.0, 1.0);
        if let Some(previous) = self.culling.object(&id).map(|obj| obj.node) {
            self.node_owner.remove(&previous);
        }
        self.node_owner.insert(node, id.clone());
        self.with_visibility_sync(scene, |culling, scene| {
            culling.add_object(id, node, priority, scene)
        });
    }

    /// Forget a crystal: its culling state, its node's owner entry, and its
    /// instance slot. Returns `false` if the id was unknown to both.
    pub fn remove_object(&mut self, id: &ObjectId, scene: &mut dyn SceneGraph) -> bool {
        let node = self.culling.object(id).map(|obj| obj.node);
        let untracked = self.with_visibility_sync(scene, |culling, scene| culling.remove_object(id, scene));
        if let Some(node) = node {
            self.node_owner.remove(&node);
        }
        let uninstanced = self.batches.remove_instance(id);
        untracked || uninstanced
    }

    pub fn update_object(&mut self, id: &ObjectId, node: NodeId, scene: &mut dyn SceneGraph) -> bool {
        let previous = self.culling.object(id).map(|obj| obj.node);
        let updated = self.with_visibility_sync(scene, |culling, scene| {
            culling.update_object(id, node, scene)
        });
        if updated && let Some(previous) = previous {
            self.node_owner.remove(&previous);
            self.node_owner.insert(node, id.clone());
        }
        updated
    }

    pub fn update_track_highlight(&mut self, id: &ObjectId, highlighted: bool) -> bool {
        self.batches.update_instance_highlight(id, highlighted)
    }

    /// Nearest visible crystal within `tolerance` of `position`.
    ///
    /// Falls back to tracked bounding spheres when nothing is instanced.
    pub fn get_track_at_position(&self, position: Vec3, tolerance: f32) -> Option<ObjectId> {
        if self.batches.instance_count() > 0 {
            return self.batches.get_track_at_position(position, tolerance);
        }
        self.culling
            .get_objects_in_radius(position, tolerance)
            .into_iter()
            .filter_map(|id| {
                let obj = self.culling.object(&id)?;
                obj.visible
                    .then(|| (obj.sphere.center.distance_squared(position), id))
            })
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, id)| id)
    }

    /// Visible crystals within `radius` of `center`, sorted by id.
    pub fn get_tracks_in_radius(&self, center: Vec3, radius: f32) -> Vec<ObjectId> {
        if self.batches.instance_count() > 0 {
            return self.batches.get_tracks_in_radius(center, radius);
        }
        self.culling
            .get_objects_in_radius(center, radius)
            .into_iter()
            .filter(|id| self.culling.is_visible(id) == Some(true))
            .collect()
    }

    pub fn get_stats(&self) -> OptimizerStats {
        let culling = self.culling.stats();
        let batches = self.batches.stats();
        let sample = self.monitor.current_sample();
        OptimizerStats {
            fps: self.monitor.current_fps(),
            frame_time_ms: sample.map(|s| s.frame_time_ms),
            total_objects: culling.total_objects,
            visible_objects: culling.visible_objects,
            culled_objects: culling.culled_objects,
            culling_efficiency: culling.culling_efficiency,
            max_distance: self.culling.config().max_distance,
            batches: batches.batches,
            instances: batches.instances,
            draw_calls: batches.draw_calls,
            warnings: self.monitor.stats().warnings_emitted,
            focus_guarded: self.is_focus_guarded(),
        }
    }

    pub fn get_detailed_stats(&self) -> DetailedStats {
        DetailedStats {
            clock_ms: self.clock_ms,
            focus_guarded: self.is_focus_guarded(),
            config: self.config.clone(),
            culling_config: self.culling.config().clone(),
            thresholds: *self.monitor.thresholds(),
            culling: self.culling.stats(),
            batches: self.batches.stats(),
            monitor: self.monitor.stats(),
            recent_warnings: self.monitor.recent_warnings(RECENT_WARNING_WINDOW_MS),
            counters: self.counters,
            last_tuning: self.last_tuning,
        }
    }

    pub fn generate_report(&self) -> String {
        self.get_detailed_stats().to_text()
    }

    pub fn report_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(&self.get_detailed_stats())?)
    }

    /// Write [`get_detailed_stats`](Self::get_detailed_stats) as pretty JSON to `path`.
    pub fn export_report_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.report_json()?;
        std::fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "performance report written");
        Ok(())
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Replace the orchestrator configuration. Disabling frustum culling
    /// makes every node and instance visible again.
    pub fn set_config(&mut self, config: OptimizerConfig, scene: &mut dyn SceneGraph) {
        let config = config.sanitized();
        let culling_enabled = config.enable_frustum_culling;
        if culling_enabled != self.config.enable_frustum_culling {
            info!(enabled = culling_enabled, "frustum culling toggled");
        }
        self.config = config;
        self.with_visibility_sync(scene, |culling, scene| {
            culling.set_enabled(culling_enabled, scene)
        });
    }

    pub fn culling_config(&self) -> &CullingConfig {
        self.culling.config()
    }

    /// Explicit culling reconfiguration. Respects the focus guard; returns
    /// `false` if the change was deferred.
    pub fn set_culling_config(&mut self, config: CullingConfig) -> bool {
        if self.is_focus_guarded() {
            debug!("culling reconfiguration skipped: focus guard active");
            return false;
        }
        self.culling.set_config(config);
        true
    }

    pub fn culling(&self) -> &FrustumCullingManager {
        &self.culling
    }

    pub fn batches(&self) -> &BatchManager {
        &self.batches
    }

    pub fn batches_mut(&mut self) -> &mut BatchManager {
        &mut self.batches
    }

    pub fn monitor(&self) -> &FrameMonitor {
        &self.monitor
    }

    pub fn counters(&self) -> OptimizerCounters {
        self.counters
    }

    pub fn last_tuning(&self) -> Option<TuningOutcome> {
        self.last_tuning
    }

    pub fn clock_ms(&self) -> f64 {
        self.clock_ms
    }

    /// Reveal every culled node and release all tracking, batches, and history.
    pub fn dispose(&mut self, scene: &mut dyn SceneGraph) {
        self.culling.dispose(scene);
        self.batches.dispose();
        self.monitor.reset();
        self.node_owner.clear();
        info!("optimizer disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_scene::{FocusFlags, NoFocus, NodeArena, RenderCounters};
    use glam::Quat;

    fn camera() -> CameraPose {
        CameraPose::perspective_look_at(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -1.0),
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            10_000.0,
        )
    }

    fn records(arena: &mut NodeArena, positions: &[Vec3]) -> Vec<CrystalRecord> {
        positions
            .iter()
            .enumerate()
            .map(|(i, &position)| CrystalRecord {
                id: ObjectId::new(format!("track-{i}")),
                node: arena.spawn_at(position, 1.0),
                category: if i % 2 == 0 { "rock" } else { "jazz" }.to_string(),
                position,
                rotation: Quat::IDENTITY,
                size: 1.0,
                color: [0.5, 0.5, 0.5],
                importance: 0.5,
            })
            .collect()
    }

    fn optimizer(focus: Rc<dyn FocusState>) -> PerformanceOptimizer {
        PerformanceOptimizer::new(&Config::default(), focus)
    }

    #[test]
    fn test_initialize_builds_batches_and_registers() {
        let mut arena = NodeArena::new();
        let recs = records(
            &mut arena,
            &[Vec3::new(0.0, 0.0, -10.0), Vec3::new(0.0, 0.0, -20.0), Vec3::new(5.0, 0.0, -30.0)],
        );
        let mut opt = optimizer(Rc::new(NoFocus));
        opt.initialize_optimization(&recs, &mut arena);
        assert_eq!(opt.culling().len(), 3);
        assert_eq!(opt.batches().stats().batches, 2);
        assert_eq!(opt.batches().instance_count(), 3);
    }

    #[test]
    fn test_culling_mirrors_into_instances() {
        let mut arena = NodeArena::new();
        let recs = records(&mut arena, &[Vec3::new(0.0, 0.0, -10.0), Vec3::new(0.0, 0.0, 10.0)]);
        let mut opt = optimizer(Rc::new(NoFocus));
        opt.initialize_optimization(&recs, &mut arena);
        let outcome = opt.force_update(&camera(), &mut arena);
        assert!(outcome.culling_refreshed);

        let behind = &recs[1].id;
        assert_eq!(opt.culling().is_visible(behind), Some(false));
        assert!(!opt.batches().member(behind).unwrap().visible);
        assert_eq!(opt.get_tracks_in_radius(Vec3::ZERO, 50.0), vec![recs[0].id.clone()]);

        let mut config = opt.config().clone();
        config.enable_frustum_culling = false;
        opt.set_config(config, &mut arena);
        assert!(opt.batches().member(behind).unwrap().visible);
        assert_eq!(arena.visible_count(), 2);
    }

    #[test]
    fn test_focus_end_starts_stabilization() {
        let mut arena = NodeArena::new();
        let mut opt = optimizer(Rc::new(NoFocus));
        let counters = RenderCounters::default();
        assert!(!opt.is_focus_guarded());
        opt.mark_focus_end();
        assert!(opt.is_focus_guarded());
        for _ in 0..14 {
            opt.update(1000.0, &camera(), &mut arena, &counters);
        }
        assert!(opt.is_focus_guarded());
        opt.update(1000.0, &camera(), &mut arena, &counters);
        assert!(!opt.is_focus_guarded());
    }

    #[test]
    fn test_external_focus_signals_guard() {
        let flags = Rc::new(FocusFlags::new());
        let opt = optimizer(flags.clone());
        flags.set_focused(true);
        assert!(opt.is_focus_guarded());
        flags.set_focused(false);
        flags.set_recently_ended(true);
        assert!(opt.is_focus_guarded());
        flags.set_recently_ended(false);
        assert!(!opt.is_focus_guarded());
    }

    #[test]
    fn test_no_data_before_first_frame() {
        let mut opt = optimizer(Rc::new(NoFocus));
        assert_eq!(opt.perform_auto_optimization(), TuningOutcome::NoData);
        assert_eq!(opt.culling_config().max_distance, 2500.0);
    }

    #[test]
    fn test_force_update_reclaims_even_when_guarded() {
        let flags = Rc::new(FocusFlags::new());
        let mut arena = NodeArena::new();
        let mut opt = optimizer(flags.clone());
        opt.batches_mut().preload_geometries(&["rock"], &[1.0, 2.0]);
        flags.set_animating(true);
        let outcome = opt.force_update(&camera(), &mut arena);
        assert!(!outcome.culling_refreshed);
        assert_eq!(outcome.reclaimed.geometries, 2);
    }

    #[test]
    fn test_spatial_fallback_without_instancing() {
        let mut arena = NodeArena::new();
        let recs = records(&mut arena, &[Vec3::new(0.0, 0.0, -10.0), Vec3::new(3.0, 0.0, -10.0)]);
        let mut config = Config::default();
        config.optimizer.enable_instanced_rendering = false;
        let mut opt = PerformanceOptimizer::new(&config, Rc::new(NoFocus));
        opt.initialize_optimization(&recs, &mut arena);
        opt.force_update(&camera(), &mut arena);
        assert_eq!(
            opt.get_track_at_position(Vec3::new(2.5, 0.0, -10.0), 1.0),
            Some(recs[1].id.clone())
        );
        assert_eq!(opt.get_tracks_in_radius(Vec3::new(0.0, 0.0, -10.0), 5.0).len(), 2);
    }

    #[test]
    fn test_remove_object_forgets_node() {
        let mut arena = NodeArena::new();
        let recs = records(&mut arena, &[Vec3::new(0.0, 0.0, 10.0)]);
        let mut opt = optimizer(Rc::new(NoFocus));
        opt.initialize_optimization(&recs, &mut arena);
        opt.force_update(&camera(), &mut arena);
        assert_eq!(arena.is_visible(recs[0].node), Some(false));
        assert!(opt.remove_object(&recs[0].id, &mut arena));
        assert_eq!(arena.is_visible(recs[0].node), Some(true));
        assert!(opt.culling().is_empty());
        assert_eq!(opt.batches().instance_count(), 0);
        assert!(!opt.remove_object(&recs[0].id, &mut arena));
    }

    #[test]
    fn test_report_lists_recommendations() {
        let mut config = Config::default();
        config.optimizer.enable_frustum_culling = false;
        let opt = PerformanceOptimizer::new(&config, Rc::new(NoFocus));
        let report = opt.generate_report();
        assert!(report.contains("Recommendations:"));
        assert!(report.contains("Frustum culling is disabled"));
        assert!(report.contains("FPS: no sample yet"));
    }
}
