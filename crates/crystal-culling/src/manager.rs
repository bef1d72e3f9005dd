//! Budgeted, rate-limited frustum and distance culling.

use std::cmp::Ordering;
use std::rc::Rc;

use crystal_config::CullingConfig;
use crystal_math::{BoundingSphere, Frustum};
use crystal_scene::{CameraPose, FocusState, NoFocus, NodeId, ObjectId, SceneGraph};
use glam::Vec3;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, trace};

use crate::tracker::{TrackedObject, sphere_for_node};

/// Fraction of a pass's budget reserved for the highest-priority objects.
const HOT_BUDGET_DIVISOR: usize = 4;

/// Snapshot of culling counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct CullingStats {
    pub total_objects: usize,
    pub visible_objects: usize,
    pub culled_objects: usize,
    /// Share of tracked objects currently culled, in percent.
    pub culling_efficiency: f32,
    /// Visibility checks performed by the most recent pass.
    pub checks_last_pass: usize,
    /// Visibility checks performed since creation.
    pub total_checks: u64,
    /// Culling passes that actually ran.
    pub passes: u64,
}

/// Decides per object whether it is inside the camera frustum and within
/// draw distance, and toggles node visibility on transitions.
///
/// All work happens on the render thread inside [`update`](Self::update) or
/// [`force_update_all`](Self::force_update_all). Passes are rate-limited by
/// `update_interval_ms`, budgeted by `max_checks_per_frame`, and skipped
/// entirely while a focus transition is animating.
pub struct FrustumCullingManager {
    config: CullingConfig,
    objects: FxHashMap<ObjectId, TrackedObject>,
    /// Object ids sorted by descending priority.
    check_order: Vec<ObjectId>,
    order_dirty: bool,
    /// Round-robin position within the non-hot part of `check_order`.
    cursor: usize,
    frustum: Option<Frustum>,
    camera_position: Vec3,
    last_update_ms: Option<f64>,
    last_priority_ms: Option<f64>,
    focus: Rc<dyn FocusState>,
    enabled: bool,
    checks_last_pass: usize,
    total_checks: u64,
    passes: u64,
}

impl FrustumCullingManager {
    /// Create a manager with no focus controller attached.
    pub fn new(config: CullingConfig) -> Self {
        Self::with_focus_state(config, Rc::new(NoFocus))
    }

    /// Create a manager that pauses while `focus` reports an animation.
    pub fn with_focus_state(config: CullingConfig, focus: Rc<dyn FocusState>) -> Self {
        Self {
            config: config.sanitized(),
            objects: FxHashMap::default(),
            check_order: Vec::new(),
            order_dirty: false,
            cursor: 0,
            frustum: None,
            camera_position: Vec3::ZERO,
            last_update_ms: None,
            last_priority_ms: None,
            focus,
            enabled: true,
            checks_last_pass: 0,
            total_checks: 0,
            passes: 0,
        }
    }

    pub fn set_focus_state(&mut self, focus: Rc<dyn FocusState>) {
        self.focus = focus;
    }

    pub fn config(&self) -> &CullingConfig {
        &self.config
    }

    /// Replace the configuration. Out-of-range values are clamped.
    ///
    /// A changed margin multiplier rescales every tracked sphere.
    pub fn set_config(&mut self, config: CullingConfig) {
        let config = config.sanitized();
        let old_margin = self.config.margin_multiplier;
        if (config.margin_multiplier - old_margin).abs() > f32::EPSILON {
            let ratio = config.margin_multiplier / old_margin;
            for obj in self.objects.values_mut() {
                obj.sphere = BoundingSphere::new(obj.sphere.center, obj.sphere.radius * ratio);
            }
        }
        self.config = config;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable culling. Disabling makes every tracked node visible.
    pub fn set_enabled(&mut self, enabled: bool, scene: &mut dyn SceneGraph) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            self.show_all(scene);
        }
        self.last_update_ms = None;
    }

    /// Register an object, replacing any previous registration under `id`.
    ///
    /// The bounding sphere is computed from the node's current world transform.
    pub fn add_object(
        &mut self,
        id: impl Into<ObjectId>,
        node: NodeId,
        priority: f32,
        scene: &mut dyn SceneGraph,
    ) {
        let id = id.into();
        let base_priority = if priority.is_finite() {
            priority.max(0.0)
        } else {
            1.0
        };
        let sphere = sphere_for_node(scene, node, self.config.margin_multiplier);
        let mut obj = TrackedObject::new(id.clone(), node, sphere, base_priority);
        if self.frustum.is_some() {
            obj.refresh_priority(self.camera_position, self.config.priority_scale);
        }
        if let Some(old) = self.objects.insert(id, obj) {
            restore_node(&old, scene);
        }
        self.order_dirty = true;
    }

    /// Deregister an object. A culled node is made visible again so it never
    /// stays hidden without a manager to reveal it.
    pub fn remove_object(&mut self, id: &ObjectId, scene: &mut dyn SceneGraph) -> bool {
        match self.objects.remove(id) {
            Some(old) => {
                restore_node(&old, scene);
                self.order_dirty = true;
                true
            }
            None => false,
        }
    }

    /// Recompute an object's bounding sphere after its transform changed.
    pub fn update_object(&mut self, id: &ObjectId, node: NodeId, scene: &mut dyn SceneGraph) -> bool {
        let margin = self.config.margin_multiplier;
        let Some(obj) = self.objects.get_mut(id) else {
            return false;
        };
        if obj.node != node {
            restore_node(obj, scene);
            obj.visible = true;
            obj.node = node;
        }
        obj.sphere = sphere_for_node(scene, node, margin);
        if self.frustum.is_some() {
            obj.refresh_priority(self.camera_position, self.config.priority_scale);
        }
        true
    }

    /// Per-frame entry point. Returns `true` if a culling pass ran.
    pub fn update(&mut self, now_ms: f64, camera: &CameraPose, scene: &mut dyn SceneGraph) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(last) = self.last_update_ms
            && now_ms - last < self.config.update_interval_ms
        {
            return false;
        }
        if self.focus.is_animating() {
            debug!("culling pass skipped: focus transition in progress");
            return false;
        }
        self.last_update_ms = Some(now_ms);
        self.refresh_camera(camera);

        let priorities_due = self.last_priority_ms.is_none_or(|last| {
            now_ms - last >= self.config.priority_recompute_interval_ms
        });
        if priorities_due {
            self.recompute_priorities();
            self.last_priority_ms = Some(now_ms);
        }
        if self.order_dirty {
            self.rebuild_order();
        }

        self.run_budgeted_pass(now_ms, scene);
        true
    }

    /// Check every object now, ignoring rate limiting and the per-pass budget.
    ///
    /// Still skipped while a focus transition is animating.
    pub fn force_update_all(
        &mut self,
        now_ms: f64,
        camera: &CameraPose,
        scene: &mut dyn SceneGraph,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        if self.focus.is_animating() {
            debug!("forced culling pass skipped: focus transition in progress");
            return false;
        }
        self.last_update_ms = Some(now_ms);
        self.last_priority_ms = Some(now_ms);
        self.refresh_camera(camera);
        self.recompute_priorities();
        self.rebuild_order();

        let len = self.check_order.len();
        self.check_range(0..len, now_ms, scene);
        self.checks_last_pass = len;
        self.total_checks += len as u64;
        self.passes += 1;
        true
    }

    /// Ids of objects whose bounding sphere intersects `custom`, or the
    /// frustum of the last culling pass when `custom` is `None`.
    pub fn get_objects_in_frustum(&self, custom: Option<&Frustum>) -> Vec<ObjectId> {
        let Some(frustum) = custom.or(self.frustum.as_ref()) else {
            return Vec::new();
        };
        let mut ids: Vec<ObjectId> = self
            .objects
            .values()
            .filter(|obj| frustum.intersects_sphere(&obj.sphere))
            .map(|obj| obj.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Ids of objects whose bounding sphere overlaps the given sphere.
    pub fn get_objects_in_radius(&self, center: Vec3, radius: f32) -> Vec<ObjectId> {
        let query = BoundingSphere::new(center, radius);
        let mut ids: Vec<ObjectId> = self
            .objects
            .values()
            .filter(|obj| obj.sphere.intersects(&query))
            .map(|obj| obj.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_visible(&self, id: &ObjectId) -> Option<bool> {
        self.objects.get(id).map(|obj| obj.visible)
    }

    pub fn object(&self, id: &ObjectId) -> Option<&TrackedObject> {
        self.objects.get(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn stats(&self) -> CullingStats {
        let total = self.objects.len();
        let visible = self.objects.values().filter(|obj| obj.visible).count();
        let culled = total - visible;
        CullingStats {
            total_objects: total,
            visible_objects: visible,
            culled_objects: culled,
            culling_efficiency: if total == 0 {
                0.0
            } else {
                culled as f32 / total as f32 * 100.0
            },
            checks_last_pass: self.checks_last_pass,
            total_checks: self.total_checks,
            passes: self.passes,
        }
    }

    /// Reveal every culled node and drop all tracking state.
    pub fn dispose(&mut self, scene: &mut dyn SceneGraph) {
        self.show_all(scene);
        self.objects.clear();
        self.check_order.clear();
        self.order_dirty = false;
        self.cursor = 0;
        self.frustum = None;
        self.last_update_ms = None;
        self.last_priority_ms = None;
    }

    fn show_all(&mut self, scene: &mut dyn SceneGraph) {
        for obj in self.objects.values_mut() {
            restore_node(obj, scene);
            obj.visible = true;
        }
    }

    fn refresh_camera(&mut self, camera: &CameraPose) {
        self.frustum = Some(camera.frustum());
        self.camera_position = camera.position;
    }

    fn recompute_priorities(&mut self) {
        let (position, scale) = (self.camera_position, self.config.priority_scale);
        for obj in self.objects.values_mut() {
            obj.refresh_priority(position, scale);
        }
        self.order_dirty = true;
    }

    fn rebuild_order(&mut self) {
        let objects = &self.objects;
        self.check_order.clear();
        self.check_order.extend(objects.keys().cloned());
        self.check_order.sort_by(|a, b| {
            let (pa, pb) = (objects[a].priority, objects[b].priority);
            pb.partial_cmp(&pa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.cmp(b))
        });
        self.order_dirty = false;
    }

    /// Check the hot head of the order every pass, then continue the
    /// round-robin sweep over the rest with whatever budget remains.
    fn run_budgeted_pass(&mut self, now_ms: f64, scene: &mut dyn SceneGraph) {
        let len = self.check_order.len();
        let budget = self.config.max_checks_per_frame;

        let checks = if len <= budget {
            self.check_range(0..len, now_ms, scene);
            len
        } else {
            let hot = budget / HOT_BUDGET_DIVISOR;
            let cold_len = len - hot;
            let cold_budget = budget - hot;
            self.check_range(0..hot, now_ms, scene);

            let start = self.cursor % cold_len;
            let end = start + cold_budget;
            if end <= cold_len {
                self.check_range(hot + start..hot + end, now_ms, scene);
            } else {
                self.check_range(hot + start..len, now_ms, scene);
                self.check_range(hot..hot + (end - cold_len), now_ms, scene);
            }
            self.cursor = end % cold_len;
            budget
        };

        self.checks_last_pass = checks;
        self.total_checks += checks as u64;
        self.passes += 1;
        trace!(checks, total = len, "culling pass");
    }

    fn check_range(&mut self, range: std::ops::Range<usize>, now_ms: f64, scene: &mut dyn SceneGraph) {
        let Some(frustum) = self.frustum.as_ref() else {
            return;
        };
        let config = &self.config;
        let camera_position = self.camera_position;
        for id in &self.check_order[range] {
            if let Some(obj) = self.objects.get_mut(id) {
                check_visibility(obj, frustum, camera_position, config, now_ms, scene);
            }
        }
    }
}

/// Visible iff the sphere intersects the frustum and, with distance culling
/// on, the sphere's surface is within `max_distance` of the camera.
fn check_visibility(
    obj: &mut TrackedObject,
    frustum: &Frustum,
    camera_position: Vec3,
    config: &CullingConfig,
    now_ms: f64,
    scene: &mut dyn SceneGraph,
) {
    let in_range = !config.distance_culling
        || obj.sphere.surface_distance(camera_position) <= config.max_distance;
    let visible = in_range && frustum.intersects_sphere(&obj.sphere);
    obj.last_check_ms = Some(now_ms);

    if visible != obj.visible {
        obj.visible = visible;
        scene.set_visible(obj.node, visible);
        scene.set_matrix_auto_update(obj.node, visible);
    }
}

fn restore_node(obj: &TrackedObject, scene: &mut dyn SceneGraph) {
    if !obj.visible {
        scene.set_visible(obj.node, true);
        scene.set_matrix_auto_update(obj.node, true);
    }
}
