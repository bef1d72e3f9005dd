//! Bounding-volume tracking for culled objects.

use crystal_math::BoundingSphere;
use crystal_scene::{NodeBounds, NodeId, ObjectId, SceneGraph};
use glam::{Mat4, Vec3};

/// Per-object culling state.
#[derive(Clone, Debug)]
pub struct TrackedObject {
    pub id: ObjectId,
    /// Scene node this object controls. The scene owns the node.
    pub node: NodeId,
    /// World-space bounding sphere, already inflated by the margin multiplier.
    pub sphere: BoundingSphere,
    pub visible: bool,
    /// Domain importance supplied at registration.
    pub base_priority: f32,
    /// Effective priority: `scale * base_priority / (distance + 1)`.
    pub priority: f32,
    /// Time of the last visibility check in milliseconds, if any.
    pub last_check_ms: Option<f64>,
}

impl TrackedObject {
    pub(crate) fn new(id: ObjectId, node: NodeId, sphere: BoundingSphere, base_priority: f32) -> Self {
        Self {
            id,
            node,
            sphere,
            visible: true,
            base_priority,
            priority: base_priority,
            last_check_ms: None,
        }
    }

    /// Recompute the priority from the camera position.
    pub(crate) fn refresh_priority(&mut self, camera_position: Vec3, scale: f32) {
        let distance = self.sphere.center.distance(camera_position);
        self.priority = scale * self.base_priority / (distance + 1.0);
    }
}

/// World-space bounding sphere for a node's geometry.
///
/// Falls back from the local sphere to a sphere around the local AABB, and
/// from there to a zero-extent sphere at the node origin. The result is
/// inflated by `margin` (at least 1).
pub fn compute_bounding_sphere(world: &Mat4, bounds: &NodeBounds, margin: f32) -> BoundingSphere {
    let local = match (bounds.sphere, bounds.aabb) {
        (Some(sphere), _) => sphere,
        (None, Some(aabb)) => BoundingSphere::from_aabb(&aabb),
        (None, None) => BoundingSphere::point(Vec3::ZERO),
    };
    local.transformed(world).inflated(margin)
}

/// Read the node's current transform and bounds from the scene.
///
/// A node the scene does not know is placed at the origin with zero extent.
pub(crate) fn sphere_for_node(scene: &dyn SceneGraph, node: NodeId, margin: f32) -> BoundingSphere {
    let world = scene.world_matrix(node).unwrap_or(Mat4::IDENTITY);
    compute_bounding_sphere(&world, &scene.local_bounds(node), margin)
}
