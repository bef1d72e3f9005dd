//! Scene-graph seam and a small arena implementation of it.

use crystal_math::{Aabb, BoundingSphere};
use glam::{Mat4, Vec3};

use crate::NodeId;

/// Local-space bounding data of a node's geometry.
///
/// Either field may be missing; consumers fall back from sphere to box to a
/// zero-extent point at the node origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeBounds {
    pub sphere: Option<BoundingSphere>,
    pub aabb: Option<Aabb>,
}

impl NodeBounds {
    pub fn sphere(sphere: BoundingSphere) -> Self {
        Self {
            sphere: Some(sphere),
            aabb: None,
        }
    }

    pub fn aabb(aabb: Aabb) -> Self {
        Self {
            sphere: None,
            aabb: Some(aabb),
        }
    }
}

/// The scene-graph operations the pipeline needs.
///
/// Unknown nodes are not an error: getters return `None`/empty bounds and
/// setters do nothing.
pub trait SceneGraph {
    /// Current world transform of the node.
    fn world_matrix(&self, node: NodeId) -> Option<Mat4>;

    /// Local-space bounds of the node's geometry.
    fn local_bounds(&self, node: NodeId) -> NodeBounds;

    /// Toggle whether the renderer draws the node.
    fn set_visible(&mut self, node: NodeId, visible: bool);

    /// Toggle per-frame world-matrix recomputation for the node.
    fn set_matrix_auto_update(&mut self, node: NodeId, enabled: bool);
}

#[derive(Clone, Debug)]
struct NodeSlot {
    world: Mat4,
    bounds: NodeBounds,
    visible: bool,
    matrix_auto_update: bool,
}

/// A flat arena of scene nodes indexed by [`NodeId`].
///
/// Enough of a scene graph for headless simulation and tests.
#[derive(Clone, Debug, Default)]
pub struct NodeArena {
    nodes: Vec<NodeSlot>,
    visibility_writes: u64,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its handle. Nodes start visible.
    pub fn spawn(&mut self, world: Mat4, bounds: NodeBounds) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(NodeSlot {
            world,
            bounds,
            visible: true,
            matrix_auto_update: true,
        });
        id
    }

    /// Convenience: a node translated to `position` with a local sphere of `radius`.
    pub fn spawn_at(&mut self, position: Vec3, radius: f32) -> NodeId {
        self.spawn(
            Mat4::from_translation(position),
            NodeBounds::sphere(BoundingSphere::new(Vec3::ZERO, radius)),
        )
    }

    pub fn set_world_matrix(&mut self, node: NodeId, world: Mat4) {
        if let Some(slot) = self.slot_mut(node) {
            slot.world = world;
        }
    }

    pub fn is_visible(&self, node: NodeId) -> Option<bool> {
        self.slot(node).map(|s| s.visible)
    }

    pub fn matrix_auto_update(&self, node: NodeId) -> Option<bool> {
        self.slot(node).map(|s| s.matrix_auto_update)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of visible nodes.
    pub fn visible_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.visible).count()
    }

    /// Total number of `set_visible` calls that changed a node.
    pub fn visibility_writes(&self) -> u64 {
        self.visibility_writes
    }

    fn slot(&self, node: NodeId) -> Option<&NodeSlot> {
        usize::try_from(node.0).ok().and_then(|i| self.nodes.get(i))
    }

    fn slot_mut(&mut self, node: NodeId) -> Option<&mut NodeSlot> {
        usize::try_from(node.0).ok().and_then(|i| self.nodes.get_mut(i))
    }
}

impl SceneGraph for NodeArena {
    fn world_matrix(&self, node: NodeId) -> Option<Mat4> {
        self.slot(node).map(|s| s.world)
    }

    fn local_bounds(&self, node: NodeId) -> NodeBounds {
        self.slot(node).map(|s| s.bounds).unwrap_or_default()
    }

    fn set_visible(&mut self, node: NodeId, visible: bool) {
        let mut changed = false;
        if let Some(slot) = self.slot_mut(node)
            && slot.visible != visible
        {
            slot.visible = visible;
            changed = true;
        }
        if changed {
            self.visibility_writes += 1;
        }
    }

    fn set_matrix_auto_update(&mut self, node: NodeId, enabled: bool) {
        if let Some(slot) = self.slot_mut(node) {
            slot.matrix_auto_update = enabled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawned_nodes_start_visible() {
        let mut arena = NodeArena::new();
        let id = arena.spawn_at(Vec3::ONE, 2.0);
        assert_eq!(arena.is_visible(id), Some(true));
        assert_eq!(arena.matrix_auto_update(id), Some(true));
        assert_eq!(arena.world_matrix(id), Some(Mat4::from_translation(Vec3::ONE)));
    }

    #[test]
    fn test_unknown_node_is_ignored() {
        let mut arena = NodeArena::new();
        arena.set_visible(NodeId(42), false);
        assert!(arena.world_matrix(NodeId(42)).is_none());
        assert_eq!(arena.local_bounds(NodeId(42)), NodeBounds::default());
        assert_eq!(arena.visibility_writes(), 0);
    }

    #[test]
    fn test_visibility_writes_count_changes_only() {
        let mut arena = NodeArena::new();
        let id = arena.spawn_at(Vec3::ZERO, 1.0);
        arena.set_visible(id, true);
        arena.set_visible(id, false);
        arena.set_visible(id, false);
        assert_eq!(arena.visibility_writes(), 1);
        assert_eq!(arena.visible_count(), 0);
    }
}
