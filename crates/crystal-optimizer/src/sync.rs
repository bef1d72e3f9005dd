//! Scene wrapper that records visibility writes so culling results can be
//! mirrored into instance slots.

use crystal_scene::{NodeBounds, NodeId, SceneGraph};
use glam::Mat4;

pub(crate) struct VisibilityRecorder<'a> {
    scene: &'a mut dyn SceneGraph,
    changes: Vec<(NodeId, bool)>,
}

impl<'a> VisibilityRecorder<'a> {
    pub(crate) fn new(scene: &'a mut dyn SceneGraph) -> Self {
        Self {
            scene,
            changes: Vec::new(),
        }
    }

    pub(crate) fn into_changes(self) -> Vec<(NodeId, bool)> {
        self.changes
    }
}

impl SceneGraph for VisibilityRecorder<'_> {
    fn world_matrix(&self, node: NodeId) -> Option<Mat4> {
        self.scene.world_matrix(node)
    }

    fn local_bounds(&self, node: NodeId) -> NodeBounds {
        self.scene.local_bounds(node)
    }

    fn set_visible(&mut self, node: NodeId, visible: bool) {
        self.changes.push((node, visible));
        self.scene.set_visible(node, visible);
    }

    fn set_matrix_auto_update(&mut self, node: NodeId, enabled: bool) {
        self.scene.set_matrix_auto_update(node, enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_scene::NodeArena;
    use glam::Vec3;

    #[test]
    fn test_records_and_forwards() {
        let mut arena = NodeArena::new();
        let node = arena.spawn_at(Vec3::ZERO, 1.0);
        let mut recorder = VisibilityRecorder::new(&mut arena);
        recorder.set_visible(node, false);
        recorder.set_matrix_auto_update(node, false);
        assert!(recorder.world_matrix(node).is_some());
        assert_eq!(recorder.into_changes(), vec![(node, false)]);
        assert_eq!(arena.is_visible(node), Some(false));
        assert_eq!(arena.matrix_auto_update(node), Some(false));
    }
}
