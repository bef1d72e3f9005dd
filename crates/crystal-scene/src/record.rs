use glam::{Quat, Vec3};

use crate::{NodeId, ObjectId};

/// One data record rendered as a crystal.
#[derive(Clone, Debug, PartialEq)]
pub struct CrystalRecord {
    /// Stable record id (e.g. a track id).
    pub id: ObjectId,
    /// Scene node that renders this crystal when it is not instanced.
    pub node: NodeId,
    /// Category used to share geometry and materials (e.g. genre).
    pub category: String,
    /// World-space position.
    pub position: Vec3,
    /// World-space orientation.
    pub rotation: Quat,
    /// Uniform size of the crystal.
    pub size: f32,
    /// Linear RGB base color.
    pub color: [f32; 3],
    /// Domain importance in `[0, 1]` (e.g. popularity).
    pub importance: f32,
}
