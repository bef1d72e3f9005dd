//! Instanced crystal batches: one geometry, one material, many instance slots.

use std::ops::Range;
use std::rc::Rc;

use bytemuck::{Pod, Zeroable};
use crystal_scene::ObjectId;
use glam::{Mat4, Quat, Vec3};

use crate::resources::{BatchKey, CrystalGeometry, CrystalMaterial};

/// Per-instance GPU data.
///
/// Layout (80 bytes):
///   model  [f32; 16]  column-major model matrix
///   color  [f32; 4]   linear RGBA tint
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
}

impl InstanceData {
    pub fn new(transform: Mat4, color: [f32; 4]) -> Self {
        Self {
            model: transform.to_cols_array_2d(),
            color,
        }
    }

    pub fn transform(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}

/// CPU-side state of one instance slot.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceMember {
    pub id: ObjectId,
    pub position: Vec3,
    pub rotation: Quat,
    /// Scale relative to the batch geometry.
    pub scale: f32,
    pub color: [f32; 3],
    pub visible: bool,
    pub highlighted: bool,
}

/// Many crystals sharing geometry and material, drawn in a single call.
pub struct InstancedBatch {
    key: BatchKey,
    geometry: Rc<CrystalGeometry>,
    material: Rc<CrystalMaterial>,
    members: Vec<InstanceMember>,
    instances: Vec<InstanceData>,
    /// Slots written since the last upload.
    dirty: Option<Range<usize>>,
    highlight_scale: f32,
    /// Multiplier applied to the material's emissive intensity.
    emissive_pulse: f32,
}

impl InstancedBatch {
    pub fn new(
        key: BatchKey,
        geometry: Rc<CrystalGeometry>,
        material: Rc<CrystalMaterial>,
        capacity: usize,
        highlight_scale: f32,
    ) -> Self {
        Self {
            key,
            geometry,
            material,
            members: Vec::with_capacity(capacity),
            instances: Vec::with_capacity(capacity),
            dirty: None,
            highlight_scale,
            emissive_pulse: 1.0,
        }
    }

    /// Append a member and return its slot.
    pub fn push(&mut self, member: InstanceMember) -> usize {
        let slot = self.members.len();
        self.instances.push(self.instance_for(&member));
        self.members.push(member);
        self.mark_dirty(slot);
        slot
    }

    /// Remove the member at `slot`, moving the last member into its place.
    ///
    /// Returns the removed member and, if a member was moved, its id. Only
    /// the vacated slot is marked dirty; the buffer shrinks by one.
    pub fn swap_remove(&mut self, slot: usize) -> Option<(InstanceMember, Option<ObjectId>)> {
        if slot >= self.members.len() {
            return None;
        }
        let removed = self.members.swap_remove(slot);
        self.instances.swap_remove(slot);

        let len = self.members.len();
        self.dirty = self
            .dirty
            .take()
            .map(|range| range.start.min(len)..range.end.min(len))
            .filter(|range| !range.is_empty());
        let moved = (slot < len).then(|| {
            self.mark_dirty(slot);
            self.members[slot].id.clone()
        });
        Some((removed, moved))
    }

    /// Returns `false` if the slot does not exist or nothing changed.
    pub fn set_highlight(&mut self, slot: usize, highlighted: bool) -> bool {
        match self.members.get_mut(slot) {
            Some(member) if member.highlighted != highlighted => {
                member.highlighted = highlighted;
                self.write_slot(slot);
                true
            }
            _ => false,
        }
    }

    /// Returns `false` if the slot does not exist or nothing changed.
    pub fn set_visible(&mut self, slot: usize, visible: bool) -> bool {
        match self.members.get_mut(slot) {
            Some(member) if member.visible != visible => {
                member.visible = visible;
                self.write_slot(slot);
                true
            }
            _ => false,
        }
    }

    fn write_slot(&mut self, slot: usize) {
        let data = self.instance_for(&self.members[slot]);
        self.instances[slot] = data;
        self.mark_dirty(slot);
    }

    fn instance_for(&self, member: &InstanceMember) -> InstanceData {
        // Hidden instances collapse to zero scale so the draw call stays intact.
        let (scale, tint) = match (member.visible, member.highlighted) {
            (false, _) => (0.0, 1.0),
            (true, true) => (member.scale * self.highlight_scale, self.highlight_scale),
            (true, false) => (member.scale, 1.0),
        };
        let [r, g, b] = member.color;
        InstanceData::new(
            Mat4::from_scale_rotation_translation(Vec3::splat(scale), member.rotation, member.position),
            [
                (r * tint).min(1.0),
                (g * tint).min(1.0),
                (b * tint).min(1.0),
                self.material.opacity,
            ],
        )
    }

    fn mark_dirty(&mut self, slot: usize) {
        self.dirty = Some(match self.dirty.take() {
            Some(range) => range.start.min(slot)..range.end.max(slot + 1),
            None => slot..slot + 1,
        });
    }

    /// Slot range written since the last call; clears it.
    pub fn take_dirty(&mut self) -> Option<Range<usize>> {
        self.dirty.take()
    }

    pub fn dirty(&self) -> Option<Range<usize>> {
        self.dirty.clone()
    }

    /// Raw instance buffer contents for upload.
    pub fn instance_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.instances)
    }

    pub fn instances(&self) -> &[InstanceData] {
        &self.instances
    }

    pub fn members(&self) -> &[InstanceMember] {
        &self.members
    }

    pub fn member(&self, slot: usize) -> Option<&InstanceMember> {
        self.members.get(slot)
    }

    pub fn key(&self) -> &BatchKey {
        &self.key
    }

    pub fn geometry(&self) -> &Rc<CrystalGeometry> {
        &self.geometry
    }

    pub fn material(&self) -> &Rc<CrystalMaterial> {
        &self.material
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn visible_count(&self) -> usize {
        self.members.iter().filter(|m| m.visible).count()
    }

    /// Triangles submitted by this batch's draw call.
    pub fn triangle_count(&self) -> usize {
        self.geometry.triangle_count() * self.visible_count()
    }

    pub fn set_emissive_pulse(&mut self, pulse: f32) {
        self.emissive_pulse = pulse;
    }

    pub fn emissive_pulse(&self) -> f32 {
        self.emissive_pulse
    }

    /// Effective emissive intensity for this frame's batch uniform.
    pub fn emissive_intensity(&self) -> f32 {
        self.material.emissive_intensity * self.emissive_pulse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{GeometryKey, MaterialKey};

    fn batch(n: usize) -> InstancedBatch {
        let gk = GeometryKey::quantized("rock", 1.0, 0.5);
        let mk = MaterialKey::quantized("rock", [0.5, 0.5, 0.5], 0.5, 4);
        let geometry = Rc::new(CrystalGeometry::bipyramid(gk.clone(), 1.0, 6));
        let material = Rc::new(CrystalMaterial::from_key(mk.clone(), 4));
        let mut b = InstancedBatch::new(
            BatchKey {
                geometry: gk,
                material: mk,
            },
            geometry,
            material,
            n,
            1.5,
        );
        for i in 0..n {
            b.push(InstanceMember {
                id: ObjectId::new(format!("t{i}")),
                position: Vec3::new(i as f32, 0.0, 0.0),
                rotation: Quat::IDENTITY,
                scale: 1.0,
                color: [0.5, 0.5, 0.5],
                visible: true,
                highlighted: false,
            });
        }
        b
    }

    #[test]
    fn test_instance_data_layout() {
        assert_eq!(std::mem::size_of::<InstanceData>(), 80);
        let b = batch(3);
        assert_eq!(b.instance_bytes().len(), 240);
    }

    #[test]
    fn test_push_marks_dirty() {
        let mut b = batch(4);
        assert_eq!(b.take_dirty(), Some(0..4));
        assert_eq!(b.take_dirty(), None);
    }

    #[test]
    fn test_highlight_touches_one_slot() {
        let mut b = batch(5);
        b.take_dirty();
        let before = b.instances().to_vec();
        assert!(b.set_highlight(2, true));
        assert!(!b.set_highlight(2, true));
        assert_eq!(b.take_dirty(), Some(2..3));
        for (slot, (old, new)) in before.iter().zip(b.instances()).enumerate() {
            assert_eq!(old == new, slot != 2);
        }
        let scale = b.instances()[2].transform().to_scale_rotation_translation().0;
        assert!((scale.x - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_hidden_instance_collapses() {
        let mut b = batch(2);
        assert!(b.set_visible(1, false));
        assert_eq!(b.visible_count(), 1);
        assert_eq!(b.instances()[1].transform().x_axis.x, 0.0);
        assert_eq!(b.triangle_count(), 12);
        assert!(!b.set_visible(9, false));
    }

    #[test]
    fn test_emissive_pulse() {
        let mut b = batch(1);
        let base = b.emissive_intensity();
        b.set_emissive_pulse(0.5);
        assert!((b.emissive_intensity() - base * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_swap_remove_moves_last_into_gap() {
        let mut b = batch(4);
        b.take_dirty();
        let (removed, moved) = b.swap_remove(1).unwrap();
        assert_eq!(removed.id, ObjectId::new("t1"));
        assert_eq!(moved, Some(ObjectId::new("t3")));
        assert_eq!(b.len(), 3);
        assert_eq!(b.member(1).unwrap().id, ObjectId::new("t3"));
        assert_eq!(b.instance_bytes().len(), 3 * 80);
        assert_eq!(b.take_dirty(), Some(1..2));
    }

    #[test]
    fn test_swap_remove_last_slot_leaves_nothing_dirty() {
        let mut b = batch(2);
        let (_, moved) = b.swap_remove(1).unwrap();
        assert_eq!(moved, None);
        assert_eq!(b.take_dirty(), Some(0..1));
        assert!(b.swap_remove(5).is_none());
    }
}
