//! Batch/resource manager: pooled crystal resources and instanced batches.

use std::collections::BTreeMap;
use std::f32::consts::TAU;
use std::ops::Range;
use std::rc::Rc;

use crystal_config::BatchConfig;
use crystal_scene::{CrystalRecord, ObjectId};
use glam::Vec3;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::instancing::{InstanceMember, InstancedBatch};
use crate::pool::{PoolStats, ResourcePool};
use crate::resources::{BatchKey, CrystalGeometry, CrystalMaterial, GeometryKey, MaterialKey};

/// Amplitude of the per-batch emissive pulse.
const PULSE_AMPLITUDE: f32 = 0.15;
/// Phase offset between consecutive batches, in radians.
const PULSE_PHASE_STEP: f32 = 0.7;

/// Where an object's instance lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceSlot {
    pub batch: usize,
    pub slot: usize,
}

/// Instance slots of one batch that need re-uploading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirtyRange {
    pub batch: usize,
    pub slots: Range<usize>,
}

/// Entries dropped by [`BatchManager::optimize_resources`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimStats {
    pub geometries: usize,
    pub materials: usize,
}

impl ReclaimStats {
    pub fn total(&self) -> usize {
        self.geometries + self.materials
    }
}

/// Geometry and material pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResourceStats {
    pub geometries: PoolStats,
    pub materials: PoolStats,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub batches: usize,
    pub instances: usize,
    pub visible_instances: usize,
    /// One per batch with at least one visible instance.
    pub draw_calls: usize,
    pub triangles: u64,
    pub resources: ResourceStats,
}

/// Pools geometries and materials by composite key and groups crystals that
/// share both into one [`InstancedBatch`].
///
/// Per-object changes (highlight, visibility) touch only the owning batch's
/// slot. Pooled entries stay alive until [`optimize_resources`](Self::optimize_resources)
/// finds them unreferenced.
pub struct BatchManager {
    config: BatchConfig,
    geometries: ResourcePool<GeometryKey, CrystalGeometry>,
    materials: ResourcePool<MaterialKey, CrystalMaterial>,
    batches: Vec<InstancedBatch>,
    batch_index: FxHashMap<BatchKey, usize>,
    slots: FxHashMap<ObjectId, InstanceSlot>,
}

impl BatchManager {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config: config.sanitized(),
            geometries: ResourcePool::new(),
            materials: ResourcePool::new(),
            batches: Vec::new(),
            batch_index: FxHashMap::default(),
            slots: FxHashMap::default(),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn geometry_key(&self, category: &str, size: f32) -> GeometryKey {
        GeometryKey::quantized(category, size, self.config.size_quantum)
    }

    pub fn material_key(&self, category: &str, color: [f32; 3], importance: f32) -> MaterialKey {
        MaterialKey::quantized(category, color, importance, self.config.importance_buckets)
    }

    /// Build geometry for every category and size up front. Returns the number created.
    pub fn preload_geometries<S: AsRef<str>>(&mut self, categories: &[S], sizes: &[f32]) -> usize {
        let before = self.geometries.len();
        for category in categories {
            for &size in sizes {
                let key = self.geometry_key(category.as_ref(), size);
                self.geometry_for_key(key);
            }
        }
        let created = self.geometries.len() - before;
        debug!(created, "preloaded geometries");
        created
    }

    /// Build a material for every category, color, and importance bucket. Returns the number created.
    pub fn preload_materials<S: AsRef<str>>(&mut self, categories: &[S], colors: &[[f32; 3]]) -> usize {
        let before = self.materials.len();
        let buckets = self.config.importance_buckets;
        for category in categories {
            for &color in colors {
                for bucket in 0..buckets {
                    let importance = if buckets > 1 {
                        f32::from(bucket) / f32::from(buckets - 1)
                    } else {
                        1.0
                    };
                    let key = self.material_key(category.as_ref(), color, importance);
                    self.material_for_key(key);
                }
            }
        }
        let created = self.materials.len() - before;
        debug!(created, "preloaded materials");
        created
    }

    /// Shared geometry for a category and size; built on first request.
    pub fn get_geometry(&mut self, category: &str, size: f32) -> Rc<CrystalGeometry> {
        let key = self.geometry_key(category, size);
        self.geometry_for_key(key)
    }

    /// Shared material for a category, color, and importance; built on first request.
    pub fn get_material(&mut self, category: &str, color: [f32; 3], importance: f32) -> Rc<CrystalMaterial> {
        let key = self.material_key(category, color, importance);
        self.material_for_key(key)
    }

    fn geometry_for_key(&mut self, key: GeometryKey) -> Rc<CrystalGeometry> {
        let quantum = self.config.size_quantum;
        let sides = self.config.crystal_sides;
        self.geometries
            .get_or_create(key, |k| CrystalGeometry::bipyramid(k.clone(), k.size(quantum), sides))
    }

    fn material_for_key(&mut self, key: MaterialKey) -> Rc<CrystalMaterial> {
        let buckets = self.config.importance_buckets;
        self.materials
            .get_or_create(key, |k| CrystalMaterial::from_key(k.clone(), buckets))
    }

    /// Partition `records` into batches by resolved geometry and material key
    /// and write one instance per record. Records whose id already has an
    /// instance are skipped. Returns the number of instances created.
    ///
    /// Records landing in an existing batch are appended to it; other batches
    /// are left untouched.
    pub fn create_instanced_objects(
        &mut self,
        records: &[CrystalRecord],
        geometry_key: impl Fn(&CrystalRecord) -> GeometryKey,
        material_key: impl Fn(&CrystalRecord) -> MaterialKey,
    ) -> usize {
        let mut groups: BTreeMap<BatchKey, Vec<&CrystalRecord>> = BTreeMap::new();
        let mut seen = FxHashSet::default();
        for record in records {
            if self.slots.contains_key(&record.id) || !seen.insert(record.id.clone()) {
                warn!(id = %record.id, "duplicate crystal id, skipping");
                continue;
            }
            let key = BatchKey {
                geometry: geometry_key(record),
                material: material_key(record),
            };
            groups.entry(key).or_default().push(record);
        }

        let mut created = 0;
        for (key, members) in groups {
            let geometry = self.geometry_for_key(key.geometry.clone());
            let batch = match self.batch_index.get(&key) {
                Some(&batch) => batch,
                None => {
                    let material = self.material_for_key(key.material.clone());
                    let batch = self.batches.len();
                    self.batches.push(InstancedBatch::new(
                        key.clone(),
                        Rc::clone(&geometry),
                        material,
                        members.len(),
                        self.config.highlight_scale,
                    ));
                    self.batch_index.insert(key, batch);
                    batch
                }
            };
            for record in members {
                let scale = if geometry.size > 0.0 {
                    record.size.max(0.0) / geometry.size
                } else {
                    0.0
                };
                let slot = self.batches[batch].push(InstanceMember {
                    id: record.id.clone(),
                    position: record.position,
                    rotation: record.rotation,
                    scale,
                    color: record.color,
                    visible: true,
                    highlighted: false,
                });
                self.slots.insert(record.id.clone(), InstanceSlot { batch, slot });
                created += 1;
            }
        }
        info!(
            instances = created,
            batches = self.batches.len(),
            "built instanced batches"
        );
        created
    }

    /// [`create_instanced_objects`](Self::create_instanced_objects) keyed by
    /// category and size for geometry, and category, color, and importance for materials.
    pub fn create_instanced_objects_default(&mut self, records: &[CrystalRecord]) -> usize {
        let quantum = self.config.size_quantum;
        let buckets = self.config.importance_buckets;
        self.create_instanced_objects(
            records,
            |r| GeometryKey::quantized(&r.category, r.size, quantum),
            |r| MaterialKey::quantized(&r.category, r.color, r.importance, buckets),
        )
    }

    /// Returns `false` if the id has no instance or nothing changed.
    pub fn update_instance_highlight(&mut self, id: &ObjectId, highlighted: bool) -> bool {
        match self.slots.get(id) {
            Some(s) => self.batches[s.batch].set_highlight(s.slot, highlighted),
            None => false,
        }
    }

    /// Returns `false` if the id has no instance or nothing changed.
    pub fn set_instance_visible(&mut self, id: &ObjectId, visible: bool) -> bool {
        match self.slots.get(id) {
            Some(s) => self.batches[s.batch].set_visible(s.slot, visible),
            None => false,
        }
    }

    /// Drop the instance owned by `id`. Only its batch is touched: the last
    /// member of that batch fills the vacated slot. Returns `false` if the id
    /// has no instance.
    pub fn remove_instance(&mut self, id: &ObjectId) -> bool {
        let Some(InstanceSlot { batch, slot }) = self.slots.remove(id) else {
            return false;
        };
        if let Some((_, Some(moved))) = self.batches[batch].swap_remove(slot)
            && let Some(entry) = self.slots.get_mut(&moved)
        {
            entry.slot = slot;
        }
        debug!(%id, batch, slot, "removed instance");
        true
    }

    pub fn slot_of(&self, id: &ObjectId) -> Option<InstanceSlot> {
        self.slots.get(id).copied()
    }

    pub fn member(&self, id: &ObjectId) -> Option<&InstanceMember> {
        let s = self.slots.get(id)?;
        self.batches[s.batch].member(s.slot)
    }

    /// Nearest visible instance within `tolerance` of `position`.
    pub fn get_track_at_position(&self, position: Vec3, tolerance: f32) -> Option<ObjectId> {
        let tolerance_sq = tolerance.max(0.0).powi(2);
        self.visible_members()
            .map(|m| (m.position.distance_squared(position), m))
            .filter(|(d, _)| *d <= tolerance_sq)
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, m)| m.id.clone())
    }

    /// Ids of visible instances within `radius` of `center`, sorted.
    pub fn get_tracks_in_radius(&self, center: Vec3, radius: f32) -> Vec<ObjectId> {
        let radius_sq = radius.max(0.0).powi(2);
        let mut ids: Vec<ObjectId> = self
            .visible_members()
            .filter(|m| m.position.distance_squared(center) <= radius_sq)
            .map(|m| m.id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn visible_members(&self) -> impl Iterator<Item = &InstanceMember> {
        self.batches
            .iter()
            .flat_map(|b| b.members())
            .filter(|m| m.visible)
    }

    /// Drop pooled geometries and materials no batch or caller still holds.
    pub fn optimize_resources(&mut self) -> ReclaimStats {
        let reclaimed = ReclaimStats {
            geometries: self.geometries.reclaim_unused(),
            materials: self.materials.reclaim_unused(),
        };
        if reclaimed.total() > 0 {
            info!(
                geometries = reclaimed.geometries,
                materials = reclaimed.materials,
                "reclaimed unused resources"
            );
        }
        reclaimed
    }

    /// Advance the per-batch emissive pulse to `time_s`.
    pub fn animate(&mut self, time_s: f64) {
        let hz = f64::from(self.config.pulse_hz);
        if hz <= 0.0 {
            return;
        }
        let phase = ((time_s * hz).fract() as f32) * TAU;
        for (i, batch) in self.batches.iter_mut().enumerate() {
            let offset = i as f32 * PULSE_PHASE_STEP;
            batch.set_emissive_pulse(1.0 + PULSE_AMPLITUDE * (phase + offset).sin());
        }
    }

    /// Dirty slot ranges across all batches; clears them.
    pub fn drain_dirty(&mut self) -> Vec<DirtyRange> {
        self.batches
            .iter_mut()
            .enumerate()
            .filter_map(|(batch, b)| b.take_dirty().map(|slots| DirtyRange { batch, slots }))
            .collect()
    }

    pub fn batches(&self) -> &[InstancedBatch] {
        &self.batches
    }

    pub fn instance_count(&self) -> usize {
        self.slots.len()
    }

    pub fn pool_stats(&self) -> ResourceStats {
        ResourceStats {
            geometries: self.geometries.stats(),
            materials: self.materials.stats(),
        }
    }

    pub fn stats(&self) -> BatchStats {
        let mut stats = BatchStats {
            batches: self.batches.len(),
            instances: self.slots.len(),
            resources: self.pool_stats(),
            ..BatchStats::default()
        };
        for batch in &self.batches {
            let visible = batch.visible_count();
            stats.visible_instances += visible;
            if visible > 0 {
                stats.draw_calls += 1;
            }
            stats.triangles += batch.triangle_count() as u64;
        }
        stats
    }

    /// Release every batch and pooled resource.
    pub fn dispose(&mut self) {
        self.batches.clear();
        self.batch_index.clear();
        self.slots.clear();
        self.geometries = ResourcePool::new();
        self.materials = ResourcePool::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_scene::NodeId;
    use glam::Quat;

    fn record(id: &str, category: &str, x: f32, size: f32) -> CrystalRecord {
        CrystalRecord {
            id: ObjectId::new(id),
            node: NodeId(0),
            category: category.to_string(),
            position: Vec3::new(x, 0.0, 0.0),
            rotation: Quat::IDENTITY,
            size,
            color: [0.2, 0.4, 0.8],
            importance: 0.5,
        }
    }

    fn manager() -> BatchManager {
        BatchManager::new(BatchConfig::default())
    }

    #[test]
    fn test_geometry_reuse() {
        let mut m = manager();
        let a = m.get_geometry("rock", 1.0);
        let b = m.get_geometry("rock", 1.1);
        let c = m.get_geometry("jazz", 1.0);
        let d = m.get_geometry("rock", 2.0);
        assert!(Rc::ptr_eq(&a, &b));
        assert!(!Rc::ptr_eq(&a, &c));
        assert!(!Rc::ptr_eq(&a, &d));
        let stats = m.pool_stats().geometries;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 3);
    }

    #[test]
    fn test_material_reuse() {
        let mut m = manager();
        let a = m.get_material("pop", [1.0, 0.0, 0.0], 0.9);
        let b = m.get_material("pop", [1.0, 0.0, 0.0], 1.0);
        let c = m.get_material("pop", [1.0, 0.0, 0.0], 0.0);
        assert!(Rc::ptr_eq(&a, &b));
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_preload() {
        let mut m = manager();
        assert_eq!(m.preload_geometries(&["rock", "pop"], &[0.5, 1.0, 1.1]), 4);
        assert_eq!(m.preload_materials(&["rock"], &[[1.0, 1.0, 1.0]]), 4);
        assert_eq!(m.preload_geometries(&["rock"], &[1.0]), 0);
    }

    #[test]
    fn test_batches_group_by_key() {
        let mut m = manager();
        let records = vec![
            record("a", "rock", 0.0, 1.0),
            record("b", "rock", 5.0, 1.0),
            record("c", "jazz", 10.0, 1.0),
            record("d", "rock", 15.0, 3.0),
        ];
        assert_eq!(m.create_instanced_objects_default(&records), 4);
        let stats = m.stats();
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.instances, 4);
        let a = m.slot_of(&ObjectId::new("a")).unwrap();
        let b = m.slot_of(&ObjectId::new("b")).unwrap();
        assert_eq!(a.batch, b.batch);
        assert_ne!(a.slot, b.slot);
    }

    #[test]
    fn test_duplicate_ids_skipped() {
        let mut m = manager();
        let records = vec![record("a", "rock", 0.0, 1.0), record("a", "rock", 1.0, 1.0)];
        assert_eq!(m.create_instanced_objects_default(&records), 1);
        assert_eq!(m.create_instanced_objects_default(&records), 0);
        assert_eq!(m.instance_count(), 1);
    }

    #[test]
    fn test_highlight_touches_only_owning_batch() {
        let mut m = manager();
        let records = vec![
            record("a", "rock", 0.0, 1.0),
            record("b", "rock", 5.0, 1.0),
            record("c", "jazz", 10.0, 1.0),
        ];
        m.create_instanced_objects_default(&records);
        m.drain_dirty();

        assert!(m.update_instance_highlight(&ObjectId::new("b"), true));
        let dirty = m.drain_dirty();
        let b = m.slot_of(&ObjectId::new("b")).unwrap();
        assert_eq!(
            dirty,
            vec![DirtyRange {
                batch: b.batch,
                slots: b.slot..b.slot + 1
            }]
        );
        assert!(m.member(&ObjectId::new("b")).unwrap().highlighted);
        assert!(!m.update_instance_highlight(&ObjectId::new("missing"), true));
    }

    #[test]
    fn test_remove_instance_touches_only_owning_batch() {
        let mut m = manager();
        m.create_instanced_objects_default(&[
            record("a", "rock", 0.0, 1.0),
            record("b", "rock", 5.0, 1.0),
            record("c", "rock", 8.0, 1.0),
            record("d", "jazz", 10.0, 1.0),
        ]);
        m.drain_dirty();
        let a = m.slot_of(&ObjectId::new("a")).unwrap();

        assert!(m.remove_instance(&ObjectId::new("a")));
        assert!(!m.remove_instance(&ObjectId::new("a")));
        assert_eq!(m.instance_count(), 3);
        assert_eq!(m.slot_of(&ObjectId::new("a")), None);
        assert_eq!(m.slot_of(&ObjectId::new("c")), Some(a));
        assert_eq!(m.member(&ObjectId::new("c")).unwrap().position.x, 8.0);
        assert_eq!(
            m.drain_dirty(),
            vec![DirtyRange {
                batch: a.batch,
                slots: a.slot..a.slot + 1
            }]
        );
        assert_eq!(m.get_track_at_position(Vec3::ZERO, 1.0), None);
    }

    #[test]
    fn test_emptied_batch_stops_drawing() {
        let mut m = manager();
        m.create_instanced_objects_default(&[record("a", "rock", 0.0, 1.0), record("d", "jazz", 10.0, 1.0)]);
        m.remove_instance(&ObjectId::new("d"));
        let stats = m.stats();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.instances, 1);
    }

    #[test]
    fn test_hidden_instances_leave_draw_calls() {
        let mut m = manager();
        m.create_instanced_objects_default(&[record("a", "rock", 0.0, 1.0), record("c", "jazz", 10.0, 1.0)]);
        assert!(m.set_instance_visible(&ObjectId::new("c"), false));
        let stats = m.stats();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.visible_instances, 1);
        assert_eq!(m.get_track_at_position(Vec3::new(10.0, 0.0, 0.0), 1.0), None);
    }

    #[test]
    fn test_spatial_lookups() {
        let mut m = manager();
        m.create_instanced_objects_default(&[
            record("a", "rock", 0.0, 1.0),
            record("b", "jazz", 3.0, 1.0),
            record("c", "pop", 50.0, 1.0),
        ]);
        assert_eq!(
            m.get_track_at_position(Vec3::new(2.0, 0.0, 0.0), 2.0),
            Some(ObjectId::new("b"))
        );
        assert_eq!(m.get_track_at_position(Vec3::new(25.0, 0.0, 0.0), 2.0), None);
        assert_eq!(
            m.get_tracks_in_radius(Vec3::ZERO, 5.0),
            vec![ObjectId::new("a"), ObjectId::new("b")]
        );
    }

    #[test]
    fn test_optimize_resources_keeps_used_entries() {
        let mut m = manager();
        m.preload_geometries(&["rock", "pop"], &[1.0]);
        m.create_instanced_objects_default(&[record("a", "rock", 0.0, 1.0)]);
        let held = m.get_material("jazz", [1.0, 1.0, 1.0], 0.0);
        let reclaimed = m.optimize_resources();
        assert_eq!(reclaimed.geometries, 1);
        assert_eq!(reclaimed.materials, 0);
        assert_eq!(m.pool_stats().geometries.entries, 1);
        drop(held);
        assert_eq!(m.optimize_resources().materials, 1);
        assert_eq!(m.optimize_resources().total(), 0);
    }

    #[test]
    fn test_instance_scale_relative_to_geometry() {
        let mut m = manager();
        m.create_instanced_objects_default(&[record("a", "rock", 0.0, 1.2)]);
        let member = m.member(&ObjectId::new("a")).unwrap();
        assert!((member.scale - 1.2).abs() < 1e-5);
    }

    #[test]
    fn test_animate_pulses_per_batch() {
        let mut m = manager();
        m.create_instanced_objects_default(&[record("a", "rock", 0.0, 1.0), record("c", "jazz", 10.0, 1.0)]);
        m.animate(1.0);
        let pulses: Vec<f32> = m.batches().iter().map(|b| b.emissive_pulse()).collect();
        assert!(pulses.iter().all(|p| (p - 1.0).abs() <= PULSE_AMPLITUDE + 1e-6));
        assert_ne!(pulses[0], pulses[1]);
    }

    #[test]
    fn test_dispose() {
        let mut m = manager();
        m.create_instanced_objects_default(&[record("a", "rock", 0.0, 1.0)]);
        m.dispose();
        assert_eq!(m.stats(), BatchStats::default());
    }
}
