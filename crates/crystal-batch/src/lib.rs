//! Shared geometry/material pools and instanced crystal batches.
//!
//! Crystals that resolve to the same geometry and material key are drawn by a
//! single [`InstancedBatch`]. Pools hand out reference-counted resources keyed
//! by composite keys; unused entries are reclaimed only when
//! [`BatchManager::optimize_resources`] is called.

mod instancing;
mod manager;
mod pool;
mod resources;

pub use instancing::{InstanceData, InstanceMember, InstancedBatch};
pub use manager::{BatchManager, BatchStats, DirtyRange, InstanceSlot, ReclaimStats, ResourceStats};
pub use pool::{PoolStats, ResourcePool};
pub use resources::{BatchKey, CrystalGeometry, CrystalMaterial, GeometryKey, MaterialKey};
