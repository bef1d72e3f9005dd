//! Bounding volumes and view-frustum tests used by the crystal culling pipeline.

mod aabb;
mod frustum;
mod sphere;

pub use aabb::Aabb;
pub use frustum::Frustum;
pub use sphere::BoundingSphere;
