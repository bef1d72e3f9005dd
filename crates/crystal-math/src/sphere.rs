use glam::{Mat4, Vec3};

use crate::Aabb;

/// A sphere guaranteed to enclose an object's geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    /// Center of the sphere.
    pub center: Vec3,
    /// Radius, never negative.
    pub radius: f32,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self::point(Vec3::ZERO)
    }
}

impl BoundingSphere {
    /// Create a sphere. Negative or NaN radii collapse to zero.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: if radius.is_finite() { radius.max(0.0) } else { 0.0 },
        }
    }

    /// A zero-extent sphere at `center`.
    pub fn point(center: Vec3) -> Self {
        Self {
            center,
            radius: 0.0,
        }
    }

    /// Sphere circumscribing an AABB.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self::new(aabb.center(), aabb.extents().length())
    }

    /// Apply a world transform. The radius grows by the largest axis scale so
    /// the result still encloses the transformed geometry under non-uniform scale.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let max_scale = matrix
            .x_axis
            .truncate()
            .length()
            .max(matrix.y_axis.truncate().length())
            .max(matrix.z_axis.truncate().length());
        Self::new(matrix.transform_point3(self.center), self.radius * max_scale)
    }

    /// Inflate the radius by `factor`. Factors below 1 are ignored.
    pub fn inflated(&self, factor: f32) -> Self {
        Self::new(self.center, self.radius * factor.max(1.0))
    }

    /// Distance from `point` to the sphere surface, 0 when inside.
    pub fn surface_distance(&self, point: Vec3) -> f32 {
        (self.center.distance(point) - self.radius).max(0.0)
    }

    /// Returns true if `point` lies inside or on the sphere.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.center.distance_squared(point) <= self.radius * self.radius
    }

    /// Returns true if the two spheres overlap (touching counts).
    pub fn intersects(&self, other: &BoundingSphere) -> bool {
        let r = self.radius + other.radius;
        self.center.distance_squared(other.center) <= r * r
    }
}
