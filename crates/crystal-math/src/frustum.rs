//! View-frustum extraction and conservative intersection tests.

use glam::{Mat4, Vec3, Vec4};

use crate::{Aabb, BoundingSphere};

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// A view frustum defined by six inward-pointing planes extracted from
/// the view-projection matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    /// Six planes: left, right, bottom, top, near, far.
    /// Each `Vec4(a, b, c, d)` where `(a,b,c)` is the normalized inward
    /// normal and `d` is the signed distance term.
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a combined view-projection matrix
    /// using the Griggs-Hartmann method.
    ///
    /// The near plane is taken as `row3 + row2` (clip `z >= -w`). For `[0, 1]`
    /// depth ranges and reverse-Z this encloses the true near/far volume, so
    /// the planes err on the side of keeping objects.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Vec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        planes[NEAR] = rows[3] + rows[2];
        planes[FAR] = rows[3] - rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Build the frustum from a camera's projection and world-inverse (view) matrices.
    pub fn from_camera(projection: &Mat4, world_inverse: &Mat4) -> Self {
        Self::from_view_projection(&(*projection * *world_inverse))
    }

    /// The six normalized planes.
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// Returns true if the sphere is at least partially inside the frustum.
    ///
    /// May return `true` for spheres just outside a frustum corner, never
    /// `false` for an intersecting sphere.
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(sphere.center) + plane.w >= -sphere.radius)
    }

    /// Test whether an AABB is at least partially inside the frustum,
    /// using the positive-vertex method.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            let normal = plane.truncate();
            let p = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            if normal.dot(p) + plane.w < 0.0 {
                return false;
            }
        }
        true
    }

    /// Returns true if the point is inside (or on) every plane.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};

    fn default_camera_vp() -> Mat4 {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 1000.0);
        proj * view
    }

    #[test]
    fn test_sphere_in_front_visible() {
        let f = Frustum::from_view_projection(&default_camera_vp());
        assert!(f.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0)));
    }

    #[test]
    fn test_sphere_behind_camera_not_visible() {
        let f = Frustum::from_view_projection(&default_camera_vp());
        assert!(!f.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, 20.0), 1.0)));
    }

    #[test]
    fn test_sphere_straddling_side_plane_visible() {
        let f = Frustum::from_view_projection(&default_camera_vp());
        // Center just outside the right plane, radius reaches back in.
        let center = Vec3::new(20.0, 0.0, -20.0);
        assert!(!f.contains_point(center));
        assert!(f.intersects_sphere(&BoundingSphere::new(center, 8.0)));
        assert!(!f.intersects_sphere(&BoundingSphere::new(center, 0.5)));
    }

    #[test]
    fn test_sphere_beyond_far_plane_not_visible() {
        let f = Frustum::from_view_projection(&default_camera_vp());
        assert!(!f.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, -1500.0), 10.0)));
    }

    #[test]
    fn test_aabb_all_six_planes_tested() {
        let f = Frustum::from_view_projection(&default_camera_vp());

        let inside = Aabb::new(Vec3::new(-1.0, -1.0, -5.0), Vec3::new(1.0, 1.0, -3.0));
        assert!(f.intersects_aabb(&inside));

        let behind = Aabb::new(Vec3::splat(10.0), Vec3::splat(20.0));
        assert!(!f.intersects_aabb(&behind));

        let left = Aabb::new(Vec3::new(-1000.0, 0.0, -5.0), Vec3::new(-999.0, 1.0, -4.0));
        assert!(!f.intersects_aabb(&left));

        let above = Aabb::new(Vec3::new(0.0, 999.0, -5.0), Vec3::new(1.0, 1000.0, -4.0));
        assert!(!f.intersects_aabb(&above));

        let beyond_far = Aabb::new(Vec3::new(0.0, 0.0, -2000.0), Vec3::new(1.0, 1.0, -1500.0));
        assert!(!f.intersects_aabb(&beyond_far));
    }

    #[test]
    fn test_from_camera_matches_view_projection() {
        let view = Mat4::look_at_rh(Vec3::new(5.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(1.0, 1.5, 0.5, 500.0);
        let a = Frustum::from_camera(&proj, &view);
        let b = Frustum::from_view_projection(&(proj * view));
        assert_eq!(a, b);
    }

    #[test]
    fn test_planes_normalized() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        for plane in frustum.planes() {
            let normal_len = plane.truncate().length();
            assert!(
                (normal_len - 1.0).abs() < 1e-4,
                "plane normal not normalized: {normal_len}"
            );
        }
    }
}
