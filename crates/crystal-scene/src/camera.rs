use crystal_math::Frustum;
use glam::{Mat4, Vec3};

/// Camera state sampled once per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    /// Projection matrix.
    pub projection: Mat4,
    /// World-inverse (view) matrix.
    pub world_inverse: Mat4,
    /// Camera position in world space.
    pub position: Vec3,
}

impl CameraPose {
    /// Right-handed perspective camera at `position` looking at `target`.
    ///
    /// `fov_y` is in radians.
    pub fn perspective_look_at(
        position: Vec3,
        target: Vec3,
        fov_y: f32,
        aspect_ratio: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            projection: Mat4::perspective_rh(fov_y, aspect_ratio, near, far),
            world_inverse: Mat4::look_at_rh(position, target, Vec3::Y),
            position,
        }
    }

    /// Combined view-projection matrix.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.world_inverse
    }

    /// Frustum planes for the current pose.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_camera(&self.projection, &self.world_inverse)
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::perspective_look_at(
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_4,
            16.0 / 9.0,
            0.1,
            10_000.0,
        )
    }
}
