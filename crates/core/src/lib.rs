//! Core shared types and errors (renderer-agnostic).

pub use glam::{Mat4, Vec3, vec3};

pub mod camera;
pub mod error;

pub use error::{CoreError, CoreResult};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_camera_pv_is_finite() {
        let cam = camera::Camera::framing([-1.0, -1.0, -1.0], [1.0, 2.0, 1.0], 16.0 / 9.0);
        let a = cam.proj_view().to_cols_array();
        assert!(a.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn framing_degenerate_bounds_falls_back_to_unit_radius() {
        let cam = camera::Camera::framing([0.0; 3], [0.0; 3], 1.0);
        assert!(cam.eye.z > cam.target.z);
        assert!(cam.z_far > cam.z_near);
    }
}
