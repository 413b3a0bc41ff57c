use crate::{Mat4, Vec3};

/// Fixed perspective camera (right-handed) used to look at loaded meshes.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_rad: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub aspect: f32,
}

impl Camera {
    /// Place the camera on +Z so that the box `min..max` fills the view.
    pub fn framing(min: [f32; 3], max: [f32; 3], aspect: f32) -> Self {
        let min = Vec3::from(min);
        let max = Vec3::from(max);
        let center = (min + max) * 0.5;
        let mut radius = (max - min).length() * 0.5;
        if !radius.is_finite() || radius < 1e-6 {
            radius = 1.0;
        }
        let fov_y_rad = 45f32.to_radians();
        let distance = radius / (fov_y_rad * 0.5).sin();
        Self {
            eye: center + Vec3::Z * distance,
            target: center,
            up: Vec3::Y,
            fov_y_rad,
            z_near: (distance - radius).max(distance * 0.01),
            z_far: distance + radius * 2.0,
            aspect,
        }
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// wgpu-style projection (z in [0,1]).
    #[inline]
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_rad,
            self.aspect.max(1e-6),
            self.z_near,
            self.z_far,
        )
    }

    #[inline]
    pub fn proj_view(&self) -> Mat4 {
        self.proj() * self.view()
    }

    #[inline]
    pub fn with_aspect(mut self, aspect: f32) -> Self {
        self.aspect = aspect;
        self
    }
}
