//! Fixed orbit camera.
//!
//! The camera sits at a fixed position looking down into the particle cloud;
//! the whole scene slowly revolves via a time-driven Y rotation folded into
//! the view-projection matrix.

use nalgebra::{Matrix4, Point3, Rotation3, Vector3};
use std::f32::consts::{FRAC_PI_3, FRAC_PI_4};

/// Scene rotation speed in radians per second.
const ORBIT_RATE: f32 = 0.04;

#[derive(Debug, Clone)]
pub struct Camera {
    position: Vector3<f32>,
    pitch: f32,
    yaw: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    pub fn new() -> Self {
        Self {
            position: Vector3::new(24.0, 24.0, 10.0),
            pitch: -FRAC_PI_4,
            yaw: 1.5 * FRAC_PI_4,
        }
    }

    /// View direction: pitch/yaw applied to -Z.
    pub fn direction(&self) -> Vector3<f32> {
        Vector3::new(
            -self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            -self.pitch.cos() * self.yaw.cos(),
        )
    }

    /// Camera-space right vector.
    pub fn right(&self) -> Vector3<f32> {
        self.direction().cross(&Vector3::y()).normalize()
    }

    /// Combined view-projection for this frame.
    ///
    /// `proj * view * rotY(ORBIT_RATE * time)`; perspective is a third-pi
    /// vertical field of view with a 0.1..100 depth range.
    pub fn view_proj(&self, time: f32, width: u32, height: u32) -> Matrix4<f32> {
        let eye = Point3::from(self.position);
        let target = Point3::from(self.position + self.direction());
        let view = Matrix4::look_at_rh(&eye, &target, &Vector3::y());
        let rot = Rotation3::from_axis_angle(&Vector3::y_axis(), time * ORBIT_RATE)
            .to_homogeneous();
        let aspect = width as f32 / height as f32;
        let proj = Matrix4::new_perspective(aspect, FRAC_PI_3, 0.1, 100.0);
        proj * view * rot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn direction_is_unit_length_and_points_into_the_scene() {
        let camera = Camera::new();
        let dir = camera.direction();
        assert_relative_eq!(dir.norm(), 1.0, epsilon = 1e-6);
        // Looking down and toward -X/-Z from (24, 24, 10).
        assert_relative_eq!(dir.y, -(std::f32::consts::FRAC_PI_4).sin(), epsilon = 1e-6);
        assert!(dir.x < 0.0 && dir.z < 0.0);
    }

    #[test]
    fn right_vector_is_horizontal() {
        let camera = Camera::new();
        let right = camera.right();
        assert_relative_eq!(right.norm(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(right.dot(&camera.direction()), 0.0, epsilon = 1e-6);
        assert_relative_eq!(right.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_time_omits_the_orbit() {
        let camera = Camera::new();
        let eye = Point3::new(24.0, 24.0, 10.0);
        let target = Point3::from(Vector3::new(24.0, 24.0, 10.0) + camera.direction());
        let view = Matrix4::look_at_rh(&eye, &target, &Vector3::y());
        let proj = Matrix4::new_perspective(1280.0 / 720.0, FRAC_PI_3, 0.1, 100.0);
        let expected = proj * view;
        let got = camera.view_proj(0.0, 1280, 720);
        assert_relative_eq!(got, expected, epsilon = 1e-5);
    }

    #[test]
    fn orbit_advances_with_time() {
        let camera = Camera::new();
        let a = camera.view_proj(0.0, 800, 600);
        let b = camera.view_proj(10.0, 800, 600);
        assert!((a - b).abs().max() > 1e-3);
        // Matrix entries stay finite.
        assert!(b.iter().all(|v| v.is_finite()));
    }
}
