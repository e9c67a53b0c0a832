use puppetphys_core::types::{Vec3, Mat3};
use glam::Quat;

#[derive(Copy, Clone, Debug)]
pub enum Shape {
    Sphere { r: f32 },
    Box { hx: f32, hy: f32, hz: f32 },
    Capsule { r: f32, hh: f32 }, // half-height along local Y
}

/// World-space vertical half-extent of a shape under rotation `rot`.
/// Used by the ground clamp and the support probes.
#[inline]
pub fn half_height_world(shape: &Shape, rot: Quat) -> f32 {
    match *shape {
        Shape::Sphere { r } => r,
        Shape::Box { hx, hy, hz } => {
            let he = Vec3::new(hx, hy, hz);
            let m = Mat3::from_quat(rot);
            let row_y = Vec3::new(m.x_axis.y.abs(), m.y_axis.y.abs(), m.z_axis.y.abs());
            row_y.dot(he)
        }
        Shape::Capsule { r, hh } => {
            let axis_world = rot * Vec3::Y * hh.abs();
            axis_world.y.abs() + r
        }
    }
}
