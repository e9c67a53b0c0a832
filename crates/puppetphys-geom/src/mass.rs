use puppetphys_core::types::{Mat3, Vec3};
use crate::Shape;

#[derive(Copy, Clone, Debug)]
pub struct MassProps {
    pub mass: f32,
    pub inv_mass: f32,
    pub inertia: Mat3,
}

impl MassProps {
    pub fn infinite() -> Self {
        Self { mass: f32::INFINITY, inv_mass: 0.0, inertia: Mat3::IDENTITY }
    }

    /// Inertia for a solid sphere of the given total mass.
    pub fn from_sphere(radius: f32, mass: f32) -> Self {
        let ii = 0.4 * mass * radius * radius;
        Self { mass, inv_mass: 1.0 / mass, inertia: Mat3::from_diagonal(Vec3::splat(ii).into()) }
    }

    pub fn from_box(half: Vec3, mass: f32) -> Self {
        let dims = half * 2.0;
        let x2 = dims.x * dims.x;
        let y2 = dims.y * dims.y;
        let z2 = dims.z * dims.z;
        let ix = (1.0 / 12.0) * mass * (y2 + z2);
        let iy = (1.0 / 12.0) * mass * (x2 + z2);
        let iz = (1.0 / 12.0) * mass * (x2 + y2);
        Self { mass, inv_mass: 1.0 / mass, inertia: Mat3::from_diagonal(Vec3::new(ix, iy, iz).into()) }
    }

    /// Capsule treated as a cylinder of height 2*half_h capped by a sphere,
    /// with the given total mass.
    pub fn from_capsule(radius: f32, half_h: f32, mass: f32) -> Self {
        let h = half_h * 2.0;
        let ix = 0.25 * mass * radius * radius + (1.0 / 12.0) * mass * h * h;
        let iy = 0.5 * mass * radius * radius;
        let iz = ix;
        Self { mass, inv_mass: 1.0 / mass, inertia: Mat3::from_diagonal(Vec3::new(ix, iy, iz).into()) }
    }

    pub fn for_shape(shape: &Shape, mass: f32) -> Self {
        match *shape {
            Shape::Sphere { r } => Self::from_sphere(r, mass),
            Shape::Box { hx, hy, hz } => Self::from_box(Vec3::new(hx, hy, hz), mass),
            Shape::Capsule { r, hh } => Self::from_capsule(r, hh, mass),
        }
    }
}
