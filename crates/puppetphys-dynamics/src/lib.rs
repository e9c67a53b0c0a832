use puppetphys_core::types::{Isometry, Velocity, Vec3};
use puppetphys_core::{Scalar, Quat};
use glam::Mat3A;

/// Input descriptor when creating a body.
#[derive(Copy, Clone, Debug)]
pub struct BodyDesc {
    pub pose: Isometry,
    pub vel: Velocity,
    pub inv_mass: Scalar,
    pub inv_inertia_local: Mat3A,
    pub dynamic: bool,
}

/// SoA body storage with deterministic ID = index semantics.
#[derive(Debug)]
pub struct Bodies {
    pos: Vec<Vec3>,
    rot: Vec<Quat>,
    linvel: Vec<Vec3>,
    angvel: Vec<Vec3>,
    inv_mass: Vec<Scalar>,
    dynamic: Vec<bool>,
    inv_inertia_local: Vec<Mat3A>,
}

impl Bodies {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            pos: Vec::with_capacity(cap),
            rot: Vec::with_capacity(cap),
            linvel: Vec::with_capacity(cap),
            angvel: Vec::with_capacity(cap),
            inv_mass: Vec::with_capacity(cap),
            dynamic: Vec::with_capacity(cap),
            inv_inertia_local: Vec::with_capacity(cap),
        }
    }

    pub fn add(&mut self, desc: BodyDesc) -> u32 {
        self.pos.push(desc.pose.pos);
        self.rot.push(desc.pose.rot);
        self.linvel.push(desc.vel.lin);
        self.angvel.push(desc.vel.ang);
        self.inv_mass.push(desc.inv_mass);
        self.dynamic.push(desc.dynamic);
        self.inv_inertia_local.push(desc.inv_inertia_local);
        (self.pos.len() as u32) - 1
    }

    #[inline] pub fn len(&self) -> usize { self.pos.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.pos.is_empty() }

    /// Semi-implicit Euler: gravity into linear velocity, then advance both
    /// position and orientation. Orientation uses the small-angle quaternion
    /// for w*dt, which stays stable at fixed 60 Hz ticks.
    pub fn integrate_all(&mut self, gravity: Vec3, dt: Scalar) {
        for i in 0..self.len() {
            if !self.dynamic[i] || self.inv_mass[i] == 0.0 { continue; }
            self.linvel[i] += gravity * dt;
            self.pos[i] += self.linvel[i] * dt;
            let dtheta = self.angvel[i] * dt;
            if dtheta.length_squared() > 0.0 {
                let dq = Quat::from_xyzw(dtheta.x * 0.5, dtheta.y * 0.5, dtheta.z * 0.5, 1.0).normalize();
                self.rot[i] = (dq * self.rot[i]).normalize();
            }
        }
    }

    // -------- Accessors --------
    #[inline] pub fn pose(&self, id: u32) -> Isometry {
        let i = id as usize;
        Isometry { pos: self.pos[i], rot: self.rot[i] }
    }
    #[inline] pub fn set_pose(&mut self, id: u32, iso: Isometry) {
        let i = id as usize;
        self.pos[i] = iso.pos;
        self.rot[i] = iso.rot;
    }

    #[inline] pub fn vel(&self, id: u32) -> Velocity {
        let i = id as usize;
        Velocity { lin: self.linvel[i], ang: self.angvel[i] }
    }
    #[inline] pub fn set_vel(&mut self, id: u32, v: Velocity) {
        let i = id as usize;
        self.linvel[i] = v.lin;
        self.angvel[i] = v.ang;
    }

    #[inline] pub fn inv_mass_of(&self, id: u32) -> Scalar { self.inv_mass[id as usize] }
    #[inline] pub fn is_dynamic(&self, id: u32) -> bool { self.dynamic[id as usize] }

    /// World-space inverse inertia: R * I^-1_local * R^T.
    pub fn inv_inertia_world(&self, id: u32) -> Mat3A {
        if self.inv_mass_of(id) == 0.0 { return Mat3A::ZERO; }
        let r = Mat3A::from_quat(self.rot[id as usize]);
        r * self.inv_inertia_local[id as usize] * r.transpose()
    }

    // -------- Impulses / deltas --------
    #[inline] pub fn apply_impulse(&mut self, id: u32, j: Vec3) {
        let i = id as usize;
        let im = self.inv_mass[i];
        if im != 0.0 { self.linvel[i] += j * im; }
    }

    /// Apply an angular impulse (world space): dw = I^-1_world * tau.
    pub fn apply_angular_impulse(&mut self, id: u32, tau_impulse: Vec3) {
        let i = id as usize;
        if self.inv_mass[i] == 0.0 { return; }
        let inv_i_w = self.inv_inertia_world(id);
        self.angvel[i] += inv_i_w * tau_impulse;
    }

    /// Apply an angular acceleration over dt: dw = alpha * dt. Joint drives
    /// use this so light and heavy parts respond to the same gains alike.
    pub fn apply_angular_accel(&mut self, id: u32, alpha: Vec3, dt: Scalar) {
        let i = id as usize;
        if self.inv_mass[i] == 0.0 { return; }
        self.angvel[i] += alpha * dt;
    }

    /// Linear impulse at a world-space point: the moment arm from the body
    /// center induces the matching angular impulse.
    pub fn apply_impulse_at_point(&mut self, id: u32, j: Vec3, point_world: Vec3) {
        let i = id as usize;
        if self.inv_mass[i] == 0.0 { return; }
        self.linvel[i] += j * self.inv_mass[i];
        let r = point_world - self.pos[i];
        let inv_i_w = self.inv_inertia_world(id);
        self.angvel[i] += inv_i_w * r.cross(j);
    }

    #[inline] pub fn apply_position_delta(&mut self, id: u32, dp: Vec3) {
        self.pos[id as usize] += dp;
    }

    /// Small-angle orientation correction (world space).
    pub fn apply_orientation_delta(&mut self, id: u32, dtheta_world: Vec3) {
        let i = id as usize;
        if dtheta_world.length_squared() <= 0.0 { return; }
        let dq = Quat::from_xyzw(dtheta_world.x * 0.5, dtheta_world.y * 0.5, dtheta_world.z * 0.5, 1.0).normalize();
        self.rot[i] = (dq * self.rot[i]).normalize();
    }

    // Iterator for hashing in stable order
    pub fn indices(&self) -> impl ExactSizeIterator<Item = u32> + '_ {
        0..(self.len() as u32)
    }
}

impl Default for Bodies {
    fn default() -> Self { Self::with_capacity(0) }
}
