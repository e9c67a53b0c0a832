use puppetphys_core::{Scalar, BodyId, JointId, Vec3};
use puppetphys_dynamics::Bodies;
use glam::Quat;
use serde::{Serialize, Deserialize};

/// Per-axis angular ranges for a ball joint, radians, in the parent's frame:
/// `twist` about local X, `swing_y`/`swing_z` about local Y/Z.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct BallLimits {
    pub twist: [Scalar; 2],
    pub swing_y: [Scalar; 2],
    pub swing_z: [Scalar; 2],
}

impl Default for BallLimits {
    fn default() -> Self {
        Self { twist: [-0.8, 0.8], swing_y: [-0.6, 0.6], swing_z: [-0.6, 0.6] }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct BallJoint {
    pub parent: BodyId,
    pub child: BodyId,
    pub anchor_p: Vec3, // local to parent
    pub anchor_c: Vec3, // local to child
    /// Child orientation relative to the parent at rest; limits bound the
    /// deviation from this, not the absolute relative rotation.
    pub rest_rel: Quat,
    pub limits: BallLimits,
}

#[derive(Copy, Clone, Debug)]
pub struct HingeJoint {
    pub parent: BodyId,
    pub child: BodyId,
    pub anchor_p: Vec3,
    pub anchor_c: Vec3,
    pub rest_rel: Quat,
    /// Rotation axis index in the parent's frame: 0 = X, 1 = Y, 2 = Z.
    pub axis: usize,
    pub limit: [Scalar; 2],
}

#[derive(Copy, Clone, Debug)]
pub enum Joint {
    Ball(BallJoint),
    Hinge(HingeJoint),
}

impl Joint {
    #[inline] pub fn parent(&self) -> BodyId {
        match self { Joint::Ball(j) => j.parent, Joint::Hinge(j) => j.parent }
    }
    #[inline] pub fn child(&self) -> BodyId {
        match self { Joint::Ball(j) => j.child, Joint::Hinge(j) => j.child }
    }
}

#[derive(Debug, Default)]
pub struct Joints {
    joints: Vec<Joint>,
}

impl Joints {
    pub fn new() -> Self { Self { joints: Vec::new() } }

    pub fn add_ball(&mut self, j: BallJoint) -> JointId {
        self.joints.push(Joint::Ball(j));
        JointId((self.joints.len() as u32) - 1)
    }

    pub fn add_hinge(&mut self, j: HingeJoint) -> JointId {
        self.joints.push(Joint::Hinge(j));
        JointId((self.joints.len() as u32) - 1)
    }

    #[inline] pub fn len(&self) -> usize { self.joints.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.joints.is_empty() }
    #[inline] pub fn get(&self, id: JointId) -> Option<&Joint> { self.joints.get(id.0 as usize) }
    pub fn iter(&self) -> impl Iterator<Item = (JointId, &Joint)> {
        self.joints.iter().enumerate().map(|(i, j)| (JointId(i as u32), j))
    }

    /// Positional anchor solve: pulls the two anchor points of every joint
    /// together, weighted by inverse mass. Rigid (zero compliance), so a few
    /// iterations per tick hold the skeleton assembled.
    pub fn solve(&self, bodies: &mut Bodies, _dt: Scalar, iterations: u32) {
        if self.joints.is_empty() { return; }
        for _ in 0..iterations {
            for j in &self.joints {
                let (pa, ca) = match j {
                    Joint::Ball(b) => (b.anchor_p, b.anchor_c),
                    Joint::Hinge(h) => (h.anchor_p, h.anchor_c),
                };
                let ip = j.parent().0;
                let ic = j.child().0;

                let wp = bodies.inv_mass_of(ip);
                let wc = bodies.inv_mass_of(ic);
                let w_sum = wp + wc;
                if w_sum == 0.0 { continue; }

                let pose_p = bodies.pose(ip);
                let pose_c = bodies.pose(ic);
                let ap = pose_p.pos + pose_p.rot * pa;
                let ac = pose_c.pos + pose_c.rot * ca;
                let d = ac - ap;
                if d.length_squared() <= 1.0e-12 { continue; }

                bodies.apply_position_delta(ip, d * (wp / w_sum));
                bodies.apply_position_delta(ic, -d * (wc / w_sum));
            }
        }
    }

    /// Clamp every joint's deviation from its rest orientation into the
    /// angular limits. The deviation (parent frame) is taken as a scaled
    /// axis and clamped per component; hinges additionally zero the off-axis
    /// terms.
    pub fn clamp_limits(&self, bodies: &mut Bodies) {
        for j in &self.joints {
            let ip = j.parent().0;
            let ic = j.child().0;
            let rot_p = bodies.pose(ip).rot;
            let rot_c = bodies.pose(ic).rot;
            let rel = (rot_p.inverse() * rot_c).normalize();
            let (rest_rel, clamped, v) = match j {
                Joint::Ball(b) => {
                    let v = scaled_axis((b.rest_rel.inverse() * rel).normalize());
                    let c = Vec3::new(
                        v.x.clamp(b.limits.twist[0], b.limits.twist[1]),
                        v.y.clamp(b.limits.swing_y[0], b.limits.swing_y[1]),
                        v.z.clamp(b.limits.swing_z[0], b.limits.swing_z[1]),
                    );
                    (b.rest_rel, c, v)
                }
                Joint::Hinge(h) => {
                    let v = scaled_axis((h.rest_rel.inverse() * rel).normalize());
                    let mut c = Vec3::ZERO;
                    c[h.axis] = v[h.axis].clamp(h.limit[0], h.limit[1]);
                    (h.rest_rel, c, v)
                }
            };

            if (clamped - v).length_squared() > 1.0e-12 {
                let new_rel = rest_rel * from_scaled_axis(clamped);
                let mut pose_c = bodies.pose(ic);
                pose_c.rot = (rot_p * new_rel).normalize();
                bodies.set_pose(ic, pose_c);
            }
        }
    }
}

/// Shortest-path scaled-axis (axis * angle) of a unit quaternion.
#[inline]
fn scaled_axis(q: Quat) -> Vec3 {
    let q = if q.w < 0.0 { -q } else { q };
    let (axis, angle) = q.to_axis_angle();
    Vec3::from(axis) * angle
}

#[inline]
fn from_scaled_axis(v: Vec3) -> Quat {
    let angle = v.length();
    if angle <= 1.0e-9 { return Quat::IDENTITY; }
    Quat::from_axis_angle((v / angle).into(), angle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use puppetphys_core::{vec3, Isometry, Velocity};
    use puppetphys_dynamics::BodyDesc;
    use glam::Mat3A;

    fn body_at(bodies: &mut Bodies, pos: Vec3, mass: f32) -> u32 {
        bodies.add(BodyDesc {
            pose: Isometry { pos, rot: Quat::IDENTITY },
            vel: Velocity::default(),
            inv_mass: 1.0 / mass,
            inv_inertia_local: Mat3A::from_diagonal(glam::Vec3::splat(1.0 / mass)),
            dynamic: true,
        })
    }

    #[test]
    fn anchor_solve_closes_gap() {
        let mut bodies = Bodies::with_capacity(2);
        let a = body_at(&mut bodies, vec3(0.0, 1.0, 0.0), 2.0);
        let b = body_at(&mut bodies, vec3(0.0, 0.3, 0.0), 2.0);
        let mut joints = Joints::new();
        // Anchors meet at the midpoint when the parts sit 0.5 m apart.
        joints.add_ball(BallJoint {
            parent: BodyId(a),
            child: BodyId(b),
            anchor_p: vec3(0.0, -0.25, 0.0),
            anchor_c: vec3(0.0, 0.25, 0.0),
            rest_rel: Quat::IDENTITY,
            limits: BallLimits::default(),
        });

        // Pull the child away, then solve.
        let mut p = bodies.pose(b);
        p.pos = vec3(0.4, 0.1, 0.0);
        bodies.set_pose(b, p);
        joints.solve(&mut bodies, 1.0 / 60.0, 8);

        let ap = bodies.pose(a).pos + bodies.pose(a).rot * vec3(0.0, -0.25, 0.0);
        let ac = bodies.pose(b).pos + bodies.pose(b).rot * vec3(0.0, 0.25, 0.0);
        assert!((ap - ac).length() < 1.0e-4, "anchors still {} apart", (ap - ac).length());
    }

    #[test]
    fn hinge_clamp_kills_off_axis_rotation() {
        let mut bodies = Bodies::with_capacity(2);
        let a = body_at(&mut bodies, vec3(0.0, 1.0, 0.0), 2.0);
        let b = body_at(&mut bodies, vec3(0.0, 0.5, 0.0), 2.0);
        let mut joints = Joints::new();
        joints.add_hinge(HingeJoint {
            parent: BodyId(a),
            child: BodyId(b),
            anchor_p: Vec3::ZERO,
            anchor_c: Vec3::ZERO,
            rest_rel: Quat::IDENTITY,
            axis: 2,
            limit: [0.0, 2.2],
        });

        // Twist the child about X (not the hinge axis) and past the Z range.
        let mut p = bodies.pose(b);
        p.rot = Quat::from_rotation_x(0.7) * Quat::from_rotation_z(2.9);
        bodies.set_pose(b, p);
        joints.clamp_limits(&mut bodies);

        let rel = bodies.pose(a).rot.inverse() * bodies.pose(b).rot;
        let v = super::scaled_axis(rel.normalize());
        assert!(v.x.abs() < 1.0e-4);
        assert!(v.y.abs() < 1.0e-4);
        assert!(v.z <= 2.2 + 1.0e-4);
    }

    #[test]
    fn ball_limits_respected_within_range() {
        let mut bodies = Bodies::with_capacity(2);
        let a = body_at(&mut bodies, vec3(0.0, 1.0, 0.0), 2.0);
        let b = body_at(&mut bodies, vec3(0.0, 0.5, 0.0), 2.0);
        let mut joints = Joints::new();
        joints.add_ball(BallJoint {
            parent: BodyId(a),
            child: BodyId(b),
            anchor_p: Vec3::ZERO,
            anchor_c: Vec3::ZERO,
            rest_rel: Quat::IDENTITY,
            limits: BallLimits { twist: [-0.5, 0.5], swing_y: [-0.5, 0.5], swing_z: [-0.5, 0.5] },
        });

        let mut p = bodies.pose(b);
        p.rot = Quat::from_rotation_z(0.3);
        bodies.set_pose(b, p);
        let before = bodies.pose(b).rot;
        joints.clamp_limits(&mut bodies);
        let after = bodies.pose(b).rot;
        assert!(before.dot(after).abs() > 1.0 - 1.0e-5, "in-range rotation must be untouched");
    }
}
