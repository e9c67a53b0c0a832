use std::collections::BTreeMap;

use glam::Quat;
use puppetphys_core::{BodyId, JointId, MuscleId, PartId, Scalar, Vec3};

/// Coarse muscle grouping for per-group strength scaling.
#[repr(usize)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MuscleGroup {
    Torso = 0,
    Head = 1,
    Arms = 2,
    Legs = 3,
}

pub const MUSCLE_GROUPS: usize = 4;

impl MuscleGroup {
    /// Group from the driven part's name.
    pub fn classify(part_name: &str) -> Self {
        if part_name.contains("arm") {
            MuscleGroup::Arms
        } else if part_name.contains("thigh") || part_name.contains("shank") || part_name.contains("foot") {
            MuscleGroup::Legs
        } else if part_name.contains("head") {
            MuscleGroup::Head
        } else {
            MuscleGroup::Torso
        }
    }

    #[inline] pub fn index(self) -> usize { self as usize }
}

/// Active-control wrapper around one joint: drives the child part toward
/// `target_rotation` with a PD torque.
#[derive(Copy, Clone, Debug)]
pub struct Muscle {
    pub joint: JointId,
    pub part: PartId,
    pub body: BodyId,
    pub group: MuscleGroup,
    pub strength: Scalar,
    pub target_rotation: Quat,
    pub active: bool,
}

impl Muscle {
    pub fn new(joint: JointId, part: PartId, body: BodyId, part_name: &str, rest: Quat) -> Self {
        Self {
            joint,
            part,
            body,
            group: MuscleGroup::classify(part_name),
            strength: 1.0,
            target_rotation: rest,
            active: true,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct PdGains {
    pub stiffness: Scalar,
    pub damping: Scalar,
}

impl Default for PdGains {
    fn default() -> Self {
        Self { stiffness: 60.0, damping: 4.0 }
    }
}

/// PD torque toward `target`: rotation error as a quaternion difference,
/// shortest-path axis-angle for the proportional term, angular velocity for
/// the damping term.
pub fn pd_torque(current: Quat, target: Quat, angvel: Vec3, strength: Scalar, gains: &PdGains) -> Vec3 {
    let err = (target * current.inverse()).normalize();
    let err = if err.w < 0.0 { -err } else { err };
    let (axis, angle) = err.to_axis_angle();
    Vec3::from(axis) * (angle * strength * gains.stiffness) - angvel * gains.damping
}

/// Per-tick pull of animation target rotations. Read-only; the muscle
/// controller polls it once per muscle per tick.
pub trait AnimationSource {
    fn target_rotation(&self, muscle: MuscleId) -> Quat;
}

/// Fixed per-muscle targets; doubles as a stand-in clip player in tests and
/// benches.
pub struct StaticAnimation {
    targets: Vec<Quat>,
}

impl StaticAnimation {
    pub fn new(targets: Vec<Quat>) -> Self { Self { targets } }

    pub fn uniform(count: usize, q: Quat) -> Self {
        Self { targets: vec![q; count] }
    }

    pub fn set(&mut self, muscle: MuscleId, q: Quat) {
        if let Some(t) = self.targets.get_mut(muscle.0 as usize) { *t = q; }
    }
}

impl AnimationSource for StaticAnimation {
    fn target_rotation(&self, muscle: MuscleId) -> Quat {
        self.targets.get(muscle.0 as usize).copied().unwrap_or(Quat::IDENTITY)
    }
}

/* ─────────────────────────  Poses ───────────────────────── */

/// Named target set: world orientation per muscle.
#[derive(Clone, Debug)]
pub struct Pose {
    targets: BTreeMap<MuscleId, Quat>,
}

impl Pose {
    pub fn new() -> Self { Self { targets: BTreeMap::new() } }

    pub fn with(mut self, muscle: MuscleId, q: Quat) -> Self {
        self.targets.insert(muscle, q);
        self
    }

    pub fn set(&mut self, muscle: MuscleId, q: Quat) {
        self.targets.insert(muscle, q);
    }

    pub fn target(&self, muscle: MuscleId) -> Option<Quat> {
        self.targets.get(&muscle).copied()
    }

    pub fn len(&self) -> usize { self.targets.len() }
    pub fn is_empty(&self) -> bool { self.targets.is_empty() }
}

impl Default for Pose {
    fn default() -> Self { Self::new() }
}

#[derive(Default)]
pub struct PoseLibrary {
    poses: BTreeMap<String, Pose>,
}

impl PoseLibrary {
    pub fn new() -> Self { Self { poses: BTreeMap::new() } }

    pub fn insert(&mut self, name: &str, pose: Pose) {
        self.poses.insert(name.to_string(), pose);
    }

    pub fn get(&self, name: &str) -> Option<&Pose> {
        self.poses.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.poses.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.poses.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use puppetphys_core::vec3;

    #[test]
    fn zero_error_gives_zero_proportional_torque() {
        let q = Quat::from_rotation_y(0.4);
        let t = pd_torque(q, q, Vec3::ZERO, 1.0, &PdGains::default());
        assert!(t.length() < 1.0e-6);
    }

    #[test]
    fn torque_points_along_correction_axis() {
        let gains = PdGains { stiffness: 1.0, damping: 0.0 };
        let t = pd_torque(Quat::IDENTITY, Quat::from_rotation_y(0.5), Vec3::ZERO, 1.0, &gains);
        assert!(t.y > 0.4 && t.y < 0.6, "{t:?}");
        assert!(t.x.abs() < 1.0e-5 && t.z.abs() < 1.0e-5);
    }

    #[test]
    fn damping_opposes_spin() {
        let gains = PdGains { stiffness: 1.0, damping: 2.0 };
        let t = pd_torque(Quat::IDENTITY, Quat::IDENTITY, vec3(0.0, 3.0, 0.0), 1.0, &gains);
        assert!((t.y + 6.0).abs() < 1.0e-5);
    }

    #[test]
    fn shortest_path_wraps() {
        // 350 degrees one way is 10 degrees the other.
        let gains = PdGains { stiffness: 1.0, damping: 0.0 };
        let target = Quat::from_rotation_y(350.0_f32.to_radians());
        let t = pd_torque(Quat::IDENTITY, target, Vec3::ZERO, 1.0, &gains);
        assert!(t.length() < 0.2, "wrapped correction should be small, got {t:?}");
    }

    #[test]
    fn strength_scales_linearly() {
        let gains = PdGains { stiffness: 1.0, damping: 0.0 };
        let half = pd_torque(Quat::IDENTITY, Quat::from_rotation_x(0.3), Vec3::ZERO, 0.5, &gains);
        let full = pd_torque(Quat::IDENTITY, Quat::from_rotation_x(0.3), Vec3::ZERO, 1.0, &gains);
        assert!((full.length() - 2.0 * half.length()).abs() < 1.0e-5);
    }

    #[test]
    fn group_classification() {
        assert_eq!(MuscleGroup::classify("l_upper_arm"), MuscleGroup::Arms);
        assert_eq!(MuscleGroup::classify("r_forearm"), MuscleGroup::Arms);
        assert_eq!(MuscleGroup::classify("l_thigh"), MuscleGroup::Legs);
        assert_eq!(MuscleGroup::classify("r_foot"), MuscleGroup::Legs);
        assert_eq!(MuscleGroup::classify("head"), MuscleGroup::Head);
        assert_eq!(MuscleGroup::classify("spine"), MuscleGroup::Torso);
    }

    #[test]
    fn pose_lookup() {
        let mut lib = PoseLibrary::new();
        lib.insert("standing", Pose::new().with(MuscleId(0), Quat::IDENTITY));
        assert!(lib.contains("standing"));
        assert!(lib.get("standing").unwrap().target(MuscleId(0)).is_some());
        assert!(lib.get("standing").unwrap().target(MuscleId(9)).is_none());
        assert!(!lib.contains("crouched"));
    }
}
