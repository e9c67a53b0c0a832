use anyhow::{Result, anyhow, bail};
use glam::Quat;
use serde::{Serialize, Deserialize};
use std::collections::HashMap;

use puppetphys_core::{BodyId, PartId, JointId, Isometry, Velocity, Vec3, vec3};
use puppetphys_geom::{Shape, MassProps};
use puppetphys_dynamics::{Bodies, BodyDesc};
use puppetphys_articulation::{Joints, BallJoint, HingeJoint, BallLimits};

/* ─────────────────────────  Rig schema ───────────────────────── */

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ColliderShape {
    Capsule { r: f32, hh: f32 },
    Box { hx: f32, hy: f32, hz: f32 },
    Sphere { r: f32 },
}

impl ColliderShape {
    fn to_shape(&self) -> Shape {
        match *self {
            ColliderShape::Capsule { r, hh } => Shape::Capsule { r, hh },
            ColliderShape::Box { hx, hy, hz } => Shape::Box { hx, hy, hz },
            ColliderShape::Sphere { r } => Shape::Sphere { r },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartDef {
    pub name: String,
    pub mass: f32,
    pub shape: ColliderShape,
    /// None for the root part.
    pub parent: Option<String>,
    /// Rest placement (canonical T-pose), (px,py,pz,qx,qy,qz,qw).
    pub pose_ws: [f32; 7],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JointDef {
    Ball {
        name: String, parent: String, child: String,
        limits: BallLimits,
    },
    Hinge {
        name: String, parent: String, child: String,
        hinge_axis: usize,
        limit: [f32; 2],
    },
}

impl JointDef {
    pub fn name(&self) -> &str {
        match self { JointDef::Ball { name, .. } | JointDef::Hinge { name, .. } => name }
    }
    pub fn parent(&self) -> &str {
        match self { JointDef::Ball { parent, .. } | JointDef::Hinge { parent, .. } => parent }
    }
    pub fn child(&self) -> &str {
        match self { JointDef::Ball { child, .. } | JointDef::Hinge { child, .. } => child }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigDef {
    pub parts: Vec<PartDef>,
    pub joints: Vec<JointDef>,
    /// Parts probed for ground support (typically the feet).
    pub supports: Vec<String>,
}

impl RigDef {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

pub fn pack_iso(p: Vec3, q: Quat) -> [f32; 7] { [p.x, p.y, p.z, q.x, q.y, q.z, q.w] }
pub fn unpack_iso(a: [f32; 7]) -> Isometry {
    Isometry { pos: vec3(a[0], a[1], a[2]), rot: Quat::from_xyzw(a[3], a[4], a[5], a[6]).normalize() }
}

/* ─────────────────────────  Built skeleton ───────────────────────── */

#[derive(Clone, Debug)]
pub struct BodyPart {
    pub id: PartId,
    pub name: String,
    pub mass: f32,
    pub shape: Shape,
    pub body: BodyId,
    pub parent: Option<PartId>,
    /// Rest offset from the parent's origin, in the parent's frame.
    pub local_offset: Vec3,
    /// Rest orientation relative to the parent.
    pub local_rot: Quat,
    pub children: Vec<PartId>,
}

#[derive(Clone, Debug)]
pub struct JointInfo {
    pub id: JointId,
    pub name: String,
    pub parent: PartId,
    pub child: PartId,
}

#[derive(Debug)]
pub struct Skeleton {
    parts: Vec<BodyPart>,
    joint_info: Vec<JointInfo>,
    name_to_part: HashMap<String, PartId>,
    root: PartId,
    supports: Vec<PartId>,
    /// Root-to-leaf traversal order for kinematic playback.
    topo: Vec<PartId>,
}

impl Skeleton {
    /// Validate the rig tables and build parts, rigid bodies, and joints.
    /// All checks run before anything is created, so an error leaves no
    /// partially-built state behind.
    pub fn build(rig: &RigDef) -> Result<(Skeleton, Bodies, Joints)> {
        validate(rig)?;

        let mut bodies = Bodies::with_capacity(rig.parts.len());
        let mut parts: Vec<BodyPart> = Vec::with_capacity(rig.parts.len());
        let mut name_to_part: HashMap<String, PartId> = HashMap::new();

        // Parts in table order: stable ids.
        for (i, def) in rig.parts.iter().enumerate() {
            let id = PartId(i as u32);
            let shape = def.shape.to_shape();
            let mass = MassProps::for_shape(&shape, def.mass);
            let pose = unpack_iso(def.pose_ws);
            let inv_inertia = mass.inertia.inverse();
            let body = bodies.add(BodyDesc {
                pose,
                vel: Velocity::default(),
                inv_mass: mass.inv_mass,
                inv_inertia_local: inv_inertia,
                dynamic: true,
            });
            parts.push(BodyPart {
                id,
                name: def.name.clone(),
                mass: def.mass,
                shape,
                body: BodyId(body),
                parent: None,
                local_offset: Vec3::ZERO,
                local_rot: Quat::IDENTITY,
                children: Vec::new(),
            });
            name_to_part.insert(def.name.clone(), id);
        }

        // Parent links + rest offsets.
        let mut root = None;
        for (i, def) in rig.parts.iter().enumerate() {
            match &def.parent {
                None => root = Some(PartId(i as u32)),
                Some(pname) => {
                    let pid = name_to_part[pname];
                    let parent_pose = unpack_iso(rig.parts[pid.0 as usize].pose_ws);
                    let child_pose = unpack_iso(def.pose_ws);
                    let inv = parent_pose.rot.inverse();
                    parts[i].parent = Some(pid);
                    parts[i].local_offset = inv * (child_pose.pos - parent_pose.pos);
                    parts[i].local_rot = (inv * child_pose.rot).normalize();
                    parts[pid.0 as usize].children.push(PartId(i as u32));
                }
            }
        }
        let root = root.expect("validated: exactly one root");

        // Joints in table order; anchors at the midpoint between the two
        // rest origins, expressed in each body's frame.
        let mut joints = Joints::new();
        let mut joint_info = Vec::with_capacity(rig.joints.len());
        for def in &rig.joints {
            let p = name_to_part[def.parent()];
            let c = name_to_part[def.child()];
            let pose_p = unpack_iso(rig.parts[p.0 as usize].pose_ws);
            let pose_c = unpack_iso(rig.parts[c.0 as usize].pose_ws);
            let anchor_w = (pose_p.pos + pose_c.pos) * 0.5;
            let anchor_p = pose_p.rot.inverse() * (anchor_w - pose_p.pos);
            let anchor_c = pose_c.rot.inverse() * (anchor_w - pose_c.pos);
            let rest_rel = (pose_p.rot.inverse() * pose_c.rot).normalize();
            let (pb, cb) = (parts[p.0 as usize].body, parts[c.0 as usize].body);
            let id = match def {
                JointDef::Ball { limits, .. } => joints.add_ball(BallJoint {
                    parent: pb, child: cb, anchor_p, anchor_c, rest_rel, limits: *limits,
                }),
                JointDef::Hinge { hinge_axis, limit, .. } => joints.add_hinge(HingeJoint {
                    parent: pb, child: cb, anchor_p, anchor_c, rest_rel, axis: *hinge_axis, limit: *limit,
                }),
            };
            joint_info.push(JointInfo { id, name: def.name().to_string(), parent: p, child: c });
        }

        let supports = rig.supports.iter().map(|n| name_to_part[n]).collect();
        let topo = topo_order(&parts, root);

        Ok((Skeleton { parts, joint_info, name_to_part, root, supports, topo }, bodies, joints))
    }

    #[inline] pub fn len(&self) -> usize { self.parts.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.parts.is_empty() }
    #[inline] pub fn root(&self) -> PartId { self.root }
    #[inline] pub fn part(&self, id: PartId) -> &BodyPart { &self.parts[id.0 as usize] }
    #[inline] pub fn supports(&self) -> &[PartId] { &self.supports }
    #[inline] pub fn topo(&self) -> &[PartId] { &self.topo }
    #[inline] pub fn joint_info(&self) -> &[JointInfo] { &self.joint_info }

    pub fn part_by_name(&self, name: &str) -> Option<PartId> {
        self.name_to_part.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BodyPart> {
        self.parts.iter()
    }
}

fn topo_order(parts: &[BodyPart], root: PartId) -> Vec<PartId> {
    let mut order = Vec::with_capacity(parts.len());
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(root);
    while let Some(id) = queue.pop_front() {
        order.push(id);
        for &c in &parts[id.0 as usize].children {
            queue.push_back(c);
        }
    }
    order
}

/* ─────────────────────────  Validation ───────────────────────── */

fn validate(rig: &RigDef) -> Result<()> {
    if rig.parts.is_empty() {
        bail!("rig has no parts");
    }

    let mut names: HashMap<&str, usize> = HashMap::new();
    for (i, p) in rig.parts.iter().enumerate() {
        if names.insert(p.name.as_str(), i).is_some() {
            bail!("duplicate part name {:?}", p.name);
        }
        if p.mass <= 0.0 {
            bail!("part {:?} has non-positive mass {}", p.name, p.mass);
        }
    }

    let roots: Vec<&str> = rig.parts.iter()
        .filter(|p| p.parent.is_none())
        .map(|p| p.name.as_str())
        .collect();
    match roots.len() {
        1 => {}
        0 => bail!("rig has no root part"),
        _ => bail!("rig has multiple roots: {:?}", roots),
    }

    // Parent references resolve, and walking up from every part reaches the
    // root without revisiting anything (tree, no cycles).
    for p in &rig.parts {
        let mut cur = p;
        let mut hops = 0usize;
        while let Some(pname) = &cur.parent {
            let pi = *names.get(pname.as_str())
                .ok_or_else(|| anyhow!("part {:?} references unknown parent {:?}", p.name, pname))?;
            cur = &rig.parts[pi];
            hops += 1;
            if hops > rig.parts.len() {
                bail!("cyclic parentage through part {:?}", p.name);
            }
        }
    }

    // Joints: names resolve, one incoming joint per child, and the joint's
    // parent agrees with the part table.
    let mut incoming: HashMap<&str, &str> = HashMap::new();
    for j in rig.joints.iter() {
        names.get(j.parent())
            .ok_or_else(|| anyhow!("joint {:?} references unknown part {:?}", j.name(), j.parent()))?;
        names.get(j.child())
            .ok_or_else(|| anyhow!("joint {:?} references unknown part {:?}", j.name(), j.child()))?;
        if let Some(prev) = incoming.insert(j.child(), j.name()) {
            bail!("part {:?} is driven by two joints ({:?} and {:?})", j.child(), prev, j.name());
        }
        let child_def = &rig.parts[names[j.child()]];
        match &child_def.parent {
            Some(pp) if pp == j.parent() => {}
            _ => bail!(
                "joint {:?} connects {:?} -> {:?}, but the part table parents {:?} differently",
                j.name(), j.parent(), j.child(), j.child()
            ),
        }
    }
    for p in rig.parts.iter().filter(|p| p.parent.is_some()) {
        if !incoming.contains_key(p.name.as_str()) {
            bail!("part {:?} has a parent but no joint", p.name);
        }
    }

    for s in &rig.supports {
        if !names.contains_key(s.as_str()) {
            bail!("support part {:?} not in part table", s);
        }
    }

    Ok(())
}

/* ─────────────────────────  Built-in humanoid ───────────────────────── */

/// Canonical 14-part humanoid in T-pose. Y up, +X forward, arms along Z.
/// Masses follow common biomechanical splits for an ~80 kg figure.
pub fn humanoid() -> RigDef {
    use std::f32::consts::FRAC_PI_2;

    let up = Quat::IDENTITY;
    let arm_l = Quat::from_rotation_x(FRAC_PI_2);   // capsule Y -> +Z
    let arm_r = Quat::from_rotation_x(-FRAC_PI_2);  // capsule Y -> -Z
    let foot = Quat::from_rotation_z(-FRAC_PI_2);   // capsule Y -> +X

    let part = |name: &str, mass: f32, shape: ColliderShape, parent: Option<&str>, pos: Vec3, rot: Quat| PartDef {
        name: name.into(),
        mass,
        shape,
        parent: parent.map(|s| s.into()),
        pose_ws: pack_iso(pos, rot),
    };
    let cap = |r: f32, hh: f32| ColliderShape::Capsule { r, hh };

    let parts = vec![
        part("pelvis", 12.0, cap(0.15, 0.10), None, vec3(0.0, 1.00, 0.0), up),
        part("spine", 8.0, cap(0.12, 0.08), Some("pelvis"), vec3(0.0, 1.20, 0.0), up),
        part("chest", 10.0, cap(0.14, 0.10), Some("spine"), vec3(0.0, 1.40, 0.0), up),
        part("head", 5.0, ColliderShape::Sphere { r: 0.11 }, Some("chest"), vec3(0.0, 1.66, 0.0), up),
        part("l_upper_arm", 3.0, cap(0.05, 0.12), Some("chest"), vec3(0.0, 1.45, 0.32), arm_l),
        part("l_forearm", 2.0, cap(0.04, 0.11), Some("l_upper_arm"), vec3(0.0, 1.45, 0.58), arm_l),
        part("r_upper_arm", 3.0, cap(0.05, 0.12), Some("chest"), vec3(0.0, 1.45, -0.32), arm_r),
        part("r_forearm", 2.0, cap(0.04, 0.11), Some("r_upper_arm"), vec3(0.0, 1.45, -0.58), arm_r),
        part("l_thigh", 7.0, cap(0.09, 0.18), Some("pelvis"), vec3(0.0, 0.75, 0.10), up),
        part("l_shank", 4.5, cap(0.08, 0.16), Some("l_thigh"), vec3(0.0, 0.35, 0.10), up),
        part("l_foot", 2.0, cap(0.05, 0.12), Some("l_shank"), vec3(0.05, 0.05, 0.10), foot),
        part("r_thigh", 7.0, cap(0.09, 0.18), Some("pelvis"), vec3(0.0, 0.75, -0.10), up),
        part("r_shank", 4.5, cap(0.08, 0.16), Some("r_thigh"), vec3(0.0, 0.35, -0.10), up),
        part("r_foot", 2.0, cap(0.05, 0.12), Some("r_shank"), vec3(0.05, 0.05, -0.10), foot),
    ];

    let hip = BallLimits { twist: [-0.8, 0.8], swing_y: [-0.6, 0.8], swing_z: [-0.4, 0.6] };
    let ankle = BallLimits { twist: [-0.5, 0.5], swing_y: [-0.6, 0.6], swing_z: [-0.4, 0.4] };
    let shoulder = BallLimits { twist: [-0.9, 0.9], swing_y: [-1.2, 1.2], swing_z: [-1.2, 1.2] };
    let spine = BallLimits { twist: [-0.3, 0.3], swing_y: [-0.3, 0.3], swing_z: [-0.3, 0.3] };
    let neck = BallLimits { twist: [-0.5, 0.5], swing_y: [-0.5, 0.5], swing_z: [-0.5, 0.5] };

    let ball = |name: &str, parent: &str, child: &str, limits: BallLimits| JointDef::Ball {
        name: name.into(), parent: parent.into(), child: child.into(), limits,
    };
    let hinge = |name: &str, parent: &str, child: &str, axis: usize, limit: [f32; 2]| JointDef::Hinge {
        name: name.into(), parent: parent.into(), child: child.into(), hinge_axis: axis, limit,
    };

    let joints = vec![
        ball("spine", "pelvis", "spine", spine),
        ball("chest", "spine", "chest", spine),
        ball("neck", "chest", "head", neck),
        ball("l_shoulder", "chest", "l_upper_arm", shoulder),
        hinge("l_elbow", "l_upper_arm", "l_forearm", 2, [0.0, 2.6]),
        ball("r_shoulder", "chest", "r_upper_arm", shoulder),
        hinge("r_elbow", "r_upper_arm", "r_forearm", 2, [0.0, 2.6]),
        ball("l_hip", "pelvis", "l_thigh", hip),
        hinge("l_knee", "l_thigh", "l_shank", 2, [0.0, 2.2]),
        ball("l_ankle", "l_shank", "l_foot", ankle),
        ball("r_hip", "pelvis", "r_thigh", hip),
        hinge("r_knee", "r_thigh", "r_shank", 2, [0.0, 2.2]),
        ball("r_ankle", "r_shank", "r_foot", ankle),
    ];

    RigDef {
        parts,
        joints,
        supports: vec!["l_foot".into(), "r_foot".into()],
    }
}
