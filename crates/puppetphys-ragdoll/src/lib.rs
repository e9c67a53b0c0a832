mod state;
mod recovery;
mod forces;
mod events;

pub use state::{RagdollState, StateMachine, Transition};
pub use recovery::{Recovery, RecoveryParams, RecoveryTick};
pub use forces::{ExternalForce, ForceQueue, ImpactParams};
pub use events::RagdollEvent;

use anyhow::Result;
use glam::Quat;

use puppetphys_core::{
    BodyId, Isometry, MuscleId, PartId, Scalar, StepHasher, StepStage, StepStats, Vec3, Velocity,
    hash_quat, hash_vec3, vec3,
};
use puppetphys_balance::{BalanceEstimator, BalanceParams, BalanceSample, FlatGround, SupportSurface};
use puppetphys_dynamics::Bodies;
use puppetphys_articulation::Joints;
use puppetphys_geom::{Shape, half_height_world};
use puppetphys_muscle::{
    AnimationSource, Muscle, MuscleGroup, MUSCLE_GROUPS, PdGains, Pose, PoseLibrary, pd_torque,
};
use puppetphys_skeleton::{RigDef, Skeleton, humanoid};
use puppetphys_viz::{DebugSettings, Ledger, LedgerEvent, ScheduleRecorder};

pub const POSE_STANDING: &str = "standing";
pub const POSE_PRONE_RECOVERY: &str = "prone_recovery";
pub const POSE_SUPINE_RECOVERY: &str = "supine_recovery";

#[derive(Clone, Debug)]
pub struct RagdollParams {
    pub gravity: Vec3,
    pub gains: PdGains,
    /// Blend-in used when activation comes from the force queue.
    pub blend_time: Scalar,
    /// Ramp back to animation while getting up.
    pub getup_time: Scalar,
    pub balance: BalanceParams,
    pub recovery: RecoveryParams,
    pub impact: ImpactParams,
    pub joint_iterations: u32,
    /// Fraction of tangential velocity removed while touching the ground.
    pub ground_friction: Scalar,
}

impl Default for RagdollParams {
    fn default() -> Self {
        Self {
            gravity: vec3(0.0, -9.81, 0.0),
            gains: PdGains::default(),
            blend_time: 0.25,
            getup_time: 0.5,
            balance: BalanceParams::default(),
            recovery: RecoveryParams::default(),
            impact: ImpactParams::default(),
            joint_iterations: 4,
            ground_friction: 0.2,
        }
    }
}

/// Queued API mutation; drained at the next tick boundary so nothing changes
/// mid-tick.
#[derive(Clone, Debug)]
enum Command {
    Activate { blend_time: Scalar },
    Deactivate,
    Kill,
    SetPose(String),
    SetStrength { group: MuscleGroup, scale: Scalar },
    Freeze,
    Unfreeze,
}

/// The active-ragdoll controller: owns the skeleton graph, the rigid bodies,
/// the muscles, and every timer. Single-threaded and tick-driven; one `step`
/// runs the whole pipeline to completion.
pub struct Ragdoll {
    params: RagdollParams,
    skeleton: Skeleton,
    bodies: Bodies,
    joints: Joints,
    muscles: Vec<Muscle>,
    muscle_of_part: Vec<Option<MuscleId>>,
    group_scale: [Scalar; MUSCLE_GROUPS],
    poses: PoseLibrary,
    active_pose: String,
    recovery_pose: String,
    machine: StateMachine,
    recovery: Recovery,
    forces: ForceQueue,
    estimator: BalanceEstimator,
    ground: Box<dyn SupportSurface>,
    masses: Vec<(BodyId, Scalar)>,
    feet: Vec<(BodyId, Shape)>,
    frozen: bool,
    pending: Vec<Command>,
    events: Vec<RagdollEvent>,
    last_balance: BalanceSample,
    schedule: ScheduleRecorder,
    ledger: Ledger,
    debug: DebugSettings,
    tick: u64,
}

impl Ragdoll {
    pub fn new(rig: &RigDef, ground: Box<dyn SupportSurface>, params: RagdollParams) -> Result<Self> {
        let (skeleton, bodies, joints) = Skeleton::build(rig)?;

        let mut muscles = Vec::with_capacity(skeleton.joint_info().len());
        let mut muscle_of_part = vec![None; skeleton.len()];
        for info in skeleton.joint_info() {
            let part = skeleton.part(info.child);
            let rest = bodies.pose(part.body.0).rot;
            let id = MuscleId(info.id.0);
            muscles.push(Muscle::new(info.id, info.child, part.body, &part.name, rest));
            muscle_of_part[info.child.0 as usize] = Some(id);
        }

        let poses = build_pose_library(&skeleton, &bodies, &muscles);

        let masses = skeleton.iter().map(|p| (p.body, p.mass)).collect();
        let feet = skeleton
            .supports()
            .iter()
            .map(|&pid| {
                let p = skeleton.part(pid);
                (p.body, p.shape)
            })
            .collect();

        Ok(Self {
            machine: StateMachine::new(params.getup_time),
            recovery: Recovery::new(params.recovery),
            forces: ForceQueue::new(params.impact),
            estimator: BalanceEstimator::new(params.balance),
            params,
            skeleton,
            bodies,
            joints,
            muscles,
            muscle_of_part,
            group_scale: [1.0; MUSCLE_GROUPS],
            poses,
            active_pose: POSE_STANDING.to_string(),
            recovery_pose: POSE_SUPINE_RECOVERY.to_string(),
            ground,
            masses,
            feet,
            frozen: false,
            pending: Vec::new(),
            events: Vec::new(),
            last_balance: BalanceSample::default(),
            schedule: ScheduleRecorder::new(),
            ledger: Ledger::new(256),
            debug: DebugSettings::default(),
            tick: 0,
        })
    }

    /// The built-in humanoid standing on a flat floor at y = 0.
    pub fn humanoid_on_ground(params: RagdollParams) -> Result<Self> {
        Self::new(&humanoid(), Box::new(FlatGround { y: 0.0 }), params)
    }

    /* ---------- Public API (mutations are queued) ---------- */

    pub fn activate_ragdoll(&mut self, blend_time: Scalar) {
        self.pending.push(Command::Activate { blend_time });
    }

    pub fn deactivate_ragdoll(&mut self) {
        self.pending.push(Command::Deactivate);
    }

    /// Terminal and idempotent: the first kill wins, everything after is a
    /// no-op.
    pub fn kill(&mut self) {
        self.pending.push(Command::Kill);
    }

    pub fn set_pose(&mut self, name: &str) {
        self.pending.push(Command::SetPose(name.to_string()));
    }

    pub fn set_muscle_strength(&mut self, group: MuscleGroup, scale: Scalar) {
        self.pending.push(Command::SetStrength { group, scale });
    }

    /// Suspend the whole tick body (physics and timers) without touching
    /// the state machine.
    pub fn freeze(&mut self) {
        self.pending.push(Command::Freeze);
    }

    pub fn unfreeze(&mut self) {
        self.pending.push(Command::Unfreeze);
    }

    /// Queue a time-limited impact. Unknown part ids are ignored.
    pub fn apply_impact(&mut self, part: PartId, force: Vec3, point_local: Vec3, damage: Scalar) {
        if part.0 as usize >= self.skeleton.len() { return; }
        let body = self.skeleton.part(part).body;
        self.forces.push_impact(part, body, force, point_local, damage);
        self.events.push(RagdollEvent::ImpactReceived { part, force, point: point_local });
    }

    /* ---------- Queries ---------- */

    #[inline] pub fn state(&self) -> RagdollState { self.machine.state() }
    #[inline] pub fn blend_weight(&self) -> Scalar { self.machine.blend_weight() }
    #[inline] pub fn is_balanced(&self) -> bool { self.last_balance.balanced }
    #[inline] pub fn accumulated_damage(&self) -> Scalar { self.forces.damage() }
    #[inline] pub fn tick_index(&self) -> u64 { self.tick }
    #[inline] pub fn skeleton(&self) -> &Skeleton { &self.skeleton }
    #[inline] pub fn active_pose(&self) -> &str { &self.active_pose }
    #[inline] pub fn recovery_pose(&self) -> &str { &self.recovery_pose }
    #[inline] pub fn muscle_strength(&self, group: MuscleGroup) -> Scalar { self.group_scale[group.index()] }

    pub fn bone_transform(&self, part: PartId) -> Option<Isometry> {
        if part.0 as usize >= self.skeleton.len() { return None; }
        Some(self.bodies.pose(self.skeleton.part(part).body.0))
    }

    pub fn muscles(&self) -> &[Muscle] { &self.muscles }

    pub fn drain_events(&mut self) -> Vec<RagdollEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_debug(&mut self, cfg: DebugSettings) { self.debug = cfg; }

    /// Deterministically reposition a part at a tick boundary. Call only
    /// outside `step` to keep hashes stable.
    pub fn set_part_pose(&mut self, part: PartId, pose: Isometry) {
        if part.0 as usize >= self.skeleton.len() { return; }
        self.bodies.set_pose(self.skeleton.part(part).body.0, pose);
    }

    pub fn step_hash(&self) -> [u8; 32] {
        let mut h = StepHasher::new();
        h.update_bytes(&[self.machine.state().code()]);
        h.update_bytes(&self.machine.blend_weight().to_le_bytes());
        h.update_bytes(&self.forces.damage().to_le_bytes());
        h.update_bytes(&self.recovery.countdown().to_le_bytes());
        h.update_bytes(&self.schedule.digest());
        for i in self.bodies.indices() {
            let pose = self.bodies.pose(i);
            let vel = self.bodies.vel(i);
            h.update_bytes(&i.to_le_bytes());
            hash_vec3(&mut h, &pose.pos);
            hash_quat(&mut h, &pose.rot);
            hash_vec3(&mut h, &vel.lin);
            hash_vec3(&mut h, &vel.ang);
        }
        h.finalize()
    }

    /* ---------- Step ---------- */

    pub fn step(&mut self, anim: &dyn AnimationSource, dt: Scalar) -> StepStats {
        self.tick = self.tick.wrapping_add(1);
        self.ledger.clear();
        self.schedule.clear();

        self.schedule.push(StepStage::ApplyCommands);
        self.apply_pending_commands();

        if self.frozen {
            return StepStats::default();
        }

        let mut stats = StepStats::default();

        // Integrate, or play the animation through the joint offsets.
        self.schedule.push(StepStage::Integrate);
        match self.machine.state() {
            RagdollState::Animated => self.kinematic_playback(anim),
            _ => self.bodies.integrate_all(self.params.gravity, dt),
        }

        // Balance is only evaluated while actively simulated.
        self.schedule.push(StepStage::Balance);
        self.last_balance = if self.machine.state() == RagdollState::Active {
            let s = self.estimator.sample(&self.bodies, &self.masses, &self.feet, self.ground.as_ref());
            self.ledger.push(LedgerEvent::Balance {
                com: s.com.into(),
                support: s.support.into(),
                contacts: s.contacts,
                balanced: s.balanced,
            });
            s
        } else {
            BalanceSample::default()
        };
        stats.supports = self.last_balance.contacts;

        // State machine: consume the activation signal, advance the ramps.
        self.schedule.push(StepStage::StateUpdate);
        let signal = self.forces.take_activation();
        if self.machine.state() == RagdollState::Animated && signal {
            let from = self.machine.state().code();
            if self.machine.begin_blend(self.params.blend_time) {
                self.events.push(RagdollEvent::Activated);
                self.ledger.push(LedgerEvent::StateChange { from, to: self.machine.state().code() });
            }
        }
        match self.machine.advance(dt) {
            Some(Transition::BlendDone) => {
                self.recovery.reset();
                self.ledger.push(LedgerEvent::StateChange {
                    from: RagdollState::Blend.code(),
                    to: RagdollState::Active.code(),
                });
            }
            Some(Transition::GotUp) => {
                self.recovery.on_got_up();
                self.events.push(RagdollEvent::GotUp);
                self.ledger.push(LedgerEvent::StateChange {
                    from: RagdollState::GettingUp.code(),
                    to: RagdollState::Animated.code(),
                });
            }
            None => {}
        }

        // Muscles.
        self.schedule.push(StepStage::MuscleDrive);
        stats.muscles_driven = match self.machine.state() {
            RagdollState::Animated | RagdollState::Dead => 0,
            s => self.drive_muscles(s, anim, dt),
        };

        // External forces apply and age out.
        self.schedule.push(StepStage::ExternalForces);
        stats.forces_active = self.forces.apply(&mut self.bodies, dt);

        // Recovery timers.
        self.schedule.push(StepStage::Recovery);
        if self.machine.state() == RagdollState::Active {
            let t = self.recovery.update(self.last_balance.balanced, dt);
            if t.fell_down {
                self.events.push(RagdollEvent::FellDown);
            }
            if t.request_get_up {
                self.recovery_pose = self.select_recovery_pose();
                if self.machine.begin_getting_up() {
                    self.ledger.push(LedgerEvent::StateChange {
                        from: RagdollState::Active.code(),
                        to: RagdollState::GettingUp.code(),
                    });
                }
            }
            self.ledger.push(LedgerEvent::Recovery {
                countdown: self.recovery.countdown(),
                lie_still: self.recovery.lie_still(),
            });
        }

        // Keep the skeleton assembled and above ground while simulated.
        if self.machine.state() != RagdollState::Animated {
            self.schedule.push(StepStage::SolveJoints);
            self.joints.solve(&mut self.bodies, dt, self.params.joint_iterations);
            self.joints.clamp_limits(&mut self.bodies);

            self.schedule.push(StepStage::GroundContact);
            self.ground_clamp();
        }

        if self.debug.print_every != 0 && (self.tick as u32) % self.debug.print_every == 0 {
            self.print_debug_block();
        }
        if self.debug.json_every != 0 && (self.tick as u32) % self.debug.json_every == 0 {
            let _ = self.ledger.write_jsonl("out", self.tick);
        }

        stats
    }

    fn apply_pending_commands(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for cmd in pending {
            match cmd {
                Command::Activate { blend_time } => {
                    if self.machine.begin_blend(blend_time) {
                        self.events.push(RagdollEvent::Activated);
                    }
                }
                Command::Deactivate => {
                    if self.machine.force_animated() {
                        self.recovery.reset();
                        self.events.push(RagdollEvent::Deactivated);
                    }
                }
                Command::Kill => {
                    if self.machine.kill() {
                        for m in &mut self.muscles {
                            m.active = false;
                        }
                    }
                }
                Command::SetPose(name) => {
                    if self.poses.contains(&name) {
                        self.active_pose = name.clone();
                        self.events.push(RagdollEvent::PoseChanged(name));
                    }
                }
                Command::SetStrength { group, scale } => {
                    self.group_scale[group.index()] = scale.max(0.0);
                }
                Command::Freeze => self.frozen = true,
                Command::Unfreeze => self.frozen = false,
            }
        }
    }

    /// Animated playback: root holds its pose, each child follows its parent
    /// through the rest offset with the animation target rotation. Velocities
    /// are zeroed; physics leaves the body alone in this mode.
    fn kinematic_playback(&mut self, anim: &dyn AnimationSource) {
        let root = self.skeleton.root();
        let root_body = self.skeleton.part(root).body;
        self.bodies.set_vel(root_body.0, Velocity::default());

        for i in 1..self.skeleton.topo().len() {
            let pid = self.skeleton.topo()[i];
            let (parent, body, offset) = {
                let part = self.skeleton.part(pid);
                (part.parent.expect("non-root part in traversal order"), part.body, part.local_offset)
            };
            let ppose = self.bodies.pose(self.skeleton.part(parent).body.0);
            let rot = match self.muscle_of_part[pid.0 as usize] {
                Some(mid) => anim.target_rotation(mid),
                None => self.bodies.pose(body.0).rot,
            };
            let pos = ppose.pos + ppose.rot * offset;
            self.bodies.set_pose(body.0, Isometry { pos, rot });
            self.bodies.set_vel(body.0, Velocity::default());
        }
    }

    fn drive_muscles(&mut self, state: RagdollState, anim: &dyn AnimationSource, dt: Scalar) -> u32 {
        let w = self.machine.blend_weight();
        let mut driven = 0u32;
        for mi in 0..self.muscles.len() {
            let m = self.muscles[mi];
            if !m.active || m.strength <= 0.0 { continue; }
            let id = MuscleId(m.joint.0);
            let cur = self.bodies.pose(m.body.0).rot;

            let target = match state {
                // Authority fades toward the simulation as the weight rises.
                RagdollState::Blend => anim.target_rotation(id).slerp(cur, w),
                // Hold the selected pose.
                RagdollState::Active => self
                    .poses
                    .get(&self.active_pose)
                    .and_then(|p| p.target(id))
                    .unwrap_or(cur),
                // Pull from the recovery pose back toward the animation.
                RagdollState::GettingUp => {
                    let rec = self
                        .poses
                        .get(&self.recovery_pose)
                        .and_then(|p| p.target(id))
                        .unwrap_or(cur);
                    anim.target_rotation(id).slerp(rec, w)
                }
                _ => cur,
            };

            let strength = m.strength * self.group_scale[m.group.index()];
            let ang = self.bodies.vel(m.body.0).ang;
            let tau = pd_torque(cur, target, ang, strength, &self.params.gains);
            // Inertia-normalized drive: the correction acts as an angular
            // acceleration, so one gain set serves every part mass.
            self.bodies.apply_angular_accel(m.body.0, tau, dt);

            self.muscles[mi].target_rotation = target;
            self.ledger.push(LedgerEvent::MuscleTorque { muscle: id.0, torque: tau.into() });
            driven += 1;
        }
        driven
    }

    /// Face-down forward axis picks the prone pose, otherwise supine.
    fn select_recovery_pose(&self) -> String {
        let root_body = self.skeleton.part(self.skeleton.root()).body;
        let forward = self.bodies.pose(root_body.0).rot * Vec3::X;
        if forward.y < 0.0 {
            POSE_PRONE_RECOVERY.to_string()
        } else {
            POSE_SUPINE_RECOVERY.to_string()
        }
    }

    /// Minimal ground response: push penetrating parts out, remove the
    /// incoming normal velocity, bleed tangential velocity by the friction
    /// factor.
    fn ground_clamp(&mut self) {
        let friction = self.params.ground_friction.clamp(0.0, 1.0);
        for part in self.skeleton.iter() {
            let pose = self.bodies.pose(part.body.0);
            let Some(h) = self.ground.height_at(pose.pos.x, pose.pos.z) else { continue };
            let bottom = pose.pos.y - half_height_world(&part.shape, pose.rot);
            if bottom >= h { continue; }
            let push = h - bottom;
            self.bodies.apply_position_delta(part.body.0, vec3(0.0, push, 0.0));
            let mut v = self.bodies.vel(part.body.0);
            if v.lin.y < 0.0 { v.lin.y = 0.0; }
            v.lin.x *= 1.0 - friction;
            v.lin.z *= 1.0 - friction;
            self.bodies.set_vel(part.body.0, v);
            self.ledger.push(LedgerEvent::GroundClamp { part: part.id.0, push });
        }
    }

    fn print_debug_block(&self) {
        println!(
            "--- tick {}  state={:?}  w={:.3}  damage={:.1} ---",
            self.tick,
            self.machine.state(),
            self.machine.blend_weight(),
            self.forces.damage()
        );
        if self.debug.show_balance {
            let b = &self.last_balance;
            println!(
                "balance: com=({:+.3},{:+.3},{:+.3})  contacts={}  balanced={}",
                b.com.x, b.com.y, b.com.z, b.contacts, b.balanced
            );
        }
        if self.debug.show_bodies {
            let mut lines = 0usize;
            for part in self.skeleton.iter() {
                let p = self.bodies.pose(part.body.0).pos;
                println!("part {:12}  pos=({:+.3},{:+.3},{:+.3})", part.name, p.x, p.y, p.z);
                lines += 1;
                if lines >= self.debug.max_lines { break; }
            }
        }
        if self.debug.show_muscles {
            let mut lines = 0usize;
            for m in &self.muscles {
                println!("muscle {:2}  group={:?}  active={}", m.joint.0, m.group, m.active);
                lines += 1;
                if lines >= self.debug.max_lines { break; }
            }
        }
    }
}

/// Standing is the rest pose; the recovery poses bend the limbs into a
/// crouch (supine) or a push-up (prone) so the PD drive pulls the body into
/// a stance it can rise from.
fn build_pose_library(skeleton: &Skeleton, bodies: &Bodies, muscles: &[Muscle]) -> PoseLibrary {
    let mut standing = Pose::new();
    for m in muscles {
        standing.set(MuscleId(m.joint.0), bodies.pose(m.body.0).rot);
    }

    let tweak = |base: &Pose, offsets: &[(&str, Quat)]| -> Pose {
        let mut pose = base.clone();
        for m in muscles {
            let name = skeleton.part(m.part).name.as_str();
            for (needle, dq) in offsets {
                if name.contains(needle) {
                    let rest = bodies.pose(m.body.0).rot;
                    pose.set(MuscleId(m.joint.0), (*dq * rest).normalize());
                }
            }
        }
        pose
    };

    let supine = tweak(&standing, &[
        ("shank", Quat::from_rotation_z(0.9)),
        ("thigh", Quat::from_rotation_z(-0.5)),
    ]);
    let prone = tweak(&standing, &[
        ("shank", Quat::from_rotation_z(1.2)),
        ("thigh", Quat::from_rotation_z(-0.4)),
        ("forearm", Quat::from_rotation_z(0.8)),
    ]);

    let mut lib = PoseLibrary::new();
    lib.insert(POSE_STANDING, standing);
    lib.insert(POSE_SUPINE_RECOVERY, supine);
    lib.insert(POSE_PRONE_RECOVERY, prone);
    lib
}

#[cfg(test)]
mod tests {
    use super::*;
    use puppetphys_muscle::StaticAnimation;

    // 1/64 s divides every timer below exactly, so tick counts are exact.
    const DT: f32 = 1.0 / 64.0;

    fn quiet_params() -> RagdollParams {
        RagdollParams {
            gravity: Vec3::ZERO,
            ..RagdollParams::default()
        }
    }

    fn ragdoll(params: RagdollParams) -> Ragdoll {
        Ragdoll::humanoid_on_ground(params).unwrap()
    }

    /// Animation source that holds the rest pose.
    fn rest_anim(r: &Ragdoll) -> StaticAnimation {
        let mut targets = vec![Quat::IDENTITY; r.muscles().len()];
        for m in r.muscles() {
            targets[m.joint.0 as usize] = r.bone_transform(m.part).unwrap().rot;
        }
        StaticAnimation::new(targets)
    }

    fn part(r: &Ragdoll, name: &str) -> PartId {
        r.skeleton().part_by_name(name).unwrap()
    }

    #[test]
    fn blend_weight_ramps_monotonically_into_active() {
        let mut r = ragdoll(quiet_params());
        let anim = rest_anim(&r);
        r.activate_ragdoll(0.25);
        assert_eq!(r.state(), RagdollState::Animated, "commands land on the next tick");

        let mut last = -1.0;
        for i in 1..=16 {
            r.step(&anim, DT);
            assert!(r.blend_weight() > last, "weight fell at tick {i}");
            last = r.blend_weight();
            if i < 16 {
                assert_eq!(r.state(), RagdollState::Blend, "tick {i}");
            }
        }
        assert_eq!(r.state(), RagdollState::Active);
        assert_eq!(r.blend_weight(), 1.0);
        let events = r.drain_events();
        assert!(events.contains(&RagdollEvent::Activated));
    }

    #[test]
    fn big_impact_activates_on_the_tick_it_lands() {
        let mut r = ragdoll(quiet_params());
        let anim = rest_anim(&r);
        let chest = part(&r, "chest");
        r.apply_impact(chest, vec3(1000.0, 0.0, 0.0), Vec3::ZERO, 0.0);
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::Blend);
        let events = r.drain_events();
        assert!(events.contains(&RagdollEvent::Activated));
        assert!(events.iter().any(|e| matches!(e, RagdollEvent::ImpactReceived { .. })));
    }

    #[test]
    fn accumulated_damage_activates() {
        let mut r = ragdoll(quiet_params());
        let anim = rest_anim(&r);
        let chest = part(&r, "chest");
        // Default damage threshold is 50.
        r.apply_impact(chest, vec3(10.0, 0.0, 0.0), Vec3::ZERO, 30.0);
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::Animated);
        r.apply_impact(chest, vec3(10.0, 0.0, 0.0), Vec3::ZERO, 30.0);
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::Blend);
        assert!((r.accumulated_damage() - 60.0).abs() < 1e-5);
    }

    #[test]
    fn weak_impact_on_unknown_part_is_a_no_op() {
        let mut r = ragdoll(quiet_params());
        let anim = rest_anim(&r);
        r.apply_impact(PartId(99), vec3(5000.0, 0.0, 0.0), Vec3::ZERO, 1000.0);
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::Animated);
        assert_eq!(r.accumulated_damage(), 0.0);
        assert!(r.drain_events().is_empty());
    }

    #[test]
    fn dead_is_absorbing() {
        let mut r = ragdoll(quiet_params());
        let anim = rest_anim(&r);
        r.kill();
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::Dead);
        assert!(r.muscles().iter().all(|m| !m.active));

        r.kill();
        r.activate_ragdoll(0.2);
        r.deactivate_ragdoll();
        let chest = part(&r, "chest");
        r.apply_impact(chest, vec3(5000.0, 0.0, 0.0), Vec3::ZERO, 100.0);
        for _ in 0..4 {
            r.step(&anim, DT);
        }
        assert_eq!(r.state(), RagdollState::Dead);
        assert!(r.muscles().iter().all(|m| !m.active));
    }

    #[test]
    fn recovery_fires_after_exactly_one_second_of_balance() {
        let mut r = ragdoll(quiet_params());
        let anim = rest_anim(&r);
        r.activate_ragdoll(DT); // one-tick blend
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::Active);

        // Balance is sampled from tick 2 on; the 1 s countdown therefore
        // completes on tick 65.
        for i in 2..=64 {
            r.step(&anim, DT);
            assert_eq!(r.state(), RagdollState::Active, "stood up early at tick {i}");
        }
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::GettingUp);

        // Ramp back to animated control over getup_time (0.5 s = 32 ticks).
        for _ in 0..31 {
            r.step(&anim, DT);
            assert_eq!(r.state(), RagdollState::GettingUp);
        }
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::Animated);
        assert!(r.drain_events().contains(&RagdollEvent::GotUp));
    }

    #[test]
    fn imbalance_resets_the_recovery_countdown() {
        let mut r = ragdoll(quiet_params());
        let anim = rest_anim(&r);
        r.activate_ragdoll(DT);
        r.step(&anim, DT);
        for _ in 2..=33 {
            r.step(&anim, DT); // 32 balanced ticks: countdown half spent
        }
        assert_eq!(r.state(), RagdollState::Active);

        // Shove the torso sideways for one tick, then restore every part.
        let snapshot: Vec<(PartId, Isometry)> = r
            .skeleton()
            .iter()
            .map(|p| (p.id, r.bone_transform(p.id).unwrap()))
            .collect();
        for name in ["pelvis", "chest"] {
            let pid = part(&r, name);
            let mut pose = r.bone_transform(pid).unwrap();
            pose.pos += vec3(2.0, 0.0, 0.0);
            r.set_part_pose(pid, pose);
        }
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::Active);
        assert!(!r.is_balanced());
        for (pid, pose) in snapshot {
            r.set_part_pose(pid, pose);
        }

        // The countdown must need the full second again: 64 balanced ticks.
        for i in 1..=63 {
            r.step(&anim, DT);
            assert_eq!(r.state(), RagdollState::Active, "fired early, tick {i} after reset");
        }
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::GettingUp);
    }

    #[test]
    fn face_down_root_selects_the_prone_pose() {
        let mut params = quiet_params();
        params.recovery.recovery_time = DT;
        let mut r = ragdoll(params);
        let anim = rest_anim(&r);
        r.activate_ragdoll(DT);
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::Active);

        // Pitch the pelvis so its forward axis points at the floor.
        let pelvis = part(&r, "pelvis");
        let mut pose = r.bone_transform(pelvis).unwrap();
        pose.rot = Quat::from_rotation_z(-std::f32::consts::FRAC_PI_2);
        r.set_part_pose(pelvis, pose);

        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::GettingUp);
        assert_eq!(r.recovery_pose(), POSE_PRONE_RECOVERY);
    }

    #[test]
    fn upright_root_selects_the_supine_pose() {
        let mut params = quiet_params();
        params.recovery.recovery_time = DT;
        let mut r = ragdoll(params);
        let anim = rest_anim(&r);
        r.activate_ragdoll(DT);
        r.step(&anim, DT);
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::GettingUp);
        assert_eq!(r.recovery_pose(), POSE_SUPINE_RECOVERY);
    }

    #[test]
    fn freeze_suspends_physics_and_timers() {
        let mut r = ragdoll(quiet_params());
        let anim = rest_anim(&r);
        r.activate_ragdoll(0.25);
        for _ in 0..4 {
            r.step(&anim, DT);
        }
        let w = r.blend_weight();
        assert!(w > 0.0 && w < 1.0);

        r.freeze();
        for _ in 0..10 {
            r.step(&anim, DT);
        }
        assert_eq!(r.blend_weight(), w, "frozen ramp must not move");
        assert_eq!(r.state(), RagdollState::Blend);

        r.unfreeze();
        r.step(&anim, DT);
        assert!(r.blend_weight() > w);
    }

    #[test]
    fn deactivate_returns_to_animated_once() {
        let mut r = ragdoll(quiet_params());
        let anim = rest_anim(&r);
        r.activate_ragdoll(0.25);
        r.step(&anim, DT);
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::Blend);

        r.deactivate_ragdoll();
        r.step(&anim, DT);
        assert_eq!(r.state(), RagdollState::Animated);
        assert!(r.drain_events().contains(&RagdollEvent::Deactivated));

        r.deactivate_ragdoll();
        r.step(&anim, DT);
        assert!(!r.drain_events().contains(&RagdollEvent::Deactivated), "redundant deactivate is silent");
    }

    #[test]
    fn pose_changes_are_validated() {
        let mut r = ragdoll(quiet_params());
        let anim = rest_anim(&r);
        r.set_pose(POSE_PRONE_RECOVERY);
        r.step(&anim, DT);
        assert_eq!(r.active_pose(), POSE_PRONE_RECOVERY);
        assert!(r
            .drain_events()
            .contains(&RagdollEvent::PoseChanged(POSE_PRONE_RECOVERY.to_string())));

        r.set_pose("handstand");
        r.step(&anim, DT);
        assert_eq!(r.active_pose(), POSE_PRONE_RECOVERY, "unknown pose is a no-op");
        assert!(r.drain_events().is_empty());
    }

    #[test]
    fn group_strength_scale_applies_next_tick() {
        let mut r = ragdoll(quiet_params());
        let anim = rest_anim(&r);
        r.set_muscle_strength(MuscleGroup::Arms, 0.5);
        assert_eq!(r.muscle_strength(MuscleGroup::Arms), 1.0);
        r.step(&anim, DT);
        assert_eq!(r.muscle_strength(MuscleGroup::Arms), 0.5);
        assert_eq!(r.muscle_strength(MuscleGroup::Legs), 1.0);
    }

    #[test]
    fn animated_playback_follows_the_animation_source() {
        let mut r = ragdoll(quiet_params());
        let mut anim = rest_anim(&r);
        let head = part(&r, "head");
        let head_muscle = r
            .muscles()
            .iter()
            .find(|m| m.part == head)
            .map(|m| MuscleId(m.joint.0))
            .unwrap();
        let turned = Quat::from_rotation_y(0.5);
        anim.set(head_muscle, turned);

        r.step(&anim, DT);
        let pose = r.bone_transform(head).unwrap();
        assert!(pose.rot.dot(turned).abs() > 1.0 - 1e-5);
        // Still sitting on the chest through the rest offset.
        let chest_pose = r.bone_transform(part(&r, "chest")).unwrap();
        assert!((pose.pos.y - chest_pose.pos.y - 0.26).abs() < 1e-4);
    }

    #[test]
    fn step_hash_is_deterministic() {
        let script = |r: &mut Ragdoll, anim: &StaticAnimation| {
            r.activate_ragdoll(0.25);
            for _ in 0..8 {
                r.step(anim, DT);
            }
            r.step_hash()
        };
        let mut a = ragdoll(quiet_params());
        let anim_a = rest_anim(&a);
        let mut b = ragdoll(quiet_params());
        let anim_b = rest_anim(&b);
        assert_eq!(script(&mut a, &anim_a), script(&mut b, &anim_b));

        // Diverge one of them.
        let chest = part(&a, "chest");
        a.apply_impact(chest, vec3(50.0, 0.0, 0.0), Vec3::ZERO, 0.0);
        a.step(&anim_a, DT);
        b.step(&anim_b, DT);
        assert_ne!(a.step_hash(), b.step_hash());
    }

    #[test]
    fn gravity_run_stays_coherent() {
        // Full default gravity: activate and let it slump for a second; the
        // skeleton must stay assembled (joints hold) and above the floor.
        let mut r = ragdoll(RagdollParams::default());
        let anim = rest_anim(&r);
        r.activate_ragdoll(0.125);
        for _ in 0..64 {
            r.step(&anim, DT);
        }
        for p in [part(&r, "head"), part(&r, "pelvis"), part(&r, "l_foot")] {
            let pose = r.bone_transform(p).unwrap();
            assert!(pose.pos.y > -0.2, "part sank through the floor: {:?}", pose.pos);
            assert!(pose.pos.length() < 10.0, "part flew away: {:?}", pose.pos);
        }
        // Parent/child parts stay within anchor reach.
        let pelvis = r.bone_transform(part(&r, "pelvis")).unwrap().pos;
        let spine = r.bone_transform(part(&r, "spine")).unwrap().pos;
        assert!((pelvis - spine).length() < 0.6);
    }
}
