use puppetphys_core::{BodyId, PartId, Scalar, Vec3};
use puppetphys_dynamics::Bodies;

#[derive(Copy, Clone, Debug)]
pub struct ImpactParams {
    /// Lifetime of one queued impact; repeat calls stack fresh entries.
    pub impact_duration: Scalar,
    /// Accumulated damage that triggers activation while animated.
    pub damage_threshold: Scalar,
    /// Single-impact force magnitude that triggers activation immediately.
    pub force_threshold: Scalar,
}

impl Default for ImpactParams {
    fn default() -> Self {
        Self {
            impact_duration: 1.0 / 30.0,
            damage_threshold: 50.0,
            force_threshold: 400.0,
        }
    }
}

/// Time-limited externally injected force. Removed once its duration runs out.
#[derive(Copy, Clone, Debug)]
pub struct ExternalForce {
    pub part: PartId,
    pub body: BodyId,
    pub force: Vec3,
    pub point_local: Vec3,
    pub ttl: Scalar,
}

/// Holds queued impacts, applies them each tick, prunes the expired ones, and
/// accumulates an opaque damage counter for callers to interpret.
pub struct ForceQueue {
    params: ImpactParams,
    entries: Vec<ExternalForce>,
    damage: Scalar,
    activation_pending: bool,
}

impl ForceQueue {
    pub fn new(params: ImpactParams) -> Self {
        Self { params, entries: Vec::new(), damage: 0.0, activation_pending: false }
    }

    pub fn push_impact(&mut self, part: PartId, body: BodyId, force: Vec3, point_local: Vec3, damage: Scalar) {
        self.entries.push(ExternalForce {
            part,
            body,
            force,
            point_local,
            ttl: self.params.impact_duration,
        });
        self.damage += damage.max(0.0);
        if force.length() >= self.params.force_threshold || self.damage >= self.params.damage_threshold {
            self.activation_pending = true;
        }
    }

    /// Consume the activation signal. Cleared whether or not the state
    /// machine acts on it, so a stale signal can never fire later.
    pub fn take_activation(&mut self) -> bool {
        std::mem::take(&mut self.activation_pending)
    }

    #[inline] pub fn damage(&self) -> Scalar { self.damage }
    #[inline] pub fn len(&self) -> usize { self.entries.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Apply every live entry at its world-space point, age it, and prune.
    /// Returns how many entries were applied this tick.
    pub fn apply(&mut self, bodies: &mut Bodies, dt: Scalar) -> u32 {
        let mut applied = 0u32;
        for e in &mut self.entries {
            let pose = bodies.pose(e.body.0);
            let point_world = pose.pos + pose.rot * e.point_local;
            bodies.apply_impulse_at_point(e.body.0, e.force * dt, point_world);
            e.ttl -= dt;
            applied += 1;
        }
        self.entries.retain(|e| e.ttl > 0.0);
        applied
    }
}
