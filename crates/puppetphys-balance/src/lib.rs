use puppetphys_core::{BodyId, Scalar, Vec3, quantize, vec3};
use puppetphys_dynamics::Bodies;
use puppetphys_geom::{Shape, half_height_world};

/// Whatever the body can stand on. Queried by the downward support probes.
pub trait SupportSurface {
    /// Surface height under (x, z), or None where there is nothing to hit.
    fn height_at(&self, x: Scalar, z: Scalar) -> Option<Scalar>;
}

#[derive(Copy, Clone, Debug)]
pub struct FlatGround {
    pub y: Scalar,
}

impl SupportSurface for FlatGround {
    fn height_at(&self, _x: Scalar, _z: Scalar) -> Option<Scalar> {
        Some(self.y)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct BalanceParams {
    /// Length of the downward probe below each support part.
    pub probe_len: Scalar,
    /// Max ground-plane distance between COM and support centroid.
    pub tolerance: Scalar,
}

impl Default for BalanceParams {
    fn default() -> Self {
        Self { probe_len: 0.3, tolerance: 0.25 }
    }
}

/// One tick's balance picture. Recomputed every evaluation; never persisted.
#[derive(Copy, Clone, Debug)]
pub struct BalanceSample {
    pub com: Vec3,
    pub support: Vec3,
    pub contacts: u32,
    pub balanced: bool,
}

impl Default for BalanceSample {
    fn default() -> Self {
        Self { com: Vec3::ZERO, support: Vec3::ZERO, contacts: 0, balanced: false }
    }
}

/// Mass-weighted average of body positions.
pub fn center_of_mass(bodies: &Bodies, masses: &[(BodyId, Scalar)]) -> Vec3 {
    let mut acc = Vec3::ZERO;
    let mut total = 0.0;
    for &(id, m) in masses {
        acc += bodies.pose(id.0).pos * m;
        total += m;
    }
    if total <= 0.0 { return Vec3::ZERO; }
    let com = acc / total;
    vec3(quantize(com.x), quantize(com.y), quantize(com.z))
}

#[derive(Copy, Clone, Debug, Default)]
pub struct BalanceEstimator {
    pub params: BalanceParams,
}

impl BalanceEstimator {
    pub fn new(params: BalanceParams) -> Self { Self { params } }

    /// COM vs. the centroid of support contacts. The test is a fixed-radius
    /// distance check from the centroid, not true polygon containment; an
    /// empty support set reads as unbalanced, never as an error.
    pub fn sample<S: SupportSurface + ?Sized>(
        &self,
        bodies: &Bodies,
        masses: &[(BodyId, Scalar)],
        feet: &[(BodyId, Shape)],
        ground: &S,
    ) -> BalanceSample {
        let com = center_of_mass(bodies, masses);

        let mut acc = Vec3::ZERO;
        let mut contacts = 0u32;
        for &(id, shape) in feet {
            let pose = bodies.pose(id.0);
            let bottom = pose.pos.y - half_height_world(&shape, pose.rot);
            if let Some(h) = ground.height_at(pose.pos.x, pose.pos.z) {
                if bottom - h <= self.params.probe_len {
                    acc += vec3(pose.pos.x, h, pose.pos.z);
                    contacts += 1;
                }
            }
        }

        if contacts == 0 {
            return BalanceSample { com, support: Vec3::ZERO, contacts: 0, balanced: false };
        }

        let support = acc / contacts as Scalar;
        let dx = com.x - support.x;
        let dz = com.z - support.z;
        let dist = quantize((dx * dx + dz * dz).sqrt());
        BalanceSample {
            com,
            support,
            contacts,
            balanced: dist < self.params.tolerance,
        }
    }
}
