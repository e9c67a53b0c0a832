use puppetphys_core::{PartId, Vec3};

/// Per-tick event queue entries, drained by the caller via
/// `Ragdoll::drain_events`. No callback registration, no retained handlers.
#[derive(Clone, Debug, PartialEq)]
pub enum RagdollEvent {
    Activated,
    Deactivated,
    ImpactReceived { part: PartId, force: Vec3, point: Vec3 },
    FellDown,
    GotUp,
    PoseChanged(String),
}
