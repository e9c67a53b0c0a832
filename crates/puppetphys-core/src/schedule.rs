use crate::StepHasher;

#[repr(u8)]
#[derive(Copy, Clone, Debug)]
pub enum StepStage {
    ApplyCommands = 1,
    Integrate = 2,
    Balance = 3,
    StateUpdate = 4,
    MuscleDrive = 5,
    ExternalForces = 6,
    Recovery = 7,
    SolveJoints = 8,
    GroundContact = 9,
}

pub fn schedule_digest(stages: &[StepStage]) -> [u8; 32] {
    let mut h = StepHasher::new();
    for s in stages { h.update_bytes(&[*s as u8]); }
    h.finalize()
}
