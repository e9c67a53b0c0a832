#[derive(Copy, Clone, Debug, Default)]
pub struct StepStats {
    pub muscles_driven: u32,
    pub forces_active: u32,
    pub supports: u32,
}
