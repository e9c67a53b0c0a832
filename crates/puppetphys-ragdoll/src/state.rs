use puppetphys_core::Scalar;

/// Whole-body control mode. One per ragdoll, never per part.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RagdollState {
    Animated = 0,
    Blend = 1,
    Active = 2,
    GettingUp = 3,
    Dead = 4,
}

impl RagdollState {
    #[inline] pub fn code(self) -> u8 { self as u8 }
}

/// What `advance` just completed, if anything.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Transition {
    BlendDone,
    GotUp,
}

/// Timed transitions are plain scalars advanced once per tick; there is no
/// suspension, so a fixed tick drives everything.
pub struct StateMachine {
    state: RagdollState,
    blend_weight: Scalar,
    blend_time: Scalar,
    getup_time: Scalar,
}

impl StateMachine {
    pub fn new(getup_time: Scalar) -> Self {
        Self {
            state: RagdollState::Animated,
            blend_weight: 0.0,
            blend_time: 0.25,
            getup_time: getup_time.max(1.0e-6),
        }
    }

    #[inline] pub fn state(&self) -> RagdollState { self.state }
    #[inline] pub fn blend_weight(&self) -> Scalar { self.blend_weight }

    /// Animated -> Blend. Anything else is a no-op.
    pub fn begin_blend(&mut self, blend_time: Scalar) -> bool {
        if self.state != RagdollState::Animated { return false; }
        self.state = RagdollState::Blend;
        self.blend_time = blend_time.max(1.0e-6);
        self.blend_weight = 0.0;
        true
    }

    /// Active -> GettingUp. The weight ramps back down from 1.
    pub fn begin_getting_up(&mut self) -> bool {
        if self.state != RagdollState::Active { return false; }
        self.state = RagdollState::GettingUp;
        self.blend_weight = 1.0;
        true
    }

    /// Snap back to Animated from any live simulated state.
    pub fn force_animated(&mut self) -> bool {
        match self.state {
            RagdollState::Blend | RagdollState::Active | RagdollState::GettingUp => {
                self.state = RagdollState::Animated;
                self.blend_weight = 0.0;
                true
            }
            _ => false,
        }
    }

    /// Terminal. Absorbing: no transition ever leaves Dead.
    pub fn kill(&mut self) -> bool {
        if self.state == RagdollState::Dead { return false; }
        self.state = RagdollState::Dead;
        self.blend_weight = 0.0;
        true
    }

    /// Advance the blend ramps. Blend completes into Active exactly when the
    /// weight reaches 1; GettingUp completes into Animated at 0.
    pub fn advance(&mut self, dt: Scalar) -> Option<Transition> {
        match self.state {
            RagdollState::Blend => {
                self.blend_weight += dt / self.blend_time;
                if self.blend_weight >= 1.0 {
                    self.blend_weight = 1.0;
                    self.state = RagdollState::Active;
                    Some(Transition::BlendDone)
                } else {
                    None
                }
            }
            RagdollState::GettingUp => {
                self.blend_weight -= dt / self.getup_time;
                if self.blend_weight <= 0.0 {
                    self.blend_weight = 0.0;
                    self.state = RagdollState::Animated;
                    Some(Transition::GotUp)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}
