use puppetphys_core::Scalar;

#[derive(Copy, Clone, Debug)]
pub struct RecoveryParams {
    /// Continuous balance needed before standing back up.
    pub recovery_time: Scalar,
    /// Sustained imbalance before the fall is acknowledged.
    pub fall_ack_time: Scalar,
    /// Delay after a fall before the balance countdown may run again.
    pub lie_still_time: Scalar,
}

impl Default for RecoveryParams {
    fn default() -> Self {
        Self { recovery_time: 1.0, fall_ack_time: 0.5, lie_still_time: 2.0 }
    }
}

/// Outcome of one recovery tick.
#[derive(Copy, Clone, Debug, Default)]
pub struct RecoveryTick {
    pub request_get_up: bool,
    pub fell_down: bool,
}

/// Countdown bookkeeping while the ragdoll is actively simulated. All timers
/// are plain scalars moved by tick delta.
pub struct Recovery {
    params: RecoveryParams,
    countdown: Scalar,
    unbalanced_for: Scalar,
    lie_still: Scalar,
    fall_acked: bool,
}

impl Recovery {
    pub fn new(params: RecoveryParams) -> Self {
        Self {
            params,
            countdown: params.recovery_time,
            unbalanced_for: 0.0,
            lie_still: 0.0,
            fall_acked: false,
        }
    }

    #[inline] pub fn countdown(&self) -> Scalar { self.countdown }
    #[inline] pub fn lie_still(&self) -> Scalar { self.lie_still }

    /// Fresh start: called when the body enters or leaves active simulation.
    pub fn reset(&mut self) {
        self.countdown = self.params.recovery_time;
        self.unbalanced_for = 0.0;
        self.lie_still = 0.0;
        self.fall_acked = false;
    }

    /// The one-shot fall notification re-arms once the body is back up.
    pub fn on_got_up(&mut self) {
        self.fall_acked = false;
        self.countdown = self.params.recovery_time;
        self.unbalanced_for = 0.0;
    }

    pub fn update(&mut self, balanced: bool, dt: Scalar) -> RecoveryTick {
        let mut out = RecoveryTick::default();
        if balanced {
            self.unbalanced_for = 0.0;
            if self.lie_still > 0.0 {
                self.lie_still = (self.lie_still - dt).max(0.0);
            } else {
                self.countdown -= dt;
                if self.countdown <= 0.0 {
                    out.request_get_up = true;
                    self.countdown = self.params.recovery_time;
                }
            }
        } else {
            // Any imbalance restarts the countdown from the top.
            self.countdown = self.params.recovery_time;
            self.unbalanced_for += dt;
            if self.unbalanced_for >= self.params.fall_ack_time && !self.fall_acked {
                self.fall_acked = true;
                self.lie_still = self.params.lie_still_time;
                out.fell_down = true;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 64.0;

    fn recovery(recovery_time: f32) -> Recovery {
        Recovery::new(RecoveryParams {
            recovery_time,
            fall_ack_time: 0.5,
            lie_still_time: 2.0,
        })
    }

    #[test]
    fn fires_after_exactly_one_second_of_balance() {
        let mut r = recovery(1.0);
        for i in 1..=64 {
            let t = r.update(true, DT);
            if i < 64 {
                assert!(!t.request_get_up, "tick {i} is too early");
            } else {
                assert!(t.request_get_up);
            }
        }
    }

    #[test]
    fn imbalance_resets_countdown() {
        let mut r = recovery(1.0);
        for _ in 0..48 {
            r.update(true, DT); // 0.75 s of balance
        }
        r.update(false, DT);
        // The countdown must now need the full second again.
        for i in 1..=64 {
            let t = r.update(true, DT);
            if i < 64 {
                assert!(!t.request_get_up, "tick {i} fired after a reset");
            } else {
                assert!(t.request_get_up);
            }
        }
    }

    #[test]
    fn fall_is_acknowledged_once() {
        let mut r = recovery(1.0);
        let mut fell = 0;
        for _ in 0..128 { // 2 s of imbalance
            if r.update(false, DT).fell_down { fell += 1; }
        }
        assert_eq!(fell, 1);
    }

    #[test]
    fn lie_still_delays_the_countdown() {
        let mut r = recovery(1.0);
        for _ in 0..64 {
            r.update(false, DT); // fall: acked at 0.5 s, lie_still armed
        }
        // 2 s lie-still + 1 s countdown = 192 balanced ticks to stand.
        let mut fired_at = None;
        for i in 1..=256 {
            if r.update(true, DT).request_get_up {
                fired_at = Some(i);
                break;
            }
        }
        assert_eq!(fired_at, Some(192));
    }

    #[test]
    fn got_up_rearms_the_fall_notification() {
        let mut r = recovery(1.0);
        for _ in 0..64 { r.update(false, DT); }
        r.on_got_up();
        let mut fell = false;
        for _ in 0..64 {
            if r.update(false, DT).fell_down { fell = true; }
        }
        assert!(fell, "second fall after standing must notify again");
    }
}
