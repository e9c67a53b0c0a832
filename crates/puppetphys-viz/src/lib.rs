use puppetphys_core::{StepStage, schedule_digest};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Default)]
pub struct ScheduleRecorder { stages: Vec<StepStage> }

impl ScheduleRecorder {
    pub fn new() -> Self { Self { stages: Vec::new() } }
    pub fn push(&mut self, s: StepStage) { self.stages.push(s); }
    pub fn clear(&mut self) { self.stages.clear(); }
    pub fn digest(&self) -> [u8; 32] { schedule_digest(&self.stages) }
}

/// Tick-gated debug output. Zero means off.
#[derive(Copy, Clone, Debug)]
pub struct DebugSettings {
    pub print_every: u32,
    pub json_every: u32,
    pub show_bodies: bool,
    pub show_muscles: bool,
    pub show_balance: bool,
    pub max_lines: usize,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            print_every: 0,
            json_every: 0,
            show_bodies: false,
            show_muscles: false,
            show_balance: false,
            max_lines: 24,
        }
    }
}

/// Per-tick telemetry, written as JSONL when enabled.
#[derive(Copy, Clone, Debug, Serialize)]
pub enum LedgerEvent {
    StateChange { from: u8, to: u8 },
    MuscleTorque { muscle: u32, torque: [f32; 3] },
    Impact { part: u32, force: [f32; 3], damage: f32 },
    Balance { com: [f32; 3], support: [f32; 3], contacts: u32, balanced: bool },
    Recovery { countdown: f32, lie_still: f32 },
    GroundClamp { part: u32, push: f32 },
}

pub struct Ledger {
    events: Vec<LedgerEvent>,
    cap: usize,
}

impl Ledger {
    pub fn new(cap: usize) -> Self {
        Self { events: Vec::with_capacity(cap.min(1024)), cap }
    }

    pub fn push(&mut self, e: LedgerEvent) {
        if self.events.len() < self.cap { self.events.push(e); }
    }

    pub fn clear(&mut self) { self.events.clear(); }
    pub fn len(&self) -> usize { self.events.len() }
    pub fn is_empty(&self) -> bool { self.events.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &LedgerEvent> {
        self.events.iter()
    }

    /// One file per tick: `<dir>/tick_<n>.jsonl`, one event per line.
    pub fn write_jsonl(&self, dir: &str, tick: u64) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = Path::new(dir).join(format!("tick_{tick:06}.jsonl"));
        let mut f = std::fs::File::create(path)?;
        for e in &self.events {
            let line = serde_json::to_string(e)?;
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_caps_out() {
        let mut l = Ledger::new(2);
        for i in 0..5 {
            l.push(LedgerEvent::Recovery { countdown: i as f32, lie_still: 0.0 });
        }
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn events_serialize_to_json() {
        let e = LedgerEvent::Balance {
            com: [0.0, 1.0, 0.0],
            support: [0.0, 0.0, 0.0],
            contacts: 2,
            balanced: true,
        };
        let s = serde_json::to_string(&e).unwrap();
        assert!(s.contains("Balance"));
        assert!(s.contains("balanced"));
    }
}
