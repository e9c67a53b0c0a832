// Impact -> fall -> recover scenario against the built-in humanoid.
// Deterministic: fixed dt, fixed scenario script, per-phase hash report.

use glam::Quat;
use puppetphys_core::vec3;
use puppetphys_muscle::StaticAnimation;
use puppetphys_ragdoll::{Ragdoll, RagdollEvent, RagdollParams, RagdollState};
use puppetphys_viz::DebugSettings;

/* ---------- tiny env helpers ---------- */
fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|s| s.parse::<u32>().ok()).unwrap_or(default)
}
fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key).ok().and_then(|s| s.parse::<f32>().ok()).unwrap_or(default)
}

fn hash_prefix(h: [u8; 32]) -> String {
    h[..8].iter().map(|b| format!("{b:02x}")).collect()
}

fn drain_and_print(r: &mut Ragdoll, tick: u32) {
    for ev in r.drain_events() {
        match ev {
            RagdollEvent::ImpactReceived { part, force, .. } => {
                println!("tick {tick:4}  event: impact on {part} |f|={:.1}", force.length());
            }
            other => println!("tick {tick:4}  event: {other:?}"),
        }
    }
}

fn main() {
    let dt = 1.0 / 64.0;
    let animated_ticks = env_u32("BENCH_ANIMATED_TICKS", 32);
    let sim_ticks = env_u32("BENCH_SIM_TICKS", 512);
    let impact_force = env_f32("BENCH_IMPACT_FORCE", 900.0);
    let print_every = env_u32("BENCH_PRINT_EVERY", 0);

    let mut r = Ragdoll::humanoid_on_ground(RagdollParams::default())
        .expect("built-in humanoid must build");
    r.set_debug(DebugSettings {
        print_every,
        show_balance: print_every != 0,
        ..DebugSettings::default()
    });

    // Rest-pose animation stand-in for the external clip player.
    let mut targets = vec![Quat::IDENTITY; r.muscles().len()];
    for m in r.muscles() {
        targets[m.joint.0 as usize] = r.bone_transform(m.part).unwrap().rot;
    }
    let anim = StaticAnimation::new(targets);

    let mut tick = 0u32;

    println!("== phase: animated ({animated_ticks} ticks) ==");
    for _ in 0..animated_ticks {
        tick += 1;
        r.step(&anim, dt);
        drain_and_print(&mut r, tick);
    }
    println!("state={:?}  hash={}", r.state(), hash_prefix(r.step_hash()));

    println!("== phase: impact (|f|={impact_force}) ==");
    let chest = r.skeleton().part_by_name("chest").expect("humanoid has a chest");
    r.apply_impact(chest, vec3(impact_force, 0.0, 0.0), vec3(0.0, 0.05, 0.0), 25.0);

    println!("== phase: simulate (up to {sim_ticks} ticks) ==");
    let mut last_state = r.state();
    for _ in 0..sim_ticks {
        tick += 1;
        r.step(&anim, dt);
        drain_and_print(&mut r, tick);
        let s = r.state();
        if s != last_state {
            println!(
                "tick {tick:4}  {last_state:?} -> {s:?}  w={:.3}  balanced={}  damage={:.1}",
                r.blend_weight(),
                r.is_balanced(),
                r.accumulated_damage()
            );
            last_state = s;
        }
        if s == RagdollState::Animated {
            println!("recovered to animated control at tick {tick}");
            break;
        }
    }

    println!(
        "== done ==  ticks={tick}  state={:?}  damage={:.1}  hash={}",
        r.state(),
        r.accumulated_damage(),
        hash_prefix(r.step_hash())
    );
}
