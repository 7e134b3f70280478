use std::sync::Arc;

use msc_engine::assets::BakedAssets;
use msc_engine::components::ComponentRegistry;
use msc_engine::input::InputSnapshot;
use msc_engine::triggers::read_global;
use msc_engine::{parse_document, Engine, EngineState};

fn engine(source: &str) -> Engine {
    let doc = parse_document(source).expect("script parses");
    Engine::new(Arc::new(doc), ComponentRegistry::with_builtins())
}

fn global(engine: &Engine, state: &EngineState, name: &str) -> f64 {
    read_global(&state.buffer, &engine.document().schema, name)
}

const COUNTERS: &str = "\
Schema:
  - { name: ticks, addr: 64, type: Int16 }
  - { name: jumps, addr: 66 }
  - { name: a, addr: 70 }
  - { name: b, addr: 71 }
  - { name: c, addr: 72 }
  - { name: hit, addr: 73 }
  - { name: alarm, addr: 74 }
Input:
  Space: Action.Jump
";

#[test]
fn on_frame_fires_every_tick() {
    let mut engine = engine(&format!("{COUNTERS}Events:\n  - OnFrame: State.$ticks += 1\n"));
    let mut state = EngineState::with_seed(64, 64, 0);
    let assets = BakedAssets::new();
    for _ in 0..300 {
        engine.tick(&mut state, &InputSnapshot::new(), &assets);
    }
    assert_eq!(global(&engine, &state, "ticks"), 300.0, "Int16 globals count past 255");
}

#[test]
fn input_triggers_use_document_bindings() {
    let mut engine = engine(&format!("{COUNTERS}Events:\n  - Input(Action.Jump): State.$jumps += 1\n"));
    let mut state = EngineState::with_seed(64, 64, 0);
    let assets = BakedAssets::new();

    let idle = engine.tick(&mut state, &InputSnapshot::new(), &assets);
    assert_eq!(idle.fired_events, 0);

    let mut held = InputSnapshot::new();
    held.hold_key("Space");
    let report = engine.tick(&mut state, &held, &assets);
    assert_eq!(report.fired_events, 1);

    engine.tick(&mut state, &InputSnapshot::from_actions(["Jump"]), &assets);
    assert_eq!(global(&engine, &state, "jumps"), 2.0, "host actions fire the trigger directly");
}

#[test]
fn state_triggers_follow_operator_precedence() {
    let mut engine = engine(&format!(
        "{COUNTERS}Events:\n  - \"State($a == 1 || $b == 1 && $c == 1)\": State.$alarm = 1\n"
    ));
    let mut state = EngineState::with_seed(64, 64, 0);
    state.buffer.write_int8(70, 1.0).expect("a");
    engine.tick(&mut state, &InputSnapshot::new(), &BakedAssets::new());
    assert_eq!(global(&engine, &state, "alarm"), 1.0, "&& binds tighter than ||");
}

#[test]
fn state_triggers_stay_quiet_when_false() {
    let mut engine = engine(&format!("{COUNTERS}Events:\n  - \"State($a > 0)\": State.$alarm = 5\n"));
    let mut state = EngineState::with_seed(64, 64, 0);
    let report = engine.tick(&mut state, &InputSnapshot::new(), &BakedAssets::new());
    assert_eq!(report.fired_events, 0);
    assert_eq!(global(&engine, &state, "alarm"), 0.0);
}

#[test]
fn collision_triggers_scan_the_pixel_buffer() {
    let mut engine = engine(&format!(
        "{COUNTERS}Events:\n  - \"Collision(Player:#FF0000, Water:#0000FF)\": State.$hit = 1\n"
    ));
    let mut state = EngineState::with_seed(64, 64, 0);
    let assets = BakedAssets::new();
    engine.tick(&mut state, &InputSnapshot::new(), &assets);
    assert_eq!(global(&engine, &state, "hit"), 0.0);

    let bytes = state.buffer.as_bytes_mut();
    bytes[3100 * 4..3100 * 4 + 4].copy_from_slice(&[255, 0, 0, 255]);
    bytes[3101 * 4..3101 * 4 + 4].copy_from_slice(&[0, 0, 255, 7]);
    engine.tick(&mut state, &InputSnapshot::new(), &assets);
    assert_eq!(global(&engine, &state, "hit"), 1.0, "alpha does not matter");
}

#[test]
fn collision_does_not_wrap_rows() {
    let mut engine = engine(&format!("{COUNTERS}Events:\n  - \"Collision(#FF0000, #0000FF)\": State.$hit = 1\n"));
    let mut state = EngineState::with_seed(64, 64, 0);
    let bytes = state.buffer.as_bytes_mut();
    let end_of_row = 3199;
    bytes[end_of_row * 4..end_of_row * 4 + 3].copy_from_slice(&[255, 0, 0]);
    bytes[(end_of_row + 1) * 4..(end_of_row + 1) * 4 + 3].copy_from_slice(&[0, 0, 255]);
    engine.tick(&mut state, &InputSnapshot::new(), &BakedAssets::new());
    assert_eq!(global(&engine, &state, "hit"), 0.0);
}

#[test]
fn actions_on_unknown_variables_are_skipped() {
    let mut engine = engine(&format!(
        "{COUNTERS}Events:\n  - OnFrame: [State.$missing = 9, State.$a = $a + 2]\n"
    ));
    let mut state = EngineState::with_seed(64, 64, 0);
    let before = state.buffer.clone();
    let report = engine.tick(&mut state, &InputSnapshot::new(), &BakedAssets::new());
    assert_eq!(report.fired_events, 1);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(global(&engine, &state, "a"), 2.0);
    let changed: Vec<usize> = before
        .as_bytes()
        .iter()
        .zip(state.buffer.as_bytes())
        .enumerate()
        .filter(|(_, (x, y))| x != y)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(changed, vec![70]);
}

#[test]
fn events_run_before_entities_in_declaration_order() {
    let source = format!(
        "{COUNTERS}Events:\n  - OnFrame: State.$a = 3\n  - OnFrame: State.$b = $a + $a\n\
Entity.Hero:\n  Kinematic: {{}}\n  States:\n    fast:\n      condition: \"$b == 6\"\n      Gravity: {{ force: 4 }}\n"
    );
    let mut engine = engine(&source);
    let mut state = EngineState::with_seed(64, 64, 0);
    let hero = engine.spawn(&mut state, "Hero", 0, 0).expect("spawn").expect("slot");
    let report = engine.tick(&mut state, &InputSnapshot::new(), &BakedAssets::new());
    assert_eq!(report.fired_events, 2);
    assert_eq!(global(&engine, &state, "b"), 6.0);
    assert_eq!(state.buffer.velocity(hero).expect("velocity"), (0, 4), "entity states see this tick's globals");
}
