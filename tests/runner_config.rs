use std::fs;
use std::io::Write;

use msc_engine::assets::BakedAssets;
use msc_engine::config::{EngineConfig, EngineConfigOverrides};
use msc_engine::input::InputSnapshot;
use msc_engine::runner::{load_assets, run_script};
use tempfile::{tempdir, NamedTempFile};

#[test]
fn config_file_overrides_defaults_and_bindings() {
    let mut temp = NamedTempFile::new().expect("temp config");
    write!(
        temp,
        r#"{{"runner":{{"frames":5,"seed":3}},"input":{{"bindings":{{"Jump":["k","Space"]}}}}}}"#
    )
    .expect("write config");

    let config = EngineConfig::load(temp.path()).expect("config loads");
    assert_eq!(config.runner.frames, 5);
    assert_eq!(config.runner.seed, Some(3));
    assert_eq!((config.state.width, config.state.height), (64, 64), "missing sections keep defaults");

    let bindings = config.input.to_bindings();
    let mut held = InputSnapshot::new();
    held.hold_key("K");
    assert!(bindings.apply(&held).is_active("Jump"), "keys match case-insensitively");
}

#[test]
fn undersized_state_is_rejected_and_falls_back() {
    let mut temp = NamedTempFile::new().expect("temp config");
    write!(temp, r#"{{"state":{{"width":32,"height":32}}}}"#).expect("write config");
    let err = EngineConfig::load(temp.path()).expect_err("too small");
    assert!(format!("{err:#}").contains("16384"), "got {err:#}");

    let fallback = EngineConfig::load_or_default(temp.path());
    assert_eq!(fallback.state.width, 64);
}

#[test]
fn cli_overrides_win_over_the_file() {
    let mut config = EngineConfig::default();
    let overrides = EngineConfigOverrides { width: Some(128), frames: Some(2), ..Default::default() };
    config.apply_overrides(&overrides);
    assert_eq!(config.state.width, 128);
    assert_eq!(config.state.height, 64);
    assert_eq!(config.runner.frames, 2);
    assert_eq!(overrides.applied_fields(), vec!["width", "frames"]);
    assert!(config.validate().is_ok());
}

#[test]
fn run_script_ticks_the_configured_frames() {
    let dir = tempdir().expect("temp dir");
    let script = dir.path().join("drop.msc");
    fs::write(
        &script,
        "\
Schema:
  - { name: ticks, addr: 64, type: Int16 }
Entity.Crate:
  Gravity: {}
  Kinematic: {}
  Lifetime: { frames: 3 }
Events:
  - OnFrame: State.$ticks += 1
Instances:
  - { entity: Crate, x: 5, y: 5 }
  - { entity: Crate, x: 9, y: 5 }
",
    )
    .expect("write script");

    let mut config = EngineConfig::default();
    config.runner.frames = 10;
    config.runner.seed = Some(1);
    config.runner.report_every = 0;
    let (state, summary) = run_script(&script, &config, &BakedAssets::new()).expect("run");
    assert_eq!(summary.frames, 10);
    assert_eq!(summary.fired_events, 10);
    assert_eq!(summary.active_entities, 0, "lifetimes expire");
    assert_eq!(summary.faults, 0);
    assert_eq!(state.tick_count, 10);
    assert_eq!(state.buffer.read_int16(64).expect("ticks"), 10);
}

#[test]
fn baked_assets_load_from_json() {
    let mut temp = NamedTempFile::new().expect("temp assets");
    write!(temp, r#"{{"collisionPolygons":[[[0,0],[4,0],[4,4],[0,4]]],"bezierPaths":[]}}"#).expect("write assets");
    let assets = load_assets(temp.path()).expect("assets load");
    assert_eq!(assets.collision_polygons.len(), 1);
    assert!(assets.bezier_paths.is_empty());
}
