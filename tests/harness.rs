use std::fs::File;
use std::path::PathBuf;

use msc_engine::harness::{load_fixture, run_fixture, HarnessFixture, HarnessOutput};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join("harness").join(name)
}

#[test]
fn counter_matches_golden() {
    let fixture = load_fixture(fixture_path("counter.json")).expect("fixture loads");
    let output = run_fixture(&fixture).expect("fixture runs");
    let golden: HarnessOutput = serde_json::from_reader(
        File::open(fixture_path("counter.golden.json")).expect("golden file"),
    )
    .expect("golden parses");
    assert_eq!(
        output,
        golden,
        "actual output:\n{}",
        serde_json::to_string_pretty(&output).unwrap_or_default()
    );
}

#[test]
fn seeded_runs_are_deterministic() {
    let source = "\
Schema:
  - { name: hits, addr: 64 }
Entity.Quake:
  ScreenShake: { intensity: 4 }
  Camera: { zoom: 2, followSpeed: 0.5 }
Instances:
  - { entity: Quake, x: 40, y: 30 }
";
    let fixture: HarnessFixture = serde_json::from_value(serde_json::json!({
        "source": source,
        "steps": 12,
        "seed": 99,
    }))
    .expect("fixture json");
    let first = run_fixture(&fixture).expect("first run");
    let second = run_fixture(&fixture).expect("second run");
    assert_eq!(first, second);
    assert_eq!(first.final_entities.len(), 1);
    assert_eq!(first.camera.zoom, 2.0);
}

#[test]
fn inline_sources_may_import_inline_files() {
    let fixture: HarnessFixture = serde_json::from_value(serde_json::json!({
        "source": "Import: lib/bugs\nInstances:\n  - { entity: Bug, x: 1, y: 2 }\n  - { entity: Nobody }\n",
        "files": { "lib/bugs.msc": "Entity.Bug:\n  Health: { max: 9 }\n  Kinematic: {}\n" },
        "steps": 1,
    }))
    .expect("fixture json");
    let output = run_fixture(&fixture).expect("run");
    assert!(output.import_errors.is_empty(), "{:?}", output.import_errors);
    assert_eq!(output.final_entities.len(), 1, "unknown instances are skipped");
    assert_eq!(output.final_entities[0].entity, "Bug");
    assert_eq!(output.final_entities[0].health, 9);
    assert_eq!(output.final_entities[0].position, [1, 2]);
}

#[test]
fn fixtures_need_a_script() {
    let fixture: HarnessFixture = serde_json::from_value(serde_json::json!({ "steps": 1 })).expect("fixture json");
    assert!(run_fixture(&fixture).is_err());
}
