//! Fixture-driven headless runs with JSON output, used for golden tests of MSC scripts.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::assets::BakedAssets;
use crate::camera::CameraState;
use crate::components::ComponentRegistry;
use crate::engine::Engine;
use crate::entity::{slot_index, slot_ptrs};
use crate::imports::{resolve, DiskTree, MemoryTree, ResolvedDocument};
use crate::input::InputSnapshot;
use crate::state::EngineState;
use crate::triggers::read_global;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessFixture {
    /// Entry script path, relative to the fixture file.
    #[serde(default)]
    pub script: Option<String>,
    /// Inline entry script, used when `script` is absent.
    #[serde(default)]
    pub source: Option<String>,
    /// Extra in-memory files that an inline `source` may import.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default = "default_steps")]
    pub steps: usize,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_true")]
    pub spawn_instances: bool,
    #[serde(default)]
    pub inputs: Vec<FixtureInput>,
    #[serde(default)]
    pub assets: BakedAssets,
    /// Schema variables recorded after every step.
    #[serde(default)]
    pub watch: Vec<String>,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_steps() -> usize {
    60
}

fn default_dimension() -> u32 {
    crate::buffer::layout::DEFAULT_WIDTH
}

fn default_true() -> bool {
    true
}

/// Actions and keys held for steps `from..to`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureInput {
    #[serde(default)]
    pub from: usize,
    pub to: usize,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HarnessOutput {
    pub steps: usize,
    pub diagnostics: Vec<String>,
    pub import_errors: Vec<String>,
    pub results: Vec<StepResult>,
    pub final_entities: Vec<EntitySummary>,
    pub camera: CameraState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step: usize,
    pub fired_events: usize,
    pub ticked_entities: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub globals: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySummary {
    pub slot: usize,
    pub entity: String,
    pub position: [u16; 2],
    pub velocity: [i16; 2],
    pub health: u8,
    pub sprite: u8,
}

fn snapshot_for(fixture: &HarnessFixture, step: usize) -> InputSnapshot {
    let mut snapshot = InputSnapshot::new();
    for held in fixture.inputs.iter().filter(|held| (held.from..held.to).contains(&step)) {
        held.actions.iter().for_each(|action| snapshot.press(action));
        held.keys.iter().for_each(|key| snapshot.hold_key(key));
    }
    snapshot
}

fn resolve_entry(fixture: &HarnessFixture) -> Result<ResolvedDocument> {
    if let Some(script) = &fixture.script {
        let path = fixture.base_dir.join(script);
        let text = fs::read_to_string(&path).with_context(|| format!("reading script '{}'", path.display()))?;
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let file_id = path.file_name().and_then(|name| name.to_str()).unwrap_or("main.msc").to_string();
        return Ok(resolve(&DiskTree::new(root), &text, &file_id));
    }
    let Some(source) = &fixture.source else {
        bail!("fixture needs either `script` or `source`");
    };
    let mut tree = MemoryTree::new().with_file("main.msc", source);
    for (id, contents) in &fixture.files {
        tree.insert(id, contents);
    }
    Ok(resolve(&tree, source, "main.msc"))
}

pub fn run_fixture(fixture: &HarnessFixture) -> Result<HarnessOutput> {
    let resolved = resolve_entry(fixture)?;
    let document = Arc::new(resolved.document);
    let mut engine = Engine::new(Arc::clone(&document), ComponentRegistry::with_builtins());
    let mut state = EngineState::with_seed(fixture.width, fixture.height, fixture.seed);
    if fixture.spawn_instances {
        engine.spawn_instances(&mut state)?;
    }

    let mut results = Vec::with_capacity(fixture.steps);
    for step in 0..fixture.steps {
        let input = snapshot_for(fixture, step);
        let report = engine.tick(&mut state, &input, &fixture.assets);
        let globals = fixture
            .watch
            .iter()
            .map(|name| {
                let key = crate::expr::variable_name(name).unwrap_or(name).to_string();
                let value = read_global(&state.buffer, &document.schema, &key);
                (key, value)
            })
            .collect();
        let faults = report
            .faults
            .iter()
            .map(|fault| format!("{}.{}: {}", fault.entity, fault.component, fault.message))
            .collect();
        results.push(StepResult {
            step,
            fired_events: report.fired_events,
            ticked_entities: report.ticked_entities,
            faults,
            globals,
        });
    }

    Ok(HarnessOutput {
        steps: fixture.steps,
        diagnostics: engine.diagnostics().to_vec(),
        import_errors: resolved.errors,
        results,
        final_entities: collect_entities(&state, &engine)?,
        camera: state.camera,
    })
}

fn collect_entities(state: &EngineState, engine: &Engine) -> Result<Vec<EntitySummary>> {
    let buffer = &state.buffer;
    let mut out = Vec::new();
    for ptr in slot_ptrs(buffer.len()) {
        if !buffer.is_active(ptr)? {
            continue;
        }
        let type_id = buffer.type_id(ptr)?;
        let entity = engine
            .document()
            .entity_by_type(type_id)
            .map_or_else(|| format!("type{type_id}"), |(name, _)| name.to_string());
        let (x, y) = buffer.position(ptr)?;
        let (vx, vy) = buffer.velocity(ptr)?;
        out.push(EntitySummary {
            slot: slot_index(ptr).unwrap_or_default(),
            entity,
            position: [x, y],
            velocity: [vx, vy],
            health: buffer.health(ptr)?,
            sprite: buffer.sprite_id(ptr)?,
        });
    }
    Ok(out)
}

pub fn load_fixture<P: AsRef<Path>>(path: P) -> Result<HarnessFixture> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening fixture '{}'", path.display()))?;
    let mut fixture: HarnessFixture = serde_json::from_reader(file).with_context(|| "parsing fixture JSON")?;
    fixture.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(fixture)
}
