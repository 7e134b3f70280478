use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::assets::BakedAssets;
use crate::components::ComponentRegistry;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::imports::resolve_file;
use crate::input::InputSnapshot;
use crate::state::EngineState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub frames: u32,
    pub active_entities: usize,
    pub fired_events: usize,
    pub faults: usize,
    pub import_errors: usize,
    pub diagnostics: usize,
}

pub fn load_assets(path: impl AsRef<Path>) -> Result<BakedAssets> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("Failed to read baked assets {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse baked assets {}", path.display()))
}

/// Runs `script` headless for `config.runner.frames` ticks with no input held.
pub fn run_script(script: &Path, config: &EngineConfig, assets: &BakedAssets) -> Result<(EngineState, RunSummary)> {
    config.validate()?;
    let resolved = resolve_file(script)?;
    let document = Arc::new(resolved.document);
    let mut engine =
        Engine::new(document, ComponentRegistry::with_builtins()).with_bindings(&config.input.to_bindings());
    let (width, height) = (config.state.width, config.state.height);
    let mut state = match config.runner.seed {
        Some(seed) => EngineState::with_seed(width, height, seed),
        None => EngineState::new(width, height),
    };
    let spawned = engine.spawn_instances(&mut state)?;
    println!("[engine] {} loaded: {spawned} instance(s) spawned", script.display());

    let mut summary = RunSummary {
        import_errors: resolved.errors.len(),
        diagnostics: engine.diagnostics().len(),
        ..RunSummary::default()
    };
    let input = InputSnapshot::new();
    for frame in 1..=config.runner.frames {
        let report = engine.tick(&mut state, &input, assets);
        summary.frames = frame;
        summary.fired_events += report.fired_events;
        summary.faults += report.faults.len();
        let every = config.runner.report_every;
        if every > 0 && frame % every == 0 {
            println!(
                "[engine] frame {frame}: {} entities, {} events fired, {} faults",
                report.ticked_entities,
                report.fired_events,
                report.faults.len()
            );
        }
    }
    summary.active_entities = state.buffer.active_slots().len();
    Ok((state, summary))
}
