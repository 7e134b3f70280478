use anyhow::{anyhow, bail, Result};
use msc_engine::components::ComponentRegistry;
use msc_engine::engine::Engine;
use msc_engine::imports::{resolve_file, ResolvedDocument};
use std::env;
use std::path::Path;
use std::process;
use std::sync::Arc;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:?}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };
    let mut script = |name: &str| {
        args.next().ok_or_else(|| anyhow!("{name} requires a path: msc_tool {name} <script>"))
    };
    match command.as_str() {
        "validate" => cmd_validate(&script("validate")?),
        "sprites" => cmd_sprites(&script("sprites")?),
        "entities" => cmd_entities(&script("entities")?),
        "dump" => cmd_dump(&script("dump")?),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => Err(anyhow!("unknown command '{other}'")),
    }
}

fn print_usage() {
    eprintln!(
        "MSC Tool

Usage:
  msc_tool validate <script>   Resolve imports and report parse, import and compile problems
  msc_tool sprites <script>    List sprite ids and their pixel rectangles
  msc_tool entities <script>   List entity types, components, states and scratch ranges
  msc_tool dump <script>       Print the merged document as JSON
  msc_tool help                Show this message
"
    );
}

fn load(path: &str) -> Result<(ResolvedDocument, Engine)> {
    let resolved = resolve_file(Path::new(path))?;
    let engine = Engine::new(Arc::new(resolved.document.clone()), ComponentRegistry::with_builtins());
    Ok((resolved, engine))
}

fn cmd_validate(path: &str) -> Result<()> {
    let (resolved, engine) = load(path)?;
    let issues: Vec<&String> = resolved.errors.iter().chain(engine.diagnostics()).collect();
    if issues.is_empty() {
        let doc = engine.document();
        println!(
            "{path}: OK ({} entities, {} events, {} sprites, {} schema vars)",
            doc.entities.len(),
            doc.events.len(),
            engine.atlas().len(),
            doc.schema.len()
        );
        return Ok(());
    }
    for issue in &issues {
        println!("- {issue}");
    }
    bail!("{path}: {} issue(s) found", issues.len())
}

fn cmd_sprites(path: &str) -> Result<()> {
    let (_, engine) = load(path)?;
    println!("grid {}", engine.document().grid_size());
    for (id, frame) in engine.atlas().frames() {
        println!(
            "{id:>3}  {}[{}]  x={} y={} w={} h={} ox={} oy={}",
            frame.name, frame.frame, frame.x, frame.y, frame.w, frame.h, frame.ox, frame.oy
        );
    }
    Ok(())
}

fn cmd_entities(path: &str) -> Result<()> {
    let (_, engine) = load(path)?;
    let doc = engine.document();
    for (name, def) in doc.entities.iter() {
        let type_id = doc.type_id(name).map_or_else(|| "-".to_string(), |id| id.to_string());
        println!("{type_id:>3}  {name}  visual={}", def.visual.as_deref().unwrap_or("-"));
        for id in def.all_component_ids() {
            let scratch = engine
                .scratch_range(name, id)
                .map(|range| format!("  scratch {}..{}", range.start, range.start + range.len))
                .unwrap_or_default();
            let known = if engine.registry().has(id) { "" } else { "  (unregistered)" };
            println!("       {id}{scratch}{known}");
        }
        for (state, body) in def.states.iter() {
            println!("       state {state}: {}", body.condition);
        }
    }
    Ok(())
}

fn cmd_dump(path: &str) -> Result<()> {
    let (resolved, _) = load(path)?;
    println!("{}", serde_json::to_string_pretty(&resolved.document)?);
    Ok(())
}
