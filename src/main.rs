use anyhow::{anyhow, Result};
use msc_engine::assets::BakedAssets;
use msc_engine::cli::CliOverrides;
use msc_engine::config::EngineConfig;
use msc_engine::runner::{load_assets, run_script};

fn main() {
    let cli = match CliOverrides::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(&cli) {
        eprintln!("Application error: {err:?}");
        std::process::exit(1);
    }
}

fn run(cli: &CliOverrides) -> Result<()> {
    let script = cli.script().ok_or_else(|| {
        anyhow!("usage: msc_engine <script.msc> [--config <json>] [--assets <json>] [--save <png>] [--frames N]")
    })?;
    let mut config = match cli.config_path() {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let overrides = cli.config_overrides();
    if !overrides.is_empty() {
        eprintln!("[cli] overriding {}", overrides.applied_fields().join(", "));
    }
    config.apply_overrides(&overrides);
    let assets = match cli.assets_path() {
        Some(path) => load_assets(path)?,
        None => BakedAssets::default(),
    };

    let (state, summary) = run_script(script, &config, &assets)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if let Some(path) = cli.save_path() {
        save_cartridge(path, &config, &state)?;
    }
    Ok(())
}

#[cfg(feature = "cartridge")]
fn save_cartridge(path: &std::path::Path, config: &EngineConfig, state: &msc_engine::state::EngineState) -> Result<()> {
    let canvas = image::RgbaImage::from_raw(config.state.width, config.state.height, state.buffer.as_bytes().to_vec())
        .ok_or_else(|| anyhow!("state buffer does not match {}x{}", config.state.width, config.state.height))?;
    msc_engine::cartridge::save(path, &canvas, &state.buffer)?;
    println!("[engine] saved cartridge {}", path.display());
    Ok(())
}

#[cfg(not(feature = "cartridge"))]
fn save_cartridge(_: &std::path::Path, _: &EngineConfig, _: &msc_engine::state::EngineState) -> Result<()> {
    anyhow::bail!("--save needs the `cartridge` feature")
}
