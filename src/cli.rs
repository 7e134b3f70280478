use crate::config::EngineConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    script: Option<PathBuf>,
    config: Option<PathBuf>,
    assets: Option<PathBuf>,
    save: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    frames: Option<u32>,
    seed: Option<u64>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if !flag.starts_with("--") {
                if overrides.script.is_some() {
                    bail!("Unexpected argument '{flag}'. Only one script path may be given.");
                }
                overrides.script = Some(PathBuf::from(flag));
                continue;
            }
            let key = &flag[2..];
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "config" => overrides.config = Some(PathBuf::from(value)),
                "assets" => overrides.assets = Some(PathBuf::from(value)),
                "save" => overrides.save = Some(PathBuf::from(value)),
                "width" => {
                    overrides.width =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid width '{value}'"))?);
                }
                "height" => {
                    overrides.height =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid height '{value}'"))?);
                }
                "frames" => {
                    overrides.frames =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid frames '{value}'"))?);
                }
                "seed" => {
                    overrides.seed = Some(value.parse::<u64>().with_context(|| format!("Invalid seed '{value}'"))?);
                }
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --config, --assets, --save, --width, --height, --frames, --seed."
                ),
            }
        }
        Ok(overrides)
    }

    pub fn script(&self) -> Option<&PathBuf> {
        self.script.as_ref()
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config.as_ref()
    }

    pub fn assets_path(&self) -> Option<&PathBuf> {
        self.assets.as_ref()
    }

    pub fn save_path(&self) -> Option<&PathBuf> {
        self.save.as_ref()
    }

    pub fn config_overrides(&self) -> EngineConfigOverrides {
        EngineConfigOverrides { width: self.width, height: self.height, frames: self.frames, seed: self.seed }
    }

    #[cfg(test)]
    pub fn as_tuple(&self) -> (Option<u32>, Option<u32>, Option<u32>, Option<u64>) {
        (self.width, self.height, self.frames, self.seed)
    }
}
