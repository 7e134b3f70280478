use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::buffer::layout;
use crate::input::InputBindings;

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "StateConfig::default_width")]
    pub width: u32,
    #[serde(default = "StateConfig::default_height")]
    pub height: u32,
}

impl StateConfig {
    const fn default_width() -> u32 {
        layout::DEFAULT_WIDTH
    }

    const fn default_height() -> u32 {
        layout::DEFAULT_HEIGHT
    }

    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * layout::BYTES_PER_PIXEL
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { width: Self::default_width(), height: Self::default_height() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "RunnerConfig::default_frames")]
    pub frames: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Print a summary line every N frames; 0 disables it.
    #[serde(default = "RunnerConfig::default_report_every")]
    pub report_every: u32,
}

impl RunnerConfig {
    const fn default_frames() -> u32 {
        600
    }

    const fn default_report_every() -> u32 {
        60
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { frames: Self::default_frames(), seed: None, report_every: Self::default_report_every() }
    }
}

/// Host key bindings, `action → [keys]`. Script `Input:` blocks take precedence over these.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub bindings: BTreeMap<String, Vec<String>>,
}

impl InputConfig {
    pub fn to_bindings(&self) -> InputBindings {
        InputBindings::from_action_map(&self.bindings)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub input: InputConfig,
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frames: Option<u32>,
    pub seed: Option<u64>,
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: EngineConfig = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        cfg.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("[config] load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    /// The state buffer must at least hold the reference block layout.
    pub fn validate(&self) -> Result<()> {
        if self.state.width == 0 || self.state.height == 0 {
            bail!("state dimensions must be non-zero, got {}x{}", self.state.width, self.state.height);
        }
        if self.state.byte_len() < layout::LAYOUT_BYTES {
            bail!(
                "state {}x{} holds {} bytes; the memory layout needs at least {}",
                self.state.width,
                self.state.height,
                self.state.byte_len(),
                layout::LAYOUT_BYTES
            );
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &EngineConfigOverrides) {
        if let Some(width) = overrides.width {
            self.state.width = width;
        }
        if let Some(height) = overrides.height {
            self.state.height = height;
        }
        if let Some(frames) = overrides.frames {
            self.runner.frames = frames;
        }
        if let Some(seed) = overrides.seed {
            self.runner.seed = Some(seed);
        }
    }
}

impl EngineConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.frames.is_none() && self.seed.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.frames.is_some() {
            fields.push("frames");
        }
        if self.seed.is_some() {
            fields.push("seed");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{ "runner": { "frames": 30 }, "input": { "bindings": { "Jump": ["Space"] } } }"#)
                .expect("parse config");
        assert_eq!(cfg.state.width, 64);
        assert_eq!(cfg.runner.frames, 30);
        assert_eq!(cfg.runner.report_every, 60);
        assert!(!cfg.input.to_bindings().is_empty());
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn overrides_replace_loaded_values() {
        let mut cfg = EngineConfig::default();
        let overrides = EngineConfigOverrides { width: Some(128), seed: Some(7), ..Default::default() };
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.state.width, 128);
        assert_eq!(cfg.runner.seed, Some(7));
        assert_eq!(overrides.applied_fields(), vec!["width", "seed"]);
    }

    #[test]
    fn rejects_buffers_smaller_than_the_layout() {
        let mut cfg = EngineConfig::default();
        cfg.state.width = 32;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("memory layout"), "unexpected error: {err}");
    }
}
