use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Camera parameters handed to the renderer after each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
    pub shake: f32,
    /// Normalized RGBA.
    pub tint: [f32; 4],
}

impl Default for CameraState {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, zoom: 1.0, shake: 0.0, tint: [1.0; 4] }
    }
}

impl CameraState {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.x = position.x;
        self.y = position.y;
    }

    /// Top-left camera position that centers `focus` on a `screen`-sized view at the current zoom.
    pub fn target_for(&self, focus: Vec2, screen: Vec2) -> Vec2 {
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };
        focus - screen / (2.0 * zoom)
    }

    /// Moves toward `target` by `follow_speed` (0..=1); 1 or more snaps.
    pub fn follow(&mut self, target: Vec2, follow_speed: f32) {
        let t = follow_speed.clamp(0.0, 1.0);
        let next = self.position().lerp(target, t);
        self.set_position(next);
    }
}

/// Parses `#RGB` / `#RRGGBB` (case-insensitive, `#` optional).
pub fn parse_hex_rgb(raw: &str) -> Option<[u8; 3]> {
    let hex = raw.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        3 => {
            let mut out = [0u8; 3];
            for (slot, ch) in out.iter_mut().zip(hex.chars()) {
                let v = ch.to_digit(16)? as u8;
                *slot = v * 17;
            }
            Some(out)
        }
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some([r, g, b])
        }
        _ => None,
    }
}

/// Tint as normalized RGBA; empty or invalid input yields opaque white.
pub fn parse_tint(raw: &str) -> [f32; 4] {
    match parse_hex_rgb(raw) {
        Some([r, g, b]) => [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0],
        None => [1.0; 4],
    }
}
