use serde::Serialize;
use std::collections::HashMap;

use crate::msc::{Document, SpriteDef};

/// Consecutive sprite ids owned by one named sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpriteRange {
    pub first_id: u32,
    pub frame_count: u32,
}

impl SpriteRange {
    /// Id shown at `tick` when the animation advances every `speed` ticks. Fractional speeds are
    /// honoured; a non-positive or non-finite speed falls back to one tick per frame.
    pub fn frame_at(&self, tick: u64, speed: f64) -> u32 {
        let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
        let frames = u64::from(self.frame_count.max(1));
        let step = (tick as f64 / speed).floor() as u64;
        self.first_id + (step % frames) as u32
    }
}

/// Pixel rectangle of a single sprite id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpriteFrame {
    pub name: String,
    pub frame: u32,
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    pub ox: i32,
    pub oy: i32,
}

/// Sprite-id table derived from a document's `Sprites:` block. Id 0 means "no sprite".
#[derive(Debug, Clone, Default)]
pub struct SpriteAtlas {
    ranges: HashMap<String, SpriteRange>,
    frames: Vec<Option<SpriteFrame>>,
}

impl SpriteAtlas {
    pub fn build(doc: &Document) -> Self {
        let grid = doc.grid_size();
        let mut atlas = SpriteAtlas { ranges: HashMap::new(), frames: vec![None] };
        for (name, sprite) in doc.sprites.iter() {
            let first_id = atlas.frames.len() as u32;
            let count = sprite.id_count();
            for frame in 0..count {
                let (x, y, w, h, ox, oy) = match *sprite {
                    SpriteDef::Grid { col, row, .. } => {
                        (grid_pixel(col.saturating_add(frame), grid), grid_pixel(row, grid), grid, grid, 0, 0)
                    }
                    SpriteDef::Absolute { x, y, w, h, ox, oy } => (x, y, w, h, ox, oy),
                };
                atlas.frames.push(Some(SpriteFrame { name: name.to_string(), frame, x, y, w, h, ox, oy }));
            }
            atlas.ranges.insert(name.to_string(), SpriteRange { first_id, frame_count: count });
        }
        atlas
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.ranges.get(name).map(|range| range.first_id)
    }

    pub fn range(&self, name: &str) -> Option<SpriteRange> {
        self.ranges.get(name).copied()
    }

    pub fn frame(&self, id: u32) -> Option<&SpriteFrame> {
        self.frames.get(id as usize).and_then(Option::as_ref)
    }

    /// Number of assigned ids, not counting the reserved id 0.
    pub fn len(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn frames(&self) -> impl Iterator<Item = (u32, &SpriteFrame)> {
        self.frames.iter().enumerate().filter_map(|(id, frame)| frame.as_ref().map(|f| (id as u32, f)))
    }
}

/// Pixel offset of grid cell `cell`, clamped to the `i32` range.
fn grid_pixel(cell: u32, grid: u32) -> i32 {
    let pixels = u64::from(cell) * u64::from(grid);
    i32::try_from(pixels).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msc::parse_document;

    #[test]
    fn ids_are_sequential_and_grid_frames_are_consecutive() {
        let doc = parse_document("Sprites:\n  $Grid: 8\n  idle: [0, 0]\n  run: [1, 2, 3]\n  boss: { x: 40, y: 8, w: 16, h: 16 }\n")
            .expect("parse");
        let atlas = SpriteAtlas::build(&doc);
        assert_eq!(atlas.id_of("idle"), Some(1));
        assert_eq!(atlas.range("run"), Some(SpriteRange { first_id: 2, frame_count: 3 }));
        assert_eq!(atlas.id_of("boss"), Some(5));
        assert_eq!(atlas.len(), 5);

        let third = atlas.frame(4).expect("run frame 2");
        assert_eq!((third.name.as_str(), third.frame, third.x, third.y), ("run", 2, 24, 16));
        assert!(atlas.frame(0).is_none(), "id 0 is reserved");
    }

    #[test]
    fn far_grid_cells_clamp_instead_of_overflowing() {
        let doc = parse_document("Sprites:\n  $Grid: 16\n  big: [300000000, 0]\n  edge: [4294967295, 2, 2]\n")
            .expect("parse");
        let atlas = SpriteAtlas::build(&doc);
        let big = atlas.frame(1).expect("big");
        assert_eq!((big.x, big.y), (i32::MAX, 0));
        let edge = atlas.frame(3).expect("edge frame 1");
        assert_eq!((edge.x, edge.y), (i32::MAX, 32));
    }

    #[test]
    fn frame_at_wraps_and_respects_speed() {
        let range = SpriteRange { first_id: 2, frame_count: 3 };
        assert_eq!(range.frame_at(0, 1.0), 2);
        assert_eq!(range.frame_at(4, 1.0), 3);
        assert_eq!(range.frame_at(7, 2.0), 2);
        assert_eq!(range.frame_at(7, 0.0), 3, "speed 0 behaves like 1");
        assert_eq!(range.frame_at(7, f64::NAN), 3);
    }

    #[test]
    fn fractional_speeds_are_not_truncated() {
        let range = SpriteRange { first_id: 1, frame_count: 4 };
        assert_eq!(range.frame_at(4, 2.5), 2, "floor(4 / 2.5) = 1");
        assert_eq!(range.frame_at(3, 0.5), 3, "floor(3 / 0.5) = 6, wrapped to 2");
    }
}
