use glam::Vec2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::buffer::StateBuffer;
use crate::camera::CameraState;

/// Everything a running script owns between ticks: the byte buffer plus the host-side camera and rng.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub buffer: StateBuffer,
    pub width: u32,
    pub height: u32,
    pub tick_count: u64,
    pub camera: CameraState,
    pub rng: StdRng,
}

impl EngineState {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_rng(width, height, StdRng::from_entropy())
    }

    /// Deterministic state for harness runs and tests.
    pub fn with_seed(width: u32, height: u32, seed: u64) -> Self {
        Self::with_rng(width, height, StdRng::seed_from_u64(seed))
    }

    fn with_rng(width: u32, height: u32, rng: StdRng) -> Self {
        Self {
            buffer: StateBuffer::with_dimensions(width, height),
            width,
            height,
            tick_count: 0,
            camera: CameraState::default(),
            rng,
        }
    }

    /// Wraps an existing buffer, for example one unpacked from a cartridge.
    pub fn from_buffer(buffer: StateBuffer, width: u32, seed: Option<u64>) -> Self {
        let width = width.max(1);
        let height = (buffer.pixel_count() as u32).div_ceil(width);
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self { buffer, width, height, tick_count: 0, camera: CameraState::default(), rng }
    }

    pub fn screen_size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new(crate::buffer::layout::DEFAULT_WIDTH, crate::buffer::layout::DEFAULT_HEIGHT)
    }
}
