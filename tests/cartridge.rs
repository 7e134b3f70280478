#![cfg(feature = "cartridge")]

use image::{Rgba, RgbaImage};
use msc_engine::buffer::{layout, StateBuffer};
use msc_engine::cartridge;
use msc_engine::state::EngineState;
use tempfile::tempdir;

#[test]
fn saved_cartridges_restore_canvas_and_state() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("save.png");
    let canvas = RgbaImage::from_pixel(64, 64, Rgba([10, 20, 30, 255]));
    let mut state = EngineState::with_seed(64, 64, 1);
    let hero = state.buffer.spawn_entity(1, 12, 34, 5).expect("spawn").expect("slot");
    state.buffer.write_int16(64, 1234).expect("global");

    cartridge::save(&path, &canvas, &state.buffer).expect("save");
    let (restored, buffer) = cartridge::load(&path, layout::LAYOUT_BYTES).expect("load");
    let buffer = buffer.expect("state rows present");
    assert_eq!(restored, canvas);
    assert_eq!(buffer, state.buffer);

    let resumed = EngineState::from_buffer(buffer, 64, Some(1));
    assert_eq!(resumed.height, 64);
    assert_eq!(resumed.buffer.position(hero).expect("position"), (12, 34));
    assert_eq!(resumed.buffer.read_int16(64).expect("global"), 1234);
}

#[test]
fn plain_pngs_load_without_state() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("plain.png");
    RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255])).save(&path).expect("write png");
    let (image, state) = cartridge::load(&path, StateBuffer::default().len()).expect("load");
    assert_eq!(image.dimensions(), (16, 16));
    assert!(state.is_none());
}
