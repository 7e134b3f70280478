//! Cartridge images: the canvas PNG with the state buffer appended as extra pixel rows.
//!
//! Layout of the appended rows: one magic pixel `MZK1`, three zero pixels, then the state bytes read
//! as RGBA pixels. Rows are padded with zeros.

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{imageops, RgbaImage};

use crate::buffer::{layout, StateBuffer};

pub const MAGIC: [u8; 4] = *b"MZK1";
const HEADER_PIXELS: usize = 4;

/// Number of rows appended under a `width`-pixel canvas for `state_bytes` of state.
pub fn data_rows(state_bytes: usize, width: u32) -> u32 {
    let pixels = state_bytes.div_ceil(layout::BYTES_PER_PIXEL) + HEADER_PIXELS;
    pixels.div_ceil(width.max(1) as usize) as u32
}

pub fn pack(canvas: &RgbaImage, state: &StateBuffer) -> Result<RgbaImage> {
    let (width, height) = canvas.dimensions();
    if width == 0 {
        bail!("cannot pack state under an empty canvas");
    }
    let rows = data_rows(state.len(), width);
    let mut out = RgbaImage::new(width, height + rows);
    imageops::replace(&mut out, canvas, 0, 0);

    let raw: &mut [u8] = &mut out;
    let start = width as usize * height as usize * layout::BYTES_PER_PIXEL;
    raw[start..start + MAGIC.len()].copy_from_slice(&MAGIC);
    let data = start + HEADER_PIXELS * layout::BYTES_PER_PIXEL;
    raw[data..data + state.len()].copy_from_slice(state.as_bytes());
    Ok(out)
}

/// Splits a cartridge into canvas and state. `None` when the image carries no state rows.
pub fn unpack(image: &RgbaImage, state_bytes: usize) -> Option<(RgbaImage, StateBuffer)> {
    let (width, height) = image.dimensions();
    let rows = data_rows(state_bytes, width);
    let canvas_height = height.checked_sub(rows)?;
    let raw: &[u8] = image.as_raw();
    let start = width as usize * canvas_height as usize * layout::BYTES_PER_PIXEL;
    if raw.get(start..start + MAGIC.len())? != MAGIC.as_slice() {
        return None;
    }
    let data = start + HEADER_PIXELS * layout::BYTES_PER_PIXEL;
    let bytes = raw.get(data..data + state_bytes)?.to_vec();
    let canvas = imageops::crop_imm(image, 0, 0, width, canvas_height).to_image();
    Some((canvas, StateBuffer::from_bytes(bytes)))
}

/// Loads a PNG; the state is `None` for plain images.
pub fn load(path: impl AsRef<Path>, state_bytes: usize) -> Result<(RgbaImage, Option<StateBuffer>)> {
    let path = path.as_ref();
    let image = image::open(path).with_context(|| format!("Failed to open cartridge {}", path.display()))?.to_rgba8();
    Ok(match unpack(&image, state_bytes) {
        Some((canvas, state)) => (canvas, Some(state)),
        None => (image, None),
    })
}

pub fn save(path: impl AsRef<Path>, canvas: &RgbaImage, state: &StateBuffer) -> Result<()> {
    let path = path.as_ref();
    let packed = pack(canvas, state)?;
    packed.save(path).with_context(|| format!("Failed to write cartridge {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn row_count_matches_layout() {
        assert_eq!(data_rows(16_384, 64), 65, "4096 pixels + 4 header pixels spill into a 65th row");
        assert_eq!(data_rows(16_384, 128), 33);
        assert_eq!(data_rows(8, 2), 3);
    }

    #[test]
    fn plain_images_have_no_state() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 255]));
        assert!(unpack(&image, 16).is_none());
    }

    #[test]
    fn pack_keeps_the_canvas_on_top() {
        let canvas = RgbaImage::from_pixel(4, 2, Rgba([1, 2, 3, 255]));
        let mut state = StateBuffer::new(12);
        state.as_bytes_mut()[0] = 42;
        let packed = pack(&canvas, &state).expect("pack");
        assert_eq!(packed.dimensions(), (4, 4));
        assert_eq!(packed.get_pixel(3, 1), &Rgba([1, 2, 3, 255]));
        assert_eq!(packed.get_pixel(0, 2), &Rgba(MAGIC));
        assert_eq!(packed.get_pixel(0, 3)[0], 42);

        let (restored, buffer) = unpack(&packed, 12).expect("state rows");
        assert_eq!(restored, canvas);
        assert_eq!(buffer, state);
    }
}
