use std::fmt;

/// Fixed memory layout of the state buffer. Every block boundary and built-in slot address used by
/// the engine comes from here.
pub mod layout {
    pub const DEFAULT_WIDTH: u32 = 64;
    pub const DEFAULT_HEIGHT: u32 = 64;
    pub const BYTES_PER_PIXEL: usize = 4;
    /// Byte size of the reference layout (64×64 RGBA).
    pub const LAYOUT_BYTES: usize = DEFAULT_WIDTH as usize * DEFAULT_HEIGHT as usize * BYTES_PER_PIXEL;

    pub const HEADER_START: usize = 0;
    pub const GLOBALS_START: usize = 64;
    pub const ENTITY_POOL_START: usize = 512;
    pub const AUDIO_FX_START: usize = 12_288;

    /// Signed 16-bit camera shake offsets, reserved at the tail of the globals block.
    pub const CAMERA_SHAKE_X: usize = 508;
    pub const CAMERA_SHAKE_Y: usize = 510;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBlock {
    pub name: &'static str,
    pub start: usize,
    pub end: usize,
}

impl MemoryBlock {
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub const fn contains(&self, offset: usize, width: usize) -> bool {
        offset >= self.start && offset + width <= self.end
    }
}

pub const HEADER: MemoryBlock =
    MemoryBlock { name: "header", start: layout::HEADER_START, end: layout::GLOBALS_START };
pub const GLOBALS: MemoryBlock =
    MemoryBlock { name: "globals", start: layout::GLOBALS_START, end: layout::ENTITY_POOL_START };
pub const ENTITY_POOL: MemoryBlock =
    MemoryBlock { name: "entityPool", start: layout::ENTITY_POOL_START, end: layout::AUDIO_FX_START };
pub const AUDIO_FX: MemoryBlock =
    MemoryBlock { name: "audioFx", start: layout::AUDIO_FX_START, end: layout::LAYOUT_BYTES };

pub const BLOCKS: [MemoryBlock; 4] = [HEADER, GLOBALS, ENTITY_POOL, AUDIO_FX];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    OutOfRange { offset: usize, width: usize, len: usize },
    OutsideBlock { block: &'static str, offset: usize, width: usize },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::OutOfRange { offset, width, len } => {
                write!(f, "offset {offset} (+{width} bytes) is out of range for a {len}-byte buffer")
            }
            BufferError::OutsideBlock { block, offset, width } => {
                write!(f, "offset {offset} (+{width} bytes) lies outside the {block} block")
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// Storage type of a schema variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VarType {
    Int8,
    Int16,
    SignedInt16,
    Int24,
}

impl VarType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "int8" | "u8" | "byte" => Some(VarType::Int8),
            "int16" | "u16" => Some(VarType::Int16),
            "signedint16" | "sint16" | "int16s" | "i16" => Some(VarType::SignedInt16),
            "int24" | "u24" => Some(VarType::Int24),
            _ => None,
        }
    }

    pub const fn width(self) -> usize {
        match self {
            VarType::Int8 => 1,
            VarType::Int16 | VarType::SignedInt16 => 2,
            VarType::Int24 => 3,
        }
    }
}

/// The RGBA byte array that is both the visible pixel data and the simulation memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateBuffer {
    bytes: Vec<u8>,
}

pub type BufferResult<T> = Result<T, BufferError>;

impl StateBuffer {
    pub fn new(len: usize) -> Self {
        Self { bytes: vec![0; len] }
    }

    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self::new(width as usize * height as usize * layout::BYTES_PER_PIXEL)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    fn check(&self, offset: usize, width: usize) -> BufferResult<()> {
        match offset.checked_add(width) {
            Some(end) if end <= self.bytes.len() => Ok(()),
            _ => Err(BufferError::OutOfRange { offset, width, len: self.bytes.len() }),
        }
    }

    pub fn check_block(&self, block: MemoryBlock, offset: usize, width: usize) -> BufferResult<()> {
        if !block.contains(offset, width) {
            return Err(BufferError::OutsideBlock { block: block.name, offset, width });
        }
        self.check(offset, width)
    }

    /// Returns the slice for `block`, truncated when the buffer is smaller than the reference layout.
    pub fn block(&self, block: MemoryBlock) -> &[u8] {
        let end = block.end.min(self.bytes.len());
        let start = block.start.min(end);
        &self.bytes[start..end]
    }

    pub fn read_int8(&self, offset: usize) -> BufferResult<u8> {
        self.check(offset, 1)?;
        Ok(self.bytes[offset])
    }

    /// Clamps to 0..=255 after rounding.
    pub fn write_int8(&mut self, offset: usize, value: f64) -> BufferResult<()> {
        self.check(offset, 1)?;
        let clamped = if value.is_nan() { 0.0 } else { value.round().clamp(0.0, 255.0) };
        self.bytes[offset] = clamped as u8;
        Ok(())
    }

    pub fn read_int16(&self, offset: usize) -> BufferResult<u16> {
        self.check(offset, 2)?;
        Ok(u16::from_be_bytes([self.bytes[offset], self.bytes[offset + 1]]))
    }

    /// Stores the low 16 bits of `value` big-endian.
    pub fn write_int16(&mut self, offset: usize, value: i64) -> BufferResult<()> {
        self.check(offset, 2)?;
        let [hi, lo] = (value as u16).to_be_bytes();
        self.bytes[offset] = hi;
        self.bytes[offset + 1] = lo;
        Ok(())
    }

    pub fn read_signed_int16(&self, offset: usize) -> BufferResult<i16> {
        self.read_int16(offset).map(|raw| raw as i16)
    }

    pub fn write_signed_int16(&mut self, offset: usize, value: i64) -> BufferResult<()> {
        self.write_int16(offset, value)
    }

    pub fn read_int24(&self, offset: usize) -> BufferResult<u32> {
        self.check(offset, 3)?;
        let b = &self.bytes[offset..offset + 3];
        Ok(((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32)
    }

    pub fn write_int24(&mut self, offset: usize, value: i64) -> BufferResult<()> {
        self.check(offset, 3)?;
        let raw = (value as u32) & 0x00FF_FFFF;
        self.bytes[offset] = (raw >> 16) as u8;
        self.bytes[offset + 1] = (raw >> 8) as u8;
        self.bytes[offset + 2] = raw as u8;
        Ok(())
    }

    pub fn read_var(&self, ty: VarType, offset: usize) -> BufferResult<f64> {
        Ok(match ty {
            VarType::Int8 => self.read_int8(offset)? as f64,
            VarType::Int16 => self.read_int16(offset)? as f64,
            VarType::SignedInt16 => self.read_signed_int16(offset)? as f64,
            VarType::Int24 => self.read_int24(offset)? as f64,
        })
    }

    pub fn write_var(&mut self, ty: VarType, offset: usize, value: f64) -> BufferResult<()> {
        let rounded = if value.is_finite() { value.round() as i64 } else { 0 };
        match ty {
            VarType::Int8 => self.write_int8(offset, value),
            VarType::Int16 => self.write_int16(offset, rounded),
            VarType::SignedInt16 => self.write_signed_int16(offset, rounded),
            VarType::Int24 => self.write_int24(offset, rounded),
        }
    }

    /// RGBA of pixel `index`, if the pixel lies fully inside the buffer.
    pub fn pixel(&self, index: usize) -> Option<[u8; 4]> {
        let start = index.checked_mul(layout::BYTES_PER_PIXEL)?;
        let px = self.bytes.get(start..start + layout::BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn pixel_count(&self) -> usize {
        self.bytes.len() / layout::BYTES_PER_PIXEL
    }

    pub fn camera_shake(&self) -> BufferResult<(i16, i16)> {
        Ok((self.read_signed_int16(layout::CAMERA_SHAKE_X)?, self.read_signed_int16(layout::CAMERA_SHAKE_Y)?))
    }

    pub fn set_camera_shake(&mut self, x: i64, y: i64) -> BufferResult<()> {
        self.check_block(GLOBALS, layout::CAMERA_SHAKE_X, 2)?;
        self.check_block(GLOBALS, layout::CAMERA_SHAKE_Y, 2)?;
        self.write_signed_int16(layout::CAMERA_SHAKE_X, x)?;
        self.write_signed_int16(layout::CAMERA_SHAKE_Y, y)
    }
}

impl Default for StateBuffer {
    fn default() -> Self {
        Self::with_dimensions(layout::DEFAULT_WIDTH, layout::DEFAULT_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffer_matches_reference_layout() {
        let buffer = StateBuffer::default();
        assert_eq!(buffer.len(), 16_384);
        assert_eq!(BLOCKS.iter().map(MemoryBlock::len).sum::<usize>(), buffer.len(), "blocks tile the buffer");
        assert_eq!(ENTITY_POOL.len(), 11_776);
    }

    #[test]
    fn int8_writes_round_and_clamp() {
        let mut buffer = StateBuffer::new(4);
        buffer.write_int8(0, 300.0).expect("write");
        buffer.write_int8(1, -4.0).expect("write");
        buffer.write_int8(2, 12.6).expect("write");
        assert_eq!(buffer.as_bytes()[..3], [255, 0, 13]);
    }

    #[test]
    fn signed_and_unsigned_int16_share_encoding() {
        let mut buffer = StateBuffer::new(4);
        buffer.write_signed_int16(0, -3).expect("write");
        assert_eq!(buffer.as_bytes()[..2], [0xFF, 0xFD]);
        assert_eq!(buffer.read_int16(0).expect("read"), 0xFFFD);
        assert_eq!(buffer.read_signed_int16(0).expect("read"), -3);
        buffer.write_int16(2, 0x1234).expect("write");
        assert_eq!(buffer.as_bytes()[2..], [0x12, 0x34], "big-endian");
    }

    #[test]
    fn int24_is_big_endian() {
        let mut buffer = StateBuffer::new(3);
        buffer.write_int24(0, 0x01_02_03).expect("write");
        assert_eq!(buffer.as_bytes(), &[1, 2, 3]);
        assert_eq!(buffer.read_int24(0).expect("read"), 0x01_02_03);
    }

    #[test]
    fn reads_past_the_end_fail() {
        let buffer = StateBuffer::new(4);
        assert!(buffer.read_int8(4).is_err());
        let err = buffer.read_int16(3).unwrap_err();
        assert_eq!(err, BufferError::OutOfRange { offset: 3, width: 2, len: 4 });
        assert!(buffer.read_int24(2).is_err());
    }

    #[test]
    fn block_checks_reject_straddling_access() {
        let buffer = StateBuffer::default();
        assert!(buffer.check_block(GLOBALS, 510, 2).is_ok());
        let err = buffer.check_block(GLOBALS, 511, 2).unwrap_err();
        assert!(matches!(err, BufferError::OutsideBlock { block: "globals", .. }));
    }
}
