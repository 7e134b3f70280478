use crate::buffer::{BufferError, BufferResult, StateBuffer, ENTITY_POOL};

pub const SLOT_SIZE: usize = 16;
pub const SLOT_COUNT: usize = ENTITY_POOL.len() / SLOT_SIZE;

/// Byte offsets of the canonical fields within a slot.
pub mod field {
    pub const ACTIVE: usize = 0;
    pub const TYPE_ID: usize = 1;
    pub const POS_X: usize = 2;
    pub const POS_Y: usize = 4;
    pub const VEL_X: usize = 6;
    pub const VEL_Y: usize = 8;
    pub const HEALTH: usize = 10;
    pub const SPRITE_ID: usize = 11;
    pub const SCRATCH: usize = 12;
}

/// Component scratch bytes available per slot.
pub const SCRATCH_LEN: usize = SLOT_SIZE - field::SCRATCH;

pub const fn slot_ptr(index: usize) -> usize {
    ENTITY_POOL.start + index * SLOT_SIZE
}

pub fn slot_index(ptr: usize) -> Option<usize> {
    if ptr < ENTITY_POOL.start || ptr >= ENTITY_POOL.end {
        return None;
    }
    let rel = ptr - ENTITY_POOL.start;
    (rel % SLOT_SIZE == 0).then_some(rel / SLOT_SIZE)
}

/// Slot addresses in ascending order, limited to slots that fit inside a buffer of `buffer_len` bytes.
pub fn slot_ptrs(buffer_len: usize) -> impl Iterator<Item = usize> {
    (0..SLOT_COUNT).map(slot_ptr).take_while(move |ptr| ptr + SLOT_SIZE <= buffer_len)
}

/// Byte range of the slot scratch region assigned to one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScratchRange {
    /// Offset from the start of the component scratch region.
    pub start: usize,
    pub len: usize,
}

impl ScratchRange {
    pub const EMPTY: ScratchRange = ScratchRange { start: 0, len: 0 };

    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    fn addr(&self, ptr: usize, index: usize, width: usize) -> BufferResult<usize> {
        if index + width > self.len || self.start + index + width > SCRATCH_LEN {
            return Err(BufferError::OutsideBlock {
                block: "component scratch",
                offset: ptr + field::SCRATCH + self.start + index,
                width,
            });
        }
        Ok(ptr + field::SCRATCH + self.start + index)
    }
}

fn field_addr(ptr: usize, offset: usize, width: usize) -> BufferResult<usize> {
    if slot_index(ptr).is_none() || offset + width > SLOT_SIZE {
        return Err(BufferError::OutsideBlock { block: ENTITY_POOL.name, offset: ptr, width: SLOT_SIZE });
    }
    Ok(ptr + offset)
}

fn saturate_i16(value: i64) -> i64 {
    value.clamp(i16::MIN as i64, i16::MAX as i64)
}

fn saturate_u16(value: i64) -> i64 {
    value.clamp(0, u16::MAX as i64)
}

/// Typed slot accessors. Setters saturate to the field's range.
impl StateBuffer {
    pub fn is_active(&self, ptr: usize) -> BufferResult<bool> {
        Ok(self.read_int8(field_addr(ptr, field::ACTIVE, 1)?)? != 0)
    }

    pub fn set_active(&mut self, ptr: usize, active: bool) -> BufferResult<()> {
        self.write_int8(field_addr(ptr, field::ACTIVE, 1)?, if active { 1.0 } else { 0.0 })
    }

    pub fn type_id(&self, ptr: usize) -> BufferResult<u8> {
        self.read_int8(field_addr(ptr, field::TYPE_ID, 1)?)
    }

    pub fn set_type_id(&mut self, ptr: usize, type_id: u8) -> BufferResult<()> {
        self.write_int8(field_addr(ptr, field::TYPE_ID, 1)?, type_id as f64)
    }

    pub fn position(&self, ptr: usize) -> BufferResult<(u16, u16)> {
        Ok((
            self.read_int16(field_addr(ptr, field::POS_X, 2)?)?,
            self.read_int16(field_addr(ptr, field::POS_Y, 2)?)?,
        ))
    }

    pub fn set_position(&mut self, ptr: usize, x: i64, y: i64) -> BufferResult<()> {
        self.write_int16(field_addr(ptr, field::POS_X, 2)?, saturate_u16(x))?;
        self.write_int16(field_addr(ptr, field::POS_Y, 2)?, saturate_u16(y))
    }

    pub fn velocity(&self, ptr: usize) -> BufferResult<(i16, i16)> {
        Ok((
            self.read_signed_int16(field_addr(ptr, field::VEL_X, 2)?)?,
            self.read_signed_int16(field_addr(ptr, field::VEL_Y, 2)?)?,
        ))
    }

    pub fn set_velocity(&mut self, ptr: usize, vx: i64, vy: i64) -> BufferResult<()> {
        self.write_signed_int16(field_addr(ptr, field::VEL_X, 2)?, saturate_i16(vx))?;
        self.write_signed_int16(field_addr(ptr, field::VEL_Y, 2)?, saturate_i16(vy))
    }

    pub fn health(&self, ptr: usize) -> BufferResult<u8> {
        self.read_int8(field_addr(ptr, field::HEALTH, 1)?)
    }

    pub fn set_health(&mut self, ptr: usize, health: i64) -> BufferResult<()> {
        self.write_int8(field_addr(ptr, field::HEALTH, 1)?, health as f64)
    }

    pub fn sprite_id(&self, ptr: usize) -> BufferResult<u8> {
        self.read_int8(field_addr(ptr, field::SPRITE_ID, 1)?)
    }

    pub fn set_sprite_id(&mut self, ptr: usize, sprite_id: u32) -> BufferResult<()> {
        self.write_int8(field_addr(ptr, field::SPRITE_ID, 1)?, sprite_id as f64)
    }

    pub fn scratch_u8(&self, ptr: usize, range: ScratchRange, index: usize) -> BufferResult<u8> {
        field_addr(ptr, field::SCRATCH, 0)?;
        self.read_int8(range.addr(ptr, index, 1)?)
    }

    pub fn set_scratch_u8(&mut self, ptr: usize, range: ScratchRange, index: usize, value: u8) -> BufferResult<()> {
        field_addr(ptr, field::SCRATCH, 0)?;
        self.write_int8(range.addr(ptr, index, 1)?, value as f64)
    }

    pub fn scratch_u16(&self, ptr: usize, range: ScratchRange, index: usize) -> BufferResult<u16> {
        field_addr(ptr, field::SCRATCH, 0)?;
        self.read_int16(range.addr(ptr, index, 2)?)
    }

    pub fn set_scratch_u16(&mut self, ptr: usize, range: ScratchRange, index: usize, value: u16) -> BufferResult<()> {
        field_addr(ptr, field::SCRATCH, 0)?;
        self.write_int16(range.addr(ptr, index, 2)?, value as i64)
    }

    pub fn clear_slot(&mut self, ptr: usize) -> BufferResult<()> {
        let start = field_addr(ptr, 0, SLOT_SIZE)?;
        self.check_block(ENTITY_POOL, start, SLOT_SIZE)?;
        self.as_bytes_mut()[start..start + SLOT_SIZE].fill(0);
        Ok(())
    }

    /// Active slot addresses in ascending order.
    pub fn active_slots(&self) -> Vec<usize> {
        slot_ptrs(self.len()).filter(|ptr| self.is_active(*ptr).unwrap_or(false)).collect()
    }

    pub fn first_free_slot(&self) -> Option<usize> {
        slot_ptrs(self.len()).find(|ptr| !self.is_active(*ptr).unwrap_or(true))
    }

    /// Writes a fresh entity into the first inactive slot. Returns `None` when the pool is full.
    pub fn spawn_entity(&mut self, type_id: u8, x: i64, y: i64, health: i64) -> BufferResult<Option<usize>> {
        let Some(ptr) = self.first_free_slot() else {
            return Ok(None);
        };
        self.clear_slot(ptr)?;
        self.set_type_id(ptr, type_id)?;
        self.set_position(ptr, x, y)?;
        self.set_health(ptr, health)?;
        self.set_active(ptr, true)?;
        Ok(Some(ptr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_holds_736_slots() {
        assert_eq!(SLOT_COUNT, 736);
        assert_eq!(slot_ptrs(StateBuffer::default().len()).count(), 736);
        assert_eq!(slot_ptr(0), 512);
        assert_eq!(slot_index(slot_ptr(3)), Some(3));
        assert_eq!(slot_index(513), None, "misaligned pointers are not slots");
    }

    #[test]
    fn field_access_stays_inside_the_slot() {
        let ptr = slot_ptr(0);
        assert_eq!(field_addr(ptr, field::HEALTH, 1), Ok(ptr + field::HEALTH));
        assert_eq!(field_addr(ptr, field::SCRATCH, SCRATCH_LEN), Ok(ptr + field::SCRATCH));
        assert!(field_addr(ptr, field::SCRATCH, SCRATCH_LEN + 1).is_err());
        assert!(field_addr(ptr + 1, field::ACTIVE, 1).is_err());
    }

    #[test]
    fn fields_use_canonical_offsets() {
        let mut buffer = StateBuffer::default();
        let ptr = slot_ptr(0);
        buffer.set_active(ptr, true).expect("active");
        buffer.set_type_id(ptr, 2).expect("type");
        buffer.set_position(ptr, 0x0102, 0x0304).expect("pos");
        buffer.set_velocity(ptr, -1, 5).expect("vel");
        buffer.set_health(ptr, 9).expect("health");
        let bytes = &buffer.as_bytes()[ptr..ptr + 11];
        assert_eq!(bytes, &[1, 2, 0x01, 0x02, 0x03, 0x04, 0xFF, 0xFF, 0x00, 0x05, 9]);
    }

    #[test]
    fn setters_saturate() {
        let mut buffer = StateBuffer::default();
        let ptr = slot_ptr(1);
        buffer.set_position(ptr, -5, 70_000).expect("pos");
        assert_eq!(buffer.position(ptr).expect("pos"), (0, u16::MAX));
        buffer.set_velocity(ptr, 40_000, -40_000).expect("vel");
        assert_eq!(buffer.velocity(ptr).expect("vel"), (i16::MAX, i16::MIN));
    }

    #[test]
    fn scratch_access_is_confined_to_range() {
        let mut buffer = StateBuffer::default();
        let ptr = slot_ptr(0);
        let range = ScratchRange::new(1, 1);
        buffer.set_scratch_u8(ptr, range, 0, 7).expect("in range");
        assert_eq!(buffer.as_bytes()[ptr + field::SCRATCH + 1], 7);
        assert!(buffer.set_scratch_u8(ptr, range, 1, 7).is_err(), "index past the range");
        assert!(buffer.scratch_u8(ptr, ScratchRange::EMPTY, 0).is_err());
    }

    #[test]
    fn spawn_fills_first_free_slot() {
        let mut buffer = StateBuffer::default();
        buffer.set_active(slot_ptr(0), true).expect("occupy");
        let ptr = buffer.spawn_entity(3, 10, 20, 100).expect("spawn").expect("free slot");
        assert_eq!(ptr, slot_ptr(1));
        assert_eq!(buffer.type_id(ptr).expect("type"), 3);
        assert_eq!(buffer.active_slots(), vec![slot_ptr(0), slot_ptr(1)]);
    }
}
