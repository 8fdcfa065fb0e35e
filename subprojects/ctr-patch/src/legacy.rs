use ctr_firm::ConsoleModel;

use crate::bytes::{WriteOutOfBounds, write_bytes, write_u16};

/// What a [`LegacyPatchEntry`] writes at its offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyPayload {
    /// Kind 0: copy a literal block
    Block(&'static [u8]),
    /// Kind 1: store a little-endian half-word
    Value(u16),
    /// Kind 2: store a little-endian half-word and zero the following two bytes
    ValueZeroTail(u16),
}

impl LegacyPayload {
    /// Numeric kind as used by the on-device patch tables.
    pub const fn kind(&self) -> u8 {
        match self {
            Self::Block(_) => 0,
            Self::Value(_) => 1,
            Self::ValueZeroTail(_) => 2,
        }
    }

    /// Number of bytes written.
    pub const fn len(&self) -> usize {
        match self {
            Self::Block(block) => block.len(),
            Self::Value(_) => 2,
            Self::ValueZeroTail(_) => 4,
        }
    }

    /// Whether nothing is written.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed-offset patch for firmwares that are patched by table instead of by search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyPatchEntry {
    /// Absolute container offset, indexed by [`ConsoleModel::index`]
    pub offsets: [u32; 2],
    /// Data to write
    pub payload: LegacyPayload,
}

impl LegacyPatchEntry {
    /// Entry with one offset per console model (`[old, new]`).
    pub const fn new(offsets: [u32; 2], payload: LegacyPayload) -> Self {
        Self { offsets, payload }
    }

    /// Offset to patch on `model`.
    pub const fn offset_for(&self, model: ConsoleModel) -> usize {
        self.offsets[model.index()] as usize
    }

    /// Write the payload into `buf` at this entry's offset for `model`.
    pub fn apply(&self, buf: &mut [u8], model: ConsoleModel) -> Result<(), WriteOutOfBounds> {
        let at = self.offset_for(model);
        match self.payload {
            LegacyPayload::Block(block) => write_bytes(buf, at, block),
            LegacyPayload::Value(value) => write_u16(buf, at, value),
            LegacyPayload::ValueZeroTail(value) => {
                // Check the whole span before the first write
                if at.checked_add(4).is_none_or(|end| end > buf.len()) {
                    return Err(WriteOutOfBounds {
                        base: at,
                        offset: 0,
                        len: 4,
                        size: buf.len(),
                    });
                }
                write_u16(buf, at, value)?;
                write_bytes(buf, at + 2, &[0, 0])
            }
        }
    }
}

/// Apply every entry of `table` in order.
pub fn apply_table(
    table: &[LegacyPatchEntry],
    buf: &mut [u8],
    model: ConsoleModel,
) -> Result<(), WriteOutOfBounds> {
    table.iter().try_for_each(|entry| entry.apply(buf, model))
}
