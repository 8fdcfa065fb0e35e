//! Bounds-checked little-endian reads and writes on byte slices.

use zerocopy::{
    FromBytes, IntoBytes,
    little_endian::{U16, U32},
};

/// A write that would land (partly) outside the target slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("write of {len} bytes at {base:#x} (offset {offset}) exceeds the {size:#x}-byte target")]
pub struct WriteOutOfBounds {
    /// Anchor position (usually a pattern match)
    pub base: usize,
    /// Signed displacement from `base`
    pub offset: isize,
    /// Number of bytes to write
    pub len: usize,
    /// Size of the target slice
    pub size: usize,
}

/// Copy `data` into `buf` at `base + offset`.
pub fn write_at(
    buf: &mut [u8],
    base: usize,
    offset: isize,
    data: &[u8],
) -> Result<(), WriteOutOfBounds> {
    let err = WriteOutOfBounds {
        base,
        offset,
        len: data.len(),
        size: buf.len(),
    };

    let start = base.checked_add_signed(offset).ok_or(err)?;
    let end = start.checked_add(data.len()).ok_or(err)?;
    buf.get_mut(start..end).ok_or(err)?.copy_from_slice(data);
    Ok(())
}

/// Copy `data` into `buf` at `at`.
pub fn write_bytes(buf: &mut [u8], at: usize, data: &[u8]) -> Result<(), WriteOutOfBounds> {
    write_at(buf, at, 0, data)
}

/// Store a little-endian `u16` at `at`.
pub fn write_u16(buf: &mut [u8], at: usize, value: u16) -> Result<(), WriteOutOfBounds> {
    write_bytes(buf, at, U16::new(value).as_bytes())
}

/// Store a little-endian `u32` at `at`.
pub fn write_u32(buf: &mut [u8], at: usize, value: u32) -> Result<(), WriteOutOfBounds> {
    write_bytes(buf, at, U32::new(value).as_bytes())
}

/// Load a little-endian `u32` from `at`, or `None` past the end.
pub fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let (value, _) = U32::read_from_prefix(buf.get(at..)?).ok()?;
    Some(value.get())
}
