use alloc::vec::Vec;

/// Range handed to [`splice_at`] does not fit the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot replace {removed:#x} bytes at {at:#x} in a {size:#x}-byte buffer")]
pub struct SpliceError {
    /// Start of the replaced range
    pub at: usize,
    /// Length of the replaced range
    pub removed: usize,
    /// Buffer size
    pub size: usize,
}

/// Replace `removed` bytes at `at` with `inserted`, growing or shrinking `buf`.
///
/// Bytes after the replaced range keep their order and move by
/// `inserted.len() - removed`.
pub fn splice_at(
    buf: &mut Vec<u8>,
    at: usize,
    removed: usize,
    inserted: &[u8],
) -> Result<(), SpliceError> {
    let err = SpliceError {
        at,
        removed,
        size: buf.len(),
    };

    let end = at.checked_add(removed).ok_or(err)?;
    if end > buf.len() {
        return Err(err);
    }

    buf.splice(at..end, inserted.iter().copied());
    Ok(())
}
