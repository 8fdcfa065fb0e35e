use log::debug;

use crate::{
    bytes::{WriteOutOfBounds, write_at},
    pattern::ShiftTable,
    splice::SpliceError,
};

/// Search `haystack` for `pattern` and overwrite `replacement` at `match + offset`.
///
/// Up to `max_count` occurrences are patched. After each write the search resumes right
/// after the end of the *pattern* occurrence, not after the replacement, so a replacement
/// longer than `pattern.len() - offset` may itself be matched by a later iteration.
///
/// Returns the number of writes performed. An empty pattern patches nothing.
///
/// # Errors
///
/// Returns [`WriteOutOfBounds`] when a write would leave the slice; occurrences before the
/// failing one remain patched.
pub fn apply(
    haystack: &mut [u8],
    pattern: &[u8],
    offset: isize,
    replacement: &[u8],
    max_count: usize,
) -> Result<usize, WriteOutOfBounds> {
    let Some(table) = ShiftTable::new(pattern) else {
        return Ok(0);
    };

    let mut applied = 0;
    let mut start = 0;
    while applied < max_count {
        let Some(found) = table.find_in(&haystack[start..]) else {
            break;
        };

        let at = start + found;
        write_at(haystack, at, offset, replacement)?;
        applied += 1;
        start = at + pattern.len();
    }

    Ok(applied)
}

/// Static description of one search-and-overwrite patch.
#[derive(Debug, Clone, Copy)]
pub struct PatchRule {
    /// Name used in diagnostics
    pub name: &'static str,
    /// Byte pattern that locates the target
    pub pattern: &'static [u8],
    /// Signed displacement of the write from the match start
    pub offset: isize,
    /// Bytes written at the target
    pub replacement: &'static [u8],
    /// Maximum number of occurrences to patch
    pub count: usize,
}

impl PatchRule {
    /// Rule patching the first occurrence only.
    pub const fn new(
        name: &'static str,
        pattern: &'static [u8],
        offset: isize,
        replacement: &'static [u8],
    ) -> Self {
        Self {
            name,
            pattern,
            offset,
            replacement,
            count: 1,
        }
    }

    /// Patch up to `count` occurrences instead of one.
    pub const fn times(self, count: usize) -> Self {
        Self { count, ..self }
    }

    /// Apply the rule, tolerating a missing target.
    pub fn apply(&self, haystack: &mut [u8]) -> Result<usize, PatchError> {
        let applied = apply(haystack, self.pattern, self.offset, self.replacement, self.count)
            .map_err(|err| err.in_target(self.name))?;
        debug!("{}: patched {applied} occurrence(s)", self.name);
        Ok(applied)
    }

    /// Apply the rule and fail when the target cannot be found.
    pub fn apply_required(&self, haystack: &mut [u8]) -> Result<usize, PatchError> {
        match self.apply(haystack)? {
            0 => Err(PatchError::TargetMissing { target: self.name }),
            applied => Ok(applied),
        }
    }
}

impl WriteOutOfBounds {
    /// Attach the name of the patch that attempted the write.
    pub fn in_target(self, target: &'static str) -> PatchError {
        PatchError::OutOfBounds {
            target,
            source: self,
        }
    }
}

/// Errors produced while patching a firmware image
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// A required pattern or marker was not found
    #[error("patch target `{target}` not found")]
    TargetMissing {
        /// Name of the missing target
        target: &'static str,
    },
    /// A patch tried to write outside its section
    #[error("patch `{target}` writes out of bounds")]
    OutOfBounds {
        /// Name of the patch
        target: &'static str,
        /// Offending write
        source: WriteOutOfBounds,
    },
    /// A structure located by a patch is inconsistent
    #[error("patch `{target}`: {reason}")]
    Malformed {
        /// Name of the patch
        target: &'static str,
        /// What was wrong
        reason: &'static str,
    },
    /// Resizing an owned section failed
    #[error(transparent)]
    Splice(#[from] SpliceError),
}
