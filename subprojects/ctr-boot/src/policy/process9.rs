//! Location of the Process9 image inside the ARM9 binary.

use core::ops::Range;

use ctr_firm::read::Ncch;
use ctr_patch::{PatchError, find_from};

/// Tail of the "Process9" title in its extended header.
const MARKER: &[u8] = b"ess9";
/// Process9 never starts before this offset of the ARM9 binary.
const SEARCH_START: usize = 0x1_5000;
/// Distance from the marker back to the NCCH header.
const MARKER_TO_NCCH: usize = 0x204;
/// ExeFS header in front of the code.
const EXEFS_HEADER_SIZE: usize = 0x200;

/// Process9 code within the ARM9 section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Process9 {
    /// Offset of the NCCH header
    pub ncch: usize,
    /// Offset of the code
    pub offset: usize,
    /// Code size
    pub size: usize,
    /// Virtual address the code runs at
    pub address: u32,
}

impl Process9 {
    /// Byte range of the code within the ARM9 section.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }
}

/// Find Process9 in `arm9`.
pub fn locate(arm9: &[u8]) -> Result<Process9, PatchError> {
    const TARGET: &str = "Process9";

    let marker = find_from(arm9, MARKER, SEARCH_START)
        .ok_or(PatchError::TargetMissing { target: TARGET })?;
    let ncch_at = marker
        .checked_sub(MARKER_TO_NCCH)
        .ok_or(PatchError::Malformed {
            target: TARGET,
            reason: "marker too close to the section start",
        })?;

    let ncch = Ncch::try_from_bytes(&arm9[ncch_at..]).map_err(|_| PatchError::Malformed {
        target: TARGET,
        reason: "no NCCH header in front of the marker",
    })?;
    let address = ncch
        .exheader()
        .map(|exheader| exheader.text.address.get())
        .ok_or(PatchError::Malformed {
            target: TARGET,
            reason: "truncated extended header",
        })?;

    let outside = || PatchError::Malformed {
        target: TARGET,
        reason: "code extends past the ARM9 section",
    };
    let offset = ncch
        .exefs_offset()
        .and_then(|exefs| ncch_at.checked_add(exefs))
        .and_then(|exefs| exefs.checked_add(EXEFS_HEADER_SIZE))
        .ok_or_else(outside)?;
    let size = ncch.exefs_size().ok_or_else(outside)?;
    if offset.checked_add(size).is_none_or(|end| end > arm9.len()) {
        return Err(outside());
    }

    Ok(Process9 {
        ncch: ncch_at,
        offset,
        size,
        address,
    })
}
