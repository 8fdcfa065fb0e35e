use zerocopy::FromBytes;

use crate::raw::ncch::{ExHeaderPrefix, MEDIA_UNIT_SIZE, NCCH_MAGIC, NcchHeader};

/// NCCH parser.
///
/// Only the header and the leading part of the extended header are interpreted; the
/// rest of the content stays opaque.
pub struct Ncch<'a> {
    bytes: &'a [u8],
    header: &'a NcchHeader,
}

impl<'a> Ncch<'a> {
    /// Parse an NCCH from bytes with magic validation.
    ///
    /// `bytes` may extend past the end of the content; see [`Ncch::content_size`].
    pub fn try_from_bytes(bytes: &'a [u8]) -> Result<Self, FromBytesError> {
        let (header, _) =
            NcchHeader::ref_from_prefix(bytes).map_err(|_| FromBytesError::BufferTooSmall {
                required: size_of::<NcchHeader>(),
                available: bytes.len(),
            })?;

        if header.magic != NCCH_MAGIC {
            return Err(FromBytesError::InvalidMagic {
                found: header.magic,
            });
        }

        Ok(Self { bytes, header })
    }

    /// Get the NCCH header.
    pub fn header(&self) -> &'a NcchHeader {
        self.header
    }

    /// Content size in bytes; `None` when it does not fit in `usize`.
    pub fn content_size(&self) -> Option<usize> {
        media_units_to_bytes(self.header.content_size.get())
    }

    /// ExeFS offset from the start of the NCCH, in bytes.
    pub fn exefs_offset(&self) -> Option<usize> {
        media_units_to_bytes(self.header.exefs_offset.get())
    }

    /// ExeFS size in bytes.
    pub fn exefs_size(&self) -> Option<usize> {
        media_units_to_bytes(self.header.exefs_size.get())
    }

    /// Extended header prefix, when present in the buffer.
    pub fn exheader(&self) -> Option<&'a ExHeaderPrefix> {
        let rest = self.bytes.get(size_of::<NcchHeader>()..)?;
        ExHeaderPrefix::ref_from_prefix(rest).ok().map(|(prefix, _)| prefix)
    }

    /// Application title with trailing NUL padding removed.
    pub fn app_title(&self) -> Option<&'a [u8]> {
        let title = &self.exheader()?.app_title;
        let len = title.iter().position(|&b| b == 0).unwrap_or(title.len());
        Some(&title[..len])
    }
}

fn media_units_to_bytes(units: u32) -> Option<usize> {
    usize::try_from(units).ok()?.checked_mul(MEDIA_UNIT_SIZE as usize)
}

/// Errors that can occur when parsing an NCCH from bytes
#[derive(Debug, thiserror::Error)]
pub enum FromBytesError {
    /// Buffer is too small to contain the header
    #[error("buffer too small: need {required} bytes, have {available}")]
    BufferTooSmall {
        /// Number of bytes required
        required: usize,
        /// Number of bytes available
        available: usize,
    },
    /// Magic does not match "NCCH"
    #[error("invalid magic: expected \"NCCH\", found {found:02x?}")]
    InvalidMagic {
        /// Found magic bytes
        found: [u8; 4],
    },
}
