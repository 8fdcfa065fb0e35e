use core::{mem::offset_of, ops::Range};

use zerocopy::FromBytes;

use crate::{
    kind::ConsoleModel,
    raw::firm::{FIRM_MAGIC, FIRM_SECTION_COUNT, FirmHeader, FirmSectionHeader},
};

/// Copyable descriptor of one present FIRM section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// Slot index in the header (0..4)
    pub index: usize,
    /// Byte offset of the payload inside the container
    pub offset: u32,
    /// Physical load address
    pub address: u32,
    /// Payload size in bytes (never zero)
    pub size: u32,
    /// Copy method / processor affinity tag
    pub proc_type: u32,
    /// SHA-256 of the payload, checked by the crypto collaborator
    pub hash: [u8; 0x20],
}

impl Section {
    fn from_header(index: usize, raw: &FirmSectionHeader) -> Option<Self> {
        let size = raw.size.get();
        if size == 0 {
            return None;
        }

        Some(Self {
            index,
            offset: raw.offset.get(),
            address: raw.address.get(),
            size,
            proc_type: raw.proc_type.get(),
            hash: raw.hash,
        })
    }

    /// Byte range of the payload inside the container.
    pub fn range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.size as usize
    }
}

/// Read-only FIRM parser with section access.
pub struct Firm<'a> {
    bytes: &'a [u8],
    header: &'a FirmHeader,
}

impl<'a> Firm<'a> {
    /// Parse a FIRM from bytes with magic, size and section bounds validation.
    pub fn try_from_bytes(bytes: &'a [u8]) -> Result<Self, FromBytesError> {
        let header = validate(bytes)?;
        Ok(Self { bytes, header })
    }

    /// Get the FIRM header.
    pub fn header(&self) -> &'a FirmHeader {
        self.header
    }

    /// Get the whole container.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Get the ARM9 entrypoint.
    pub fn arm9_entry(&self) -> u32 {
        self.header.arm9_entry.get()
    }

    /// Get the ARM11 entrypoint.
    pub fn arm11_entry(&self) -> u32 {
        self.header.arm11_entry.get()
    }

    /// Get the section in slot `index`, or `None` when the slot is empty.
    pub fn section(&self, index: usize) -> Option<Section> {
        section(self.header, index)
    }

    /// Iterate over the present sections in ascending slot order.
    pub fn sections(&self) -> impl Iterator<Item = Section> + 'a {
        let header = self.header;
        (0..FIRM_SECTION_COUNT).filter_map(move |index| section(header, index))
    }

    /// Get the payload bytes of a section of this container.
    pub fn section_data(&self, section: &Section) -> &'a [u8] {
        &self.bytes[section.range()]
    }

    /// Whether this container was built for `model`.
    ///
    /// Firmwares for the two console models load their ARM9 binary at slightly different
    /// addresses; bits 8..16 of section 2's load address tell them apart.
    pub fn is_compatible(&self, model: ConsoleModel) -> bool {
        is_compatible(self.header, model)
    }
}

/// Mutable FIRM view used while patching.
///
/// Section descriptors are captured at construction; only payload bytes and the ARM9
/// entrypoint are rewritten through this view.
pub struct FirmMut<'a> {
    bytes: &'a mut [u8],
    header: FirmHeader,
}

impl<'a> FirmMut<'a> {
    /// Parse a FIRM from mutable bytes with the same validation as [`Firm::try_from_bytes`].
    pub fn try_from_bytes(bytes: &'a mut [u8]) -> Result<Self, FromBytesError> {
        let header = *validate(bytes)?;
        Ok(Self { bytes, header })
    }

    /// Reborrow as a read-only view.
    pub fn as_firm(&self) -> Firm<'_> {
        Firm {
            bytes: &*self.bytes,
            header: &self.header,
        }
    }

    /// Get the FIRM header.
    pub fn header(&self) -> &FirmHeader {
        &self.header
    }

    /// Get the section in slot `index`, or `None` when the slot is empty.
    pub fn section(&self, index: usize) -> Option<Section> {
        section(&self.header, index)
    }

    /// Get the payload bytes of the section in slot `index` for writing.
    pub fn section_data_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let section = section(&self.header, index)?;
        Some(&mut self.bytes[section.range()])
    }

    /// Get the whole container for writing.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.bytes
    }

    /// Rewrite the ARM9 entrypoint.
    pub fn set_arm9_entry(&mut self, entry: u32) {
        let at = offset_of!(FirmHeader, arm9_entry);
        self.bytes[at..at + 4].copy_from_slice(&entry.to_le_bytes());
        self.header.arm9_entry.set(entry);
    }

    /// Whether this container was built for `model`.
    pub fn is_compatible(&self, model: ConsoleModel) -> bool {
        is_compatible(&self.header, model)
    }
}

fn validate(bytes: &[u8]) -> Result<&FirmHeader, FromBytesError> {
    let header = FirmHeader::ref_from_prefix(bytes)
        .map_err(|_| FromBytesError::BufferTooSmall {
            required: size_of::<FirmHeader>(),
            available: bytes.len(),
        })?
        .0;

    if header.magic != FIRM_MAGIC {
        return Err(FromBytesError::InvalidMagic {
            found: header.magic,
        });
    }

    for (index, raw) in header.sections.iter().enumerate() {
        let (offset, size) = (raw.offset.get(), raw.size.get());
        if size == 0 {
            continue;
        }

        let end = (offset as usize).checked_add(size as usize);
        if end.is_none_or(|end| end > bytes.len()) {
            return Err(FromBytesError::SectionOutOfBounds {
                index,
                offset,
                size,
                available: bytes.len(),
            });
        }
    }

    Ok(header)
}

fn section(header: &FirmHeader, index: usize) -> Option<Section> {
    Section::from_header(index, header.sections.get(index)?)
}

fn is_compatible(header: &FirmHeader, model: ConsoleModel) -> bool {
    let address = header.sections[2].address.get();
    ((address >> 8) & 0xFF) as u8 == model.arm9_address_marker()
}

/// Errors that can occur when parsing a FIRM from bytes
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
    /// Magic does not match "FIRM"
    #[error("invalid magic: expected \"FIRM\", found {found:02x?}")]
    InvalidMagic {
        /// Found magic bytes
        found: [u8; 4],
    },
    /// A present section lies outside the container
    #[error(
        "section {index} ({size:#x} bytes at {offset:#x}) exceeds the {available:#x}-byte container"
    )]
    SectionOutOfBounds {
        /// Section slot
        index: usize,
        /// Declared payload offset
        offset: u32,
        /// Declared payload size
        size: u32,
        /// Container size
        available: usize,
    },
}
