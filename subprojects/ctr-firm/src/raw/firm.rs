use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, little_endian::*};

/// FIRM magic: "FIRM" in ASCII.
pub const FIRM_MAGIC: [u8; 4] = *b"FIRM";

/// Number of section slots in every FIRM header.
pub const FIRM_SECTION_COUNT: usize = 4;

/// FIRM section header describing one payload to copy at boot.
///
/// A section whose `size` is zero is unused.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FirmSectionHeader {
    /// Byte offset of the payload from the start of the FIRM
    pub offset: U32,
    /// Physical address the payload is copied to
    pub address: U32,
    /// Payload size in bytes
    pub size: U32,
    /// Copy method / processor affinity (0 = ARM9 NDMA, 1 = ARM11 XDMA, 2 = CPU memcpy)
    pub proc_type: U32,
    /// SHA-256 hash of the payload
    pub hash: [u8; 0x20],
}

// Verify struct size - https://www.3dbrew.org/wiki/FIRM#Firmware_Section_Headers
const_assert_eq!(size_of::<FirmSectionHeader>(), 0x30);

/// FIRM header (0x200 bytes).
///
/// See: <https://www.3dbrew.org/wiki/FIRM>
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FirmHeader {
    /// Magic (must be [`FIRM_MAGIC`])
    pub magic: [u8; 4],
    /// Boot priority, unused by the loader
    pub boot_priority: U32,
    /// ARM11 entrypoint
    pub arm11_entry: U32,
    /// ARM9 entrypoint
    pub arm9_entry: U32,
    /// Reserved
    _reserved: [u8; 0x30],
    /// Section headers
    pub sections: [FirmSectionHeader; FIRM_SECTION_COUNT],
    /// RSA-2048 signature over the header hash
    pub signature: [u8; 0x100],
}

// Verify struct size - https://www.3dbrew.org/wiki/FIRM#FIRM_Header
const_assert_eq!(size_of::<FirmHeader>(), 0x200);
