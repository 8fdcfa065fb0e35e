use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, little_endian::*};

/// NCCH magic: "NCCH" in ASCII.
pub const NCCH_MAGIC: [u8; 4] = *b"NCCH";

/// NCCH sizes and offsets are expressed in media units of 0x200 bytes.
pub const MEDIA_UNIT_SIZE: u32 = 0x200;

/// NCCH header (0x200 bytes).
///
/// Every sysmodule packed into FIRM section 0 and the Process9 image inside
/// the ARM9 binary starts with one of these.
///
/// See: <https://www.3dbrew.org/wiki/NCCH#NCCH_Header>
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct NcchHeader {
    /// RSA-2048 signature of the header
    pub signature: [u8; 0x100],
    /// Magic (must be [`NCCH_MAGIC`])
    pub magic: [u8; 4],
    /// Content size in media units
    pub content_size: U32,
    pub partition_id: [u8; 8],
    pub maker_code: [u8; 2],
    pub version: U16,
    _reserved1: [u8; 4],
    pub program_id: [u8; 8],
    _reserved2: [u8; 0x10],
    pub logo_hash: [u8; 0x20],
    pub product_code: [u8; 0x10],
    pub exheader_hash: [u8; 0x20],
    /// Extended header size in bytes
    pub exheader_size: U32,
    _reserved3: U32,
    pub flags: [u8; 8],
    pub plain_offset: U32,
    pub plain_size: U32,
    pub logo_offset: U32,
    pub logo_size: U32,
    /// ExeFS offset in media units
    pub exefs_offset: U32,
    /// ExeFS size in media units
    pub exefs_size: U32,
    pub exefs_hash_size: U32,
    _reserved4: U32,
    pub romfs_offset: U32,
    pub romfs_size: U32,
    pub romfs_hash_size: U32,
    _reserved5: U32,
    pub exefs_hash: [u8; 0x20],
    pub romfs_hash: [u8; 0x20],
}

// Verify struct size - https://www.3dbrew.org/wiki/NCCH#NCCH_Header
const_assert_eq!(size_of::<NcchHeader>(), 0x200);

/// Code set descriptor of the extended header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CodeSetInfo {
    /// Virtual load address
    pub address: U32,
    /// Physical region size in pages
    pub physical_pages: U32,
    /// Size in bytes
    pub size: U32,
}

const_assert_eq!(size_of::<CodeSetInfo>(), 0xC);

/// Leading part of the extended header's system control info, up to the text code set.
///
/// The extended header immediately follows the NCCH header.
///
/// See: <https://www.3dbrew.org/wiki/NCCH/Extended_Header#System_Control_Info>
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ExHeaderPrefix {
    /// Application title, NUL padded ("Process9", "loader", ...)
    pub app_title: [u8; 8],
    _reserved: [u8; 5],
    pub flag: u8,
    pub remaster_version: [u8; 2],
    /// Text code set
    pub text: CodeSetInfo,
}

const_assert_eq!(size_of::<ExHeaderPrefix>(), 0x1C);
