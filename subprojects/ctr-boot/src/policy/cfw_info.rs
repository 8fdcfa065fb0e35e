//! `svcGetCFWInfo`: an extra ARM11 SVC through which homebrew identifies the boot engine
//! and reads its configuration word.

use bitflags::bitflags;
use ctr_patch::{PatchError, bytes::write_bytes, find};
use log::debug;
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, little_endian::U32};

use crate::{
    config::Configuration,
    policy::kernel11::{self, FreeSpace, Kernel11},
};

/// SVC number of `svcGetCFWInfo`.
pub const CFW_INFO_SVC: usize = 0x2E;

/// Marks the info block inside the SVC stub.
pub const CFW_INFO_MAGIC: [u8; 4] = *b"CTRB";

/// Commit of the build, from `CTR_BOOT_COMMIT` (hex, first 8 digits).
const COMMIT_HASH: Option<u32> = match option_env!("CTR_BOOT_COMMIT") {
    Some(hash) => Some(parse_number(hash, 16, 8)),
    None => None,
};

bitflags! {
    /// Build flags reported in [`CfwInfo::flags`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CfwFlags: u8 {
        /// Built from a source checkout with a known commit
        const DEVELOPMENT = 1 << 0;
        /// Version without a pre-release suffix
        const RELEASE = 1 << 1;
    }
}

/// Info block returned by the SVC (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CfwInfo {
    /// [`CFW_INFO_MAGIC`]
    pub magic: [u8; 4],
    pub version_major: u8,
    pub version_minor: u8,
    pub version_build: u8,
    /// [`CfwFlags`] bits
    pub flags: u8,
    /// Commit of the build, 0 when unknown
    pub commit_hash: U32,
    /// Configuration word of this boot
    pub config: U32,
}

const_assert_eq!(size_of::<CfwInfo>(), 0x10);

impl CfwInfo {
    /// Info block of this build, reporting `config`.
    pub fn new(config: Configuration) -> Self {
        let mut flags = CfwFlags::empty();
        flags.set(CfwFlags::DEVELOPMENT, COMMIT_HASH.is_some());
        flags.set(CfwFlags::RELEASE, env!("CARGO_PKG_VERSION_PRE").is_empty());

        Self {
            magic: CFW_INFO_MAGIC,
            version_major: parse_number(env!("CARGO_PKG_VERSION_MAJOR"), 10, 3) as u8,
            version_minor: parse_number(env!("CARGO_PKG_VERSION_MINOR"), 10, 3) as u8,
            version_build: parse_number(env!("CARGO_PKG_VERSION_PATCH"), 10, 3) as u8,
            flags: flags.bits(),
            commit_hash: U32::new(COMMIT_HASH.unwrap_or(0)),
            config: U32::new(config.to_word()),
        }
    }

    pub fn flags(&self) -> CfwFlags {
        CfwFlags::from_bits_truncate(self.flags)
    }
}

/// Leading digits of `text` in `radix`, at most `max_digits` of them.
const fn parse_number(text: &str, radix: u32, max_digits: usize) -> u32 {
    let bytes = text.as_bytes();
    let mut value = 0u32;
    let mut i = 0;
    while i < bytes.len() && i < max_digits {
        let Some(digit) = (bytes[i] as char).to_digit(radix) else {
            break;
        };
        value = value * radix + digit;
        i += 1;
    }
    value
}

/// Copy the SVC stub into free space, fill its info block and point SVC 0x2E at it.
pub fn install(
    arm11: &mut [u8],
    kernel: &Kernel11,
    free: &mut FreeSpace,
    stub: &[u8],
    config: Configuration,
) -> Result<(), PatchError> {
    const TARGET: &str = "svcGetCFWInfo";
    let malformed = |reason| PatchError::Malformed {
        target: TARGET,
        reason,
    };

    let info_offset = find(stub, &CFW_INFO_MAGIC).ok_or_else(|| malformed("no info block"))?;
    if stub.len() - info_offset < size_of::<CfwInfo>() {
        return Err(malformed("info block truncated"));
    }

    let at = free.place(arm11, stub, TARGET)?;
    let info = CfwInfo::new(config);
    write_bytes(arm11, at + info_offset, info.as_bytes()).map_err(|err| err.in_target(TARGET))?;
    kernel11::set_svc(arm11, kernel, free, CFW_INFO_SVC, at, TARGET)?;

    debug!(
        "{TARGET}: installed at {:#x}, version {}.{}.{}",
        free.address(at),
        info.version_major,
        info.version_minor,
        info.version_build
    );
    Ok(())
}
