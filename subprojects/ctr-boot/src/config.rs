//! Persisted boot configuration.
//!
//! The configuration is a single 32-bit word stored behind a small header in
//! [`CONFIG_PATH`]. The menu that edits it lives outside the boot engine; the engine reads
//! the word once per boot and, on cold boots, records the choices it made so that a later
//! relaunch can repeat them.

use log::warn;
use modular_bitfield::prelude::*;
use static_assertions::const_assert_eq;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout,
    little_endian::{U16, U32},
};

use crate::{
    context::{BootContext, BootType, NandTarget},
    services::{Storage, StorageError},
};

/// Location of the configuration file on the SD card.
pub const CONFIG_PATH: &str = "/ctrboot/config.bin";

/// Configuration file magic: "CONF" in ASCII.
pub const CONFIG_MAGIC: [u8; 4] = *b"CONF";

/// Supported configuration format version.
pub const CONFIG_VERSION_MAJOR: u16 = 1;
/// Written configuration format revision.
pub const CONFIG_VERSION_MINOR: u16 = 2;

/// The configuration word.
///
/// The low bits record the last cold boot; the rest are user options.
#[bitfield(bits = 32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Configuration {
    /// NAND booted last time (0 = SysNAND, n = EmuNAND slot n)
    pub boot_nand: B3,
    /// NAND the FIRM of the last boot was read from, encoded like `boot_nand`
    pub boot_firm: B3,
    /// Boot stage runs from the boot ROM exploit and owns FIRM0/1
    pub a9lh: bool,
    /// Do not force the last boot options on the next MCU reboot
    pub no_force: bool,
    /// Last cold boot was a SAFE_FIRM boot
    pub safe_mode: bool,
    /// Screen brightness level
    pub brightness: B2,
    /// PIN lock length (0 = off)
    pub pin: B2,
    /// Splash mode (0 = off, 1 = before payloads, 2 = after payloads)
    pub splash: B2,
    /// Developer options (0 = off, 1 = exception handlers, 2 = UNITINFO)
    pub dev_options: B2,
    #[skip]
    __reserved0: B3,
    /// Boot SysNAND unless L is held
    pub autoboot_sys: bool,
    /// Boot EmuNAND with the SysNAND FIRM, rather than the reverse, when R is held
    pub use_sys_firm: bool,
    /// Default to the second EmuNAND slot
    pub use_second_emu: bool,
    /// Prefer firmware images from the SD card over the installed ones
    pub load_external_firm: bool,
    #[skip]
    __reserved1: bool,
    /// Keep the GBA boot screen in AGB_FIRM
    pub show_gba_boot: bool,
    /// Show the splash before chainloaded payloads
    pub payload_splash: bool,
    /// Patch ARM11 SVC and service access checks
    pub patch_access: bool,
    #[skip]
    __reserved2: B4,
}

impl Configuration {
    /// Decode a configuration word.
    pub fn from_word(word: u32) -> Self {
        Self::from_bytes(word.to_le_bytes())
    }

    /// Encode as a configuration word.
    pub fn to_word(self) -> u32 {
        u32::from_le_bytes(self.into_bytes())
    }

    /// EmuNAND slot used when no D-pad direction is held.
    pub fn default_emunand_slot(&self) -> u8 {
        if self.use_second_emu() { 2 } else { 1 }
    }

    /// NAND booted last time.
    pub fn last_nand(&self) -> NandTarget {
        nand_target(self.boot_nand())
    }

    /// NAND the last boot read its FIRM from.
    pub fn last_firm_source(&self) -> NandTarget {
        nand_target(self.boot_firm())
    }

    /// Record the choices of a cold boot.
    pub fn with_boot_record(self, ctx: &BootContext) -> Self {
        self.with_boot_nand(nand_field(ctx.nand))
            .with_boot_firm(nand_field(ctx.firm_source))
            .with_safe_mode(ctx.firm_type == ctr_firm::FirmwareType::Safe)
    }
}

fn nand_target(field: u8) -> NandTarget {
    match field {
        0 => NandTarget::SysNand,
        slot => NandTarget::EmuNand(slot),
    }
}

fn nand_field(target: NandTarget) -> u8 {
    match target {
        NandTarget::SysNand => 0,
        NandTarget::EmuNand(slot) => slot,
    }
}

/// On-disk layout of [`CONFIG_PATH`] (12 bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ConfigFile {
    /// Magic (must be [`CONFIG_MAGIC`])
    pub magic: [u8; 4],
    /// Format version, major part
    pub version_major: U16,
    /// Format version, minor part
    pub version_minor: U16,
    /// The configuration word
    pub config: U32,
}

const_assert_eq!(size_of::<ConfigFile>(), 0xC);

impl ConfigFile {
    /// Current-version file holding `config`.
    pub fn new(config: Configuration) -> Self {
        Self {
            magic: CONFIG_MAGIC,
            version_major: U16::new(CONFIG_VERSION_MAJOR),
            version_minor: U16::new(CONFIG_VERSION_MINOR),
            config: U32::new(config.to_word()),
        }
    }

    /// Parse and validate a configuration file.
    pub fn parse(bytes: &[u8]) -> Result<Configuration, ConfigError> {
        let file = ConfigFile::ref_from_bytes(bytes).map_err(|_| ConfigError::BadSize {
            size: bytes.len(),
        })?;

        if file.magic != CONFIG_MAGIC {
            return Err(ConfigError::InvalidMagic { found: file.magic });
        }

        let (major, minor) = (file.version_major.get(), file.version_minor.get());
        if major != CONFIG_VERSION_MAJOR {
            return Err(ConfigError::UnsupportedVersion { major, minor });
        }

        Ok(Configuration::from_word(file.config.get()))
    }
}

/// Whether [`CONFIG_PATH`] held a usable configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    /// Parsed from the file
    Stored,
    /// Missing, unreadable or malformed file replaced by the defaults
    Defaulted,
}

/// Read the configuration.
///
/// A missing, unreadable or malformed file yields the defaults, so that a stale file can
/// never block a boot. [`record_boot`] then writes a fresh one.
pub fn load(storage: &mut impl Storage) -> (Configuration, ConfigState) {
    let mut buf = [0u8; size_of::<ConfigFile>() + 1];
    let parsed = match storage.read_file(CONFIG_PATH, &mut buf) {
        Ok(size) => ConfigFile::parse(&buf[..size]),
        Err(err) => {
            warn!("configuration unavailable ({err}), using defaults");
            return (Configuration::new(), ConfigState::Defaulted);
        }
    };

    match parsed {
        Ok(config) => (config, ConfigState::Stored),
        Err(err) => {
            warn!("configuration ignored ({err}), using defaults");
            (Configuration::new(), ConfigState::Defaulted)
        }
    }
}

/// Write `config` back to [`CONFIG_PATH`].
pub fn save(storage: &mut impl Storage, config: Configuration) -> Result<(), StorageError> {
    storage.write_file(CONFIG_PATH, ConfigFile::new(config).as_bytes())
}

/// Record a cold boot's choices.
///
/// The file is written when something changed or when it was not usable.
pub fn record_boot(
    storage: &mut impl Storage,
    config: Configuration,
    state: ConfigState,
    ctx: &BootContext,
) -> Result<Configuration, StorageError> {
    if ctx.boot_type != BootType::ColdBoot {
        return Ok(config);
    }

    let updated = config.with_boot_record(ctx);
    if state == ConfigState::Defaulted || updated != config {
        save(storage, updated)?;
    }
    Ok(updated)
}

/// Malformed configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// File size is not that of [`ConfigFile`]
    #[error("configuration file has {size} bytes, expected 12")]
    BadSize {
        /// Size read
        size: usize,
    },
    /// Magic does not match "CONF"
    #[error("invalid magic: expected \"CONF\", found {found:02x?}")]
    InvalidMagic {
        /// Found magic bytes
        found: [u8; 4],
    },
    /// Written by an incompatible version
    #[error("unsupported configuration version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version found
        major: u16,
        /// Minor version found
        minor: u16,
    },
}
