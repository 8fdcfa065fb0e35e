//! Collaborators the boot engine drives but does not implement.
//!
//! Filesystem access, the cryptographic engine, the display and the power controller are
//! all provided by the platform layer through these traits.

use core::fmt::Display;

use ctr_firm::{ConsoleModel, FirmwareType, read::Section};

use crate::context::NandTarget;

/// Whole-file access to the SD card and the CTRNAND partition.
pub trait Storage {
    /// Read the file at `path` into the start of `buf` and return its size.
    fn read_file(&mut self, path: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Replace the file at `path` with `data`.
    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Read the installed (encrypted) firmware title of `firm_type` from the CTRNAND of
    /// `nand` into `buf`.
    fn read_nand_firm(
        &mut self,
        nand: NandTarget,
        firm_type: FirmwareType,
        buf: &mut [u8],
    ) -> Result<NandFirm, StorageError>;
}

/// Firmware title read from NAND
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NandFirm {
    /// Bytes written to the buffer
    pub size: usize,
    /// Title version (e.g. 0x52 for 11.0 on Old models)
    pub version: u32,
}

/// Storage failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Neither the SD card nor CTRNAND could be mounted
    #[error("filesystem not mounted")]
    NotMounted,
    /// The file does not exist
    #[error("file not found")]
    NotFound,
    /// The file does not fit the destination buffer
    #[error("file of {size:#x} bytes exceeds the {capacity:#x}-byte buffer")]
    TooLarge {
        /// File size
        size: usize,
        /// Buffer size
        capacity: usize,
    },
    /// Low-level read or write error
    #[error("I/O error")]
    Io,
}

/// The hardware AES/SHA engines and key setup.
pub trait Crypto {
    /// Decrypt the ExeFS of a NAND firmware title in place, leaving the plaintext FIRM at
    /// the start of `buf`.
    fn decrypt_exefs(&mut self, buf: &mut [u8]) -> Result<(), CryptoError>;

    /// Check `data` against the SHA-256 recorded for `section`.
    fn verify_section(&mut self, section: &Section, data: &[u8]) -> Result<(), CryptoError>;

    /// Decrypt the ARM9 binary of a New-model firmware in place.
    fn decrypt_arm9_bin(&mut self, arm9: &mut [u8], model: ConsoleModel) -> Result<(), CryptoError>;
}

/// Cryptographic failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The firmware title could not be decrypted
    #[error("ExeFS decryption failed")]
    ExeFs,
    /// A section does not match its recorded hash
    #[error("section {index} hash mismatch")]
    SectionHash {
        /// Section slot
        index: usize,
    },
    /// The ARM9 binary could not be decrypted
    #[error("ARM9 binary decryption failed")]
    Arm9Bin,
}

/// Text and image output on the top screen.
pub trait ErrorScreen {
    /// Show a fatal error.
    fn show_error(&mut self, message: &dyn Display);

    /// Show the boot splash, if one is installed.
    fn show_splash(&mut self);
}

/// The power management controller.
pub trait Power {
    /// Cut power. Never returns.
    fn power_off(&mut self) -> !;
}
