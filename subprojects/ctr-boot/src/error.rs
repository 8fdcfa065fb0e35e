use ctr_firm::{FirmwareType, read::FirmFromBytesError};
use ctr_patch::PatchError;

use crate::services::{CryptoError, StorageError};

/// Every way a boot can fail before the final jump
#[derive(Debug, thiserror::Error)]
pub enum BootError {
    /// The firmware container is malformed
    #[error("invalid firmware: {0}")]
    Format(#[from] FirmFromBytesError),
    /// A patch could not be applied
    #[error("patching failed: {0}")]
    Patch(#[from] PatchError),
    /// The firmware could not be read from any source
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    /// Decryption or hash verification failed
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
    /// The relaunch cell holds no known firmware type
    #[error("unknown firmware type byte {0:#04x}")]
    UnknownFirmwareType(u8),
    /// The firmware was built for the other console model
    #[error("{0:?} firmware is not valid for this console")]
    Incompatible(FirmwareType),
}
