//! Firmware loading: an SD card image when configured, the installed title otherwise.

use ctr_firm::read::{Firm, FirmMut};
use log::{debug, info, warn};

use crate::{
    context::BootContext,
    error::BootError,
    services::{Crypto, Storage},
};

/// Largest firmware image the loader accepts.
pub const FIRM_BUFFER_SIZE: usize = 0x40_0000;

/// ARM9 entrypoint past the New-model ARM9 loader, for NATIVE/SAFE_FIRM.
const NATIVE_ARM9_ENTRY: u32 = 0x0801_B01C;
/// ARM9 entrypoint past the New-model ARM9 loader, for TWL/AGB_FIRM.
const LEGACY_ARM9_ENTRY: u32 = 0x0801_301C;

/// Where the firmware image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmSource {
    /// Plaintext image from the SD card
    Sd,
    /// Installed title from CTRNAND
    Nand,
}

/// Result of [`load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedFirm {
    pub source: FirmSource,
    /// Title version of the installed firmware; `None` for SD images, which are
    /// treated as newer than any installed title
    pub version: Option<u32>,
}

/// Load the firmware for `ctx` into `buf`, decrypted and ready to patch.
///
/// With `prefer_sd` the SD image is tried first; a missing, malformed or foreign-model
/// image falls back to the installed title once. Failing to read the installed title is
/// fatal.
pub fn load(
    storage: &mut impl Storage,
    crypto: &mut impl Crypto,
    buf: &mut [u8],
    ctx: &BootContext,
    prefer_sd: bool,
) -> Result<LoadedFirm, BootError> {
    let loaded = match prefer_sd.then(|| load_from_sd(storage, buf, ctx)) {
        Some(Ok(())) => LoadedFirm {
            source: FirmSource::Sd,
            version: None,
        },
        Some(Err(err)) => {
            warn!("{}: {err}, falling back to NAND", ctx.firm_type.sd_path());
            load_from_nand(storage, crypto, buf, ctx)?
        }
        None => load_from_nand(storage, crypto, buf, ctx)?,
    };

    if ctx.model == ctr_firm::ConsoleModel::New {
        unlock_arm9(crypto, buf, ctx)?;
    }

    info!(
        "loaded {:?} from {:?} (version {:?})",
        ctx.firm_type, loaded.source, loaded.version
    );
    Ok(loaded)
}

fn load_from_sd(
    storage: &mut impl Storage,
    buf: &mut [u8],
    ctx: &BootContext,
) -> Result<(), BootError> {
    let size = storage.read_file(ctx.firm_type.sd_path(), buf)?;
    let firm = Firm::try_from_bytes(&buf[..size])?;
    if !firm.is_compatible(ctx.model) {
        return Err(BootError::Incompatible(ctx.firm_type));
    }
    Ok(())
}

fn load_from_nand(
    storage: &mut impl Storage,
    crypto: &mut impl Crypto,
    buf: &mut [u8],
    ctx: &BootContext,
) -> Result<LoadedFirm, BootError> {
    let firm_type = ctx.firm_type;
    let nand = storage.read_nand_firm(ctx.firm_source, firm_type, buf)?;
    crypto.decrypt_exefs(buf)?;

    let firm = Firm::try_from_bytes(buf)?;
    for section in firm.sections() {
        crypto.verify_section(&section, firm.section_data(&section))?;
    }

    debug!(
        "{:?} {firm_type:?} version {:#x}, {:#x} bytes",
        ctx.firm_source, nand.version, nand.size
    );
    Ok(LoadedFirm {
        source: FirmSource::Nand,
        version: Some(nand.version),
    })
}

/// Decrypt the New-model ARM9 binary and skip its loader.
fn unlock_arm9(
    crypto: &mut impl Crypto,
    buf: &mut [u8],
    ctx: &BootContext,
) -> Result<(), BootError> {
    let mut firm = FirmMut::try_from_bytes(buf)?;
    let index = ctx.firm_type.arm9_section();
    if let Some(arm9) = firm.section_data_mut(index) {
        crypto.decrypt_arm9_bin(arm9, ctx.model)?;
    }

    firm.set_arm9_entry(if ctx.firm_type.is_legacy() {
        LEGACY_ARM9_ENTRY
    } else {
        NATIVE_ARM9_ENTRY
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use ctr_firm::{ConsoleModel, FirmwareType, read::Firm};

    use super::*;
    use crate::{
        context::{BootType, LaunchArgs, NandProtection, NandTarget, Splash},
        services::{CryptoError, StorageError},
        testing::{FakeCrypto, FakeStorage, FirmBuilder},
    };

    fn ctx(firm_type: FirmwareType, model: ConsoleModel) -> BootContext {
        BootContext {
            boot_type: BootType::ColdBoot,
            firm_type,
            protection: NandProtection::Off,
            model,
            splash: Splash::Off,
            nand: NandTarget::SysNand,
            firm_source: NandTarget::SysNand,
            launch_args: LaunchArgs::None,
            show_gba_boot: false,
        }
    }

    fn image(arm9_address: u32, tag: u8) -> Vec<u8> {
        FirmBuilder::new()
            .section(0x1FF8_0000, vec![tag; 0x100])
            .section(0x1FF0_0000, vec![tag; 0x100])
            .section(arm9_address, vec![tag; 0x100])
            .build()
    }

    /// Load into a fresh buffer.
    fn run(
        storage: &mut FakeStorage,
        crypto: &mut FakeCrypto,
        ctx: &BootContext,
        prefer_sd: bool,
    ) -> (Result<LoadedFirm, BootError>, Vec<u8>) {
        let mut buf = vec![0u8; 0x1000];
        let loaded = load(storage, crypto, &mut buf, ctx, prefer_sd);
        (loaded, buf)
    }

    #[test]
    fn prefers_compatible_sd_image() {
        let mut storage = FakeStorage::default()
            .with_file("/ctrboot/firmware.bin", image(0x0800_6800, 0xAA))
            .with_nand(FirmwareType::Native, image(0x0800_6800, 0xBB), 0x52);
        let mut crypto = FakeCrypto::default();

        let ctx = ctx(FirmwareType::Native, ConsoleModel::Old);
        let (loaded, buf) = run(&mut storage, &mut crypto, &ctx, true);
        assert_eq!(
            loaded.unwrap(),
            LoadedFirm {
                source: FirmSource::Sd,
                version: None,
            }
        );
        assert_eq!(crypto.exefs_decryptions, 0);

        let firm = Firm::try_from_bytes(&buf).unwrap();
        let s0 = firm.section(0).unwrap();
        assert_eq!(firm.section_data(&s0)[0], 0xAA);
    }

    #[test]
    fn incompatible_sd_image_falls_back_to_nand() {
        let mut storage = FakeStorage::default()
            .with_file("/ctrboot/firmware.bin", image(0x0800_6000, 0xAA))
            .with_nand(FirmwareType::Native, image(0x0800_6800, 0xBB), 0x52);
        let mut crypto = FakeCrypto::default();

        let ctx = ctx(FirmwareType::Native, ConsoleModel::Old);
        let (loaded, _) = run(&mut storage, &mut crypto, &ctx, true);
        assert_eq!(
            loaded.unwrap(),
            LoadedFirm {
                source: FirmSource::Nand,
                version: Some(0x52),
            }
        );
        assert_eq!(crypto.exefs_decryptions, 1);
        assert_eq!(crypto.verified, [0, 1, 2]);
    }

    #[test]
    fn missing_sd_image_falls_back_to_nand() {
        let mut storage =
            FakeStorage::default().with_nand(FirmwareType::Twl, image(0x0800_6800, 0xBB), 0x16);
        let mut crypto = FakeCrypto::default();

        let ctx = ctx(FirmwareType::Twl, ConsoleModel::Old);
        let (loaded, _) = run(&mut storage, &mut crypto, &ctx, true);
        assert_eq!(loaded.unwrap().source, FirmSource::Nand);
    }

    #[test]
    fn reads_title_from_firm_source_nand() {
        let mut storage = FakeStorage::default()
            .with_nand(FirmwareType::Native, image(0x0800_6800, 0xBB), 0x52)
            .with_nand_on(
                NandTarget::EmuNand(2),
                FirmwareType::Native,
                image(0x0800_6800, 0xEE),
                0x50,
            );
        let mut crypto = FakeCrypto::default();

        let mut ctx = ctx(FirmwareType::Native, ConsoleModel::Old);
        ctx.firm_source = NandTarget::EmuNand(2);
        let (loaded, buf) = run(&mut storage, &mut crypto, &ctx, false);
        assert_eq!(loaded.unwrap().version, Some(0x50));
        assert_eq!(storage.nand_reads, [NandTarget::EmuNand(2)]);

        let firm = Firm::try_from_bytes(&buf).unwrap();
        assert_eq!(firm.section_data(&firm.section(2).unwrap())[0], 0xEE);
    }

    #[test]
    fn nand_failure_is_fatal() {
        let mut storage = FakeStorage::default();
        let mut crypto = FakeCrypto::default();

        let ctx = ctx(FirmwareType::Native, ConsoleModel::Old);
        let (loaded, _) = run(&mut storage, &mut crypto, &ctx, true);
        assert!(matches!(
            loaded,
            Err(BootError::Storage(StorageError::NotFound))
        ));
    }

    #[test]
    fn hash_mismatch_is_a_crypto_error() {
        let mut storage =
            FakeStorage::default().with_nand(FirmwareType::Native, image(0x0800_6800, 0xBB), 0x52);
        let mut crypto = FakeCrypto {
            bad_section: Some(1),
            ..FakeCrypto::default()
        };

        let ctx = ctx(FirmwareType::Native, ConsoleModel::Old);
        let (loaded, _) = run(&mut storage, &mut crypto, &ctx, false);
        assert!(matches!(
            loaded,
            Err(BootError::Crypto(CryptoError::SectionHash { index: 1 }))
        ));
    }

    #[test]
    fn new_model_unlocks_arm9_and_moves_entrypoint() {
        let agb = FirmBuilder::new()
            .section(0x1FF8_0000, vec![1; 0x10])
            .section(0x1FF0_0000, vec![1; 0x10])
            .section(0x0800_6000, vec![1; 0x10])
            .section(0x0800_6000, vec![1; 0x10])
            .build();
        let mut storage = FakeStorage::default()
            .with_nand(FirmwareType::Native, image(0x0800_6000, 0xBB), 0x21)
            .with_nand(FirmwareType::Agb, agb, 0x0B);
        let mut crypto = FakeCrypto::default();

        let native = ctx(FirmwareType::Native, ConsoleModel::New);
        let (loaded, buf) = run(&mut storage, &mut crypto, &native, false);
        loaded.unwrap();
        assert_eq!(Firm::try_from_bytes(&buf).unwrap().arm9_entry(), NATIVE_ARM9_ENTRY);
        assert_eq!(crypto.arm9_decryptions, 1);

        let agb = ctx(FirmwareType::Agb, ConsoleModel::New);
        let (loaded, buf) = run(&mut storage, &mut crypto, &agb, false);
        loaded.unwrap();
        assert_eq!(Firm::try_from_bytes(&buf).unwrap().arm9_entry(), LEGACY_ARM9_ENTRY);
        assert_eq!(crypto.arm9_decryptions, 2);
    }

    #[test]
    fn old_model_keeps_entrypoint() {
        let mut storage =
            FakeStorage::default().with_nand(FirmwareType::Native, image(0x0800_6800, 0xBB), 0x52);
        let mut crypto = FakeCrypto::default();

        let ctx = ctx(FirmwareType::Native, ConsoleModel::Old);
        let (loaded, buf) = run(&mut storage, &mut crypto, &ctx, false);
        loaded.unwrap();
        assert_eq!(Firm::try_from_bytes(&buf).unwrap().arm9_entry(), FirmBuilder::ARM9_ENTRY);
        assert_eq!(crypto.arm9_decryptions, 0);
    }
}
