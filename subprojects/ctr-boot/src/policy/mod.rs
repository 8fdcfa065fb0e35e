//! Patch sets per firmware type.
//!
//! NATIVE_FIRM and SAFE_FIRM are patched by pattern search, since their code moves between
//! versions. TWL_FIRM and AGB_FIRM are patched at fixed offsets known for each console
//! model. Every required target that cannot be found aborts the boot.

use alloc::vec::Vec;

use ctr_firm::{FirmwareType, read::FirmMut};
use ctr_patch::{PatchError, PatchRule};

use crate::{config::Configuration, context::BootContext, emunand::EmuNandLocation};

pub mod cfw_info;
pub mod emunand;
pub mod kernel11;
pub mod legacy;
pub mod native;
pub mod process9;
pub mod safe;

/// Code blobs injected into the firmware.
#[derive(Debug, Clone, Copy)]
pub struct Payloads<'a> {
    /// Firmlaunch hook that reloads this boot stage instead of the NAND firmware; carries
    /// an "OPEN" placeholder for the address of Process9's file-open routine
    pub reboot: &'a [u8],
    /// SDMMC redirection routine; carries "NAND", "NCSD" and "SDMC" placeholders
    pub emunand: &'a [u8],
    /// Replacement for the `loader` sysmodule
    pub injector: &'a [u8],
    /// `svcGetCFWInfo` handler; carries the info block tagged with
    /// [`cfw_info::CFW_INFO_MAGIC`]
    pub svc_cfw_info: &'a [u8],
    /// Kernel hook that lifts the service access checks of builtin modules
    pub k11_modules: &'a [u8],
}

/// Everything besides the context that decides how a firmware is patched.
#[derive(Debug, Clone, Copy)]
pub struct PatchInputs<'a> {
    pub payloads: Payloads<'a>,
    /// EmuNAND to redirect to; `None` boots SysNAND
    pub emunand: Option<EmuNandLocation>,
    /// Installed title version; `None` (SD image) counts as newer than any version
    pub firm_version: Option<u32>,
    /// Configuration of this boot
    pub config: Configuration,
    /// Whether the console is a development unit
    pub dev_unit: bool,
}

impl PatchInputs<'_> {
    /// Whether the firmware is at least `version`.
    pub fn version_at_least(&self, version: u32) -> bool {
        self.firm_version.is_none_or(|found| found >= version)
    }
}

/// `dev_options` value that selects the UNITINFO swap.
pub const UNIT_INFO_DEV_OPTIONS: u8 = 2;

/// `movne r1, #1`: Process9 sets the UNITINFO value shared with the ARM11 kernel.
const UNIT_INFO_RULES: [PatchRule; 2] = [
    // mov r1, #1
    PatchRule::new("UNITINFO value", &[0x01, 0x10, 0xA0, 0x13], 0, &[0x01, 0x10, 0xA0, 0xE3]),
    // mov r1, #0
    PatchRule::new("UNITINFO value", &[0x01, 0x10, 0xA0, 0x13], 0, &[0x00, 0x10, 0xA0, 0xE3]),
];

/// Make the firmware report the opposite unit type to the ARM11 side, so retail units get
/// development features and development units run retail software.
pub(crate) fn swap_unit_info(arm9: &mut [u8], dev_unit: bool) -> Result<(), PatchError> {
    UNIT_INFO_RULES[usize::from(dev_unit)].apply_required(arm9)?;
    Ok(())
}

/// What [`patch`] produced besides the in-place edits.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Section 0 after the loader swap, which no longer fits the container slot
    pub section0: Option<Vec<u8>>,
}

/// Apply the patch set for `ctx.firm_type` to `firm`.
pub fn patch(
    firm: &mut FirmMut<'_>,
    ctx: &BootContext,
    inputs: &PatchInputs<'_>,
) -> Result<PatchOutcome, PatchError> {
    match ctx.firm_type {
        FirmwareType::Native => native::patch(firm, ctx, inputs),
        FirmwareType::Safe => safe::patch(firm, ctx, inputs).map(|()| PatchOutcome::default()),
        FirmwareType::Twl | FirmwareType::Agb => {
            legacy::patch(firm, ctx, inputs).map(|()| PatchOutcome::default())
        }
    }
}
