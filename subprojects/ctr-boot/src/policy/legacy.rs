//! TWL_FIRM and AGB_FIRM patch tables.
//!
//! Offsets are absolute in the container and listed as `[old, new]` per console model.
//! With UNITINFO development options the reported unit type is swapped as well.

use ctr_firm::{ConsoleModel, FirmwareType, read::FirmMut};
use ctr_patch::{
    LegacyPatchEntry,
    LegacyPayload::{Block, Value, ValueZeroTail},
    PatchError, apply_table,
};
use log::{debug, info};

use crate::{
    context::BootContext,
    policy::{PatchInputs, UNIT_INFO_DEV_OPTIONS, swap_unit_info},
};

/// `movs r0, #0; add sp, #0x138; pop {r4-r6, pc}`
const RETURN_ZERO: &[u8] = &[0x00, 0x20, 0x4E, 0xB0, 0x70, 0xBD];

/// Signature checks and region/blacklist checks of the DS(i) launcher.
const TWL_PATCHES: [LegacyPatchEntry; 9] = [
    LegacyPatchEntry::new([0x16_50C0, 0x16_5D64], Block(RETURN_ZERO)),
    LegacyPatchEntry::new([0x17_3A0E, 0x17_474A], Value(0x2001)),
    LegacyPatchEntry::new([0x17_4802, 0x17_553E], ValueZeroTail(0x2000)),
    LegacyPatchEntry::new([0x17_4964, 0x17_56A0], ValueZeroTail(0x2000)),
    LegacyPatchEntry::new([0x17_4D52, 0x17_5A8E], ValueZeroTail(0x2001)),
    LegacyPatchEntry::new([0x17_4D5E, 0x17_5A9A], ValueZeroTail(0x2001)),
    LegacyPatchEntry::new([0x17_4D6A, 0x17_5AA6], ValueZeroTail(0x2001)),
    LegacyPatchEntry::new([0x17_4E56, 0x17_5B92], Value(0x2001)),
    LegacyPatchEntry::new([0x17_4E58, 0x17_5B94], Value(0x4770)),
];

/// Signature check of the GBA launcher, then the boot screen skip.
const AGB_PATCHES: [LegacyPatchEntry; 2] = [
    LegacyPatchEntry::new([0x9_D2A8, 0x9_DF64], Block(RETURN_ZERO)),
    LegacyPatchEntry::new([0xD_7A12, 0xD_8B8A], Value(0xEF26)),
];

/// Oldest Old-model title versions the tables were made for.
const TWL_MIN_VERSION: u32 = 0x16;
const AGB_MIN_VERSION: u32 = 0x0B;

pub(super) fn patch(
    firm: &mut FirmMut<'_>,
    ctx: &BootContext,
    inputs: &PatchInputs<'_>,
) -> Result<(), PatchError> {
    let (table, min_version, target): (&[LegacyPatchEntry], _, _) = match ctx.firm_type {
        FirmwareType::Twl => (&TWL_PATCHES[..], TWL_MIN_VERSION, "TWL_FIRM table"),
        // The last AGB entry skips the boot screen
        FirmwareType::Agb if ctx.show_gba_boot => {
            (&AGB_PATCHES[..], AGB_MIN_VERSION, "AGB_FIRM table")
        }
        FirmwareType::Agb => (&AGB_PATCHES[..1], AGB_MIN_VERSION, "AGB_FIRM table"),
        FirmwareType::Native | FirmwareType::Safe => return Ok(()),
    };

    if ctx.model == ConsoleModel::Old && !inputs.version_at_least(min_version) {
        debug!("{target}: version {:?} predates the table, skipped", inputs.firm_version);
    } else {
        apply_table(table, firm.bytes_mut(), ctx.model).map_err(|err| err.in_target(target))?;
        info!("{target}: {} patches applied", table.len());
    }

    if inputs.config.dev_options() == UNIT_INFO_DEV_OPTIONS {
        let arm9 = firm
            .section_data_mut(ctx.firm_type.arm9_section())
            .ok_or(PatchError::TargetMissing {
                target: "ARM9 section",
            })?;
        swap_unit_info(arm9, inputs.dev_unit)?;
    }
    Ok(())
}
