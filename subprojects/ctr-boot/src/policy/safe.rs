//! SAFE_FIRM patch set: NAND write protection and, when requested, EmuNAND redirection.

use ctr_firm::{ConsoleModel, read::FirmMut};
use ctr_patch::{PatchError, PatchRule};
use log::info;

use crate::{
    context::{BootContext, NandProtection},
    policy::{PatchInputs, emunand, native, process9},
};

const ARM9: usize = 2;

/// Old-model SAFE_FIRM checks writes with `subs r4, r0, #0; blt`; make the branch
/// unconditional past a forced failure.
const OLD_WRITE_BLOCK: PatchRule = PatchRule::new(
    "SAFE_FIRM NAND write check",
    &[0x04, 0x1E, 0x1D, 0xDB],
    0,
    &[0x00, 0x24, 0x1D, 0xE0],
);

pub(super) fn patch(
    firm: &mut FirmMut<'_>,
    ctx: &BootContext,
    inputs: &PatchInputs<'_>,
) -> Result<(), PatchError> {
    let arm9_address = firm
        .section(ARM9)
        .map(|section| section.address)
        .ok_or(PatchError::TargetMissing {
            target: "ARM9 section",
        })?;
    let arm9 = firm.section_data_mut(ARM9).ok_or(PatchError::TargetMissing {
        target: "ARM9 section",
    })?;

    // Locate everything EmuNAND needs before the write block changes the code
    let redirect = match inputs.emunand {
        Some(location) => {
            let p9 = process9::locate(arm9)?;
            let sdmmc = emunand::find_sdmmc(&arm9[p9.range()])?;
            Some((location, p9, sdmmc))
        }
        None => None,
    };

    if ctx.protection != NandProtection::Off {
        match ctx.model {
            ConsoleModel::New => native::block_nand_writes(arm9)?,
            ConsoleModel::Old => {
                OLD_WRITE_BLOCK.apply_required(arm9)?;
            }
        }
    }

    if let Some((location, p9, sdmmc)) = redirect {
        emunand::patch(
            arm9,
            arm9_address,
            p9.range(),
            inputs.payloads.emunand,
            &location,
            sdmmc,
        )?;
    }

    info!("SAFE_FIRM patched");
    Ok(())
}
