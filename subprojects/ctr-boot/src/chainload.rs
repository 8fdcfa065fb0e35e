//! Final hand-over to the patched firmware.

use ctr_firm::{FirmwareType, read::Firm};
use log::{debug, info};

use crate::{
    arm11::{self, Arm11Operation},
    context::{BootContext, BootType},
    mailbox::{HardwareMailbox, map},
};

/// First section [`launch`] copies.
///
/// NATIVE_FIRM's section 0 is rebuilt by the loader swap and placed separately with
/// [`place_section0`].
pub const fn first_section(firm_type: FirmwareType) -> usize {
    match firm_type {
        FirmwareType::Native => 1,
        FirmwareType::Twl | FirmwareType::Agb | FirmwareType::Safe => 0,
    }
}

/// Copy a rebuilt section 0 to its load address.
pub fn place_section0(hw: &mut impl HardwareMailbox, address: u32, section0: &[u8]) {
    debug!("section 0: {:#x} bytes to {address:#010x}", section0.len());
    hw.copy_to_physical(address, section0);
}

/// Copy the sections of `firm` to their load addresses, release the ARM11 core and jump to
/// the ARM9 entrypoint.
pub fn launch(firm: &Firm<'_>, ctx: &BootContext, hw: &mut impl HardwareMailbox) -> ! {
    let first = first_section(ctx.firm_type);
    for section in firm.sections().filter(|section| section.index >= first) {
        debug!(
            "section {}: {:#x} bytes to {:#010x}",
            section.index, section.size, section.address
        );
        hw.copy_to_physical(section.address, firm.section_data(&section));
    }

    let arm11_cell = match ctx.boot_type {
        BootType::ColdBoot => {
            arm11::request(hw, Arm11Operation::DeinitScreens, &[]);
            arm11::wait_ready(hw);
            map::ARM11_STUB_ENTRY
        }
        BootType::Relaunch => map::ARM11_FIRMLAUNCH_ENTRY,
    };
    hw.write_u32(arm11_cell, firm.arm11_entry());
    hw.flush_caches();

    info!(
        "launching {:?}: ARM9 {:#010x}, ARM11 {:#010x}",
        ctx.firm_type,
        firm.arm9_entry(),
        firm.arm11_entry()
    );
    hw.jump(firm.arm9_entry(), ctx.launch_args)
}
