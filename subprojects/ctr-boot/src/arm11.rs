//! Single-slot request mailbox to the ARM11 core.
//!
//! The ARM11 runs a small service loop that polls [`map::ARM11_OPERATION`]. The ARM9 side
//! posts one operation at a time: it waits for the cell to read [`Arm11Operation::Ready`],
//! fills the parameter block, then writes the operation code. The ARM11 resets the cell to
//! `Ready` once it is done. There is no timeout; a hung ARM11 hangs the boot.

use log::debug;

use crate::mailbox::{HardwareMailbox, map};

/// Operations understood by the ARM11 service loop.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm11Operation {
    /// Power up both LCDs and the GPU
    InitScreens = 0,
    SetupFramebuffers = 1,
    ClearScreens = 2,
    SwapFramebuffers = 3,
    UpdateBrightness = 4,
    /// Power the LCDs down before the firmware takes over
    DeinitScreens = 5,
    /// Relocate the ARM11 service loop out of the way of the incoming kernel
    PrepareForFirmlaunch = 6,
    /// Idle; no operation pending
    Ready = 7,
}

/// Spin until the ARM11 has finished the previous operation.
pub fn wait_ready(hw: &mut impl HardwareMailbox) {
    while hw.read_u32(map::ARM11_OPERATION) != Arm11Operation::Ready as u32 {
        core::hint::spin_loop();
    }
}

/// Post `operation` with `parameters` and return without waiting for completion.
pub fn request(hw: &mut impl HardwareMailbox, operation: Arm11Operation, parameters: &[u32]) {
    wait_ready(hw);

    for (i, &word) in parameters.iter().enumerate() {
        hw.write_u32(map::ARM11_PARAMETERS + 4 * i as u32, word);
    }
    hw.flush_caches();

    debug!("ARM11 request {operation:?}");
    hw.write_u32(map::ARM11_OPERATION, operation as u32);
    hw.flush_caches();
}
