//! Access to the fixed physical cells shared between the boot stage, the ARM11 core and
//! the hardware.
//!
//! Every hardware-facing read and write of the boot engine goes through
//! [`HardwareMailbox`], so the decision logic and the chainloader can be exercised
//! against [`MemoryMailbox`] on the host and against [`PhysicalMailbox`] on the console.

use bitflags::bitflags;
use ctr_firm::ConsoleModel;

use crate::context::LaunchArgs;

mod memory;
#[cfg(target_arch = "arm")]
mod physical;

pub use self::memory::{Arm11Request, MemoryMailbox};
#[cfg(target_arch = "arm")]
pub use self::physical::PhysicalMailbox;

/// Physical addresses of the cells and registers the boot engine touches.
pub mod map {
    /// Title ID low word of the firmware the OS asked to launch, stored as UTF-16 by the
    /// relaunch stub.
    pub const LAUNCHED_TID_LOW: u32 = 0x23F0_0000;
    /// Relaunch flag; holds the ASCII firmware type digit when non-zero.
    pub const RELAUNCH_FLAG: u32 = LAUNCHED_TID_LOW + 0x0A;
    /// Marker that is `'3'` when the launched title is AGB_FIRM.
    pub const AGB_MARKER: u32 = LAUNCHED_TID_LOW + 0x0E;

    /// HID pad state; a button reads as 0 while held.
    pub const HID_PAD: u32 = 0x1014_6000;
    /// GPU power control; 1 while the display has not been powered up.
    pub const PDN_GPU_CNT: u32 = 0x1014_1200;
    /// MPCore configuration; 7 on New models.
    pub const PDN_MPCORE_CFG: u32 = 0x1014_0FFC;
    /// Unit type; non-zero on development units.
    pub const CFG_UNITINFO: u32 = 0x1001_0010;

    /// ARM11 parameter block for [`crate::arm11`] requests.
    pub const ARM11_PARAMETERS: u32 = 0x1FFF_F000;
    /// ARM11 operation cell for [`crate::arm11`] requests.
    pub const ARM11_OPERATION: u32 = 0x1FFF_FFF0;
    /// Entry cell polled by the ARM11 stub installed at cold boot.
    pub const ARM11_STUB_ENTRY: u32 = 0x1FFF_FFF8;
    /// Entry cell polled by the ARM11 kernel during a firmlaunch.
    pub const ARM11_FIRMLAUNCH_ENTRY: u32 = 0x1FFF_FFFC;
}

bitflags! {
    /// Pad buttons, as reported by [`HardwareMailbox::pressed_buttons`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[repr(transparent)]
    pub struct Buttons: u32 {
        const A = 1 << 0;
        const B = 1 << 1;
        const SELECT = 1 << 2;
        const START = 1 << 3;
        const RIGHT = 1 << 4;
        const LEFT = 1 << 5;
        const UP = 1 << 6;
        const DOWN = 1 << 7;
        const R = 1 << 8;
        const L = 1 << 9;
        const X = 1 << 10;
        const Y = 1 << 11;

        /// Directional pad
        const DPAD = Self::RIGHT.bits() | Self::LEFT.bits() | Self::UP.bits() | Self::DOWN.bits();
        /// Combination forcing a SAFE_FIRM boot from SysNAND
        const SAFE_MODE = Self::L.bits() | Self::R.bits() | Self::A.bits() | Self::UP.bits();
    }
}

/// Raw access to physical memory and the few privileged operations the boot engine needs.
pub trait HardwareMailbox {
    /// Read the byte at `addr`.
    fn read_u8(&self, addr: u32) -> u8;

    /// Read the little-endian word at `addr`.
    fn read_u32(&self, addr: u32) -> u32;

    /// Write the little-endian word at `addr`.
    fn write_u32(&mut self, addr: u32, value: u32);

    /// Copy `bytes` to physical memory starting at `addr`.
    fn copy_to_physical(&mut self, addr: u32, bytes: &[u8]);

    /// Clean and invalidate the data cache, drain the write buffer and invalidate the
    /// instruction cache.
    fn flush_caches(&mut self);

    /// Busy-wait for `ms` milliseconds.
    fn sleep_ms(&mut self, ms: u32);

    /// Branch to the ARM9 entrypoint. Never returns.
    fn jump(&mut self, entry: u32, args: LaunchArgs) -> !;

    /// Relaunch flag byte; zero on a cold boot.
    fn relaunch_flag(&self) -> u8 {
        self.read_u8(map::RELAUNCH_FLAG)
    }

    /// AGB marker byte of a relaunch.
    fn agb_marker(&self) -> u8 {
        self.read_u8(map::AGB_MARKER)
    }

    /// Buttons held right now.
    fn pressed_buttons(&self) -> Buttons {
        Buttons::from_bits_truncate(self.read_u32(map::HID_PAD) ^ 0xFFF)
    }

    /// Whether something already powered up the display (e.g. a previous payload).
    fn display_initialized(&self) -> bool {
        self.read_u8(map::PDN_GPU_CNT) != 1
    }

    /// Hardware revision of the console.
    fn console_model(&self) -> ConsoleModel {
        match self.read_u8(map::PDN_MPCORE_CFG) {
            7 => ConsoleModel::New,
            _ => ConsoleModel::Old,
        }
    }

    /// Whether this is a development unit rather than a retail console.
    fn is_dev_unit(&self) -> bool {
        self.read_u8(map::CFG_UNITINFO) != 0
    }
}
