//! # ctr-boot
//!
//! ARM9 boot engine: decides which firmware to start, loads and patches it, and hands the
//! machine over to it.
//!
//! The flow of a boot, driven by [`boot::run`]:
//! 1. [`context::decide`] turns the mailbox cells, the held buttons and the stored
//!    [`config::Configuration`] into a [`BootContext`].
//! 2. [`emunand::settle`] locates the requested EmuNANDs and falls back to SysNAND.
//! 3. [`load::load`] reads the firmware from the SD card or the installed title.
//! 4. [`policy::patch`] applies the patch set of the firmware type.
//! 5. [`chainload::launch`] copies the sections to their load addresses, releases the ARM11
//!    and jumps to the ARM9 entrypoint.
//!
//! All hardware access goes through [`HardwareMailbox`], and storage, crypto, display and
//! power through the traits in [`services`], so the whole flow runs on the host against
//! [`MemoryMailbox`] and test doubles.
//!
//! ## References:
//! - [3dbrew: FIRM](https://www.3dbrew.org/wiki/FIRM)
//! - [3dbrew: Memory layout](https://www.3dbrew.org/wiki/Memory_layout)
//! - [3dbrew: HID Registers](https://www.3dbrew.org/wiki/HID_Registers)

#![cfg_attr(not(test), no_std)]

extern crate alloc;

/// Bare-metal builds get the halting panic handler; host builds use std's.
#[cfg(all(feature = "panic-handler", target_os = "none"))]
#[allow(unused_imports)]
use ctr_panic_handler as _;

pub mod arm11;
pub mod boot;
pub mod chainload;
pub mod config;
pub mod context;
pub mod emunand;
pub mod error;
pub mod load;
pub mod mailbox;
pub mod policy;
pub mod services;

#[cfg(test)]
mod testing;

pub use self::{
    config::Configuration,
    context::{BootContext, BootType, NandProtection, NandTarget},
    error::BootError,
    mailbox::{Buttons, HardwareMailbox, MemoryMailbox},
};
