//! Redirection of NAND accesses to an image on the SD card.
//!
//! A small routine is copied into a cavity of the ARM9 binary. Process9's NAND read and
//! write paths are rewired to call it, and the MPU is opened up so the routine may run
//! from where it was placed.

use core::ops::Range;

use ctr_patch::{
    PatchError, find, find_from,
    bytes::{read_u32, write_bytes, write_u16, write_u32},
};
use log::debug;

use crate::emunand::EmuNandLocation;

/// Marks the instruction that loads the SDMMC controller object.
const SDMMC_PATTERN: &[u8] = &[0x21, 0x20, 0x18, 0x20];
/// Padding run in front of the cavity.
const CAVITY_PATTERN: &[u8] = &[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];
const CAVITY_SEARCH_START: usize = 0x1_3500;
const CAVITY_SKIP: usize = 0x455;
/// Shared by the NAND read and write routines, 6 bytes after their call sites.
const NAND_RW_PATTERN: &[u8] = &[0x1E, 0x00, 0xC8, 0x05];
const NAND_RW_BACKTRACK: usize = 6;
/// The write routine follows the read routine within this window.
const NAND_WRITE_WINDOW: usize = 0x100;
/// Region descriptor table of the MPU setup code.
const MPU_PATTERN: &[u8] = &[0x03, 0x00, 0x24, 0x00];

/// `ldr r4, [pc, #0]`
const LDR_R4_PC: u16 = 0x4C00;
/// `blx r4`
const BLX_R4: u16 = 0x47A0;

/// Region descriptors written over the stock MPU table, by word index.
const MPU_REGIONS: [(usize, u32); 3] = [(0, 0x0036_0003), (6, 0x0020_0603), (9, 0x001C_0603)];

/// Read the address of the SDMMC controller object from unpatched Process9 code.
pub fn find_sdmmc(process9: &[u8]) -> Result<u32, PatchError> {
    const TARGET: &str = "SDMMC object";

    let at = find(process9, SDMMC_PATTERN).ok_or(PatchError::TargetMissing { target: TARGET })?;
    let base = read_u32(process9, at + 9);
    let offset = read_u32(process9, at + 0xD);
    match (base, offset) {
        (Some(base), Some(offset)) => Ok(base.wrapping_add(offset)),
        _ => Err(PatchError::Malformed {
            target: TARGET,
            reason: "literal pool outside Process9",
        }),
    }
}

/// Inject the redirection routine into `arm9`, loaded at `arm9_address`, and hook the
/// NAND accessors of the Process9 code at `process9`.
///
/// `sdmmc` must come from [`find_sdmmc`] on the unpatched code.
pub fn patch(
    arm9: &mut [u8],
    arm9_address: u32,
    process9: Range<usize>,
    routine: &[u8],
    location: &EmuNandLocation,
    sdmmc: u32,
) -> Result<(), PatchError> {
    let cavity = find_from(arm9, CAVITY_PATTERN, CAVITY_SEARCH_START)
        .map(|at| at + CAVITY_SKIP)
        .ok_or(PatchError::TargetMissing {
            target: "EmuNAND cavity",
        })?;
    write_bytes(arm9, cavity, routine).map_err(|err| err.in_target("EmuNAND routine"))?;

    let placed = &mut arm9[cavity..cavity + routine.len()];
    fill_placeholder(placed, b"NAND", location.redirect_offset)?;
    fill_placeholder(placed, b"NCSD", location.header_sector)?;
    fill_placeholder(placed, b"SDMC", sdmmc)?;

    let target = arm9_address.wrapping_add(cavity as u32);
    hook_nand_accessors(&mut arm9[process9], target)?;
    open_mpu(arm9)?;

    debug!(
        "EmuNAND routine at {target:#x}, redirect {:#x}, header {:#x}",
        location.redirect_offset, location.header_sector
    );
    Ok(())
}

fn fill_placeholder(
    routine: &mut [u8],
    tag: &'static [u8; 4],
    value: u32,
) -> Result<(), PatchError> {
    let target = match tag {
        b"NAND" => "EmuNAND offset placeholder",
        b"NCSD" => "EmuNAND header placeholder",
        _ => "SDMMC placeholder",
    };
    let at = find(routine, tag).ok_or(PatchError::TargetMissing { target })?;
    write_u32(routine, at, value).map_err(|err| err.in_target(target))
}

/// Replace the controller calls in the NAND read and write routines with a call to
/// `target`.
fn hook_nand_accessors(process9: &mut [u8], target: u32) -> Result<(), PatchError> {
    const TARGET: &str = "NAND accessors";

    let read = find(process9, NAND_RW_PATTERN)
        .and_then(|at| at.checked_sub(NAND_RW_BACKTRACK))
        .ok_or(PatchError::TargetMissing { target: TARGET })?;

    let window_start = read + 10;
    let window_end = (window_start + NAND_WRITE_WINDOW).min(process9.len());
    let write = process9
        .get(window_start..window_end)
        .and_then(|window| find(window, NAND_RW_PATTERN))
        .map(|at| window_start + at - NAND_RW_BACKTRACK)
        .ok_or(PatchError::TargetMissing { target: TARGET })?;

    for site in [read, write] {
        write_u16(process9, site, LDR_R4_PC).map_err(|err| err.in_target(TARGET))?;
        write_u16(process9, site + 2, BLX_R4).map_err(|err| err.in_target(TARGET))?;
        write_u32(process9, site + 4, target).map_err(|err| err.in_target(TARGET))?;
    }
    Ok(())
}

fn open_mpu(arm9: &mut [u8]) -> Result<(), PatchError> {
    const TARGET: &str = "MPU region table";

    let table = find(arm9, MPU_PATTERN).ok_or(PatchError::TargetMissing { target: TARGET })?;
    for (index, value) in MPU_REGIONS {
        write_u32(arm9, table + 4 * index, value).map_err(|err| err.in_target(TARGET))?;
    }
    Ok(())
}
