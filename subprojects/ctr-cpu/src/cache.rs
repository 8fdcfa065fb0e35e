//! ARM946E-S cache maintenance through CP15.
//!
//! The data cache is 4-way set associative with 32-byte lines; every line is addressed by
//! segment (bits 30..32) and index (bits 5..10) when cleaning by set/way.
//!
//! # References
//!
//! - [ARM946E-S Technical Reference Manual: Cache operations register](https://developer.arm.com/documentation/ddi0201/d/system-control-coprocessor/cp15-register-descriptions/register-7--cache-operations-register)

use core::arch::naked_asm;

/// Clean and invalidate the whole data cache, then drain the write buffer.
///
/// Dirty lines are written back to memory, so data written through the cache becomes
/// visible to DMA engines and to the ARM11 core.
///
/// # SAFETY
///
/// This function is `naked`, and its body is written in assembly. It clobbers `r0`-`r2`,
/// which are caller-saved under the AAPCS.
#[unsafe(naked)]
pub unsafe extern "C" fn clean_invalidate_dcache() {
    naked_asm!(
        "mov r1, #0",
        "1:",
        "mov r0, #0",
        "2:",
        "orr r2, r1, r0",
        "mcr p15, 0, r2, c7, c14, 2", // Clean and invalidate entry by set/way
        "add r0, r0, #0x20",
        "cmp r0, #0x400",
        "bne 2b",
        "add r1, r1, #0x40000000",
        "cmp r1, #0",
        "bne 1b",
        "mcr p15, 0, r1, c7, c10, 4", // Drain write buffer
        "bx lr",
    );
}

/// Invalidate the whole instruction cache.
///
/// # SAFETY
///
/// This function is `naked`, and its body is written in assembly. Code fetched afterwards
/// comes from memory, so any newly copied code must already be cleaned out of the data
/// cache.
#[unsafe(naked)]
pub unsafe extern "C" fn invalidate_icache() {
    naked_asm!(
        "mov r0, #0",
        "mcr p15, 0, r0, c7, c5, 0", // Invalidate entire instruction cache
        "bx lr",
    );
}

/// Clean the data cache and invalidate the instruction cache.
///
/// # Safety
///
/// See [`clean_invalidate_dcache`] and [`invalidate_icache`].
pub unsafe fn flush_all() {
    unsafe {
        clean_invalidate_dcache();
        invalidate_icache();
    }
}
