//! Non-returning transfer of control.

use core::arch::asm;

/// Branch to `entry` with `argc` in `r0` and `argv` in `r1`.
///
/// Uses `bx`, so bit 0 of `entry` selects Thumb state.
///
/// # Safety
///
/// `entry` must point to valid code for the current core, and the caches must already be
/// coherent with any code copied there. Nothing on the current stack is used again.
pub unsafe fn branch_to(entry: u32, argc: u32, argv: u32) -> ! {
    unsafe {
        asm!(
            "bx {entry}",
            entry = in(reg) entry,
            in("r0") argc,
            in("r1") argv,
            options(noreturn, nostack),
        );
    }
}
