//! ARM11 kernel structures: the exception vector page and the SVC table.

use ctr_patch::{
    PatchError, find,
    bytes::{read_u32, write_bytes, write_u32},
};
use log::debug;

/// `ldr r11, [r12]` in the SVC vector's dispatch code.
const EXCEPTION_PAGE_PATTERN: &[u8] = &[0x00, 0xB0, 0x9C, 0xE5];
/// Distance from the pattern back to the start of the vector page.
const PATTERN_TO_PAGE: usize = 0x2C;
/// Kernel virtual base that section 1 is loaded at.
const KERNEL_BASE: u32 = 0xFFF0_0000;
/// Virtual address of the high exception vectors.
const VECTORS_VA: u32 = 0xFFFF_0000;
const PAGE_SIZE: usize = 0x1000;

/// SVC number of the injected backdoor.
pub const BACKDOOR_SVC: usize = 0x7B;

/// `svcBackdoor`: call the function in r0 in supervisor mode on a private stack.
const SVC_BACKDOOR: [u8; 40] = [
    0xFF, 0x10, 0xCD, 0xE3, // bic   r1, sp, #0xFF
    0x0F, 0x1C, 0x81, 0xE3, // orr   r1, r1, #0xF00
    0x28, 0x10, 0x81, 0xE2, // add   r1, r1, #0x28
    0x00, 0x20, 0x91, 0xE5, // ldr   r2, [r1]
    0x00, 0x60, 0x22, 0xE9, // stmdb r2!, {sp, lr}
    0x02, 0xD0, 0xA0, 0xE1, // mov   sp, r2
    0x30, 0xFF, 0x2F, 0xE1, // blx   r0
    0x03, 0x00, 0xBD, 0xE8, // pop   {r0, r1}
    0x00, 0xD0, 0xA0, 0xE1, // mov   sp, r0
    0x11, 0xFF, 0x2F, 0xE1, // bx    r1
];

/// Run of 0xFF filler after the vectors; free space starts one byte past it.
const FREE_SPACE_PATTERN: &[u8] = &[0xFF; 5];

/// `tst r10, r11, lsl lr`: the SVC handler's check of the caller's SVC access mask.
const SVC_ACCESS_CHECK: u32 = 0xE11A_0E1B;
/// `movs r10, #1`
const SVC_ACCESS_GRANTED: u32 = 0xE3B0_A001;

/// Kernel code that decompresses the `.code` of the builtin modules.
const MODULE_LOAD_PATTERN: &[u8] = &[
    0x00, 0x00, 0x94, 0xE5, 0x18, 0x10, 0x90, 0xE5, 0x28, 0x20, 0x90, 0xE5, 0x48, 0x00, 0x9D, 0xE5,
];

/// Kernel structures, as offsets into section 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kernel11 {
    /// Exception vector page
    pub exceptions_page: usize,
    /// Entry of the SVC handler
    pub svc_handler: usize,
    /// First entry of the SVC table (SVC 0, always null, is skipped)
    pub svc_table: usize,
}

impl Kernel11 {
    /// Offset of the SVC table slot for `svc`.
    pub fn svc_slot(&self, svc: usize) -> usize {
        self.svc_table + 4 * svc
    }
}

/// Locate the exception page and follow the SVC vector to the SVC table.
pub fn locate(arm11: &[u8]) -> Result<Kernel11, PatchError> {
    const TARGET: &str = "ARM11 exception page";
    let malformed = |reason| PatchError::Malformed {
        target: TARGET,
        reason,
    };

    let page = find(arm11, EXCEPTION_PAGE_PATTERN)
        .and_then(|at| at.checked_sub(PATTERN_TO_PAGE))
        .ok_or(PatchError::TargetMissing { target: TARGET })?;

    // The SVC vector (+8) is a branch to the handler; decode its target relative to
    // the vector page.
    let branch = read_u32(arm11, page + 8).ok_or(malformed("truncated SVC vector"))?;
    let svc_offset = (0u32.wrapping_sub((branch & 0xFF_FFFF) << 2) & (0xFF_FFFF << 2))
        .wrapping_sub(8);
    let pointer_at = (VECTORS_VA + 8)
        .wrapping_sub(svc_offset)
        .wrapping_sub(KERNEL_BASE)
        .wrapping_add(8) as usize;

    let handler = read_u32(arm11, pointer_at).ok_or(malformed("SVC handler outside section"))?;
    let svc_handler = handler.wrapping_sub(KERNEL_BASE) as usize;

    // SVC 0 is null and marks the real start of the table
    let mut svc_table = svc_handler;
    loop {
        match read_u32(arm11, svc_table) {
            Some(0) => break,
            Some(_) => svc_table += 4,
            None => return Err(malformed("SVC table has no null entry")),
        }
    }

    debug!(
        "kernel11: exception page {page:#x}, SVC handler {svc_handler:#x}, table {svc_table:#x}"
    );
    Ok(Kernel11 {
        exceptions_page: page,
        svc_handler,
        svc_table,
    })
}

/// Free space of the exception page, handed out front to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpace {
    next: usize,
    end: usize,
}

impl FreeSpace {
    /// Find the filler after the exception vectors.
    pub fn locate(arm11: &[u8], kernel: &Kernel11) -> Result<Self, PatchError> {
        let page = kernel.exceptions_page;
        let end = page.saturating_add(PAGE_SIZE).min(arm11.len());
        let next = arm11
            .get(page..end)
            .and_then(|code| find(code, FREE_SPACE_PATTERN))
            .map(|at| page + at + 1)
            .ok_or(PatchError::TargetMissing {
                target: "ARM11 free space",
            })?;
        Ok(Self { next, end })
    }

    /// Copy `code` into the next free bytes and return its section offset.
    pub fn place(
        &mut self,
        arm11: &mut [u8],
        code: &[u8],
        target: &'static str,
    ) -> Result<usize, PatchError> {
        let at = self.next;
        if at.checked_add(code.len()).is_none_or(|end| end > self.end) {
            return Err(PatchError::Malformed {
                target,
                reason: "no room in the exception page",
            });
        }

        write_bytes(arm11, at, code).map_err(|err| err.in_target(target))?;
        self.next = (at + code.len()).next_multiple_of(4);
        Ok(at)
    }

    /// Kernel virtual address of section offset `at`.
    pub fn address(&self, at: usize) -> u32 {
        KERNEL_BASE + at as u32
    }
}

/// Point SVC `svc` at code placed in the exception page.
pub fn set_svc(
    arm11: &mut [u8],
    kernel: &Kernel11,
    free: &FreeSpace,
    svc: usize,
    code_at: usize,
    target: &'static str,
) -> Result<(), PatchError> {
    write_u32(arm11, kernel.svc_slot(svc), free.address(code_at))
        .map_err(|err| err.in_target(target))
}

/// Install the backdoor SVC in free space, unless the slot is already taken.
///
/// Returns whether the stub was installed.
pub fn install_backdoor(
    arm11: &mut [u8],
    kernel: &Kernel11,
    free: &mut FreeSpace,
) -> Result<bool, PatchError> {
    const TARGET: &str = "svcBackdoor";

    match read_u32(arm11, kernel.svc_slot(BACKDOOR_SVC)) {
        None => {
            return Err(PatchError::Malformed {
                target: TARGET,
                reason: "SVC table slot outside section",
            });
        }
        Some(0) => {}
        Some(existing) => {
            debug!("{TARGET}: SVC {BACKDOOR_SVC:#x} already implemented at {existing:#x}");
            return Ok(false);
        }
    }

    let at = free.place(arm11, &SVC_BACKDOOR, TARGET)?;
    set_svc(arm11, kernel, free, BACKDOOR_SVC, at, TARGET)?;
    debug!("{TARGET}: installed at {:#x}", free.address(at));
    Ok(true)
}

/// Let every process call every SVC by making the handler's access mask test pass.
pub fn grant_svc_access(arm11: &mut [u8], kernel: &Kernel11) -> Result<(), PatchError> {
    const TARGET: &str = "SVC access check";

    let check = (kernel.svc_handler..arm11.len())
        .step_by(4)
        .find(|&at| read_u32(arm11, at) == Some(SVC_ACCESS_CHECK))
        .ok_or(PatchError::TargetMissing { target: TARGET })?;

    write_u32(arm11, check, SVC_ACCESS_GRANTED).map_err(|err| err.in_target(TARGET))?;
    debug!("{TARGET}: patched at {check:#x}");
    Ok(())
}

/// Detour the decompression of builtin modules through `hook`, which patches their
/// service access checks once their code is in memory.
///
/// Kernels without the decompression routine are left alone; returns whether the hook was
/// installed.
pub fn hook_module_loads(
    arm11: &mut [u8],
    free: &mut FreeSpace,
    hook: &[u8],
) -> Result<bool, PatchError> {
    const TARGET: &str = "builtin module access checks";

    let Some(site) = find(arm11, MODULE_LOAD_PATTERN) else {
        debug!("{TARGET}: no module decompression routine");
        return Ok(false);
    };

    let at = free.place(arm11, hook, TARGET)?;
    write_u32(arm11, site, branch_link(site, at)).map_err(|err| err.in_target(TARGET))?;
    debug!("{TARGET}: {site:#x} detoured to {at:#x}");
    Ok(true)
}

/// `bl` at section offset `from` to section offset `to`.
fn branch_link(from: usize, to: usize) -> u32 {
    let words = (to as u32).wrapping_sub(from as u32 + 8) >> 2;
    0xEB00_0000 | (words & 0xFF_FFFF)
}
