use core::ptr;

use super::HardwareMailbox;
use crate::context::LaunchArgs;

/// ARM9 timer tick rate (the 67 MHz bus clock, prescaler 1).
const TICKS_PER_SEC: u64 = 67_027_964;

const TIMER_BASE: u32 = 0x1000_3000;

const fn timer_val(i: u32) -> u32 {
    TIMER_BASE + 4 * i
}

const fn timer_cnt(i: u32) -> u32 {
    TIMER_BASE + 2 + 4 * i
}

/// [`HardwareMailbox`] over the ARM9 physical address space.
///
/// Only one instance may exist, and only while the boot stage owns the whole machine.
pub struct PhysicalMailbox {
    _private: (),
}

impl PhysicalMailbox {
    /// Take ownership of the physical address space.
    ///
    /// # Safety
    ///
    /// Must run on the ARM9 core with the MPU mapping every cell in
    /// [`map`](super::map), and at most one instance may be alive at a time.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }

    fn write_u16(&mut self, addr: u32, value: u16) {
        // SAFETY: Timer registers are always mapped on the ARM9 side.
        unsafe { ptr::write_volatile(addr as *mut u16, value) }
    }

    fn read_u16(&self, addr: u32) -> u16 {
        // SAFETY: Timer registers are always mapped on the ARM9 side.
        unsafe { ptr::read_volatile(addr as *const u16) }
    }

    /// Read the 64-bit tick count of the cascaded timers 0..4.
    fn ticks(&self) -> u64 {
        (0..4).fold(0, |acc, i| acc | u64::from(self.read_u16(timer_val(i))) << (16 * i))
    }
}

impl HardwareMailbox for PhysicalMailbox {
    fn read_u8(&self, addr: u32) -> u8 {
        // SAFETY: Guaranteed mapped by the contract of `PhysicalMailbox::new`.
        unsafe { ptr::read_volatile(addr as *const u8) }
    }

    fn read_u32(&self, addr: u32) -> u32 {
        // SAFETY: Guaranteed mapped by the contract of `PhysicalMailbox::new`.
        unsafe { ptr::read_volatile(addr as *const u32) }
    }

    fn write_u32(&mut self, addr: u32, value: u32) {
        // SAFETY: Guaranteed mapped by the contract of `PhysicalMailbox::new`.
        unsafe { ptr::write_volatile(addr as *mut u32, value) }
    }

    fn copy_to_physical(&mut self, addr: u32, bytes: &[u8]) {
        // SAFETY: Section destinations are physical RAM the firmware is about to own; the
        // source is the container buffer, which never overlaps them.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), addr as *mut u8, bytes.len()) }
    }

    fn flush_caches(&mut self) {
        // SAFETY: Cache maintenance has no memory-safety preconditions on the ARM9.
        unsafe { ctr_cpu::cache::flush_all() }
    }

    fn sleep_ms(&mut self, ms: u32) {
        // Timer 0 counts at the bus clock, timers 1..4 count up on overflow of the previous one
        self.write_u16(timer_cnt(0), 0);
        for i in 1..4 {
            self.write_u16(timer_cnt(i), 0x4);
        }
        for i in 0..4 {
            self.write_u16(timer_val(i), 0);
        }
        self.write_u16(timer_cnt(0), 0x80);
        for i in 1..4 {
            self.write_u16(timer_cnt(i), 0x84);
        }

        let target = u64::from(ms) * TICKS_PER_SEC / 1000;
        let start = self.ticks();
        while self.ticks().wrapping_sub(start) < target {
            core::hint::spin_loop();
        }

        for i in 0..4 {
            let cnt = self.read_u16(timer_cnt(i));
            self.write_u16(timer_cnt(i), cnt & !0x80);
        }
    }

    fn jump(&mut self, entry: u32, args: LaunchArgs) -> ! {
        let (r0, r1) = args.registers();
        // SAFETY: The chainloader copied every section and flushed the caches before
        // handing over the entrypoint.
        unsafe { ctr_cpu::branch::branch_to(entry, r0, r1) }
    }
}
