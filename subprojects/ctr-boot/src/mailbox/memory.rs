use alloc::{
    collections::{BTreeMap, VecDeque},
    vec::Vec,
};

use super::{Buttons, HardwareMailbox, map};
use crate::{arm11::Arm11Operation, context::LaunchArgs};

/// Operation posted to the ARM11 mailbox, with the parameter block at the time of posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arm11Request {
    /// Raw operation code
    pub operation: u32,
    /// First words of the parameter block
    pub parameters: [u32; 4],
}

/// In-memory stand-in for physical memory.
///
/// Memory is sparse and reads as zero until written. The ARM11 side of the mailbox is
/// simulated: every posted operation is logged and acknowledged immediately. Button
/// states queued with [`MemoryMailbox::queue_buttons`] are latched one per
/// [`HardwareMailbox::sleep_ms`] call.
#[derive(Debug, Default)]
pub struct MemoryMailbox {
    memory: BTreeMap<u32, u8>,
    copies: Vec<(u32, usize)>,
    arm11_requests: Vec<Arm11Request>,
    button_queue: VecDeque<Buttons>,
    flushes: usize,
    slept_ms: u64,
    jumped: Option<(u32, LaunchArgs)>,
}

impl MemoryMailbox {
    /// Idle Old console at cold boot: no buttons held, display off, ARM11 ready.
    pub fn new() -> Self {
        let mut hw = Self::default();
        hw.write_u32(map::HID_PAD, 0xFFF);
        hw.set_u8(map::PDN_GPU_CNT, 1);
        hw.write_u32(map::ARM11_OPERATION, Arm11Operation::Ready as u32);
        hw
    }

    /// Store one byte.
    pub fn set_u8(&mut self, addr: u32, value: u8) {
        self.memory.insert(addr, value);
    }

    /// Hold exactly `buttons`.
    pub fn set_buttons(&mut self, buttons: Buttons) {
        self.write_u32(map::HID_PAD, !buttons.bits() & 0xFFF);
    }

    /// Button states to latch on the following sleeps, in order.
    pub fn queue_buttons(&mut self, states: impl IntoIterator<Item = Buttons>) {
        self.button_queue.extend(states);
    }

    /// Read `len` bytes starting at `addr`.
    pub fn read_bytes(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len as u32).map(|i| self.read_u8(addr + i)).collect()
    }

    /// `(address, length)` of every [`HardwareMailbox::copy_to_physical`] call, in order.
    pub fn copies(&self) -> &[(u32, usize)] {
        &self.copies
    }

    /// Operations posted to the ARM11 core, in order.
    pub fn arm11_requests(&self) -> &[Arm11Request] {
        &self.arm11_requests
    }

    /// Number of cache flushes.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Total time spent sleeping.
    pub fn slept_ms(&self) -> u64 {
        self.slept_ms
    }

    /// Entrypoint and arguments of the final jump, once taken.
    pub fn jumped(&self) -> Option<(u32, LaunchArgs)> {
        self.jumped
    }
}

impl HardwareMailbox for MemoryMailbox {
    fn read_u8(&self, addr: u32) -> u8 {
        self.memory.get(&addr).copied().unwrap_or(0)
    }

    fn read_u32(&self, addr: u32) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_u8(addr + i as u32);
        }
        u32::from_le_bytes(bytes)
    }

    fn write_u32(&mut self, addr: u32, value: u32) {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.memory.insert(addr + i as u32, b);
        }

        if addr == map::ARM11_OPERATION && value != Arm11Operation::Ready as u32 {
            let mut parameters = [0u32; 4];
            for (i, word) in parameters.iter_mut().enumerate() {
                *word = self.read_u32(map::ARM11_PARAMETERS + 4 * i as u32);
            }
            self.arm11_requests.push(Arm11Request {
                operation: value,
                parameters,
            });

            // The simulated ARM11 finishes instantly
            self.write_u32(map::ARM11_OPERATION, Arm11Operation::Ready as u32);
        }
    }

    fn copy_to_physical(&mut self, addr: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.memory.insert(addr + i as u32, b);
        }
        self.copies.push((addr, bytes.len()));
    }

    fn flush_caches(&mut self) {
        self.flushes += 1;
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.slept_ms += u64::from(ms);
        if let Some(buttons) = self.button_queue.pop_front() {
            self.set_buttons(buttons);
        }
    }

    /// Record the jump and unwind.
    ///
    /// # Panics
    ///
    /// Always; host code observes the jump with `catch_unwind` and [`MemoryMailbox::jumped`].
    fn jump(&mut self, entry: u32, args: LaunchArgs) -> ! {
        self.jumped = Some((entry, args));
        panic!("jump to {entry:#010x}");
    }
}
