//! # ctr-panic-handler
//!
//! Fail-stop panic handler for the bare-metal ARM9 boot stage.
//!
//! There is nothing to return to once the boot stage panics: no OS and no debugger
//! service. The handler formats the message using Rust's standard "panicked at" format
//! into a 512-byte static buffer, where a JTAG debugger or a memory dump can find it, and
//! then parks the core.
//!
//! The handler is only registered when building for a target without an OS
//! (`target_os = "none"`); host builds use the standard library's handler.

#![cfg_attr(not(test), no_std)]

#[cfg(target_os = "none")]
use core::{fmt::Write as _, panic::PanicInfo};

/// Maximum size for panic message buffer
#[cfg(target_os = "none")]
const MSG_BUFFER_SIZE: usize = 512;

/// Panic handler that records the message and halts.
#[cfg(target_os = "none")]
#[panic_handler]
pub fn panic_handler(info: &PanicInfo) -> ! {
    /// Formatted panic message, NUL padded
    #[unsafe(no_mangle)]
    static mut CTR_PANIC_MESSAGE: [u8; MSG_BUFFER_SIZE] = [0; MSG_BUFFER_SIZE];

    // SAFETY: The core is single-threaded at this point and never leaves this function,
    // so nothing else can observe the buffer while it is being written.
    let buf = unsafe {
        let raw_ptr = &raw mut CTR_PANIC_MESSAGE;
        core::slice::from_raw_parts_mut(raw_ptr as *mut u8, MSG_BUFFER_SIZE)
    };

    let mut cursor = Cursor::new(buf);
    let _ = write!(cursor, "{}", info);

    halt()
}

/// Park the core forever.
#[cfg(target_os = "none")]
fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

/// A cursor implementation for writing to a byte buffer in no_std environments.
///
/// Output past the end of the buffer is silently truncated.
#[cfg(any(target_os = "none", test))]
struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

#[cfg(any(target_os = "none", test))]
impl<'a> Cursor<'a> {
    /// Creates a new cursor wrapping the provided buffer.
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

#[cfg(any(target_os = "none", test))]
impl core::fmt::Write for Cursor<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buf.len().saturating_sub(self.pos);
        let to_write = bytes.len().min(remaining);

        if to_write > 0 {
            self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
        }

        Ok(())
    }
}
