//! # ctr-cpu
//!
//! Low-level primitives for the 3DS ARM946E-S core: cache maintenance and the final
//! non-returning branch into a loaded image.
//!
//! Everything here is only compiled for `target_arch = "arm"`; on other targets the crate
//! is empty so host builds of dependent crates keep working.

#![cfg_attr(not(test), no_std)]

#[cfg(target_arch = "arm")]
pub mod branch;
#[cfg(target_arch = "arm")]
pub mod cache;
