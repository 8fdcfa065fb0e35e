//! Raw binary structure definitions for the boot firmware formats.
//!
//! This module contains zero-copy struct definitions using the `zerocopy` crate.
//! All structures are defined with `#[repr(C)]`, use unaligned little-endian
//! integers and match the on-media layout byte for byte.
//!
//! Use these types when you need direct access to binary fields without parsing overhead.
//! For validated access, see the `read` module.

pub mod firm;
pub mod ncch;
