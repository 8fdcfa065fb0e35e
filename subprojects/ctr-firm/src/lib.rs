//! # ctr-firm
//! Zero-copy parsing of the 3DS boot firmware container (FIRM) and the NCCH
//! headers embedded in its sections.
//!
//! This crate provides two layers:
//! - `raw`: Low-level binary structure definitions using `zerocopy`
//! - `read`: Validated views over a firmware buffer, read-only and mutable
//!
//! It also hosts the small platform enums shared by every boot stage
//! ([`FirmwareType`], [`ConsoleModel`]).
//!
//! # References
//! - [3dbrew FIRM](https://www.3dbrew.org/wiki/FIRM)
//! - [3dbrew NCCH](https://www.3dbrew.org/wiki/NCCH)
//! - [3dbrew NCCH/Extended Header](https://www.3dbrew.org/wiki/NCCH/Extended_Header)

#![cfg_attr(not(test), no_std)]

mod kind;
pub mod raw;
pub mod read;

pub use self::kind::{ConsoleModel, FirmwareType};
