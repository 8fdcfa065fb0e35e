//! # ctr-patch
//! Byte-level patching primitives for firmware images.
//!
//! - [`find`]: Boyer–Moore–Horspool search returning the lowest match offset
//! - [`apply`] / [`PatchRule`]: search-and-overwrite with a signed offset from the match
//! - [`LegacyPatchEntry`]: fixed-offset patches selected by console model
//! - [`splice_at`]: replace a byte range of an owned image with a buffer of another size
//!
//! Every write is bounds checked against the target slice and reported as an error
//! instead of panicking.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bytes;
mod legacy;
mod pattern;
mod rule;
mod splice;

pub use self::{
    bytes::WriteOutOfBounds,
    legacy::{LegacyPatchEntry, LegacyPayload, apply_table},
    pattern::{ShiftTable, find, find_from},
    rule::{PatchError, PatchRule, apply},
    splice::{SpliceError, splice_at},
};
