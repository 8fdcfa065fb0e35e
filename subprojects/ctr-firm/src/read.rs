//! Validated views over firmware buffers.
//!
//! Each parser validates magic numbers and bounds up front so the accessors
//! never index outside the underlying buffer.

mod firm;
mod ncch;

pub use self::{
    firm::{Firm, FirmMut, FromBytesError as FirmFromBytesError, Section},
    ncch::{FromBytesError as NcchFromBytesError, Ncch},
};
