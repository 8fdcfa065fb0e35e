//! Discovery of NAND images stored in the raw sectors of the SD card.
//!
//! An EmuNAND sits in the unpartitioned space before the FAT partition. Two on-card
//! formats exist: RedNAND stores the NCSD header in the sector right after the image
//! start, Gateway stores it in the last sector of the image. Several slot layouts were
//! used over time, so each is checked in turn.

use ctr_firm::ConsoleModel;
use log::{debug, warn};
use zerocopy::{FromBytes, little_endian::U32};

use crate::context::{BootContext, NandTarget};

/// SD sector size.
pub const SECTOR_SIZE: usize = 0x200;

/// NCSD magic as found at offset 0x100 of a NAND header sector.
pub const NCSD_MAGIC: [u8; 4] = *b"NCSD";

/// Offset of the first-partition start LBA in the MBR.
const MBR_FAT_START: usize = 0x1C6;

/// Smallest image sizes (in sectors) rounded to the 4 MiB boundary, per model.
const ROUNDED_MINSIZE: [u32; 2] = [0x1D_8000, 0x26_E000];

/// Raw sector access to the SD card.
pub trait SectorReader {
    /// Size of the console's internal NAND in sectors.
    fn nand_sectors(&self) -> u32;

    /// Read one sector of the SD card into `buf`.
    fn read_sector(
        &mut self,
        sector: u32,
        buf: &mut [u8; SECTOR_SIZE],
    ) -> Result<(), SectorError>;
}

/// An SD sector could not be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("SD sector {sector:#x} unreadable")]
pub struct SectorError {
    /// Failing sector
    pub sector: u32,
}

/// Position of a located EmuNAND, in SD sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmuNandLocation {
    /// Slot actually found (the requested one, or 1 after a fallback)
    pub slot: u8,
    /// Sector added to every redirected NAND access
    pub redirect_offset: u32,
    /// Sector holding the NCSD header
    pub header_sector: u32,
}

/// Slot layouts, in probing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// Fixed 2 / 4 MiB-sector spacing
    Legacy,
    /// Internal NAND size rounded up to 4 MiB
    Default,
    /// Smallest image that holds a NAND of this model
    Minsize,
}

/// Find EmuNAND `slot`, falling back to slot 1.
///
/// Returns `None` when no EmuNAND exists at all; the caller boots SysNAND then.
pub fn locate(
    reader: &mut impl SectorReader,
    slot: u8,
    model: ConsoleModel,
) -> Option<EmuNandLocation> {
    let mut sector = [0u8; SECTOR_SIZE];
    if reader.read_sector(0, &mut sector).is_err() {
        warn!("cannot read the SD card MBR");
        return None;
    }
    let fat_start = read_u32(&sector, MBR_FAT_START);

    if let Some(found) = check_slot(reader, slot, model, fat_start) {
        debug!("EmuNAND slot {slot} at sector {:#x}", found.redirect_offset);
        return Some(found);
    }

    if slot != 1 {
        warn!("EmuNAND slot {slot} not found, trying slot 1");
        return locate(reader, 1, model);
    }

    warn!("no EmuNAND found");
    None
}

/// Locate the EmuNANDs `ctx` asks for, and settle `ctx.nand` and `ctx.firm_source` on the
/// ones that exist.
///
/// Returns the EmuNAND the firmware runs on, if any. When it is missing the console boots
/// SysNAND with the SysNAND FIRM; a missing EmuNAND FIRM source alone falls back to the
/// SysNAND FIRM.
pub fn settle(reader: &mut impl SectorReader, ctx: &mut BootContext) -> Option<EmuNandLocation> {
    match ctx.nand {
        NandTarget::EmuNand(slot) => {
            let location = locate(reader, slot, ctx.model);
            let found = location
                .map_or(NandTarget::SysNand, |found| NandTarget::EmuNand(found.slot));
            if location.is_none() || ctx.firm_source == ctx.nand {
                ctx.firm_source = found;
            }
            ctx.nand = found;
            location
        }
        NandTarget::SysNand => {
            if let NandTarget::EmuNand(slot) = ctx.firm_source {
                ctx.firm_source = locate(reader, slot, ctx.model)
                    .map_or(NandTarget::SysNand, |found| NandTarget::EmuNand(found.slot));
            }
            None
        }
    }
}

fn check_slot(
    reader: &mut impl SectorReader,
    slot: u8,
    model: ConsoleModel,
    fat_start: u32,
) -> Option<EmuNandLocation> {
    let nand_size = reader.nand_sectors();
    let minsize = ROUNDED_MINSIZE[model.index()];

    // Only the legacy layout is defined for slot 1; later slots try all three
    let layouts: &[Layout] = if slot == 1 {
        &[Layout::Legacy]
    } else {
        &[Layout::Legacy, Layout::Default, Layout::Minsize]
    };

    for &layout in layouts {
        let spacing = match layout {
            Layout::Legacy if slot == 1 => 0,
            Layout::Legacy if nand_size > 0x20_0000 => 0x40_0000,
            Layout::Legacy => 0x20_0000,
            Layout::Default => round_to_4mb(nand_size + 1),
            Layout::Minsize => minsize,
        };
        let offset = if slot == 1 {
            spacing
        } else {
            spacing * u32::from(slot - 1)
        };

        if fat_start < offset + minsize {
            continue;
        }

        // RedNAND
        if has_ncsd(reader, offset + 1) {
            return Some(EmuNandLocation {
                slot,
                redirect_offset: offset + 1,
                header_sector: offset + 1,
            });
        }

        // Gateway images are never laid out at minimum size
        if layout != Layout::Minsize && has_ncsd(reader, offset + nand_size) {
            return Some(EmuNandLocation {
                slot,
                redirect_offset: offset,
                header_sector: offset + nand_size,
            });
        }
    }

    None
}

fn has_ncsd(reader: &mut impl SectorReader, sector: u32) -> bool {
    let mut buf = [0u8; SECTOR_SIZE];
    reader.read_sector(sector, &mut buf).is_ok() && buf[0x100..0x104] == NCSD_MAGIC
}

/// Round a sector count up to the next 4 MiB boundary.
const fn round_to_4mb(sectors: u32) -> u32 {
    (sectors + 0x1FFF) & !0x1FFF
}

fn read_u32(sector: &[u8; SECTOR_SIZE], at: usize) -> u32 {
    U32::read_from_prefix(&sector[at..])
        .map(|(value, _)| value.get())
        .unwrap_or(0)
}
