//! Host doubles for the platform collaborators, and a FIRM image builder.

use std::{collections::BTreeMap, fmt::Display};

use ctr_firm::{
    ConsoleModel, FirmwareType,
    raw::firm::{FIRM_MAGIC, FirmHeader},
    read::Section,
};
use zerocopy::{FromZeros, IntoBytes, little_endian::U32};

use crate::{
    context::NandTarget,
    services::{Crypto, CryptoError, ErrorScreen, NandFirm, Power, Storage, StorageError},
};

#[derive(Debug, Default)]
pub struct FakeStorage {
    pub files: BTreeMap<String, Vec<u8>>,
    /// NANDs firmware titles were read from, in order
    pub nand_reads: Vec<NandTarget>,
    nand: Vec<(NandTarget, FirmwareType, Vec<u8>, u32)>,
}

impl FakeStorage {
    pub fn with_file(mut self, path: &str, data: Vec<u8>) -> Self {
        self.files.insert(path.into(), data);
        self
    }

    pub fn with_nand(self, firm_type: FirmwareType, image: Vec<u8>, version: u32) -> Self {
        self.with_nand_on(NandTarget::SysNand, firm_type, image, version)
    }

    pub fn with_nand_on(
        mut self,
        nand: NandTarget,
        firm_type: FirmwareType,
        image: Vec<u8>,
        version: u32,
    ) -> Self {
        self.nand.push((nand, firm_type, image, version));
        self
    }
}

impl Storage for FakeStorage {
    fn read_file(&mut self, path: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.files.get(path).ok_or(StorageError::NotFound)?;
        copy_into(data, buf)
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        self.files.insert(path.into(), data.to_vec());
        Ok(())
    }

    fn read_nand_firm(
        &mut self,
        nand: NandTarget,
        firm_type: FirmwareType,
        buf: &mut [u8],
    ) -> Result<NandFirm, StorageError> {
        self.nand_reads.push(nand);
        let (.., image, version) = self
            .nand
            .iter()
            .find(|(target, kind, ..)| *target == nand && *kind == firm_type)
            .ok_or(StorageError::NotFound)?;
        let size = copy_into(image, buf)?;
        Ok(NandFirm {
            size,
            version: *version,
        })
    }
}

fn copy_into(data: &[u8], buf: &mut [u8]) -> Result<usize, StorageError> {
    if data.len() > buf.len() {
        return Err(StorageError::TooLarge {
            size: data.len(),
            capacity: buf.len(),
        });
    }
    buf[..data.len()].copy_from_slice(data);
    Ok(data.len())
}

/// Accepts everything; the "encrypted" images are already plaintext.
#[derive(Debug, Default)]
pub struct FakeCrypto {
    pub exefs_decryptions: usize,
    pub arm9_decryptions: usize,
    pub verified: Vec<usize>,
    pub bad_section: Option<usize>,
}

impl Crypto for FakeCrypto {
    fn decrypt_exefs(&mut self, _buf: &mut [u8]) -> Result<(), CryptoError> {
        self.exefs_decryptions += 1;
        Ok(())
    }

    fn verify_section(&mut self, section: &Section, _data: &[u8]) -> Result<(), CryptoError> {
        if self.bad_section == Some(section.index) {
            return Err(CryptoError::SectionHash {
                index: section.index,
            });
        }
        self.verified.push(section.index);
        Ok(())
    }

    fn decrypt_arm9_bin(
        &mut self,
        _arm9: &mut [u8],
        _model: ConsoleModel,
    ) -> Result<(), CryptoError> {
        self.arm9_decryptions += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeScreen {
    pub errors: Vec<String>,
    pub splashes: usize,
}

impl ErrorScreen for FakeScreen {
    fn show_error(&mut self, message: &dyn Display) {
        self.errors.push(message.to_string());
    }

    fn show_splash(&mut self) {
        self.splashes += 1;
    }
}

/// Unwinds instead of powering off.
#[derive(Debug, Default)]
pub struct FakePower;

impl Power for FakePower {
    fn power_off(&mut self) -> ! {
        panic!("power off");
    }
}

/// Lays sections out back to back after the header, in slot order.
#[derive(Debug, Default)]
pub struct FirmBuilder {
    sections: Vec<(u32, Vec<u8>)>,
}

impl FirmBuilder {
    pub const ARM11_ENTRY: u32 = 0x1FF8_0000;
    pub const ARM9_ENTRY: u32 = 0x0801_B01C - 0x1000;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(mut self, address: u32, data: Vec<u8>) -> Self {
        self.sections.push((address, data));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut header = FirmHeader::new_zeroed();
        header.magic = FIRM_MAGIC;
        header.arm11_entry = U32::new(Self::ARM11_ENTRY);
        header.arm9_entry = U32::new(Self::ARM9_ENTRY);

        let mut body = Vec::new();
        for (slot, (address, data)) in header.sections.iter_mut().zip(&self.sections) {
            slot.offset = U32::new((0x200 + body.len()) as u32);
            slot.address = U32::new(*address);
            slot.size = U32::new(data.len() as u32);
            body.extend_from_slice(data);
        }

        let mut image = header.as_bytes().to_vec();
        image.extend(body);
        image
    }
}
