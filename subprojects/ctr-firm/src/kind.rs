/// The four firmware titles the bootloader knows how to patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareType {
    /// NATIVE_FIRM, the regular 3DS operating system firmware
    Native,
    /// TWL_FIRM, DSi/DS backwards compatibility
    Twl,
    /// AGB_FIRM, GBA backwards compatibility
    Agb,
    /// SAFE_FIRM, the recovery firmware used for system updates
    Safe,
}

impl FirmwareType {
    /// Low word of the firmware's title ID (`0004013800000002` and friends).
    pub const fn title_id_low(self) -> u32 {
        match self {
            Self::Native => 0x0000_0002,
            Self::Twl => 0x0000_0102,
            Self::Agb => 0x0000_0202,
            Self::Safe => 0x0000_0003,
        }
    }

    /// TWL and AGB use fixed-offset patch tables instead of pattern searches.
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::Twl | Self::Agb)
    }

    /// Index of the section that carries the ARM9 binary.
    pub const fn arm9_section(self) -> usize {
        if self.is_legacy() { 3 } else { 2 }
    }

    /// Path of the plaintext replacement firmware on the SD card.
    pub const fn sd_path(self) -> &'static str {
        match self {
            Self::Native => "/ctrboot/firmware.bin",
            Self::Twl => "/ctrboot/firmware_twl.bin",
            Self::Agb => "/ctrboot/firmware_agb.bin",
            Self::Safe => "/ctrboot/firmware_safe.bin",
        }
    }
}

/// Hardware revision of the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleModel {
    /// Original 3DS / 2DS
    Old,
    /// New 3DS / New 2DS
    New,
}

impl ConsoleModel {
    /// Column to use in per-model offset tables.
    pub const fn index(self) -> usize {
        match self {
            Self::Old => 0,
            Self::New => 1,
        }
    }

    /// Bits 8..16 of the ARM9 section load address of firmwares built for this model.
    pub const fn arm9_address_marker(self) -> u8 {
        match self {
            Self::Old => 0x68,
            Self::New => 0x60,
        }
    }
}
