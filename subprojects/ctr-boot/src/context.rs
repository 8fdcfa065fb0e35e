//! Boot decision: which firmware to boot, from where, and how to protect the console.

use ctr_firm::{ConsoleModel, FirmwareType};
use log::info;

use crate::{
    config::Configuration,
    error::BootError,
    mailbox::{Buttons, HardwareMailbox},
};

/// How long the splash stays up on a cold boot.
pub const SPLASH_DELAY_MS: u32 = 3000;

/// Whether the OS asked for this boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootType {
    /// Power-on or MCU reboot
    ColdBoot,
    /// The running OS asked to launch another firmware title
    Relaunch,
}

/// Protection of the FIRM0/FIRM1 partitions the boot stage is installed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NandProtection {
    /// No write blocking
    Off,
    /// Block firmware writes because the boot stage lives in FIRM0/1
    ProtectPrimary,
    /// Recovery boot; always block firmware writes on SysNAND
    ForcedPrimary,
}

/// Splash screen handling of a cold boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Splash {
    /// Nothing to show
    Off,
    /// Show the splash and hold it for `delay_ms`
    Show {
        /// Time to keep the splash on screen
        delay_ms: u32,
    },
}

/// NAND the firmware will run from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NandTarget {
    /// The console's internal NAND
    SysNand,
    /// A NAND image on the SD card, slot 1..=4
    EmuNand(u8),
}

/// Arguments handed to the ARM9 entrypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchArgs {
    /// Cold boot
    None,
    /// The OS relaunched into the firmware with this title ID low word
    Relaunch {
        /// Low word of the launched title ID
        title_id_low: u32,
    },
}

impl LaunchArgs {
    /// `(r0, r1)` at the ARM9 entrypoint.
    pub fn registers(self) -> (u32, u32) {
        match self {
            Self::None => (0, 0),
            Self::Relaunch { title_id_low } => (1, title_id_low),
        }
    }
}

/// Everything the rest of the boot needs to know, decided once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootContext {
    pub boot_type: BootType,
    pub firm_type: FirmwareType,
    pub protection: NandProtection,
    pub model: ConsoleModel,
    pub splash: Splash,
    /// NAND the firmware runs on
    pub nand: NandTarget,
    /// NAND the firmware title is read from; differs from `nand` on R boots
    pub firm_source: NandTarget,
    pub launch_args: LaunchArgs,
    /// Keep the GBA boot screen when patching AGB_FIRM
    pub show_gba_boot: bool,
}

/// Raw inputs of [`decide`], as read from the mailbox and the configuration.
#[derive(Debug, Clone, Copy)]
pub struct BootInputs {
    /// Relaunch flag byte (zero on cold boot, ASCII digit otherwise)
    pub relaunch_flag: u8,
    /// AGB marker byte
    pub agb_marker: u8,
    /// Buttons held at boot
    pub buttons: Buttons,
    pub model: ConsoleModel,
    /// Whether the display was already powered up
    pub display_initialized: bool,
    pub config: Configuration,
}

/// Sample every boot input.
pub fn read_inputs(hw: &impl HardwareMailbox, config: Configuration) -> BootInputs {
    BootInputs {
        relaunch_flag: hw.relaunch_flag(),
        agb_marker: hw.agb_marker(),
        buttons: hw.pressed_buttons(),
        model: hw.console_model(),
        display_initialized: hw.display_initialized(),
        config,
    }
}

/// Decide how to boot.
///
/// A non-zero relaunch flag means the OS asked for a firmware: `'0'..='3'` select
/// NATIVE/TWL/AGB/SAFE_FIRM, and the AGB marker reading `'3'` selects AGB_FIRM regardless
/// of the flag. On a cold boot holding exactly [`Buttons::SAFE_MODE`] boots SAFE_FIRM from
/// SysNAND with forced write protection; any other cold boot is a NATIVE_FIRM boot.
pub fn decide(inputs: &BootInputs) -> Result<BootContext, BootError> {
    let config = inputs.config;
    let configured_protection = if config.a9lh() {
        NandProtection::ProtectPrimary
    } else {
        NandProtection::Off
    };

    let ctx = if inputs.relaunch_flag != 0 {
        let firm_type = if inputs.agb_marker == b'3' {
            FirmwareType::Agb
        } else {
            match inputs.relaunch_flag.wrapping_sub(b'0') {
                0 => FirmwareType::Native,
                1 => FirmwareType::Twl,
                2 => FirmwareType::Agb,
                3 => FirmwareType::Safe,
                _ => return Err(BootError::UnknownFirmwareType(inputs.relaunch_flag)),
            }
        };

        BootContext {
            boot_type: BootType::Relaunch,
            firm_type,
            protection: configured_protection,
            model: inputs.model,
            splash: Splash::Off,
            nand: config.last_nand(),
            firm_source: config.last_firm_source(),
            launch_args: LaunchArgs::Relaunch {
                title_id_low: firm_type.title_id_low(),
            },
            show_gba_boot: config.show_gba_boot(),
        }
    } else {
        let splash = if inputs.display_initialized || config.splash() != 0 {
            Splash::Show {
                delay_ms: SPLASH_DELAY_MS,
            }
        } else {
            Splash::Off
        };

        let safe_mode = inputs.buttons == Buttons::SAFE_MODE;
        let (firm_type, protection, (nand, firm_source)) = if safe_mode {
            (
                FirmwareType::Safe,
                NandProtection::ForcedPrimary,
                (NandTarget::SysNand, NandTarget::SysNand),
            )
        } else {
            (
                FirmwareType::Native,
                configured_protection,
                cold_boot_nands(inputs.buttons, config),
            )
        };

        BootContext {
            boot_type: BootType::ColdBoot,
            firm_type,
            protection,
            model: inputs.model,
            splash,
            nand,
            firm_source,
            launch_args: LaunchArgs::None,
            show_gba_boot: config.show_gba_boot(),
        }
    };

    info!(
        "boot: {:?} {:?} on {:?} with the {:?} FIRM ({:?}), protection {:?}",
        ctx.boot_type, ctx.firm_type, ctx.nand, ctx.firm_source, ctx.model, ctx.protection
    );
    Ok(ctx)
}

/// NAND to run and NAND to read the FIRM from, for a cold boot.
///
/// Holding R boots one NAND with the FIRM of the other: SysNAND with the EmuNAND FIRM, or
/// the reverse when use-SysNAND-FIRM is set on an A9LH install. Otherwise both are the
/// same NAND: SysNAND by default when autoboot-SysNAND is set, with L flipping the choice.
fn cold_boot_nands(buttons: Buttons, config: Configuration) -> (NandTarget, NandTarget) {
    let emunand = NandTarget::EmuNand(emunand_slot(buttons, config));

    if buttons.contains(Buttons::R) {
        if config.a9lh() && config.use_sys_firm() {
            (emunand, NandTarget::SysNand)
        } else {
            (NandTarget::SysNand, emunand)
        }
    } else if config.autoboot_sys() == buttons.contains(Buttons::L) {
        (emunand, emunand)
    } else {
        (NandTarget::SysNand, NandTarget::SysNand)
    }
}

/// EmuNAND slot of a held D-pad direction, or the configured default.
fn emunand_slot(buttons: Buttons, config: Configuration) -> u8 {
    let dpad = buttons & Buttons::DPAD;
    if dpad == Buttons::UP {
        1
    } else if dpad == Buttons::RIGHT {
        2
    } else if dpad == Buttons::DOWN {
        3
    } else if dpad == Buttons::LEFT {
        4
    } else {
        config.default_emunand_slot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(relaunch_flag: u8, agb_marker: u8, buttons: Buttons) -> BootInputs {
        BootInputs {
            relaunch_flag,
            agb_marker,
            buttons,
            model: ConsoleModel::Old,
            display_initialized: false,
            config: Configuration::new().with_autoboot_sys(true),
        }
    }

    fn decided(relaunch_flag: u8, agb_marker: u8, buttons: Buttons) -> BootContext {
        decide(&inputs(relaunch_flag, agb_marker, buttons)).unwrap()
    }

    #[test]
    fn safe_mode_combo_forces_safe_firm_on_sysnand() {
        let ctx = decided(0, 0, Buttons::SAFE_MODE);
        assert_eq!(ctx.boot_type, BootType::ColdBoot);
        assert_eq!(ctx.firm_type, FirmwareType::Safe);
        assert_eq!(ctx.protection, NandProtection::ForcedPrimary);
        assert_eq!(ctx.nand, NandTarget::SysNand);
        assert_eq!(ctx.launch_args, LaunchArgs::None);
    }

    #[test]
    fn safe_mode_requires_exact_combo() {
        let ctx = decided(0, 0, Buttons::SAFE_MODE | Buttons::B);
        assert_eq!(ctx.firm_type, FirmwareType::Native);
    }

    #[test]
    fn relaunch_flag_selects_firmware() {
        let native = decided(b'0', 0, Buttons::empty());
        assert_eq!(native.boot_type, BootType::Relaunch);
        assert_eq!(native.firm_type, FirmwareType::Native);
        assert_eq!(
            native.launch_args,
            LaunchArgs::Relaunch {
                title_id_low: 0x0000_0002
            }
        );

        assert_eq!(decided(b'1', 0, Buttons::empty()).firm_type, FirmwareType::Twl);
        assert_eq!(decided(b'2', b'3', Buttons::empty()).firm_type, FirmwareType::Agb);
        assert_eq!(decided(b'3', b'0', Buttons::empty()).firm_type, FirmwareType::Safe);
    }

    #[test]
    fn agb_marker_wins_over_flag() {
        let ctx = decided(b'3', b'3', Buttons::empty());
        assert_eq!(ctx.firm_type, FirmwareType::Agb);
        assert_eq!(
            ctx.launch_args,
            LaunchArgs::Relaunch {
                title_id_low: 0x0000_0202
            }
        );
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        for flag in [b'4', b'9', b'A', 0x01, 0xFF] {
            assert!(matches!(
                decide(&inputs(flag, 0, Buttons::empty())),
                Err(BootError::UnknownFirmwareType(f)) if f == flag
            ));
        }
    }

    #[test]
    fn relaunch_ignores_buttons_and_splash() {
        let mut relaunch = inputs(b'0', 0, Buttons::SAFE_MODE);
        relaunch.display_initialized = true;
        let ctx = decide(&relaunch).unwrap();
        assert_eq!(ctx.firm_type, FirmwareType::Native);
        assert_eq!(ctx.splash, Splash::Off);
    }

    #[test]
    fn protection_follows_a9lh_option() {
        let mut cold = inputs(0, 0, Buttons::empty());
        assert_eq!(decide(&cold).unwrap().protection, NandProtection::Off);

        cold.config = cold.config.with_a9lh(true);
        assert_eq!(decide(&cold).unwrap().protection, NandProtection::ProtectPrimary);

        let mut relaunch = inputs(b'1', 0, Buttons::empty());
        relaunch.config = relaunch.config.with_a9lh(true);
        assert_eq!(decide(&relaunch).unwrap().protection, NandProtection::ProtectPrimary);
    }

    #[test]
    fn splash_on_cold_boot_only_when_requested() {
        let mut cold = inputs(0, 0, Buttons::empty());
        assert_eq!(decide(&cold).unwrap().splash, Splash::Off);

        cold.display_initialized = true;
        assert_eq!(
            decide(&cold).unwrap().splash,
            Splash::Show {
                delay_ms: SPLASH_DELAY_MS
            }
        );

        cold.display_initialized = false;
        cold.config = cold.config.with_splash(1);
        assert!(matches!(decide(&cold).unwrap().splash, Splash::Show { .. }));
    }

    #[test]
    fn l_and_dpad_select_emunand_slot() {
        assert_eq!(decided(0, 0, Buttons::empty()).nand, NandTarget::SysNand);
        assert_eq!(decided(0, 0, Buttons::L).nand, NandTarget::EmuNand(1));
        assert_eq!(decided(0, 0, Buttons::L | Buttons::RIGHT).nand, NandTarget::EmuNand(2));
        assert_eq!(decided(0, 0, Buttons::L | Buttons::DOWN).nand, NandTarget::EmuNand(3));
        assert_eq!(decided(0, 0, Buttons::L | Buttons::LEFT).nand, NandTarget::EmuNand(4));
        // Two directions at once fall back to the configured slot
        assert_eq!(
            decided(0, 0, Buttons::L | Buttons::LEFT | Buttons::UP).nand,
            NandTarget::EmuNand(1)
        );
    }

    #[test]
    fn emunand_is_default_without_autoboot_sys() {
        let mut cold = inputs(0, 0, Buttons::empty());
        cold.config = Configuration::new().with_use_second_emu(true);
        assert_eq!(decide(&cold).unwrap().nand, NandTarget::EmuNand(2));

        cold.buttons = Buttons::L;
        assert_eq!(decide(&cold).unwrap().nand, NandTarget::SysNand);
    }

    #[test]
    fn relaunch_repeats_last_nand() {
        let mut relaunch = inputs(b'0', 0, Buttons::empty());
        relaunch.config = relaunch.config.with_boot_nand(3);
        assert_eq!(decide(&relaunch).unwrap().nand, NandTarget::EmuNand(3));
    }

    #[test]
    fn launch_args_registers() {
        assert_eq!(LaunchArgs::None.registers(), (0, 0));
        assert_eq!(
            LaunchArgs::Relaunch { title_id_low: 0x102 }.registers(),
            (1, 0x102)
        );
    }

    #[test]
    fn r_boots_sysnand_with_emunand_firm() {
        let ctx = decided(0, 0, Buttons::R | Buttons::DOWN);
        assert_eq!(ctx.nand, NandTarget::SysNand);
        assert_eq!(ctx.firm_source, NandTarget::EmuNand(3));

        // L does not matter once R is held
        let ctx = decided(0, 0, Buttons::R | Buttons::L);
        assert_eq!(ctx.nand, NandTarget::SysNand);
        assert_eq!(ctx.firm_source, NandTarget::EmuNand(1));
    }

    #[test]
    fn r_boots_emunand_with_sysnand_firm_when_configured() {
        let mut cold = inputs(0, 0, Buttons::R);
        cold.config = cold.config.with_use_sys_firm(true);
        // Only honoured on A9LH installs
        assert_eq!(decide(&cold).unwrap().nand, NandTarget::SysNand);

        cold.config = cold.config.with_a9lh(true);
        let ctx = decide(&cold).unwrap();
        assert_eq!(ctx.nand, NandTarget::EmuNand(1));
        assert_eq!(ctx.firm_source, NandTarget::SysNand);
    }

    #[test]
    fn firm_source_follows_nand_without_r() {
        let ctx = decided(0, 0, Buttons::L | Buttons::RIGHT);
        assert_eq!(ctx.firm_source, ctx.nand);
        assert_eq!(decided(0, 0, Buttons::SAFE_MODE).firm_source, NandTarget::SysNand);

        let mut relaunch = inputs(b'0', 0, Buttons::empty());
        relaunch.config = relaunch.config.with_boot_nand(0).with_boot_firm(2);
        let ctx = decide(&relaunch).unwrap();
        assert_eq!(ctx.nand, NandTarget::SysNand);
        assert_eq!(ctx.firm_source, NandTarget::EmuNand(2));
    }
}
