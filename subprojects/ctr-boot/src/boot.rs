//! Boot orchestration and the fatal error path.

use core::convert::Infallible;

use ctr_firm::read::{Firm, FirmMut};
use log::{error, info, warn};

use crate::{
    chainload, config,
    context::{self, Splash},
    emunand::{self, SectorReader},
    error::BootError,
    load,
    mailbox::HardwareMailbox,
    policy::{self, PatchInputs, Payloads},
    services::{Crypto, ErrorScreen, Power, Storage},
};

/// Button polling interval while an error is on screen.
const ERROR_POLL_MS: u32 = 10;

/// Platform collaborators of a boot.
pub struct Platform<S, C, R, D, P> {
    pub storage: S,
    pub crypto: C,
    /// Raw SD sectors, for EmuNAND discovery
    pub sd_card: R,
    pub screen: D,
    pub power: P,
}

/// Boot the console. Ends in the patched firmware, or with the console powered off after
/// an error was shown.
///
/// `buf` receives the firmware image and must hold [`load::FIRM_BUFFER_SIZE`] bytes.
pub fn run<S, C, R, D, P>(
    hw: &mut impl HardwareMailbox,
    platform: &mut Platform<S, C, R, D, P>,
    payloads: &Payloads<'_>,
    buf: &mut [u8],
) -> !
where
    S: Storage,
    C: Crypto,
    R: SectorReader,
    D: ErrorScreen,
    P: Power,
{
    let Err(err) = boot(hw, platform, payloads, buf);
    fatal(&mut platform.screen, hw, &mut platform.power, &err)
}

fn boot<S, C, R, D, P>(
    hw: &mut impl HardwareMailbox,
    platform: &mut Platform<S, C, R, D, P>,
    payloads: &Payloads<'_>,
    buf: &mut [u8],
) -> Result<Infallible, BootError>
where
    S: Storage,
    C: Crypto,
    R: SectorReader,
    D: ErrorScreen,
    P: Power,
{
    let (config, state) = config::load(&mut platform.storage);
    let mut ctx = context::decide(&context::read_inputs(hw, config))?;

    if let Splash::Show { delay_ms } = ctx.splash {
        platform.screen.show_splash();
        hw.sleep_ms(delay_ms);
    }

    let location = emunand::settle(&mut platform.sd_card, &mut ctx);

    let loaded = load::load(
        &mut platform.storage,
        &mut platform.crypto,
        buf,
        &ctx,
        config.load_external_firm(),
    )?;

    if let Err(err) = config::record_boot(&mut platform.storage, config, state, &ctx) {
        warn!("could not record boot options: {err}");
    }

    let inputs = PatchInputs {
        payloads: *payloads,
        emunand: location,
        firm_version: loaded.version,
        config,
        dev_unit: hw.is_dev_unit(),
    };
    let mut firm = FirmMut::try_from_bytes(buf)?;
    let outcome = policy::patch(&mut firm, &ctx, &inputs)?;

    if let (Some(section0), Some(slot)) = (outcome.section0, firm.section(0)) {
        chainload::place_section0(hw, slot.address, &section0);
    }

    let firm = Firm::try_from_bytes(buf)?;
    info!("boot prepared");
    chainload::launch(&firm, &ctx, hw)
}

/// Show `err`, wait for a fresh button press and power off.
pub fn fatal(
    screen: &mut impl ErrorScreen,
    hw: &mut impl HardwareMailbox,
    power: &mut impl Power,
    err: &BootError,
) -> ! {
    error!("boot failed: {err}");
    screen.show_error(err);

    // A button still held from boot must not dismiss the message
    while !hw.pressed_buttons().is_empty() {
        hw.sleep_ms(ERROR_POLL_MS);
    }
    while hw.pressed_buttons().is_empty() {
        hw.sleep_ms(ERROR_POLL_MS);
    }

    power.power_off()
}
