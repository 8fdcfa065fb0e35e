//! NATIVE_FIRM patch set.
//!
//! Applied in a fixed order, since later steps search code that earlier steps may have
//! touched:
//! 1. NAND write block (only when the primary NAND is protected)
//! 2. signature check bypass
//! 3. EmuNAND redirection (only when an EmuNAND was located)
//! 4. firmlaunch reboot hook
//! 5. title-install minimum version check (optional target, recent versions only)
//! 6. UNITINFO swap (only with the UNITINFO development option)
//! 7. Process9 service access checks (only with `patch_access`)
//! 8. backdoor SVC, when the kernel lacks one
//! 9. `svcGetCFWInfo`
//! 10. kernel SVC and builtin module access checks (only with `patch_access`)
//! 11. `loader` sysmodule replacement in section 0

use alloc::vec::Vec;

use ctr_firm::{ConsoleModel, read::{FirmMut, Ncch}};
use ctr_patch::{
    PatchError, PatchRule, find, splice_at,
    bytes::{read_u32, write_bytes, write_u32},
};
use log::{debug, info};

use crate::{
    context::{BootContext, NandProtection},
    policy::{
        PatchInputs, PatchOutcome, UNIT_INFO_DEV_OPTIONS, cfw_info, emunand,
        kernel11::{self, FreeSpace},
        process9, swap_unit_info,
    },
};

/// Section slots of NATIVE_FIRM.
const SYSMODULES: usize = 0;
const ARM11: usize = 1;
const ARM9: usize = 2;

/// Name of the "exe:" service, which sits right after the write check.
const EXE_SERVICE: &[u8] = b"exe:";
/// `cmp r0, #0; bgt` guarding NAND writes
const WRITE_CHECK: &[u8] = &[0x00, 0x28, 0x01, 0xDA];
/// `movs r0, #0; nop`
const WRITE_CHECK_BYPASS: &[u8] = &[0x00, 0x20, 0xC0, 0x46];
/// The write check precedes the service name by at most this much.
const WRITE_CHECK_WINDOW: usize = 0x100;

const SIGNATURE_RULES: [PatchRule; 2] = [
    PatchRule::new("signature check", &[0xC0, 0x1C, 0x76, 0xE7], 0, &[0x00, 0x20]),
    PatchRule::new(
        "header signature check",
        &[0xB5, 0x22, 0x4D, 0x0C],
        -2,
        &[0x00, 0x20, 0x70, 0x47],
    ),
];

const REBOOT_PATTERN: &[u8] = &[0xE2, 0x20, 0x20, 0x90];
const REBOOT_HOOK_BACKTRACK: usize = 0x13;
const REBOOT_OPEN_PLACEHOLDER: &[u8] = b"OPEN";

const MIN_VERSION_RULE: PatchRule =
    PatchRule::new("title install minimum version", &[0x0A, 0x81, 0x42, 0x02], 4, &[0xE0]);

/// Process9's check of a process' service access list; the function starts 14 bytes
/// ahead.
const P9_ACCESS_RULE: PatchRule = PatchRule::new(
    "Process9 access checks",
    &[0xE0, 0x00, 0x40, 0x39, 0x08, 0x58],
    -14,
    // movs r0, #1; bx lr
    &[0x01, 0x20, 0x70, 0x47],
);

const LOADER_TITLE: &[u8] = b"loader";

/// First version whose title-install check has the searched shape.
const fn min_version_threshold(model: ConsoleModel) -> u32 {
    match model {
        ConsoleModel::Old => 0x52,
        ConsoleModel::New => 0x21,
    }
}

pub(super) fn patch(
    firm: &mut FirmMut<'_>,
    ctx: &BootContext,
    inputs: &PatchInputs<'_>,
) -> Result<PatchOutcome, PatchError> {
    let arm9_address = firm
        .section(ARM9)
        .map(|section| section.address)
        .ok_or(PatchError::TargetMissing {
            target: "ARM9 section",
        })?;
    let arm9 = firm.section_data_mut(ARM9).ok_or(PatchError::TargetMissing {
        target: "ARM9 section",
    })?;

    let p9 = process9::locate(arm9)?;
    // The SDMMC literal must be read before any patch rewrites the code around it
    let sdmmc = match inputs.emunand {
        Some(_) => Some(emunand::find_sdmmc(&arm9[p9.range()])?),
        None => None,
    };

    if ctx.protection != NandProtection::Off {
        block_nand_writes(&mut arm9[p9.range()])?;
    }

    for rule in &SIGNATURE_RULES {
        rule.apply_required(&mut arm9[p9.range()])?;
    }

    if let (Some(location), Some(sdmmc)) = (inputs.emunand, sdmmc) {
        emunand::patch(
            arm9,
            arm9_address,
            p9.range(),
            inputs.payloads.emunand,
            &location,
            sdmmc,
        )?;
    }

    install_reboot_hook(&mut arm9[p9.range()], p9.address, inputs.payloads.reboot)?;

    if inputs.version_at_least(min_version_threshold(ctx.model)) {
        MIN_VERSION_RULE.apply(&mut arm9[p9.range()])?;
    }

    if inputs.config.dev_options() == UNIT_INFO_DEV_OPTIONS {
        swap_unit_info(arm9, inputs.dev_unit)?;
    }

    let patch_access = inputs.config.patch_access();
    if patch_access {
        P9_ACCESS_RULE.apply_required(&mut arm9[p9.range()])?;
    }

    let arm11 = firm.section_data_mut(ARM11).ok_or(PatchError::TargetMissing {
        target: "ARM11 section",
    })?;
    let kernel = kernel11::locate(arm11)?;
    let mut free = FreeSpace::locate(arm11, &kernel)?;
    kernel11::install_backdoor(arm11, &kernel, &mut free)?;
    cfw_info::install(
        arm11,
        &kernel,
        &mut free,
        inputs.payloads.svc_cfw_info,
        inputs.config,
    )?;

    if patch_access {
        kernel11::grant_svc_access(arm11, &kernel)?;
        kernel11::hook_module_loads(arm11, &mut free, inputs.payloads.k11_modules)?;
    }

    let sysmodules = firm
        .section_data_mut(SYSMODULES)
        .ok_or(PatchError::TargetMissing {
            target: "sysmodule section",
        })?;
    let section0 = replace_loader(sysmodules, inputs.payloads.injector)?;

    info!("NATIVE_FIRM patched");
    Ok(PatchOutcome {
        section0: Some(section0),
    })
}

/// Make the NAND write check fail for every caller.
pub(super) fn block_nand_writes(code: &mut [u8]) -> Result<(), PatchError> {
    const TARGET: &str = "NAND write check";

    let service = find(code, EXE_SERVICE).ok_or(PatchError::TargetMissing { target: TARGET })?;
    let window_start = service.saturating_sub(WRITE_CHECK_WINDOW);
    let check = find(&code[window_start..service], WRITE_CHECK)
        .map(|at| window_start + at)
        .ok_or(PatchError::TargetMissing { target: TARGET })?;

    write_bytes(code, check, WRITE_CHECK_BYPASS).map_err(|err| err.in_target(TARGET))?;
    debug!("{TARGET}: blocked at {check:#x}");
    Ok(())
}

/// Copy the reboot payload over the firmlaunch routine and point its "OPEN" placeholder at
/// Process9's file-open function.
fn install_reboot_hook(
    process9: &mut [u8],
    address: u32,
    payload: &[u8],
) -> Result<(), PatchError> {
    const TARGET: &str = "firmlaunch reboot hook";

    let hook = find(process9, REBOOT_PATTERN)
        .and_then(|at| at.checked_sub(REBOOT_HOOK_BACKTRACK))
        .ok_or(PatchError::TargetMissing { target: TARGET })?;

    // The hook starts with a BLX to the file-open function; resolve it before the payload
    // overwrites it.
    let branch = read_u32(process9, hook).ok_or(PatchError::TargetMissing { target: TARGET })?;
    let fopen = (hook as u32 + 9)
        .wrapping_sub(0u32.wrapping_sub((branch & 0xFF_FFFF) << 2) & 0x3FF_FFFC)
        .wrapping_add(address);

    write_bytes(process9, hook, payload).map_err(|err| err.in_target(TARGET))?;
    let placeholder = find(&process9[hook..hook + payload.len()], REBOOT_OPEN_PLACEHOLDER)
        .map(|at| hook + at)
        .ok_or(PatchError::TargetMissing {
            target: "reboot OPEN placeholder",
        })?;
    write_u32(process9, placeholder, fopen).map_err(|err| err.in_target(TARGET))?;

    debug!("{TARGET}: hook at {hook:#x}, fopen at {fopen:#x}");
    Ok(())
}

/// Rebuild section 0 with the `loader` module replaced by `injector`.
fn replace_loader(sysmodules: &[u8], injector: &[u8]) -> Result<Vec<u8>, PatchError> {
    const TARGET: &str = "loader module";
    let malformed = |reason| PatchError::Malformed {
        target: TARGET,
        reason,
    };

    let mut at = 0;
    let (start, size) = loop {
        if at >= sysmodules.len() {
            return Err(PatchError::TargetMissing { target: TARGET });
        }
        let module =
            Ncch::try_from_bytes(&sysmodules[at..]).map_err(|_| malformed("not an NCCH"))?;
        let size = module
            .content_size()
            .ok_or_else(|| malformed("module size overflows"))?;
        if size == 0 {
            return Err(malformed("zero-sized module"));
        }
        if module.app_title() == Some(LOADER_TITLE) {
            break (at, size);
        }
        at = at
            .checked_add(size)
            .ok_or_else(|| malformed("module size overflows"))?;
    };

    if start.checked_add(size).is_none_or(|end| end > sysmodules.len()) {
        return Err(malformed("module extends past the section"));
    }

    let mut section0 = sysmodules.to_vec();
    splice_at(&mut section0, start, size, injector)?;
    debug!(
        "{TARGET}: {size:#x} bytes at {start:#x} replaced by {:#x} bytes",
        injector.len()
    );
    Ok(section0)
}

#[cfg(test)]
mod tests {
    use ctr_firm::{
        FirmwareType,
        raw::ncch::{NCCH_MAGIC, NcchHeader},
        read::Firm,
    };
    use zerocopy::{FromBytes, FromZeros, IntoBytes, little_endian::U32};

    use super::*;
    use crate::{
        config::Configuration,
        context::{BootType, LaunchArgs, NandTarget, Splash},
        emunand::EmuNandLocation,
        policy::{
            Payloads,
            cfw_info::{CFW_INFO_MAGIC, CFW_INFO_SVC, CfwInfo},
            emunand::tests::{ARM9_ADDRESS, LOCATION, PROCESS9, plant_targets, routine},
            kernel11::{
                BACKDOOR_SVC,
                tests::{ACCESS_CHECK, MODULE_LOAD, kernel_section},
            },
            process9::tests::write_process9,
        },
        testing::FirmBuilder,
    };

    const P9_ADDRESS: u32 = 0x0802_8000;
    const INJECTOR: [u8; 0x600] = [0x1A; 0x600];
    const K11_MODULES: [u8; 0x20] = [0x3C; 0x20];
    /// UNITINFO store, outside Process9
    const UNIT_INFO: usize = 0x1_0000;

    fn cfw_info_stub() -> Vec<u8> {
        let mut stub = vec![0xE2; 8];
        stub.extend_from_slice(&CFW_INFO_MAGIC);
        stub.extend_from_slice(&[0; 12]);
        stub
    }

    fn module(title: &[u8]) -> Vec<u8> {
        let mut header = NcchHeader::new_zeroed();
        header.magic = NCCH_MAGIC;
        header.content_size = U32::new(2);
        let mut bytes = vec![0u8; 0x400];
        bytes[..0x200].copy_from_slice(header.as_bytes());
        bytes[0x200..0x200 + title.len()].copy_from_slice(title);
        bytes
    }

    fn reboot_payload() -> Vec<u8> {
        let mut payload = vec![0xEE; 0x20];
        payload[8..12].copy_from_slice(REBOOT_OPEN_PLACEHOLDER);
        payload
    }

    fn arm9_section() -> Vec<u8> {
        let mut arm9 = vec![0u8; 0x2_0000];
        write_process9(&mut arm9, 0x1_6000, P9_ADDRESS);
        plant_targets(&mut arm9);

        let p9 = &mut arm9[PROCESS9];
        p9[0x100..0x104].copy_from_slice(SIGNATURE_RULES[0].pattern);
        p9[0x200..0x204].copy_from_slice(SIGNATURE_RULES[1].pattern);
        p9[0x480..0x484].copy_from_slice(WRITE_CHECK);
        p9[0x500..0x504].copy_from_slice(EXE_SERVICE);
        // blx -0x40, ahead of the reboot pattern
        p9[0x7ED..0x7F1].copy_from_slice(&0xFAFF_FFF0u32.to_le_bytes());
        p9[0x800..0x804].copy_from_slice(REBOOT_PATTERN);
        p9[0x900..0x904].copy_from_slice(MIN_VERSION_RULE.pattern);
        p9[0xA00..0xA06].copy_from_slice(P9_ACCESS_RULE.pattern);
        arm9[UNIT_INFO..UNIT_INFO + 4].copy_from_slice(&[0x01, 0x10, 0xA0, 0x13]);
        arm9
    }

    fn image() -> Vec<u8> {
        let mut sysmodules = module(b"sm");
        sysmodules.extend(module(LOADER_TITLE));
        FirmBuilder::new()
            .section(0x1FF0_0000, sysmodules)
            .section(0x1FF8_0000, kernel_section())
            .section(ARM9_ADDRESS, arm9_section())
            .build()
    }

    fn ctx(protection: NandProtection) -> BootContext {
        BootContext {
            boot_type: BootType::ColdBoot,
            firm_type: FirmwareType::Native,
            protection,
            model: ConsoleModel::Old,
            splash: Splash::Off,
            nand: NandTarget::SysNand,
            firm_source: NandTarget::SysNand,
            launch_args: LaunchArgs::None,
            show_gba_boot: false,
        }
    }

    fn run(
        image: &mut [u8],
        protection: NandProtection,
        emunand: Option<EmuNandLocation>,
        version: Option<u32>,
    ) -> Result<PatchOutcome, PatchError> {
        run_with(image, protection, emunand, version, Configuration::new())
    }

    fn run_with(
        image: &mut [u8],
        protection: NandProtection,
        emunand: Option<EmuNandLocation>,
        version: Option<u32>,
        config: Configuration,
    ) -> Result<PatchOutcome, PatchError> {
        let reboot = reboot_payload();
        let routine = routine();
        let cfw_info = cfw_info_stub();
        let inputs = PatchInputs {
            payloads: Payloads {
                reboot: &reboot,
                emunand: &routine,
                injector: &INJECTOR,
                svc_cfw_info: &cfw_info,
                k11_modules: &K11_MODULES,
            },
            emunand,
            firm_version: version,
            config,
            dev_unit: false,
        };
        let mut firm = FirmMut::try_from_bytes(image).unwrap();
        patch(&mut firm, &ctx(protection), &inputs)
    }

    fn section(image: &[u8], index: usize) -> Vec<u8> {
        let firm = Firm::try_from_bytes(image).unwrap();
        firm.section_data(&firm.section(index).unwrap()).to_vec()
    }

    fn process9_code(image: &[u8]) -> Vec<u8> {
        section(image, ARM9)[PROCESS9].to_vec()
    }

    #[test]
    fn patches_sysnand_boot() {
        let mut image = image();
        let outcome = run(&mut image, NandProtection::Off, None, Some(0x52)).unwrap();
        let p9 = process9_code(&image);

        // Write check untouched without protection
        assert_eq!(&p9[0x480..0x484], WRITE_CHECK);
        assert_eq!(&p9[0x100..0x102], &[0x00, 0x20]);
        assert_eq!(&p9[0x1FE..0x202], &[0x00, 0x20, 0x70, 0x47]);

        assert_eq!(&p9[0x7ED..0x7F5], &[0xEE; 8]);
        assert_eq!(read_u32(&p9, 0x7F5), Some(0x0802_87B6));
        assert_eq!(p9[0x904], 0xE0);

        // No EmuNAND: NAND accessors keep their pattern
        assert_eq!(&p9[0x1100..0x1104], &[0x1E, 0x00, 0xC8, 0x05]);

        let section0 = outcome.section0.unwrap();
        assert_eq!(section0.len(), 0xA00);
        assert_eq!(&section0[0x400..], &INJECTOR);
        assert_eq!(Ncch::try_from_bytes(&section0).unwrap().app_title(), Some(&b"sm"[..]));

        let arm11 = section(&image, ARM11);
        let kernel = kernel11::locate(&arm11).unwrap();
        assert_eq!(read_u32(&arm11, kernel.svc_slot(BACKDOOR_SVC)), Some(0xFFF0_3040));

        // svcGetCFWInfo follows the backdoor in free space
        assert_eq!(read_u32(&arm11, kernel.svc_slot(CFW_INFO_SVC)), Some(0xFFF0_3068));
        let info = CfwInfo::ref_from_bytes(&arm11[0x3070..0x3080]).unwrap();
        assert_eq!(info, &CfwInfo::new(Configuration::new()));

        // Access checks and UNITINFO untouched by default
        assert_eq!(&p9[0x9F2..0x9F6], &[0x00; 4]);
        assert_ne!(read_u32(&arm11, ACCESS_CHECK), Some(0xE3B0_A001));
        assert_eq!(&section(&image, ARM9)[UNIT_INFO..UNIT_INFO + 4], &[0x01, 0x10, 0xA0, 0x13]);
    }

    #[test]
    fn access_patches_follow_config() {
        let mut image = image();
        let config = Configuration::new().with_patch_access(true);
        run_with(&mut image, NandProtection::Off, None, None, config).unwrap();

        assert_eq!(&process9_code(&image)[0x9F2..0x9F6], &[0x01, 0x20, 0x70, 0x47]);
        let arm11 = section(&image, ARM11);
        assert_eq!(read_u32(&arm11, ACCESS_CHECK), Some(0xE3B0_A001));
        // Module hook placed after the backdoor and svcGetCFWInfo
        assert_eq!(&arm11[0x3080..0x30A0], &K11_MODULES);
        assert_eq!(read_u32(&arm11, MODULE_LOAD), Some(0xEB00_021E));
    }

    #[test]
    fn unit_info_development_option_swaps_unit_type() {
        let mut image = image();
        let config = Configuration::new().with_dev_options(UNIT_INFO_DEV_OPTIONS);
        run_with(&mut image, NandProtection::Off, None, None, config).unwrap();
        assert_eq!(&section(&image, ARM9)[UNIT_INFO..UNIT_INFO + 4], &[0x01, 0x10, 0xA0, 0xE3]);
    }

    #[test]
    fn protection_blocks_nand_writes() {
        let mut image = image();
        run(&mut image, NandProtection::ProtectPrimary, None, None).unwrap();
        assert_eq!(&process9_code(&image)[0x480..0x484], WRITE_CHECK_BYPASS);
    }

    #[test]
    fn emunand_boot_redirects_accessors() {
        let mut image = image();
        run(&mut image, NandProtection::Off, Some(LOCATION), None).unwrap();
        let p9 = process9_code(&image);
        assert_eq!(read_u32(&p9, 0x10FA + 4), Some(0x0801_AC55));
        assert_eq!(read_u32(&p9, 0x117A + 4), Some(0x0801_AC55));
    }

    #[test]
    fn old_firmware_skips_minimum_version_patch() {
        let mut image = image();
        run(&mut image, NandProtection::Off, None, Some(0x51)).unwrap();
        assert_eq!(process9_code(&image)[0x904], 0x00);
    }

    #[test]
    fn missing_signature_check_aborts() {
        let mut image = image();
        let firm = Firm::try_from_bytes(&image).unwrap();
        let arm9_offset = firm.section(ARM9).unwrap().offset as usize;
        let at = arm9_offset + PROCESS9.start + 0x200;
        image[at..at + 4].fill(0);

        let err = run(&mut image, NandProtection::Off, None, None).unwrap_err();
        assert!(matches!(err, PatchError::TargetMissing { target: "header signature check" }));
    }

    #[test]
    fn missing_loader_is_reported() {
        let mut sysmodules = module(b"sm");
        sysmodules.extend(module(b"pm"));
        assert!(matches!(
            replace_loader(&sysmodules, &INJECTOR),
            Err(PatchError::TargetMissing { target: "loader module" })
        ));

        let mut zero_sized = module(b"sm");
        zero_sized[0x104..0x108].fill(0);
        assert!(matches!(
            replace_loader(&zero_sized, &INJECTOR),
            Err(PatchError::Malformed { .. })
        ));
    }

    #[test]
    fn oversized_loader_is_malformed() {
        let mut sysmodules = module(b"sm");
        sysmodules.extend(module(LOADER_TITLE));
        sysmodules[0x504..0x508].fill(0xFF);
        assert!(matches!(
            replace_loader(&sysmodules, &INJECTOR),
            Err(PatchError::Malformed { target: "loader module", .. })
        ));
    }
}
