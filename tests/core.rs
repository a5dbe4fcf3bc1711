use armlet::{
    flagset::FlagSet, ArchVersion, Config, ConfigError, Core, DebugChange, Isa, Mode, StepResult,
};

fn core(version: ArchVersion) -> Core<Vec<u8>> {
    Core::new(Config::for_version(version), vec![0u8; 0x1_0000]).unwrap()
}

fn load_words(core: &mut Core<Vec<u8>>, addr: usize, words: &[u32]) {
    for (i, word) in words.iter().enumerate() {
        core.memory_mut()[addr + 4 * i..addr + 4 * i + 4].copy_from_slice(&word.to_le_bytes());
    }
}

#[test]
fn set_isa_round_trips_over_the_supported_set() {
    for version in [
        ArchVersion::V4,
        ArchVersion::V5,
        ArchVersion::V6,
        ArchVersion::V7,
        ArchVersion::V8,
    ] {
        let cfg = Config::for_version(version);
        let isas: FlagSet<Isa> = cfg.isas;
        let mut core = Core::new(cfg, vec![0u8; 0x1000]).unwrap();
        for isa in isas {
            core.set_isa(isa);
            assert_eq!(core.current_isa(), isa, "{version:?} {isa:?}");
        }
    }
}

#[test]
fn unsupported_isa_request_is_ignored() {
    let mut core = core(ArchVersion::V4);
    let before = core.current_isa();
    core.set_isa(Isa::A64);
    assert_eq!(core.current_isa(), before);
    core.set_isa(Isa::Jazelle);
    assert_eq!(core.current_isa(), before);
}

#[test]
fn invalid_configuration_is_rejected() {
    let mut cfg = Config::for_version(ArchVersion::V1);
    cfg.isas |= Isa::Thumb;
    assert_eq!(
        Core::new(cfg, vec![0u8; 16]).err(),
        Some(ConfigError::IsaWithoutFeature(Isa::Thumb))
    );
}

#[test]
fn cpsr_write_respects_field_ownership() {
    let mut core = core(ArchVersion::V6);
    // Write everything; the version owns NZCVQ, GE, E, A, I, F and mode.
    core.a32_set_cpsr(0b1111, 0xF00F_01D3);
    let cpsr = core.a32_cpsr();
    assert_eq!(cpsr & 0xF000_0000, 0xF000_0000); // flags stuck
    assert_eq!(cpsr & 0x1F, 0x13); // SVC
    assert_eq!(core.pstate().mode, Mode::Svc);
    // A user-mode write cannot touch the control byte.
    core.set_mode(Mode::Usr);
    core.a32_set_cpsr(0b0001, 0x1F);
    assert_eq!(core.pstate().mode, Mode::Usr);
}

#[test]
fn mode_width_bit_cannot_drop_on_32bit_only_cores() {
    let mut core = core(ArchVersion::V7);
    core.a32_set_cpsr(0b0001, Mode::Svc26 as u32);
    assert_eq!(core.pstate().mode, Mode::Svc);

    let mut core26 = core_26();
    core26.a32_set_cpsr(0b0001, Mode::Irq26 as u32);
    assert_eq!(core26.pstate().mode, Mode::Irq26);
}

fn core_26() -> Core<Vec<u8>> {
    Core::new(Config::for_version(ArchVersion::V2), vec![0u8; 0x1000]).unwrap()
}

#[test]
fn arm26_core_starts_in_svc26() {
    let core = core_26();
    assert_eq!(core.current_isa(), Isa::Arm26);
    assert_eq!(core.pstate().mode, Mode::Svc26);
}

#[test]
fn arm26_pc_is_masked() {
    let mut core = core_26();
    core.set_a32_reg(15, 0xFFFF_FFFF);
    assert_eq!(core.pc(), 0x03FF_FFFC);
}

#[test]
fn debug_snapshot_diff_reports_changes() {
    let mut core = core(ArchVersion::V5);
    load_words(&mut core, 0x100, &[0xE3A0_002A]); // MOV R0, #42
    core.set_pc(0x100);
    let before = core.get_debug_state();
    core.step();
    let changes = core.debug_state_diff(&before);
    assert!(changes.contains(&DebugChange::Slot(0, 0, 42)));
    assert!(changes.contains(&DebugChange::Pc(0x100, 0x104)));
}

#[test]
fn snapshot_includes_vfp_format_map() {
    let core = core(ArchVersion::V7);
    let state = core.get_debug_state();
    let (lanes, format) = state.vfp.expect("v7 has VFP");
    assert_eq!(lanes, [0; 32]);
    assert_eq!(format, 0);
}

#[test]
fn step_result_is_completed_for_plain_execution() {
    let mut core = core(ArchVersion::V4);
    load_words(&mut core, 0x0, &[0xE1A0_0000]); // MOV R0, R0
    assert_eq!(core.step(), StepResult::Completed);
}

#[test]
fn exception_clears_the_exclusive_monitor() {
    let mut core = core(ArchVersion::V6);
    load_words(
        &mut core,
        0x100,
        &[
            0xE191_0F9F, // LDREX R0, [R1]
            0xEF00_0000, // SVC
        ],
    );
    core.set_a32_reg(1, 0x3000);
    core.set_pc(0x100);
    core.step();
    assert!(core.regs().monitor.held());
    core.step();
    assert!(!core.regs().monitor.held());
}
