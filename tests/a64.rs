use armlet::{ArchVersion, Config, Core, Fault, Isa, StepResult};

fn core() -> Core<Vec<u8>> {
    Core::new(Config::for_version(ArchVersion::V8), vec![0u8; 0x1_0000]).unwrap()
}

fn capture_core() -> Core<Vec<u8>> {
    let mut cfg = Config::for_version(ArchVersion::V8);
    cfg.capture_breaks = true;
    Core::new(cfg, vec![0u8; 0x1_0000]).unwrap()
}

fn load_words(core: &mut Core<Vec<u8>>, addr: usize, words: &[u32]) {
    for (i, word) in words.iter().enumerate() {
        core.memory_mut()[addr + 4 * i..addr + 4 * i + 4].copy_from_slice(&word.to_le_bytes());
    }
}

#[test]
fn starts_in_aarch64_at_highest_el() {
    let core = core();
    assert_eq!(core.current_isa(), Isa::A64);
    assert_eq!(core.pstate().el, 3);
}

#[test]
fn movz_and_movk() {
    let mut core = core();
    load_words(
        &mut core,
        0x100,
        &[
            0xD280_0540, // MOVZ X0, #42
            0xF2A2_4680, // MOVK X0, #0x1234, LSL #16
        ],
    );
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a64_reg(0), 42);
    core.step();
    assert_eq!(core.a64_reg(0), 0x1234_002A);
}

#[test]
fn add_immediate_with_sp() {
    let mut core = core();
    load_words(&mut core, 0x100, &[0x9100_43FF]); // ADD SP, SP, #16
    core.set_a64_reg(31, 0x8000);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a64_reg(31), 0x8010);
}

#[test]
fn logical_bitmask_immediate() {
    let mut core = core();
    load_words(
        &mut core,
        0x100,
        &[
            0x9240_0C20, // AND X0, X1, #0xF
            0xB200_E3E2, // MOV X2, #0x1111111111111111 (ORR with ZR)
        ],
    );
    core.set_a64_reg(1, 0x1234_5678_9ABC_DEFF);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a64_reg(0), 0xF);
    core.step();
    assert_eq!(core.a64_reg(2), 0x1111_1111_1111_1111);
}

#[test]
fn subs_and_conditional_select() {
    let mut core = core();
    load_words(
        &mut core,
        0x100,
        &[
            0xEB02_003F, // CMP X1, X2
            0x9A82_0420, // CSINC X0, X1, X2, EQ
        ],
    );
    core.set_a64_reg(1, 5);
    core.set_a64_reg(2, 7);
    core.set_pc(0x100);
    core.step();
    assert!(!core.pstate().z);
    core.step();
    // EQ fails, so X0 = X2 + 1.
    assert_eq!(core.a64_reg(0), 8);
}

#[test]
fn bitfield_ubfx_sbfx() {
    let mut core = core();
    load_words(
        &mut core,
        0x100,
        &[
            0xD358_FC20, // LSR X0, X1, #24
            0x9358_7C22, // SBFX X2, X1, #24, #8
        ],
    );
    core.set_a64_reg(1, 0x0000_0000_8100_0000);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a64_reg(0), 0x81);
    core.step();
    assert_eq!(core.a64_reg(2), 0xFFFF_FFFF_FFFF_FF81);
}

#[test]
fn stp_ldp_round_trip() {
    let mut core = core();
    load_words(
        &mut core,
        0x100,
        &[
            0xA9BF_07E0, // STP X0, X1, [SP, #-16]!
            0xA8C1_0FE2, // LDP X2, X3, [SP], #16
        ],
    );
    core.set_a64_reg(31, 0x8000);
    core.set_a64_reg(0, 0x1111_2222_3333_4444);
    core.set_a64_reg(1, 0x5555_6666_7777_8888);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a64_reg(31), 0x7FF0);
    core.step();
    assert_eq!(core.a64_reg(31), 0x8000);
    assert_eq!(core.a64_reg(2), 0x1111_2222_3333_4444);
    assert_eq!(core.a64_reg(3), 0x5555_6666_7777_8888);
}

#[test]
fn load_store_register_offset() {
    let mut core = core();
    load_words(
        &mut core,
        0x100,
        &[
            0xF822_6820, // STR X0, [X1, X2]
            0xF862_6823, // LDR X3, [X1, X2]
        ],
    );
    core.set_a64_reg(0, 0xDEAD_BEEF_CAFE_F00D);
    core.set_a64_reg(1, 0x3000);
    core.set_a64_reg(2, 0x40);
    core.set_pc(0x100);
    core.step();
    core.step();
    assert_eq!(core.a64_reg(3), 0xDEAD_BEEF_CAFE_F00D);
}

#[test]
fn branch_and_link() {
    let mut core = core();
    load_words(&mut core, 0x100, &[0x9400_0010]); // BL +0x40
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.pc(), 0x140);
    assert_eq!(core.a64_reg(30), 0x104);
}

#[test]
fn cbnz_and_tbz() {
    let mut core = core();
    load_words(
        &mut core,
        0x100,
        &[
            0xB500_0060, // CBNZ X0, +12
            0x3640_0060, // TBZ X0, #8, +12
        ],
    );
    core.set_a64_reg(0, 0);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.pc(), 0x104); // not taken
    core.step();
    assert_eq!(core.pc(), 0x104 + 12); // bit 8 clear: taken
}

#[test]
fn exclusive_pair_protocol() {
    let mut core = core();
    load_words(
        &mut core,
        0x100,
        &[
            0xC85F_7C20, // LDXR X0, [X1]
            0xC803_7C22, // STXR W3, X2, [X1]
        ],
    );
    core.set_a64_reg(1, 0x3000);
    core.set_a64_reg(2, 0x77);
    core.set_pc(0x100);
    core.step();
    assert!(core.regs().monitor.held());
    core.step();
    assert_eq!(core.a64_reg(3), 0);
    assert_eq!(&core.memory()[0x3000..0x3008], &0x77u64.to_le_bytes());
}

#[test]
fn mrs_current_el() {
    let mut core = core();
    load_words(&mut core, 0x100, &[0xD538_4240]); // MRS X0, CurrentEL
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a64_reg(0), 0xC); // EL3
}

#[test]
fn svc_vectors_through_vbar() {
    let mut core = core();
    load_words(
        &mut core,
        0x100,
        &[
            0xD51E_C001, // MSR VBAR_EL3, X1
            0xD400_0021, // SVC #1
        ],
    );
    core.set_a64_reg(1, 0x4000);
    core.set_pc(0x100);
    core.step();
    core.step();
    // Synchronous, current EL with SP_ELx.
    assert_eq!(core.pc(), 0x4200);
    assert_eq!(core.regs().elr_el(3), 0x108);
    assert!(core.pstate().i);
}

#[test]
fn eret_restores_lower_el() {
    let mut core = core();
    core.regs_mut().set_elr_el(3, 0x2000);
    core.regs_mut().set_spsr_for_mode(armlet::Mode::Mon, 0x3C5); // EL1h, DAIF set
    load_words(&mut core, 0x100, &[0xD69F_03E0]); // ERET
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.pc(), 0x2000);
    assert_eq!(core.pstate().el, 1);
    assert!(core.pstate().sp);
}

#[test]
fn unaligned_pc_faults() {
    let mut core = capture_core();
    core.set_pc(0x102);
    assert_eq!(
        core.step(),
        StepResult::Break(Fault::UnalignedPc { pc: 0x102 })
    );
}

#[test]
fn unaligned_sp_faults() {
    let mut core = capture_core();
    load_words(&mut core, 0x100, &[0xF940_03E0]); // LDR X0, [SP]
    core.set_a64_reg(31, 0x3008); // 8-byte but not 16-byte aligned
    core.set_pc(0x100);
    assert_eq!(
        core.step(),
        StepResult::Break(Fault::UnalignedSp { sp: 0x3008 })
    );
}

#[test]
fn udiv_and_madd() {
    let mut core = core();
    load_words(
        &mut core,
        0x100,
        &[
            0x9AC2_0820, // UDIV X0, X1, X2
            0x9B02_7C23, // MUL X3, X1, X2
        ],
    );
    core.set_a64_reg(1, 100);
    core.set_a64_reg(2, 7);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a64_reg(0), 14);
    core.step();
    assert_eq!(core.a64_reg(3), 700);
}

#[test]
fn extended_register_add() {
    let mut core = core();
    load_words(&mut core, 0x100, &[0x8B22_C020]); // ADD X0, X1, W2, SXTW
    core.set_a64_reg(1, 0x1000);
    core.set_a64_reg(2, 0xFFFF_FFFF); // -1 as a word
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a64_reg(0), 0xFFF);
}
