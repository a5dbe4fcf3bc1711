use armlet::{ArchVersion, Config, Core, Fault, Isa, Mode, StepResult};

fn core(version: ArchVersion) -> Core<Vec<u8>> {
    Core::new(Config::for_version(version), vec![0u8; 0x1_0000]).unwrap()
}

fn capture_core(version: ArchVersion) -> Core<Vec<u8>> {
    let mut cfg = Config::for_version(version);
    cfg.capture_breaks = true;
    Core::new(cfg, vec![0u8; 0x1_0000]).unwrap()
}

fn load_words(core: &mut Core<Vec<u8>>, addr: usize, words: &[u32]) {
    for (i, word) in words.iter().enumerate() {
        core.memory_mut()[addr + 4 * i..addr + 4 * i + 4].copy_from_slice(&word.to_le_bytes());
    }
}

#[test]
fn mov_immediate() {
    let mut core = core(ArchVersion::V4);
    load_words(&mut core, 0x100, &[0xE3A0_002A]); // MOV R0, #42
    core.set_pc(0x100);
    assert_eq!(core.step(), StepResult::Completed);
    assert_eq!(core.a32_reg(0), 42);
    assert_eq!(core.pc(), 0x104);
}

#[test]
fn rotated_unaligned_load_on_v6() {
    let mut core = core(ArchVersion::V6);
    core.memory_mut()[0x1000..0x1004].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
    load_words(&mut core, 0x100, &[0xE591_0000]); // LDR R0, [R1]
    core.set_a32_reg(1, 0x1002);
    core.set_pc(0x100);
    assert_eq!(core.step(), StepResult::Completed);
    // The word at 0x1000 rotated right by 16.
    assert_eq!(core.a32_reg(0), 0xBBAA_DDCC);
}

#[test]
fn unaligned_load_is_native_on_v7() {
    let mut core = core(ArchVersion::V7);
    core.memory_mut()[0x1000..0x1006].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    load_words(&mut core, 0x100, &[0xE591_0000]);
    core.set_a32_reg(1, 0x1002);
    core.set_pc(0x100);
    assert_eq!(core.step(), StepResult::Completed);
    assert_eq!(core.a32_reg(0), 0xFFEE_DDCC);
}

#[test]
fn banked_stack_pointers() {
    let mut core = core(ArchVersion::V4);
    core.set_mode(Mode::Svc);
    core.set_a32_reg(13, 0x1000);
    core.set_mode(Mode::Fiq);
    core.set_a32_reg(13, 0x2000);
    core.set_mode(Mode::Svc);
    assert_eq!(core.a32_reg(13), 0x1000);
    core.set_mode(Mode::Usr);
    assert_eq!(core.a32_reg(13), 0);
}

#[test]
fn adds_sets_carry_and_zero() {
    let mut core = core(ArchVersion::V4);
    load_words(&mut core, 0x100, &[0xE290_0001]); // ADDS R0, R0, #1
    core.set_a32_reg(0, 0xFFFF_FFFF);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 0);
    assert!(core.pstate().z);
    assert!(core.pstate().c);
    assert!(!core.pstate().n);
}

#[test]
fn shifter_carry_from_register_shift() {
    let mut core = core(ArchVersion::V4);
    // MOVS R0, R1, LSL R2
    load_words(&mut core, 0x100, &[0xE1B0_0211]);
    core.set_a32_reg(1, 0x8000_0001);
    core.set_a32_reg(2, 1);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 2);
    assert!(core.pstate().c);
}

#[test]
fn svc_vectors_with_return_state() {
    let mut core = core(ArchVersion::V5);
    load_words(&mut core, 0x100, &[0xEF00_0003]); // SVC #3
    core.set_pc(0x100);
    core.set_mode(Mode::Sys);
    let cpsr_before = core.a32_cpsr();
    assert_eq!(core.step(), StepResult::Completed);
    assert_eq!(core.pc(), 0x08);
    assert_eq!(core.pstate().mode, Mode::Svc);
    assert_eq!(core.regs().spsr_for_mode(Mode::Svc), Some(cpsr_before));
    // The link register holds the instruction after the SVC.
    assert_eq!(core.a32_reg(14), 0x104);
    assert!(core.pstate().i);
}

#[test]
fn data_abort_link_register_offset() {
    let mut core = core(ArchVersion::V5);
    load_words(&mut core, 0x100, &[0xE591_0000]); // LDR R0, [R1]
    core.set_a32_reg(1, 0xFFFF_F000); // outside the backing store
    core.set_pc(0x100);
    assert_eq!(core.step(), StepResult::Completed);
    assert_eq!(core.pc(), 0x10);
    assert_eq!(core.pstate().mode, Mode::Abt);
    assert_eq!(core.a32_reg(14), 0x108);
}

#[test]
fn undefined_is_captured_when_configured() {
    let mut core = capture_core(ArchVersion::V5);
    load_words(&mut core, 0x100, &[0xE7F0_00F0]); // UDF
    core.set_pc(0x100);
    assert_eq!(
        core.step(),
        StepResult::Break(Fault::Undefined { pc: 0x100 })
    );
    // No architectural state change: the PC still points at the instruction.
    assert_eq!(core.pc(), 0x100);
}

#[test]
fn bx_interworks_to_thumb() {
    let mut core = core(ArchVersion::V5);
    load_words(&mut core, 0x100, &[0xE12F_FF10]); // BX R0
    core.set_a32_reg(0, 0x2001);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.current_isa(), Isa::Thumb);
    assert_eq!(core.pc(), 0x2000);
}

#[test]
fn block_transfer_round_trip() {
    let mut core = core(ArchVersion::V4);
    load_words(
        &mut core,
        0x100,
        &[
            0xE92D_000F, // STMDB SP!, {R0-R3}
            0xE8BD_00F0, // LDMIA SP!, {R4-R7}
        ],
    );
    core.set_a32_reg(13, 0x2000);
    for r in 0..4 {
        core.set_a32_reg(r, 0x1111_1111 * (r + 1));
    }
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(13), 0x1FF0);
    assert_eq!(
        &core.memory()[0x1FF0..0x1FF4],
        &0x1111_1111u32.to_le_bytes()
    );
    core.step();
    assert_eq!(core.a32_reg(13), 0x2000);
    for r in 0..4 {
        assert_eq!(core.a32_reg(r + 4), 0x1111_1111 * (r + 1));
    }
}

#[test]
fn stm_user_bank_from_fiq() {
    let mut core = core(ArchVersion::V4);
    core.set_mode(Mode::Usr);
    core.set_a32_reg(13, 0xBEEF);
    core.set_mode(Mode::Fiq);
    core.set_a32_reg(13, 0x2000);
    core.set_a32_reg(0, 0x3000);
    // STMIA R0, {R13}^ stores the user-bank R13.
    load_words(&mut core, 0x100, &[0xE8C0_2000]);
    core.set_pc(0x100);
    core.step();
    assert_eq!(&core.memory()[0x3000..0x3004], &0xBEEFu32.to_le_bytes());
}

#[test]
fn multiply_and_long_multiply() {
    let mut core = core(ArchVersion::V4);
    load_words(
        &mut core,
        0x100,
        &[
            0xE000_0291, // MUL R0, R1, R2
            0xE083_4291, // UMULL R4, R3, R1, R2
        ],
    );
    core.set_a32_reg(1, 6);
    core.set_a32_reg(2, 7);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 42);
    core.set_a32_reg(1, 0x8000_0000);
    core.set_a32_reg(2, 4);
    core.step();
    assert_eq!(core.a32_reg(4), 0); // low half
    assert_eq!(core.a32_reg(3), 2); // high half
}

#[test]
fn mrs_msr_flags() {
    let mut core = core(ArchVersion::V5);
    load_words(
        &mut core,
        0x100,
        &[
            0xE328_F202, // MSR CPSR_f, #0x20000000 (set C)
            0xE10F_0000, // MRS R0, CPSR
        ],
    );
    core.set_pc(0x100);
    core.step();
    assert!(core.pstate().c);
    core.step();
    assert_eq!(core.a32_reg(0) & 0x2000_0000, 0x2000_0000);
}

#[test]
fn swp_exchanges_word() {
    let mut core = core(ArchVersion::V4);
    load_words(&mut core, 0x100, &[0xE101_0092]); // SWP R0, R2, [R1]
    core.memory_mut()[0x3000..0x3004].copy_from_slice(&0x5555_5555u32.to_le_bytes());
    core.set_a32_reg(1, 0x3000);
    core.set_a32_reg(2, 0xAAAA_AAAA);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 0x5555_5555);
    assert_eq!(&core.memory()[0x3000..0x3004], &0xAAAA_AAAAu32.to_le_bytes());
}

#[test]
fn exclusive_monitor_protocol() {
    let mut core = core(ArchVersion::V6);
    load_words(
        &mut core,
        0x100,
        &[
            0xE191_0F9F, // LDREX R0, [R1]
            0xE181_2F92, // STREX R2, R2, [R1]
            0xE181_3F92, // STREX R3, R2, [R1] (monitor now clear)
        ],
    );
    core.set_a32_reg(1, 0x3000);
    core.set_a32_reg(2, 0x1234);
    core.set_pc(0x100);
    core.step();
    assert!(core.regs().monitor.held());
    core.step();
    assert_eq!(core.a32_reg(2), 0); // success
    assert!(!core.regs().monitor.held());
    core.set_a32_reg(2, 0x5678);
    core.step();
    assert_eq!(core.a32_reg(3), 1); // failure, nothing stored
    assert_eq!(&core.memory()[0x3000..0x3004], &0x1234u32.to_le_bytes());
}

#[test]
fn exception_return_via_subs() {
    let mut core = core(ArchVersion::V5);
    // Enter an exception first so the SPSR is meaningful.
    load_words(&mut core, 0x100, &[0xEF00_0000]); // SVC
    core.set_pc(0x100);
    core.set_mode(Mode::Sys);
    core.a32_set_cpsr(0b1000, 0x9000_0000); // N and V set before the call
    core.step();
    assert_eq!(core.pstate().mode, Mode::Svc);
    // SUBS PC, LR, #0 returns and restores the flags.
    load_words(&mut core, 0x08, &[0xE25E_F000]);
    core.step();
    assert_eq!(core.pc(), 0x104);
    assert_eq!(core.pstate().mode, Mode::Sys);
    assert!(core.pstate().n);
    assert!(core.pstate().v);
}

#[test]
fn clz_counts_leading_zeros() {
    let mut core = core(ArchVersion::V5);
    load_words(&mut core, 0x100, &[0xE16F_0F11]); // CLZ R0, R1
    core.set_a32_reg(1, 0x0000_0100);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 23);
}

#[test]
fn sadd16_updates_ge() {
    let mut core = core(ArchVersion::V6);
    load_words(&mut core, 0x100, &[0xE611_0F12]); // SADD16 R0, R1, R2
    core.set_a32_reg(1, 0xFFFF_0001); // -1, 1
    core.set_a32_reg(2, 0x0000_0001);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 0xFFFF_0002);
    assert_eq!(core.pstate().ge, 0b0011);
}

#[test]
fn qadd_saturates_and_sets_q() {
    let mut core = core(ArchVersion::V5);
    load_words(&mut core, 0x100, &[0xE101_0052]); // QADD R0, R2, R1
    core.set_a32_reg(1, 0x7FFF_FFFF);
    core.set_a32_reg(2, 1);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 0x7FFF_FFFF);
    assert!(core.pstate().q);
}

#[test]
fn movw_movt_build_constant() {
    let mut core = core(ArchVersion::V7);
    load_words(
        &mut core,
        0x100,
        &[
            0xE305_1678, // MOVW R1, #0x5678
            0xE341_1234, // MOVT R1, #0x1234
        ],
    );
    core.set_pc(0x100);
    core.step();
    core.step();
    assert_eq!(core.a32_reg(1), 0x1234_5678);
}

#[test]
fn conditional_instruction_skipped() {
    let mut core = core(ArchVersion::V4);
    load_words(&mut core, 0x100, &[0x03A0_0001]); // MOVEQ R0, #1
    core.a32_set_cpsr(0b1000, 0); // Z clear
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 0);
    assert_eq!(core.pc(), 0x104);
}

#[test]
fn bl_links_return_address() {
    let mut core = core(ArchVersion::V4);
    load_words(&mut core, 0x100, &[0xEB00_0010]); // BL +0x48
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(14), 0x104);
    assert_eq!(core.pc(), 0x100 + 8 + 0x40);
}

#[test]
fn ldrh_and_ldrsb() {
    let mut core = core(ArchVersion::V5);
    core.memory_mut()[0x3000..0x3004].copy_from_slice(&[0x34, 0x12, 0x80, 0x00]);
    load_words(
        &mut core,
        0x100,
        &[
            0xE1D1_00B0, // LDRH R0, [R1]
            0xE1D1_20D2, // LDRSB R2, [R1, #2]
        ],
    );
    core.set_a32_reg(1, 0x3000);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 0x1234);
    core.step();
    assert_eq!(core.a32_reg(2), 0xFFFF_FF80);
}

#[test]
fn irq_injection_vectors() {
    let mut core = core(ArchVersion::V4);
    core.a32_set_cpsr(0b0001, core.a32_cpsr() & !0x80); // clear I
    core.set_pc(0x400);
    assert_eq!(core.raise(Fault::Irq), StepResult::Completed);
    assert_eq!(core.pc(), 0x18);
    assert_eq!(core.pstate().mode, Mode::Irq);
    assert!(core.pstate().i);
    assert_eq!(core.a32_reg(14), 0x404);
}
