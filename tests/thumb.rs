use armlet::{ArchVersion, Config, Core, Isa, StepResult};

fn thumb_core(version: ArchVersion) -> Core<Vec<u8>> {
    let mut core = Core::new(Config::for_version(version), vec![0u8; 0x1_0000]).unwrap();
    let isa = if version >= ArchVersion::V7 {
        Isa::Thumb2
    } else {
        Isa::Thumb
    };
    core.set_isa(isa);
    core
}

fn load_halfwords(core: &mut Core<Vec<u8>>, addr: usize, halfwords: &[u16]) {
    for (i, hw) in halfwords.iter().enumerate() {
        core.memory_mut()[addr + 2 * i..addr + 2 * i + 2].copy_from_slice(&hw.to_le_bytes());
    }
}

#[test]
fn mov_and_add_immediate() {
    let mut core = thumb_core(ArchVersion::V4);
    load_halfwords(
        &mut core,
        0x100,
        &[
            0x2007, // MOVS R0, #7
            0x3005, // ADDS R0, #5
        ],
    );
    core.set_pc(0x100);
    core.step();
    core.step();
    assert_eq!(core.a32_reg(0), 12);
}

#[test]
fn add_three_register_form() {
    let mut core = thumb_core(ArchVersion::V4);
    load_halfwords(&mut core, 0x100, &[0x1888]); // ADDS R0, R1, R2
    core.set_a32_reg(1, 30);
    core.set_a32_reg(2, 12);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 42);
}

#[test]
fn it_block_ttee() {
    let mut core = thumb_core(ArchVersion::V7);
    // Z=1, C=1 so EQ passes and NE fails.
    core.a32_set_cpsr(0b1000, 0x6000_0000);
    load_halfwords(
        &mut core,
        0x100,
        &[
            0xBF03, // ITTEE EQ
            0x2001, // MOV R0, #1
            0x2102, // MOV R1, #2
            0x2203, // MOV R2, #3
            0x2304, // MOV R3, #4
        ],
    );
    core.set_a32_reg(2, 0xAA);
    core.set_a32_reg(3, 0xBB);
    core.set_pc(0x100);
    for _ in 0..5 {
        assert_eq!(core.step(), StepResult::Completed);
    }
    assert_eq!(core.a32_reg(0), 1);
    assert_eq!(core.a32_reg(1), 2);
    assert_eq!(core.a32_reg(2), 0xAA);
    assert_eq!(core.a32_reg(3), 0xBB);
    assert_eq!(core.pstate().it, 0);
}

#[test]
fn conditional_branch_taken() {
    let mut core = thumb_core(ArchVersion::V4);
    core.a32_set_cpsr(0b1000, 0x4000_0000); // Z set
    load_halfwords(&mut core, 0x100, &[0xD002]); // BEQ +4
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.pc(), 0x100 + 4 + 4);
}

#[test]
fn push_pop_round_trip() {
    let mut core = thumb_core(ArchVersion::V4);
    load_halfwords(
        &mut core,
        0x100,
        &[
            0xB407, // PUSH {R0-R2}
            0xBC38, // POP {R3-R5}
        ],
    );
    core.set_a32_reg(13, 0x2000);
    core.set_a32_reg(0, 0x11);
    core.set_a32_reg(1, 0x22);
    core.set_a32_reg(2, 0x33);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(13), 0x1FF4);
    core.step();
    assert_eq!(core.a32_reg(13), 0x2000);
    assert_eq!(core.a32_reg(3), 0x11);
    assert_eq!(core.a32_reg(4), 0x22);
    assert_eq!(core.a32_reg(5), 0x33);
}

#[test]
fn classic_bl_pair() {
    let mut core = thumb_core(ArchVersion::V4);
    // BL +0x10 as the pre-Thumb-2 prefix/suffix pair.
    load_halfwords(&mut core, 0x100, &[0xF000, 0xF808]);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.pc(), 0x114);
    assert_eq!(core.a32_reg(14), 0x105); // return address with the Thumb bit
}

#[test]
fn t32_bl() {
    let mut core = thumb_core(ArchVersion::V7);
    load_halfwords(&mut core, 0x100, &[0xF000, 0xF808]); // BL +0x10
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.pc(), 0x114);
    assert_eq!(core.a32_reg(14), 0x105);
}

#[test]
fn cbz_branches_on_zero() {
    let mut core = thumb_core(ArchVersion::V7);
    load_halfwords(&mut core, 0x100, &[0xB118]); // CBZ R0, +6
    core.set_a32_reg(0, 1);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.pc(), 0x102); // not taken
    core.set_a32_reg(0, 0);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.pc(), 0x100 + 4 + 6);
}

#[test]
fn t32_movw_movt() {
    let mut core = thumb_core(ArchVersion::V7);
    load_halfwords(
        &mut core,
        0x100,
        &[
            0xF245, 0x6178, // MOVW R1, #0x5678
            0xF2C1, 0x2134, // MOVT R1, #0x1234
        ],
    );
    core.set_pc(0x100);
    core.step();
    core.step();
    assert_eq!(core.a32_reg(1), 0x1234_5678);
}

#[test]
fn t32_data_processing_modified_immediate() {
    let mut core = thumb_core(ArchVersion::V7);
    // ORR R0, R1, #0x00FF00FF (replicated immediate)
    load_halfwords(&mut core, 0x100, &[0xF041, 0x10FF]);
    core.set_a32_reg(1, 0x1100_0000);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 0x11FF_00FF);
}

#[test]
fn t32_load_store_imm12() {
    let mut core = thumb_core(ArchVersion::V7);
    load_halfwords(
        &mut core,
        0x100,
        &[
            0xF8C1, 0x0010, // STR.W R0, [R1, #16]
            0xF8D1, 0x2010, // LDR.W R2, [R1, #16]
        ],
    );
    core.set_a32_reg(0, 0xCAFE_F00D);
    core.set_a32_reg(1, 0x3000);
    core.set_pc(0x100);
    core.step();
    core.step();
    assert_eq!(core.a32_reg(2), 0xCAFE_F00D);
}

#[test]
fn t32_udiv() {
    let mut core = thumb_core(ArchVersion::V7);
    load_halfwords(&mut core, 0x100, &[0xFBB1, 0xF0F2]); // UDIV R0, R1, R2
    core.set_a32_reg(1, 100);
    core.set_a32_reg(2, 7);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.a32_reg(0), 14);
}

#[test]
fn blx_register_switches_to_arm() {
    let mut core = thumb_core(ArchVersion::V5);
    load_halfwords(&mut core, 0x100, &[0x4780]); // BLX R0
    core.set_a32_reg(0, 0x2000); // even: ARM
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.current_isa(), Isa::Arm32);
    assert_eq!(core.pc(), 0x2000);
    assert_eq!(core.a32_reg(14), 0x103);
}
