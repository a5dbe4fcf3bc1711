use armlet::{ArchVersion, Config, Core, Endianness, Fault, StepResult};

fn core_with_endian(version: ArchVersion, endianness: Endianness) -> Core<Vec<u8>> {
    let mut cfg = Config::for_version(version);
    cfg.endianness = endianness;
    Core::new(cfg, vec![0u8; 0x1_0000]).unwrap()
}

// Code images are stored as little-endian physical words: BE-8 fetches are
// byte-invariant little-endian and the word-invariant BE-32 scheme reads an
// aligned word from the same physical bytes.
fn load_words(core: &mut Core<Vec<u8>>, addr: usize, words: &[u32]) {
    for (i, word) in words.iter().enumerate() {
        core.memory_mut()[addr + 4 * i..addr + 4 * i + 4].copy_from_slice(&word.to_le_bytes());
    }
}

#[test]
fn little_endian_store_load_round_trip() {
    let mut core = core_with_endian(ArchVersion::V5, Endianness::Little);
    load_words(
        &mut core,
        0x100,
        &[
            0xE581_0000, // STR R0, [R1]
            0xE591_2000, // LDR R2, [R1]
        ],
    );
    core.set_a32_reg(0, 0xDDCC_BBAA);
    core.set_a32_reg(1, 0x3000);
    core.set_pc(0x100);
    core.step();
    core.step();
    assert_eq!(core.a32_reg(2), 0xDDCC_BBAA);
    assert_eq!(&core.memory()[0x3000..0x3004], &[0xAA, 0xBB, 0xCC, 0xDD]);
}

#[test]
fn be8_stores_big_endian_bytes() {
    let mut core = core_with_endian(ArchVersion::V6, Endianness::Big);
    load_words(&mut core, 0x100, &[0xE581_0000]); // STR R0, [R1]
    core.set_a32_reg(0, 0x1122_3344);
    core.set_a32_reg(1, 0x3000);
    core.set_pc(0x100);
    assert_eq!(core.step(), StepResult::Completed);
    assert_eq!(&core.memory()[0x3000..0x3004], &[0x11, 0x22, 0x33, 0x44]);
    // And it reads back through the same policy.
    load_words(&mut core, 0x104, &[0xE591_2000]);
    core.step();
    assert_eq!(core.a32_reg(2), 0x1122_3344);
}

#[test]
fn be32_aligned_word_is_word_invariant() {
    let mut core = core_with_endian(ArchVersion::V5, Endianness::Swapped);
    load_words(&mut core, 0x100, &[0xE581_0000]); // STR R0, [R1]
    core.set_a32_reg(0, 0xAABB_CCDD);
    core.set_a32_reg(1, 0x3000);
    core.set_pc(0x100);
    core.step();
    // Physically the aligned word looks little-endian.
    assert_eq!(&core.memory()[0x3000..0x3004], &[0xDD, 0xCC, 0xBB, 0xAA]);
}

#[test]
fn be32_byte_access_lands_at_xor3() {
    let mut core = core_with_endian(ArchVersion::V5, Endianness::Swapped);
    load_words(
        &mut core,
        0x100,
        &[
            0xE5C1_0000, // STRB R0, [R1]
            0xE5D1_2000, // LDRB R2, [R1]
        ],
    );
    core.set_a32_reg(0, 0x12);
    core.set_a32_reg(1, 0x3003);
    core.set_pc(0x100);
    core.step();
    assert_eq!(core.memory()[0x3000], 0x12); // 0x3003 ^ 3
    core.step();
    assert_eq!(core.a32_reg(2), 0x12);
}

#[test]
fn be32_word_matches_byte_view() {
    let mut core = core_with_endian(ArchVersion::V3, Endianness::Swapped);
    load_words(
        &mut core,
        0x100,
        &[
            0xE581_0000, // STR R0, [R1]
            0xE5D1_2000, // LDRB R2, [R1] (architectural byte 0 is the MSB)
        ],
    );
    core.set_a32_reg(0, 0x1122_3344);
    core.set_a32_reg(1, 0x3000);
    core.set_pc(0x100);
    core.step();
    core.step();
    assert_eq!(core.a32_reg(2), 0x11);
}

#[test]
fn alignment_check_faults_when_enabled() {
    let mut cfg = Config::for_version(ArchVersion::V6);
    cfg.capture_breaks = true;
    let mut core = Core::new(cfg, vec![0u8; 0x1_0000]).unwrap();
    load_words(
        &mut core,
        0x100,
        &[
            0xE3A0_0002, // MOV R0, #2 (the A bit)
            0xEE01_0F10, // MCR p15, 0, R0, c1, c0, 0
            0xE591_2000, // LDR R2, [R1]
        ],
    );
    core.set_a32_reg(1, 0x3001);
    core.set_pc(0x100);
    assert_eq!(core.step(), StepResult::Completed);
    assert_eq!(core.step(), StepResult::Completed);
    assert_eq!(
        core.step(),
        StepResult::Break(Fault::Unaligned { addr: 0x3001 })
    );
}

#[test]
fn sctlr_round_trips_through_cp15() {
    let mut core = core_with_endian(ArchVersion::V6, Endianness::Little);
    load_words(
        &mut core,
        0x100,
        &[
            0xEE11_0F10, // MRC p15, 0, R0, c1, c0, 0
        ],
    );
    core.set_pc(0x100);
    core.step();
    // The reset SCTLR has the stack-alignment bit set.
    assert_eq!(core.a32_reg(0) & 0x8, 0x8);
}

#[test]
fn change_range_tracks_writes() {
    let mut core = core_with_endian(ArchVersion::V5, Endianness::Little);
    load_words(
        &mut core,
        0x100,
        &[
            0xE581_0000, // STR R0, [R1]
            0xE5C1_2008, // STRB R2, [R1, #8]
        ],
    );
    core.set_a32_reg(1, 0x3000);
    core.set_pc(0x100);
    core.reset_memory_change_range();
    core.step();
    assert_eq!(core.memory_change_range(), Some((0x3000, 0x3003)));
    core.step();
    assert_eq!(core.memory_change_range(), Some((0x3000, 0x3008)));
    core.reset_memory_change_range();
    assert_eq!(core.memory_change_range(), None);
}
