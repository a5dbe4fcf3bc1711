use armlet::{ArchVersion, Config, Core, Fault, Isa, StepResult};

const HANDLER_BASE: u32 = 0x8000;
const TOS: u32 = 0x4000;
const LOCALS: u32 = 0x5000;
const POOL: u32 = 0x6000;

fn jazelle_core() -> Core<Vec<u8>> {
    build(false)
}

fn capture_jazelle_core() -> Core<Vec<u8>> {
    build(true)
}

fn build(capture: bool) -> Core<Vec<u8>> {
    let mut cfg = Config::for_version(ArchVersion::V5);
    cfg.capture_breaks = capture;
    let mut core = Core::new(cfg, vec![0u8; 0x1_0000]).unwrap();
    core.regs_mut().jmcr = 1; // JE
    core.set_isa(Isa::Jazelle);
    core.set_a32_reg(5, HANDLER_BASE); // handler table, empty cache
    core.set_a32_reg(6, TOS);
    core.set_a32_reg(7, LOCALS);
    core.set_a32_reg(8, POOL);
    core.set_pc(0x200);
    core
}

fn load_bytes(core: &mut Core<Vec<u8>>, addr: usize, bytes: &[u8]) {
    core.memory_mut()[addr..addr + bytes.len()].copy_from_slice(bytes);
}

fn word(core: &Core<Vec<u8>>, addr: usize) -> u32 {
    u32::from_le_bytes(core.memory()[addr..addr + 4].try_into().unwrap())
}

fn put_word(core: &mut Core<Vec<u8>>, addr: usize, value: u32) {
    core.memory_mut()[addr..addr + 4].copy_from_slice(&value.to_le_bytes());
}

#[test]
fn push_fills_the_register_cache_then_spills() {
    let mut core = jazelle_core();
    load_bytes(
        &mut core,
        0x200,
        &[
            0x10, 0x11, // bipush 0x11
            0x10, 0x22, // bipush 0x22
            0x10, 0x33, // bipush 0x33
            0x10, 0x44, // bipush 0x44
            0x10, 0x55, // bipush 0x55
        ],
    );
    for _ in 0..4 {
        assert_eq!(core.step(), StepResult::Completed);
    }
    // Four entries cached, nothing spilled yet.
    assert_eq!(core.a32_reg(5) & 0x1F, 0b100_00);
    assert_eq!(core.a32_reg(6), TOS);
    // The fifth push spills the oldest entry.
    core.step();
    let r5 = core.a32_reg(5);
    assert_eq!((r5 >> 2) & 0x7, 4);
    assert_eq!(r5 & 0x3, 1);
    assert_eq!(core.a32_reg(6), TOS + 4);
    assert_eq!(word(&core, TOS as usize), 0x11);
    assert_eq!(core.a32_reg(1), 0x55); // the new top reuses the spilled slot
}

#[test]
fn pop_order_is_lifo_through_the_cache() {
    let mut core = jazelle_core();
    load_bytes(
        &mut core,
        0x200,
        &[
            0x10, 0x11, 0x10, 0x22, 0x10, 0x33, 0x10, 0x44, 0x10, 0x55, // pushes
            0x3B, // istore_0
            0x3C, // istore_1
            0x3D, // istore_2
            0x3E, // istore_3
            0x36, 0x04, // istore 4
        ],
    );
    for _ in 0..10 {
        assert_eq!(core.step(), StepResult::Completed);
    }
    assert_eq!(word(&core, LOCALS as usize), 0x55);
    assert_eq!(word(&core, LOCALS as usize + 4), 0x44);
    assert_eq!(word(&core, LOCALS as usize + 8), 0x33);
    assert_eq!(word(&core, LOCALS as usize + 12), 0x22);
    assert_eq!(word(&core, LOCALS as usize + 16), 0x11);
    // Cache drained and the spilled entry reloaded.
    assert_eq!((core.a32_reg(5) >> 2) & 0x7, 0);
    assert_eq!(core.a32_reg(6), TOS);
}

#[test]
fn integer_arithmetic() {
    let mut core = jazelle_core();
    load_bytes(
        &mut core,
        0x200,
        &[
            0x10, 0x02, // bipush 2
            0x10, 0x03, // bipush 3
            0x60, // iadd
            0x3B, // istore_0
        ],
    );
    for _ in 0..4 {
        core.step();
    }
    assert_eq!(word(&core, LOCALS as usize), 5);
}

#[test]
fn locals_round_trip() {
    let mut core = jazelle_core();
    put_word(&mut core, LOCALS as usize + 8, 1234);
    load_bytes(
        &mut core,
        0x200,
        &[
            0x1C, // iload_2
            0x84, 0x02, 0x05, // iinc 2, 5
            0x3B, // istore_0
        ],
    );
    core.step();
    core.step();
    core.step();
    assert_eq!(word(&core, LOCALS as usize), 1234);
    assert_eq!(word(&core, LOCALS as usize + 8), 1239);
}

#[test]
fn goto_is_relative_to_the_opcode() {
    let mut core = jazelle_core();
    load_bytes(&mut core, 0x200, &[0xA7, 0x00, 0x10]); // goto +0x10
    core.step();
    assert_eq!(core.pc(), 0x210);
}

#[test]
fn conditional_branch_pops_operand() {
    let mut core = jazelle_core();
    load_bytes(
        &mut core,
        0x200,
        &[
            0x03, // iconst_0
            0x99, 0x00, 0x20, // ifeq +0x20
        ],
    );
    core.step();
    core.step();
    assert_eq!(core.pc(), 0x221);
    assert_eq!((core.a32_reg(5) >> 2) & 0x7, 0);
}

#[test]
fn flat_array_store_and_load() {
    let mut core = jazelle_core();
    // Length at +4, elements at +8, flat layout.
    core.regs_mut().jaolr = 4 | (8 << 12);
    core.regs_mut().joscr = 0b10; // flat arrays
    put_word(&mut core, 0x3004, 3); // length 3
    load_bytes(
        &mut core,
        0x200,
        &[
            0x11, 0x30, 0x00, // sipush 0x3000
            0x04, // iconst_1
            0x10, 0x77, // bipush 0x77
            0x4F, // iastore
            0x11, 0x30, 0x00, // sipush 0x3000
            0x04, // iconst_1
            0x2E, // iaload
            0x3B, // istore_0
            0x11, 0x30, 0x00, // sipush 0x3000
            0xBE, // arraylength
            0x3C, // istore_1
        ],
    );
    for _ in 0..11 {
        assert_eq!(core.step(), StepResult::Completed);
    }
    assert_eq!(word(&core, 0x300C), 0x77); // base + 8 + 1*4
    assert_eq!(word(&core, LOCALS as usize), 0x77);
    assert_eq!(word(&core, LOCALS as usize + 4), 3);
}

#[test]
fn null_array_reference_faults() {
    let mut core = capture_jazelle_core();
    load_bytes(
        &mut core,
        0x200,
        &[
            0x01, // aconst_null
            0x03, // iconst_0
            0x2E, // iaload
        ],
    );
    assert_eq!(core.step(), StepResult::Completed);
    assert_eq!(core.step(), StepResult::Completed);
    assert_eq!(core.step(), StepResult::Break(Fault::JazelleNullPtr));
}

#[test]
fn out_of_bounds_index_faults() {
    let mut core = capture_jazelle_core();
    core.regs_mut().jaolr = 4 | (8 << 12);
    core.regs_mut().joscr = 0b10;
    put_word(&mut core, 0x3004, 2);
    load_bytes(
        &mut core,
        0x200,
        &[
            0x11, 0x30, 0x00, // sipush 0x3000
            0x10, 0x02, // bipush 2 (length is 2: indices 0 and 1)
            0x2E, // iaload
        ],
    );
    core.step();
    core.step();
    assert_eq!(core.step(), StepResult::Break(Fault::JazelleOutOfBounds));
}

#[test]
fn unsupported_bytecode_enters_the_handler_table() {
    let mut core = jazelle_core();
    load_bytes(&mut core, 0x200, &[0xBB, 0x00, 0x01]); // new
    assert_eq!(core.step(), StepResult::Completed);
    assert_eq!(core.current_isa(), Isa::Arm32);
    assert_eq!(core.pc(), u64::from(HANDLER_BASE + 4 * 0xBB));
    // The link register points back at the bytecode.
    assert_eq!(core.a32_reg(14), 0x200);
    assert_eq!((core.a32_reg(5) >> 2) & 0x7, 0);
}

#[test]
fn disabled_jazelle_faults() {
    let mut core = capture_jazelle_core();
    core.regs_mut().jmcr = 0;
    assert_eq!(core.step(), StepResult::Break(Fault::JazelleDisabled));
}

#[test]
fn invoke_and_return_protocol() {
    let mut core = jazelle_core();
    let method: u32 = 0x7000;
    put_word(&mut core, (POOL + 4) as usize, method); // pool entry 1
    put_word(&mut core, method as usize, 1); // one argument
    put_word(&mut core, (method + 4) as usize, 2); // two locals
    put_word(&mut core, (method + 8) as usize, 0x6100); // callee pool
    load_bytes(
        &mut core,
        (method + 12) as usize,
        &[
            0x1A, // iload_0 (the argument)
            0xAC, // ireturn
        ],
    );
    load_bytes(
        &mut core,
        0x200,
        &[
            0x10, 0x09, // bipush 9
            0xB8, 0x00, 0x01, // invokestatic #1
            0x3B, // istore_0
        ],
    );
    core.step(); // bipush
    core.step(); // invokestatic
    assert_eq!(core.pc(), u64::from(method + 12));
    assert_eq!(core.a32_reg(8), 0x6100);
    // Frame: one argument at the locals base, one more local, saved state.
    assert_eq!(core.a32_reg(7), TOS);
    assert_eq!(core.a32_reg(6), TOS + 8 + 16);
    assert_eq!(core.a32_reg(4), core.a32_reg(6));

    core.step(); // iload_0
    core.step(); // ireturn
    assert_eq!(core.pc(), 0x205);
    assert_eq!(core.a32_reg(7), LOCALS);
    assert_eq!(core.a32_reg(8), POOL);
    core.step(); // istore_0
    assert_eq!(word(&core, LOCALS as usize), 9);
}

#[test]
fn ldc_reads_the_constant_pool() {
    let mut core = jazelle_core();
    put_word(&mut core, (POOL + 12) as usize, 0xCAFE_BABE);
    load_bytes(
        &mut core,
        0x200,
        &[
            0x12, 0x03, // ldc 3
            0x3B, // istore_0
        ],
    );
    core.step();
    core.step();
    assert_eq!(word(&core, LOCALS as usize), 0xCAFE_BABE);
}
