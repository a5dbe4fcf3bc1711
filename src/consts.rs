use flagset::flags;
use num_derive::{FromPrimitive, ToPrimitive};
use phf::phf_map;

// CPSR field layout (AArch32).
pub(crate) const CPSR_N: u32 = 1 << 31;
pub(crate) const CPSR_Z: u32 = 1 << 30;
pub(crate) const CPSR_C: u32 = 1 << 29;
pub(crate) const CPSR_V: u32 = 1 << 28;
pub(crate) const CPSR_Q: u32 = 1 << 27;
pub(crate) const CPSR_J: u32 = 1 << 24;
pub(crate) const CPSR_PAN: u32 = 1 << 22;
pub(crate) const CPSR_E: u32 = 1 << 9;
pub(crate) const CPSR_A: u32 = 1 << 8;
pub(crate) const CPSR_I: u32 = 1 << 7;
pub(crate) const CPSR_F: u32 = 1 << 6;
pub(crate) const CPSR_T: u32 = 1 << 5;
pub(crate) const CPSR_MODE: u32 = 0x1F;

// The 26-bit PSR packs the flags around the PC in a single word.
pub(crate) const PSR26_I: u32 = 1 << 27;
pub(crate) const PSR26_F: u32 = 1 << 26;
pub(crate) const PSR26_PC: u32 = 0x03FF_FFFC;
pub(crate) const PSR26_MODE: u32 = 0x3;

// SCTLR bits shared between the AArch32 register and SCTLR_ELn.
pub(crate) const SCTLR_A: u64 = 1 << 1;
pub(crate) const SCTLR_SA: u64 = 1 << 3;
pub(crate) const SCTLR_V: u64 = 1 << 13;
pub(crate) const SCTLR_U: u64 = 1 << 22;
pub(crate) const SCTLR_SPAN: u64 = 1 << 23;
pub(crate) const SCTLR_EE: u64 = 1 << 25;
pub(crate) const SCTLR_TE: u64 = 1 << 30;

pub(crate) const SCR_RW: u64 = 1 << 10;
pub(crate) const HCR_RW: u64 = 1 << 31;

// AArch32 vector offsets from the vector base.
pub(crate) const A32_VECTOR_RESET: u64 = 0x00;
pub(crate) const A32_VECTOR_UNDEFINED: u64 = 0x04;
pub(crate) const A32_VECTOR_SVC: u64 = 0x08;
pub(crate) const A32_VECTOR_PREFETCH_ABORT: u64 = 0x0C;
pub(crate) const A32_VECTOR_DATA_ABORT: u64 = 0x10;
pub(crate) const A32_VECTOR_ADDRESS26: u64 = 0x14;
pub(crate) const A32_VECTOR_IRQ: u64 = 0x18;
pub(crate) const A32_VECTOR_FIQ: u64 = 0x1C;
pub(crate) const A32_HIGH_VECTORS: u64 = 0xFFFF_0000;

// AArch64 vector-table offsets: exception class spacing and origin spacing.
pub(crate) const A64_VECTOR_SYNC: u64 = 0x000;
pub(crate) const A64_VECTOR_IRQ: u64 = 0x080;
pub(crate) const A64_VECTOR_FIQ: u64 = 0x100;
pub(crate) const A64_VECTOR_SERROR: u64 = 0x180;
pub(crate) const A64_ORIGIN_CURRENT_SP0: u64 = 0x000;
pub(crate) const A64_ORIGIN_CURRENT_SPX: u64 = 0x200;
pub(crate) const A64_ORIGIN_LOWER_A64: u64 = 0x400;
pub(crate) const A64_ORIGIN_LOWER_A32: u64 = 0x600;

// Jazelle. The handler-table base lives in the upper bits of R5, the
// operand-stack cache state in the low five.
pub(crate) const JZ_HANDLER_MASK: u64 = !0xFFF;
pub(crate) const JZ_CACHE_COUNT_SHIFT: u32 = 2;
pub(crate) const JZ_CACHE_COUNT_MASK: u32 = 0x7 << JZ_CACHE_COUNT_SHIFT;
pub(crate) const JZ_CACHE_TOP_MASK: u32 = 0x3;
pub(crate) const JOSCR_CD: u32 = 1 << 0;
pub(crate) const JOSCR_FLAT_ARRAY: u32 = 1 << 1;
pub(crate) const JMCR_JE: u32 = 1 << 0;

/// Architecture version of the emulated processor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive,
)]
pub enum ArchVersion {
    /// ARMv1 (ARM1; 26-bit only, reduced FIQ banking)
    V1 = 1,
    /// ARMv2 / v2a (ARM2, ARM3)
    V2 = 2,
    /// ARMv3 (first 32-bit address space)
    V3 = 3,
    /// ARMv4 / v4T
    V4 = 4,
    /// ARMv5 / v5TE / v5TEJ
    V5 = 5,
    /// ARMv6 / v6T2 / v6K
    V6 = 6,
    /// ARMv7-A/R/M
    V7 = 7,
    /// ARMv8 (AArch32 + AArch64)
    V8 = 8,
    /// ARMv9
    V9 = 9,
}

flags! {
    /// Architectural feature bits. A [`Config`](crate::Config) carries the set
    /// of features the emulated processor implements; individual instructions
    /// are gated on them.
    pub enum Feature: u32 {
        /// SWP/SWPB (ARMv2a onwards, optional on ARMv8)
        Swp,
        /// 26-bit address modes
        Arm26,
        /// 32-bit ARM state
        Arm32,
        /// Long multiplies (UMULL family)
        Mull,
        /// Thumb state
        Thumb,
        /// Thumb-2 (32-bit Thumb encodings)
        Thumb2,
        /// Enhanced DSP (the v5TE saturating/halfword-multiply set)
        EnhDsp,
        /// Dual 16-bit DSP instructions (SMUAD family)
        DspPair,
        /// Jazelle state
        Jazelle,
        /// Multiprocessing extensions
        Multiproc,
        /// Security extensions (Monitor mode, SMC)
        Security,
        /// Virtualization extensions (Hyp mode, HVC, ERET)
        Virtualization,
        /// AArch64
        Arm64,
        /// Legacy FPA floating point (coprocessors 1-2)
        Fpa,
        /// VFP (coprocessors 10-11)
        Vfp,
        /// 16 double-precision VFP registers
        Dreg,
        /// 32 double-precision VFP registers
        Dreg32,
        /// Half-precision conversions
        Fp16,
        /// Advanced SIMD
        Simd,
        /// M-profile vector extension
        Mve,
    }
}

flags! {
    /// An instruction set, usable both as a value and as a member of the
    /// supported-ISA set of a [`Config`](crate::Config).
    pub enum Isa: u8 {
        /// 26-bit ARM
        Arm26 = 0b000_0001,
        /// 32-bit ARM
        Arm32 = 0b000_0010,
        /// Thumb (16-bit encodings only)
        Thumb = 0b000_0100,
        /// Thumb-2 (Thumb with 32-bit encodings)
        Thumb2 = 0b000_1000,
        /// ThumbEE
        ThumbEe = 0b001_0000,
        /// Jazelle bytecode
        Jazelle = 0b010_0000,
        /// A64
        A64 = 0b100_0000,
    }
}

/// Byte ordering of the emulated memory system.
///
/// The numeric values are the interchange constants used at the loader
/// boundary (0 little, 1 byte-invariant big, 2 word-invariant big).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum Endianness {
    /// Little endian; bytes stored at natural addresses.
    Little = 0,
    /// BE-8: bytes at natural addresses, multi-byte values assembled
    /// big-endian.
    Big = 1,
    /// BE-32: the byte at architectural address A is physically stored at
    /// `A ^ 3`; values assemble big-endian over architectural addresses.
    Swapped = 2,
}

impl Endianness {
    /// Converts an array of two architectural-order bytes into a [`u16`].
    pub fn u16_from_bytes(&self, bytes: [u8; 2]) -> u16 {
        match self {
            Endianness::Little => u16::from_le_bytes(bytes),
            Endianness::Big | Endianness::Swapped => u16::from_be_bytes(bytes),
        }
    }

    /// Converts an array of four architectural-order bytes into a [`u32`].
    pub fn u32_from_bytes(&self, bytes: [u8; 4]) -> u32 {
        match self {
            Endianness::Little => u32::from_le_bytes(bytes),
            Endianness::Big | Endianness::Swapped => u32::from_be_bytes(bytes),
        }
    }

    /// Converts an array of eight architectural-order bytes into a [`u64`].
    pub fn u64_from_bytes(&self, bytes: [u8; 8]) -> u64 {
        match self {
            Endianness::Little => u64::from_le_bytes(bytes),
            Endianness::Big | Endianness::Swapped => u64::from_be_bytes(bytes),
        }
    }

    /// Converts a [`u16`] into architectural-order bytes.
    pub fn u16_to_bytes(&self, value: u16) -> [u8; 2] {
        match self {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big | Endianness::Swapped => value.to_be_bytes(),
        }
    }

    /// Converts a [`u32`] into architectural-order bytes.
    pub fn u32_to_bytes(&self, value: u32) -> [u8; 4] {
        match self {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big | Endianness::Swapped => value.to_be_bytes(),
        }
    }

    /// Converts a [`u64`] into architectural-order bytes.
    pub fn u64_to_bytes(&self, value: u64) -> [u8; 8] {
        match self {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big | Endianness::Swapped => value.to_be_bytes(),
        }
    }
}

/// AArch32 processor mode, including the four 26-bit modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum Mode {
    /// 26-bit User
    Usr26 = 0x00,
    /// 26-bit FIQ
    Fiq26 = 0x01,
    /// 26-bit IRQ
    Irq26 = 0x02,
    /// 26-bit Supervisor
    Svc26 = 0x03,
    /// User
    Usr = 0x10,
    /// FIQ
    Fiq = 0x11,
    /// IRQ
    Irq = 0x12,
    /// Supervisor
    Svc = 0x13,
    /// Monitor (Security extensions)
    Mon = 0x16,
    /// Abort
    Abt = 0x17,
    /// Hyp (Virtualization extensions)
    Hyp = 0x1A,
    /// Undefined
    Und = 0x1B,
    /// System (user registers, privileged)
    Sys = 0x1F,
}

impl Mode {
    /// True for the four modes with the mode-width bit (M4) clear.
    pub fn is_26bit(&self) -> bool {
        (*self as u32) & 0x10 == 0
    }

    /// True unless the mode is User (26- or 32-bit).
    pub fn is_privileged(&self) -> bool {
        !matches!(self, Mode::Usr | Mode::Usr26)
    }

    /// The 32-bit mode this mode banks like; the 26-bit modes alias their
    /// 32-bit counterparts.
    pub fn banks_like(&self) -> Mode {
        match self {
            Mode::Usr26 => Mode::Usr,
            Mode::Fiq26 => Mode::Fiq,
            Mode::Irq26 => Mode::Irq,
            Mode::Svc26 => Mode::Svc,
            m => *m,
        }
    }

    /// Whether the mode has a banked SPSR.
    pub fn has_spsr(&self) -> bool {
        matches!(
            self.banks_like(),
            Mode::Fiq | Mode::Irq | Mode::Svc | Mode::Mon | Mode::Abt | Mode::Hyp | Mode::Und
        )
    }
}

/// AArch32 condition code, the top four bits of every ARM instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Condition {
    /// Equal (Z set)
    Eq = 0,
    /// Not equal
    Ne = 1,
    /// Carry set / unsigned higher or same
    Cs = 2,
    /// Carry clear / unsigned lower
    Cc = 3,
    /// Minus / negative
    Mi = 4,
    /// Plus / positive or zero
    Pl = 5,
    /// Overflow
    Vs = 6,
    /// No overflow
    Vc = 7,
    /// Unsigned higher
    Hi = 8,
    /// Unsigned lower or same
    Ls = 9,
    /// Signed greater or equal
    Ge = 10,
    /// Signed less
    Lt = 11,
    /// Signed greater
    Gt = 12,
    /// Signed less or equal
    Le = 13,
    /// Always
    Al = 14,
    /// Never
    Nv = 15,
}

/// A system register reachable through the A64 MSR/MRS coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SysReg {
    /// Main ID register
    Midr,
    /// Processor feature register 0
    IdPfr0,
    /// System control, EL1
    SctlrEl1,
    /// System control, EL2
    SctlrEl2,
    /// System control, EL3
    SctlrEl3,
    /// Secure configuration
    ScrEl3,
    /// Hypervisor configuration
    HcrEl2,
    /// Vector base, EL1
    VbarEl1,
    /// Vector base, EL2
    VbarEl2,
    /// Vector base, EL3
    VbarEl3,
    /// Saved program state, EL1
    SpsrEl1,
    /// Saved program state, EL2
    SpsrEl2,
    /// Saved program state, EL3
    SpsrEl3,
    /// Exception link, EL1
    ElrEl1,
    /// Exception link, EL2
    ElrEl2,
    /// Exception link, EL3
    ElrEl3,
    /// Stack pointer, EL0
    SpEl0,
    /// Stack pointer, EL1
    SpEl1,
    /// Stack pointer, EL2
    SpEl2,
    /// Condition flags
    Nzcv,
    /// Interrupt masks
    Daif,
    /// Current exception level (read-only)
    CurrentEl,
    /// Stack-pointer selector
    SpSel,
}

impl SysReg {
    /// Looks a register up by its packed (op0, op1, CRn, CRm, op2)
    /// coordinate. Returns `None` for coordinates outside the implemented
    /// subset.
    pub fn from_encoding(op0: u32, op1: u32, crn: u32, crm: u32, op2: u32) -> Option<SysReg> {
        let key = (op0 << 14 | op1 << 11 | crn << 7 | crm << 3 | op2) as u16;
        SYSREG_ENCODINGS.get(&key).copied()
    }
}

static SYSREG_ENCODINGS: phf::Map<u16, SysReg> = phf_map! {
    0xC000u16 => SysReg::Midr,
    0xC008u16 => SysReg::IdPfr0,
    0xC080u16 => SysReg::SctlrEl1,
    0xC200u16 => SysReg::SpsrEl1,
    0xC201u16 => SysReg::ElrEl1,
    0xC208u16 => SysReg::SpEl0,
    0xC210u16 => SysReg::SpSel,
    0xC212u16 => SysReg::CurrentEl,
    0xC600u16 => SysReg::VbarEl1,
    0xDA10u16 => SysReg::Nzcv,
    0xDA11u16 => SysReg::Daif,
    0xE080u16 => SysReg::SctlrEl2,
    0xE088u16 => SysReg::HcrEl2,
    0xE200u16 => SysReg::SpsrEl2,
    0xE201u16 => SysReg::ElrEl2,
    0xE208u16 => SysReg::SpEl1,
    0xE600u16 => SysReg::VbarEl2,
    0xF080u16 => SysReg::SctlrEl3,
    0xF088u16 => SysReg::ScrEl3,
    0xF200u16 => SysReg::SpsrEl3,
    0xF201u16 => SysReg::ElrEl3,
    0xF208u16 => SysReg::SpEl2,
    0xF600u16 => SysReg::VbarEl3,
};

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn mode_round_trip() {
        for value in 0..32u8 {
            if let Some(mode) = Mode::from_u8(value) {
                assert_eq!(mode as u8, value);
            }
        }
        assert_eq!(Mode::from_u8(0x13), Some(Mode::Svc));
        assert_eq!(Mode::from_u8(0x14), None);
        assert!(Mode::Svc26.is_26bit());
        assert_eq!(Mode::Fiq26.banks_like(), Mode::Fiq);
    }

    #[test]
    fn sysreg_encoding_lookup() {
        assert_eq!(SysReg::from_encoding(3, 0, 1, 0, 0), Some(SysReg::SctlrEl1));
        assert_eq!(SysReg::from_encoding(3, 6, 1, 1, 0), Some(SysReg::ScrEl3));
        assert_eq!(SysReg::from_encoding(3, 3, 4, 2, 0), Some(SysReg::Nzcv));
        assert_eq!(SysReg::from_encoding(3, 0, 7, 4, 0), None);
    }
}
