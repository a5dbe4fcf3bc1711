//! The banked register file, the system registers and the exclusive monitor.
//!
//! All general-purpose storage lives in one flat 33-slot array; banking is a
//! pure lookup from (register number, mode) to a slot index. The AArch64
//! `X0..X30` view maps onto the same slots through the architectural
//! AArch32/AArch64 register correspondence, so a value written in one
//! execution state is visible in the other exactly where the architecture
//! says it should be.

use crate::config::Config;
use crate::consts::{ArchVersion, Feature, Mode, SCTLR_SA, SCTLR_U};
use crate::pstate::{InstrSet, Pstate, RegWidth};

/// Number of general-purpose storage slots.
pub const SLOT_COUNT: usize = 33;

/// A physical general-purpose register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
#[repr(usize)]
pub enum Slot {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R8Fiq,
    R9Fiq,
    R10Fiq,
    R11Fiq,
    R12Fiq,
    R13Fiq,
    R14Fiq,
    R13Irq,
    R14Irq,
    R13Svc,
    R14Svc,
    R13Abt,
    R14Abt,
    R13Und,
    R14Und,
    R13Mon,
    R14Mon,
    R13Hyp,
}

const A64_SLOTS: [Slot; 31] = [
    Slot::R0,
    Slot::R1,
    Slot::R2,
    Slot::R3,
    Slot::R4,
    Slot::R5,
    Slot::R6,
    Slot::R7,
    Slot::R8,
    Slot::R9,
    Slot::R10,
    Slot::R11,
    Slot::R12,
    Slot::R13,
    Slot::R14,
    Slot::R13Hyp,
    Slot::R14Irq,
    Slot::R13Irq,
    Slot::R14Svc,
    Slot::R13Svc,
    Slot::R14Abt,
    Slot::R13Abt,
    Slot::R14Und,
    Slot::R13Und,
    Slot::R8Fiq,
    Slot::R9Fiq,
    Slot::R10Fiq,
    Slot::R11Fiq,
    Slot::R12Fiq,
    Slot::R13Fiq,
    Slot::R14Fiq,
];

/// Maps an architectural register number (0-14) and a mode to its backing
/// slot. `v1_banking` selects the reduced ARMv1 FIQ bank (R10-R14 only).
pub fn slot_of(reg: u32, mode: Mode, v1_banking: bool) -> Slot {
    debug_assert!(reg < 15);
    let reg = reg as usize;
    let fiq_base = if v1_banking { 10 } else { 8 };
    let banked = |slot13: Slot, slot14: Slot| match reg {
        13 => slot13,
        14 => slot14,
        _ => USER_SLOTS[reg],
    };
    match mode.banks_like() {
        Mode::Fiq => {
            if reg >= fiq_base && reg <= 14 {
                FIQ_SLOTS[reg - 8]
            } else {
                USER_SLOTS[reg]
            }
        }
        Mode::Irq => banked(Slot::R13Irq, Slot::R14Irq),
        Mode::Svc => banked(Slot::R13Svc, Slot::R14Svc),
        Mode::Abt => banked(Slot::R13Abt, Slot::R14Abt),
        Mode::Und => banked(Slot::R13Und, Slot::R14Und),
        Mode::Mon => banked(Slot::R13Mon, Slot::R14Mon),
        Mode::Hyp => {
            if reg == 13 {
                Slot::R13Hyp
            } else {
                USER_SLOTS[reg]
            }
        }
        _ => USER_SLOTS[reg],
    }
}

const USER_SLOTS: [Slot; 15] = [
    Slot::R0,
    Slot::R1,
    Slot::R2,
    Slot::R3,
    Slot::R4,
    Slot::R5,
    Slot::R6,
    Slot::R7,
    Slot::R8,
    Slot::R9,
    Slot::R10,
    Slot::R11,
    Slot::R12,
    Slot::R13,
    Slot::R14,
];

const FIQ_SLOTS: [Slot; 7] = [
    Slot::R8Fiq,
    Slot::R9Fiq,
    Slot::R10Fiq,
    Slot::R11Fiq,
    Slot::R12Fiq,
    Slot::R13Fiq,
    Slot::R14Fiq,
];

/// Index into the SPSR array. EL1/EL2/EL3 double as the SVC/HYP/MON banks,
/// the ARMv8 aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpsrIndex {
    El1 = 0,
    El2 = 1,
    El3 = 2,
    Abt = 3,
    Und = 4,
    Irq = 5,
    Fiq = 6,
}

pub(crate) fn spsr_index_for_mode(mode: Mode) -> Option<SpsrIndex> {
    match mode.banks_like() {
        Mode::Svc => Some(SpsrIndex::El1),
        Mode::Hyp => Some(SpsrIndex::El2),
        Mode::Mon => Some(SpsrIndex::El3),
        Mode::Abt => Some(SpsrIndex::Abt),
        Mode::Und => Some(SpsrIndex::Und),
        Mode::Irq => Some(SpsrIndex::Irq),
        Mode::Fiq => Some(SpsrIndex::Fiq),
        _ => None,
    }
}

/// The LDREX reservation. `start > end` means cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Monitor {
    /// First reserved byte.
    pub start: u64,
    /// Last reserved byte.
    pub end: u64,
}

impl Monitor {
    pub(crate) fn cleared() -> Monitor {
        Monitor { start: 1, end: 0 }
    }

    /// Whether a reservation is currently held.
    pub fn held(&self) -> bool {
        self.start <= self.end
    }

    pub(crate) fn reserve(&mut self, addr: u64, len: u64) {
        self.start = addr;
        self.end = addr + len - 1;
    }

    pub(crate) fn clear(&mut self) {
        *self = Monitor::cleared();
    }

    pub(crate) fn covers(&self, addr: u64, len: u64) -> bool {
        self.held() && addr >= self.start && addr + len - 1 <= self.end
    }
}

/// Register storage: the flat slot array, the PC, the per-EL stack pointers
/// and link registers, the SPSR bank and the system registers.
#[derive(Debug, Clone)]
pub struct RegFile {
    banked: [u64; SLOT_COUNT],
    pc: u64,
    sp_el: [u64; 4],
    elr_el: [u64; 4],
    spsr: [u32; 7],
    /// SCTLR per exception level; index 1 is also the AArch32 register.
    pub sctlr: [u64; 4],
    /// SCR_EL3.
    pub scr_el3: u64,
    /// HCR_EL2.
    pub hcr_el2: u64,
    /// Vector base per exception level.
    pub vbar: [u64; 4],
    /// Jazelle OS control register.
    pub joscr: u32,
    /// Jazelle main configuration register.
    pub jmcr: u32,
    /// Jazelle array object layout register.
    pub jaolr: u32,
    /// Jazelle identity register (read-only).
    pub jidr: u32,
    /// ThumbEE handler base register.
    pub teehbr: u32,
    /// The exclusive-monitor reservation.
    pub monitor: Monitor,
    v1_banking: bool,
}

impl RegFile {
    pub(crate) fn new(cfg: &Config) -> RegFile {
        let mut sctlr = SCTLR_SA;
        if cfg.version >= ArchVersion::V7 {
            sctlr |= SCTLR_U;
        }
        RegFile {
            banked: [0; SLOT_COUNT],
            pc: 0,
            sp_el: [0; 4],
            elr_el: [0; 4],
            spsr: [0; 7],
            sctlr: [0, sctlr, sctlr, sctlr],
            scr_el3: 0,
            hcr_el2: 0,
            vbar: [0; 4],
            joscr: 0,
            jmcr: 0,
            jaolr: 0,
            jidr: if cfg.has(Feature::Jazelle) {
                0x4100_0000
            } else {
                0
            },
            teehbr: 0,
            monitor: Monitor::cleared(),
            v1_banking: cfg.version == ArchVersion::V1,
        }
    }

    /// Reads a slot directly.
    pub fn slot(&self, slot: Slot) -> u64 {
        self.banked[slot as usize]
    }

    /// Writes a slot directly.
    pub fn set_slot(&mut self, slot: Slot, value: u64) {
        self.banked[slot as usize] = value;
    }

    /// The internal program counter (points at the next instruction to
    /// fetch).
    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub(crate) fn set_pc_raw(&mut self, value: u64) {
        self.pc = value;
    }

    /// Reads an AArch32 register through the current mode's bank. A read of
    /// R15 yields the PC plus the pipeline offset of the current state.
    pub fn a32_get(&self, ps: &Pstate, reg: u32) -> u32 {
        if reg == 15 {
            let offset = match ps.jt {
                InstrSet::Thumb | InstrSet::ThumbEe => 2,
                _ => 4,
            };
            return (self.pc.wrapping_add(offset)) as u32;
        }
        self.banked[slot_of(reg, ps.mode, self.v1_banking) as usize] as u32
    }

    /// Writes an AArch32 register. Writes of R15 apply the state's PC mask
    /// (26-bit, word or halfword) without interworking.
    pub fn a32_set(&mut self, ps: &Pstate, reg: u32, value: u32) {
        if reg == 15 {
            self.pc = match ps.rw {
                RegWidth::R26 => u64::from(value & 0x03FF_FFFC),
                _ => match ps.jt {
                    InstrSet::Thumb | InstrSet::ThumbEe => u64::from(value & !1),
                    InstrSet::Jazelle => u64::from(value),
                    InstrSet::Arm => u64::from(value & !3),
                },
            };
            return;
        }
        self.banked[slot_of(reg, ps.mode, self.v1_banking) as usize] = u64::from(value);
    }

    /// Reads a register through an explicit mode's bank (LDM/STM user-bank
    /// forms, debugger access).
    pub fn a32_get_mode(&self, mode: Mode, reg: u32) -> u32 {
        self.banked[slot_of(reg, mode, self.v1_banking) as usize] as u32
    }

    /// Writes a register through an explicit mode's bank.
    pub fn a32_set_mode(&mut self, mode: Mode, reg: u32, value: u32) {
        self.banked[slot_of(reg, mode, self.v1_banking) as usize] = u64::from(value);
    }

    /// Reads an AArch64 register. Register 31 reads as zero when
    /// `suppress_sp` is set, otherwise as the stack pointer selected by
    /// PSTATE.
    pub fn a64_get(&self, ps: &Pstate, reg: u32, suppress_sp: bool) -> u64 {
        if reg == 31 {
            if suppress_sp {
                return 0;
            }
            return self.sp_el[self.active_sp(ps)];
        }
        self.banked[A64_SLOTS[reg as usize] as usize]
    }

    /// Writes an AArch64 register; register 31 is discarded when
    /// `suppress_sp` is set and targets the active stack pointer otherwise.
    pub fn a64_set(&mut self, ps: &Pstate, reg: u32, suppress_sp: bool, value: u64) {
        if reg == 31 {
            if !suppress_sp {
                let idx = self.active_sp(ps);
                self.sp_el[idx] = value;
            }
            return;
        }
        self.banked[A64_SLOTS[reg as usize] as usize] = value;
    }

    fn active_sp(&self, ps: &Pstate) -> usize {
        if ps.sp {
            ps.el as usize
        } else {
            0
        }
    }

    /// Reads SP_ELn.
    pub fn sp_el(&self, el: u8) -> u64 {
        self.sp_el[el as usize]
    }

    /// Writes SP_ELn.
    pub fn set_sp_el(&mut self, el: u8, value: u64) {
        self.sp_el[el as usize] = value;
    }

    /// Reads ELR_ELn (ELR_hyp is ELR_EL2).
    pub fn elr_el(&self, el: u8) -> u64 {
        self.elr_el[el as usize]
    }

    /// Writes ELR_ELn.
    pub fn set_elr_el(&mut self, el: u8, value: u64) {
        self.elr_el[el as usize] = value;
    }

    pub(crate) fn spsr(&self, index: SpsrIndex) -> u32 {
        self.spsr[index as usize]
    }

    pub(crate) fn set_spsr(&mut self, index: SpsrIndex, value: u32) {
        self.spsr[index as usize] = value;
    }

    /// The banked SPSR of an AArch32 mode, if the mode has one.
    pub fn spsr_for_mode(&self, mode: Mode) -> Option<u32> {
        spsr_index_for_mode(mode).map(|i| self.spsr(i))
    }

    /// Writes the banked SPSR of an AArch32 mode; ignored for modes without
    /// one.
    pub fn set_spsr_for_mode(&mut self, mode: Mode, value: u32) {
        if let Some(i) = spsr_index_for_mode(mode) {
            self.set_spsr(i, value);
        }
    }

    pub(crate) fn spsr_el(&self, el: u8) -> u32 {
        match el {
            1 => self.spsr(SpsrIndex::El1),
            2 => self.spsr(SpsrIndex::El2),
            _ => self.spsr(SpsrIndex::El3),
        }
    }

    pub(crate) fn set_spsr_el(&mut self, el: u8, value: u32) {
        let index = match el {
            1 => SpsrIndex::El1,
            2 => SpsrIndex::El2,
            _ => SpsrIndex::El3,
        };
        self.set_spsr(index, value);
    }

    pub(crate) fn snapshot_slots(&self) -> [u64; SLOT_COUNT] {
        self.banked
    }

    pub(crate) fn snapshot_spsrs(&self) -> [u32; 7] {
        self.spsr
    }

    pub(crate) fn snapshot_sp_el(&self) -> [u64; 4] {
        self.sp_el
    }

    pub(crate) fn snapshot_elr_el(&self) -> [u64; 4] {
        self.elr_el
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::consts::ArchVersion;

    #[test]
    fn banking_is_a_pure_view() {
        let cfg = Config::for_version(ArchVersion::V4);
        let mut regs = RegFile::new(&cfg);
        let mut ps = Pstate::reset(&cfg);
        ps.mode = Mode::Svc;
        regs.a32_set(&ps, 13, 0x1000);
        ps.mode = Mode::Fiq;
        regs.a32_set(&ps, 13, 0x2000);
        ps.mode = Mode::Svc;
        assert_eq!(regs.a32_get(&ps, 13), 0x1000);
        ps.mode = Mode::Usr;
        assert_eq!(regs.a32_get(&ps, 13), 0);
        // R0 is shared by every mode.
        regs.a32_set(&ps, 0, 7);
        ps.mode = Mode::Fiq;
        assert_eq!(regs.a32_get(&ps, 0), 7);
    }

    #[test]
    fn v1_fiq_bank_starts_at_r10() {
        assert_eq!(slot_of(8, Mode::Fiq, true), Slot::R8);
        assert_eq!(slot_of(9, Mode::Fiq, true), Slot::R9);
        assert_eq!(slot_of(10, Mode::Fiq, true), Slot::R10Fiq);
        assert_eq!(slot_of(8, Mode::Fiq, false), Slot::R8Fiq);
    }

    #[test]
    fn mode26_aliases_mode32_bank() {
        assert_eq!(
            slot_of(13, Mode::Svc26, false),
            slot_of(13, Mode::Svc, false)
        );
        assert_eq!(
            slot_of(14, Mode::Irq26, false),
            slot_of(14, Mode::Irq, false)
        );
    }

    #[test]
    fn a64_view_aliases_banked_slots() {
        let cfg = Config::for_version(ArchVersion::V8);
        let mut regs = RegFile::new(&cfg);
        let mut ps = Pstate::reset(&cfg);
        ps.el = 1;
        regs.a64_set(&ps, 19, false, 0xABCD);
        // X19 is the SVC-banked R13.
        assert_eq!(regs.slot(Slot::R13Svc), 0xABCD);
        regs.a64_set(&ps, 30, false, 0x1234);
        assert_eq!(regs.slot(Slot::R14Fiq), 0x1234);
    }

    #[test]
    fn x31_is_zero_or_sp() {
        let cfg = Config::for_version(ArchVersion::V8);
        let mut regs = RegFile::new(&cfg);
        let mut ps = Pstate::reset(&cfg);
        ps.el = 1;
        ps.sp = true;
        regs.a64_set(&ps, 31, true, 0xFFFF);
        assert_eq!(regs.a64_get(&ps, 31, true), 0);
        regs.a64_set(&ps, 31, false, 0x8000);
        assert_eq!(regs.sp_el(1), 0x8000);
        ps.sp = false;
        regs.a64_set(&ps, 31, false, 0x9000);
        assert_eq!(regs.sp_el(0), 0x9000);
        assert_eq!(regs.sp_el(1), 0x8000);
    }

    #[test]
    fn monitor_reservation() {
        let mut m = Monitor::cleared();
        assert!(!m.held());
        m.reserve(0x100, 4);
        assert!(m.held());
        assert!(m.covers(0x100, 4));
        assert!(m.covers(0x102, 1));
        assert!(!m.covers(0xFC, 4));
        m.clear();
        assert!(!m.held());
    }
}
