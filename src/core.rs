//! The execution core: configuration, register file, PSTATE, the step loop
//! and the per-step services (fetch, policy-checked memory access, the
//! coprocessor gateway and the system-register spaces) the decoders build on.

use num_traits::FromPrimitive;

use crate::config::{Config, ConfigError, FpVariant};
use crate::consts::{
    ArchVersion, Endianness, Feature, Isa, Mode, SysReg, SCTLR_A, SCTLR_U,
};
use crate::coproc::{Coprocessor, CoprocTable, CpOp, Fpa, Vfp};
use crate::fault::{ExecResult, Fault};
use crate::memory::{Bus, ChangeRange, Memory};
use crate::pstate::{InstrSet, Pstate, RegWidth};
use crate::regfile::RegFile;
use crate::snapshot::{DebugChange, DebugState};

/// Outcome of one [`Core::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// The instruction retired, or the fault it raised was vectored
    /// architecturally; the next step continues at the new PC.
    Completed,
    /// The core is configured to capture breaks and a fault occurred; no
    /// architectural state was changed and the PC points back at the
    /// faulting instruction.
    Break(Fault),
}

/// The CPU core. Owns the host memory implementation and is driven one
/// instruction at a time through [`step`](Core::step).
pub struct Core<M: Memory> {
    pub(crate) cfg: Config,
    pub(crate) regs: RegFile,
    pub(crate) ps: Pstate,
    mem: M,
    change: ChangeRange,
    coprocs: CoprocTable,
    pub(crate) fpa: Option<Fpa>,
    pub(crate) vfp: Option<Vfp>,
    pub(crate) old_pc: u64,
    cpacr: u32,
}

impl<M: Memory> Core<M> {
    /// Creates a core from a validated configuration and a memory
    /// implementation. The core starts in the reset state of the highest
    /// implemented privilege.
    pub fn new(cfg: Config, mem: M) -> Result<Core<M>, ConfigError> {
        cfg.validate()?;
        let regs = RegFile::new(&cfg);
        let ps = Pstate::reset(&cfg);
        let fpa = cfg.has(Feature::Fpa).then(Fpa::new);
        let vfp = match cfg.fp {
            FpVariant::Vfpv2 | FpVariant::Vfpv3 | FpVariant::Vfpv4 => Some(Vfp::new(
                if cfg.has(Feature::Dreg32) { 32 } else { 16 },
            )),
            _ => None,
        };
        Ok(Core {
            cfg,
            regs,
            ps,
            mem,
            change: ChangeRange::new(),
            coprocs: CoprocTable::new(),
            fpa,
            vfp,
            old_pc: 0,
            cpacr: 0,
        })
    }

    /// The configuration the core was created with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Shared access to the host memory.
    pub fn memory(&self) -> &M {
        &self.mem
    }

    /// Mutable access to the host memory. Only sound between steps.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    /// The current program state.
    pub fn pstate(&self) -> &Pstate {
        &self.ps
    }

    /// The register file.
    pub fn regs(&self) -> &RegFile {
        &self.regs
    }

    /// Mutable access to the register file.
    pub fn regs_mut(&mut self) -> &mut RegFile {
        &mut self.regs
    }

    /// The VFP register bank, when configured.
    pub fn vfp(&self) -> Option<&Vfp> {
        self.vfp.as_ref()
    }

    /// The FPA register bank, when configured.
    pub fn fpa(&self) -> Option<&Fpa> {
        self.fpa.as_ref()
    }

    /// Attaches a host coprocessor to a slot. Slots 14 and 15 belong to the
    /// core and cannot be replaced.
    pub fn attach_coprocessor(&mut self, slot: usize, cp: Box<dyn Coprocessor>) {
        assert!(slot < 14, "slots 14 and 15 are handled by the core");
        self.coprocs.attach(slot, cp);
    }

    /// Executes one instruction.
    pub fn step(&mut self) -> StepResult {
        self.old_pc = self.regs.pc();
        let result = match self.ps.rw {
            RegWidth::R26 => self.step_arm(true),
            RegWidth::R64 => self.step_a64(),
            RegWidth::R32 => match self.ps.jt {
                InstrSet::Arm => self.step_arm(false),
                InstrSet::Thumb => self.step_thumb(false),
                InstrSet::ThumbEe => self.step_thumb(true),
                InstrSet::Jazelle => self.step_jazelle(),
            },
        };
        match result {
            Ok(()) => StepResult::Completed,
            Err(fault) => self.deliver(fault),
        }
    }

    /// Injects an external event (IRQ, FIQ, SError or Reset) as if it
    /// arrived before the next instruction.
    pub fn raise(&mut self, fault: Fault) -> StepResult {
        self.old_pc = self.regs.pc();
        self.deliver(fault)
    }

    fn deliver(&mut self, fault: Fault) -> StepResult {
        if self.cfg.capture_breaks {
            self.regs.set_pc_raw(self.old_pc);
            return StepResult::Break(fault);
        }
        log::debug!("vectoring {fault} from {:#x}", self.old_pc);
        self.take_exception(fault);
        StepResult::Completed
    }

    /// The instruction set the next step will decode.
    pub fn current_isa(&self) -> Isa {
        self.ps.isa(&self.cfg)
    }

    /// Programs PSTATE for an instruction set. An unsupported request is
    /// ignored (the core stays in its current state).
    pub fn set_isa(&mut self, isa: Isa) {
        if !self.cfg.supports_isa(isa) {
            log::warn!("ignoring switch to unsupported {isa:?}");
            return;
        }
        log::trace!("isa switch to {isa:?}");
        match isa {
            Isa::Arm26 => {
                self.ps.rw = RegWidth::R26;
                self.ps.jt = InstrSet::Arm;
                self.ps.mode = match self.ps.mode.banks_like() {
                    Mode::Usr => Mode::Usr26,
                    Mode::Fiq => Mode::Fiq26,
                    Mode::Irq => Mode::Irq26,
                    _ => Mode::Svc26,
                };
            }
            Isa::Arm32 | Isa::Thumb | Isa::Thumb2 | Isa::ThumbEe | Isa::Jazelle => {
                self.ps.rw = RegWidth::R32;
                if self.ps.mode.is_26bit() {
                    self.ps.mode = self.ps.mode.banks_like();
                }
                self.ps.jt = match isa {
                    Isa::Arm32 => InstrSet::Arm,
                    Isa::Thumb | Isa::Thumb2 => InstrSet::Thumb,
                    Isa::ThumbEe => InstrSet::ThumbEe,
                    _ => InstrSet::Jazelle,
                };
            }
            Isa::A64 => {
                self.ps.rw = RegWidth::R64;
                self.ps.el = match self.ps.mode.banks_like() {
                    Mode::Usr => 0,
                    Mode::Hyp => 2,
                    Mode::Mon => 3,
                    _ => 1,
                };
                self.ps.sp = true;
            }
        }
    }

    /// Reads an AArch32 register through the current mode.
    pub fn a32_reg(&self, reg: u32) -> u32 {
        self.regs.a32_get(&self.ps, reg)
    }

    /// Writes an AArch32 register through the current mode.
    pub fn set_a32_reg(&mut self, reg: u32, value: u32) {
        self.regs.a32_set(&self.ps, reg, value);
    }

    /// Reads an AArch64 register; register 31 is the active stack pointer.
    pub fn a64_reg(&self, reg: u32) -> u64 {
        self.regs.a64_get(&self.ps, reg, false)
    }

    /// Writes an AArch64 register; register 31 is the active stack pointer.
    pub fn set_a64_reg(&mut self, reg: u32, value: u64) {
        self.regs.a64_set(&self.ps, reg, false, value);
    }

    /// The program counter (address of the next instruction to fetch).
    pub fn pc(&self) -> u64 {
        self.regs.pc()
    }

    /// Sets the program counter.
    pub fn set_pc(&mut self, pc: u64) {
        self.regs.set_pc_raw(pc);
    }

    /// The packed AArch32 CPSR.
    pub fn a32_cpsr(&self) -> u32 {
        self.ps.cpsr(&self.cfg)
    }

    /// Writes the AArch32 CPSR through a per-byte field mask (bit 0 the
    /// control byte through bit 3 the flags byte), honoring the same field
    /// ownership rules as MSR.
    pub fn a32_set_cpsr(&mut self, field_mask: u8, value: u32) {
        self.ps.write_cpsr(&self.cfg, value, field_mask, false);
    }

    /// Switches to an AArch32 mode, if the configuration implements it.
    pub fn set_mode(&mut self, mode: Mode) {
        if crate::pstate::mode_implemented(&self.cfg, mode) {
            self.ps.mode = mode;
            self.ps.rw = if mode.is_26bit() {
                RegWidth::R26
            } else {
                RegWidth::R32
            };
        }
    }

    /// Captures a debugger snapshot of the complete core state.
    pub fn get_debug_state(&self) -> DebugState {
        DebugState::capture(self)
    }

    /// The changes between a previous snapshot and the current state.
    pub fn debug_state_diff(&self, previous: &DebugState) -> Vec<DebugChange> {
        previous.diff(&self.get_debug_state())
    }

    /// The advisory changed-memory range since it was last reset.
    pub fn memory_change_range(&self) -> Option<(u64, u64)> {
        self.change.get()
    }

    /// Clears the changed-memory range.
    pub fn reset_memory_change_range(&mut self) {
        self.change.reset();
    }

    // ---- per-step services used by the decoders ----

    pub(crate) fn bus(&mut self) -> Bus<'_> {
        Bus {
            mem: &mut self.mem,
            change: &mut self.change,
        }
    }

    pub(crate) fn data_endian(&self) -> Endianness {
        match self.cfg.endianness {
            Endianness::Swapped => Endianness::Swapped,
            _ => {
                if self.ps.e {
                    Endianness::Big
                } else {
                    Endianness::Little
                }
            }
        }
    }

    pub(crate) fn fetch_endian(&self) -> Endianness {
        match self.cfg.endianness {
            Endianness::Swapped => Endianness::Swapped,
            _ => Endianness::Little,
        }
    }

    pub(crate) fn sctlr_a(&self) -> bool {
        self.regs.sctlr[1] & SCTLR_A != 0
    }

    fn sctlr_u(&self) -> bool {
        self.regs.sctlr[1] & SCTLR_U != 0
    }

    pub(crate) fn undef(&self) -> Fault {
        Fault::Undefined { pc: self.old_pc }
    }

    pub(crate) fn require_version(&self, version: ArchVersion) -> ExecResult<()> {
        if self.cfg.version >= version {
            Ok(())
        } else {
            Err(self.undef())
        }
    }

    pub(crate) fn require_feature(&self, feature: Feature) -> ExecResult<()> {
        if self.cfg.has(feature) {
            Ok(())
        } else {
            Err(self.undef())
        }
    }

    /// Raw data read: assembles `size` bytes under an endianness without any
    /// alignment policy.
    pub(crate) fn mem_read(
        &mut self,
        addr: u64,
        size: u32,
        endian: Endianness,
        privileged: bool,
    ) -> ExecResult<u64> {
        let mut bus = self.bus();
        let value = match size {
            1 => bus.read_u8(addr, endian, privileged).map(u64::from),
            2 => bus.read_u16(addr, endian, privileged).map(u64::from),
            4 => bus.read_u32(addr, endian, privileged).map(u64::from),
            _ => bus.read_u64(addr, endian, privileged),
        };
        value.ok_or(Fault::DataAbort { addr })
    }

    /// Raw data write, the counterpart of [`mem_read`](Core::mem_read).
    pub(crate) fn mem_write(
        &mut self,
        addr: u64,
        size: u32,
        value: u64,
        endian: Endianness,
        privileged: bool,
    ) -> ExecResult<()> {
        let mut bus = self.bus();
        let ok = match size {
            1 => bus.write_u8(addr, value as u8, endian, privileged),
            2 => bus.write_u16(addr, value as u16, endian, privileged),
            4 => bus.write_u32(addr, value as u32, endian, privileged),
            _ => bus.write_u64(addr, value, endian, privileged),
        };
        if ok {
            Ok(())
        } else {
            Err(Fault::DataAbort { addr })
        }
    }

    fn a32_range_check(&self, addr: u32) -> ExecResult<()> {
        if self.ps.rw == RegWidth::R26 && addr > 0x03FF_FFFF {
            return Err(Fault::Address26 {
                addr: u64::from(addr),
            });
        }
        Ok(())
    }

    /// AArch32 data read with the historical alignment policy: SCTLR.A
    /// faults, pre-v7 rotation for words, round-down for halfwords, native
    /// unaligned access elsewhere.
    pub(crate) fn a32_read(&mut self, addr: u32, size: u32, privileged: bool) -> ExecResult<u64> {
        self.a32_range_check(addr)?;
        let endian = self.data_endian();
        let misaligned = addr & (size - 1) != 0;
        if !misaligned {
            return self.mem_read(u64::from(addr), size, endian, privileged);
        }
        if self.sctlr_a() {
            return Err(Fault::Unaligned {
                addr: u64::from(addr),
            });
        }
        if self.cfg.version <= ArchVersion::V6 && !self.sctlr_u() {
            // Rotated unaligned load: round down, then rotate the word so
            // the addressed byte lands in the low bits.
            let aligned = addr & !(size - 1);
            let value = self.mem_read(u64::from(aligned), size, endian, privileged)?;
            let rotation = (addr & (size - 1)) * 8;
            return Ok(match size {
                4 => u64::from((value as u32).rotate_right(rotation)),
                _ => value,
            });
        }
        self.mem_read(u64::from(addr), size, endian, privileged)
    }

    /// AArch32 data write with the same alignment policy as
    /// [`a32_read`](Core::a32_read) (old cores round down, nothing rotates).
    pub(crate) fn a32_write(
        &mut self,
        addr: u32,
        size: u32,
        value: u64,
        privileged: bool,
    ) -> ExecResult<()> {
        self.a32_range_check(addr)?;
        let endian = self.data_endian();
        let misaligned = addr & (size - 1) != 0;
        if misaligned {
            if self.sctlr_a() {
                return Err(Fault::Unaligned {
                    addr: u64::from(addr),
                });
            }
            if self.cfg.version <= ArchVersion::V6 && !self.sctlr_u() {
                let aligned = addr & !(size - 1);
                return self.mem_write(u64::from(aligned), size, value, endian, privileged);
            }
        }
        self.mem_write(u64::from(addr), size, value, endian, privileged)
    }

    /// Force-aligned word read used by the block and exception paths.
    pub(crate) fn a32_read_word_aligned(
        &mut self,
        addr: u32,
        privileged: bool,
    ) -> ExecResult<u32> {
        self.a32_range_check(addr)?;
        let endian = self.data_endian();
        Ok(self.mem_read(u64::from(addr & !3), 4, endian, privileged)? as u32)
    }

    /// Force-aligned word write used by the block and exception paths.
    pub(crate) fn a32_write_word_aligned(
        &mut self,
        addr: u32,
        value: u32,
        privileged: bool,
    ) -> ExecResult<()> {
        self.a32_range_check(addr)?;
        let endian = self.data_endian();
        self.mem_write(u64::from(addr & !3), 4, u64::from(value), endian, privileged)
    }

    // ---- fetch ----

    pub(crate) fn fetch_arm(&mut self) -> ExecResult<u32> {
        let addr = self.regs.pc() & !3;
        let endian = self.fetch_endian();
        let privileged = self.ps.privileged();
        let word = self
            .bus()
            .read_u32(addr, endian, privileged)
            .ok_or(Fault::PrefetchAbort { addr })?;
        let mut next = addr.wrapping_add(4);
        if self.ps.rw == RegWidth::R26 {
            next &= 0x03FF_FFFC;
        }
        self.regs.set_pc_raw(next);
        Ok(word)
    }

    pub(crate) fn fetch_thumb16(&mut self) -> ExecResult<u16> {
        let addr = self.regs.pc() & !1;
        let endian = self.fetch_endian();
        let privileged = self.ps.privileged();
        let half = self
            .bus()
            .read_u16(addr, endian, privileged)
            .ok_or(Fault::PrefetchAbort { addr })?;
        self.regs.set_pc_raw(addr.wrapping_add(2));
        Ok(half)
    }

    pub(crate) fn fetch_a64(&mut self) -> ExecResult<u32> {
        let pc = self.regs.pc();
        if pc & 3 != 0 {
            return Err(Fault::UnalignedPc { pc });
        }
        let privileged = self.ps.privileged();
        let word = self
            .bus()
            .read_u32(pc, Endianness::Little, privileged)
            .ok_or(Fault::PrefetchAbort { addr: pc })?;
        self.regs.set_pc_raw(pc.wrapping_add(4));
        Ok(word)
    }

    // ---- branch helpers ----

    pub(crate) fn branch_to(&mut self, target: u32) {
        self.regs.a32_set(&self.ps, 15, target);
    }

    /// Interworking branch: bit 0 selects Thumb, subject to the legality
    /// filter.
    pub(crate) fn bx_write(&mut self, value: u32) {
        if self.ps.rw == RegWidth::R26 {
            self.branch_to(value);
            return;
        }
        if value & 1 != 0 {
            self.ps.set_jt_filtered(&self.cfg, InstrSet::Thumb);
        } else {
            self.ps.set_jt_filtered(&self.cfg, InstrSet::Arm);
        }
        self.branch_to(value);
    }

    /// Exception return: restores PSTATE from an SPSR image, then branches
    /// with the mask rules of the restored state.
    pub(crate) fn exception_return_a32(&mut self, target: u32, spsr: u32) {
        self.ps.restore_spsr(&self.cfg, spsr);
        if self.ps.rw == RegWidth::R64 {
            self.regs.set_pc_raw(u64::from(target));
        } else {
            self.regs.a32_set(&self.ps, 15, target);
        }
    }

    /// The SPSR of the current mode, or Undefined where the mode has none.
    pub(crate) fn spsr_current(&self) -> ExecResult<u32> {
        self.regs
            .spsr_for_mode(self.ps.mode)
            .ok_or(self.undef())
    }

    pub(crate) fn set_spsr_current(&mut self, value: u32) {
        self.regs.set_spsr_for_mode(self.ps.mode, value);
    }

    // ---- coprocessor gateway ----

    fn vfp_enabled(&self) -> bool {
        self.vfp.is_some()
    }

    pub(crate) fn cp_cdp(&mut self, cp: u32, op: &CpOp) -> ExecResult<()> {
        let ok = match cp {
            14 | 15 => false,
            1 | 2 if self.fpa.is_some() => {
                // Numerics are outside the core; FPA arithmetic is
                // unimplemented.
                false
            }
            10 | 11 if self.vfp_enabled() => false,
            _ => self
                .coprocs
                .get(cp as usize)
                .map(|c| c.cdp(op))
                .unwrap_or(false),
        };
        if ok {
            Ok(())
        } else {
            Err(self.undef())
        }
    }

    pub(crate) fn cp_mcr(&mut self, cp: u32, op: &CpOp, value: u32) -> ExecResult<()> {
        let ok = match cp {
            15 => self.cp15_write(op, value),
            14 => self.cp14_write(op, value),
            1 | 2 => match &mut self.fpa {
                Some(fpa) => fpa.mcr(op, value),
                None => self.table_mcr(cp, op, value),
            },
            10 | 11 => match &mut self.vfp {
                Some(vfp) => vfp.mcr(op, value),
                None => self.table_mcr(cp, op, value),
            },
            _ => self.table_mcr(cp, op, value),
        };
        if ok {
            Ok(())
        } else {
            Err(self.undef())
        }
    }

    fn table_mcr(&mut self, cp: u32, op: &CpOp, value: u32) -> bool {
        self.coprocs
            .get(cp as usize)
            .map(|c| c.mcr(op, value))
            .unwrap_or(false)
    }

    pub(crate) fn cp_mrc(&mut self, cp: u32, op: &CpOp) -> ExecResult<u32> {
        let value = match cp {
            15 => self.cp15_read(op),
            14 => self.cp14_read(op),
            1 | 2 => match &mut self.fpa {
                Some(fpa) => fpa.mrc(op),
                None => self.table_mrc(cp, op),
            },
            10 | 11 => match &mut self.vfp {
                Some(vfp) => vfp.mrc(op),
                None => self.table_mrc(cp, op),
            },
            _ => self.table_mrc(cp, op),
        };
        value.ok_or(self.undef())
    }

    fn table_mrc(&mut self, cp: u32, op: &CpOp) -> Option<u32> {
        self.coprocs.get(cp as usize).and_then(|c| c.mrc(op))
    }

    pub(crate) fn cp_mcrr(&mut self, cp: u32, opc: u8, crm: u8, low: u32, high: u32) -> ExecResult<()> {
        let ok = match cp {
            14 | 15 => false,
            10 | 11 => match &mut self.vfp {
                Some(vfp) => vfp.mcrr(opc, crm, low, high),
                None => false,
            },
            _ => self
                .coprocs
                .get(cp as usize)
                .map(|c| c.mcrr(opc, crm, low, high))
                .unwrap_or(false),
        };
        if ok {
            Ok(())
        } else {
            Err(self.undef())
        }
    }

    pub(crate) fn cp_mrrc(&mut self, cp: u32, opc: u8, crm: u8) -> ExecResult<(u32, u32)> {
        let value = match cp {
            14 | 15 => None,
            10 | 11 => match &mut self.vfp {
                Some(vfp) => vfp.mrrc(opc, crm),
                None => None,
            },
            _ => self.coprocs.get(cp as usize).and_then(|c| c.mrrc(opc, crm)),
        };
        value.ok_or(self.undef())
    }

    /// LDC: loads `transfer_len` words from ascending addresses into the
    /// coprocessor.
    pub(crate) fn cp_ldc(&mut self, cp: u32, crd: u8, addr: u32, privileged: bool) -> ExecResult<()> {
        let count = self.cp_transfer_len(cp, crd).ok_or(self.undef())?;
        for index in 0..count {
            let word = self.a32_read(addr.wrapping_add(index * 4), 4, privileged)? as u32;
            let ok = match cp {
                1 | 2 => self
                    .fpa
                    .as_mut()
                    .map(|f| f.ldc(crd, index, word))
                    .unwrap_or(false),
                10 => self
                    .vfp
                    .as_mut()
                    .map(|v| v.ldc(crd, index, word))
                    .unwrap_or(false),
                11 => match &mut self.vfp {
                    Some(vfp) => {
                        let d = vfp.d(crd as usize);
                        let new = if index == 0 {
                            (d & 0xFFFF_FFFF_0000_0000) | u64::from(word)
                        } else {
                            (d & 0x0000_0000_FFFF_FFFF) | (u64::from(word) << 32)
                        };
                        vfp.set_d(crd as usize, new);
                        true
                    }
                    None => false,
                },
                _ => self
                    .coprocs
                    .get(cp as usize)
                    .map(|c| c.ldc(crd, index, word))
                    .unwrap_or(false),
            };
            if !ok {
                return Err(self.undef());
            }
        }
        Ok(())
    }

    /// STC: stores `transfer_len` words from the coprocessor to ascending
    /// addresses.
    pub(crate) fn cp_stc(&mut self, cp: u32, crd: u8, addr: u32, privileged: bool) -> ExecResult<()> {
        let count = self.cp_transfer_len(cp, crd).ok_or(self.undef())?;
        for index in 0..count {
            let word = match cp {
                1 | 2 => self.fpa.as_mut().and_then(|f| f.stc(crd, index)),
                10 => self.vfp.as_mut().and_then(|v| v.stc(crd, index)),
                11 => self.vfp.as_ref().map(|v| {
                    let d = v.d(crd as usize);
                    if index == 0 {
                        d as u32
                    } else {
                        (d >> 32) as u32
                    }
                }),
                _ => self.coprocs.get(cp as usize).and_then(|c| c.stc(crd, index)),
            }
            .ok_or(self.undef())?;
            self.a32_write(addr.wrapping_add(index * 4), 4, u64::from(word), privileged)?;
        }
        Ok(())
    }

    fn cp_transfer_len(&mut self, cp: u32, crd: u8) -> Option<u32> {
        match cp {
            14 | 15 => None,
            1 | 2 => self.fpa.as_ref().map(|f| f.transfer_len(crd)),
            10 => self.vfp.as_ref().map(|_| 1),
            11 => self.vfp.as_ref().map(|_| 2),
            _ => self.coprocs.get(cp as usize).map(|c| c.transfer_len(crd)),
        }
    }

    // ---- the built-in system-control spaces ----

    fn midr(&self) -> u32 {
        let (arch, part) = match self.cfg.version {
            ArchVersion::V1 => (0x0, 0x100),
            ArchVersion::V2 => (0x0, 0x250),
            ArchVersion::V3 => (0x0, 0x710),
            ArchVersion::V4 => (0x2, 0x920),
            ArchVersion::V5 => (0x6, 0x926),
            ArchVersion::V6 => (0x7, 0xB36),
            _ => (0xF, 0xC07),
        };
        0x4100_0000 | arch << 16 | part << 4
    }

    fn id_pfr0(&self) -> u32 {
        let mut value = 0;
        if self.cfg.has(Feature::Arm32) {
            value |= 0x1;
        }
        if self.cfg.has(Feature::Thumb2) {
            value |= 0x30;
        } else if self.cfg.has(Feature::Thumb) {
            value |= 0x10;
        }
        if self.cfg.has(Feature::Jazelle) {
            value |= 0x100;
        }
        if self.cfg.supports_isa(Isa::ThumbEe) {
            value |= 0x1000;
        }
        value
    }

    fn cp15_read(&mut self, op: &CpOp) -> Option<u32> {
        if !self.ps.privileged() {
            return None;
        }
        match (op.crn, op.opc1, op.crm, op.opc2) {
            (0, 0, 0, 0) => Some(self.midr()),
            (0, 0, 1, 0) => Some(self.id_pfr0()),
            (1, 0, 0, 0) => Some(self.regs.sctlr[1] as u32),
            (1, 0, 0, 2) => Some(self.cpacr),
            (12, 0, 0, 0) => Some(self.regs.vbar[1] as u32),
            _ => None,
        }
    }

    fn cp15_write(&mut self, op: &CpOp, value: u32) -> bool {
        if !self.ps.privileged() {
            return false;
        }
        match (op.crn, op.opc1, op.crm, op.opc2) {
            (1, 0, 0, 0) => {
                let mut v = u64::from(value);
                if self.cfg.version >= ArchVersion::V7 {
                    v |= SCTLR_U;
                }
                self.regs.sctlr[1] = v;
                true
            }
            (1, 0, 0, 2) => {
                self.cpacr = value;
                true
            }
            (12, 0, 0, 0) => {
                self.regs.vbar[1] = u64::from(value);
                true
            }
            // Cache, barrier and TLB maintenance space: architecturally
            // significant only for real memory systems.
            (7, 0, _, _) => {
                self.regs.monitor.clear();
                true
            }
            _ => false,
        }
    }

    fn cp14_read(&mut self, op: &CpOp) -> Option<u32> {
        match (op.opc1, op.crn, op.crm, op.opc2) {
            (7, 0, 0, 0) if self.cfg.has(Feature::Jazelle) => Some(self.regs.jidr),
            (7, 1, 0, 0) if self.cfg.has(Feature::Jazelle) && self.ps.privileged() => {
                Some(self.regs.joscr)
            }
            (7, 2, 0, 0) if self.cfg.has(Feature::Jazelle) && self.ps.privileged() => {
                Some(self.regs.jmcr)
            }
            (7, 3, 0, 0) if self.cfg.has(Feature::Jazelle) && self.ps.privileged() => {
                Some(self.regs.jaolr)
            }
            (6, 1, 0, 0) if self.cfg.supports_isa(Isa::ThumbEe) => Some(self.regs.teehbr),
            _ => None,
        }
    }

    fn cp14_write(&mut self, op: &CpOp, value: u32) -> bool {
        match (op.opc1, op.crn, op.crm, op.opc2) {
            (7, 1, 0, 0) if self.cfg.has(Feature::Jazelle) && self.ps.privileged() => {
                self.regs.joscr = value;
                true
            }
            (7, 2, 0, 0) if self.cfg.has(Feature::Jazelle) && self.ps.privileged() => {
                self.regs.jmcr = value;
                true
            }
            (7, 3, 0, 0) if self.cfg.has(Feature::Jazelle) && self.ps.privileged() => {
                self.regs.jaolr = value;
                true
            }
            (6, 1, 0, 0) if self.cfg.supports_isa(Isa::ThumbEe) && self.ps.privileged() => {
                self.regs.teehbr = value;
                true
            }
            _ => false,
        }
    }

    // ---- the A64 system-register space ----

    fn sysreg_el(&self, reg: SysReg) -> u8 {
        match reg {
            SysReg::SctlrEl2 | SysReg::HcrEl2 | SysReg::VbarEl2 | SysReg::SpsrEl2
            | SysReg::ElrEl2 | SysReg::SpEl1 => 2,
            SysReg::SctlrEl3 | SysReg::ScrEl3 | SysReg::VbarEl3 | SysReg::SpsrEl3
            | SysReg::ElrEl3 | SysReg::SpEl2 => 3,
            SysReg::Nzcv | SysReg::Daif => 0,
            _ => 1,
        }
    }

    pub(crate) fn sysreg_read(&mut self, reg: SysReg) -> ExecResult<u64> {
        if self.ps.el < self.sysreg_el(reg) {
            return Err(self.undef());
        }
        Ok(match reg {
            SysReg::Midr => u64::from(self.midr()),
            SysReg::IdPfr0 => u64::from(self.id_pfr0()),
            SysReg::SctlrEl1 => self.regs.sctlr[1],
            SysReg::SctlrEl2 => self.regs.sctlr[2],
            SysReg::SctlrEl3 => self.regs.sctlr[3],
            SysReg::ScrEl3 => self.regs.scr_el3,
            SysReg::HcrEl2 => self.regs.hcr_el2,
            SysReg::VbarEl1 => self.regs.vbar[1],
            SysReg::VbarEl2 => self.regs.vbar[2],
            SysReg::VbarEl3 => self.regs.vbar[3],
            SysReg::SpsrEl1 => u64::from(self.regs.spsr_el(1)),
            SysReg::SpsrEl2 => u64::from(self.regs.spsr_el(2)),
            SysReg::SpsrEl3 => u64::from(self.regs.spsr_el(3)),
            SysReg::ElrEl1 => self.regs.elr_el(1),
            SysReg::ElrEl2 => self.regs.elr_el(2),
            SysReg::ElrEl3 => self.regs.elr_el(3),
            SysReg::SpEl0 => self.regs.sp_el(0),
            SysReg::SpEl1 => self.regs.sp_el(1),
            SysReg::SpEl2 => self.regs.sp_el(2),
            SysReg::Nzcv => u64::from(self.ps.nzcv()),
            SysReg::Daif => {
                u64::from(self.ps.d) << 9
                    | u64::from(self.ps.a) << 8
                    | u64::from(self.ps.i) << 7
                    | u64::from(self.ps.f) << 6
            }
            SysReg::CurrentEl => u64::from(self.ps.el) << 2,
            SysReg::SpSel => u64::from(self.ps.sp),
        })
    }

    pub(crate) fn sysreg_write(&mut self, reg: SysReg, value: u64) -> ExecResult<()> {
        if self.ps.el < self.sysreg_el(reg) {
            return Err(self.undef());
        }
        match reg {
            SysReg::Midr | SysReg::IdPfr0 | SysReg::CurrentEl => return Err(self.undef()),
            SysReg::SctlrEl1 => self.regs.sctlr[1] = value,
            SysReg::SctlrEl2 => self.regs.sctlr[2] = value,
            SysReg::SctlrEl3 => self.regs.sctlr[3] = value,
            SysReg::ScrEl3 => self.regs.scr_el3 = value,
            SysReg::HcrEl2 => self.regs.hcr_el2 = value,
            SysReg::VbarEl1 => self.regs.vbar[1] = value & !0x7FF,
            SysReg::VbarEl2 => self.regs.vbar[2] = value & !0x7FF,
            SysReg::VbarEl3 => self.regs.vbar[3] = value & !0x7FF,
            SysReg::SpsrEl1 => self.regs.set_spsr_el(1, value as u32),
            SysReg::SpsrEl2 => self.regs.set_spsr_el(2, value as u32),
            SysReg::SpsrEl3 => self.regs.set_spsr_el(3, value as u32),
            SysReg::ElrEl1 => self.regs.set_elr_el(1, value),
            SysReg::ElrEl2 => self.regs.set_elr_el(2, value),
            SysReg::ElrEl3 => self.regs.set_elr_el(3, value),
            SysReg::SpEl0 => self.regs.set_sp_el(0, value),
            SysReg::SpEl1 => self.regs.set_sp_el(1, value),
            SysReg::SpEl2 => self.regs.set_sp_el(2, value),
            SysReg::Nzcv => self.ps.set_nzcv(value as u32),
            SysReg::Daif => {
                self.ps.d = value & (1 << 9) != 0;
                self.ps.a = value & (1 << 8) != 0;
                self.ps.i = value & (1 << 7) != 0;
                self.ps.f = value & (1 << 6) != 0;
            }
            SysReg::SpSel => self.ps.sp = value & 1 != 0,
        }
        Ok(())
    }

    /// The highest exception level the configuration implements.
    pub(crate) fn highest_el(&self) -> u8 {
        if self.cfg.has(Feature::Security) {
            3
        } else if self.cfg.has(Feature::Virtualization) {
            2
        } else {
            1
        }
    }

    pub(crate) fn mode_from_bits(&self, bits: u32) -> Option<Mode> {
        Mode::from_u32(bits).filter(|m| crate::pstate::mode_implemented(&self.cfg, *m))
    }
}
