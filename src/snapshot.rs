//! Debugger snapshots.
//!
//! [`DebugState`] is a full copy of the observable core state, captured
//! between steps and consumed by an external debug printer. Two snapshots
//! diff into a list of [`DebugChange`] records.

use crate::core::Core;
use crate::memory::Memory;
use crate::pstate::Pstate;
use crate::regfile::SLOT_COUNT;

/// A complete snapshot of the core state.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugState {
    /// The 33 general-purpose storage slots.
    pub slots: [u64; SLOT_COUNT],
    /// Program counter.
    pub pc: u64,
    /// The packed AArch32 CPSR.
    pub cpsr: u32,
    /// The structured program state.
    pub pstate: Pstate,
    /// SP_EL0..SP_EL3.
    pub sp_el: [u64; 4],
    /// ELR_EL1..ELR_EL3 (index 0 unused).
    pub elr_el: [u64; 4],
    /// The seven SPSR banks (EL1/SVC, EL2/HYP, EL3/MON, ABT, UND, IRQ, FIQ).
    pub spsrs: [u32; 7],
    /// SCTLR per exception level.
    pub sctlr: [u64; 4],
    /// VBAR per exception level.
    pub vbar: [u64; 4],
    /// SCR_EL3.
    pub scr_el3: u64,
    /// HCR_EL2.
    pub hcr_el2: u64,
    /// FPA registers as raw transfer images, when the FPA is configured.
    pub fpa: Option<[[u32; 3]; 8]>,
    /// VFP lanes plus the single/double format bitmap, when configured.
    pub vfp: Option<([u64; 32], u32)>,
    /// The register-cached top of the Jazelle operand stack, top first.
    pub jazelle_top: [u32; 4],
    /// Number of valid entries in `jazelle_top`.
    pub jazelle_cached: u32,
    /// The Jazelle TOS pointer (R6).
    pub jazelle_tos: u32,
    /// The advisory changed-memory range.
    pub memory_change: Option<(u64, u64)>,
}

/// One changed item between two snapshots, old value first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DebugChange {
    /// A general-purpose slot changed.
    Slot(usize, u64, u64),
    /// The program counter changed.
    Pc(u64, u64),
    /// The packed CPSR changed.
    Cpsr(u32, u32),
    /// SP_ELn changed.
    SpEl(u8, u64, u64),
    /// ELR_ELn changed.
    ElrEl(u8, u64, u64),
    /// An SPSR bank changed.
    Spsr(usize, u32, u32),
    /// SCTLR_ELn changed.
    Sctlr(u8, u64, u64),
    /// VBAR_ELn changed.
    Vbar(u8, u64, u64),
    /// SCR_EL3 changed.
    Scr(u64, u64),
    /// HCR_EL2 changed.
    Hcr(u64, u64),
    /// A VFP lane changed.
    VfpLane(usize, u64, u64),
    /// The VFP format bitmap changed.
    VfpFormat(u32, u32),
    /// An FPA register changed.
    FpaReg(usize),
    /// The Jazelle stack cache changed.
    JazelleStack,
    /// Memory changed within the given range.
    Memory(u64, u64),
}

impl DebugState {
    pub(crate) fn capture<M: Memory>(core: &Core<M>) -> DebugState {
        let regs = core.regs();
        let ps = core.pstate();
        let r5 = regs.a32_get_mode(crate::consts::Mode::Usr, 5);
        let cached = ((r5 >> 2) & 0x7).min(4);
        let top = r5 & 0x3;
        let mut jazelle_top = [0u32; 4];
        for (i, slot) in jazelle_top.iter_mut().enumerate().take(cached as usize) {
            *slot = regs.a32_get_mode(crate::consts::Mode::Usr, (top + 4 - i as u32) & 3);
        }
        DebugState {
            slots: regs.snapshot_slots(),
            pc: regs.pc(),
            cpsr: ps.cpsr(core.config()),
            pstate: *ps,
            sp_el: regs.snapshot_sp_el(),
            elr_el: regs.snapshot_elr_el(),
            spsrs: regs.snapshot_spsrs(),
            sctlr: regs.sctlr,
            vbar: regs.vbar,
            scr_el3: regs.scr_el3,
            hcr_el2: regs.hcr_el2,
            fpa: core.fpa().map(|f| f.regs),
            vfp: core.vfp().map(|v| (v.lanes(), v.format_map())),
            jazelle_top,
            jazelle_cached: cached,
            jazelle_tos: regs.a32_get_mode(crate::consts::Mode::Usr, 6),
            memory_change: core.memory_change_range(),
        }
    }

    /// The changes from `self` to `newer`.
    pub fn diff(&self, newer: &DebugState) -> Vec<DebugChange> {
        let mut changes = Vec::new();
        for i in 0..SLOT_COUNT {
            if self.slots[i] != newer.slots[i] {
                changes.push(DebugChange::Slot(i, self.slots[i], newer.slots[i]));
            }
        }
        if self.pc != newer.pc {
            changes.push(DebugChange::Pc(self.pc, newer.pc));
        }
        if self.cpsr != newer.cpsr {
            changes.push(DebugChange::Cpsr(self.cpsr, newer.cpsr));
        }
        for el in 0..4u8 {
            if self.sp_el[el as usize] != newer.sp_el[el as usize] {
                changes.push(DebugChange::SpEl(
                    el,
                    self.sp_el[el as usize],
                    newer.sp_el[el as usize],
                ));
            }
            if self.elr_el[el as usize] != newer.elr_el[el as usize] {
                changes.push(DebugChange::ElrEl(
                    el,
                    self.elr_el[el as usize],
                    newer.elr_el[el as usize],
                ));
            }
            if self.sctlr[el as usize] != newer.sctlr[el as usize] {
                changes.push(DebugChange::Sctlr(
                    el,
                    self.sctlr[el as usize],
                    newer.sctlr[el as usize],
                ));
            }
            if self.vbar[el as usize] != newer.vbar[el as usize] {
                changes.push(DebugChange::Vbar(
                    el,
                    self.vbar[el as usize],
                    newer.vbar[el as usize],
                ));
            }
        }
        for i in 0..7 {
            if self.spsrs[i] != newer.spsrs[i] {
                changes.push(DebugChange::Spsr(i, self.spsrs[i], newer.spsrs[i]));
            }
        }
        if self.scr_el3 != newer.scr_el3 {
            changes.push(DebugChange::Scr(self.scr_el3, newer.scr_el3));
        }
        if self.hcr_el2 != newer.hcr_el2 {
            changes.push(DebugChange::Hcr(self.hcr_el2, newer.hcr_el2));
        }
        if let (Some((old_lanes, old_fmt)), Some((new_lanes, new_fmt))) = (self.vfp, newer.vfp) {
            for i in 0..32 {
                if old_lanes[i] != new_lanes[i] {
                    changes.push(DebugChange::VfpLane(i, old_lanes[i], new_lanes[i]));
                }
            }
            if old_fmt != new_fmt {
                changes.push(DebugChange::VfpFormat(old_fmt, new_fmt));
            }
        }
        if let (Some(old), Some(new)) = (self.fpa, newer.fpa) {
            for i in 0..8 {
                if old[i] != new[i] {
                    changes.push(DebugChange::FpaReg(i));
                }
            }
        }
        if self.jazelle_top != newer.jazelle_top
            || self.jazelle_cached != newer.jazelle_cached
            || self.jazelle_tos != newer.jazelle_tos
        {
            changes.push(DebugChange::JazelleStack);
        }
        if let Some((low, high)) = newer.memory_change {
            if self.memory_change != newer.memory_change {
                changes.push(DebugChange::Memory(low, high));
            }
        }
        changes
    }
}
