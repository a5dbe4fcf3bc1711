//! Architectural exception entry.
//!
//! Faults bubbling out of the instruction semantics land in
//! [`Core::take_exception`], which selects the target state (AArch64 EL or
//! AArch32 mode), saves the return state, scrubs PSTATE and redirects the PC
//! at the vector. The ThumbEE check faults are plain handler branches and
//! bypass all of that.

use crate::consts::{
    Feature, Mode, A32_HIGH_VECTORS, A64_ORIGIN_CURRENT_SP0, A64_ORIGIN_CURRENT_SPX,
    A64_ORIGIN_LOWER_A32, A64_ORIGIN_LOWER_A64, A64_VECTOR_FIQ, A64_VECTOR_IRQ, A64_VECTOR_SERROR,
    A64_VECTOR_SYNC, ArchVersion, HCR_RW, SCR_RW, SCTLR_EE, SCTLR_SPAN, SCTLR_TE, SCTLR_V,
};
use crate::core::Core;
use crate::fault::Fault;
use crate::memory::Memory;
use crate::pstate::{InstrSet, RegWidth};

impl<M: Memory> Core<M> {
    pub(crate) fn take_exception(&mut self, fault: Fault) {
        self.regs.monitor.clear();

        match fault {
            Fault::ThumbEeNullPtr => {
                let target = self.regs.teehbr.wrapping_sub(4);
                self.regs.set_pc_raw(u64::from(target & !1));
                return;
            }
            Fault::ThumbEeOutOfBounds => {
                let target = self.regs.teehbr.wrapping_sub(8);
                self.regs.set_pc_raw(u64::from(target & !1));
                return;
            }
            _ => {}
        }

        let aarch64_route = self.cfg.has(Feature::Arm64)
            && (self.ps.rw == RegWidth::R64
                || self.regs.scr_el3 & SCR_RW != 0
                || self.regs.hcr_el2 & HCR_RW != 0);
        if aarch64_route {
            self.enter_a64(fault);
        } else {
            self.enter_a32(fault);
        }
    }

    /// The return address the handler will see, per fault class.
    fn return_address(&self, fault: Fault) -> u64 {
        match fault {
            // Call-class and Undefined save the next instruction.
            Fault::Svc { .. } | Fault::Smc { .. } | Fault::Hvc { .. } | Fault::Undefined { .. } => {
                self.regs.pc()
            }
            Fault::PrefetchAbort { .. } | Fault::Breakpoint { .. } | Fault::SoftwareStep => {
                self.old_pc.wrapping_add(4)
            }
            Fault::Irq | Fault::Fiq => self.old_pc.wrapping_add(4),
            Fault::DataAbort { .. }
            | Fault::Unaligned { .. }
            | Fault::UnalignedPc { .. }
            | Fault::UnalignedSp { .. }
            | Fault::Address26 { .. }
            | Fault::SError => self.old_pc.wrapping_add(8),
            // Jazelle faults point at the bytecode itself.
            _ => self.old_pc,
        }
    }

    fn enter_a64(&mut self, fault: Fault) {
        let target = match fault {
            Fault::Smc { .. } => 3,
            Fault::Hvc { .. } => 2,
            _ => self.ps.el.max(1),
        }
        .min(self.highest_el());

        let class = match fault {
            Fault::Irq => A64_VECTOR_IRQ,
            Fault::Fiq => A64_VECTOR_FIQ,
            Fault::SError => A64_VECTOR_SERROR,
            _ => A64_VECTOR_SYNC,
        };
        let origin = if self.ps.rw != RegWidth::R64 {
            A64_ORIGIN_LOWER_A32
        } else if self.ps.el < target {
            A64_ORIGIN_LOWER_A64
        } else if self.ps.sp {
            A64_ORIGIN_CURRENT_SPX
        } else {
            A64_ORIGIN_CURRENT_SP0
        };

        let ra = match fault {
            Fault::Svc { .. } | Fault::Smc { .. } | Fault::Hvc { .. } => self.regs.pc(),
            Fault::Irq | Fault::Fiq | Fault::SError => self.regs.pc(),
            _ => self.old_pc,
        };
        self.regs.set_elr_el(target, ra);
        let spsr = self.ps.spsr_pack(&self.cfg);
        self.regs.set_spsr_el(target, spsr);

        self.ps.rw = RegWidth::R64;
        self.ps.el = target;
        self.ps.sp = true;
        self.ps.d = true;
        self.ps.a = true;
        self.ps.i = true;
        self.ps.f = true;
        self.ps.it = 0;
        self.ps.ss = false;
        self.ps.il = false;
        if self.regs.sctlr[target as usize] & SCTLR_SPAN == 0 {
            self.ps.pan = true;
        }

        self.regs
            .set_pc_raw(self.regs.vbar[target as usize] + class + origin);
    }

    fn enter_a32(&mut self, fault: Fault) {
        let Some(vector) = fault.a32_vector() else {
            return;
        };
        let mut mode = fault.a32_target_mode();
        if !crate::pstate::mode_implemented(&self.cfg, mode) {
            mode = Mode::Svc;
        }
        let ra = self.return_address(fault) as u32;

        // Pure 26-bit processors pack the PSR into the saved PC and have no
        // SPSR to capture.
        if !self.cfg.has(Feature::Arm32) {
            let mode26 = match mode {
                Mode::Fiq => Mode::Fiq26,
                Mode::Irq => Mode::Irq26,
                _ => Mode::Svc26,
            };
            let packed = self.ps.psr26(ra);
            self.regs.a32_set_mode(mode26, 14, packed);
            self.ps.mode = mode26;
            self.ps.rw = RegWidth::R26;
            self.ps.i = true;
            if matches!(fault, Fault::Reset | Fault::Fiq) {
                self.ps.f = true;
            }
            self.regs.set_pc_raw(vector);
            return;
        }

        let spsr = self.ps.cpsr(&self.cfg);
        self.ps.mode = mode;
        self.ps.rw = RegWidth::R32;
        self.regs.set_spsr_for_mode(mode, spsr);
        if mode == Mode::Hyp {
            self.regs.set_elr_el(2, u64::from(ra));
        } else {
            self.regs.a32_set_mode(mode, 14, ra);
        }

        self.ps.i = true;
        if matches!(fault, Fault::Reset | Fault::Fiq) {
            self.ps.f = true;
        }
        self.ps.it = 0;
        if self.cfg.version >= ArchVersion::V6 {
            self.ps.a = true;
            self.ps.e = self.regs.sctlr[1] & SCTLR_EE != 0;
        }
        let enter_thumb =
            self.cfg.version >= ArchVersion::V7 && self.regs.sctlr[1] & SCTLR_TE != 0;
        self.ps.set_jt_filtered(
            &self.cfg,
            if enter_thumb {
                InstrSet::Thumb
            } else {
                InstrSet::Arm
            },
        );
        if self.cfg.version >= ArchVersion::V8 {
            self.ps.ss = false;
            self.ps.il = false;
        }

        let base = if self.regs.sctlr[1] & SCTLR_V != 0 {
            A32_HIGH_VECTORS
        } else {
            0
        };
        self.regs.set_pc_raw(base + vector);
    }
}
