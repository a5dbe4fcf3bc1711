//! The AArch32 ARM decoder, shared by the 32-bit and 26-bit states.

use crate::consts::{ArchVersion, Feature, JMCR_JE, Mode, PSR26_PC};
use crate::coproc::CpOp;
use crate::exec::{
    add_with_carry, condition_passed, decode_imm_shift, expand_imm_c, shift_c, sign_extend,
    signed_sat, unsigned_sat, Shift,
};
use crate::fault::{ExecResult, Fault};
use crate::memory::Memory;
use crate::pstate::InstrSet;

/// Displacement of a stored R15 beyond the already-advanced PC. Hard-wired
/// to the ARM7-and-later choice for every version.
const STR_PC_EXTRA: u32 = 4;

impl<M: Memory> crate::core::Core<M> {
    pub(crate) fn step_arm(&mut self, arm26: bool) -> ExecResult<()> {
        let instr = self.fetch_arm()?;
        let cond = instr >> 28;
        if cond == 0xF {
            if !arm26 && self.cfg.version >= ArchVersion::V5 {
                return self.arm_unconditional(instr);
            }
            return Ok(()); // NV: never executed
        }
        if !condition_passed(cond, &self.ps) {
            return Ok(());
        }
        self.arm_exec(instr, arm26)
    }

    /// An ARM data operand read. In 26-bit state R15 reads as the PC merged
    /// with the PSR fields.
    fn arm_reg(&self, arm26: bool, reg: u32) -> u32 {
        if arm26 && reg == 15 {
            return self.ps.psr26(self.regs.pc() as u32 + 4);
        }
        self.regs.a32_get(&self.ps, reg)
    }

    /// The value a store of R15 writes to memory.
    fn stored_pc(&self, arm26: bool) -> u32 {
        let pc = self.regs.pc() as u32 + STR_PC_EXTRA;
        if arm26 {
            self.ps.psr26(pc)
        } else {
            pc
        }
    }

    fn arm_exec(&mut self, instr: u32, arm26: bool) -> ExecResult<()> {
        match (instr >> 25) & 0x7 {
            0b000 => self.arm_group_000(instr, arm26),
            0b001 => self.arm_group_001(instr, arm26),
            0b010 => self.arm_ldst(instr, false, arm26),
            0b011 => {
                if instr & 0x10 == 0 {
                    self.arm_ldst(instr, true, arm26)
                } else {
                    self.arm_media(instr)
                }
            }
            0b100 => self.arm_block(instr, arm26),
            0b101 => self.arm_branch(instr, arm26),
            0b110 => self.arm_ldc_stc_mcrr(instr),
            _ => {
                if instr & (1 << 24) != 0 {
                    Err(Fault::Svc {
                        imm: instr & 0x00FF_FFFF,
                    })
                } else {
                    self.arm_cdp_mcr_mrc(instr)
                }
            }
        }
    }

    // ---- group 000: data processing (register), multiplies, sync,
    //      halfword transfers and the miscellaneous space ----

    fn arm_group_000(&mut self, instr: u32, arm26: bool) -> ExecResult<()> {
        if instr & 0x90 == 0x90 {
            if instr & 0x60 == 0 {
                // bits 7:4 = 1001
                if instr & (1 << 24) == 0 {
                    return self.arm_multiply(instr);
                }
                return self.arm_sync(instr);
            }
            return self.arm_ldst_misc(instr, arm26);
        }
        if (instr >> 23) & 0x3 == 0b10 && instr & (1 << 20) == 0 {
            return self.arm_misc(instr, arm26);
        }
        let (op2, carry) = self.arm_shifter_operand(instr, arm26);
        self.arm_dp(instr, op2, carry, arm26)
    }

    fn arm_shifter_operand(&mut self, instr: u32, arm26: bool) -> (u32, bool) {
        let rm = self.arm_reg(arm26, instr & 0xF);
        if instr & 0x10 == 0 {
            let (shift, amount) = decode_imm_shift((instr >> 5) & 3, (instr >> 7) & 0x1F);
            shift_c(rm, shift, amount, self.ps.c)
        } else {
            // Shift by the low byte of Rs; a zero amount preserves the carry.
            let amount = self.arm_reg(arm26, (instr >> 8) & 0xF) & 0xFF;
            let shift = match (instr >> 5) & 3 {
                0 => Shift::Lsl,
                1 => Shift::Lsr,
                2 => Shift::Asr,
                _ => Shift::Ror,
            };
            shift_c(rm, shift, amount, self.ps.c)
        }
    }

    fn arm_dp(&mut self, instr: u32, op2: u32, shifter_carry: bool, arm26: bool) -> ExecResult<()> {
        let opcode = (instr >> 21) & 0xF;
        let s = instr & (1 << 20) != 0;
        let rn = (instr >> 16) & 0xF;
        let rd = (instr >> 12) & 0xF;
        let n = self.arm_reg(arm26, rn);
        let c = self.ps.c;

        enum Out {
            Logical(u32),
            Arith(u32, bool, bool),
        }
        let (out, writes_rd) = match opcode {
            0x0 => (Out::Logical(n & op2), true),
            0x1 => (Out::Logical(n ^ op2), true),
            0x2 => {
                let (r, co, v) = add_with_carry(n, !op2, true);
                (Out::Arith(r, co, v), true)
            }
            0x3 => {
                let (r, co, v) = add_with_carry(!n, op2, true);
                (Out::Arith(r, co, v), true)
            }
            0x4 => {
                let (r, co, v) = add_with_carry(n, op2, false);
                (Out::Arith(r, co, v), true)
            }
            0x5 => {
                let (r, co, v) = add_with_carry(n, op2, c);
                (Out::Arith(r, co, v), true)
            }
            0x6 => {
                let (r, co, v) = add_with_carry(n, !op2, c);
                (Out::Arith(r, co, v), true)
            }
            0x7 => {
                let (r, co, v) = add_with_carry(!n, op2, c);
                (Out::Arith(r, co, v), true)
            }
            0x8 => (Out::Logical(n & op2), false),
            0x9 => (Out::Logical(n ^ op2), false),
            0xA => {
                let (r, co, v) = add_with_carry(n, !op2, true);
                (Out::Arith(r, co, v), false)
            }
            0xB => {
                let (r, co, v) = add_with_carry(n, op2, false);
                (Out::Arith(r, co, v), false)
            }
            0xC => (Out::Logical(n | op2), true),
            0xD => (Out::Logical(op2), true),
            0xE => (Out::Logical(n & !op2), true),
            _ => (Out::Logical(!op2), true),
        };

        let result = match out {
            Out::Logical(r) | Out::Arith(r, _, _) => r,
        };

        if !writes_rd {
            // Comparison and test operations.
            if arm26 && rd == 15 {
                // TSTP/TEQP/CMPP/CMNP restore the PSR fields from the result.
                self.ps.write_psr26(&self.cfg, result);
                return Ok(());
            }
            match out {
                Out::Logical(r) => {
                    self.ps.n = r & 0x8000_0000 != 0;
                    self.ps.z = r == 0;
                    self.ps.c = shifter_carry;
                }
                Out::Arith(r, co, v) => {
                    self.ps.n = r & 0x8000_0000 != 0;
                    self.ps.z = r == 0;
                    self.ps.c = co;
                    self.ps.v = v;
                }
            }
            return Ok(());
        }

        if rd == 15 {
            if s {
                // Exception return: SPSR to CPSR, or the 26-bit PSR restore.
                if arm26 {
                    self.ps.write_psr26(&self.cfg, result);
                    self.regs.set_pc_raw(u64::from(result & PSR26_PC));
                } else {
                    let spsr = self.spsr_current()?;
                    self.exception_return_a32(result, spsr);
                }
            } else if arm26 {
                self.branch_to(result);
            } else if self.cfg.version >= ArchVersion::V7 {
                self.bx_write(result);
            } else {
                self.branch_to(result);
            }
            return Ok(());
        }

        self.regs.a32_set(&self.ps, rd, result);
        if s {
            match out {
                Out::Logical(r) => {
                    self.ps.n = r & 0x8000_0000 != 0;
                    self.ps.z = r == 0;
                    self.ps.c = shifter_carry;
                }
                Out::Arith(r, co, v) => {
                    self.ps.n = r & 0x8000_0000 != 0;
                    self.ps.z = r == 0;
                    self.ps.c = co;
                    self.ps.v = v;
                }
            }
        }
        Ok(())
    }

    fn set_nz(&mut self, result: u32) {
        self.ps.n = result & 0x8000_0000 != 0;
        self.ps.z = result == 0;
    }

    fn set_nz64(&mut self, result: u64) {
        self.ps.n = result & 0x8000_0000_0000_0000 != 0;
        self.ps.z = result == 0;
    }

    fn arm_multiply(&mut self, instr: u32) -> ExecResult<()> {
        let op = (instr >> 21) & 0x7;
        let s = instr & (1 << 20) != 0;
        let rd = (instr >> 16) & 0xF;
        let ra = (instr >> 12) & 0xF;
        let rs = self.regs.a32_get(&self.ps, (instr >> 8) & 0xF);
        let rm = self.regs.a32_get(&self.ps, instr & 0xF);
        match op {
            0b000 => {
                self.require_version(ArchVersion::V2)?;
                let r = rm.wrapping_mul(rs);
                self.regs.a32_set(&self.ps, rd, r);
                if s {
                    self.set_nz(r);
                }
            }
            0b001 => {
                self.require_version(ArchVersion::V2)?;
                let acc = self.regs.a32_get(&self.ps, ra);
                let r = rm.wrapping_mul(rs).wrapping_add(acc);
                self.regs.a32_set(&self.ps, rd, r);
                if s {
                    self.set_nz(r);
                }
            }
            0b010 => {
                // UMAAL
                self.require_version(ArchVersion::V6)?;
                let hi = u64::from(self.regs.a32_get(&self.ps, rd));
                let lo = u64::from(self.regs.a32_get(&self.ps, ra));
                let r = u64::from(rm) * u64::from(rs) + hi + lo;
                self.regs.a32_set(&self.ps, ra, r as u32);
                self.regs.a32_set(&self.ps, rd, (r >> 32) as u32);
            }
            0b011 => {
                // MLS
                self.require_feature(Feature::Thumb2)?;
                let acc = self.regs.a32_get(&self.ps, ra);
                let r = acc.wrapping_sub(rm.wrapping_mul(rs));
                self.regs.a32_set(&self.ps, rd, r);
            }
            _ => {
                self.require_feature(Feature::Mull)?;
                let signed = op & 0b010 != 0;
                let accumulate = op & 0b001 != 0;
                let product = if signed {
                    (i64::from(rm as i32) * i64::from(rs as i32)) as u64
                } else {
                    u64::from(rm) * u64::from(rs)
                };
                let acc = if accumulate {
                    u64::from(self.regs.a32_get(&self.ps, rd)) << 32
                        | u64::from(self.regs.a32_get(&self.ps, ra))
                } else {
                    0
                };
                let r = product.wrapping_add(acc);
                self.regs.a32_set(&self.ps, ra, r as u32);
                self.regs.a32_set(&self.ps, rd, (r >> 32) as u32);
                if s {
                    self.set_nz64(r);
                }
            }
        }
        Ok(())
    }

    fn arm_sync(&mut self, instr: u32) -> ExecResult<()> {
        let op = (instr >> 20) & 0xF;
        let rn = (instr >> 16) & 0xF;
        let rd = (instr >> 12) & 0xF;
        let rm = instr & 0xF;
        let addr = self.regs.a32_get(&self.ps, rn);
        let privileged = self.ps.privileged();
        match op {
            0b0000 | 0b0100 => {
                // SWP / SWPB
                self.require_feature(Feature::Swp)?;
                let byte = op == 0b0100;
                let size = if byte { 1 } else { 4 };
                let loaded = self.a32_read(addr, size, privileged)?;
                let value = self.regs.a32_get(&self.ps, rm);
                self.a32_write(addr, size, u64::from(value), privileged)?;
                self.regs.a32_set(&self.ps, rd, loaded as u32);
            }
            0b1000..=0b1111 => {
                self.require_version(ArchVersion::V6)?;
                let load = op & 1 != 0;
                let (size, pair) = match op >> 1 {
                    0b100 => (4u32, false),
                    0b101 => (4, true),
                    0b110 => (1, false),
                    _ => (2, false),
                };
                let total = if pair { 8 } else { size };
                if addr & (total - 1) != 0 {
                    return Err(Fault::Unaligned {
                        addr: u64::from(addr),
                    });
                }
                if load {
                    self.regs.monitor.reserve(u64::from(addr), u64::from(total));
                    if pair {
                        let lo = self.a32_read(addr, 4, privileged)?;
                        let hi = self.a32_read(addr + 4, 4, privileged)?;
                        self.regs.a32_set(&self.ps, rd, lo as u32);
                        self.regs.a32_set(&self.ps, rd + 1, hi as u32);
                    } else {
                        let v = self.a32_read(addr, size, privileged)?;
                        self.regs.a32_set(&self.ps, rd, v as u32);
                    }
                } else {
                    // STREX writes Rd with the success flag.
                    if self.regs.monitor.covers(u64::from(addr), u64::from(total)) {
                        if pair {
                            let lo = self.regs.a32_get(&self.ps, rm);
                            let hi = self.regs.a32_get(&self.ps, rm + 1);
                            self.a32_write(addr, 4, u64::from(lo), privileged)?;
                            self.a32_write(addr + 4, 4, u64::from(hi), privileged)?;
                        } else {
                            let v = self.regs.a32_get(&self.ps, rm);
                            self.a32_write(addr, size, u64::from(v), privileged)?;
                        }
                        self.regs.monitor.clear();
                        self.regs.a32_set(&self.ps, rd, 0);
                    } else {
                        self.regs.a32_set(&self.ps, rd, 1);
                    }
                }
            }
            _ => return Err(self.undef()),
        }
        Ok(())
    }

    fn arm_ldst_misc(&mut self, instr: u32, arm26: bool) -> ExecResult<()> {
        self.require_version(ArchVersion::V4)?;
        let p = instr & (1 << 24) != 0;
        let u = instr & (1 << 23) != 0;
        let imm_form = instr & (1 << 22) != 0;
        let w = instr & (1 << 21) != 0;
        let l = instr & (1 << 20) != 0;
        let rn = (instr >> 16) & 0xF;
        let rd = (instr >> 12) & 0xF;
        let op2 = (instr >> 5) & 0x3;
        let privileged = self.ps.privileged();

        let offset = if imm_form {
            ((instr >> 4) & 0xF0) | (instr & 0xF)
        } else {
            self.regs.a32_get(&self.ps, instr & 0xF)
        };
        let base = if rn == 15 {
            (self.regs.pc() as u32 + 4) & !3
        } else {
            self.regs.a32_get(&self.ps, rn)
        };
        let offset_addr = if u {
            base.wrapping_add(offset)
        } else {
            base.wrapping_sub(offset)
        };
        let addr = if p { offset_addr } else { base };

        let dual = !l && op2 != 0b01;
        let dual_load = dual && op2 == 0b10;
        if dual {
            self.require_feature(Feature::EnhDsp)?;
            if rd & 1 != 0 || rd == 14 {
                return Err(self.undef());
            }
            let load = op2 == 0b10;
            let addr = self.align_dual(addr)?;
            if load {
                let lo = self.a32_read(addr, 4, privileged)?;
                let hi = self.a32_read(addr.wrapping_add(4), 4, privileged)?;
                self.regs.a32_set(&self.ps, rd, lo as u32);
                self.regs.a32_set(&self.ps, rd + 1, hi as u32);
            } else {
                let lo = self.regs.a32_get(&self.ps, rd);
                let hi = self.regs.a32_get(&self.ps, rd + 1);
                self.a32_write(addr, 4, u64::from(lo), privileged)?;
                self.a32_write(addr.wrapping_add(4), 4, u64::from(hi), privileged)?;
            }
        } else if l {
            let value = match op2 {
                0b01 => self.a32_read(addr, 2, privileged)? as u32,
                0b10 => sign_extend(self.a32_read(addr, 1, privileged)? as u32, 8),
                _ => sign_extend(self.a32_read(addr, 2, privileged)? as u32, 16),
            };
            if rd == 15 {
                self.branch_to(value);
            } else {
                self.regs.a32_set(&self.ps, rd, value);
            }
        } else {
            let value = if rd == 15 {
                self.stored_pc(arm26)
            } else {
                self.regs.a32_get(&self.ps, rd)
            };
            self.a32_write(addr, 2, u64::from(value), privileged)?;
        }

        let load_into_base =
            (l && rn == rd) || (dual_load && (rn == rd || rn == rd + 1));
        if rn != 15 && (!p || w) && !load_into_base {
            self.regs.a32_set(&self.ps, rn, offset_addr);
        }
        Ok(())
    }

    fn align_dual(&self, addr: u32) -> ExecResult<u32> {
        if self.cfg.version >= ArchVersion::V7 {
            if addr & 7 != 0 && self.sctlr_a() {
                return Err(Fault::Unaligned {
                    addr: u64::from(addr),
                });
            }
            Ok(addr & !3)
        } else {
            Ok(addr & !3)
        }
    }

    fn arm_misc(&mut self, instr: u32, arm26: bool) -> ExecResult<()> {
        let op21 = (instr >> 21) & 0x3;
        match (instr >> 4) & 0xF {
            0b0000 => {
                // MRS / MSR (register)
                self.require_version(ArchVersion::V3)?;
                let spsr = instr & (1 << 22) != 0;
                if op21 & 1 == 0 {
                    let rd = (instr >> 12) & 0xF;
                    let value = if spsr {
                        self.spsr_current()?
                    } else if arm26 {
                        self.ps.psr26(0) // flag word without the PC
                    } else {
                        self.ps.cpsr(&self.cfg)
                    };
                    self.regs.a32_set(&self.ps, rd, value);
                } else {
                    let mask = ((instr >> 16) & 0xF) as u8;
                    let value = self.regs.a32_get(&self.ps, instr & 0xF);
                    self.write_psr(spsr, mask, value)?;
                }
                Ok(())
            }
            0b0001 => {
                if op21 == 0b01 {
                    self.require_feature(Feature::Thumb)?;
                    let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                    self.bx_write(rm);
                    Ok(())
                } else if op21 == 0b11 {
                    self.require_version(ArchVersion::V5)?;
                    let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                    self.regs
                        .a32_set(&self.ps, (instr >> 12) & 0xF, rm.leading_zeros());
                    Ok(())
                } else {
                    Err(self.undef())
                }
            }
            0b0010 if op21 == 0b01 => {
                // BXJ
                self.require_feature(Feature::Jazelle)?;
                let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                if self.cfg.supports_isa(crate::consts::Isa::Jazelle)
                    && self.regs.jmcr & JMCR_JE != 0
                {
                    self.ps.jt = InstrSet::Jazelle;
                    self.regs.set_pc_raw(u64::from(rm));
                } else {
                    self.bx_write(rm);
                }
                Ok(())
            }
            0b0011 if op21 == 0b01 => {
                self.require_version(ArchVersion::V5)?;
                let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                let ret = self.regs.pc() as u32;
                let lr = if arm26 { self.ps.psr26(ret) } else { ret };
                self.regs.a32_set(&self.ps, 14, lr);
                self.bx_write(rm);
                Ok(())
            }
            0b0101 => {
                // QADD / QSUB / QDADD / QDSUB
                self.require_feature(Feature::EnhDsp)?;
                let rm = self.regs.a32_get(&self.ps, instr & 0xF) as i32;
                let rn = self.regs.a32_get(&self.ps, (instr >> 16) & 0xF) as i32;
                let (doubled, sat1) = if op21 & 0b10 != 0 {
                    signed_sat(i64::from(rn) * 2, 32)
                } else {
                    (rn, false)
                };
                let value = if op21 & 0b01 != 0 {
                    i64::from(rm) - i64::from(doubled)
                } else {
                    i64::from(rm) + i64::from(doubled)
                };
                let (result, sat2) = signed_sat(value, 32);
                if sat1 || sat2 {
                    self.ps.q = true;
                }
                self.regs
                    .a32_set(&self.ps, (instr >> 12) & 0xF, result as u32);
                Ok(())
            }
            0b0110 if op21 == 0b11 => {
                // ERET
                self.require_feature(Feature::Virtualization)?;
                let spsr = self.spsr_current()?;
                let ret = if self.ps.mode == Mode::Hyp {
                    self.regs.elr_el(2) as u32
                } else {
                    self.regs.a32_get(&self.ps, 14)
                };
                self.exception_return_a32(ret, spsr);
                Ok(())
            }
            0b0111 => match op21 {
                0b01 => {
                    self.require_version(ArchVersion::V5)?;
                    Err(Fault::Breakpoint {
                        imm: ((instr >> 4) & 0xFFF0) | (instr & 0xF),
                    })
                }
                0b10 => {
                    self.require_feature(Feature::Virtualization)?;
                    if !self.ps.privileged() {
                        return Err(self.undef());
                    }
                    Err(Fault::Hvc {
                        imm: ((instr >> 4) & 0xFFF0) | (instr & 0xF),
                    })
                }
                0b11 => {
                    self.require_feature(Feature::Security)?;
                    if !self.ps.privileged() {
                        return Err(self.undef());
                    }
                    Err(Fault::Smc { imm: instr & 0xF })
                }
                _ => Err(self.undef()),
            },
            0b1000 | 0b1010 | 0b1100 | 0b1110 => self.arm_dsp_multiply(instr),
            _ => Err(self.undef()),
        }
    }

    fn write_psr(&mut self, spsr: bool, mask: u8, value: u32) -> ExecResult<()> {
        if spsr {
            let current = self.spsr_current()?;
            let mut merged = current;
            for byte in 0..4 {
                if mask & (1 << byte) != 0 {
                    let m = 0xFFu32 << (byte * 8);
                    merged = (merged & !m) | (value & m);
                }
            }
            self.set_spsr_current(merged);
        } else {
            self.ps.write_cpsr(&self.cfg, value, mask, false);
        }
        Ok(())
    }

    fn arm_dsp_multiply(&mut self, instr: u32) -> ExecResult<()> {
        self.require_feature(Feature::EnhDsp)?;
        let class = (instr >> 21) & 0x3;
        let rd = (instr >> 16) & 0xF;
        let ra = (instr >> 12) & 0xF;
        let rs = self.regs.a32_get(&self.ps, (instr >> 8) & 0xF);
        let rm = self.regs.a32_get(&self.ps, instr & 0xF);
        let x = instr & (1 << 5) != 0;
        let y = instr & (1 << 6) != 0;
        let half = |v: u32, top: bool| -> i32 {
            if top {
                (v >> 16) as i16 as i32
            } else {
                v as i16 as i32
            }
        };
        match class {
            0b00 => {
                // SMLAxy
                let product = half(rm, x) as i64 * half(rs, y) as i64;
                let acc = self.regs.a32_get(&self.ps, ra) as i32 as i64;
                let sum = product + acc;
                if sum != i64::from(sum as i32) {
                    self.ps.q = true;
                }
                self.regs.a32_set(&self.ps, rd, sum as u32);
            }
            0b01 => {
                // SMLAWy / SMULWy
                let product = (i64::from(rm as i32) * i64::from(half(rs, y))) >> 16;
                if x {
                    self.regs.a32_set(&self.ps, rd, product as u32);
                } else {
                    let acc = self.regs.a32_get(&self.ps, ra) as i32 as i64;
                    let sum = product + acc;
                    if sum != i64::from(sum as i32) {
                        self.ps.q = true;
                    }
                    self.regs.a32_set(&self.ps, rd, sum as u32);
                }
            }
            0b10 => {
                // SMLALxy
                let product = half(rm, x) as i64 * half(rs, y) as i64;
                let acc = (i64::from(self.regs.a32_get(&self.ps, rd) as i32) << 32)
                    | i64::from(self.regs.a32_get(&self.ps, ra));
                let sum = acc.wrapping_add(product);
                self.regs.a32_set(&self.ps, ra, sum as u32);
                self.regs.a32_set(&self.ps, rd, (sum >> 32) as u32);
            }
            _ => {
                // SMULxy
                let product = half(rm, x) as i64 * half(rs, y) as i64;
                self.regs.a32_set(&self.ps, rd, product as u32);
            }
        }
        Ok(())
    }

    // ---- group 001: data processing (immediate), MSR immediate,
    //      MOVW/MOVT and hints ----

    fn arm_group_001(&mut self, instr: u32, arm26: bool) -> ExecResult<()> {
        let opcode = (instr >> 21) & 0xF;
        let s = instr & (1 << 20) != 0;
        if (0x8..=0xB).contains(&opcode) && !s {
            match opcode {
                0x8 => {
                    // MOVW
                    self.require_feature(Feature::Thumb2)?;
                    let imm = ((instr >> 4) & 0xF000) | (instr & 0xFFF);
                    self.regs.a32_set(&self.ps, (instr >> 12) & 0xF, imm);
                    return Ok(());
                }
                0xA => {
                    // MOVT
                    self.require_feature(Feature::Thumb2)?;
                    let imm = ((instr >> 4) & 0xF000) | (instr & 0xFFF);
                    let rd = (instr >> 12) & 0xF;
                    let low = self.regs.a32_get(&self.ps, rd) & 0xFFFF;
                    self.regs.a32_set(&self.ps, rd, imm << 16 | low);
                    return Ok(());
                }
                _ => {
                    // MSR immediate; a zero mask is the hint space (NOP,
                    // YIELD, WFE, WFI, SEV), all architectural no-ops here.
                    self.require_version(ArchVersion::V3)?;
                    let mask = ((instr >> 16) & 0xF) as u8;
                    if mask == 0 {
                        return Ok(());
                    }
                    let (value, _) = expand_imm_c(instr & 0xFFF, self.ps.c);
                    return self.write_psr(instr & (1 << 22) != 0, mask, value);
                }
            }
        }
        let (op2, carry) = expand_imm_c(instr & 0xFFF, self.ps.c);
        self.arm_dp(instr, op2, carry, arm26)
    }

    // ---- single load/store ----

    fn arm_ldst(&mut self, instr: u32, reg_offset: bool, arm26: bool) -> ExecResult<()> {
        let p = instr & (1 << 24) != 0;
        let u = instr & (1 << 23) != 0;
        let byte = instr & (1 << 22) != 0;
        let w = instr & (1 << 21) != 0;
        let l = instr & (1 << 20) != 0;
        let rn = (instr >> 16) & 0xF;
        let rd = (instr >> 12) & 0xF;

        let offset = if reg_offset {
            let rm = self.regs.a32_get(&self.ps, instr & 0xF);
            let (shift, amount) = decode_imm_shift((instr >> 5) & 3, (instr >> 7) & 0x1F);
            shift_c(rm, shift, amount, self.ps.c).0
        } else {
            instr & 0xFFF
        };
        let base = if rn == 15 {
            (self.regs.pc() as u32 + 4) & !3
        } else {
            self.regs.a32_get(&self.ps, rn)
        };
        let offset_addr = if u {
            base.wrapping_add(offset)
        } else {
            base.wrapping_sub(offset)
        };
        let addr = if p { offset_addr } else { base };
        // The T variants (post-indexed with W set) force an unprivileged
        // access.
        let privileged = if !p && w {
            false
        } else {
            self.ps.privileged()
        };

        if l {
            let value = if byte {
                self.a32_read(addr, 1, privileged)? as u32
            } else {
                self.a32_read(addr, 4, privileged)? as u32
            };
            if rn != 15 && (!p || w) && rn != rd {
                self.regs.a32_set(&self.ps, rn, offset_addr);
            }
            if rd == 15 {
                if arm26 {
                    self.branch_to(value);
                } else if self.cfg.version >= ArchVersion::V5 {
                    self.bx_write(value);
                } else {
                    self.branch_to(value);
                }
            } else {
                self.regs.a32_set(&self.ps, rd, value);
            }
        } else {
            let value = if rd == 15 {
                self.stored_pc(arm26)
            } else {
                self.regs.a32_get(&self.ps, rd)
            };
            if byte {
                self.a32_write(addr, 1, u64::from(value), privileged)?;
            } else {
                self.a32_write(addr, 4, u64::from(value), privileged)?;
            }
            if rn != 15 && (!p || w) {
                self.regs.a32_set(&self.ps, rn, offset_addr);
            }
        }
        Ok(())
    }

    // ---- block transfer ----

    fn arm_block(&mut self, instr: u32, arm26: bool) -> ExecResult<()> {
        let p = instr & (1 << 24) != 0;
        let u = instr & (1 << 23) != 0;
        let s = instr & (1 << 22) != 0;
        let w = instr & (1 << 21) != 0;
        let l = instr & (1 << 20) != 0;
        let rn = (instr >> 16) & 0xF;
        let list = instr & 0xFFFF;
        if list == 0 {
            return Ok(());
        }
        let count = list.count_ones();
        let base = self.regs.a32_get(&self.ps, rn);
        let (start, wb) = match (p, u) {
            (false, true) => (base, base.wrapping_add(4 * count)),
            (true, true) => (base.wrapping_add(4), base.wrapping_add(4 * count)),
            (false, false) => (
                base.wrapping_sub(4 * count).wrapping_add(4),
                base.wrapping_sub(4 * count),
            ),
            (true, false) => (base.wrapping_sub(4 * count), base.wrapping_sub(4 * count)),
        };
        let privileged = self.ps.privileged();
        let has_pc = list & 0x8000 != 0;
        let user_bank = s && !(l && has_pc);
        let exception_return = l && s && has_pc;
        let lowest = list.trailing_zeros();

        let mut addr = start;
        for reg in 0..16u32 {
            if list & (1 << reg) == 0 {
                continue;
            }
            if l {
                let value = self.a32_read_word_aligned(addr, privileged)?;
                if reg == 15 {
                    if exception_return {
                        if arm26 || !self.cfg.has(Feature::Arm32) {
                            self.ps.write_psr26(&self.cfg, value);
                            self.regs.set_pc_raw(u64::from(value & PSR26_PC));
                        } else {
                            let spsr = self.spsr_current()?;
                            self.exception_return_a32(value, spsr);
                        }
                    } else if !arm26 && self.cfg.version >= ArchVersion::V5 {
                        self.bx_write(value);
                    } else {
                        self.branch_to(value);
                    }
                } else if user_bank {
                    self.regs.a32_set_mode(Mode::Usr, reg, value);
                } else {
                    self.regs.a32_set(&self.ps, reg, value);
                }
            } else {
                let value = if reg == 15 {
                    self.stored_pc(arm26)
                } else if reg == rn && w && reg != lowest {
                    wb
                } else if user_bank {
                    self.regs.a32_get_mode(Mode::Usr, reg)
                } else {
                    self.regs.a32_get(&self.ps, reg)
                };
                self.a32_write_word_aligned(addr, value, privileged)?;
            }
            addr = addr.wrapping_add(4);
        }

        if w && rn != 15 && !(l && list & (1 << rn) != 0) {
            self.regs.a32_set(&self.ps, rn, wb);
        }
        Ok(())
    }

    // ---- branches ----

    fn arm_branch(&mut self, instr: u32, arm26: bool) -> ExecResult<()> {
        let link = instr & (1 << 24) != 0;
        let offset = sign_extend(instr & 0x00FF_FFFF, 24) << 2;
        let target = (self.regs.pc() as u32)
            .wrapping_add(4)
            .wrapping_add(offset);
        if link {
            let ret = self.regs.pc() as u32;
            let lr = if arm26 { self.ps.psr26(ret) } else { ret };
            self.regs.a32_set(&self.ps, 14, lr);
        }
        self.branch_to(target);
        Ok(())
    }

    // ---- the v5+ unconditional space ----

    fn arm_unconditional(&mut self, instr: u32) -> ExecResult<()> {
        match (instr >> 25) & 0x7 {
            0b000 => {
                if (instr >> 20) & 0xFF == 0x10 {
                    if (instr >> 16) & 0xF == 0x1 && instr & (1 << 17) == 0 {
                        // SETEND
                        self.require_version(ArchVersion::V6)?;
                        self.ps.e = instr & (1 << 9) != 0;
                        return Ok(());
                    }
                    // CPS
                    self.require_version(ArchVersion::V6)?;
                    if !self.ps.privileged() {
                        return Ok(());
                    }
                    let imod = (instr >> 18) & 0x3;
                    let affect_mode = instr & (1 << 17) != 0;
                    if imod & 0b10 != 0 {
                        let enable = imod == 0b10;
                        if instr & (1 << 8) != 0 {
                            self.ps.a = !enable;
                        }
                        if instr & (1 << 7) != 0 {
                            self.ps.i = !enable;
                        }
                        if instr & (1 << 6) != 0 {
                            self.ps.f = !enable;
                        }
                    }
                    if affect_mode {
                        if let Some(mode) = self.mode_from_bits(instr & 0x1F) {
                            self.ps.mode = mode;
                        }
                    }
                    return Ok(());
                }
                Err(self.undef())
            }
            0b010 | 0b011 => {
                // PLD/PLI and friends: memory hints with no architectural
                // effect here.
                Ok(())
            }
            0b100 => {
                self.require_version(ArchVersion::V6)?;
                if instr & (1 << 20) != 0 {
                    self.arm_rfe(instr)
                } else {
                    self.arm_srs(instr)
                }
            }
            0b101 => {
                // BLX (immediate): always switches to Thumb.
                let h = (instr >> 24) & 1;
                let offset = (sign_extend(instr & 0x00FF_FFFF, 24) << 2) | (h << 1);
                let target = (self.regs.pc() as u32)
                    .wrapping_add(4)
                    .wrapping_add(offset);
                let ret = self.regs.pc() as u32;
                self.regs.a32_set(&self.ps, 14, ret);
                self.ps.set_jt_filtered(&self.cfg, InstrSet::Thumb);
                self.branch_to(target | 1);
                Ok(())
            }
            0b110 => {
                if (instr >> 20) & 0xFF == 0x57 {
                    return match (instr >> 4) & 0xF {
                        0x1 => {
                            // CLREX
                            self.regs.monitor.clear();
                            Ok(())
                        }
                        // DSB/DMB/ISB: no observable effect single-threaded.
                        0x4 | 0x5 | 0x6 => Ok(()),
                        _ => Err(self.undef()),
                    };
                }
                self.arm_ldc_stc_mcrr(instr)
            }
            _ => {
                if instr & (1 << 24) == 0 {
                    self.arm_cdp_mcr_mrc(instr)
                } else {
                    Err(self.undef())
                }
            }
        }
    }

    fn arm_rfe(&mut self, instr: u32) -> ExecResult<()> {
        let p = instr & (1 << 24) != 0;
        let u = instr & (1 << 23) != 0;
        let w = instr & (1 << 21) != 0;
        let rn = (instr >> 16) & 0xF;
        if !self.ps.privileged() {
            return Err(self.undef());
        }
        let base = self.regs.a32_get(&self.ps, rn);
        let (start, wb) = match (p, u) {
            (false, true) => (base, base.wrapping_add(8)),
            (true, true) => (base.wrapping_add(4), base.wrapping_add(8)),
            (false, false) => (base.wrapping_sub(4), base.wrapping_sub(8)),
            (true, false) => (base.wrapping_sub(8), base.wrapping_sub(8)),
        };
        let privileged = self.ps.privileged();
        let pc = self.a32_read_word_aligned(start, privileged)?;
        let spsr = self.a32_read_word_aligned(start.wrapping_add(4), privileged)?;
        if w {
            self.regs.a32_set(&self.ps, rn, wb);
        }
        self.exception_return_a32(pc, spsr);
        Ok(())
    }

    fn arm_srs(&mut self, instr: u32) -> ExecResult<()> {
        let p = instr & (1 << 24) != 0;
        let u = instr & (1 << 23) != 0;
        let w = instr & (1 << 21) != 0;
        if !self.ps.privileged() {
            return Err(self.undef());
        }
        let Some(mode) = self.mode_from_bits(instr & 0x1F) else {
            return Err(self.undef());
        };
        let base = self.regs.a32_get_mode(mode, 13);
        let (start, wb) = match (p, u) {
            (false, true) => (base, base.wrapping_add(8)),
            (true, true) => (base.wrapping_add(4), base.wrapping_add(8)),
            (false, false) => (base.wrapping_sub(4), base.wrapping_sub(8)),
            (true, false) => (base.wrapping_sub(8), base.wrapping_sub(8)),
        };
        let lr = self.regs.a32_get(&self.ps, 14);
        let spsr = self.spsr_current()?;
        let privileged = self.ps.privileged();
        self.a32_write_word_aligned(start, lr, privileged)?;
        self.a32_write_word_aligned(start.wrapping_add(4), spsr, privileged)?;
        if w {
            self.regs.a32_set_mode(mode, 13, wb);
        }
        Ok(())
    }

    // ---- the coprocessor gateway ----

    pub(crate) fn arm_ldc_stc_mcrr(&mut self, instr: u32) -> ExecResult<()> {
        let cp = (instr >> 8) & 0xF;
        if (instr >> 21) & 0xF == 0b0010 && instr & (1 << 24) == 0 {
            // MCRR / MRRC
            self.require_feature(Feature::EnhDsp)?;
            let load = instr & (1 << 20) != 0;
            let rt = (instr >> 12) & 0xF;
            let rt2 = (instr >> 16) & 0xF;
            let opc = ((instr >> 4) & 0xF) as u8;
            let crm = (instr & 0xF) as u8;
            if load {
                let (lo, hi) = self.cp_mrrc(cp, opc, crm)?;
                self.regs.a32_set(&self.ps, rt, lo);
                self.regs.a32_set(&self.ps, rt2, hi);
            } else {
                let lo = self.regs.a32_get(&self.ps, rt);
                let hi = self.regs.a32_get(&self.ps, rt2);
                self.cp_mcrr(cp, opc, crm, lo, hi)?;
            }
            return Ok(());
        }

        let p = instr & (1 << 24) != 0;
        let u = instr & (1 << 23) != 0;
        let w = instr & (1 << 21) != 0;
        let load = instr & (1 << 20) != 0;
        let rn = (instr >> 16) & 0xF;
        let crd = ((instr >> 12) & 0xF) as u8;
        let offset = (instr & 0xFF) << 2;
        let base = if rn == 15 {
            (self.regs.pc() as u32 + 4) & !3
        } else {
            self.regs.a32_get(&self.ps, rn)
        };
        let offset_addr = if u {
            base.wrapping_add(offset)
        } else {
            base.wrapping_sub(offset)
        };
        let addr = if p { offset_addr } else { base };
        let privileged = self.ps.privileged();
        if load {
            self.cp_ldc(cp, crd, addr, privileged)?;
        } else {
            self.cp_stc(cp, crd, addr, privileged)?;
        }
        if (w || !p) && rn != 15 {
            self.regs.a32_set(&self.ps, rn, offset_addr);
        }
        Ok(())
    }

    pub(crate) fn arm_cdp_mcr_mrc(&mut self, instr: u32) -> ExecResult<()> {
        let cp = (instr >> 8) & 0xF;
        let op = CpOp {
            opc1: ((instr >> 21) & 0x7) as u8,
            crd: ((instr >> 12) & 0xF) as u8,
            crn: ((instr >> 16) & 0xF) as u8,
            crm: (instr & 0xF) as u8,
            opc2: ((instr >> 5) & 0x7) as u8,
        };
        if instr & 0x10 == 0 {
            let op = CpOp {
                opc1: ((instr >> 20) & 0xF) as u8,
                ..op
            };
            return self.cp_cdp(cp, &op);
        }
        let rt = (instr >> 12) & 0xF;
        if instr & (1 << 20) != 0 {
            let value = self.cp_mrc(cp, &op)?;
            if rt == 15 {
                // MRC to APSR_nzcv.
                self.ps.set_nzcv(value);
            } else {
                self.regs.a32_set(&self.ps, rt, value);
            }
        } else {
            let value = self.regs.a32_get(&self.ps, rt);
            self.cp_mcr(cp, &op, value)?;
        }
        Ok(())
    }

    // ---- v6 media space ----

    fn arm_media(&mut self, instr: u32) -> ExecResult<()> {
        self.require_version(ArchVersion::V6)?;
        let op1 = (instr >> 20) & 0x1F;
        let op2 = (instr >> 5) & 0x7;
        let rd = (instr >> 12) & 0xF;
        let rn_num = (instr >> 16) & 0xF;
        match op1 {
            0b00001 | 0b00010 | 0b00011 | 0b00101 | 0b00110 | 0b00111 => {
                self.arm_parallel(instr)
            }
            0b01000 => match (instr >> 4) & 0xF {
                x if x & 0b0011 == 0b0001 => {
                    // PKHBT / PKHTB
                    let tb = instr & (1 << 6) != 0;
                    let rn = self.regs.a32_get(&self.ps, rn_num);
                    let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                    let imm5 = (instr >> 7) & 0x1F;
                    let result = if tb {
                        let shifted =
                            shift_c(rm, Shift::Asr, if imm5 == 0 { 32 } else { imm5 }, false).0;
                        (rn & 0xFFFF_0000) | (shifted & 0xFFFF)
                    } else {
                        let shifted = rm << imm5;
                        (shifted & 0xFFFF_0000) | (rn & 0xFFFF)
                    };
                    self.regs.a32_set(&self.ps, rd, result);
                    Ok(())
                }
                0b1011 => {
                    // SEL
                    let rn = self.regs.a32_get(&self.ps, rn_num);
                    let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                    let mut result = 0u32;
                    for lane in 0..4 {
                        let src = if self.ps.ge & (1 << lane) != 0 { rn } else { rm };
                        result |= src & (0xFF << (lane * 8));
                    }
                    self.regs.a32_set(&self.ps, rd, result);
                    Ok(())
                }
                0b0111 => self.arm_extend(instr),
                _ => Err(self.undef()),
            },
            0b01010 | 0b01011 | 0b01110 | 0b01111 => match (instr >> 4) & 0xF {
                x if x & 0b0011 == 0b0001 => {
                    // SSAT / USAT
                    let unsigned = op1 & 0b00100 != 0;
                    let sat_bits = rn_num + if unsigned { 0 } else { 1 };
                    let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                    let imm5 = (instr >> 7) & 0x1F;
                    let operand = if instr & (1 << 6) != 0 {
                        shift_c(rm, Shift::Asr, if imm5 == 0 { 32 } else { imm5 }, false).0
                    } else {
                        rm << imm5
                    } as i32;
                    let (result, saturated) = if unsigned {
                        unsigned_sat(i64::from(operand), sat_bits)
                    } else {
                        let (r, sat) = signed_sat(i64::from(operand), sat_bits);
                        (r as u32, sat)
                    };
                    if saturated {
                        self.ps.q = true;
                    }
                    self.regs.a32_set(&self.ps, rd, result);
                    Ok(())
                }
                0b0011 => match op1 {
                    0b01010 | 0b01110 => {
                        // SSAT16 / USAT16
                        let unsigned = op1 & 0b00100 != 0;
                        let sat_bits = (rn_num & 0xF) + if unsigned { 0 } else { 1 };
                        let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                        let mut result = 0;
                        let mut saturated = false;
                        for half in 0..2 {
                            let lane = i64::from(sign_extend((rm >> (half * 16)) & 0xFFFF, 16) as i32);
                            let (v, sat) = if unsigned {
                                unsigned_sat(lane, sat_bits)
                            } else {
                                let (v, sat) = signed_sat(lane, sat_bits);
                                (v as u32, sat)
                            };
                            saturated |= sat;
                            result |= (v & 0xFFFF) << (half * 16);
                        }
                        if saturated {
                            self.ps.q = true;
                        }
                        self.regs.a32_set(&self.ps, rd, result);
                        Ok(())
                    }
                    0b01011 => {
                        // REV
                        let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                        self.regs.a32_set(&self.ps, rd, rm.swap_bytes());
                        Ok(())
                    }
                    _ => {
                        // RBIT
                        self.require_feature(Feature::Thumb2)?;
                        let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                        self.regs.a32_set(&self.ps, rd, rm.reverse_bits());
                        Ok(())
                    }
                },
                0b1011 => match op1 {
                    0b01011 => {
                        // REV16
                        let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                        let r = (rm & 0xFF00_FF00) >> 8 | (rm & 0x00FF_00FF) << 8;
                        self.regs.a32_set(&self.ps, rd, r);
                        Ok(())
                    }
                    0b01111 => {
                        // REVSH
                        let rm = self.regs.a32_get(&self.ps, instr & 0xF);
                        let r = sign_extend((rm as u16).swap_bytes() as u32, 16);
                        self.regs.a32_set(&self.ps, rd, r);
                        Ok(())
                    }
                    _ => Err(self.undef()),
                },
                0b0111 => self.arm_extend(instr),
                _ => Err(self.undef()),
            },
            0b01100 | 0b01101 => self.arm_extend(instr),
            0b10000 | 0b10100 => self.arm_dual_multiply(instr),
            0b10101 => {
                // SMMUL / SMMLA / SMMLS
                let round = instr & (1 << 5) != 0;
                let subtract = instr & (1 << 6) != 0;
                let ra = (instr >> 12) & 0xF;
                let rn = self.regs.a32_get(&self.ps, instr & 0xF) as i32;
                let rm = self.regs.a32_get(&self.ps, (instr >> 8) & 0xF) as i32;
                let rd_num = (instr >> 16) & 0xF;
                let product = i64::from(rn) * i64::from(rm);
                let acc = if ra == 15 && !subtract {
                    0
                } else {
                    i64::from(self.regs.a32_get(&self.ps, ra) as i32) << 32
                };
                let mut sum = if subtract { acc - product } else { acc + product };
                if round {
                    sum += 0x8000_0000;
                }
                self.regs.a32_set(&self.ps, rd_num, (sum >> 32) as u32);
                Ok(())
            }
            0b11000 if op2 == 0b000 => {
                // USAD8 / USADA8
                let ra = (instr >> 12) & 0xF;
                let rn = self.regs.a32_get(&self.ps, instr & 0xF);
                let rm = self.regs.a32_get(&self.ps, (instr >> 8) & 0xF);
                let mut sum: u32 = 0;
                for lane in 0..4 {
                    let a = (rn >> (lane * 8)) & 0xFF;
                    let b = (rm >> (lane * 8)) & 0xFF;
                    sum = sum.wrapping_add(a.abs_diff(b));
                }
                if ra != 15 {
                    sum = sum.wrapping_add(self.regs.a32_get(&self.ps, ra));
                }
                self.regs.a32_set(&self.ps, (instr >> 16) & 0xF, sum);
                Ok(())
            }
            0b11010 | 0b11011 if op2 & 0b011 == 0b010 => {
                // SBFX
                self.require_feature(Feature::Thumb2)?;
                let width = ((instr >> 16) & 0x1F) + 1;
                let lsb = (instr >> 7) & 0x1F;
                let rn = self.regs.a32_get(&self.ps, instr & 0xF);
                let value = sign_extend((rn >> lsb) & mask_low(width), width);
                self.regs.a32_set(&self.ps, rd, value);
                Ok(())
            }
            0b11100 | 0b11101 if op2 & 0b011 == 0b000 => {
                // BFI / BFC
                self.require_feature(Feature::Thumb2)?;
                let msb = (instr >> 16) & 0x1F;
                let lsb = (instr >> 7) & 0x1F;
                if msb < lsb {
                    return Err(self.undef());
                }
                let width = msb - lsb + 1;
                let field_mask = mask_low(width) << lsb;
                let rm = instr & 0xF;
                let insert = if rm == 15 {
                    0
                } else {
                    self.regs.a32_get(&self.ps, rm) << lsb
                };
                let old = self.regs.a32_get(&self.ps, rd);
                self.regs
                    .a32_set(&self.ps, rd, (old & !field_mask) | (insert & field_mask));
                Ok(())
            }
            0b11110 | 0b11111 if op2 & 0b011 == 0b010 => {
                // UBFX
                self.require_feature(Feature::Thumb2)?;
                let width = ((instr >> 16) & 0x1F) + 1;
                let lsb = (instr >> 7) & 0x1F;
                let rn = self.regs.a32_get(&self.ps, instr & 0xF);
                self.regs
                    .a32_set(&self.ps, rd, (rn >> lsb) & mask_low(width));
                Ok(())
            }
            _ => Err(self.undef()),
        }
    }

    fn arm_extend(&mut self, instr: u32) -> ExecResult<()> {
        if (instr >> 4) & 0x7 != 0b011 {
            return Err(self.undef());
        }
        let op1 = (instr >> 20) & 0x1F;
        let rd = (instr >> 12) & 0xF;
        let rn = (instr >> 16) & 0xF;
        let rotate = ((instr >> 10) & 0x3) * 8;
        let rm = self.regs.a32_get(&self.ps, instr & 0xF).rotate_right(rotate);
        let value = match op1 {
            0b01000 => {
                // SXTB16
                sign_extend(rm & 0xFF, 8) & 0xFFFF | (sign_extend((rm >> 16) & 0xFF, 8) << 16)
            }
            0b01010 => sign_extend(rm & 0xFF, 8),
            0b01011 => sign_extend(rm & 0xFFFF, 16),
            0b01100 => (rm & 0xFF) | (rm & 0x00FF_0000),
            0b01110 => rm & 0xFF,
            0b01111 => rm & 0xFFFF,
            _ => return Err(self.undef()),
        };
        let result = if rn == 15 {
            value
        } else {
            let base = self.regs.a32_get(&self.ps, rn);
            match op1 {
                // The 16-bit dual forms accumulate per halfword.
                0b01000 | 0b01100 => {
                    let lo = base.wrapping_add(value) & 0xFFFF;
                    let hi = (base >> 16).wrapping_add(value >> 16) & 0xFFFF;
                    hi << 16 | lo
                }
                _ => base.wrapping_add(value),
            }
        };
        self.regs.a32_set(&self.ps, rd, result);
        Ok(())
    }

    fn arm_parallel(&mut self, instr: u32) -> ExecResult<()> {
        let class = (instr >> 20) & 0x7;
        let op = (instr >> 5) & 0x7;
        let rd = (instr >> 12) & 0xF;
        let rn = self.regs.a32_get(&self.ps, (instr >> 16) & 0xF);
        let rm = self.regs.a32_get(&self.ps, instr & 0xF);
        let (result, ge) = parallel_add_sub(class, op, rn, rm).ok_or(self.undef())?;
        if let Some(ge) = ge {
            self.ps.ge = ge;
        }
        self.regs.a32_set(&self.ps, rd, result);
        Ok(())
    }

    fn arm_dual_multiply(&mut self, instr: u32) -> ExecResult<()> {
        self.require_feature(Feature::DspPair)?;
        let long = (instr >> 20) & 0x1F == 0b10100;
        let subtract = instr & (1 << 6) != 0;
        let swap = instr & (1 << 5) != 0;
        let ra = (instr >> 12) & 0xF;
        let rn = self.regs.a32_get(&self.ps, instr & 0xF);
        let mut rm = self.regs.a32_get(&self.ps, (instr >> 8) & 0xF);
        if swap {
            rm = rm.rotate_right(16);
        }
        let lo = i64::from(rn as i16 as i32) * i64::from(rm as i16 as i32);
        let hi = i64::from((rn >> 16) as i16 as i32) * i64::from((rm >> 16) as i16 as i32);
        let dual = if subtract { lo - hi } else { lo + hi };
        let rd_num = (instr >> 16) & 0xF;
        if long {
            // SMLALD / SMLSLD
            let acc = (i64::from(self.regs.a32_get(&self.ps, rd_num) as i32) << 32)
                | i64::from(self.regs.a32_get(&self.ps, ra));
            let sum = acc.wrapping_add(dual);
            self.regs.a32_set(&self.ps, ra, sum as u32);
            self.regs.a32_set(&self.ps, rd_num, (sum >> 32) as u32);
        } else {
            let acc = if ra == 15 {
                0
            } else {
                i64::from(self.regs.a32_get(&self.ps, ra) as i32)
            };
            let sum = dual + acc;
            if sum != i64::from(sum as i32) {
                self.ps.q = true;
            }
            self.regs.a32_set(&self.ps, rd_num, sum as u32);
        }
        Ok(())
    }
}

fn mask_low(bits: u32) -> u32 {
    if bits >= 32 {
        !0
    } else {
        (1 << bits) - 1
    }
}

/// The v6 parallel add/subtract matrix. Returns the packed result and the
/// new GE lanes for the flag-setting classes.
fn parallel_add_sub(class: u32, op: u32, rn: u32, rm: u32) -> Option<(u32, Option<u8>)> {
    let halving = matches!(class, 0b011 | 0b111);
    let saturating = matches!(class, 0b010 | 0b110);
    let unsigned = class & 0b100 != 0;
    let plain = matches!(class, 0b001 | 0b101);

    let lane = |v: u32, index: u32, bits: u32| -> i64 {
        let raw = (v >> (index * bits)) & mask_low(bits);
        if unsigned {
            i64::from(raw)
        } else {
            i64::from(sign_extend(raw, bits) as i32)
        }
    };

    let bits = if op >= 0b100 { 8 } else { 16 };
    let lanes = 32 / bits;
    let mut result = 0u32;
    let mut ge = 0u8;

    for index in 0..lanes {
        let a = lane(rn, index, bits);
        // ASX and SAX cross the operand halves.
        let b_index = match op {
            0b001 | 0b010 => 1 - index,
            _ => index,
        };
        let b = lane(rm, b_index, bits);
        let add = match op {
            0b000 | 0b100 => true,
            0b011 | 0b111 => false,
            0b001 => index == 1, // ASX: subtract low, add high
            0b010 => index == 0, // SAX: add low, subtract high
            _ => return None,
        };
        let raw = if add { a + b } else { a - b };
        let value = if halving {
            (raw >> 1) as u32
        } else if saturating {
            if unsigned {
                unsigned_sat(raw, bits).0
            } else {
                signed_sat(raw, bits).0 as u32
            }
        } else {
            raw as u32
        };
        result |= (value & mask_low(bits)) << (index * bits);

        if plain {
            let flag = if unsigned {
                if add {
                    raw >= 1 << bits
                } else {
                    raw >= 0
                }
            } else {
                raw >= 0
            };
            if flag {
                if bits == 8 {
                    ge |= 1 << index;
                } else {
                    ge |= 0b11 << (index * 2);
                }
            }
        }
    }
    Some((result, plain.then_some(ge)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_sadd16_sets_ge() {
        // 1 + 1 and -1 + 0: high lane negative clears its GE bits.
        let rn = 0xFFFF_0001; // halves: -1, 1
        let rm = 0x0000_0001;
        let (result, ge) = parallel_add_sub(0b001, 0b000, rn, rm).unwrap();
        assert_eq!(result, 0xFFFF_0002);
        assert_eq!(ge, Some(0b0011));
    }

    #[test]
    fn parallel_uadd8_carries_into_ge() {
        let rn = 0x00_FF_00_FF;
        let rm = 0x00_01_00_01;
        let (result, ge) = parallel_add_sub(0b101, 0b100, rn, rm).unwrap();
        assert_eq!(result, 0x0000_0000_u32 | 0x0000_0000 | 0x0000_0000 | 0x0000_0000);
        assert_eq!(ge, Some(0b0101));
    }

    #[test]
    fn parallel_uqadd8_saturates_without_ge() {
        let (result, ge) = parallel_add_sub(0b110, 0b100, 0x0000_00F0, 0x0000_0020).unwrap();
        assert_eq!(result & 0xFF, 0xFF);
        assert_eq!(ge, None);
    }
}
