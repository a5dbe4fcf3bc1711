//! The Thumb decoder: 16-bit Thumb-1, the 32-bit Thumb-2 extensions and the
//! ThumbEE differences (null checks, CHKA, handler branches).

use crate::consts::{ArchVersion, Feature, Isa};
use crate::exec::{
    add_with_carry, condition_passed, decode_imm_shift, shift_c, sign_extend, signed_sat,
    unsigned_sat, Shift,
};
use crate::fault::{ExecResult, Fault};
use crate::memory::Memory;
use crate::pstate::InstrSet;

impl<M: Memory> crate::core::Core<M> {
    pub(crate) fn step_thumb(&mut self, ee: bool) -> ExecResult<()> {
        let hw1 = self.fetch_thumb16()?;
        let prefix = hw1 >> 11;
        let wide_prefix = matches!(prefix, 0b11101 | 0b11110 | 0b11111);
        let thumb2 = self.cfg.has(Feature::Thumb2);
        let is32 = wide_prefix && (thumb2 || prefix == 0b11110);
        let hw2 = if is32 { self.fetch_thumb16()? } else { 0 };

        let it_cond = self.ps.it_condition();
        let is_it = !is32 && hw1 & 0xFF00 == 0xBF00 && hw1 & 0x000F != 0;
        let execute = match it_cond {
            Some(cond) => condition_passed(u32::from(cond), &self.ps),
            None => true,
        };

        let result = if !execute {
            Ok(())
        } else if is32 {
            if thumb2 {
                self.t32_exec(hw1, hw2, ee)
            } else {
                self.thumb_classic_bl(hw1, hw2)
            }
        } else if wide_prefix {
            Err(self.undef())
        } else {
            self.t16_exec(hw1, ee)
        };
        if result.is_ok() && !is_it && self.ps.it != 0 {
            self.ps.advance_it();
        }
        result
    }

    /// The pre-Thumb-2 two-halfword BL/BLX sequence.
    fn thumb_classic_bl(&mut self, hw1: u16, hw2: u16) -> ExecResult<()> {
        let suffix = hw2 >> 11;
        if suffix != 0b11111 && suffix != 0b11101 {
            return Err(self.undef());
        }
        let high = sign_extend(u32::from(hw1) & 0x7FF, 11) << 12;
        let low = (u32::from(hw2) & 0x7FF) << 1;
        let base = self.regs.pc() as u32; // past both halfwords
        let target = base.wrapping_add(high).wrapping_add(low);
        self.regs.a32_set(&self.ps, 14, base | 1);
        if suffix == 0b11101 {
            // BLX: to ARM state.
            self.require_version(ArchVersion::V5)?;
            self.ps.set_jt_filtered(&self.cfg, InstrSet::Arm);
            self.branch_to(target & !3);
        } else {
            self.branch_to(target | 1);
        }
        Ok(())
    }

    fn thumb_flags_logical(&mut self, result: u32, carry: bool) {
        self.ps.n = result & 0x8000_0000 != 0;
        self.ps.z = result == 0;
        self.ps.c = carry;
    }

    fn thumb_flags_arith(&mut self, result: u32, carry: bool, overflow: bool) {
        self.ps.n = result & 0x8000_0000 != 0;
        self.ps.z = result == 0;
        self.ps.c = carry;
        self.ps.v = overflow;
    }

    /// Whether flag-setting is suppressed (inside an IT block).
    fn in_it_block(&self) -> bool {
        self.ps.it != 0
    }

    fn ee_null_check(&self, ee: bool, base: u32) -> ExecResult<()> {
        if ee && base == 0 {
            return Err(Fault::ThumbEeNullPtr);
        }
        Ok(())
    }

    fn t16_exec(&mut self, hw: u16, ee: bool) -> ExecResult<()> {
        let instr = u32::from(hw);
        let privileged = self.ps.privileged();
        match instr >> 12 {
            0b0000 | 0b0001 => {
                let op = (instr >> 11) & 0x3;
                if op == 0b11 {
                    // ADD/SUB register or 3-bit immediate
                    let sub = instr & (1 << 9) != 0;
                    let imm_form = instr & (1 << 10) != 0;
                    let rn = self.regs.a32_get(&self.ps, (instr >> 3) & 0x7);
                    let operand = if imm_form {
                        (instr >> 6) & 0x7
                    } else {
                        self.regs.a32_get(&self.ps, (instr >> 6) & 0x7)
                    };
                    let (r, c, v) = if sub {
                        add_with_carry(rn, !operand, true)
                    } else {
                        add_with_carry(rn, operand, false)
                    };
                    self.regs.a32_set(&self.ps, instr & 0x7, r);
                    if !self.in_it_block() {
                        self.thumb_flags_arith(r, c, v);
                    }
                } else {
                    // LSL/LSR/ASR by immediate
                    let (shift, amount) = decode_imm_shift(op, (instr >> 6) & 0x1F);
                    let rm = self.regs.a32_get(&self.ps, (instr >> 3) & 0x7);
                    let (r, c) = shift_c(rm, shift, amount, self.ps.c);
                    self.regs.a32_set(&self.ps, instr & 0x7, r);
                    if !self.in_it_block() {
                        self.thumb_flags_logical(r, c);
                    }
                }
                Ok(())
            }
            0b0010 | 0b0011 => {
                // MOV/CMP/ADD/SUB with 8-bit immediate
                let op = (instr >> 11) & 0x3;
                let rd = (instr >> 8) & 0x7;
                let imm = instr & 0xFF;
                let n = self.regs.a32_get(&self.ps, rd);
                match op {
                    0b00 => {
                        self.regs.a32_set(&self.ps, rd, imm);
                        if !self.in_it_block() {
                            self.thumb_flags_logical(imm, self.ps.c);
                        }
                    }
                    0b01 => {
                        let (r, c, v) = add_with_carry(n, !imm, true);
                        self.thumb_flags_arith(r, c, v);
                    }
                    0b10 => {
                        let (r, c, v) = add_with_carry(n, imm, false);
                        self.regs.a32_set(&self.ps, rd, r);
                        if !self.in_it_block() {
                            self.thumb_flags_arith(r, c, v);
                        }
                    }
                    _ => {
                        let (r, c, v) = add_with_carry(n, !imm, true);
                        self.regs.a32_set(&self.ps, rd, r);
                        if !self.in_it_block() {
                            self.thumb_flags_arith(r, c, v);
                        }
                    }
                }
                Ok(())
            }
            0b0100 => match (instr >> 10) & 0x3 {
                0b00 => self.t16_alu(instr),
                0b01 => self.t16_hireg(instr),
                _ => {
                    // LDR (literal)
                    let base = (self.regs.pc() as u32 + 2) & !3;
                    let addr = base.wrapping_add((instr & 0xFF) << 2);
                    let value = self.a32_read(addr, 4, privileged)? as u32;
                    self.regs.a32_set(&self.ps, (instr >> 8) & 0x7, value);
                    Ok(())
                }
            },
            0b0101 => {
                // Load/store with register offset
                let rn = (instr >> 3) & 0x7;
                let base = self.regs.a32_get(&self.ps, rn);
                self.ee_null_check(ee, base)?;
                let addr = base.wrapping_add(self.regs.a32_get(&self.ps, (instr >> 6) & 0x7));
                let rd = instr & 0x7;
                match (instr >> 9) & 0x7 {
                    0b000 => {
                        let v = self.regs.a32_get(&self.ps, rd);
                        self.a32_write(addr, 4, u64::from(v), privileged)?;
                    }
                    0b001 => {
                        let v = self.regs.a32_get(&self.ps, rd);
                        self.a32_write(addr, 2, u64::from(v), privileged)?;
                    }
                    0b010 => {
                        let v = self.regs.a32_get(&self.ps, rd);
                        self.a32_write(addr, 1, u64::from(v), privileged)?;
                    }
                    0b011 => {
                        let v = sign_extend(self.a32_read(addr, 1, privileged)? as u32, 8);
                        self.regs.a32_set(&self.ps, rd, v);
                    }
                    0b100 => {
                        let v = self.a32_read(addr, 4, privileged)? as u32;
                        self.regs.a32_set(&self.ps, rd, v);
                    }
                    0b101 => {
                        let v = self.a32_read(addr, 2, privileged)? as u32;
                        self.regs.a32_set(&self.ps, rd, v);
                    }
                    0b110 => {
                        let v = self.a32_read(addr, 1, privileged)? as u32;
                        self.regs.a32_set(&self.ps, rd, v);
                    }
                    _ => {
                        let v = sign_extend(self.a32_read(addr, 2, privileged)? as u32, 16);
                        self.regs.a32_set(&self.ps, rd, v);
                    }
                }
                Ok(())
            }
            0b0110 | 0b0111 => {
                // Word/byte with 5-bit immediate offset
                let byte = instr & (1 << 12) != 0;
                let load = instr & (1 << 11) != 0;
                let rn = (instr >> 3) & 0x7;
                let base = self.regs.a32_get(&self.ps, rn);
                self.ee_null_check(ee, base)?;
                let imm = (instr >> 6) & 0x1F;
                let addr = base.wrapping_add(if byte { imm } else { imm << 2 });
                let rd = instr & 0x7;
                let size = if byte { 1 } else { 4 };
                if load {
                    let v = self.a32_read(addr, size, privileged)? as u32;
                    self.regs.a32_set(&self.ps, rd, v);
                } else {
                    let v = self.regs.a32_get(&self.ps, rd);
                    self.a32_write(addr, size, u64::from(v), privileged)?;
                }
                Ok(())
            }
            0b1000 => {
                // Halfword with immediate offset
                let load = instr & (1 << 11) != 0;
                let base = self.regs.a32_get(&self.ps, (instr >> 3) & 0x7);
                self.ee_null_check(ee, base)?;
                let addr = base.wrapping_add(((instr >> 6) & 0x1F) << 1);
                let rd = instr & 0x7;
                if load {
                    let v = self.a32_read(addr, 2, privileged)? as u32;
                    self.regs.a32_set(&self.ps, rd, v);
                } else {
                    let v = self.regs.a32_get(&self.ps, rd);
                    self.a32_write(addr, 2, u64::from(v), privileged)?;
                }
                Ok(())
            }
            0b1001 => {
                // SP-relative load/store
                let load = instr & (1 << 11) != 0;
                let addr = self
                    .regs
                    .a32_get(&self.ps, 13)
                    .wrapping_add((instr & 0xFF) << 2);
                let rd = (instr >> 8) & 0x7;
                if load {
                    let v = self.a32_read(addr, 4, privileged)? as u32;
                    self.regs.a32_set(&self.ps, rd, v);
                } else {
                    let v = self.regs.a32_get(&self.ps, rd);
                    self.a32_write(addr, 4, u64::from(v), privileged)?;
                }
                Ok(())
            }
            0b1010 => {
                // ADR / ADD from SP
                let sp_form = instr & (1 << 11) != 0;
                let rd = (instr >> 8) & 0x7;
                let imm = (instr & 0xFF) << 2;
                let base = if sp_form {
                    self.regs.a32_get(&self.ps, 13)
                } else {
                    (self.regs.pc() as u32 + 2) & !3
                };
                self.regs.a32_set(&self.ps, rd, base.wrapping_add(imm));
                Ok(())
            }
            0b1011 => self.t16_misc(instr),
            0b1100 => {
                if ee {
                    return self.thumbee_c_space(instr);
                }
                // LDMIA/STMIA with writeback
                let load = instr & (1 << 11) != 0;
                let rn = (instr >> 8) & 0x7;
                let list = instr & 0xFF;
                if list == 0 {
                    return Ok(());
                }
                let mut addr = self.regs.a32_get(&self.ps, rn);
                let wb = addr.wrapping_add(4 * list.count_ones());
                if !load {
                    self.regs.a32_set(&self.ps, rn, wb);
                }
                for reg in 0..8u32 {
                    if list & (1 << reg) == 0 {
                        continue;
                    }
                    if load {
                        let v = self.a32_read_word_aligned(addr, privileged)?;
                        self.regs.a32_set(&self.ps, reg, v);
                    } else {
                        let v = self.regs.a32_get(&self.ps, reg);
                        self.a32_write_word_aligned(addr, v, privileged)?;
                    }
                    addr = addr.wrapping_add(4);
                }
                if load && list & (1 << rn) == 0 {
                    self.regs.a32_set(&self.ps, rn, wb);
                }
                Ok(())
            }
            0b1101 => {
                let cond = (instr >> 8) & 0xF;
                match cond {
                    0xF => Err(Fault::Svc { imm: instr & 0xFF }),
                    0xE => Err(self.undef()),
                    _ => {
                        if condition_passed(cond, &self.ps) {
                            let offset = sign_extend(instr & 0xFF, 8) << 1;
                            let target = (self.regs.pc() as u32 + 2).wrapping_add(offset);
                            self.branch_to(target);
                        }
                        Ok(())
                    }
                }
            }
            _ => {
                if instr >> 11 == 0b11100 {
                    let offset = sign_extend(instr & 0x7FF, 11) << 1;
                    let target = (self.regs.pc() as u32 + 2).wrapping_add(offset);
                    self.branch_to(target);
                    Ok(())
                } else {
                    Err(self.undef())
                }
            }
        }
    }

    fn t16_alu(&mut self, instr: u32) -> ExecResult<()> {
        let op = (instr >> 6) & 0xF;
        let rd = instr & 0x7;
        let rm_num = (instr >> 3) & 0x7;
        let d = self.regs.a32_get(&self.ps, rd);
        let m = self.regs.a32_get(&self.ps, rm_num);
        let set = !self.in_it_block();
        match op {
            0x0 => {
                let r = d & m;
                self.regs.a32_set(&self.ps, rd, r);
                if set {
                    self.thumb_flags_logical(r, self.ps.c);
                }
            }
            0x1 => {
                let r = d ^ m;
                self.regs.a32_set(&self.ps, rd, r);
                if set {
                    self.thumb_flags_logical(r, self.ps.c);
                }
            }
            0x2 | 0x3 | 0x4 | 0x7 => {
                let shift = match op {
                    0x2 => Shift::Lsl,
                    0x3 => Shift::Lsr,
                    0x4 => Shift::Asr,
                    _ => Shift::Ror,
                };
                let (r, c) = shift_c(d, shift, m & 0xFF, self.ps.c);
                self.regs.a32_set(&self.ps, rd, r);
                if set {
                    self.thumb_flags_logical(r, c);
                }
            }
            0x5 => {
                let (r, c, v) = add_with_carry(d, m, self.ps.c);
                self.regs.a32_set(&self.ps, rd, r);
                if set {
                    self.thumb_flags_arith(r, c, v);
                }
            }
            0x6 => {
                let (r, c, v) = add_with_carry(d, !m, self.ps.c);
                self.regs.a32_set(&self.ps, rd, r);
                if set {
                    self.thumb_flags_arith(r, c, v);
                }
            }
            0x8 => {
                let r = d & m;
                self.thumb_flags_logical(r, self.ps.c);
            }
            0x9 => {
                let (r, c, v) = add_with_carry(!m, 0, true);
                self.regs.a32_set(&self.ps, rd, r);
                if set {
                    self.thumb_flags_arith(r, c, v);
                }
            }
            0xA => {
                let (r, c, v) = add_with_carry(d, !m, true);
                self.thumb_flags_arith(r, c, v);
            }
            0xB => {
                let (r, c, v) = add_with_carry(d, m, false);
                self.thumb_flags_arith(r, c, v);
            }
            0xC => {
                let r = d | m;
                self.regs.a32_set(&self.ps, rd, r);
                if set {
                    self.thumb_flags_logical(r, self.ps.c);
                }
            }
            0xD => {
                let r = d.wrapping_mul(m);
                self.regs.a32_set(&self.ps, rd, r);
                if set {
                    self.thumb_flags_logical(r, self.ps.c);
                }
            }
            0xE => {
                let r = d & !m;
                self.regs.a32_set(&self.ps, rd, r);
                if set {
                    self.thumb_flags_logical(r, self.ps.c);
                }
            }
            _ => {
                let r = !m;
                self.regs.a32_set(&self.ps, rd, r);
                if set {
                    self.thumb_flags_logical(r, self.ps.c);
                }
            }
        }
        Ok(())
    }

    fn t16_hireg(&mut self, instr: u32) -> ExecResult<()> {
        let op = (instr >> 8) & 0x3;
        let rd = (instr & 0x7) | ((instr >> 4) & 0x8);
        let rm_num = (instr >> 3) & 0xF;
        let m = self.regs.a32_get(&self.ps, rm_num);
        match op {
            0b00 => {
                let d = self.regs.a32_get(&self.ps, rd);
                let r = d.wrapping_add(m);
                if rd == 15 {
                    self.branch_to(r);
                } else {
                    self.regs.a32_set(&self.ps, rd, r);
                }
            }
            0b01 => {
                let d = self.regs.a32_get(&self.ps, rd);
                let (r, c, v) = add_with_carry(d, !m, true);
                self.thumb_flags_arith(r, c, v);
            }
            0b10 => {
                if rd == 15 {
                    self.branch_to(m);
                } else {
                    self.regs.a32_set(&self.ps, rd, m);
                }
            }
            _ => {
                // BX / BLX (register)
                if instr & (1 << 7) != 0 {
                    self.require_version(ArchVersion::V5)?;
                    let ret = self.regs.pc() as u32;
                    self.regs.a32_set(&self.ps, 14, ret | 1);
                }
                self.bx_write(m);
            }
        }
        Ok(())
    }

    fn t16_misc(&mut self, instr: u32) -> ExecResult<()> {
        let privileged = self.ps.privileged();
        if instr & 0x0500 == 0x0100 {
            // CBZ / CBNZ
            self.require_feature(Feature::Thumb2)?;
            let nonzero = instr & (1 << 11) != 0;
            let rn = self.regs.a32_get(&self.ps, instr & 0x7);
            let imm = ((instr >> 3) & 0x1F) << 1 | ((instr >> 9) & 1) << 6;
            if (rn == 0) != nonzero {
                let target = (self.regs.pc() as u32 + 2).wrapping_add(imm);
                self.branch_to(target);
            }
            return Ok(());
        }
        match (instr >> 8) & 0xF {
            0b0000 => {
                // ADD/SUB SP, #imm7*4
                let sp = self.regs.a32_get(&self.ps, 13);
                let imm = (instr & 0x7F) << 2;
                let r = if instr & (1 << 7) != 0 {
                    sp.wrapping_sub(imm)
                } else {
                    sp.wrapping_add(imm)
                };
                self.regs.a32_set(&self.ps, 13, r);
                Ok(())
            }
            0b0010 => {
                // SXTH/SXTB/UXTH/UXTB
                self.require_version(ArchVersion::V6)?;
                let rm = self.regs.a32_get(&self.ps, (instr >> 3) & 0x7);
                let value = match (instr >> 6) & 0x3 {
                    0b00 => sign_extend(rm & 0xFFFF, 16),
                    0b01 => sign_extend(rm & 0xFF, 8),
                    0b10 => rm & 0xFFFF,
                    _ => rm & 0xFF,
                };
                self.regs.a32_set(&self.ps, instr & 0x7, value);
                Ok(())
            }
            0b0100 | 0b0101 => {
                // PUSH
                let list = (instr & 0xFF) | ((instr & 0x100) << 6); // LR
                let count = list.count_ones();
                let sp = self.regs.a32_get(&self.ps, 13);
                let mut addr = sp.wrapping_sub(4 * count);
                self.regs.a32_set(&self.ps, 13, addr);
                for reg in 0..16u32 {
                    if list & (1 << reg) == 0 {
                        continue;
                    }
                    let v = self.regs.a32_get(&self.ps, reg);
                    self.a32_write_word_aligned(addr, v, privileged)?;
                    addr = addr.wrapping_add(4);
                }
                Ok(())
            }
            0b0110 => {
                // CPS and SETEND
                self.require_version(ArchVersion::V6)?;
                if (instr >> 5) & 0x7 == 0b010 {
                    self.ps.e = instr & (1 << 3) != 0;
                    return Ok(());
                }
                if (instr >> 5) & 0x7 == 0b011 && self.ps.privileged() {
                    let disable = instr & (1 << 4) != 0;
                    if instr & (1 << 2) != 0 {
                        self.ps.a = disable;
                    }
                    if instr & (1 << 1) != 0 {
                        self.ps.i = disable;
                    }
                    if instr & 1 != 0 {
                        self.ps.f = disable;
                    }
                }
                Ok(())
            }
            0b1010 => {
                // REV/REV16/REVSH
                self.require_version(ArchVersion::V6)?;
                let rm = self.regs.a32_get(&self.ps, (instr >> 3) & 0x7);
                let value = match (instr >> 6) & 0x3 {
                    0b00 => rm.swap_bytes(),
                    0b01 => (rm & 0xFF00_FF00) >> 8 | (rm & 0x00FF_00FF) << 8,
                    0b11 => sign_extend((rm as u16).swap_bytes() as u32, 16),
                    _ => return Err(self.undef()),
                };
                self.regs.a32_set(&self.ps, instr & 0x7, value);
                Ok(())
            }
            0b1100 | 0b1101 => {
                // POP
                let list = (instr & 0xFF) | ((instr & 0x100) << 7); // PC
                let count = list.count_ones();
                let mut addr = self.regs.a32_get(&self.ps, 13);
                self.regs.a32_set(&self.ps, 13, addr.wrapping_add(4 * count));
                for reg in 0..16u32 {
                    if list & (1 << reg) == 0 {
                        continue;
                    }
                    let v = self.a32_read_word_aligned(addr, privileged)?;
                    if reg == 15 {
                        if self.cfg.version >= ArchVersion::V5 {
                            self.bx_write(v);
                        } else {
                            self.branch_to(v);
                        }
                    } else {
                        self.regs.a32_set(&self.ps, reg, v);
                    }
                    addr = addr.wrapping_add(4);
                }
                Ok(())
            }
            0b1110 => {
                self.require_version(ArchVersion::V5)?;
                Err(Fault::Breakpoint { imm: instr & 0xFF })
            }
            0b1111 => {
                // IT and hints
                if instr & 0xF != 0 {
                    self.require_feature(Feature::Thumb2)?;
                    self.ps.it = (instr & 0xFF) as u8;
                } // NOP/YIELD/WFE/WFI/SEV otherwise
                Ok(())
            }
            _ => Err(self.undef()),
        }
    }

    /// ThumbEE replaces the 0b1100 load/store-multiple row with handler
    /// branches and the array bounds check.
    fn thumbee_c_space(&mut self, instr: u32) -> ExecResult<()> {
        if instr & (1 << 11) == 0 {
            // HB / HBL
            let link = instr & (1 << 8) != 0;
            let handler = instr & 0xFF;
            if link {
                let ret = self.regs.pc() as u32;
                self.regs.a32_set(&self.ps, 14, ret | 1);
            }
            let target = self.regs.teehbr.wrapping_add(handler * 4);
            self.branch_to(target);
            return Ok(());
        }
        if (instr >> 8) & 0x7 == 0b010 {
            // CHKA: bound in Rn, index in Rm.
            let rn = self.regs.a32_get(&self.ps, instr & 0x7);
            let rm = self.regs.a32_get(&self.ps, (instr >> 3) & 0x7);
            if rn <= rm {
                return Err(Fault::ThumbEeOutOfBounds);
            }
            return Ok(());
        }
        Err(self.undef())
    }

    // ---- Thumb-2 32-bit encodings ----

    fn t32_exec(&mut self, hw1: u16, hw2: u16, ee: bool) -> ExecResult<()> {
        let word = (u32::from(hw1) << 16) | u32::from(hw2);
        match (hw1 >> 11) & 0x3 {
            0b01 => {
                if hw1 & 0x0400 != 0 {
                    return self.t32_coproc(word);
                }
                if hw1 & 0x0200 != 0 {
                    self.t32_dp_shifted(hw1, hw2)
                } else if hw1 & 0x0040 != 0 {
                    self.t32_dual_exclusive(hw1, hw2)
                } else {
                    self.t32_block(hw1, hw2)
                }
            }
            0b10 => {
                if hw2 & 0x8000 != 0 {
                    self.t32_branch_misc(hw1, hw2)
                } else if hw1 & 0x0200 != 0 {
                    self.t32_dp_plain(hw1, hw2)
                } else {
                    self.t32_dp_modified(hw1, hw2)
                }
            }
            _ => {
                if hw1 & 0x0600 == 0 {
                    self.t32_single_ldst(hw1, hw2, ee)
                } else if hw1 & 0x0700 == 0x0200 {
                    self.t32_dp_register(hw1, hw2)
                } else if hw1 & 0x0700 == 0x0300 {
                    self.t32_multiply(hw1, hw2)
                } else if hw1 & 0x0400 != 0 {
                    self.t32_coproc(word)
                } else {
                    Err(self.undef())
                }
            }
        }
    }

    /// The Thumb-2 coprocessor space shares the ARM field layout in the low
    /// 28 bits, so the ARM gateway decoders apply unchanged.
    fn t32_coproc(&mut self, word: u32) -> ExecResult<()> {
        match (word >> 25) & 0x7 {
            0b110 => self.arm_ldc_stc_mcrr(word),
            _ => self.arm_cdp_mcr_mrc(word),
        }
    }

    /// Thumb-2 modified immediate: replicate or rotate.
    fn t32_expand_imm(&self, hw1: u16, hw2: u16) -> (u32, bool) {
        let i = u32::from(hw1 >> 10) & 1;
        let imm3 = u32::from(hw2 >> 12) & 0x7;
        let imm8 = u32::from(hw2) & 0xFF;
        let imm12 = i << 11 | imm3 << 8 | imm8;
        if imm12 >> 10 == 0 {
            let value = match (imm12 >> 8) & 0x3 {
                0b00 => imm8,
                0b01 => imm8 << 16 | imm8,
                0b10 => imm8 << 24 | imm8 << 8,
                _ => imm8 << 24 | imm8 << 16 | imm8 << 8 | imm8,
            };
            (value, self.ps.c)
        } else {
            let rotation = imm12 >> 7;
            let value = (0x80 | (imm12 & 0x7F)).rotate_right(rotation);
            (value, value & 0x8000_0000 != 0)
        }
    }

    fn t32_dp_common(
        &mut self,
        op: u32,
        s: bool,
        rn_num: u32,
        rd: u32,
        operand: u32,
        carry: bool,
    ) -> ExecResult<()> {
        let n = self.regs.a32_get(&self.ps, rn_num);
        let discard = rd == 15;
        match op {
            0b0000 => {
                let r = n & operand;
                if discard {
                    self.thumb_flags_logical(r, carry);
                } else {
                    self.regs.a32_set(&self.ps, rd, r);
                    if s {
                        self.thumb_flags_logical(r, carry);
                    }
                }
            }
            0b0001 => {
                let r = n & !operand;
                self.regs.a32_set(&self.ps, rd, r);
                if s {
                    self.thumb_flags_logical(r, carry);
                }
            }
            0b0010 => {
                let r = if rn_num == 15 { operand } else { n | operand };
                self.regs.a32_set(&self.ps, rd, r);
                if s {
                    self.thumb_flags_logical(r, carry);
                }
            }
            0b0011 => {
                let r = if rn_num == 15 { !operand } else { n | !operand };
                self.regs.a32_set(&self.ps, rd, r);
                if s {
                    self.thumb_flags_logical(r, carry);
                }
            }
            0b0100 => {
                let r = n ^ operand;
                if discard {
                    self.thumb_flags_logical(r, carry);
                } else {
                    self.regs.a32_set(&self.ps, rd, r);
                    if s {
                        self.thumb_flags_logical(r, carry);
                    }
                }
            }
            0b1000 => {
                let (r, c, v) = add_with_carry(n, operand, false);
                if discard {
                    self.thumb_flags_arith(r, c, v);
                } else {
                    self.regs.a32_set(&self.ps, rd, r);
                    if s {
                        self.thumb_flags_arith(r, c, v);
                    }
                }
            }
            0b1010 => {
                let (r, c, v) = add_with_carry(n, operand, self.ps.c);
                self.regs.a32_set(&self.ps, rd, r);
                if s {
                    self.thumb_flags_arith(r, c, v);
                }
            }
            0b1011 => {
                let (r, c, v) = add_with_carry(n, !operand, self.ps.c);
                self.regs.a32_set(&self.ps, rd, r);
                if s {
                    self.thumb_flags_arith(r, c, v);
                }
            }
            0b1101 => {
                let (r, c, v) = add_with_carry(n, !operand, true);
                if discard {
                    self.thumb_flags_arith(r, c, v);
                } else {
                    self.regs.a32_set(&self.ps, rd, r);
                    if s {
                        self.thumb_flags_arith(r, c, v);
                    }
                }
            }
            0b1110 => {
                let (r, c, v) = add_with_carry(!n, operand, true);
                self.regs.a32_set(&self.ps, rd, r);
                if s {
                    self.thumb_flags_arith(r, c, v);
                }
            }
            _ => return Err(self.undef()),
        }
        Ok(())
    }

    fn t32_dp_modified(&mut self, hw1: u16, hw2: u16) -> ExecResult<()> {
        let op = u32::from(hw1 >> 5) & 0xF;
        let s = hw1 & (1 << 4) != 0;
        let rn = u32::from(hw1) & 0xF;
        let rd = u32::from(hw2 >> 8) & 0xF;
        let (imm, carry) = self.t32_expand_imm(hw1, hw2);
        self.t32_dp_common(op, s, rn, rd, imm, carry)
    }

    fn t32_dp_shifted(&mut self, hw1: u16, hw2: u16) -> ExecResult<()> {
        let op = u32::from(hw1 >> 5) & 0xF;
        let s = hw1 & (1 << 4) != 0;
        let rn = u32::from(hw1) & 0xF;
        let rd = u32::from(hw2 >> 8) & 0xF;
        let rm = self.regs.a32_get(&self.ps, u32::from(hw2) & 0xF);
        let imm5 = (u32::from(hw2 >> 12) & 0x7) << 2 | (u32::from(hw2 >> 6) & 0x3);
        let (shift, amount) = decode_imm_shift(u32::from(hw2 >> 4) & 0x3, imm5);
        let (operand, carry) = shift_c(rm, shift, amount, self.ps.c);
        self.t32_dp_common(op, s, rn, rd, operand, carry)
    }

    fn t32_dp_plain(&mut self, hw1: u16, hw2: u16) -> ExecResult<()> {
        let op = u32::from(hw1 >> 4) & 0x1F;
        let rn_num = u32::from(hw1) & 0xF;
        let rd = u32::from(hw2 >> 8) & 0xF;
        let i = u32::from(hw1 >> 10) & 1;
        let imm3 = u32::from(hw2 >> 12) & 0x7;
        let imm8 = u32::from(hw2) & 0xFF;
        let imm12 = i << 11 | imm3 << 8 | imm8;
        match op {
            0b00000 => {
                // ADDW (Rn=PC: ADR)
                let n = if rn_num == 15 {
                    (self.regs.pc() as u32 + 2) & !3
                } else {
                    self.regs.a32_get(&self.ps, rn_num)
                };
                self.regs.a32_set(&self.ps, rd, n.wrapping_add(imm12));
                Ok(())
            }
            0b00100 => {
                // MOVW
                let imm16 = (u32::from(hw1) & 0xF) << 12 | imm12;
                self.regs.a32_set(&self.ps, rd, imm16);
                Ok(())
            }
            0b01010 => {
                let n = if rn_num == 15 {
                    (self.regs.pc() as u32 + 2) & !3
                } else {
                    self.regs.a32_get(&self.ps, rn_num)
                };
                self.regs.a32_set(&self.ps, rd, n.wrapping_sub(imm12));
                Ok(())
            }
            0b01100 => {
                // MOVT
                let imm16 = (u32::from(hw1) & 0xF) << 12 | imm12;
                let low = self.regs.a32_get(&self.ps, rd) & 0xFFFF;
                self.regs.a32_set(&self.ps, rd, imm16 << 16 | low);
                Ok(())
            }
            0b10000 | 0b10010 | 0b11000 | 0b11010 => {
                // SSAT / USAT
                let unsigned = op & 0b01000 != 0;
                let sat_bits = (u32::from(hw2) & 0x1F) + if unsigned { 0 } else { 1 };
                let imm5 = imm3 << 2 | (u32::from(hw2 >> 6) & 0x3);
                let rn = self.regs.a32_get(&self.ps, rn_num);
                let operand = if op & 0b00010 != 0 {
                    shift_c(rn, Shift::Asr, if imm5 == 0 { 32 } else { imm5 }, false).0
                } else {
                    rn << imm5
                } as i32;
                let (result, sat) = if unsigned {
                    unsigned_sat(i64::from(operand), sat_bits)
                } else {
                    let (r, sat) = signed_sat(i64::from(operand), sat_bits);
                    (r as u32, sat)
                };
                if sat {
                    self.ps.q = true;
                }
                self.regs.a32_set(&self.ps, rd, result);
                Ok(())
            }
            0b10100 | 0b11100 => {
                // SBFX / UBFX
                let unsigned = op & 0b01000 != 0;
                let lsb = imm3 << 2 | (u32::from(hw2 >> 6) & 0x3);
                let width = (u32::from(hw2) & 0x1F) + 1;
                let rn = self.regs.a32_get(&self.ps, rn_num);
                let field = (rn >> lsb) & low_mask(width);
                let value = if unsigned {
                    field
                } else {
                    sign_extend(field, width)
                };
                self.regs.a32_set(&self.ps, rd, value);
                Ok(())
            }
            0b10110 => {
                // BFI / BFC
                let lsb = imm3 << 2 | (u32::from(hw2 >> 6) & 0x3);
                let msb = u32::from(hw2) & 0x1F;
                if msb < lsb {
                    return Err(self.undef());
                }
                let width = msb - lsb + 1;
                let field_mask = low_mask(width) << lsb;
                let insert = if rn_num == 15 {
                    0
                } else {
                    self.regs.a32_get(&self.ps, rn_num) << lsb
                };
                let old = self.regs.a32_get(&self.ps, rd);
                self.regs
                    .a32_set(&self.ps, rd, (old & !field_mask) | (insert & field_mask));
                Ok(())
            }
            _ => Err(self.undef()),
        }
    }

    fn t32_branch_misc(&mut self, hw1: u16, hw2: u16) -> ExecResult<()> {
        let s = u32::from(hw1 >> 10) & 1;
        let j1 = u32::from(hw2 >> 13) & 1;
        let j2 = u32::from(hw2 >> 11) & 1;
        match (hw2 >> 12) & 0x5 {
            0b000 => {
                // Conditional branch or the misc-control space
                let cond = u32::from(hw1 >> 6) & 0xF;
                if cond >> 1 == 0b111 {
                    return self.t32_misc_control(hw1, hw2);
                }
                if condition_passed(cond, &self.ps) {
                    let imm = s << 20
                        | j2 << 19
                        | j1 << 18
                        | (u32::from(hw1) & 0x3F) << 12
                        | (u32::from(hw2) & 0x7FF) << 1;
                    let offset = sign_extend(imm, 21);
                    let target = (self.regs.pc() as u32).wrapping_add(offset);
                    self.branch_to(target);
                }
                Ok(())
            }
            0b001 => {
                // B.W
                let i1 = !(j1 ^ s) & 1;
                let i2 = !(j2 ^ s) & 1;
                let imm = s << 24
                    | i1 << 23
                    | i2 << 22
                    | (u32::from(hw1) & 0x3FF) << 12
                    | (u32::from(hw2) & 0x7FF) << 1;
                let offset = sign_extend(imm, 25);
                let target = (self.regs.pc() as u32).wrapping_add(offset);
                self.branch_to(target);
                Ok(())
            }
            0b101 => {
                // BL
                let i1 = !(j1 ^ s) & 1;
                let i2 = !(j2 ^ s) & 1;
                let imm = s << 24
                    | i1 << 23
                    | i2 << 22
                    | (u32::from(hw1) & 0x3FF) << 12
                    | (u32::from(hw2) & 0x7FF) << 1;
                let offset = sign_extend(imm, 25);
                let ret = self.regs.pc() as u32;
                self.regs.a32_set(&self.ps, 14, ret | 1);
                let target = ret.wrapping_add(offset);
                self.branch_to(target);
                Ok(())
            }
            _ => {
                // BLX (immediate): switches to ARM.
                let i1 = !(j1 ^ s) & 1;
                let i2 = !(j2 ^ s) & 1;
                let imm = s << 24
                    | i1 << 23
                    | i2 << 22
                    | (u32::from(hw1) & 0x3FF) << 12
                    | (u32::from(hw2) & 0x7FE) << 1;
                let offset = sign_extend(imm, 25);
                let ret = self.regs.pc() as u32;
                self.regs.a32_set(&self.ps, 14, ret | 1);
                let base = ret & !3;
                self.ps.set_jt_filtered(&self.cfg, InstrSet::Arm);
                self.branch_to(base.wrapping_add(offset));
                Ok(())
            }
        }
    }

    fn t32_misc_control(&mut self, hw1: u16, hw2: u16) -> ExecResult<()> {
        if hw1 & (1 << 10) != 0 {
            // The second page: HVC, SMC and the permanently undefined space.
            return match (hw1 >> 4) & 0xF {
                0b1110 => {
                    self.require_feature(Feature::Virtualization)?;
                    Err(Fault::Hvc {
                        imm: (u32::from(hw1) & 0xF) << 12 | (u32::from(hw2) & 0xFFF),
                    })
                }
                0b1111 => {
                    if hw2 & 0x7000 == 0x2000 {
                        // UDF.W
                        Err(self.undef())
                    } else {
                        self.require_feature(Feature::Security)?;
                        Err(Fault::Smc {
                            imm: u32::from(hw1) & 0xF,
                        })
                    }
                }
                _ => Err(self.undef()),
            };
        }
        match (hw1 >> 4) & 0xF {
            0b1000 | 0b1001 => {
                // MSR (register)
                let spsr = hw1 & (1 << 4) != 0;
                let mask = ((hw2 >> 8) & 0xF) as u8;
                let value = self.regs.a32_get(&self.ps, u32::from(hw1) & 0xF);
                self.write_psr_t32(spsr, mask, value)
            }
            0b1010 => Ok(()), // hint space
            0b1011 => match (hw2 >> 4) & 0xF {
                0b0000 => {
                    // LEAVEX
                    if self.ps.jt == InstrSet::ThumbEe {
                        self.ps.set_jt_filtered(&self.cfg, InstrSet::Thumb);
                    }
                    Ok(())
                }
                0b0001 => {
                    // ENTERX
                    if self.cfg.supports_isa(Isa::ThumbEe) {
                        self.ps.set_jt_filtered(&self.cfg, InstrSet::ThumbEe);
                    }
                    Ok(())
                }
                0b0010 => {
                    self.regs.monitor.clear();
                    Ok(())
                }
                0b0100 | 0b0101 | 0b0110 => Ok(()), // DSB/DMB/ISB
                _ => Err(self.undef()),
            },
            0b1100 => {
                // BXJ
                let rm = self.regs.a32_get(&self.ps, u32::from(hw1) & 0xF);
                self.bx_write(rm);
                Ok(())
            }
            0b1101 => {
                // Exception return: SUBS PC, LR, #imm8
                let imm = u32::from(hw2) & 0xFF;
                let spsr = self.spsr_current()?;
                let lr = self.regs.a32_get(&self.ps, 14);
                self.exception_return_a32(lr.wrapping_sub(imm), spsr);
                Ok(())
            }
            0b1110 | 0b1111 => {
                // MRS
                let spsr = hw1 & (1 << 4) != 0;
                let rd = u32::from(hw2 >> 8) & 0xF;
                let value = if spsr {
                    self.spsr_current()?
                } else {
                    self.ps.cpsr(&self.cfg)
                };
                self.regs.a32_set(&self.ps, rd, value);
                Ok(())
            }
            _ => Err(self.undef()),
        }
    }

    fn write_psr_t32(&mut self, spsr: bool, mask: u8, value: u32) -> ExecResult<()> {
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

    fn t32_block(&mut self, hw1: u16, hw2: u16) -> ExecResult<()> {
        let op = (hw1 >> 7) & 0x3;
        let w = hw1 & (1 << 5) != 0;
        let load = hw1 & (1 << 4) != 0;
        let rn = u32::from(hw1) & 0xF;
        let privileged = self.ps.privileged();
        match op {
            0b01 | 0b10 => {
                let list = u32::from(hw2);
                if list == 0 {
                    return Ok(());
                }
                let count = list.count_ones();
                let base = self.regs.a32_get(&self.ps, rn);
                let (start, wb) = if op == 0b01 {
                    (base, base.wrapping_add(4 * count))
                } else {
                    (base.wrapping_sub(4 * count), base.wrapping_sub(4 * count))
                };
                let mut addr = start;
                if w && !load {
                    self.regs.a32_set(&self.ps, rn, wb);
                }
                for reg in 0..16u32 {
                    if list & (1 << reg) == 0 {
                        continue;
                    }
                    if load {
                        let v = self.a32_read_word_aligned(addr, privileged)?;
                        if reg == 15 {
                            self.bx_write(v);
                        } else {
                            self.regs.a32_set(&self.ps, reg, v);
                        }
                    } else {
                        let v = self.regs.a32_get(&self.ps, reg);
                        self.a32_write_word_aligned(addr, v, privileged)?;
                    }
                    addr = addr.wrapping_add(4);
                }
                if w && load && list & (1 << rn) == 0 {
                    self.regs.a32_set(&self.ps, rn, wb);
                }
                Ok(())
            }
            _ => {
                // SRS / RFE
                if load {
                    let base = self.regs.a32_get(&self.ps, rn);
                    let start = if op == 0b11 { base } else { base.wrapping_sub(8) };
                    if !self.ps.privileged() {
                        return Err(self.undef());
                    }
                    let pc = self.a32_read_word_aligned(start, privileged)?;
                    let spsr = self.a32_read_word_aligned(start.wrapping_add(4), privileged)?;
                    if w {
                        let wb = if op == 0b11 {
                            base.wrapping_add(8)
                        } else {
                            base.wrapping_sub(8)
                        };
                        self.regs.a32_set(&self.ps, rn, wb);
                    }
                    self.exception_return_a32(pc, spsr);
                    Ok(())
                } else {
                    if !self.ps.privileged() {
                        return Err(self.undef());
                    }
                    let Some(mode) = self.mode_from_bits(u32::from(hw2) & 0x1F) else {
                        return Err(self.undef());
                    };
                    let base = self.regs.a32_get_mode(mode, 13);
                    let start = if op == 0b11 { base } else { base.wrapping_sub(8) };
                    let lr = self.regs.a32_get(&self.ps, 14);
                    let spsr = self.spsr_current()?;
                    self.a32_write_word_aligned(start, lr, privileged)?;
                    self.a32_write_word_aligned(start.wrapping_add(4), spsr, privileged)?;
                    if w {
                        let wb = if op == 0b11 {
                            base.wrapping_add(8)
                        } else {
                            base.wrapping_sub(8)
                        };
                        self.regs.a32_set_mode(mode, 13, wb);
                    }
                    Ok(())
                }
            }
        }
    }

    fn t32_dual_exclusive(&mut self, hw1: u16, hw2: u16) -> ExecResult<()> {
        let privileged = self.ps.privileged();
        let rn = u32::from(hw1) & 0xF;
        let op = (hw1 >> 4) & 0x1F;
        match op {
            0b00100 => {
                // STREX with scaled 8-bit offset
                let base = self.regs.a32_get(&self.ps, rn);
                let addr = base.wrapping_add((u32::from(hw2) & 0xFF) << 2);
                let rd = u32::from(hw2 >> 8) & 0xF;
                if addr & 3 != 0 {
                    return Err(Fault::Unaligned {
                        addr: u64::from(addr),
                    });
                }
                if self.regs.monitor.covers(u64::from(addr), 4) {
                    let v = self.regs.a32_get(&self.ps, u32::from(hw2 >> 12) & 0xF);
                    self.a32_write(addr, 4, u64::from(v), privileged)?;
                    self.regs.monitor.clear();
                    self.regs.a32_set(&self.ps, rd, 0);
                } else {
                    self.regs.a32_set(&self.ps, rd, 1);
                }
                Ok(())
            }
            0b00101 => {
                // LDREX with scaled 8-bit offset
                let base = self.regs.a32_get(&self.ps, rn);
                let addr = base.wrapping_add((u32::from(hw2) & 0xFF) << 2);
                if addr & 3 != 0 {
                    return Err(Fault::Unaligned {
                        addr: u64::from(addr),
                    });
                }
                self.regs.monitor.reserve(u64::from(addr), 4);
                let v = self.a32_read(addr, 4, privileged)? as u32;
                self.regs.a32_set(&self.ps, u32::from(hw2 >> 12) & 0xF, v);
                Ok(())
            }
            0b01100 => {
                // STREXB / STREXH / STREXD
                let base = self.regs.a32_get(&self.ps, rn);
                let rd = u32::from(hw2) & 0xF;
                match (hw2 >> 4) & 0xF {
                    0b0100 | 0b0101 => {
                        let size = if hw2 & (1 << 4) != 0 { 2u32 } else { 1 };
                        if base & (size - 1) != 0 {
                            return Err(Fault::Unaligned {
                                addr: u64::from(base),
                            });
                        }
                        if self.regs.monitor.covers(u64::from(base), u64::from(size)) {
                            let v = self.regs.a32_get(&self.ps, u32::from(hw2 >> 12) & 0xF);
                            self.a32_write(base, size, u64::from(v), privileged)?;
                            self.regs.monitor.clear();
                            self.regs.a32_set(&self.ps, rd, 0);
                        } else {
                            self.regs.a32_set(&self.ps, rd, 1);
                        }
                        Ok(())
                    }
                    0b0111 => {
                        if base & 7 != 0 {
                            return Err(Fault::Unaligned {
                                addr: u64::from(base),
                            });
                        }
                        if self.regs.monitor.covers(u64::from(base), 8) {
                            let lo = self.regs.a32_get(&self.ps, u32::from(hw2 >> 12) & 0xF);
                            let hi = self.regs.a32_get(&self.ps, u32::from(hw2 >> 8) & 0xF);
                            self.a32_write(base, 4, u64::from(lo), privileged)?;
                            self.a32_write(base.wrapping_add(4), 4, u64::from(hi), privileged)?;
                            self.regs.monitor.clear();
                            self.regs.a32_set(&self.ps, rd, 0);
                        } else {
                            self.regs.a32_set(&self.ps, rd, 1);
                        }
                        Ok(())
                    }
                    _ => Err(self.undef()),
                }
            }
            0b01101 => {
                // TBB / TBH / LDREXB / LDREXH / LDREXD
                let base = self.regs.a32_get(&self.ps, rn);
                match (hw2 >> 4) & 0xF {
                    0b0000 | 0b0001 => {
                        let half = hw2 & (1 << 4) != 0;
                        let rm = self.regs.a32_get(&self.ps, u32::from(hw2) & 0xF);
                        let table = if rn == 15 {
                            self.regs.pc() as u32
                        } else {
                            base
                        };
                        let offset = if half {
                            self.a32_read(table.wrapping_add(rm << 1), 2, privileged)? as u32
                        } else {
                            self.a32_read(table.wrapping_add(rm), 1, privileged)? as u32
                        };
                        let target = (self.regs.pc() as u32).wrapping_add(offset << 1);
                        self.branch_to(target);
                        Ok(())
                    }
                    0b0100 | 0b0101 => {
                        let size = if hw2 & (1 << 4) != 0 { 2u32 } else { 1 };
                        if base & (size - 1) != 0 {
                            return Err(Fault::Unaligned {
                                addr: u64::from(base),
                            });
                        }
                        self.regs.monitor.reserve(u64::from(base), u64::from(size));
                        let v = self.a32_read(base, size, privileged)? as u32;
                        self.regs.a32_set(&self.ps, u32::from(hw2 >> 12) & 0xF, v);
                        Ok(())
                    }
                    0b0111 => {
                        if base & 7 != 0 {
                            return Err(Fault::Unaligned {
                                addr: u64::from(base),
                            });
                        }
                        self.regs.monitor.reserve(u64::from(base), 8);
                        let lo = self.a32_read(base, 4, privileged)? as u32;
                        let hi = self.a32_read(base.wrapping_add(4), 4, privileged)? as u32;
                        self.regs.a32_set(&self.ps, u32::from(hw2 >> 12) & 0xF, lo);
                        self.regs.a32_set(&self.ps, u32::from(hw2 >> 8) & 0xF, hi);
                        Ok(())
                    }
                    _ => Err(self.undef()),
                }
            }
            _ => {
                // LDRD / STRD
                let p = hw1 & (1 << 8) != 0;
                let u = hw1 & (1 << 7) != 0;
                let w = hw1 & (1 << 5) != 0;
                let load = hw1 & (1 << 4) != 0;
                let base = if rn == 15 {
                    (self.regs.pc() as u32 + 2) & !3
                } else {
                    self.regs.a32_get(&self.ps, rn)
                };
                let imm = (u32::from(hw2) & 0xFF) << 2;
                let offset_addr = if u {
                    base.wrapping_add(imm)
                } else {
                    base.wrapping_sub(imm)
                };
                let addr = if p { offset_addr } else { base };
                let rt = u32::from(hw2 >> 12) & 0xF;
                let rt2 = u32::from(hw2 >> 8) & 0xF;
                if load {
                    let lo = self.a32_read(addr & !3, 4, privileged)? as u32;
                    let hi = self.a32_read((addr & !3).wrapping_add(4), 4, privileged)? as u32;
                    self.regs.a32_set(&self.ps, rt, lo);
                    self.regs.a32_set(&self.ps, rt2, hi);
                } else {
                    let lo = self.regs.a32_get(&self.ps, rt);
                    let hi = self.regs.a32_get(&self.ps, rt2);
                    self.a32_write(addr & !3, 4, u64::from(lo), privileged)?;
                    self.a32_write((addr & !3).wrapping_add(4), 4, u64::from(hi), privileged)?;
                }
                if w && rn != 15 {
                    self.regs.a32_set(&self.ps, rn, offset_addr);
                }
                Ok(())
            }
        }
    }

    fn t32_single_ldst(&mut self, hw1: u16, hw2: u16, ee: bool) -> ExecResult<()> {
        let privileged_default = self.ps.privileged();
        let sign = hw1 & (1 << 8) != 0;
        let size = match (hw1 >> 5) & 0x3 {
            0b00 => 1u32,
            0b01 => 2,
            0b10 => 4,
            _ => return Err(self.undef()),
        };
        let load = hw1 & (1 << 4) != 0;
        let rn = u32::from(hw1) & 0xF;
        let rt = u32::from(hw2 >> 12) & 0xF;

        let (addr, writeback, privileged) = if rn == 15 {
            if !load {
                return Err(self.undef());
            }
            let base = (self.regs.pc() as u32 + 2) & !3;
            let up = hw1 & (1 << 7) != 0;
            let imm = u32::from(hw2) & 0xFFF;
            (
                if up {
                    base.wrapping_add(imm)
                } else {
                    base.wrapping_sub(imm)
                },
                None,
                privileged_default,
            )
        } else {
            let base = self.regs.a32_get(&self.ps, rn);
            self.ee_null_check(ee, base)?;
            if hw1 & (1 << 7) != 0 {
                // imm12
                (base.wrapping_add(u32::from(hw2) & 0xFFF), None, privileged_default)
            } else if hw2 & (1 << 11) != 0 {
                let p = hw2 & (1 << 10) != 0;
                let u = hw2 & (1 << 9) != 0;
                let w = hw2 & (1 << 8) != 0;
                let imm = u32::from(hw2) & 0xFF;
                let offset_addr = if u {
                    base.wrapping_add(imm)
                } else {
                    base.wrapping_sub(imm)
                };
                let addr = if p { offset_addr } else { base };
                // LDRT/STRT form: P, U, not W
                let unpriv = p && u && !w && hw2 & (1 << 11) != 0 && (hw2 >> 8) & 0xF == 0b1110;
                (
                    addr,
                    (!p || w).then_some(offset_addr),
                    if unpriv { false } else { privileged_default },
                )
            } else if (hw2 >> 6) & 0x3F == 0 {
                let rm = self.regs.a32_get(&self.ps, u32::from(hw2) & 0xF);
                let shift = u32::from(hw2 >> 4) & 0x3;
                (base.wrapping_add(rm << shift), None, privileged_default)
            } else {
                return Err(self.undef());
            }
        };

        if load {
            let raw = self.a32_read(addr, size, privileged)? as u32;
            let value = if sign {
                sign_extend(raw, size * 8)
            } else {
                raw
            };
            if let Some(wb) = writeback {
                if rn != rt {
                    self.regs.a32_set(&self.ps, rn, wb);
                }
            }
            if rt == 15 {
                self.bx_write(value);
            } else {
                self.regs.a32_set(&self.ps, rt, value);
            }
        } else {
            let value = self.regs.a32_get(&self.ps, rt);
            self.a32_write(addr, size, u64::from(value), privileged)?;
            if let Some(wb) = writeback {
                self.regs.a32_set(&self.ps, rn, wb);
            }
        }
        Ok(())
    }

    fn t32_dp_register(&mut self, hw1: u16, hw2: u16) -> ExecResult<()> {
        let op1 = (hw1 >> 4) & 0xF;
        let rn_num = u32::from(hw1) & 0xF;
        let rd = u32::from(hw2 >> 8) & 0xF;
        let rm_num = u32::from(hw2) & 0xF;
        match op1 {
            0b0000 | 0b0001 | 0b0010 | 0b0011 | 0b0100 | 0b0101 | 0b0110 | 0b0111
                if (hw2 >> 4) & 0xF == 0 =>
            {
                // LSL/LSR/ASR/ROR by register
                let s = hw1 & (1 << 4) != 0;
                let shift = match op1 >> 1 {
                    0b00 => Shift::Lsl,
                    0b01 => Shift::Lsr,
                    0b10 => Shift::Asr,
                    _ => Shift::Ror,
                };
                let n = self.regs.a32_get(&self.ps, rn_num);
                let amount = self.regs.a32_get(&self.ps, rm_num) & 0xFF;
                let (r, c) = shift_c(n, shift, amount, self.ps.c);
                self.regs.a32_set(&self.ps, rd, r);
                if s {
                    self.thumb_flags_logical(r, c);
                }
                Ok(())
            }
            0b0000 | 0b0001 | 0b0100 | 0b0101 => {
                // SXTH/UXTH/SXTB/UXTB (.W) with rotation
                let rotate = (u32::from(hw2 >> 4) & 0x3) * 8;
                let rm = self.regs.a32_get(&self.ps, rm_num).rotate_right(rotate);
                let value = match op1 {
                    0b0000 => sign_extend(rm & 0xFFFF, 16),
                    0b0001 => rm & 0xFFFF,
                    0b0100 => sign_extend(rm & 0xFF, 8),
                    _ => rm & 0xFF,
                };
                let result = if rn_num == 15 {
                    value
                } else {
                    self.regs.a32_get(&self.ps, rn_num).wrapping_add(value)
                };
                self.regs.a32_set(&self.ps, rd, result);
                Ok(())
            }
            0b1001 => {
                // REV family
                let rm = self.regs.a32_get(&self.ps, rm_num);
                let value = match (hw2 >> 4) & 0xF {
                    0b1000 => rm.swap_bytes(),
                    0b1001 => (rm & 0xFF00_FF00) >> 8 | (rm & 0x00FF_00FF) << 8,
                    0b1010 => rm.reverse_bits(),
                    0b1011 => sign_extend((rm as u16).swap_bytes() as u32, 16),
                    _ => return Err(self.undef()),
                };
                self.regs.a32_set(&self.ps, rd, value);
                Ok(())
            }
            0b1010 if (hw2 >> 4) & 0xF == 0b1000 => {
                // SEL
                let rn = self.regs.a32_get(&self.ps, rn_num);
                let rm = self.regs.a32_get(&self.ps, rm_num);
                let mut result = 0u32;
                for lane in 0..4 {
                    let src = if self.ps.ge & (1 << lane) != 0 { rn } else { rm };
                    result |= src & (0xFF << (lane * 8));
                }
                self.regs.a32_set(&self.ps, rd, result);
                Ok(())
            }
            0b1011 if (hw2 >> 4) & 0xF == 0b1000 => {
                // CLZ
                let rm = self.regs.a32_get(&self.ps, rm_num);
                self.regs.a32_set(&self.ps, rd, rm.leading_zeros());
                Ok(())
            }
            _ => Err(self.undef()),
        }
    }

    fn t32_multiply(&mut self, hw1: u16, hw2: u16) -> ExecResult<()> {
        let op1 = (hw1 >> 4) & 0xF;
        let ra = u32::from(hw2 >> 12) & 0xF;
        let rd = u32::from(hw2 >> 8) & 0xF;
        let n = self.regs.a32_get(&self.ps, u32::from(hw1) & 0xF);
        let m = self.regs.a32_get(&self.ps, u32::from(hw2) & 0xF);
        if hw1 & (1 << 7) == 0 {
            // 32-bit multiply-accumulate
            match op1 {
                0b0000 => {
                    let r = if hw2 & (1 << 4) != 0 {
                        // MLS
                        self.regs
                            .a32_get(&self.ps, ra)
                            .wrapping_sub(n.wrapping_mul(m))
                    } else if ra == 15 {
                        n.wrapping_mul(m)
                    } else {
                        n.wrapping_mul(m)
                            .wrapping_add(self.regs.a32_get(&self.ps, ra))
                    };
                    self.regs.a32_set(&self.ps, rd, r);
                    Ok(())
                }
                _ => Err(self.undef()),
            }
        } else {
            match op1 {
                0b1000 | 0b1010 | 0b1100 | 0b1110 => {
                    // SMULL / UMULL / SMLAL / UMLAL
                    let unsigned = op1 & 0b0010 != 0;
                    let accumulate = op1 & 0b0100 != 0;
                    let product = if unsigned {
                        u64::from(n) * u64::from(m)
                    } else {
                        (i64::from(n as i32) * i64::from(m as i32)) as u64
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
                    Ok(())
                }
                0b1001 | 0b1011 => {
                    // SDIV / UDIV: division by zero yields zero.
                    let r = if m == 0 {
                        0
                    } else if op1 == 0b1001 {
                        ((n as i32).wrapping_div(m as i32)) as u32
                    } else {
                        n / m
                    };
                    self.regs.a32_set(&self.ps, rd, r);
                    Ok(())
                }
                _ => Err(self.undef()),
            }
        }
    }
}

fn low_mask(bits: u32) -> u32 {
    if bits >= 32 {
        !0
    } else {
        (1 << bits) - 1
    }
}
