//! The Jazelle bytecode engine.
//!
//! The operand stack grows upward in memory with R6 as the TOS pointer; the
//! top zero to four entries live circularly in R0-R3. The cache state (count
//! and which register holds the top) is carried in the low five bits of R5,
//! parsed into a working [`JazelleCache`] at the start of every bytecode and
//! merged back afterwards, so ARM code and exception handlers always see a
//! consistent R5. Locals live at R7, the constant pool at R8, the software
//! handler table at the page base held in R5.

use crate::config::JazelleLevel;
use crate::consts::{
    Feature, JMCR_JE, JOSCR_CD, JOSCR_FLAT_ARRAY, JZ_CACHE_COUNT_MASK, JZ_CACHE_COUNT_SHIFT,
    JZ_CACHE_TOP_MASK, JZ_HANDLER_MASK,
};
use crate::exec::{sign_extend, sign_extend64};
use crate::fault::{ExecResult, Fault};
use crate::memory::Memory;
use crate::pstate::InstrSet;

/// Working copy of the operand-stack cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JazelleCache {
    /// Number of stack entries cached in R0-R3 (0-4).
    pub count: u32,
    /// Register number holding the top entry (0-3).
    pub top: u32,
}

impl JazelleCache {
    pub fn from_r5(r5: u32) -> JazelleCache {
        JazelleCache {
            count: (r5 & JZ_CACHE_COUNT_MASK) >> JZ_CACHE_COUNT_SHIFT,
            top: r5 & JZ_CACHE_TOP_MASK,
        }
    }

    pub fn merge_into_r5(&self, r5: u32) -> u32 {
        (r5 & !(JZ_CACHE_COUNT_MASK | JZ_CACHE_TOP_MASK))
            | (self.count << JZ_CACHE_COUNT_SHIFT)
            | self.top
    }
}

impl<M: Memory> crate::core::Core<M> {
    pub(crate) fn step_jazelle(&mut self) -> ExecResult<()> {
        if !self.cfg.has(Feature::Jazelle)
            || self.cfg.jazelle < JazelleLevel::Jazelle
            || self.regs.jmcr & JMCR_JE == 0
        {
            return Err(Fault::JazelleDisabled);
        }
        let r5 = self.regs.a32_get(&self.ps, 5);
        let mut jz = JazelleCache::from_r5(r5);
        if jz.count > 4 {
            return Err(Fault::JazelleInvalid);
        }
        let result = self.jz_exec(&mut jz);
        let r5 = self.regs.a32_get(&self.ps, 5);
        self.regs.a32_set(&self.ps, 5, jz.merge_into_r5(r5));
        result
    }

    fn jz_fetch8(&mut self) -> ExecResult<u8> {
        let addr = self.regs.pc();
        let endian = self.data_endian();
        let privileged = self.ps.privileged();
        let byte = self
            .bus()
            .read_u8(addr, endian, privileged)
            .ok_or(Fault::JazellePrefetchAbort { addr })?;
        self.regs.set_pc_raw(addr.wrapping_add(1));
        Ok(byte)
    }

    /// Operand fetch; the bytecode stream is big-endian regardless of the
    /// data endianness.
    fn jz_fetch16(&mut self) -> ExecResult<u16> {
        let hi = self.jz_fetch8()?;
        let lo = self.jz_fetch8()?;
        Ok(u16::from(hi) << 8 | u16::from(lo))
    }

    fn jz_fetch32(&mut self) -> ExecResult<u32> {
        let hi = self.jz_fetch16()?;
        let lo = self.jz_fetch16()?;
        Ok(u32::from(hi) << 16 | u32::from(lo))
    }

    fn jz_read32(&mut self, addr: u32) -> ExecResult<u32> {
        let privileged = self.ps.privileged();
        Ok(self.a32_read(addr, 4, privileged)? as u32)
    }

    fn jz_write32(&mut self, addr: u32, value: u32) -> ExecResult<()> {
        let privileged = self.ps.privileged();
        self.a32_write(addr, 4, u64::from(value), privileged)
    }

    /// Spills the bottom-most cached entry to memory.
    fn jz_spill_one(&mut self, jz: &mut JazelleCache) -> ExecResult<()> {
        debug_assert!(jz.count > 0);
        let bottom = (jz.top + 5 - jz.count) & 3;
        let value = self.regs.a32_get(&self.ps, bottom);
        let tos = self.regs.a32_get(&self.ps, 6);
        self.jz_write32(tos, value)?;
        self.regs.a32_set(&self.ps, 6, tos.wrapping_add(4));
        jz.count -= 1;
        Ok(())
    }

    /// Spills every cached entry so R6 is the true stack pointer.
    fn jz_spill_all(&mut self, jz: &mut JazelleCache) -> ExecResult<()> {
        while jz.count > 0 {
            self.jz_spill_one(jz)?;
        }
        Ok(())
    }

    fn jz_push(&mut self, jz: &mut JazelleCache, value: u32) -> ExecResult<()> {
        if jz.count == 4 {
            self.jz_spill_one(jz)?;
        }
        jz.top = (jz.top + 1) & 3;
        self.regs.a32_set(&self.ps, jz.top, value);
        jz.count += 1;
        Ok(())
    }

    fn jz_pop(&mut self, jz: &mut JazelleCache) -> ExecResult<u32> {
        if jz.count == 0 {
            // Fill one entry from memory.
            let tos = self.regs.a32_get(&self.ps, 6).wrapping_sub(4);
            let value = self.jz_read32(tos)?;
            self.regs.a32_set(&self.ps, 6, tos);
            self.regs.a32_set(&self.ps, jz.top, value);
            jz.count = 1;
        }
        let value = self.regs.a32_get(&self.ps, jz.top);
        jz.top = (jz.top + 3) & 3;
        jz.count -= 1;
        Ok(value)
    }

    fn jz_local(&self, index: u32) -> u32 {
        self.regs
            .a32_get(&self.ps, 7)
            .wrapping_add(index.wrapping_mul(4))
    }

    fn jz_branch(&mut self, opcode_addr: u64, offset: u32) {
        self.regs
            .set_pc_raw(opcode_addr.wrapping_add(sign_extend64(u64::from(offset), 32)));
    }

    /// Spills the cache and transfers to the ARM handler for a bytecode the
    /// hardware does not execute.
    fn jz_handler(
        &mut self,
        jz: &mut JazelleCache,
        opcode: u8,
        opcode_addr: u64,
    ) -> ExecResult<()> {
        self.jz_spill_all(jz)?;
        self.regs.a32_set(&self.ps, 14, opcode_addr as u32);
        let base = (u64::from(self.regs.a32_get(&self.ps, 5)) & JZ_HANDLER_MASK) as u32;
        self.ps.set_jt_filtered(&self.cfg, InstrSet::Arm);
        self.regs
            .set_pc_raw(u64::from(base.wrapping_add(u32::from(opcode) * 4)));
        Ok(())
    }

    /// Element address of an array access, bounds and null checks included.
    /// Returns the address and leaves width handling to the caller.
    fn jz_array_element(
        &mut self,
        aref: u32,
        index: u32,
        width_shift: u32,
    ) -> ExecResult<u32> {
        if aref == 0 {
            return Err(Fault::JazelleNullPtr);
        }
        let jaolr = self.regs.jaolr;
        let length_offset = jaolr & 0x3FF;
        let subtract = jaolr & (1 << 10) != 0;
        let element_offset = (jaolr >> 12) & 0x3FF;
        let extra_shift = (jaolr >> 24) & 0x7;
        let length_addr = if subtract {
            aref.wrapping_sub(length_offset)
        } else {
            aref.wrapping_add(length_offset)
        };
        let length = self.jz_read32(length_addr)?;
        if index >= length {
            return Err(Fault::JazelleOutOfBounds);
        }
        let base = if self.regs.joscr & JOSCR_FLAT_ARRAY != 0 {
            aref.wrapping_add(element_offset)
        } else {
            self.jz_read32(aref.wrapping_add(element_offset))?
        };
        Ok(base.wrapping_add(index << (width_shift + extra_shift)))
    }

    fn jz_array_load(
        &mut self,
        jz: &mut JazelleCache,
        width_shift: u32,
        signed: bool,
    ) -> ExecResult<()> {
        let index = self.jz_pop(jz)?;
        let aref = self.jz_pop(jz)?;
        let addr = self.jz_array_element(aref, index, width_shift)?;
        let privileged = self.ps.privileged();
        let size = 1 << width_shift;
        let raw = self.a32_read(addr, size, privileged)? as u32;
        let value = if signed {
            sign_extend(raw, size * 8)
        } else {
            raw
        };
        self.jz_push(jz, value)
    }

    fn jz_array_store(&mut self, jz: &mut JazelleCache, width_shift: u32) -> ExecResult<()> {
        let value = self.jz_pop(jz)?;
        let index = self.jz_pop(jz)?;
        let aref = self.jz_pop(jz)?;
        let addr = self.jz_array_element(aref, index, width_shift)?;
        let privileged = self.ps.privileged();
        self.a32_write(addr, 1 << width_shift, u64::from(value), privileged)
    }

    fn jz_exec(&mut self, jz: &mut JazelleCache) -> ExecResult<()> {
        let opcode_addr = self.regs.pc();
        let opcode = self.jz_fetch8()?;
        if self.regs.joscr & JOSCR_CD != 0 {
            return self.jz_handler(jz, opcode, opcode_addr);
        }
        match opcode {
            0x00 => Ok(()),
            // aconst_null, iconst_m1 .. iconst_5
            0x01 => self.jz_push(jz, 0),
            0x02..=0x08 => self.jz_push(jz, (i32::from(opcode) - 3) as u32),
            0x10 => {
                let imm = self.jz_fetch8()?;
                self.jz_push(jz, sign_extend(u32::from(imm), 8))
            }
            0x11 => {
                let imm = self.jz_fetch16()?;
                self.jz_push(jz, sign_extend(u32::from(imm), 16))
            }
            0x12 => {
                let index = u32::from(self.jz_fetch8()?);
                let cp = self.regs.a32_get(&self.ps, 8);
                let value = self.jz_read32(cp.wrapping_add(index * 4))?;
                self.jz_push(jz, value)
            }
            0x13 => {
                let index = u32::from(self.jz_fetch16()?);
                let cp = self.regs.a32_get(&self.ps, 8);
                let value = self.jz_read32(cp.wrapping_add(index * 4))?;
                self.jz_push(jz, value)
            }
            // iload / aload and their short forms
            0x15 | 0x19 => {
                let index = u32::from(self.jz_fetch8()?);
                let value = self.jz_read32(self.jz_local(index))?;
                self.jz_push(jz, value)
            }
            0x1A..=0x1D => {
                let value = self.jz_read32(self.jz_local(u32::from(opcode) - 0x1A))?;
                self.jz_push(jz, value)
            }
            0x2A..=0x2D => {
                let value = self.jz_read32(self.jz_local(u32::from(opcode) - 0x2A))?;
                self.jz_push(jz, value)
            }
            // istore / astore and their short forms
            0x36 | 0x3A => {
                let index = u32::from(self.jz_fetch8()?);
                let value = self.jz_pop(jz)?;
                self.jz_write32(self.jz_local(index), value)
            }
            0x3B..=0x3E => {
                let value = self.jz_pop(jz)?;
                self.jz_write32(self.jz_local(u32::from(opcode) - 0x3B), value)
            }
            0x4B..=0x4E => {
                let value = self.jz_pop(jz)?;
                self.jz_write32(self.jz_local(u32::from(opcode) - 0x4B), value)
            }
            // Array loads
            0x2E | 0x32 => self.jz_array_load(jz, 2, false),
            0x33 => self.jz_array_load(jz, 0, true),
            0x34 => self.jz_array_load(jz, 1, false),
            0x35 => self.jz_array_load(jz, 1, true),
            // Array stores
            0x4F | 0x53 => self.jz_array_store(jz, 2),
            0x54 => self.jz_array_store(jz, 0),
            0x55 | 0x56 => self.jz_array_store(jz, 1),
            0x57 => {
                self.jz_pop(jz)?;
                Ok(())
            }
            0x58 => {
                self.jz_pop(jz)?;
                self.jz_pop(jz)?;
                Ok(())
            }
            0x59 => {
                let a = self.jz_pop(jz)?;
                self.jz_push(jz, a)?;
                self.jz_push(jz, a)
            }
            0x5A => {
                let b = self.jz_pop(jz)?;
                let a = self.jz_pop(jz)?;
                self.jz_push(jz, b)?;
                self.jz_push(jz, a)?;
                self.jz_push(jz, b)
            }
            0x5B => {
                let c = self.jz_pop(jz)?;
                let b = self.jz_pop(jz)?;
                let a = self.jz_pop(jz)?;
                self.jz_push(jz, c)?;
                self.jz_push(jz, a)?;
                self.jz_push(jz, b)?;
                self.jz_push(jz, c)
            }
            0x5C => {
                let b = self.jz_pop(jz)?;
                let a = self.jz_pop(jz)?;
                self.jz_push(jz, a)?;
                self.jz_push(jz, b)?;
                self.jz_push(jz, a)?;
                self.jz_push(jz, b)
            }
            0x5F => {
                let b = self.jz_pop(jz)?;
                let a = self.jz_pop(jz)?;
                self.jz_push(jz, b)?;
                self.jz_push(jz, a)
            }
            // Integer arithmetic
            0x60 | 0x64 | 0x68 | 0x7E | 0x80 | 0x82 => {
                let b = self.jz_pop(jz)?;
                let a = self.jz_pop(jz)?;
                let r = match opcode {
                    0x60 => a.wrapping_add(b),
                    0x64 => a.wrapping_sub(b),
                    0x68 => a.wrapping_mul(b),
                    0x7E => a & b,
                    0x80 => a | b,
                    _ => a ^ b,
                };
                self.jz_push(jz, r)
            }
            0x74 => {
                let a = self.jz_pop(jz)?;
                self.jz_push(jz, a.wrapping_neg())
            }
            0x78 | 0x7A | 0x7C => {
                let shift = self.jz_pop(jz)? & 31;
                let a = self.jz_pop(jz)?;
                let r = match opcode {
                    0x78 => a << shift,
                    0x7A => ((a as i32) >> shift) as u32,
                    _ => a >> shift,
                };
                self.jz_push(jz, r)
            }
            0x84 => {
                let index = u32::from(self.jz_fetch8()?);
                let delta = sign_extend(u32::from(self.jz_fetch8()?), 8);
                let addr = self.jz_local(index);
                let value = self.jz_read32(addr)?;
                self.jz_write32(addr, value.wrapping_add(delta))
            }
            // Narrowing conversions
            0x91 => {
                let a = self.jz_pop(jz)?;
                self.jz_push(jz, sign_extend(a & 0xFF, 8))
            }
            0x92 => {
                let a = self.jz_pop(jz)?;
                self.jz_push(jz, a & 0xFFFF)
            }
            0x93 => {
                let a = self.jz_pop(jz)?;
                self.jz_push(jz, sign_extend(a & 0xFFFF, 16))
            }
            // Single-operand compares
            0x99..=0x9E => {
                let offset = u32::from(self.jz_fetch16()?);
                let a = self.jz_pop(jz)? as i32;
                let taken = match opcode {
                    0x99 => a == 0,
                    0x9A => a != 0,
                    0x9B => a < 0,
                    0x9C => a >= 0,
                    0x9D => a > 0,
                    _ => a <= 0,
                };
                if taken {
                    self.jz_branch(opcode_addr, sign_extend(offset, 16));
                }
                Ok(())
            }
            // Two-operand compares
            0x9F..=0xA6 => {
                let offset = u32::from(self.jz_fetch16()?);
                let b = self.jz_pop(jz)?;
                let a = self.jz_pop(jz)?;
                let (sa, sb) = (a as i32, b as i32);
                let taken = match opcode {
                    0x9F | 0xA5 => a == b,
                    0xA0 | 0xA6 => a != b,
                    0xA1 => sa < sb,
                    0xA2 => sa >= sb,
                    0xA3 => sa > sb,
                    _ => sa <= sb,
                };
                if taken {
                    self.jz_branch(opcode_addr, sign_extend(offset, 16));
                }
                Ok(())
            }
            0xA7 => {
                let offset = u32::from(self.jz_fetch16()?);
                self.jz_branch(opcode_addr, sign_extend(offset, 16));
                Ok(())
            }
            0xC8 => {
                let offset = self.jz_fetch32()?;
                self.jz_branch(opcode_addr, offset);
                Ok(())
            }
            0xC6 | 0xC7 => {
                let offset = u32::from(self.jz_fetch16()?);
                let a = self.jz_pop(jz)?;
                if (a == 0) == (opcode == 0xC6) {
                    self.jz_branch(opcode_addr, sign_extend(offset, 16));
                }
                Ok(())
            }
            0xBE => {
                let aref = self.jz_pop(jz)?;
                if aref == 0 {
                    return Err(Fault::JazelleNullPtr);
                }
                let jaolr = self.regs.jaolr;
                let length_offset = jaolr & 0x3FF;
                let addr = if jaolr & (1 << 10) != 0 {
                    aref.wrapping_sub(length_offset)
                } else {
                    aref.wrapping_add(length_offset)
                };
                let length = self.jz_read32(addr)?;
                self.jz_push(jz, length)
            }
            0xB8 => self.jz_invoke_static(jz),
            0xAC | 0xB0 | 0xB1 => self.jz_return(jz, opcode != 0xB1),
            // Defined bytecodes without hardware support vector to the
            // software handler table.
            0x09..=0x0F
            | 0x14
            | 0x16..=0x18
            | 0x1E..=0x29
            | 0x2F..=0x31
            | 0x37..=0x39
            | 0x3F..=0x4A
            | 0x50..=0x52
            | 0x5D
            | 0x5E
            | 0x61..=0x63
            | 0x65..=0x67
            | 0x69..=0x73
            | 0x75..=0x77
            | 0x79
            | 0x7B
            | 0x7D
            | 0x7F
            | 0x81
            | 0x83
            | 0x85..=0x90
            | 0x94..=0x98
            | 0xA8..=0xAB
            | 0xAD..=0xAF
            | 0xB2..=0xB7
            | 0xB9..=0xBD
            | 0xBF..=0xC5
            | 0xC9
            | 0xCA => self.jz_handler(jz, opcode, opcode_addr),
            _ => Err(Fault::JazelleUndefined { bytecode: opcode }),
        }
    }

    fn jz_invoke_static(&mut self, jz: &mut JazelleCache) -> ExecResult<()> {
        let index = u32::from(self.jz_fetch16()?);
        let cp = self.regs.a32_get(&self.ps, 8);
        let method = self.jz_read32(cp.wrapping_add(index * 4))?;
        if method == 0 {
            return Err(Fault::JazelleNullPtr);
        }
        let argc = self.jz_read32(method)?;
        let locals = self.jz_read32(method.wrapping_add(4))?;
        let new_cp = self.jz_read32(method.wrapping_add(8))?;

        self.jz_spill_all(jz)?;
        let tos = self.regs.a32_get(&self.ps, 6);
        let frame_locals = tos.wrapping_sub(argc.wrapping_mul(4));
        let mut sp = frame_locals.wrapping_add(locals.wrapping_mul(4));

        let return_pc = self.regs.pc() as u32;
        for value in [
            return_pc,
            self.regs.a32_get(&self.ps, 7),
            self.regs.a32_get(&self.ps, 8),
            self.regs.a32_get(&self.ps, 4),
        ] {
            self.jz_write32(sp, value)?;
            sp = sp.wrapping_add(4);
        }

        self.regs.a32_set(&self.ps, 7, frame_locals);
        self.regs.a32_set(&self.ps, 8, new_cp);
        self.regs.a32_set(&self.ps, 6, sp);
        self.regs.a32_set(&self.ps, 4, sp);
        self.regs.set_pc_raw(u64::from(method.wrapping_add(12)));
        Ok(())
    }

    fn jz_return(&mut self, jz: &mut JazelleCache, has_value: bool) -> ExecResult<()> {
        let value = if has_value {
            Some(self.jz_pop(jz)?)
        } else {
            None
        };
        self.jz_spill_all(jz)?;

        let link = self.regs.a32_get(&self.ps, 4);
        let frame = link.wrapping_sub(16);
        let return_pc = self.jz_read32(frame)?;
        let old_locals = self.jz_read32(frame.wrapping_add(4))?;
        let old_cp = self.jz_read32(frame.wrapping_add(8))?;
        let old_link = self.jz_read32(frame.wrapping_add(12))?;

        // The callee's locals base is the caller's TOS once the arguments
        // are consumed.
        let caller_tos = self.regs.a32_get(&self.ps, 7);
        self.regs.a32_set(&self.ps, 6, caller_tos);
        self.regs.a32_set(&self.ps, 7, old_locals);
        self.regs.a32_set(&self.ps, 8, old_cp);
        self.regs.a32_set(&self.ps, 4, old_link);
        self.regs.set_pc_raw(u64::from(return_pc));

        if let Some(value) = value {
            self.jz_push(jz, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_bits_round_trip() {
        let jz = JazelleCache { count: 3, top: 2 };
        let r5 = jz.merge_into_r5(0xDEAD_B000);
        assert_eq!(r5 & 0x1F, 0b0_1110);
        assert_eq!(JazelleCache::from_r5(r5), jz);
        assert_eq!(r5 & !0xFFF, 0xDEAD_B000);
    }
}
