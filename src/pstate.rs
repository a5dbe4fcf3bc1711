//! The structured program state and its packed CPSR/SPSR forms.

use num_traits::FromPrimitive;

use crate::config::Config;
use crate::consts::{
    ArchVersion, Feature, Isa, Mode, CPSR_A, CPSR_C, CPSR_E, CPSR_F, CPSR_I, CPSR_J, CPSR_MODE,
    CPSR_N, CPSR_PAN, CPSR_Q, CPSR_T, CPSR_V, CPSR_Z, PSR26_F, PSR26_I, PSR26_MODE,
};

/// Width of the register/address scheme currently in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegWidth {
    /// 26-bit address space (PC and PSR share a word).
    R26,
    /// AArch32.
    R32,
    /// AArch64.
    R64,
}

/// The J/T instruction-set selector of the AArch32 PSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrSet {
    /// ARM encodings.
    Arm,
    /// Thumb encodings.
    Thumb,
    /// Jazelle bytecode.
    Jazelle,
    /// ThumbEE encodings.
    ThumbEe,
}

/// The processor state: flags, mode, exception level, interrupt masks,
/// IT-state and the instruction-set selector. Kept as a plain struct; the
/// packed CPSR word is derived on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pstate {
    /// Register width selector.
    pub rw: RegWidth,
    /// AArch32 mode.
    pub mode: Mode,
    /// AArch64 exception level (0-3).
    pub el: u8,
    /// AArch64 stack-pointer selector (false = SP_EL0).
    pub sp: bool,
    /// FIQ disable.
    pub f: bool,
    /// IRQ disable.
    pub i: bool,
    /// Asynchronous abort disable.
    pub a: bool,
    /// Debug mask (AArch64).
    pub d: bool,
    /// Data endianness (AArch32; big when set).
    pub e: bool,
    /// The four SIMD greater-or-equal lanes.
    pub ge: u8,
    /// If-Then execution state.
    pub it: u8,
    /// Instruction-set selector (AArch32).
    pub jt: InstrSet,
    /// Sticky saturation flag.
    pub q: bool,
    /// Illegal-execution state.
    pub il: bool,
    /// Software-step flag.
    pub ss: bool,
    /// Privileged-access-never.
    pub pan: bool,
    /// User-access-override.
    pub uao: bool,
    /// Negative flag.
    pub n: bool,
    /// Zero flag.
    pub z: bool,
    /// Carry flag.
    pub c: bool,
    /// Overflow flag.
    pub v: bool,
}

impl Pstate {
    /// The reset state for a configuration: the highest implemented privilege
    /// with all interrupts masked.
    pub(crate) fn reset(cfg: &Config) -> Pstate {
        let mut ps = Pstate {
            rw: RegWidth::R32,
            mode: Mode::Svc,
            el: 1,
            sp: true,
            f: true,
            i: true,
            a: true,
            d: true,
            e: cfg.endianness != crate::consts::Endianness::Little,
            ge: 0,
            it: 0,
            jt: InstrSet::Arm,
            q: false,
            il: false,
            ss: false,
            pan: false,
            uao: false,
            n: false,
            z: false,
            c: false,
            v: false,
        };
        if cfg.supports_isa(Isa::A64) {
            ps.rw = RegWidth::R64;
            ps.el = if cfg.has(Feature::Security) {
                3
            } else if cfg.has(Feature::Virtualization) {
                2
            } else {
                1
            };
        } else if !cfg.supports_isa(Isa::Arm32) {
            ps.rw = RegWidth::R26;
            ps.mode = Mode::Svc26;
        }
        ps
    }

    /// True when the current mode or exception level is privileged.
    pub fn privileged(&self) -> bool {
        match self.rw {
            RegWidth::R64 => self.el != 0,
            _ => self.mode.is_privileged(),
        }
    }

    /// The NZCV flags packed into bits 31:28.
    pub fn nzcv(&self) -> u32 {
        (u32::from(self.n) << 31)
            | (u32::from(self.z) << 30)
            | (u32::from(self.c) << 29)
            | (u32::from(self.v) << 28)
    }

    /// Unpacks bits 31:28 into the NZCV flags.
    pub fn set_nzcv(&mut self, value: u32) {
        self.n = value & CPSR_N != 0;
        self.z = value & CPSR_Z != 0;
        self.c = value & CPSR_C != 0;
        self.v = value & CPSR_V != 0;
    }

    /// The instruction set the dispatcher will decode next.
    pub fn isa(&self, cfg: &Config) -> Isa {
        match self.rw {
            RegWidth::R26 => Isa::Arm26,
            RegWidth::R64 => Isa::A64,
            RegWidth::R32 => match self.jt {
                InstrSet::Arm => Isa::Arm32,
                InstrSet::Thumb => {
                    if cfg.has(Feature::Thumb2) {
                        Isa::Thumb2
                    } else {
                        Isa::Thumb
                    }
                }
                InstrSet::Jazelle => Isa::Jazelle,
                InstrSet::ThumbEe => Isa::ThumbEe,
            },
        }
    }

    /// Switches the instruction-set selector, silently degrading an
    /// unsupported request to the nearest supported set
    /// (requested, then Thumb, then ARM32, then ARM26).
    pub(crate) fn set_jt_filtered(&mut self, cfg: &Config, requested: InstrSet) {
        let supported = |set: InstrSet| match set {
            InstrSet::Arm => cfg.supports_isa(Isa::Arm32) || cfg.supports_isa(Isa::Arm26),
            InstrSet::Thumb => cfg.supports_isa(Isa::Thumb) || cfg.supports_isa(Isa::Thumb2),
            InstrSet::Jazelle => cfg.supports_isa(Isa::Jazelle),
            InstrSet::ThumbEe => cfg.supports_isa(Isa::ThumbEe),
        };
        let granted = if supported(requested) {
            requested
        } else if supported(InstrSet::Thumb) {
            InstrSet::Thumb
        } else {
            InstrSet::Arm
        };
        if granted != requested {
            log::warn!("unsupported instruction-set switch to {requested:?}, staying on {granted:?}");
        }
        if granted != InstrSet::Thumb && granted != InstrSet::ThumbEe {
            self.it = 0;
        }
        self.jt = granted;
    }

    /// Builds the packed AArch32 CPSR from the state, gated on the features
    /// the configuration owns.
    pub fn cpsr(&self, cfg: &Config) -> u32 {
        let mut psr = self.nzcv() | self.mode as u32;
        if cfg.has(Feature::EnhDsp) && self.q {
            psr |= CPSR_Q;
        }
        if matches!(self.jt, InstrSet::Jazelle | InstrSet::ThumbEe) {
            psr |= CPSR_J;
        }
        if matches!(self.jt, InstrSet::Thumb | InstrSet::ThumbEe) {
            psr |= CPSR_T;
        }
        if cfg.version >= ArchVersion::V6 {
            psr |= u32::from(self.ge & 0xF) << 16;
            if self.e {
                psr |= CPSR_E;
            }
            if self.a {
                psr |= CPSR_A;
            }
        }
        if cfg.has(Feature::Thumb2) {
            psr |= u32::from(self.it & 0x3) << 25;
            psr |= u32::from(self.it >> 2) << 10;
        }
        if cfg.version >= ArchVersion::V8 && self.pan {
            psr |= CPSR_PAN;
        }
        if self.i {
            psr |= CPSR_I;
        }
        if self.f {
            psr |= CPSR_F;
        }
        psr
    }

    /// Writes the CPSR through a per-byte field mask (bit 0 = control byte,
    /// bit 3 = flags byte). Fields the configuration does not own are left
    /// unchanged; an attempt to clear the mode-width bit on a processor
    /// without 26-bit support is rejected. `execution_write` marks exception
    /// returns, which alone may change the T/J bits and the IT state.
    pub(crate) fn write_cpsr(
        &mut self,
        cfg: &Config,
        value: u32,
        field_mask: u8,
        execution_write: bool,
    ) {
        let privileged = self.privileged();

        if field_mask & 0b1000 != 0 {
            self.set_nzcv(value);
            if cfg.has(Feature::EnhDsp) {
                self.q = value & CPSR_Q != 0;
            }
            if execution_write {
                self.apply_jt_bits(cfg, value);
            }
        }
        if field_mask & 0b0100 != 0 {
            if cfg.version >= ArchVersion::V6 {
                self.ge = ((value >> 16) & 0xF) as u8;
            }
            if cfg.version >= ArchVersion::V8 && privileged {
                self.pan = value & CPSR_PAN != 0;
            }
        }
        if field_mask & 0b0010 != 0 && cfg.version >= ArchVersion::V6 {
            if privileged {
                self.a = value & CPSR_A != 0;
            }
            self.e = value & CPSR_E != 0;
            if execution_write && cfg.has(Feature::Thumb2) {
                self.it = (self.it & 0x3) | (((value >> 10) & 0x3F) << 2) as u8;
            }
        }
        if field_mask & 0b1000 != 0 && execution_write && cfg.has(Feature::Thumb2) {
            self.it = (self.it & 0xFC) | ((value >> 25) & 0x3) as u8;
        }
        if field_mask & 0b0001 != 0 && privileged {
            self.i = value & CPSR_I != 0;
            self.f = value & CPSR_F != 0;
            if execution_write {
                self.apply_jt_bits(cfg, value);
            }
            self.apply_mode_bits(cfg, value);
        }
    }

    fn apply_jt_bits(&mut self, cfg: &Config, value: u32) {
        let requested = match (value & CPSR_J != 0, value & CPSR_T != 0) {
            (false, false) => InstrSet::Arm,
            (false, true) => InstrSet::Thumb,
            (true, false) => InstrSet::Jazelle,
            (true, true) => InstrSet::ThumbEe,
        };
        self.set_jt_filtered(cfg, requested);
    }

    fn apply_mode_bits(&mut self, cfg: &Config, value: u32) {
        let bits = value & CPSR_MODE;
        // Dropping M4 selects a 26-bit mode, which only 26-bit-capable
        // processors accept.
        if bits & 0x10 == 0 && !cfg.has(Feature::Arm26) {
            return;
        }
        let Some(mode) = Mode::from_u32(bits) else {
            return;
        };
        if !mode_implemented(cfg, mode) {
            return;
        }
        self.mode = mode;
        self.rw = if mode.is_26bit() {
            self.jt = InstrSet::Arm;
            RegWidth::R26
        } else {
            RegWidth::R32
        };
    }

    /// Packs the state into an SPSR word: the CPSR form when taken from
    /// AArch32, the AArch64 layout otherwise.
    pub(crate) fn spsr_pack(&self, cfg: &Config) -> u32 {
        match self.rw {
            RegWidth::R64 => {
                let mut spsr = self.nzcv();
                spsr |= u32::from(self.el) << 2;
                if self.sp {
                    spsr |= 1;
                }
                if self.f {
                    spsr |= 1 << 6;
                }
                if self.i {
                    spsr |= 1 << 7;
                }
                if self.a {
                    spsr |= 1 << 8;
                }
                if self.d {
                    spsr |= 1 << 9;
                }
                if self.il {
                    spsr |= 1 << 20;
                }
                if self.ss {
                    spsr |= 1 << 21;
                }
                if self.pan {
                    spsr |= 1 << 22;
                }
                if self.uao {
                    spsr |= 1 << 23;
                }
                spsr
            }
            _ => self.cpsr(cfg),
        }
    }

    /// Restores the state from an SPSR word (exception return). Bit 4
    /// selects between an AArch32 and an AArch64 target; a clear bit on a
    /// processor without AArch64 is a 26-bit mode restore.
    pub(crate) fn restore_spsr(&mut self, cfg: &Config, spsr: u32) {
        let to_aarch32 = spsr & 0x10 != 0 || !cfg.supports_isa(Isa::A64);
        if to_aarch32 && (cfg.supports_isa(Isa::Arm32) || cfg.supports_isa(Isa::Arm26)) {
            self.rw = RegWidth::R32;
            self.write_cpsr(cfg, spsr, 0b1111, true);
        } else if cfg.supports_isa(Isa::A64) {
            self.rw = RegWidth::R64;
            self.set_nzcv(spsr);
            self.el = ((spsr >> 2) & 0x3) as u8;
            self.sp = spsr & 1 != 0;
            self.f = spsr & (1 << 6) != 0;
            self.i = spsr & (1 << 7) != 0;
            self.a = spsr & (1 << 8) != 0;
            self.d = spsr & (1 << 9) != 0;
            self.il = spsr & (1 << 20) != 0;
            self.ss = spsr & (1 << 21) != 0;
            self.pan = spsr & (1 << 22) != 0;
            self.uao = spsr & (1 << 23) != 0;
        }
    }

    /// The 26-bit PSR fields merged around a PC value.
    pub(crate) fn psr26(&self, pc: u32) -> u32 {
        let mut psr = self.nzcv() | (pc & crate::consts::PSR26_PC);
        if self.i {
            psr |= PSR26_I;
        }
        if self.f {
            psr |= PSR26_F;
        }
        psr | (self.mode as u32 & PSR26_MODE)
    }

    /// Restores the flag/interrupt/mode fields from a 26-bit PSR word. Mode
    /// and interrupt bits only change in privileged modes.
    pub(crate) fn write_psr26(&mut self, cfg: &Config, value: u32) {
        self.set_nzcv(value);
        if self.privileged() {
            self.i = value & PSR26_I != 0;
            self.f = value & PSR26_F != 0;
            if let Some(mode) = Mode::from_u32(value & PSR26_MODE) {
                if mode_implemented(cfg, mode) {
                    self.mode = mode;
                }
            }
        }
    }

    /// The condition governing the current instruction inside an IT block,
    /// or `None` outside one.
    pub(crate) fn it_condition(&self) -> Option<u8> {
        if self.it == 0 {
            None
        } else {
            Some(self.it >> 4)
        }
    }

    /// Shifts the IT state past the current instruction.
    pub(crate) fn advance_it(&mut self) {
        if self.it & 0x7 == 0 {
            self.it = 0;
        } else {
            self.it = (self.it & 0xE0) | ((self.it << 1) & 0x1F);
        }
    }
}

pub(crate) fn mode_implemented(cfg: &Config, mode: Mode) -> bool {
    match mode {
        Mode::Usr26 | Mode::Fiq26 | Mode::Irq26 | Mode::Svc26 => cfg.has(Feature::Arm26),
        Mode::Usr | Mode::Fiq | Mode::Irq | Mode::Svc | Mode::Sys => cfg.has(Feature::Arm32),
        Mode::Abt | Mode::Und => cfg.has(Feature::Arm32) && cfg.version >= ArchVersion::V3,
        Mode::Mon => cfg.has(Feature::Security),
        Mode::Hyp => cfg.has(Feature::Virtualization),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::consts::ArchVersion;

    fn state(cfg: &Config) -> Pstate {
        let mut ps = Pstate::reset(cfg);
        ps.rw = RegWidth::R32;
        ps.mode = Mode::Svc;
        ps
    }

    #[test]
    fn cpsr_round_trips_owned_fields() {
        let cfg = Config::for_version(ArchVersion::V7);
        let mut ps = state(&cfg);
        ps.n = true;
        ps.c = true;
        ps.q = true;
        ps.ge = 0b1010;
        ps.e = true;
        let word = ps.cpsr(&cfg);

        let mut other = state(&cfg);
        other.write_cpsr(&cfg, word, 0b1111, true);
        assert_eq!(other.cpsr(&cfg), word);
    }

    #[test]
    fn mode_width_flip_needs_arm26() {
        let cfg = Config::for_version(ArchVersion::V7);
        let mut ps = state(&cfg);
        ps.write_cpsr(&cfg, Mode::Svc26 as u32, 0b0001, false);
        assert_eq!(ps.mode, Mode::Svc);
        assert_eq!(ps.rw, RegWidth::R32);

        let cfg26 = Config::for_version(ArchVersion::V3);
        let mut ps = state(&cfg26);
        ps.write_cpsr(&cfg26, Mode::Svc26 as u32, 0b0001, false);
        assert_eq!(ps.mode, Mode::Svc26);
        assert_eq!(ps.rw, RegWidth::R26);
    }

    #[test]
    fn unsupported_jt_is_remapped() {
        let mut cfg = Config::for_version(ArchVersion::V5);
        cfg.isas -= Isa::Jazelle;
        let mut ps = state(&cfg);
        ps.set_jt_filtered(&cfg, InstrSet::Jazelle);
        assert_eq!(ps.jt, InstrSet::Thumb);

        cfg.isas -= Isa::Thumb;
        ps.set_jt_filtered(&cfg, InstrSet::Jazelle);
        assert_eq!(ps.jt, InstrSet::Arm);
    }

    #[test]
    fn it_advance_matches_ittee() {
        let cfg = Config::for_version(ArchVersion::V7);
        let mut ps = state(&cfg);
        ps.it = 0b0000_0011; // ITTEE EQ
        assert_eq!(ps.it_condition(), Some(0b0000));
        ps.advance_it();
        assert_eq!(ps.it_condition(), Some(0b0000));
        ps.advance_it();
        assert_eq!(ps.it_condition(), Some(0b0001));
        ps.advance_it();
        assert_eq!(ps.it_condition(), Some(0b0001));
        ps.advance_it();
        assert_eq!(ps.it, 0);
    }

    #[test]
    fn user_mode_cpsr_write_keeps_masks() {
        let cfg = Config::for_version(ArchVersion::V6);
        let mut ps = state(&cfg);
        ps.mode = Mode::Usr;
        ps.i = true;
        ps.write_cpsr(&cfg, 0, 0b0001, false);
        assert!(ps.i);
        assert_eq!(ps.mode, Mode::Usr);
    }
}
