//! armlet is a library emulating the CPU core of every ARM generation.
//!
//! The core interprets five instruction encodings (26-bit ARM, 32-bit ARM,
//! Thumb/Thumb-2/ThumbEE, Jazelle bytecode and A64) across architecture
//! versions ARMv1 through ARMv8, with switchable endianness (little, BE-8 and
//! the legacy word-invariant BE-32), a banked register file, architectural
//! exception vectoring and a 16-slot coprocessor table.
//!
//! The host supplies memory by implementing [`Memory`] and drives execution
//! one instruction at a time through [`Core::step`]. Faults either vector
//! architecturally (the next step begins at the handler) or, when the core is
//! configured to capture breaks, surface in the [`StepResult`].
//!
//! # Examples
//!
//! ```
//! use armlet::{ArchVersion, Config, Core, Memory, StepResult};
//!
//! struct Ram(Vec<u8>);
//!
//! impl Memory for Ram {
//!     fn read(&mut self, addr: u64, buf: &mut [u8], _privileged: bool) -> bool {
//!         let Some(end) = (addr as usize).checked_add(buf.len()) else { return false };
//!         let Some(src) = self.0.get(addr as usize..end) else { return false };
//!         buf.copy_from_slice(src);
//!         true
//!     }
//!
//!     fn write(&mut self, addr: u64, buf: &[u8], _privileged: bool) -> bool {
//!         let Some(end) = (addr as usize).checked_add(buf.len()) else { return false };
//!         let Some(dst) = self.0.get_mut(addr as usize..end) else { return false };
//!         dst.copy_from_slice(buf);
//!         true
//!     }
//! }
//!
//! let mut ram = Ram(vec![0; 0x1000]);
//! ram.0[0..4].copy_from_slice(&0xE3A0002Au32.to_le_bytes()); // MOV R0, #42
//! let mut core = Core::new(Config::for_version(ArchVersion::V7), ram).unwrap();
//! assert_eq!(core.step(), StepResult::Completed);
//! assert_eq!(core.a32_reg(0), 42);
//! ```

#![warn(missing_docs)]

pub mod config;
mod consts;
pub mod coproc;
mod core;
mod exception;
mod exec;
pub mod fault;
pub mod memory;
pub mod pstate;
pub mod regfile;
pub mod snapshot;

pub use flagset;

pub use crate::core::{Core, StepResult};
pub use config::{Config, ConfigError, FpVariant, JazelleLevel, Profile, ThumbLevel};
pub use consts::{ArchVersion, Condition, Endianness, Feature, Isa, Mode, SysReg};
pub use coproc::{Coprocessor, CpOp};
pub use fault::Fault;
pub use memory::Memory;
pub use pstate::Pstate;
pub use snapshot::{DebugChange, DebugState};
