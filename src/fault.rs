//! The architectural fault taxonomy.
//!
//! Every faulting primitive deep inside the instruction semantics returns
//! `Result<_, Fault>`; the error bubbles to the top of
//! [`step`](crate::Core::step), which either vectors architecturally or
//! reports the fault to the host.

use thiserror::Error;

use crate::consts::{
    A32_VECTOR_ADDRESS26, A32_VECTOR_DATA_ABORT, A32_VECTOR_FIQ, A32_VECTOR_IRQ,
    A32_VECTOR_PREFETCH_ABORT, A32_VECTOR_RESET, A32_VECTOR_SVC, A32_VECTOR_UNDEFINED, Mode,
};

/// Result type used throughout the instruction semantics.
pub(crate) type ExecResult<T> = Result<T, Fault>;

/// An architectural fault, a Jazelle/ThumbEE fault or an external event.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Processor reset.
    #[error("reset")]
    Reset,
    /// Undefined instruction.
    #[error("undefined instruction at {pc:#x}")]
    Undefined {
        /// Address of the instruction.
        pc: u64,
    },
    /// Supervisor call.
    #[error("supervisor call #{imm}")]
    Svc {
        /// The comment immediate of the SVC instruction.
        imm: u32,
    },
    /// Secure monitor call.
    #[error("secure monitor call #{imm}")]
    Smc {
        /// The immediate of the SMC instruction.
        imm: u32,
    },
    /// Hypervisor call.
    #[error("hypervisor call #{imm}")]
    Hvc {
        /// The immediate of the HVC instruction.
        imm: u32,
    },
    /// Instruction fetch rejected by the memory backend.
    #[error("prefetch abort at {addr:#x}")]
    PrefetchAbort {
        /// The faulting fetch address.
        addr: u64,
    },
    /// Data access rejected by the memory backend.
    #[error("data abort at {addr:#x}")]
    DataAbort {
        /// The faulting data address.
        addr: u64,
    },
    /// 26-bit address exception (access beyond 64MB).
    #[error("address exception at {addr:#x}")]
    Address26 {
        /// The faulting data address.
        addr: u64,
    },
    /// Interrupt request (injected by the host).
    #[error("interrupt")]
    Irq,
    /// Fast interrupt request (injected by the host).
    #[error("fast interrupt")]
    Fiq,
    /// System error / asynchronous abort.
    #[error("system error")]
    SError,
    /// Breakpoint instruction.
    #[error("breakpoint #{imm}")]
    Breakpoint {
        /// The breakpoint comment immediate.
        imm: u32,
    },
    /// Alignment fault on a data access.
    #[error("unaligned access at {addr:#x}")]
    Unaligned {
        /// The misaligned data address.
        addr: u64,
    },
    /// Misaligned A64 program counter.
    #[error("unaligned pc {pc:#x}")]
    UnalignedPc {
        /// The misaligned fetch address.
        pc: u64,
    },
    /// Misaligned A64 stack pointer.
    #[error("unaligned sp {sp:#x}")]
    UnalignedSp {
        /// The misaligned stack pointer.
        sp: u64,
    },
    /// Software-step debug exception.
    #[error("software step")]
    SoftwareStep,
    /// Bytecode with no hardware implementation and no handler table.
    #[error("unhandled bytecode {bytecode:#04x}")]
    JazelleUndefined {
        /// The bytecode value.
        bytecode: u8,
    },
    /// Null array or object reference.
    #[error("jazelle null pointer")]
    JazelleNullPtr,
    /// Array index out of range.
    #[error("jazelle index out of bounds")]
    JazelleOutOfBounds,
    /// Jazelle state entered while disabled or unimplemented.
    #[error("jazelle disabled")]
    JazelleDisabled,
    /// Inconsistent Jazelle machine state.
    #[error("jazelle invalid state")]
    JazelleInvalid,
    /// Bytecode fetch rejected by the memory backend.
    #[error("jazelle prefetch abort at {addr:#x}")]
    JazellePrefetchAbort {
        /// The faulting fetch address.
        addr: u64,
    },
    /// ThumbEE array bounds check failed.
    #[error("thumbee index out of bounds")]
    ThumbEeOutOfBounds,
    /// ThumbEE null-pointer check failed.
    #[error("thumbee null pointer")]
    ThumbEeNullPtr,
}

impl Fault {
    /// The AArch32 vector offset this fault enters through, or `None` for
    /// the ThumbEE handler-branch faults which do not vector.
    pub(crate) fn a32_vector(&self) -> Option<u64> {
        Some(match self {
            Fault::Reset => A32_VECTOR_RESET,
            Fault::Undefined { .. }
            | Fault::JazelleUndefined { .. }
            | Fault::JazelleDisabled
            | Fault::JazelleInvalid => A32_VECTOR_UNDEFINED,
            Fault::Svc { .. } | Fault::Smc { .. } | Fault::Hvc { .. } => A32_VECTOR_SVC,
            Fault::PrefetchAbort { .. }
            | Fault::Breakpoint { .. }
            | Fault::SoftwareStep
            | Fault::JazellePrefetchAbort { .. }
            | Fault::JazelleNullPtr
            | Fault::JazelleOutOfBounds => A32_VECTOR_PREFETCH_ABORT,
            Fault::DataAbort { .. }
            | Fault::Unaligned { .. }
            | Fault::UnalignedPc { .. }
            | Fault::UnalignedSp { .. }
            | Fault::SError => A32_VECTOR_DATA_ABORT,
            Fault::Address26 { .. } => A32_VECTOR_ADDRESS26,
            Fault::Irq => A32_VECTOR_IRQ,
            Fault::Fiq => A32_VECTOR_FIQ,
            Fault::ThumbEeOutOfBounds | Fault::ThumbEeNullPtr => return None,
        })
    }

    /// The AArch32 mode the fault is taken to.
    pub(crate) fn a32_target_mode(&self) -> Mode {
        match self {
            Fault::Reset => Mode::Svc,
            Fault::Undefined { .. }
            | Fault::JazelleUndefined { .. }
            | Fault::JazelleDisabled
            | Fault::JazelleInvalid => Mode::Und,
            Fault::Svc { .. } => Mode::Svc,
            Fault::Smc { .. } => Mode::Mon,
            Fault::Hvc { .. } => Mode::Hyp,
            Fault::Irq => Mode::Irq,
            Fault::Fiq => Mode::Fiq,
            _ => Mode::Abt,
        }
    }

    /// True for the Jazelle-specific fault kinds.
    pub fn is_jazelle(&self) -> bool {
        matches!(
            self,
            Fault::JazelleUndefined { .. }
                | Fault::JazelleNullPtr
                | Fault::JazelleOutOfBounds
                | Fault::JazelleDisabled
                | Fault::JazelleInvalid
                | Fault::JazellePrefetchAbort { .. }
        )
    }

    /// True for faults delivered asynchronously by the host.
    pub fn is_async(&self) -> bool {
        matches!(self, Fault::Irq | Fault::Fiq | Fault::SError | Fault::Reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_classification() {
        assert_eq!(Fault::Reset.a32_vector(), Some(A32_VECTOR_RESET));
        assert_eq!(Fault::Svc { imm: 0 }.a32_vector(), Some(A32_VECTOR_SVC));
        assert_eq!(
            Fault::DataAbort { addr: 0 }.a32_vector(),
            Some(A32_VECTOR_DATA_ABORT)
        );
        assert_eq!(Fault::ThumbEeNullPtr.a32_vector(), None);
        assert_eq!(Fault::Fiq.a32_target_mode(), Mode::Fiq);
        assert_eq!(Fault::Undefined { pc: 0 }.a32_target_mode(), Mode::Und);
    }
}
