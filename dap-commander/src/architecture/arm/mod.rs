//! All the interface bits for ARM.

pub mod ap;
pub mod core;
pub mod dp;
pub mod memory;

use std::fmt::Debug;

use crate::{core::RegisterId, probe::DebugProbeError};

pub use self::core::{cortex_m::CortexM, CortexMState, ResetMethod, ResetTiming};
pub use memory::{ADIMemoryInterface, ArmMemoryInterface};

/// The type of port a DAP transfer goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortType {
    /// The debug port itself.
    DebugPort,
    /// The currently selected access port.
    AccessPort,
}

/// A DP or AP register.
pub trait Register: Clone + From<u32> + Into<u32> + Sized + Debug {
    /// The address of the register within its port (bank in the upper nibble).
    const ADDRESS: u8;
    /// The register's name.
    const NAME: &'static str;
}

/// ARM-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ArmError {
    /// The debug probe reported an error.
    #[error("An error occurred in the communication with the debug probe")]
    Probe(#[from] DebugProbeError),
    /// The register name is not known.
    #[error("Unknown core register '{0}'")]
    UnknownRegister(String),
    /// The register can only be accessed on cores with a floating point unit.
    #[error("Register {0} requires a floating point unit, but the core has none")]
    UnsupportedRegister(RegisterId),
    /// The core did not signal a completed register transfer.
    #[error("Register {register} was not ready after the transfer (DHCSR = {dhcsr:#010x})")]
    ProtocolViolation {
        /// The register that was transferred.
        register: RegisterId,
        /// The DHCSR value read after the transfer.
        dhcsr: u32,
    },
    /// The number of values does not match the number of registers in a batch write.
    #[error("Tried to write {values} values to {registers} registers")]
    RegisterCountMismatch {
        /// Registers in the batch.
        registers: usize,
        /// Values in the batch.
        values: usize,
    },
    /// Timeout occurred during operation.
    #[error("Timeout occurred during operation.")]
    Timeout,
    /// The address is not aligned to the access width.
    #[error("Failed to access address {address:#010x} as it is not aligned to the requirement of {alignment} bytes.")]
    MemoryNotAligned {
        /// The address of the access.
        address: u32,
        /// The required alignment in bytes.
        alignment: usize,
    },
    /// The access would run past the end of the 32 bit address space.
    #[error("Accessing {len} bytes at {address:#010x} exceeds the address space")]
    OutOfBounds {
        /// The address of the access.
        address: u32,
        /// The length of the access in bytes.
        len: usize,
    },
    /// The result of a deferred read was lost because its batch failed.
    #[error("The result of a deferred read is not available")]
    MissingResult,
    /// The debug port did not acknowledge the power up request.
    #[error("Target power-up failed.")]
    TargetPowerUpFailed,
}

impl ArmError {
    /// Returns `true` for errors that stem from a failed transfer on the wire.
    ///
    /// These are expected while the target is resetting.
    pub fn is_transfer_error(&self) -> bool {
        matches!(
            self,
            ArmError::Probe(DebugProbeError::Transfer(_)) | ArmError::MissingResult
        )
    }
}
