//! Cortex-M run control and core register access.

use std::time::Duration;

use self::armv7m::{CpuId, Mvfr0};
use super::{memory::ArmMemoryInterface, ArmError};
use crate::MemoryMappedRegister;

pub mod armv7m;
pub mod cortex_m;
pub mod registers;

/// The Cortex-M variants identified by the CPUID part number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CortexMType {
    CortexM0,
    CortexM1,
    CortexM3,
    CortexM4,
    CortexM7,
    CortexM0Plus,
}

impl CortexMType {
    /// Maps a CPUID part number to a core.
    pub fn from_partno(partno: u16) -> Option<Self> {
        match partno {
            0xC20 => Some(CortexMType::CortexM0),
            0xC21 => Some(CortexMType::CortexM1),
            0xC23 => Some(CortexMType::CortexM3),
            0xC24 => Some(CortexMType::CortexM4),
            0xC27 => Some(CortexMType::CortexM7),
            0xC60 => Some(CortexMType::CortexM0Plus),
            _ => None,
        }
    }

    /// Only these cores can have a floating point unit.
    fn may_have_fpu(self) -> bool {
        matches!(self, CortexMType::CortexM4 | CortexMType::CortexM7)
    }
}

impl std::fmt::Display for CortexMType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CortexMType::CortexM0 => "Cortex-M0",
            CortexMType::CortexM1 => "Cortex-M1",
            CortexMType::CortexM3 => "Cortex-M3",
            CortexMType::CortexM4 => "Cortex-M4",
            CortexMType::CortexM7 => "Cortex-M7",
            CortexMType::CortexM0Plus => "Cortex-M0+",
        };
        f.write_str(name)
    }
}

/// How [`cortex_m::CortexM::reset`] resets the target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResetMethod {
    /// Request a system reset through AIRCR.SYSRESETREQ.
    SystemResetRequest,
    /// Reset the debug link through the probe.
    LineReset,
}

/// Timing of the poll that waits for a reset to finish.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResetTiming {
    /// How long the core may stay in reset.
    pub timeout: Duration,
    /// Pause after a failed transfer before polling again.
    pub backoff: Duration,
}

impl Default for ResetTiming {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            backoff: Duration::from_millis(10),
        }
    }
}

/// The information about a Cortex-M core that persists between accesses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CortexMState {
    /// The core variant, `None` if CPUID was not recognized.
    pub core_type: Option<CortexMType>,
    /// Whether the floating point registers can be accessed.
    pub fp_present: bool,
    /// Timing of the reset poll.
    pub reset_timing: ResetTiming,
}

impl Default for CortexMState {
    fn default() -> Self {
        Self {
            core_type: None,
            fp_present: false,
            reset_timing: ResetTiming::default(),
        }
    }
}

impl CortexMState {
    /// Identifies the core from CPUID and, where possible, MVFR0.
    #[tracing::instrument(skip(memory))]
    pub fn detect(memory: &mut dyn ArmMemoryInterface) -> Result<Self, ArmError> {
        let cpuid = CpuId::from(memory.read_word_32(CpuId::ADDRESS)?);

        if cpuid.implementer() != CpuId::IMPLEMENTER_ARM {
            tracing::warn!(
                "CPUID implementer {:#04x} is not ARM, the core type is unknown",
                cpuid.implementer()
            );
            return Ok(Self::default());
        }

        let core_type = CortexMType::from_partno(cpuid.partno());
        match core_type {
            Some(core_type) => tracing::info!("CPU core is {}", core_type),
            None => tracing::warn!("Unknown Cortex-M part number {:#05x}", cpuid.partno()),
        }

        let fp_present = match core_type {
            Some(core_type) if core_type.may_have_fpu() => {
                Mvfr0::from(memory.read_word_32(Mvfr0::ADDRESS)?).fp_present()
            }
            _ => false,
        };

        Ok(Self {
            core_type,
            fp_present,
            reset_timing: ResetTiming::default(),
        })
    }
}
