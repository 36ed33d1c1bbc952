//! # CoreSight access and run control for Cortex-M microcontrollers
//!
//! This crate talks to a Cortex-M core through the debug port and memory access
//! port of its CoreSight debug infrastructure. It provides
//!
//! - a transport abstraction with deferred (pipelined) reads, see [`probe::RawDapAccess`],
//! - memory access through a MEM-AP, see [`architecture::arm::ArmMemoryInterface`],
//! - batched core register access and halt, resume and reset of the core,
//!   see [`architecture::arm::CortexM`].
//!
//! ## Halting the core and reading registers
//!
//! ```
//! use dap_commander::{architecture::arm::core::registers::cortex_m, FakeProbe, Session};
//!
//! let mut session = Session::attach(FakeProbe::cortex_m3())?;
//! let mut core = session.core();
//!
//! core.halt()?;
//! let registers = core.read_core_registers(&[cortex_m::resolve("pc")?, cortex_m::resolve("sp")?])?;
//! # assert_eq!(registers.len(), 2);
//! # Ok::<(), dap_commander::Error>(())
//! ```

pub mod architecture;
mod core;
mod error;
pub mod probe;
mod session;

#[doc(hidden)]
pub use bitfield;

pub use crate::architecture::arm::ArmError;
pub use crate::core::{
    CoreRegister, CoreStatus, MemoryMappedRegister, RegisterId, RegisterKind,
    COMBINED_REGISTER_SELECTOR,
};
pub use crate::error::Error;
pub use crate::probe::{fake_probe::FakeProbe, DapError, DebugProbeError, RawDapAccess};
pub use crate::session::Session;
