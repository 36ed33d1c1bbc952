//! Post-mortem diagnosis of a halted Cortex-M target.
//!
//! The call graph of the firmware is recovered from a disassembly listing
//! (see [`call_graph::FunctionTable`]). Together with a window of raw stack
//! memory it is used to reconstruct the call stack leading to a fault
//! (see [`unwind::unwind`]). [`report::DiagnosticReport`] combines this with the
//! register contents and the decoded fault status registers of the core.

pub mod call_graph;
pub mod exception_handling;
pub mod report;
pub mod unwind;

pub use call_graph::{CallGraphError, Function, FunctionTable};
pub use exception_handling::{CortexMFaultDecoder, FaultDecoder};
pub use report::DiagnosticReport;
pub use unwind::{unwind, CallStack, StackFrame, UnwindFailure};
