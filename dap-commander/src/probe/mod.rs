//! The transport abstraction a debug probe has to provide.
//!
//! A probe executes DP and AP register transfers. Reads are queued and only
//! performed on [`RawDapAccess::raw_flush`], which lets many register accesses
//! share a single round trip to the probe.

pub mod fake_probe;
pub mod queue;

use crate::architecture::arm::PortType;
pub use queue::{
    BatchExecutionError, DapTransfer, DeferredResultIndex, DeferredResultSet, TransferQueue,
};

/// A transfer level error reported by the debug port.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DapError {
    /// An error occurred in the SWD communication between probe and device.
    #[error("An error occurred in the SWD communication between probe and device.")]
    SwdProtocol,
    /// The target device did not respond to the request.
    #[error("Target device did not respond to request.")]
    NoAcknowledge,
    /// The target device responded with a FAULT response to the request.
    #[error("Target device responded with a FAULT response to the request.")]
    FaultResponse,
    /// Target device responded with a WAIT response to the request.
    #[error("Target device responded with a WAIT response to the request.")]
    WaitResponse,
    /// The parity bit on the read request was incorrect.
    #[error("Incorrect parity on READ request.")]
    IncorrectParity,
}

/// An error in the connection to the debug probe itself.
#[derive(thiserror::Error, Debug)]
pub enum DebugProbeError {
    /// The probe has not been opened yet.
    #[error("The debug probe has not been opened.")]
    NotOpened,
    /// A transfer failed on the wire.
    #[error("A transfer to the target failed")]
    Transfer(#[from] DapError),
    /// Some other, probe specific error.
    #[error("{0}")]
    Other(String),
}

/// Raw access to the DP and AP registers of a debug port.
///
/// Implementations must execute queued transfers strictly in the order they were issued.
pub trait RawDapAccess {
    /// Opens the connection to the probe.
    fn open(&mut self) -> Result<(), DebugProbeError>;

    /// Closes the connection to the probe.
    fn close(&mut self) -> Result<(), DebugProbeError>;

    /// Queues a read of a DP or AP register.
    ///
    /// The value becomes available in the result set of the next [`RawDapAccess::raw_flush`].
    fn raw_read_register(
        &mut self,
        port: PortType,
        address: u8,
    ) -> Result<DeferredResultIndex, DebugProbeError>;

    /// Queues a write of a DP or AP register.
    fn raw_write_register(
        &mut self,
        port: PortType,
        address: u8,
        value: u32,
    ) -> Result<(), DebugProbeError>;

    /// Executes all queued transfers.
    ///
    /// On error, the transfers after the failing one are discarded.
    fn raw_flush(&mut self) -> Result<DeferredResultSet<u32>, BatchExecutionError>;

    /// Performs a line reset of the debug link.
    fn line_reset(&mut self) -> Result<(), DebugProbeError>;
}

impl<T: RawDapAccess + ?Sized> RawDapAccess for Box<T> {
    fn open(&mut self) -> Result<(), DebugProbeError> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), DebugProbeError> {
        (**self).close()
    }

    fn raw_read_register(
        &mut self,
        port: PortType,
        address: u8,
    ) -> Result<DeferredResultIndex, DebugProbeError> {
        (**self).raw_read_register(port, address)
    }

    fn raw_write_register(
        &mut self,
        port: PortType,
        address: u8,
        value: u32,
    ) -> Result<(), DebugProbeError> {
        (**self).raw_write_register(port, address, value)
    }

    fn raw_flush(&mut self) -> Result<DeferredResultSet<u32>, BatchExecutionError> {
        (**self).raw_flush()
    }

    fn line_reset(&mut self) -> Result<(), DebugProbeError> {
        (**self).line_reset()
    }
}
