use crate::architecture::arm::ArmError;
use crate::probe::DebugProbeError;

/// The overarching error type which contains all possible errors as variants.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error with the usage of the probe occurred
    #[error("An error with the usage of the probe occurred")]
    Probe(#[from] DebugProbeError),
    /// An ARM specific error occurred.
    #[error("An ARM specific error occurred.")]
    Arm(#[source] ArmError),
}

impl From<ArmError> for Error {
    fn from(value: ArmError) -> Self {
        match value {
            ArmError::Probe(error) => Error::Probe(error),
            other => Error::Arm(other),
        }
    }
}
