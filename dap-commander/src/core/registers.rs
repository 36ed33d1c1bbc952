//! Core register identifiers.

use std::fmt;

use crate::architecture::arm::core::registers::cortex_m;

/// The DCRSR selector shared by CONTROL, FAULTMASK, BASEPRI and PRIMASK.
pub const COMBINED_REGISTER_SELECTOR: u8 = 20;

/// Index of a core register.
///
/// Non-negative values address a register directly through DCRSR. The values
/// -1 to -4 address one byte lane of the combined register (see [`RegisterKind::PackedByte`]).
///
/// A `RegisterId` can only be obtained from the register table, so every
/// value corresponds to a known register.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(pub(crate) i16);

impl RegisterId {
    /// The raw index.
    pub fn index(self) -> i16 {
        self.0
    }

    /// Classifies the register by how it is transferred.
    pub fn kind(self) -> RegisterKind {
        match self.0 {
            lane @ -4..=-1 => RegisterKind::PackedByte {
                combined: COMBINED_REGISTER_SELECTOR,
                shift: ((-lane - 1) * 8) as u32,
            },
            index @ (33 | 0x40..) => RegisterKind::FloatingPoint(index as u8),
            index => RegisterKind::Ordinary(index as u8),
        }
    }

    /// The name of the register in the register table.
    pub fn name(self) -> &'static str {
        cortex_m::register_name(self)
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i16> for RegisterId {
    type Error = crate::architecture::arm::ArmError;

    fn try_from(index: i16) -> Result<Self, Self::Error> {
        cortex_m::CORTEX_M_REGISTERS
            .iter()
            .find(|register| register.id.0 == index)
            .map(|register| register.id)
            .ok_or_else(|| Self::Error::UnknownRegister(index.to_string()))
    }
}

/// How a register is transferred through DCRSR/DCRDR.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegisterKind {
    /// A register with its own DCRSR selector.
    Ordinary(u8),
    /// One byte of a register that shares its selector with three others.
    PackedByte {
        /// The selector of the shared register.
        combined: u8,
        /// Bit position of the byte within the shared value.
        shift: u32,
    },
    /// A floating point register, only present on cores with an FPU.
    FloatingPoint(u8),
}

impl RegisterKind {
    /// The DCRSR selector the register is transferred with.
    pub fn selector(self) -> u8 {
        match self {
            RegisterKind::Ordinary(index) | RegisterKind::FloatingPoint(index) => index,
            RegisterKind::PackedByte { combined, .. } => combined,
        }
    }
}

/// Describes a core register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreRegister {
    /// The name of the register.
    pub name: &'static str,
    /// The index of the register.
    pub id: RegisterId,
}

impl CoreRegister {
    pub(crate) const fn new(name: &'static str, index: i16) -> Self {
        Self {
            name,
            id: RegisterId(index),
        }
    }
}

impl From<&CoreRegister> for RegisterId {
    fn from(register: &CoreRegister) -> Self {
        register.id
    }
}

#[cfg(test)]
mod test {
    use test_case::test_case;

    use super::*;

    #[test_case(-1, 0; "primask")]
    #[test_case(-2, 8; "basepri")]
    #[test_case(-3, 16; "faultmask")]
    #[test_case(-4, 24; "control")]
    fn packed_lanes(index: i16, shift: u32) {
        assert_eq!(
            RegisterId(index).kind(),
            RegisterKind::PackedByte {
                combined: COMBINED_REGISTER_SELECTOR,
                shift
            }
        );
    }

    #[test_case(0 => RegisterKind::Ordinary(0); "r0")]
    #[test_case(20 => RegisterKind::Ordinary(20); "cfbp")]
    #[test_case(33 => RegisterKind::FloatingPoint(33); "fpscr")]
    #[test_case(0x40 => RegisterKind::FloatingPoint(0x40); "s0")]
    #[test_case(0x5f => RegisterKind::FloatingPoint(0x5f); "s31")]
    fn direct_kinds(index: i16) -> RegisterKind {
        RegisterId(index).kind()
    }

    #[test]
    fn indices_outside_the_table_are_rejected() {
        assert!(RegisterId::try_from(19).is_err());
        assert!(RegisterId::try_from(-5).is_err());
        assert_eq!(RegisterId::try_from(-2).unwrap(), RegisterId(-2));
    }
}
