//! The Cortex-M core register table.

use crate::{
    architecture::arm::ArmError,
    core::{CoreRegister, RegisterId},
};

/// All core registers of a Cortex-M core, including the floating point registers.
///
/// Some registers are listed under more than one name (`r13` and `sp`, ...).
pub static CORTEX_M_REGISTERS: &[CoreRegister] = &[
    CoreRegister::new("r0", 0),
    CoreRegister::new("r1", 1),
    CoreRegister::new("r2", 2),
    CoreRegister::new("r3", 3),
    CoreRegister::new("r4", 4),
    CoreRegister::new("r5", 5),
    CoreRegister::new("r6", 6),
    CoreRegister::new("r7", 7),
    CoreRegister::new("r8", 8),
    CoreRegister::new("r9", 9),
    CoreRegister::new("r10", 10),
    CoreRegister::new("r11", 11),
    CoreRegister::new("r12", 12),
    CoreRegister::new("sp", 13),
    CoreRegister::new("r13", 13),
    CoreRegister::new("lr", 14),
    CoreRegister::new("r14", 14),
    CoreRegister::new("pc", 15),
    CoreRegister::new("r15", 15),
    CoreRegister::new("xpsr", 16),
    CoreRegister::new("msp", 17),
    CoreRegister::new("psp", 18),
    CoreRegister::new("cfbp", 20),
    CoreRegister::new("control", -4),
    CoreRegister::new("faultmask", -3),
    CoreRegister::new("basepri", -2),
    CoreRegister::new("primask", -1),
    CoreRegister::new("fpscr", 33),
    CoreRegister::new("s0", 0x40),
    CoreRegister::new("s1", 0x41),
    CoreRegister::new("s2", 0x42),
    CoreRegister::new("s3", 0x43),
    CoreRegister::new("s4", 0x44),
    CoreRegister::new("s5", 0x45),
    CoreRegister::new("s6", 0x46),
    CoreRegister::new("s7", 0x47),
    CoreRegister::new("s8", 0x48),
    CoreRegister::new("s9", 0x49),
    CoreRegister::new("s10", 0x4a),
    CoreRegister::new("s11", 0x4b),
    CoreRegister::new("s12", 0x4c),
    CoreRegister::new("s13", 0x4d),
    CoreRegister::new("s14", 0x4e),
    CoreRegister::new("s15", 0x4f),
    CoreRegister::new("s16", 0x50),
    CoreRegister::new("s17", 0x51),
    CoreRegister::new("s18", 0x52),
    CoreRegister::new("s19", 0x53),
    CoreRegister::new("s20", 0x54),
    CoreRegister::new("s21", 0x55),
    CoreRegister::new("s22", 0x56),
    CoreRegister::new("s23", 0x57),
    CoreRegister::new("s24", 0x58),
    CoreRegister::new("s25", 0x59),
    CoreRegister::new("s26", 0x5a),
    CoreRegister::new("s27", 0x5b),
    CoreRegister::new("s28", 0x5c),
    CoreRegister::new("s29", 0x5d),
    CoreRegister::new("s30", 0x5e),
    CoreRegister::new("s31", 0x5f),
];

pub const SP: RegisterId = RegisterId(13);
pub const PC: RegisterId = RegisterId(15);
pub const XPSR: RegisterId = RegisterId(16);
pub const CFBP: RegisterId = RegisterId(20);

/// Looks up a register by name, ignoring case.
pub fn resolve(name: &str) -> Result<RegisterId, ArmError> {
    CORTEX_M_REGISTERS
        .iter()
        .find(|register| register.name.eq_ignore_ascii_case(name))
        .map(RegisterId::from)
        .ok_or_else(|| ArmError::UnknownRegister(name.to_string()))
}

/// The first name of a register in the table.
pub(crate) fn register_name(id: RegisterId) -> &'static str {
    CORTEX_M_REGISTERS
        .iter()
        .find(|register| register.id == id)
        .map(|register| register.name)
        .unwrap_or("<unknown>")
}

/// The general purpose registers `r0` to `r15` followed by `xpsr`.
pub fn general_purpose_registers() -> Vec<RegisterId> {
    (0..=16).map(RegisterId).collect()
}
