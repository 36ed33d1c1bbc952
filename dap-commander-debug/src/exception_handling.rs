//! Decoding of the Cortex-M fault status registers.

use dap_commander::{
    architecture::arm::ArmMemoryInterface, memory_mapped_bitfield_register, ArmError,
    MemoryMappedRegister,
};

memory_mapped_bitfield_register! {
    /// HFSR - HardFault Status Register
    pub struct Hfsr(u32);
    0xE000ED2C, "HFSR",
    impl From;
    pub debug_event, _: 31;
    /// The HardFault was escalated from a configurable fault.
    pub escalation_forced, _: 30;
    pub vector_table_read_fault, _: 1;
}

memory_mapped_bitfield_register! {
    /// CFSR - Configurable Fault Status Register (`UFSR[31:16]`, `BFSR[15:8]`, `MMFSR[7:0]`)
    pub struct Cfsr(u32);
    0xE000ED28, "CFSR",
    impl From;
    /// Aggregate view of the UsageFault bits.
    pub usage_fault, _: 31, 16;
    pub uf_div_by_zero, _: 25;
    pub uf_unaligned_access, _: 24;
    pub uf_coprocessor, _: 19;
    /// An integrity check error has occurred on EXC_RETURN.
    pub uf_invalid_pc, _: 18;
    pub uf_invalid_state, _: 17;
    pub uf_undefined_instruction, _: 16;
    /// Aggregate view of the BusFault bits.
    pub bus_fault, _: 15, 8;
    /// BFAR has valid contents.
    pub bf_address_register_valid, _: 15;
    pub bf_stacking, _: 12;
    pub bf_unstacking, _: 11;
    pub bf_imprecise_data_access_error, _: 10;
    pub bf_precise_data_access_error, _: 9;
    pub bf_instruction_access_error, _: 8;
    /// Aggregate view of the MemManage Fault bits.
    pub mem_manage_fault, _: 7, 0;
    /// MMFAR has valid contents.
    pub mm_address_register_valid, _: 7;
    pub mm_stacking, _: 4;
    pub mm_unstacking, _: 3;
    pub mm_data_access_violation, _: 1;
    pub mm_instruction_access_violation, _: 0;
}

memory_mapped_bitfield_register! {
    /// MMFAR - MemManage Fault Address Register
    pub struct Mmfar(u32);
    0xE000ED34, "MMFAR",
    impl From;
}

memory_mapped_bitfield_register! {
    /// BFAR - Bus Fault Address Register
    pub struct Bfar(u32);
    0xE000ED38, "BFAR",
    impl From;
}

/// Explains why a core ended up in its fault handler.
pub trait FaultDecoder {
    /// Reads the fault status of the core and describes every cause found.
    ///
    /// An empty list means no cause could be determined.
    fn decode_fault_causes(
        &self,
        memory: &mut dyn ArmMemoryInterface,
    ) -> Result<Vec<String>, ArmError>;
}

/// Decodes the HFSR and CFSR of ARMv7-M cores.
#[derive(Debug, Clone, Copy, Default)]
pub struct CortexMFaultDecoder;

impl FaultDecoder for CortexMFaultDecoder {
    fn decode_fault_causes(
        &self,
        memory: &mut dyn ArmMemoryInterface,
    ) -> Result<Vec<String>, ArmError> {
        let hfsr = memory.read_word_32_deferred(Hfsr::ADDRESS)?;
        let cfsr = memory.read_word_32_deferred(Cfsr::ADDRESS)?;
        let mmfar = memory.read_word_32_deferred(Mmfar::ADDRESS)?;
        let bfar = memory.read_word_32_deferred(Bfar::ADDRESS)?;

        let hfsr = Hfsr::from(memory.resolve(hfsr)?);
        let cfsr = Cfsr::from(memory.resolve(cfsr)?);
        let mmfar = memory.resolve(mmfar)?;
        let bfar = memory.resolve(bfar)?;

        tracing::debug!("HFSR: {:#010x}, CFSR: {:#010x}", u32::from(hfsr), u32::from(cfsr));

        Ok(describe(hfsr, cfsr, mmfar, bfar))
    }
}

fn describe(hfsr: Hfsr, cfsr: Cfsr, mmfar: u32, bfar: u32) -> Vec<String> {
    if hfsr.vector_table_read_fault() {
        return vec!["hard fault is caused by failed vector fetch".to_string()];
    }

    let mut causes = Vec::new();
    if !hfsr.escalation_forced() {
        return causes;
    }

    let mut cause = |present: bool, description: &str| {
        if present {
            causes.push(description.to_string());
        }
    };

    if cfsr.mem_manage_fault() != 0 {
        cause(cfsr.mm_instruction_access_violation(), "Instruction access violation");
        cause(cfsr.mm_data_access_violation(), "Data access violation");
        cause(cfsr.mm_unstacking(), "Unstacking error");
        cause(cfsr.mm_stacking(), "Stacking error");
        cause(
            cfsr.mm_address_register_valid(),
            &format!("SCB->MFAR = 0x{mmfar:08X}"),
        );
    }

    if cfsr.bus_fault() != 0 {
        cause(cfsr.bf_instruction_access_error(), "Instruction access violation");
        cause(cfsr.bf_precise_data_access_error(), "Precise data access violation");
        cause(cfsr.bf_imprecise_data_access_error(), "Imprecise data access violation");
        cause(cfsr.bf_unstacking(), "Unstacking error");
        cause(cfsr.bf_stacking(), "Stacking error");
        cause(
            cfsr.bf_address_register_valid(),
            &format!("SCB->BFAR = 0x{bfar:08X}"),
        );
    }

    if cfsr.usage_fault() != 0 {
        cause(
            cfsr.uf_undefined_instruction(),
            "Attempts to execute an undefined instruction",
        );
        cause(
            cfsr.uf_invalid_state(),
            "Attempts to switch to an invalid state (e.g., ARM)",
        );
        cause(
            cfsr.uf_invalid_pc(),
            "Attempts to do an exception with a bad value in the EXC_RETURN number",
        );
        cause(
            cfsr.uf_coprocessor(),
            "Attempts to execute a coprocessor instruction",
        );
        cause(
            cfsr.uf_unaligned_access(),
            "an unaligned access fault has taken place",
        );
        cause(
            cfsr.uf_div_by_zero(),
            "a divide by zero has taken place (can be set only if DIV_0_TRP is set)",
        );
    }

    causes
}

#[cfg(test)]
mod test {
    use dap_commander::{FakeProbe, Session};
    use test_case::test_case;

    use super::*;

    const FORCED: u32 = 1 << 30;

    fn decode(hfsr: u32, cfsr: u32, mmfar: u32, bfar: u32) -> Vec<String> {
        let mut probe = FakeProbe::cortex_m3();
        let target = probe.target_mut();
        target.load(Hfsr::ADDRESS, &[hfsr]);
        target.load(Cfsr::ADDRESS, &[cfsr]);
        target.load(Mmfar::ADDRESS, &[mmfar]);
        target.load(Bfar::ADDRESS, &[bfar]);

        let mut session = Session::attach(probe).unwrap();
        let mut core = session.core();
        CortexMFaultDecoder
            .decode_fault_causes(core.memory())
            .unwrap()
    }

    #[test]
    fn vector_fetch_takes_precedence() {
        pretty_assertions::assert_eq!(
            decode(FORCED | 0b10, 0xffff_ffff, 0, 0),
            vec!["hard fault is caused by failed vector fetch"]
        );
    }

    #[test]
    fn configurable_faults_require_escalation() {
        pretty_assertions::assert_eq!(decode(0, 1 << 1, 0, 0), Vec::<String>::new());
    }

    #[test_case(1 << 0 => vec!["Instruction access violation"]; "mm instruction access")]
    #[test_case(1 << 1 => vec!["Data access violation"]; "mm data access")]
    #[test_case(1 << 3 | 1 << 4 => vec!["Unstacking error", "Stacking error"]; "mm stacking")]
    #[test_case(1 << 8 => vec!["Instruction access violation"]; "bus instruction access")]
    #[test_case(1 << 10 => vec!["Imprecise data access violation"]; "imprecise")]
    #[test_case(1 << 16 => vec!["Attempts to execute an undefined instruction"]; "undefined instruction")]
    #[test_case(1 << 25 => vec!["a divide by zero has taken place (can be set only if DIV_0_TRP is set)"]; "divide by zero")]
    #[test_case(1 << 24 | 1 << 19 => vec![
        "Attempts to execute a coprocessor instruction",
        "an unaligned access fault has taken place"
    ]; "usage faults in bit order")]
    fn single_causes(cfsr: u32) -> Vec<String> {
        decode(FORCED, cfsr, 0, 0)
    }

    #[test]
    fn fault_addresses() {
        pretty_assertions::assert_eq!(
            decode(FORCED, 1 << 1 | 1 << 7 | 1 << 9 | 1 << 15, 0x2000_0004, 0x4000_0000),
            vec![
                "Data access violation",
                "SCB->MFAR = 0x20000004",
                "Precise data access violation",
                "SCB->BFAR = 0x40000000",
            ]
        );
    }
}
