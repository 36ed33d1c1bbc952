//! A snapshot of a faulted core.

use std::fmt;

use dap_commander::{
    architecture::arm::{core::registers::cortex_m, CortexM},
    ArmError,
};

use crate::{
    call_graph::FunctionTable,
    exception_handling::FaultDecoder,
    unwind::{unwind, CallStack, UnwindFailure},
};

/// Index of the stack pointer in [`DiagnosticReport::registers`].
const SP_INDEX: usize = 13;

/// Register contents, fault causes and call stack of a halted core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticReport {
    /// `r0` to `r15`, followed by `xpsr`.
    pub registers: Vec<u32>,
    /// Decoded fault causes. Empty if none were found.
    pub fault_causes: Vec<String>,
    /// The stack words the call stack was reconstructed from, starting at SP.
    pub stack: Vec<u32>,
    pub call_stack: Result<CallStack, UnwindFailure>,
}

impl DiagnosticReport {
    /// Captures the state of `core`, which has to be halted.
    ///
    /// `window_words` words are read from the current stack pointer and unwound
    /// using `functions`.
    #[tracing::instrument(skip(core, decoder, functions))]
    pub fn capture(
        core: &mut CortexM<'_>,
        decoder: &dyn FaultDecoder,
        functions: &FunctionTable,
        window_words: usize,
    ) -> Result<Self, ArmError> {
        let registers = core.read_core_registers(&cortex_m::general_purpose_registers())?;
        let fault_causes = decoder.decode_fault_causes(core.memory())?;

        let sp = registers.get(SP_INDEX).copied().unwrap_or_default();
        let mut stack = vec![0; window_words];
        core.memory().read_32(sp, &mut stack)?;

        let call_stack = unwind(functions, &stack, sp);
        if let Err(failure) = &call_stack {
            tracing::warn!("Unwinding the stack at {:#010x} failed: {}", sp, failure);
        }

        Ok(Self {
            registers,
            fault_causes,
            stack,
            call_stack,
        })
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (general, xpsr) = self.registers.split_at(self.registers.len().min(16));

        for (index, value) in general.iter().enumerate() {
            write!(f, "r{index:<2}: {value:08X}, ")?;
            if index % 4 == 3 {
                writeln!(f)?;
            }
        }
        if let Some(xpsr) = xpsr.first() {
            writeln!(f, "xpsr: {xpsr:08X}")?;
        }

        if !self.fault_causes.is_empty() {
            writeln!(f, "\nFault causes:")?;
            for cause in &self.fault_causes {
                writeln!(f, "    {cause}")?;
            }
        }

        writeln!(f)?;
        match &self.call_stack {
            Ok(stack) => write!(f, "{stack}"),
            Err(failure) => writeln!(f, "{failure}"),
        }
    }
}

#[cfg(test)]
mod test {
    use dap_commander::{FakeProbe, MemoryMappedRegister, Session};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::exception_handling::{Cfsr, CortexMFaultDecoder, Hfsr};

    const LISTING: &str = "
    main
        0x08000150:    b510        ..      PUSH     {r4,lr}
        0x08000152:    f000f805    ....    BL       foo ; 0x8000160
        0x08000156:    bd10        ..      POP      {r4,pc}
    foo
        0x08000160:    b510        ..      PUSH     {r4,lr}
        0x08000162:    6800        .h      LDR      r0,[r0,#0]
        0x08000164:    bd10        ..      POP      {r4,pc}
";

    fn faulted_probe() -> FakeProbe {
        let mut probe = FakeProbe::cortex_m3();
        let target = probe.target_mut();
        target.halted = true;
        for (index, register) in target.core_registers.iter_mut().take(13).enumerate() {
            *register = index as u32;
        }
        target.core_registers[13] = 0x2000_0fe0;
        target.core_registers[14] = 0xffff_fff9;
        target.core_registers[15] = 0x0800_0300;
        target.core_registers[16] = 0x0100_0003;

        target.load(
            0x2000_0fe0,
            &[0, 1, 2, 3, 12, 0x0800_0157, 0x0800_0162, 0x0100_0000, 4, 0x0800_0157],
        );
        target.load(Hfsr::ADDRESS, &[1 << 30]);
        target.load(Cfsr::ADDRESS, &[1 << 9]);
        probe
    }

    #[test]
    fn capture_and_render() {
        let mut session = Session::attach(faulted_probe()).unwrap();
        let functions = FunctionTable::parse(LISTING, None);

        let report =
            DiagnosticReport::capture(&mut session.core(), &CortexMFaultDecoder, &functions, 12)
                .unwrap();

        assert_eq!(report.stack.len(), 12);
        assert_eq!(
            report.to_string(),
            concat!(
                "r0 : 00000000, r1 : 00000001, r2 : 00000002, r3 : 00000003, \n",
                "r4 : 00000004, r5 : 00000005, r6 : 00000006, r7 : 00000007, \n",
                "r8 : 00000008, r9 : 00000009, r10: 0000000A, r11: 0000000B, \n",
                "r12: 0000000C, r13: 20000FE0, r14: FFFFFFF9, r15: 08000300, \n",
                "xpsr: 01000003\n",
                "\n",
                "Fault causes:\n",
                "    Precise data access violation\n",
                "\n",
                "Call Stack:\n",
                "0x08000162  foo\n",
                "0x08000157  main\n",
            )
        );
    }

    #[test]
    fn unwind_failure_is_part_of_the_report() {
        let mut probe = faulted_probe();
        probe.target_mut().load(0x2000_0fe0, &[0; 8]);
        let mut session = Session::attach(probe).unwrap();
        let functions = FunctionTable::parse(LISTING, None);

        let report =
            DiagnosticReport::capture(&mut session.core(), &CortexMFaultDecoder, &functions, 8)
                .unwrap();

        assert_eq!(report.call_stack, Err(UnwindFailure::InvalidExceptionFrame));
        assert!(report
            .to_string()
            .ends_with("\nInvalid Exception Stack Frame\n"));
    }
}
