//! Core register access and run control of a Cortex-M core.

use std::time::Instant;

use super::{
    armv7m::{Aircr, Dcrdr, Dcrsr, Dhcsr},
    registers::cortex_m::CFBP,
    CortexMState, CortexMType, ResetMethod,
};
use crate::{
    architecture::arm::{memory::ArmMemoryInterface, ArmError},
    core::{CoreStatus, MemoryMappedRegister, RegisterId, RegisterKind},
};

/// A Cortex-M core reached through a memory interface.
///
/// Register selection and the combined register are shared state on the target,
/// so only one `CortexM` may exist per core at a time. This is enforced by
/// borrowing the memory interface.
pub struct CortexM<'probe> {
    memory: &'probe mut dyn ArmMemoryInterface,
    state: &'probe mut CortexMState,
}

impl<'probe> CortexM<'probe> {
    /// Creates a handle for the core behind `memory`.
    pub fn new(memory: &'probe mut dyn ArmMemoryInterface, state: &'probe mut CortexMState) -> Self {
        Self { memory, state }
    }

    /// The core variant, if it was recognized.
    pub fn core_type(&self) -> Option<CortexMType> {
        self.state.core_type
    }

    /// Whether the core has a floating point unit.
    pub fn fp_present(&self) -> bool {
        self.state.fp_present
    }

    /// Access to the target memory.
    pub fn memory(&mut self) -> &mut dyn ArmMemoryInterface {
        &mut *self.memory
    }

    /// Fails for floating point registers on cores without an FPU.
    ///
    /// Runs before any transfer is issued.
    fn check_register_access(&self, registers: &[RegisterId]) -> Result<(), ArmError> {
        if self.state.fp_present {
            return Ok(());
        }

        match registers
            .iter()
            .find(|register| matches!(register.kind(), RegisterKind::FloatingPoint(_)))
        {
            Some(register) => Err(ArmError::UnsupportedRegister(*register)),
            None => Ok(()),
        }
    }

    /// Reads a set of core registers in one pipelined batch.
    ///
    /// For every register a DCRSR write, a DHCSR read and a DCRDR read are issued.
    /// The results are resolved in the order the reads were issued, and every
    /// DHCSR value must show S_REGRDY.
    #[tracing::instrument(skip(self))]
    pub fn read_core_registers(&mut self, registers: &[RegisterId]) -> Result<Vec<u32>, ArmError> {
        self.check_register_access(registers)?;

        let mut pending = Vec::with_capacity(registers.len());
        for register in registers {
            let mut dcrsr = Dcrsr::from(0);
            dcrsr.set_regwnr(false);
            dcrsr.set_regsel(u32::from(register.kind().selector()));
            self.memory.write_word_32(Dcrsr::ADDRESS, dcrsr.into())?;

            let dhcsr = self.memory.read_word_32_deferred(Dhcsr::ADDRESS)?;
            let data = self.memory.read_word_32_deferred(Dcrdr::ADDRESS)?;
            pending.push((*register, dhcsr, data));
        }

        let mut values = Vec::with_capacity(registers.len());
        for (register, dhcsr, data) in pending {
            let dhcsr = Dhcsr::from(self.memory.resolve(dhcsr)?);
            if !dhcsr.s_regrdy() {
                return Err(ArmError::ProtocolViolation {
                    register,
                    dhcsr: dhcsr.into(),
                });
            }

            let value = self.memory.resolve(data)?;
            let value = match register.kind() {
                RegisterKind::PackedByte { shift, .. } => (value >> shift) & 0xff,
                RegisterKind::Ordinary(_) | RegisterKind::FloatingPoint(_) => value,
            };
            tracing::trace!("{} = {:#010x}", register, value);
            values.push(value);
        }

        Ok(values)
    }

    /// Reads a single core register.
    pub fn read_core_register(&mut self, register: RegisterId) -> Result<u32, ArmError> {
        let values = self.read_core_registers(&[register])?;
        Ok(values[0])
    }

    /// Writes a set of core registers in one pipelined batch.
    ///
    /// Writes to the byte lanes of the combined register only replace their own byte;
    /// several lanes written in the same batch are combined.
    #[tracing::instrument(skip(self))]
    pub fn write_core_registers(
        &mut self,
        registers: &[RegisterId],
        values: &[u32],
    ) -> Result<(), ArmError> {
        if registers.len() != values.len() {
            return Err(ArmError::RegisterCountMismatch {
                registers: registers.len(),
                values: values.len(),
            });
        }
        self.check_register_access(registers)?;

        let mut combined = if registers
            .iter()
            .any(|register| matches!(register.kind(), RegisterKind::PackedByte { .. }))
        {
            Some(self.read_core_register(CFBP)?)
        } else {
            None
        };

        let mut pending = Vec::with_capacity(registers.len());
        for (register, value) in registers.iter().zip(values) {
            let data = match (register.kind(), combined.as_mut()) {
                (RegisterKind::PackedByte { shift, .. }, Some(current)) => {
                    *current = (*current & !(0xff << shift)) | ((value & 0xff) << shift);
                    *current
                }
                _ => *value,
            };

            let mut dcrsr = Dcrsr::from(0);
            dcrsr.set_regwnr(true);
            dcrsr.set_regsel(u32::from(register.kind().selector()));

            self.memory.write_word_32(Dcrdr::ADDRESS, data)?;
            self.memory.write_word_32(Dcrsr::ADDRESS, dcrsr.into())?;
            pending.push((*register, self.memory.read_word_32_deferred(Dhcsr::ADDRESS)?));
        }

        for (register, dhcsr) in pending {
            let dhcsr = Dhcsr::from(self.memory.resolve(dhcsr)?);
            if !dhcsr.s_regrdy() {
                return Err(ArmError::ProtocolViolation {
                    register,
                    dhcsr: dhcsr.into(),
                });
            }
        }

        Ok(())
    }

    /// Writes a single core register.
    pub fn write_core_register(&mut self, register: RegisterId, value: u32) -> Result<(), ArmError> {
        self.write_core_registers(&[register], &[value])
    }

    /// Determines the execution state from DHCSR.
    pub fn status(&mut self) -> Result<CoreStatus, ArmError> {
        let dhcsr = Dhcsr::from(self.memory.read_word_32(Dhcsr::ADDRESS)?);

        if dhcsr.s_reset_st() {
            // S_RESET_ST is sticky, a second read tells whether the core is still held in reset.
            let again = Dhcsr::from(self.memory.read_word_32(Dhcsr::ADDRESS)?);
            if again.s_reset_st() && !again.s_retire_st() {
                return Ok(CoreStatus::Reset);
            }
        }

        if dhcsr.s_lockup() {
            tracing::error!("The core is in locked up status as a result of an unrecoverable exception");
            return Ok(CoreStatus::LockedUp);
        }

        if dhcsr.s_sleep() {
            return Ok(CoreStatus::Sleeping);
        }

        if dhcsr.s_halt() {
            return Ok(CoreStatus::Halted);
        }

        Ok(CoreStatus::Running)
    }

    /// Requests the core to halt.
    ///
    /// The request has reached the target when this returns.
    #[tracing::instrument(skip(self))]
    pub fn halt(&mut self) -> Result<(), ArmError> {
        let mut value = Dhcsr::from(0);
        value.set_c_halt(true);
        value.set_c_debugen(true);
        value.enable_write();

        self.memory.write_word_32(Dhcsr::ADDRESS, value.into())?;
        self.memory.flush()
    }

    /// Resumes a halted core. Does nothing if the core is not halted.
    #[tracing::instrument(skip(self))]
    pub fn run(&mut self) -> Result<(), ArmError> {
        let status = self.status()?;
        if !status.is_halted() {
            tracing::debug!("Core is {}, not resuming", status);
            return Ok(());
        }

        let mut value = Dhcsr::from(0);
        value.set_c_debugen(true);
        value.enable_write();

        self.memory.write_word_32(Dhcsr::ADDRESS, value.into())?;
        self.memory.flush()
    }

    /// Resets the core and waits until it has left reset.
    ///
    /// Transfer errors are expected while the target resets. They are retried
    /// until the reset timeout elapses.
    #[tracing::instrument(skip(self))]
    pub fn reset(&mut self, method: ResetMethod) -> Result<(), ArmError> {
        match method {
            ResetMethod::SystemResetRequest => {
                let mut aircr = Aircr::from(0);
                aircr.vectkey();
                aircr.set_sysresetreq(true);

                let requested = self
                    .memory
                    .write_word_32(Aircr::ADDRESS, aircr.into())
                    .and_then(|_| self.memory.flush());

                match requested {
                    Ok(()) => {}
                    // The target may drop the link while the reset is in progress.
                    Err(error) if error.is_transfer_error() => {
                        tracing::debug!("Transfer error during reset request: {}", error);
                        self.memory.flush()?;
                    }
                    Err(error) => return Err(error),
                }
            }
            ResetMethod::LineReset => self.memory.line_reset()?,
        }

        self.wait_for_reset()
    }

    fn wait_for_reset(&mut self) -> Result<(), ArmError> {
        let timing = self.state.reset_timing;
        let start = Instant::now();

        while start.elapsed() < timing.timeout {
            match self.memory.read_word_32(Dhcsr::ADDRESS) {
                Ok(value) => {
                    if !Dhcsr::from(value).s_reset_st() {
                        tracing::debug!("Core left reset after {:?}", start.elapsed());
                        return Ok(());
                    }
                }
                Err(error) if error.is_transfer_error() => {
                    tracing::debug!("Transfer error while waiting for reset: {}", error);
                    // Discard whatever is left of the failed batch.
                    let _ = self.memory.flush();
                    std::thread::sleep(timing.backoff);
                }
                Err(error) => return Err(error),
            }
        }

        tracing::warn!("Core did not leave reset within {:?}", timing.timeout);
        Err(ArmError::Timeout)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use test_case::test_case;

    use super::*;
    use crate::{
        architecture::arm::{core::registers::cortex_m::resolve, ResetTiming},
        probe::fake_probe::{FakeProbe, Operation},
        Session,
    };

    fn session(probe: FakeProbe) -> Session<FakeProbe> {
        let mut session = Session::attach(probe).unwrap();
        session.set_reset_timing(ResetTiming {
            timeout: Duration::from_millis(200),
            backoff: Duration::from_millis(1),
        });
        session
    }

    fn ids(names: &[&str]) -> Vec<RegisterId> {
        names.iter().map(|name| resolve(name).unwrap()).collect()
    }

    #[test]
    fn read_general_purpose_registers() {
        let mut probe = FakeProbe::cortex_m3();
        for index in 0..=16 {
            probe.target_mut().core_registers[index] = 0x1000 + index as u32;
        }
        let mut session = session(probe);
        let mut core = session.core();

        let values = core
            .read_core_registers(&ids(&["r0", "r7", "sp", "pc", "xpsr"]))
            .unwrap();

        pretty_assertions::assert_eq!(values, vec![0x1000, 0x1007, 0x100D, 0x100F, 0x1010]);
    }

    #[test]
    fn read_batch_is_pipelined() {
        let mut session = session(FakeProbe::cortex_m3());
        session.probe_mut().clear_operations();
        let mut core = session.core();

        core.read_core_registers(&ids(&["r0", "r1", "r2", "r3"]))
            .unwrap();

        pretty_assertions::assert_eq!(session.probe().flush_count(), 1);
    }

    #[test_case("primask", 0x11)]
    #[test_case("basepri", 0x22)]
    #[test_case("faultmask", 0x33)]
    #[test_case("control", 0x44)]
    fn read_packed_lane(name: &str, expected: u32) {
        let mut probe = FakeProbe::cortex_m3();
        probe.target_mut().core_registers[20] = 0x4433_2211;
        let mut session = session(probe);

        let value = session
            .core()
            .read_core_register(resolve(name).unwrap())
            .unwrap();

        pretty_assertions::assert_eq!(value, expected);
    }

    #[test]
    fn packed_lanes_in_one_batch_compose() {
        let mut probe = FakeProbe::cortex_m3();
        probe.target_mut().core_registers[20] = 0x4433_2211;
        let mut session = session(probe);
        let mut core = session.core();

        core.write_core_registers(&ids(&["primask", "control"]), &[0x01, 0x02])
            .unwrap();
        let values = core
            .read_core_registers(&ids(&["primask", "basepri", "faultmask", "control"]))
            .unwrap();

        pretty_assertions::assert_eq!(values, vec![0x01, 0x22, 0x33, 0x02]);
        pretty_assertions::assert_eq!(session.probe().target().core_registers[20], 0x0233_2201);
    }

    #[test]
    fn packed_write_only_uses_low_byte() {
        let mut probe = FakeProbe::cortex_m3();
        probe.target_mut().core_registers[20] = 0x0000_0000;
        let mut session = session(probe);

        session
            .core()
            .write_core_register(resolve("basepri").unwrap(), 0xFFFF_FF80)
            .unwrap();

        pretty_assertions::assert_eq!(session.probe().target().core_registers[20], 0x0000_8000);
    }

    #[test]
    fn write_ordinary_registers() {
        let mut session = session(FakeProbe::cortex_m3());
        let mut core = session.core();

        core.write_core_registers(&ids(&["r4", "lr"]), &[0xDEAD_BEEF, 0x0800_0101])
            .unwrap();

        pretty_assertions::assert_eq!(session.probe().target().core_registers[4], 0xDEAD_BEEF);
        pretty_assertions::assert_eq!(session.probe().target().core_registers[14], 0x0800_0101);
    }

    #[test]
    fn write_count_mismatch_is_rejected() {
        let mut session = session(FakeProbe::cortex_m3());

        let result = session
            .core()
            .write_core_registers(&ids(&["r0", "r1"]), &[1]);

        assert!(matches!(
            result,
            Err(ArmError::RegisterCountMismatch {
                registers: 2,
                values: 1
            })
        ));
    }

    #[test_case("s0"; "single precision register")]
    #[test_case("fpscr"; "status register")]
    fn floating_point_without_fpu_issues_nothing(name: &str) {
        let mut session = session(FakeProbe::cortex_m3());
        session.probe_mut().clear_operations();

        let register = resolve(name).unwrap();
        let read = session.core().read_core_registers(&[resolve("r0").unwrap(), register]);
        let write = session.core().write_core_register(register, 0);

        assert!(matches!(read, Err(ArmError::UnsupportedRegister(r)) if r == register));
        assert!(matches!(write, Err(ArmError::UnsupportedRegister(r)) if r == register));
        assert!(session.probe().operations().is_empty());
    }

    #[test]
    fn floating_point_with_fpu() {
        let mut probe = FakeProbe::cortex_m4f();
        probe.target_mut().core_registers[0x45] = 1.5f32.to_bits();
        let mut session = session(probe);
        assert!(session.core().fp_present());

        let value = session
            .core()
            .read_core_register(resolve("s5").unwrap())
            .unwrap();

        pretty_assertions::assert_eq!(f32::from_bits(value), 1.5);
    }

    #[test]
    fn register_not_ready_is_a_protocol_violation() {
        let mut session = session(FakeProbe::cortex_m3());
        session.probe_mut().target_mut().regrdy_stuck = true;

        let result = session.core().read_core_register(resolve("r3").unwrap());

        match result {
            Err(ArmError::ProtocolViolation { register, dhcsr }) => {
                pretty_assertions::assert_eq!(register, resolve("r3").unwrap());
                pretty_assertions::assert_eq!(dhcsr & (1 << 16), 0);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test_case(&[1 << 17] => CoreStatus::Halted; "halted")]
    #[test_case(&[0] => CoreStatus::Running; "running")]
    #[test_case(&[1 << 18] => CoreStatus::Sleeping; "sleeping")]
    #[test_case(&[(1 << 19) | (1 << 18)] => CoreStatus::LockedUp; "lockup before sleeping")]
    #[test_case(&[(1 << 19) | (1 << 17)] => CoreStatus::LockedUp; "lockup before halted")]
    #[test_case(&[(1 << 18) | (1 << 17)] => CoreStatus::Sleeping; "sleeping before halted")]
    #[test_case(&[1 << 25, 1 << 25] => CoreStatus::Reset; "held in reset")]
    #[test_case(&[1 << 25, (1 << 25) | (1 << 24)] => CoreStatus::Running; "reset released and retiring")]
    #[test_case(&[(1 << 25) | (1 << 17), 1 << 17] => CoreStatus::Halted; "reset released while halted")]
    #[test_case(&[(1 << 25) | (1 << 19), 1 << 25] => CoreStatus::Reset; "reset before lockup")]
    fn status_priority(dhcsr: &[u32]) -> CoreStatus {
        let mut session = session(FakeProbe::cortex_m3());
        session
            .probe_mut()
            .target_mut()
            .dhcsr_sequence
            .extend(dhcsr.iter().copied());

        session.core().status().unwrap()
    }

    #[test]
    fn halt_and_run() {
        let mut session = session(FakeProbe::cortex_m3());
        let mut core = session.core();

        pretty_assertions::assert_eq!(core.status().unwrap(), CoreStatus::Running);
        core.halt().unwrap();
        pretty_assertions::assert_eq!(core.status().unwrap(), CoreStatus::Halted);
        core.run().unwrap();
        pretty_assertions::assert_eq!(core.status().unwrap(), CoreStatus::Running);
    }

    #[test]
    fn halt_is_flushed() {
        let mut session = session(FakeProbe::cortex_m3());
        session.probe_mut().clear_operations();

        session.core().halt().unwrap();

        assert!(session.probe().pending_transfers() == 0);
        assert!(session.probe().target().halted);
    }

    #[test]
    fn run_does_nothing_unless_halted() {
        let mut session = session(FakeProbe::cortex_m3());
        session.probe_mut().target_mut().sleeping = true;
        session.probe_mut().clear_operations();

        session.core().run().unwrap();

        let writes = session
            .probe()
            .operations()
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .count();
        // Only the TAR writes of the DHCSR status read.
        pretty_assertions::assert_eq!(writes, 1);
    }

    #[test]
    fn software_reset_survives_dropped_link() {
        let mut probe = FakeProbe::cortex_m3();
        probe.target_mut().halted = true;
        probe.target_mut().drop_link_on_reset = true;
        probe.target_mut().reset_unreachable_flushes = 3;
        probe.target_mut().reset_hold_reads = 2;
        let mut session = session(probe);

        session.core().reset(ResetMethod::SystemResetRequest).unwrap();

        pretty_assertions::assert_eq!(session.probe().target().resets, 1);
        assert!(!session.probe().target().halted);
    }

    #[test]
    fn line_reset_waits_for_reset_release() {
        let mut probe = FakeProbe::cortex_m3();
        probe.target_mut().reset_hold_reads = 5;
        let mut session = session(probe);

        session.core().reset(ResetMethod::LineReset).unwrap();

        assert!(session
            .probe()
            .operations()
            .contains(&Operation::LineReset));
        pretty_assertions::assert_eq!(session.probe().target().reset_hold_reads_remaining(), 0);
    }

    #[test]
    fn reset_that_never_finishes_times_out() {
        let mut probe = FakeProbe::cortex_m3();
        probe.target_mut().reset_hold_reads = usize::MAX;
        let mut session = session(probe);
        session.set_reset_timing(ResetTiming {
            timeout: Duration::from_millis(20),
            backoff: Duration::from_millis(1),
        });

        let result = session.core().reset(ResetMethod::SystemResetRequest);

        assert!(matches!(result, Err(ArmError::Timeout)));
    }

    #[test]
    fn reset_with_unreachable_target_times_out() {
        let mut probe = FakeProbe::cortex_m3();
        probe.target_mut().reset_unreachable_flushes = usize::MAX;
        let mut session = session(probe);
        session.set_reset_timing(ResetTiming {
            timeout: Duration::from_millis(20),
            backoff: Duration::from_millis(1),
        });

        let result = session.core().reset(ResetMethod::SystemResetRequest);

        assert!(matches!(result, Err(ArmError::Timeout)));
    }
}
