use crate::{
    architecture::arm::{
        ap::MemoryAp,
        core::{cortex_m::CortexM, CortexMState, ResetTiming},
        dp::{DebugPort, DebugPortId},
        memory::ADIMemoryInterface,
    },
    error::Error,
    probe::RawDapAccess,
};

/// The `Session` struct represents an active debug session.
///
/// It owns the probe, the debug port state (including the current SELECT value)
/// and what is known about the core. Everything that touches the target goes
/// through a session, one operation at a time.
#[derive(Debug)]
pub struct Session<P> {
    interface: ADIMemoryInterface<P>,
    debug_port_id: DebugPortId,
    core_state: CortexMState,
}

impl<P: RawDapAccess> Session<P> {
    /// Opens the probe, powers up the debug port and identifies the core behind MEM-AP 0.
    #[tracing::instrument(skip(probe))]
    pub fn attach(mut probe: P) -> Result<Self, Error> {
        probe.open()?;

        let (mut interface, debug_port_id) =
            ADIMemoryInterface::connect(DebugPort::new(probe), MemoryAp::new(0))?;
        let core_state = CortexMState::detect(&mut interface)?;

        tracing::info!("IDCODE: {:#010X}", debug_port_id.idcode);

        Ok(Self {
            interface,
            debug_port_id,
            core_state,
        })
    }

    /// The core of the target.
    pub fn core(&mut self) -> CortexM<'_> {
        CortexM::new(&mut self.interface, &mut self.core_state)
    }

    /// The identification of the debug port read during attach.
    pub fn debug_port_id(&self) -> &DebugPortId {
        &self.debug_port_id
    }

    /// What is known about the core.
    pub fn core_state(&self) -> &CortexMState {
        &self.core_state
    }

    /// Changes how long a reset may take.
    pub fn set_reset_timing(&mut self, timing: ResetTiming) {
        self.core_state.reset_timing = timing;
    }

    /// The probe the session runs on.
    pub fn probe(&self) -> &P {
        self.interface.probe()
    }

    /// The probe the session runs on.
    pub fn probe_mut(&mut self) -> &mut P {
        self.interface.probe_mut()
    }

    /// Ends the session and closes the probe.
    pub fn close(self) -> Result<P, Error> {
        let mut probe = self.interface.into_debug_port().into_probe();
        probe.close()?;
        Ok(probe)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        architecture::arm::core::CortexMType,
        probe::fake_probe::FakeProbe,
    };

    #[test]
    fn attach_identifies_core() {
        let mut session = Session::attach(FakeProbe::cortex_m4f()).unwrap();

        assert_eq!(session.debug_port_id().idcode, FakeProbe::DEFAULT_IDCODE);
        assert_eq!(
            session.core_state().core_type,
            Some(CortexMType::CortexM4)
        );
        assert!(session.core_state().fp_present);
        assert_eq!(session.core().core_type(), Some(CortexMType::CortexM4));
    }

    #[test]
    fn cortex_m3_has_no_fpu() {
        let session = Session::attach(FakeProbe::cortex_m3()).unwrap();

        assert_eq!(
            session.core_state().core_type,
            Some(CortexMType::CortexM3)
        );
        assert!(!session.core_state().fp_present);
    }

    #[test]
    fn unknown_implementer_leaves_core_type_open() {
        let mut probe = FakeProbe::cortex_m3();
        probe.target_mut().cpuid = 0x5100_C230;

        let session = Session::attach(probe).unwrap();

        assert_eq!(session.core_state().core_type, None);
    }

    #[test]
    fn close_hands_back_the_probe() {
        let session = Session::attach(FakeProbe::cortex_m3()).unwrap();

        let mut probe = session.close().unwrap();

        assert!(probe.close().is_err());
    }
}
