//! Debug port registers and the debug port state.

use bitfield::bitfield;
use jep106::JEP106Code;

use super::{ArmError, PortType, Register};
use crate::probe::{DebugProbeError, DeferredResultIndex, DeferredResultSet, RawDapAccess};

/// Number of CTRL/STAT polls before power up is considered failed.
const POWER_UP_RETRIES: usize = 100;

/// A register of the debug port.
pub trait DpRegister: Register {}

bitfield! {
    /// ABORT, write only.
    #[derive(Clone)]
    pub struct Abort(u32);
    impl Debug;
    pub _, set_orunerrclr: 4;
    pub _, set_wderrclr: 3;
    pub _, set_stkerrclr: 2;
    pub _, set_stkcmpclr: 1;
    pub _, set_dapabort: 0;
}

impl From<u32> for Abort {
    fn from(raw: u32) -> Self {
        Abort(raw)
    }
}

impl From<Abort> for u32 {
    fn from(raw: Abort) -> Self {
        raw.0
    }
}

impl DpRegister for Abort {}

impl Register for Abort {
    const ADDRESS: u8 = 0x0;
    const NAME: &'static str = "ABORT";
}

impl Abort {
    /// An ABORT value that clears all sticky error flags.
    pub fn clear_errors() -> Self {
        let mut abort = Abort(0);
        abort.set_orunerrclr(true);
        abort.set_wderrclr(true);
        abort.set_stkerrclr(true);
        abort.set_stkcmpclr(true);
        abort
    }
}

bitfield! {
    /// CTRL/STAT, the control and status register of the debug port.
    #[derive(Clone, Default)]
    pub struct Ctrl(u32);
    impl Debug;
    pub csyspwrupack, _: 31;
    pub csyspwrupreq, set_csyspwrupreq: 30;
    pub cdbgpwrupack, _: 29;
    pub cdbgpwrupreq, set_cdbgpwrupreq: 28;
    pub cdbgrstack, _: 27;
    pub c_dbg_rst_req, set_c_dbg_rst_req: 26;
    pub w_data_err, _ : 7;
    pub read_ok, _ : 6;
    pub sticky_err, _: 5;
    pub stick_cmp, _: 4;
    pub sticky_orun, _: 1;
    pub orun_detect, set_orun_detect: 0;
}

impl From<u32> for Ctrl {
    fn from(raw: u32) -> Self {
        Ctrl(raw)
    }
}

impl From<Ctrl> for u32 {
    fn from(raw: Ctrl) -> Self {
        raw.0
    }
}

impl DpRegister for Ctrl {}

impl Register for Ctrl {
    const ADDRESS: u8 = 0x4;
    const NAME: &'static str = "CTRL/STAT";
}

bitfield! {
    /// SELECT, chooses the access port and its register bank.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Select(u32);
    impl Debug;
    pub u8, ap_sel, set_ap_sel: 31, 24;
    pub u8, ap_bank_sel, set_ap_bank_sel: 7, 4;
    pub u8, dp_bank_sel, set_dp_bank_sel: 3, 0;
}

impl From<u32> for Select {
    fn from(raw: u32) -> Self {
        Select(raw)
    }
}

impl From<Select> for u32 {
    fn from(raw: Select) -> Self {
        raw.0
    }
}

impl DpRegister for Select {}

impl Register for Select {
    const ADDRESS: u8 = 0x8;
    const NAME: &'static str = "SELECT";
}

bitfield! {
    /// DPIDR, the identification register of the debug port.
    #[derive(Clone)]
    pub struct DPIDR(u32);
    impl Debug;
    pub u8, revision, _: 31, 28;
    pub u8, part_no, _: 27, 20;
    pub min, _: 16;
    pub u8, version, _: 15, 12;
    pub designer, _: 11, 1;
    u8, jep_cc, _: 11, 8;
    u8, jep_id, _: 7, 1;
}

impl From<u32> for DPIDR {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<DPIDR> for u32 {
    fn from(raw: DPIDR) -> Self {
        raw.0
    }
}

impl DpRegister for DPIDR {}

impl Register for DPIDR {
    const ADDRESS: u8 = 0x0;
    const NAME: &'static str = "DPIDR";
}

bitfield! {
    /// RDBUFF, holds the result of the last access port read.
    ///
    /// Reading it does not start a new access port transfer.
    #[derive(Clone, Copy)]
    pub struct RdBuff(u32);
    impl Debug;
    pub data, _: 31, 0;
}

impl From<u32> for RdBuff {
    fn from(raw: u32) -> Self {
        RdBuff(raw)
    }
}

impl From<RdBuff> for u32 {
    fn from(raw: RdBuff) -> Self {
        raw.0
    }
}

impl DpRegister for RdBuff {}

impl Register for RdBuff {
    const ADDRESS: u8 = 0xC;
    const NAME: &'static str = "RDBUFF";
}

/// The decoded contents of DPIDR.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugPortId {
    /// The raw IDCODE value.
    pub idcode: u32,
    pub revision: u8,
    pub part_no: u8,
    pub version: DebugPortVersion,
    pub designer: JEP106Code,
}

impl From<DPIDR> for DebugPortId {
    fn from(dpidr: DPIDR) -> DebugPortId {
        DebugPortId {
            idcode: dpidr.0,
            revision: dpidr.revision(),
            part_no: dpidr.part_no(),
            version: dpidr.version().into(),
            designer: JEP106Code::new(dpidr.jep_cc(), dpidr.jep_id()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugPortVersion {
    DPv0,
    DPv1,
    DPv2,
    Unsupported,
}

impl From<u8> for DebugPortVersion {
    fn from(value: u8) -> Self {
        match value {
            0 => DebugPortVersion::DPv0,
            1 => DebugPortVersion::DPv1,
            2 => DebugPortVersion::DPv2,
            _ => DebugPortVersion::Unsupported,
        }
    }
}

/// The debug port of a target, reached through a probe.
///
/// Owns the probe and caches the SELECT register, so that consecutive accesses
/// to the same access port bank do not repeat the selection.
#[derive(Debug)]
pub struct DebugPort<P> {
    probe: P,
    select: Option<Select>,
    results: DeferredResultSet<u32>,
}

impl<P: RawDapAccess> DebugPort<P> {
    /// Wraps an opened probe.
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            select: None,
            results: DeferredResultSet::new(),
        }
    }

    /// Gives access to the underlying probe.
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Gives mutable access to the underlying probe.
    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    /// Returns the probe, consuming the debug port.
    pub fn into_probe(self) -> P {
        self.probe
    }

    /// Identifies the debug port, clears sticky errors and powers up the debug domain.
    #[tracing::instrument(skip(self))]
    pub fn connect(&mut self) -> Result<DebugPortId, ArmError> {
        let id = DebugPortId::from(self.read_dp_register::<DPIDR>()?);
        tracing::debug!(
            "IDCODE {:#010x}: {:?}, designer {:?}",
            id.idcode,
            id.version,
            id.designer.get()
        );

        self.write_dp_register(Abort::clear_errors())?;
        self.write_dp_register(Select(0))?;
        self.select = Some(Select(0));

        let mut ctrl = Ctrl(0);
        ctrl.set_cdbgpwrupreq(true);
        ctrl.set_csyspwrupreq(true);
        self.write_dp_register(ctrl)?;

        for _ in 0..POWER_UP_RETRIES {
            let ctrl = self.read_dp_register::<Ctrl>()?;
            if ctrl.csyspwrupack() && ctrl.cdbgpwrupack() {
                tracing::debug!("Debug port powered up");
                return Ok(id);
            }
        }

        Err(ArmError::TargetPowerUpFailed)
    }

    /// Reads a debug port register and waits for the value.
    pub fn read_dp_register<R: DpRegister>(&mut self) -> Result<R, ArmError> {
        let index = self.probe.raw_read_register(PortType::DebugPort, R::ADDRESS)?;
        let value = self.resolve(index)?;
        tracing::trace!("Read DP register {}: {:#010x}", R::NAME, value);
        Ok(value.into())
    }

    /// Reads the result of the last access port read again, without repeating the access.
    pub fn last_ap_read(&mut self) -> Result<u32, ArmError> {
        Ok(self.read_dp_register::<RdBuff>()?.data())
    }

    /// Writes a debug port register, without flushing.
    pub fn write_dp_register<R: DpRegister>(&mut self, register: R) -> Result<(), ArmError> {
        let value: u32 = register.into();
        tracing::trace!("Write DP register {}: {:#010x}", R::NAME, value);
        self.probe
            .raw_write_register(PortType::DebugPort, R::ADDRESS, value)?;
        Ok(())
    }

    /// Queues a read of an access port register.
    pub fn read_ap_register_deferred(
        &mut self,
        ap: u8,
        address: u8,
    ) -> Result<DeferredResultIndex, ArmError> {
        self.select_ap_bank(ap, address >> 4)?;
        Ok(self
            .probe
            .raw_read_register(PortType::AccessPort, address & 0x0F)?)
    }

    /// Queues a write of an access port register.
    pub fn write_ap_register(&mut self, ap: u8, address: u8, value: u32) -> Result<(), ArmError> {
        self.select_ap_bank(ap, address >> 4)?;
        self.probe
            .raw_write_register(PortType::AccessPort, address & 0x0F, value)?;
        Ok(())
    }

    fn select_ap_bank(&mut self, ap: u8, bank: u8) -> Result<(), ArmError> {
        let mut select = Select(0);
        select.set_ap_sel(ap);
        select.set_ap_bank_sel(bank);

        if self.select != Some(select) {
            tracing::trace!("Selecting AP {} bank {}", ap, bank);
            self.write_dp_register(select)?;
            self.select = Some(select);
        }

        Ok(())
    }

    /// Executes every queued transfer.
    pub fn flush(&mut self) -> Result<(), ArmError> {
        match self.probe.raw_flush() {
            Ok(results) => {
                self.results.merge_from(results);
                Ok(())
            }
            Err(batch) => {
                self.results.merge_from(batch.results);
                // The probe may have lost the selection together with the failed transfer.
                self.select = None;
                Err(DebugProbeError::Transfer(batch.error).into())
            }
        }
    }

    /// Returns the value of a deferred read, flushing the queue if it has not been executed yet.
    pub fn resolve(&mut self, index: DeferredResultIndex) -> Result<u32, ArmError> {
        match self.results.take(index) {
            Ok(value) => Ok(value),
            Err(index) => {
                self.flush()?;
                self.results
                    .take(index)
                    .map_err(|_| ArmError::MissingResult)
            }
        }
    }

    /// Resets the debug link. The SELECT cache is invalidated.
    pub fn line_reset(&mut self) -> Result<(), ArmError> {
        self.select = None;
        self.probe.line_reset()?;
        Ok(())
    }
}
