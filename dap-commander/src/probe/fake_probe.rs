#![allow(missing_docs)] // Don't require docs for test code
//! A probe simulating a Cortex-M target, used for tests and dry runs.

use std::collections::{BTreeMap, VecDeque};

use crate::{
    architecture::arm::{
        ap::{CSW, DRW, IDR, TAR},
        core::armv7m::{Aircr, CpuId, Dcrdr, Dcrsr, Dhcsr, Mvfr0},
        dp::{Ctrl, RdBuff, Select, DPIDR},
        PortType, Register,
    },
    probe::{
        BatchExecutionError, DapError, DapTransfer, DebugProbeError, DeferredResultIndex,
        DeferredResultSet, RawDapAccess, TransferQueue,
    },
    MemoryMappedRegister,
};

/// A transfer the fake probe has been asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read { port: PortType, address: u8 },
    Write { port: PortType, address: u8, value: u32 },
    LineReset,
}

/// The simulated target behind a [`FakeProbe`].
///
/// Models the debug registers of a Cortex-M core and a flat, word addressed memory.
#[derive(Debug)]
pub struct FakeTarget {
    /// Word addressed memory. Unwritten words read as zero.
    pub memory: BTreeMap<u32, u32>,
    /// Core registers, indexed by their DCRSR selector.
    pub core_registers: [u32; 0x60],
    pub cpuid: u32,
    pub mvfr0: u32,

    pub halted: bool,
    pub sleeping: bool,
    pub locked_up: bool,
    /// S_REGRDY never gets set.
    pub regrdy_stuck: bool,
    /// Raw DHCSR values returned by the next DHCSR reads, before the simulated state is used.
    pub dhcsr_sequence: VecDeque<u32>,

    /// Number of DHCSR reads that show S_RESET_ST after a reset.
    pub reset_hold_reads: usize,
    /// The AIRCR write requesting a reset fails on the wire.
    pub drop_link_on_reset: bool,
    /// Number of batches that fail after a reset.
    pub reset_unreachable_flushes: usize,
    /// Number of resets performed.
    pub resets: usize,

    dcrdr: u32,
    reset_reads_remaining: usize,
    unreachable_flushes: usize,
}

impl FakeTarget {
    fn new(cpuid: u32, mvfr0: u32) -> Self {
        Self {
            memory: BTreeMap::new(),
            core_registers: [0; 0x60],
            cpuid,
            mvfr0,
            halted: false,
            sleeping: false,
            locked_up: false,
            regrdy_stuck: false,
            dhcsr_sequence: VecDeque::new(),
            reset_hold_reads: 0,
            drop_link_on_reset: false,
            reset_unreachable_flushes: 0,
            resets: 0,
            dcrdr: 0,
            reset_reads_remaining: 0,
            unreachable_flushes: 0,
        }
    }

    /// DHCSR reads left that still report S_RESET_ST.
    pub fn reset_hold_reads_remaining(&self) -> usize {
        self.reset_reads_remaining
    }

    /// Writes a block of words into memory.
    pub fn load(&mut self, address: u32, words: &[u32]) {
        for (offset, word) in words.iter().enumerate() {
            self.memory
                .insert(address.wrapping_add(offset as u32 * 4), *word);
        }
    }

    fn reset(&mut self) {
        tracing::debug!("Fake target reset");
        self.resets += 1;
        self.halted = false;
        self.sleeping = false;
        self.locked_up = false;
        self.reset_reads_remaining = self.reset_hold_reads;
        self.unreachable_flushes = self.reset_unreachable_flushes;
    }

    fn dhcsr(&mut self) -> u32 {
        if let Some(value) = self.dhcsr_sequence.pop_front() {
            return value;
        }

        let mut dhcsr = 0;
        if !self.regrdy_stuck {
            dhcsr |= 1 << 16;
        }
        if self.halted {
            dhcsr |= 1 << 17;
        } else {
            dhcsr |= 1 << 24;
        }
        if self.sleeping {
            dhcsr |= 1 << 18;
        }
        if self.locked_up {
            dhcsr |= 1 << 19;
        }
        if self.reset_reads_remaining > 0 {
            self.reset_reads_remaining -= 1;
            dhcsr |= 1 << 25;
        }
        dhcsr
    }

    fn read(&mut self, address: u32) -> u32 {
        match address {
            Dhcsr::ADDRESS => self.dhcsr(),
            Dcrdr::ADDRESS => self.dcrdr,
            CpuId::ADDRESS => self.cpuid,
            Mvfr0::ADDRESS => self.mvfr0,
            _ => self.memory.get(&address).copied().unwrap_or(0),
        }
    }

    fn write(&mut self, address: u32, value: u32) -> Result<(), DapError> {
        match address {
            Dhcsr::ADDRESS => {
                if value >> 16 == 0xA05F {
                    let dhcsr = Dhcsr::from(value);
                    self.halted = dhcsr.c_debugen() && dhcsr.c_halt();
                }
            }
            Dcrsr::ADDRESS => {
                let selector = (value & 0x7F) as usize;
                let write = value & (1 << 16) != 0;
                if let Some(register) = self.core_registers.get_mut(selector) {
                    if write {
                        *register = self.dcrdr;
                    } else {
                        self.dcrdr = *register;
                    }
                }
            }
            Dcrdr::ADDRESS => self.dcrdr = value,
            Aircr::ADDRESS => {
                if value >> 16 == 0x05FA && Aircr::from(value).sysresetreq() {
                    self.reset();
                    if self.drop_link_on_reset {
                        return Err(DapError::NoAcknowledge);
                    }
                }
            }
            _ => {
                self.memory.insert(address, value);
            }
        }
        Ok(())
    }
}

/// Register state of the simulated debug port and memory access port.
#[derive(Debug)]
struct FakeDap {
    idcode: u32,
    ctrl: u32,
    select: u32,
    csw: u32,
    tar: u32,
    rdbuff: u32,
    target: FakeTarget,
}

impl FakeDap {
    fn ap_address(&self, address: u8) -> u8 {
        (Select::from(self.select).ap_bank_sel() << 4) | address
    }

    fn advance_tar(&mut self) {
        if CSW::from(self.csw).addr_inc() == CSW::INCREMENT_SINGLE {
            self.tar = self.tar.wrapping_add(4);
        }
    }

    fn transfer(&mut self, transfer: &DapTransfer) -> Result<Option<u32>, DapError> {
        match *transfer {
            DapTransfer::Read {
                port: PortType::DebugPort,
                address,
            } => Ok(Some(match address {
                DPIDR::ADDRESS => self.idcode,
                // Acknowledge every power up request.
                Ctrl::ADDRESS => self.ctrl | ((self.ctrl & 0x5000_0000) << 1),
                Select::ADDRESS => self.select,
                RdBuff::ADDRESS => self.rdbuff,
                _ => 0,
            })),
            DapTransfer::Write {
                port: PortType::DebugPort,
                address,
                value,
            } => {
                match address {
                    Ctrl::ADDRESS => self.ctrl = value,
                    Select::ADDRESS => self.select = value,
                    _ => {}
                }
                Ok(None)
            }
            DapTransfer::Read {
                port: PortType::AccessPort,
                address,
            } => {
                let value = match self.ap_address(address) {
                    CSW::ADDRESS => self.csw,
                    TAR::ADDRESS => self.tar,
                    DRW::ADDRESS => {
                        let value = self.target.read(self.tar);
                        self.advance_tar();
                        value
                    }
                    IDR::ADDRESS => 0x2477_0011,
                    _ => 0,
                };
                self.rdbuff = value;
                Ok(Some(value))
            }
            DapTransfer::Write {
                port: PortType::AccessPort,
                address,
                value,
            } => {
                match self.ap_address(address) {
                    CSW::ADDRESS => self.csw = value,
                    TAR::ADDRESS => self.tar = value,
                    DRW::ADDRESS => {
                        let result = self.target.write(self.tar, value);
                        self.advance_tar();
                        result?;
                    }
                    _ => {}
                }
                Ok(None)
            }
        }
    }
}

/// This is a mock probe which can be used for mocking things in tests or for dry runs.
///
/// Transfers are recorded when they are issued and executed against a [`FakeTarget`] on flush.
#[derive(Debug)]
pub struct FakeProbe {
    opened: bool,
    queue: TransferQueue,
    operations: Vec<Operation>,
    flushes: usize,
    dap: FakeDap,
}

impl FakeProbe {
    /// The IDCODE of an ARM SW-DP.
    pub const DEFAULT_IDCODE: u32 = 0x2BA0_1477;

    /// A probe connected to a Cortex-M3 without FPU.
    pub fn cortex_m3() -> Self {
        Self::new(FakeTarget::new(0x412F_C230, 0))
    }

    /// A probe connected to a Cortex-M4 with single precision FPU.
    pub fn cortex_m4f() -> Self {
        Self::new(FakeTarget::new(0x410F_C241, 0x1011_0021))
    }

    fn new(target: FakeTarget) -> Self {
        Self {
            opened: false,
            queue: TransferQueue::new(),
            operations: Vec::new(),
            flushes: 0,
            dap: FakeDap {
                idcode: Self::DEFAULT_IDCODE,
                ctrl: 0,
                select: 0,
                csw: 0,
                tar: 0,
                rdbuff: 0,
                target,
            },
        }
    }

    /// The simulated target.
    pub fn target(&self) -> &FakeTarget {
        &self.dap.target
    }

    /// The simulated target, for setting up test scenarios.
    pub fn target_mut(&mut self) -> &mut FakeTarget {
        &mut self.dap.target
    }

    /// All transfers issued since the last [`FakeProbe::clear_operations`].
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Forgets the recorded transfers and flushes.
    pub fn clear_operations(&mut self) {
        self.operations.clear();
        self.flushes = 0;
    }

    /// Number of non-empty batches executed since the last [`FakeProbe::clear_operations`].
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Number of transfers waiting for the next flush.
    pub fn pending_transfers(&self) -> usize {
        self.queue.len()
    }

    fn check_opened(&self) -> Result<(), DebugProbeError> {
        if self.opened {
            Ok(())
        } else {
            Err(DebugProbeError::NotOpened)
        }
    }
}

impl RawDapAccess for FakeProbe {
    fn open(&mut self) -> Result<(), DebugProbeError> {
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DebugProbeError> {
        self.check_opened()?;
        self.opened = false;
        Ok(())
    }

    fn raw_read_register(
        &mut self,
        port: PortType,
        address: u8,
    ) -> Result<DeferredResultIndex, DebugProbeError> {
        self.check_opened()?;
        self.operations.push(Operation::Read { port, address });
        Ok(self.queue.schedule_read(port, address))
    }

    fn raw_write_register(
        &mut self,
        port: PortType,
        address: u8,
        value: u32,
    ) -> Result<(), DebugProbeError> {
        self.check_opened()?;
        self.operations.push(Operation::Write {
            port,
            address,
            value,
        });
        self.queue.schedule_write(port, address, value);
        Ok(())
    }

    fn raw_flush(&mut self) -> Result<DeferredResultSet<u32>, BatchExecutionError> {
        if self.queue.is_empty() {
            return Ok(DeferredResultSet::new());
        }
        self.flushes += 1;

        let dap = &mut self.dap;
        if dap.target.unreachable_flushes > 0 {
            dap.target.unreachable_flushes -= 1;
            return self.queue.execute(|_| Err(DapError::NoAcknowledge));
        }

        self.queue.execute(|transfer| dap.transfer(transfer))
    }

    fn line_reset(&mut self) -> Result<(), DebugProbeError> {
        self.check_opened()?;
        self.operations.push(Operation::LineReset);
        self.dap.select = 0;
        // The simulated probe pulses the target reset together with the line reset.
        self.dap.target.reset();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_require_open_probe() {
        let mut probe = FakeProbe::cortex_m3();

        assert!(matches!(
            probe.raw_read_register(PortType::DebugPort, 0),
            Err(DebugProbeError::NotOpened)
        ));
    }

    #[test]
    fn core_register_transfer() {
        let mut target = FakeTarget::new(0, 0);
        target.core_registers[5] = 0x55;

        target.write(Dcrsr::ADDRESS, 5).unwrap();
        assert_eq!(target.read(Dcrdr::ADDRESS), 0x55);

        target.write(Dcrdr::ADDRESS, 0x66).unwrap();
        target.write(Dcrsr::ADDRESS, 5 | (1 << 16)).unwrap();
        assert_eq!(target.core_registers[5], 0x66);
    }

    #[test]
    fn dhcsr_write_needs_debug_key() {
        let mut target = FakeTarget::new(0, 0);

        target.write(Dhcsr::ADDRESS, 0x3).unwrap();
        assert!(!target.halted);

        target.write(Dhcsr::ADDRESS, 0xA05F_0003).unwrap();
        assert!(target.halted);
    }
}
