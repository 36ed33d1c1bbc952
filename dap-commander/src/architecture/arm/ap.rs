//! Memory access port registers.

use bitfield::bitfield;

use super::{dp::DebugPort, ArmError, Register};
use crate::probe::RawDapAccess;

/// A register of a memory access port.
pub trait ApRegister: Register {}

bitfield! {
    /// Control and Status Word register
    ///
    /// Configures the memory accesses performed through DRW.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct CSW(u32);
    impl Debug;
    pub dbg_sw_enable, set_dbg_sw_enable: 31;
    pub u8, prot, set_prot: 30, 28;
    pub u8, cache, set_cache: 27, 24;
    pub spiden, _: 23;
    pub u8, mode, set_mode: 11, 8;
    pub tr_in_prog, _: 7;
    pub device_en, _: 6;
    pub u8, addr_inc, set_addr_inc: 5, 4;
    pub u8, size, set_size: 2, 0;
}

impl CSW {
    /// `size` value for 32-bit accesses.
    pub const SIZE_WORD: u8 = 0b010;
    /// `addr_inc` value advancing TAR by the access size after each DRW access.
    pub const INCREMENT_SINGLE: u8 = 0b01;

    /// A CSW value for privileged 32-bit data accesses with single address increment.
    pub fn word_access() -> Self {
        let mut csw = CSW(0);
        csw.set_dbg_sw_enable(true);
        csw.set_prot(0b011);
        csw.set_addr_inc(Self::INCREMENT_SINGLE);
        csw.set_size(Self::SIZE_WORD);
        csw
    }
}

impl From<u32> for CSW {
    fn from(raw: u32) -> Self {
        CSW(raw)
    }
}

impl From<CSW> for u32 {
    fn from(raw: CSW) -> Self {
        raw.0
    }
}

impl ApRegister for CSW {}

impl Register for CSW {
    const ADDRESS: u8 = 0x00;
    const NAME: &'static str = "CSW";
}

/// Transfer Address Register
///
/// Holds the target address of the next DRW access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TAR(pub u32);

impl From<u32> for TAR {
    fn from(raw: u32) -> Self {
        TAR(raw)
    }
}

impl From<TAR> for u32 {
    fn from(raw: TAR) -> Self {
        raw.0
    }
}

impl ApRegister for TAR {}

impl Register for TAR {
    const ADDRESS: u8 = 0x04;
    const NAME: &'static str = "TAR";
}

/// Data Read/Write register
///
/// A read or write of DRW is translated to a memory access at the address in [`TAR`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DRW(pub u32);

impl From<u32> for DRW {
    fn from(raw: u32) -> Self {
        DRW(raw)
    }
}

impl From<DRW> for u32 {
    fn from(raw: DRW) -> Self {
        raw.0
    }
}

impl ApRegister for DRW {}

impl Register for DRW {
    const ADDRESS: u8 = 0x0C;
    const NAME: &'static str = "DRW";
}

bitfield! {
    /// Identification Register of an access port.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct IDR(u32);
    impl Debug;
    pub u8, revision, _: 31, 28;
    pub u16, designer, _: 27, 17;
    pub u8, class, _: 16, 13;
    pub u8, variant, _: 7, 4;
    pub u8, ap_type, _: 3, 0;
}

impl From<u32> for IDR {
    fn from(raw: u32) -> Self {
        IDR(raw)
    }
}

impl From<IDR> for u32 {
    fn from(raw: IDR) -> Self {
        raw.0
    }
}

impl ApRegister for IDR {}

impl Register for IDR {
    const ADDRESS: u8 = 0xFC;
    const NAME: &'static str = "IDR";
}

impl IDR {
    /// The access port class of a memory access port.
    pub const MEM_AP_CLASS: u8 = 0b1000;
}

/// A memory access port on the debug port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryAp {
    port: u8,
}

impl MemoryAp {
    /// The memory access port with the given number.
    pub fn new(port: u8) -> Self {
        Self { port }
    }

    /// The port number.
    pub fn port(&self) -> u8 {
        self.port
    }

    /// Checks the port is a memory access port and configures it for 32 bit accesses.
    pub fn init<P: RawDapAccess>(&self, dp: &mut DebugPort<P>) -> Result<IDR, ArmError> {
        let idr: IDR = self.read_register(dp)?;
        if idr.class() != IDR::MEM_AP_CLASS {
            tracing::warn!(
                "Access port {} reports class {:#x}, expected a memory access port",
                self.port,
                idr.class()
            );
        }

        self.write_register(dp, CSW::word_access())?;
        Ok(idr)
    }

    /// Reads a register of this port and waits for the result.
    pub fn read_register<P: RawDapAccess, R: ApRegister>(
        &self,
        dp: &mut DebugPort<P>,
    ) -> Result<R, ArmError> {
        let index = dp.read_ap_register_deferred(self.port, R::ADDRESS)?;
        Ok(dp.resolve(index)?.into())
    }

    /// Queues a write of a register of this port.
    pub fn write_register<P: RawDapAccess, R: ApRegister>(
        &self,
        dp: &mut DebugPort<P>,
        register: R,
    ) -> Result<(), ArmError> {
        dp.write_ap_register(self.port, R::ADDRESS, register.into())
    }
}
