//! Debug and system control registers of ARMv6-M and ARMv7-M cores.

use crate::memory_mapped_bitfield_register;

memory_mapped_bitfield_register! {
    /// Debug Halting Control and Status Register, DHCSR (see armv7-M Architecture Reference Manual C1.6.2)
    ///
    /// To write this register successfully, you need to set the debug key via [`Dhcsr::enable_write`] first!
    pub struct Dhcsr(u32);
    0xE000_EDF0, "DHCSR",
    impl From;
    /// Indicates whether the processor has been reset since the last read of DHCSR.
    ///
    /// This is a sticky bit, that clears to `0` on a read of DHCSR.
    pub s_reset_st, _: 25;
    /// Indicates whether the processor has completed the execution of an
    /// instruction since the last read of DHCSR.
    ///
    /// This is a sticky bit, that clears to `0` on a read of DHCSR.
    pub s_retire_st, _: 24;
    /// Indicates whether the processor is locked up because of an unrecoverable exception.
    pub s_lockup, _: 19;
    /// Indicates whether the processor is sleeping.
    pub s_sleep, _: 18;
    /// Indicates whether the processor is in Debug state.
    pub s_halt, _: 17;
    /// A handshake flag for transfers through the DCRDR.
    ///
    /// Set when a DCRSR transfer has completed.
    pub s_regrdy, _: 16;
    /// Masks PendSV, SysTick and external configurable interrupts while stepping.
    pub c_maskints, set_c_maskints: 3;
    /// Processor step bit.
    pub c_step, set_c_step: 2;
    /// Processor halt bit.
    pub c_halt, set_c_halt: 1;
    /// Halting debug enable bit.
    pub c_debugen, set_c_debugen: 0;
}

impl Dhcsr {
    /// This function sets the bit to enable writes to this register.
    ///
    /// C1.6.3 Debug Halting Control and Status Register, DHCSR:
    /// Debug key:
    /// Software must write 0xA05F to this field to enable write accesses to bits
    /// [15:0], otherwise the processor ignores the write access.
    pub fn enable_write(&mut self) {
        self.0 &= !(0xffff << 16);
        self.0 |= 0xa05f << 16;
    }
}

memory_mapped_bitfield_register! {
    /// Debug Core Register Selector Register, DCRSR
    ///
    /// Writing it starts a transfer between DCRDR and the selected core register.
    pub struct Dcrsr(u32);
    0xE000_EDF4, "DCRSR",
    impl From;
    /// `1` transfers DCRDR to the register, `0` the register to DCRDR.
    pub _, set_regwnr: 16;
    /// The register to transfer.
    pub _, set_regsel: 6, 0;
}

memory_mapped_bitfield_register! {
    /// Debug Core Register Data Register, DCRDR
    pub struct Dcrdr(u32);
    0xE000_EDF8, "DCRDR",
    impl From;
    pub data, set_data: 31, 0;
}

memory_mapped_bitfield_register! {
    /// Application Interrupt and Reset Control Register, AIRCR (see armv7-M Architecture Reference Manual B3.2.6)
    ///
    /// [`Aircr::vectkey`] must be called before this register can effectively be written!
    pub struct Aircr(u32);
    0xE000_ED0C, "AIRCR",
    impl From;
    /// Vector Key. The value 0x05FA must be written to this register, otherwise
    /// the register write is UNPREDICTABLE.
    get_vectkeystat, set_vectkey: 31,16;
    /// Indicates the memory system data endianness.
    pub endianness, _: 15;
    /// System Reset Request: writing `1` asserts a signal to request a reset
    /// by the external system.
    pub sysresetreq, set_sysresetreq: 2;
    /// Writing `1` clears all active state information for fixed and configurable exceptions.
    pub vectclractive, set_vectclractive: 1;
    /// Writing `1` requests a local reset.
    pub vectreset, set_vectreset: 0;
}

impl Aircr {
    /// Must be called before writing the register.
    pub fn vectkey(&mut self) {
        self.set_vectkey(0x05FA);
    }

    /// Verifies that the vector key is correct (see [`Aircr::vectkey`]).
    pub fn vectkeystat(&self) -> bool {
        self.get_vectkeystat() == 0xFA05
    }
}

memory_mapped_bitfield_register! {
    /// CPUID Base Register
    pub struct CpuId(u32);
    0xE000_ED00, "CPUID",
    impl From;
    pub u8, implementer, _: 31, 24;
    pub u8, variant, _: 23, 20;
    pub u8, architecture, _: 19, 16;
    pub u16, partno, _: 15, 4;
    pub u8, revision, _: 3, 0;
}

impl CpuId {
    /// The implementer code of ARM.
    pub const IMPLEMENTER_ARM: u8 = 0x41;
}

memory_mapped_bitfield_register! {
    /// Media and FP Feature Register 0, MVFR0
    pub struct Mvfr0(u32);
    0xE000_EF40, "MVFR0",
    impl From;
    pub u8, fp_rounding_modes, _: 31, 28;
    pub u8, short_vectors, _: 27, 24;
    pub u8, square_root, _: 23, 20;
    pub u8, divide, _: 19, 16;
    pub u8, fp_exception_trapping, _: 15, 12;
    pub u8, double_precision, _: 11, 8;
    pub u8, single_precision, _: 7, 4;
    pub u8, simd_registers, _: 3, 0;
}

impl Mvfr0 {
    /// Returns `true` if the core implements a floating point unit.
    pub fn fp_present(&self) -> bool {
        self.simd_registers() != 0 || self.single_precision() != 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemoryMappedRegister;

    #[test]
    fn dhcsr_halt_request() {
        let mut dhcsr = Dhcsr(0);
        dhcsr.set_c_halt(true);
        dhcsr.set_c_debugen(true);
        dhcsr.enable_write();

        assert_eq!(u32::from(dhcsr), 0xA05F_0003);
    }

    #[test]
    fn aircr_system_reset_request() {
        let mut aircr = Aircr(0);
        aircr.vectkey();
        aircr.set_sysresetreq(true);

        assert_eq!(u32::from(aircr), 0x05FA_0004);
    }

    #[test]
    fn dcrsr_write_transfer() {
        let mut dcrsr = Dcrsr(0);
        dcrsr.set_regwnr(true);
        dcrsr.set_regsel(20);

        assert_eq!(u32::from(dcrsr), 0x0001_0014);
    }

    #[test]
    fn cpuid_of_cortex_m4() {
        let cpuid = CpuId(0x410F_C241);

        assert_eq!(cpuid.implementer(), CpuId::IMPLEMENTER_ARM);
        assert_eq!(cpuid.architecture(), 0xF);
        assert_eq!(cpuid.partno(), 0xC24);
        assert_eq!(cpuid.revision(), 1);
    }

    #[test]
    fn register_addresses() {
        assert_eq!(Dhcsr::ADDRESS, 0xE000_EDF0);
        assert_eq!(Dcrsr::ADDRESS, 0xE000_EDF4);
        assert_eq!(Dcrdr::ADDRESS, 0xE000_EDF8);
        assert_eq!(Aircr::ADDRESS, 0xE000_ED0C);
    }
}
