/// A memory mapped register, for instance ARM debug registers (DHCSR, etc).
pub trait MemoryMappedRegister: Clone + From<u32> + Into<u32> + Sized + std::fmt::Debug {
    /// The register's address in the target memory.
    const ADDRESS: u32;
    /// The register's name.
    const NAME: &'static str;
}

/// Defines a [`bitfield`](bitfield::bitfield) register type at a fixed address
/// and implements [`MemoryMappedRegister`] for it.
///
/// ```
/// dap_commander::memory_mapped_bitfield_register! {
///     /// DFSR - Debug Fault Status Register
///     pub struct Dfsr(u32);
///     0xE000_ED30, "DFSR",
///     impl From;
///     pub external, _: 4;
///     pub halted, _: 1;
/// }
/// ```
#[macro_export]
macro_rules! memory_mapped_bitfield_register {
    (
        $(#[$outer:meta])*
        pub struct $name:ident($reg_type:ty);
        $addr:expr, $reg_name:expr,
        impl From;
        $($rest:tt)*
    ) => {
        $crate::bitfield::bitfield! {
            $(#[$outer])*
            #[derive(Copy, Clone)]
            pub struct $name($reg_type);
            impl Debug;
            $($rest)*
        }

        impl From<$reg_type> for $name {
            fn from(value: $reg_type) -> Self {
                $name(value)
            }
        }

        impl From<$name> for $reg_type {
            fn from(register: $name) -> Self {
                register.0
            }
        }

        impl $crate::MemoryMappedRegister for $name {
            const ADDRESS: u32 = $addr;
            const NAME: &'static str = $reg_name;
        }
    };
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::MemoryMappedRegister;

    memory_mapped_bitfield_register! {
        /// DFSR - Debug Fault Status Register
        pub struct Dfsr(u32);
        0xE000_ED30, "DFSR",
        impl From;
        pub external, set_external: 4;
        pub halted, set_halted: 0;
    }

    #[test]
    fn register_definition() {
        let dfsr = Dfsr::from(0x11);

        assert_eq!(Dfsr::ADDRESS, 0xE000_ED30);
        assert_eq!(Dfsr::NAME, "DFSR");
        assert!(dfsr.external());
        assert!(dfsr.halted());
        assert_eq!(u32::from(dfsr), 0x11);
    }

    #[test]
    fn fields_are_writable() {
        let mut dfsr = Dfsr(0);
        dfsr.set_external(true);

        assert_eq!(u32::from(dfsr), 0x10);
    }
}
