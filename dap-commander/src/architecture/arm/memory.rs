//! Memory accesses through a memory access port.

use super::{
    ap::{MemoryAp, DRW, IDR, TAR},
    dp::{DebugPort, DebugPortId},
    ArmError, Register,
};
use crate::probe::{DeferredResultIndex, RawDapAccess};

/// Access to the memory of an ARM target.
///
/// Reads can be issued deferred: the returned index is resolved later, which
/// allows many reads to share one round trip to the probe. Deferred reads are
/// executed in the order they were issued.
pub trait ArmMemoryInterface {
    /// Queues a read of a 32 bit word.
    fn read_word_32_deferred(&mut self, address: u32) -> Result<DeferredResultIndex, ArmError>;

    /// Returns the value of a deferred read, executing pending transfers if needed.
    fn resolve(&mut self, index: DeferredResultIndex) -> Result<u32, ArmError>;

    /// Queues a write of a 32 bit word.
    ///
    /// The write is only guaranteed to have reached the target after [`ArmMemoryInterface::flush`].
    fn write_word_32(&mut self, address: u32, data: u32) -> Result<(), ArmError>;

    /// Executes all pending transfers.
    fn flush(&mut self) -> Result<(), ArmError>;

    /// Resets the debug link.
    fn line_reset(&mut self) -> Result<(), ArmError>;

    /// Reads a 32 bit word.
    fn read_word_32(&mut self, address: u32) -> Result<u32, ArmError> {
        let index = self.read_word_32_deferred(address)?;
        self.resolve(index)
    }

    /// Reads a block of 32 bit words, pipelining all reads.
    fn read_32(&mut self, address: u32, data: &mut [u32]) -> Result<(), ArmError> {
        let mut indices = Vec::with_capacity(data.len());
        for offset in 0..data.len() as u32 {
            indices.push(self.read_word_32_deferred(address.wrapping_add(offset * 4))?);
        }

        for (word, index) in data.iter_mut().zip(indices) {
            *word = self.resolve(index)?;
        }

        Ok(())
    }

    /// Writes a block of 32 bit words.
    fn write_32(&mut self, address: u32, data: &[u32]) -> Result<(), ArmError> {
        for (offset, word) in data.iter().enumerate() {
            self.write_word_32(address.wrapping_add(offset as u32 * 4), *word)?;
        }
        Ok(())
    }

    /// Reads a block of bytes. The target is accessed with aligned word reads.
    fn read_8(&mut self, address: u32, data: &mut [u8]) -> Result<(), ArmError> {
        if data.is_empty() {
            return Ok(());
        }

        // The last byte has to lie within the 32 bit address space.
        let start = u64::from(address & !0x3);
        let end = (u64::from(address) + data.len() as u64 + 3) & !0x3;
        if end > 1 << 32 {
            return Err(ArmError::OutOfBounds {
                address,
                len: data.len(),
            });
        }

        let mut words = vec![0u32; ((end - start) / 4) as usize];
        self.read_32(address & !0x3, &mut words)?;

        let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        let skip = (address & 0x3) as usize;
        data.copy_from_slice(&bytes[skip..skip + data.len()]);

        Ok(())
    }
}

/// Memory access through a MEM-AP of an ARM debug interface.
#[derive(Debug)]
pub struct ADIMemoryInterface<P> {
    dp: DebugPort<P>,
    ap: MemoryAp,
}

impl<P: RawDapAccess> ADIMemoryInterface<P> {
    /// Connects to the debug port and initializes the memory access port.
    pub fn connect(
        dp: DebugPort<P>,
        ap: MemoryAp,
    ) -> Result<(Self, DebugPortId), ArmError> {
        let mut interface = Self { dp, ap };
        let id = interface.dp.connect()?;
        let idr: IDR = interface.ap.init(&mut interface.dp)?;
        tracing::debug!("Access port {}: {:?}", interface.ap.port(), idr);
        Ok((interface, id))
    }

    /// The debug port this interface uses.
    pub fn debug_port(&mut self) -> &mut DebugPort<P> {
        &mut self.dp
    }

    /// The probe below the debug port.
    pub fn probe(&self) -> &P {
        self.dp.probe()
    }

    /// The probe below the debug port.
    pub fn probe_mut(&mut self) -> &mut P {
        self.dp.probe_mut()
    }

    /// Returns the debug port, consuming the interface.
    pub fn into_debug_port(self) -> DebugPort<P> {
        self.dp
    }

    fn check_alignment(address: u32) -> Result<(), ArmError> {
        if address % 4 != 0 {
            return Err(ArmError::MemoryNotAligned {
                address,
                alignment: 4,
            });
        }
        Ok(())
    }
}

impl<P: RawDapAccess> ArmMemoryInterface for ADIMemoryInterface<P> {
    fn read_word_32_deferred(&mut self, address: u32) -> Result<DeferredResultIndex, ArmError> {
        Self::check_alignment(address)?;
        self.ap.write_register(&mut self.dp, TAR(address))?;
        self.dp
            .read_ap_register_deferred(self.ap.port(), DRW::ADDRESS)
    }

    fn resolve(&mut self, index: DeferredResultIndex) -> Result<u32, ArmError> {
        self.dp.resolve(index)
    }

    fn write_word_32(&mut self, address: u32, data: u32) -> Result<(), ArmError> {
        Self::check_alignment(address)?;
        self.ap.write_register(&mut self.dp, TAR(address))?;
        self.ap.write_register(&mut self.dp, DRW(data))
    }

    fn flush(&mut self) -> Result<(), ArmError> {
        self.dp.flush()
    }

    fn line_reset(&mut self) -> Result<(), ArmError> {
        self.dp.line_reset()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::probe::fake_probe::FakeProbe;

    fn interface() -> ADIMemoryInterface<FakeProbe> {
        let mut probe = FakeProbe::cortex_m3();
        probe.open().unwrap();
        let (interface, _) =
            ADIMemoryInterface::connect(DebugPort::new(probe), MemoryAp::new(0)).unwrap();
        interface
    }

    #[test]
    fn write_then_read_words() {
        let mut memory = interface();

        memory.write_32(0x2000_0000, &[1, 2, 3, 4]).unwrap();
        let mut data = [0u32; 4];
        memory.read_32(0x2000_0000, &mut data).unwrap();

        assert_eq!(data, [1, 2, 3, 4]);
    }

    #[test]
    fn read_bytes_across_words() {
        let mut memory = interface();
        memory
            .write_32(0x2000_0100, &[0x4433_2211, 0x8877_6655])
            .unwrap();

        let mut data = [0u8; 5];
        memory.read_8(0x2000_0101, &mut data).unwrap();

        assert_eq!(data, [0x22, 0x33, 0x44, 0x55, 0x66]);
    }

    #[test]
    fn read_bytes_at_top_of_address_space() {
        let mut memory = interface();
        memory.write_32(0xFFFF_FFFC, &[0x4433_2211]).unwrap();

        let mut data = [0u8; 2];
        memory.read_8(0xFFFF_FFFE, &mut data).unwrap();

        assert_eq!(data, [0x33, 0x44]);
    }

    #[test]
    fn read_bytes_past_end_of_address_space() {
        let mut memory = interface();
        memory.probe_mut().clear_operations();

        let mut data = [0u8; 8];
        let result = memory.read_8(0xFFFF_FFFC, &mut data);

        assert!(matches!(
            result,
            Err(ArmError::OutOfBounds {
                address: 0xFFFF_FFFC,
                len: 8
            })
        ));
        assert_eq!(memory.probe().pending_transfers(), 0);
        assert!(memory.probe().operations().is_empty());
    }

    #[test]
    fn unaligned_word_access_is_rejected() {
        let mut memory = interface();

        let result = memory.read_word_32(0x2000_0002);

        assert!(matches!(
            result,
            Err(ArmError::MemoryNotAligned {
                address: 0x2000_0002,
                alignment: 4
            })
        ));
    }

    #[test]
    fn deferred_reads_resolve_in_any_order() {
        let mut memory = interface();
        memory.write_32(0x2000_0000, &[0xAA, 0xBB]).unwrap();

        let first = memory.read_word_32_deferred(0x2000_0000).unwrap();
        let second = memory.read_word_32_deferred(0x2000_0004).unwrap();

        assert_eq!(memory.resolve(second).unwrap(), 0xBB);
        assert_eq!(memory.resolve(first).unwrap(), 0xAA);
    }
}
