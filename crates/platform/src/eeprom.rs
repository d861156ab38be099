//! Data EEPROM abstraction
//!
//! The PIC18F2520 carries 256 bytes of byte-addressable data EEPROM. The
//! bootloader keeps its whole boot record there, so the address space is a
//! single `u8` and every address is valid.

/// Number of addressable EEPROM bytes.
pub const EEPROM_SIZE: usize = 256;

/// Value read back from an erased (never written) EEPROM cell.
pub const ERASED: u8 = 0xFF;

/// Byte-addressable non-volatile store.
pub trait Eeprom {
    /// Error type
    type Error: core::fmt::Debug;

    /// Read the byte at `addr`.
    fn read(&mut self, addr: u8) -> Result<u8, Self::Error>;

    /// Program the byte at `addr`, blocking until the write cycle completes.
    fn write(&mut self, addr: u8, value: u8) -> Result<(), Self::Error>;

    /// Fill `buf` from consecutive addresses starting at `start`.
    ///
    /// Addresses wrap at the top of the array, as the PIC EEADR register does.
    fn read_into(&mut self, start: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        let mut addr = start;
        for slot in buf.iter_mut() {
            *slot = self.read(addr)?;
            addr = addr.wrapping_add(1);
        }
        Ok(())
    }

    /// Program consecutive addresses starting at `start` with `data`.
    fn write_from(&mut self, start: u8, data: &[u8]) -> Result<(), Self::Error> {
        let mut addr = start;
        for &value in data {
            self.write(addr, value)?;
            addr = addr.wrapping_add(1);
        }
        Ok(())
    }
}
