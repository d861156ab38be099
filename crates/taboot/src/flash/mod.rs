//! SST25V serial flash driver
//!
//! The TABX bitstreams live in a 4 MiB SST25V (SST25VF032B family) serial
//! flash. The driver speaks the chip's opcode set over any [`FlashBus`]:
//!
//! | Opcode | Command | Frame |
//! |--------|---------|-------|
//! | `0x05` | Read status | `05` → status |
//! | `0x06` | Write enable | `06` |
//! | `0x04` | Write disable | `04` |
//! | `0x01` | Write status | `01 SS` (after write enable) |
//! | `0x03` | Read | `03 A2 A1 A0` → data... |
//! | `0x02` | Byte program | `02 A2 A1 A0 DD` (after write enable) |
//! | `0xD8` | 64 KiB block erase | `D8 A2 A1 A0` (after write enable) |
//! | `0x52` | 32 KiB block erase | `52 A2 A1 A0` (after write enable) |
//!
//! Every command is one chip-select transaction; [`Sst25v::transaction`]
//! releases chip select even when the body fails. Addresses go out MSB
//! first.
//!
//! # Status register
//!
//! Bit 0 is BUSY. Bits 2..=4 are the block-protect bits: the part powers up
//! with all of them set (`0x1C`), which is also how the bootloader recognises
//! a responding chip. Writing `0x00` unlocks the array for programming.

pub mod bus;

pub use bus::{BitBangBus, FlashBus, HwSpiBus};

use embedded_hal::delay::DelayNs;
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use platform::config::FLASH_CAPACITY;
use platform::FlashAddress;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// SST25V command opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Write status register: 1 data byte.
    WriteStatus = 0x01,
    /// Byte program: 3 address bytes + 1 data byte.
    ByteProgram = 0x02,
    /// Read: 3 address bytes, then data until deselect.
    Read = 0x03,
    /// Write disable.
    WriteDisable = 0x04,
    /// Read status register: 1 byte returned.
    ReadStatus = 0x05,
    /// Write enable.
    WriteEnable = 0x06,
    /// 32 KiB block erase: 3 address bytes.
    Erase32K = 0x52,
    /// 64 KiB block erase: 3 address bytes.
    Erase64K = 0xD8,
}

/// Status register BUSY bit.
pub const STATUS_BUSY: u8 = 0x01;

/// Power-on status: all block-protect bits set, not busy.
pub const STATUS_LOCKED: u8 = 0x1C;

/// Status value that clears every block-protect bit.
pub const STATUS_UNLOCKED: u8 = 0x00;

/// Bytes erased by [`Sst25v::erase_sector`].
pub const SECTOR_SIZE: u32 = 64 * 1024;

/// Bytes erased by [`Sst25v::erase_block_32k`].
pub const BLOCK_32K_SIZE: u32 = 32 * 1024;

/// Settling time after each byte program before polling BUSY.
const PROGRAM_SETTLE_US: u32 = 10;

/// Interval between BUSY polls.
const BUSY_POLL_US: u32 = 10;

/// Upper bound on BUSY polls: 10 000 × 10 µs = 100 ms.
pub const MAX_BUSY_POLLS: u32 = 10_000;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors returned by the flash driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// SPI peripheral error.
    Spi,
    /// GPIO operation error.
    Gpio,
    /// BUSY did not clear within [`MAX_BUSY_POLLS`].
    Timeout,
    /// Status read never returned the power-on value.
    NotResponding {
        /// Last status value read.
        status: u8,
    },
    /// Access runs past the top of the 24-bit address space or the device.
    OutOfBounds,
    /// Erase range not aligned to [`SECTOR_SIZE`].
    NotAligned,
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spi => write!(f, "SPI communication error"),
            Self::Gpio => write!(f, "GPIO error"),
            Self::Timeout => write!(f, "Flash busy timeout"),
            Self::NotResponding { status } => {
                write!(f, "Flash not responding (status 0x{status:02x})")
            }
            Self::OutOfBounds => write!(f, "Flash address out of bounds"),
            Self::NotAligned => write!(f, "Erase range not sector aligned"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FlashError {}

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Self::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            Self::NotAligned => NorFlashErrorKind::NotAligned,
            _ => NorFlashErrorKind::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// SST25V driver.
///
/// Generic over:
/// - `B`: a [`FlashBus`] framing ([`HwSpiBus`] or [`BitBangBus`]).
/// - `D`: an [`embedded_hal::delay::DelayNs`] for program settling and
///   BUSY polling.
pub struct Sst25v<B, D> {
    bus: B,
    delay: D,
}

impl<B, D> Sst25v<B, D>
where
    B: FlashBus,
    D: DelayNs,
{
    /// Create a driver. Call [`init`](Self::init) or
    /// [`try_init`](Self::try_init) before the first command.
    pub fn new(bus: B, delay: D) -> Self {
        Self { bus, delay }
    }

    /// Give the bus and delay back.
    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    // -----------------------------------------------------------------------
    // Framing helpers
    // -----------------------------------------------------------------------

    /// Run `body` with chip select asserted.
    ///
    /// Chip select is released whatever `body` returns; a body error takes
    /// precedence over a deselect error.
    pub fn transaction<T, E>(
        &mut self,
        body: impl FnOnce(&mut B) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<FlashError>,
    {
        self.bus.select()?;
        let result = body(&mut self.bus);
        let released = self.bus.deselect();
        let value = result?;
        released?;
        Ok(value)
    }

    fn send_command(bus: &mut B, op: Opcode, addr: Option<FlashAddress>) -> Result<(), FlashError> {
        bus.send(op as u8)?;
        if let Some(addr) = addr {
            for byte in addr.to_be_bytes() {
                bus.send(byte)?;
            }
        }
        Ok(())
    }

    fn simple_command(&mut self, op: Opcode) -> Result<(), FlashError> {
        self.transaction(|bus| Self::send_command(bus, op, None))
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Put the bus in its idle state (chip deselected).
    pub fn init(&mut self) -> Result<(), FlashError> {
        self.bus.idle()
    }

    /// Read the status register.
    pub fn read_status(&mut self) -> Result<u8, FlashError> {
        self.transaction(|bus| {
            Self::send_command(bus, Opcode::ReadStatus, None)?;
            bus.receive()
        })
    }

    /// Poll the status register until BUSY clears.
    pub fn wait_until_ready(&mut self) -> Result<(), FlashError> {
        for _ in 0..MAX_BUSY_POLLS {
            if self.read_status()? & STATUS_BUSY == 0 {
                return Ok(());
            }
            self.delay.delay_us(BUSY_POLL_US);
        }
        Err(FlashError::Timeout)
    }

    /// Set the write-enable latch.
    pub fn write_enable(&mut self) -> Result<(), FlashError> {
        self.simple_command(Opcode::WriteEnable)
    }

    /// Clear the write-enable latch.
    pub fn write_disable(&mut self) -> Result<(), FlashError> {
        self.simple_command(Opcode::WriteDisable)
    }

    /// Write the status register (block-protect bits).
    pub fn write_status(&mut self, value: u8) -> Result<(), FlashError> {
        self.write_enable()?;
        self.transaction(|bus| {
            Self::send_command(bus, Opcode::WriteStatus, None)?;
            bus.send(value)
        })?;
        self.write_disable()
    }

    /// Clear every block-protect bit so the array can be programmed.
    pub fn unlock(&mut self) -> Result<(), FlashError> {
        self.write_status(STATUS_UNLOCKED)
    }

    /// Restore the power-on protection.
    pub fn relock(&mut self) -> Result<(), FlashError> {
        self.write_status(STATUS_LOCKED)
    }

    /// Initialise the bus and check that the chip answers with its power-on
    /// status.
    ///
    /// Makes `retries + 1` attempts in total.
    pub fn try_init(&mut self, retries: u8) -> Result<(), FlashError> {
        let mut status = 0;
        for _ in 0..=retries {
            self.init()?;
            status = self.read_status()?;
            if status == STATUS_LOCKED {
                info!("Flash init OK");
                return Ok(());
            }
        }
        warn!("Flash init failed, status {}", status);
        Err(FlashError::NotResponding { status })
    }

    /// Read `buf.len()` bytes starting at `addr`.
    pub fn read_block(&mut self, addr: FlashAddress, buf: &mut [u8]) -> Result<(), FlashError> {
        self.transaction(|bus| {
            Self::send_command(bus, Opcode::Read, Some(addr))?;
            for slot in buf.iter_mut() {
                *slot = bus.receive()?;
            }
            Ok(())
        })
    }

    /// Stream `len` bytes starting at `addr` into `sink`.
    ///
    /// Chip select stays asserted for the whole run, so the sink sees one
    /// continuous read. The first sink error stops the stream and chip
    /// select is still released.
    pub fn stream<E>(
        &mut self,
        addr: FlashAddress,
        len: u32,
        mut sink: impl FnMut(u8) -> Result<(), E>,
    ) -> Result<(), E>
    where
        E: From<FlashError>,
    {
        self.transaction(|bus| {
            Self::send_command(bus, Opcode::Read, Some(addr))?;
            for _ in 0..len {
                sink(bus.receive()?)?;
            }
            Ok(())
        })
    }

    /// Program one byte. The caller waits for BUSY to clear.
    pub fn write_byte(&mut self, addr: FlashAddress, data: u8) -> Result<(), FlashError> {
        self.write_enable()?;
        self.transaction(|bus| {
            Self::send_command(bus, Opcode::ByteProgram, Some(addr))?;
            bus.send(data)
        })
    }

    /// Program `data` at consecutive addresses from `addr`, one byte program
    /// per byte, then clear the write-enable latch.
    ///
    /// The latch is cleared even when programming stops early; a program
    /// error takes precedence over a write-disable error.
    pub fn write_block(&mut self, addr: FlashAddress, data: &[u8]) -> Result<(), FlashError> {
        let programmed = self.program_bytes(addr, data);
        let disabled = self.write_disable();
        programmed?;
        disabled
    }

    fn program_bytes(&mut self, addr: FlashAddress, data: &[u8]) -> Result<(), FlashError> {
        let mut cursor = addr;
        for (i, &byte) in data.iter().enumerate() {
            self.write_byte(cursor, byte)?;
            self.delay.delay_us(PROGRAM_SETTLE_US);
            self.wait_until_ready()?;
            if i.saturating_add(1) < data.len() {
                cursor = cursor.checked_add(1).ok_or(FlashError::OutOfBounds)?;
            }
        }
        Ok(())
    }

    fn erase_command(&mut self, op: Opcode, addr: FlashAddress) -> Result<(), FlashError> {
        self.write_enable()?;
        self.transaction(|bus| Self::send_command(bus, op, Some(addr)))?;
        self.write_disable()
    }

    /// Erase the 64 KiB block containing `addr` to 0xFF.
    ///
    /// Returns as soon as the command is issued; the chip stays BUSY for
    /// up to 25 ms afterwards.
    pub fn erase_sector(&mut self, addr: FlashAddress) -> Result<(), FlashError> {
        debug!("Erase 64K block at {}", addr.get());
        self.erase_command(Opcode::Erase64K, addr)
    }

    /// Erase the 32 KiB block containing `addr` to 0xFF.
    pub fn erase_block_32k(&mut self, addr: FlashAddress) -> Result<(), FlashError> {
        debug!("Erase 32K block at {}", addr.get());
        self.erase_command(Opcode::Erase32K, addr)
    }
}

// ---------------------------------------------------------------------------
// embedded-storage
// ---------------------------------------------------------------------------

fn check_range(offset: u32, len: usize) -> Result<FlashAddress, FlashError> {
    let len = u32::try_from(len).map_err(|_| FlashError::OutOfBounds)?;
    let end = offset.checked_add(len).ok_or(FlashError::OutOfBounds)?;
    if end > FLASH_CAPACITY {
        return Err(FlashError::OutOfBounds);
    }
    FlashAddress::new(offset).map_err(|_| FlashError::OutOfBounds)
}

impl<B, D> ErrorType for Sst25v<B, D> {
    type Error = FlashError;
}

impl<B, D> ReadNorFlash for Sst25v<B, D>
where
    B: FlashBus,
    D: DelayNs,
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let addr = check_range(offset, bytes.len())?;
        self.read_block(addr, bytes)
    }

    fn capacity(&self) -> usize {
        FLASH_CAPACITY as usize
    }
}

impl<B, D> NorFlash for Sst25v<B, D>
where
    B: FlashBus,
    D: DelayNs,
{
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SECTOR_SIZE as usize;

    /// Erase `[from, to)` one 64 KiB block at a time, waiting for each.
    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from % SECTOR_SIZE != 0 || to % SECTOR_SIZE != 0 || from > to {
            return Err(FlashError::NotAligned);
        }
        if to > FLASH_CAPACITY {
            return Err(FlashError::OutOfBounds);
        }
        for start in (from..to).step_by(SECTOR_SIZE as usize) {
            let addr = FlashAddress::new(start).map_err(|_| FlashError::OutOfBounds)?;
            self.erase_sector(addr)?;
            self.wait_until_ready()?;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let addr = check_range(offset, bytes.len())?;
        self.write_block(addr, bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    type TestFlash = Sst25v<HwSpiBus<SpiMock<u8>, PinMock>, NoopDelay>;

    /// CS low then high, `n` times.
    fn cs_frames(n: usize) -> Vec<PinTransaction> {
        let mut txns = Vec::new();
        for _ in 0..n {
            txns.push(PinTransaction::set(PinState::Low));
            txns.push(PinTransaction::set(PinState::High));
        }
        txns
    }

    fn send(bytes: &[u8]) -> Vec<SpiTransaction<u8>> {
        bytes
            .iter()
            .map(|&b| SpiTransaction::write_vec(vec![b]))
            .collect()
    }

    fn recv(byte: u8) -> SpiTransaction<u8> {
        SpiTransaction::transfer_in_place(vec![0xFF], vec![byte])
    }

    fn status_read(status: u8) -> Vec<SpiTransaction<u8>> {
        let mut txns = send(&[0x05]);
        txns.push(recv(status));
        txns.push(SpiTransaction::flush());
        txns
    }

    fn simple(op: u8) -> Vec<SpiTransaction<u8>> {
        let mut txns = send(&[op]);
        txns.push(SpiTransaction::flush());
        txns
    }

    fn flash(spi: &SpiMock<u8>, cs: &PinMock) -> TestFlash {
        Sst25v::new(HwSpiBus::new(spi.clone(), cs.clone()), NoopDelay)
    }

    #[test]
    fn read_status_is_one_transaction() {
        let mut spi = SpiMock::new(&status_read(0x1C));
        let mut cs = PinMock::new(&cs_frames(1));

        assert_eq!(flash(&spi, &cs).read_status().unwrap(), 0x1C);

        spi.done();
        cs.done();
    }

    #[test]
    fn read_block_sends_address_msb_first() {
        let mut txns = send(&[0x03, 0x02, 0x00, 0x10]);
        txns.extend([recv(0xDE), recv(0xAD), SpiTransaction::flush()]);
        let mut spi = SpiMock::new(&txns);
        let mut cs = PinMock::new(&cs_frames(1));

        let mut buf = [0u8; 2];
        flash(&spi, &cs)
            .read_block(FlashAddress::truncating(0x02_0010), &mut buf)
            .unwrap();
        assert_eq!(buf, [0xDE, 0xAD]);

        spi.done();
        cs.done();
    }

    #[test]
    fn write_status_is_bracketed_by_enable_and_disable() {
        let mut txns = simple(0x06);
        txns.extend(send(&[0x01, 0x00]));
        txns.push(SpiTransaction::flush());
        txns.extend(simple(0x04));
        let mut spi = SpiMock::new(&txns);
        let mut cs = PinMock::new(&cs_frames(3));

        flash(&spi, &cs).unlock().unwrap();

        spi.done();
        cs.done();
    }

    #[test]
    fn write_block_programs_each_byte_and_polls_busy() {
        let mut txns = Vec::new();
        for (addr, data) in [(0x00_0100u32, 0xAAu8), (0x00_0101, 0x55)] {
            txns.extend(simple(0x06));
            let [_, a2, a1, a0] = addr.to_be_bytes();
            txns.extend(send(&[0x02, a2, a1, a0, data]));
            txns.push(SpiTransaction::flush());
            // busy once, then ready
            txns.extend(status_read(0x01));
            txns.extend(status_read(0x00));
        }
        txns.extend(simple(0x04));
        let mut spi = SpiMock::new(&txns);
        let mut cs = PinMock::new(&cs_frames(2 * 4 + 1));

        flash(&spi, &cs)
            .write_block(FlashAddress::truncating(0x100), &[0xAA, 0x55])
            .unwrap();

        spi.done();
        cs.done();
    }

    /// Bus whose chip never clears BUSY; records every framed command.
    #[derive(Default)]
    struct StuckBusy {
        frame: Vec<u8>,
        frames: Vec<Vec<u8>>,
        status_reads: u32,
    }

    impl FlashBus for StuckBusy {
        fn idle(&mut self) -> Result<(), FlashError> {
            Ok(())
        }

        fn select(&mut self) -> Result<(), FlashError> {
            self.frame.clear();
            Ok(())
        }

        fn deselect(&mut self) -> Result<(), FlashError> {
            self.frames.push(core::mem::take(&mut self.frame));
            Ok(())
        }

        fn send(&mut self, byte: u8) -> Result<(), FlashError> {
            self.frame.push(byte);
            Ok(())
        }

        fn receive(&mut self) -> Result<u8, FlashError> {
            self.status_reads += 1;
            Ok(STATUS_BUSY)
        }
    }

    #[test]
    fn wait_until_ready_times_out_after_poll_bound() {
        let mut flash = Sst25v::new(StuckBusy::default(), NoopDelay);

        assert_eq!(flash.wait_until_ready(), Err(FlashError::Timeout));

        let (bus, _) = flash.release();
        assert_eq!(bus.status_reads, MAX_BUSY_POLLS);
    }

    #[test]
    fn write_block_clears_latch_when_busy_never_clears() {
        let mut flash = Sst25v::new(StuckBusy::default(), NoopDelay);

        assert_eq!(
            flash.write_block(FlashAddress::truncating(0x100), &[0xAA, 0x55]),
            Err(FlashError::Timeout)
        );

        let (bus, _) = flash.release();
        assert_eq!(bus.frames.first(), Some(&vec![0x06]));
        assert_eq!(bus.frames.get(1), Some(&vec![0x02, 0x00, 0x01, 0x00, 0xAA]));
        assert_eq!(bus.frames.last(), Some(&vec![0x04]));
        // enable, program, every status poll, disable; the second byte is
        // never attempted
        assert_eq!(bus.frames.len(), MAX_BUSY_POLLS as usize + 3);
    }

    #[test]
    fn erase_sector_uses_64k_opcode() {
        let mut txns = simple(0x06);
        txns.extend(send(&[0xD8, 0x04, 0x00, 0x00]));
        txns.push(SpiTransaction::flush());
        txns.extend(simple(0x04));
        let mut spi = SpiMock::new(&txns);
        let mut cs = PinMock::new(&cs_frames(3));

        flash(&spi, &cs)
            .erase_sector(FlashAddress::truncating(0x04_0000))
            .unwrap();

        spi.done();
        cs.done();
    }

    #[test]
    fn erase_block_32k_uses_52_opcode() {
        let mut txns = simple(0x06);
        txns.extend(send(&[0x52, 0x00, 0x80, 0x00]));
        txns.push(SpiTransaction::flush());
        txns.extend(simple(0x04));
        let mut spi = SpiMock::new(&txns);
        let mut cs = PinMock::new(&cs_frames(3));

        flash(&spi, &cs)
            .erase_block_32k(FlashAddress::truncating(0x00_8000))
            .unwrap();

        spi.done();
        cs.done();
    }

    #[test]
    fn try_init_makes_retries_plus_one_attempts() {
        let mut txns = Vec::new();
        for _ in 0..3 {
            txns.extend(status_read(0xFF));
        }
        let mut spi = SpiMock::new(&txns);
        let mut cs_txns = Vec::new();
        for _ in 0..3 {
            // idle, then the status frame
            cs_txns.push(PinTransaction::set(PinState::High));
            cs_txns.extend(cs_frames(1));
        }
        let mut cs = PinMock::new(&cs_txns);

        assert_eq!(
            flash(&spi, &cs).try_init(2),
            Err(FlashError::NotResponding { status: 0xFF })
        );

        spi.done();
        cs.done();
    }

    #[test]
    fn try_init_stops_at_power_on_status() {
        let mut txns = status_read(0x00);
        txns.extend(status_read(0x1C));
        let mut spi = SpiMock::new(&txns);
        let mut cs_txns = Vec::new();
        for _ in 0..2 {
            cs_txns.push(PinTransaction::set(PinState::High));
            cs_txns.extend(cs_frames(1));
        }
        let mut cs = PinMock::new(&cs_txns);

        assert_eq!(flash(&spi, &cs).try_init(5), Ok(()));

        spi.done();
        cs.done();
    }

    #[test]
    fn stream_releases_chip_select_when_sink_fails() {
        let mut txns = send(&[0x03, 0x00, 0x00, 0x00]);
        txns.extend([recv(0x01), recv(0x02), SpiTransaction::flush()]);
        let mut spi = SpiMock::new(&txns);
        let mut cs = PinMock::new(&cs_frames(1));

        let mut seen = Vec::new();
        let result = flash(&spi, &cs).stream(FlashAddress::ZERO, 10, |b| {
            seen.push(b);
            if b == 0x02 {
                Err(FlashError::Gpio)
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err(FlashError::Gpio));
        assert_eq!(seen, [0x01, 0x02]);

        spi.done();
        cs.done();
    }

    #[test]
    fn nor_flash_erase_rejects_unaligned_range() {
        let mut spi = SpiMock::new(&[]);
        let mut cs = PinMock::new(&[]);

        let err = NorFlash::erase(&mut flash(&spi, &cs), 0x100, SECTOR_SIZE).unwrap_err();
        assert_eq!(err.kind(), NorFlashErrorKind::NotAligned);

        spi.done();
        cs.done();
    }

    #[test]
    fn nor_flash_read_rejects_past_capacity() {
        let mut spi = SpiMock::new(&[]);
        let mut cs = PinMock::new(&[]);

        let mut buf = [0u8; 2];
        let err = ReadNorFlash::read(&mut flash(&spi, &cs), FLASH_CAPACITY - 1, &mut buf)
            .unwrap_err();
        assert_eq!(err, FlashError::OutOfBounds);

        spi.done();
        cs.done();
    }
}
