//! Desktop stand-ins for the bootloader hardware
//!
//! Used by the emulator binary and the unit tests:
//!
//! - [`SimFlash`]: an SST25V decoded from the byte stream on a [`FlashBus`]
//! - [`FpgaCapture`]: three output lines that rebuild the bytes shifted into
//!   the FPGA
//! - [`SimPin`]: a shared-level GPIO line
//! - [`SimDelay`]: a virtual clock that only counts

#![cfg(any(test, feature = "std"))]
// Host-only simulation: sizes are bounded by the simulated memory.
#![allow(clippy::arithmetic_side_effects, clippy::indexing_slicing)]

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use platform::config::FLASH_CAPACITY;

use crate::flash::{FlashBus, FlashError, Opcode, STATUS_BUSY, STATUS_LOCKED};

// ---------------------------------------------------------------------------
// Flash
// ---------------------------------------------------------------------------

/// Block-protect bits of the status register.
const PROTECT_MASK: u8 = 0x1C;

/// Write-enable latch bit of the status register.
const STATUS_WEL: u8 = 0x02;

/// In-memory SST25V behind a [`FlashBus`].
///
/// Commands are decoded from the bytes sent while selected. Reads answer
/// immediately; program, erase and status writes take effect when chip
/// select is released, as on the real part. The simulated chip is only
/// busy after [`SimFlash::set_stuck_busy`].
pub struct SimFlash {
    memory: Vec<u8>,
    status: u8,
    frame: Vec<u8>,
    read_cursor: u32,
    selected: bool,
    absent: bool,
    stuck_busy: bool,
    transactions: usize,
}

impl SimFlash {
    /// An erased, write-protected chip.
    pub fn new() -> Self {
        Self::from_image(Vec::new())
    }

    /// A write-protected chip holding `image` from address 0; the rest is
    /// erased. Bytes beyond the capacity are dropped.
    pub fn from_image(mut image: Vec<u8>) -> Self {
        image.resize(FLASH_CAPACITY as usize, 0xFF);
        Self {
            memory: image,
            status: STATUS_LOCKED,
            frame: Vec::new(),
            read_cursor: 0,
            selected: false,
            absent: false,
            stuck_busy: false,
            transactions: 0,
        }
    }

    /// Overwrite memory at `addr` directly.
    pub fn preload(&mut self, addr: u32, data: &[u8]) {
        let start = addr as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    /// Simulate a missing chip: MISO floats high.
    pub fn set_absent(&mut self, absent: bool) {
        self.absent = absent;
    }

    /// Simulate a hung write cycle: BUSY reads set until cleared again.
    pub fn set_stuck_busy(&mut self, busy: bool) {
        self.stuck_busy = busy;
    }

    /// The whole array.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Current status register.
    pub fn status(&self) -> u8 {
        self.status
    }

    /// Number of completed chip-select transactions.
    pub fn transactions(&self) -> usize {
        self.transactions
    }

    fn frame_address(&self) -> Option<usize> {
        match self.frame.get(1..4) {
            Some(&[a2, a1, a0]) => Some(u32::from_be_bytes([0, a2, a1, a0]) as usize),
            _ => None,
        }
    }

    fn write_enabled(&self) -> bool {
        self.status & STATUS_WEL != 0
    }

    fn unprotected(&self) -> bool {
        self.status & PROTECT_MASK == 0
    }

    fn erase(&mut self, addr: usize, size: usize) {
        let start = addr & !(size - 1);
        let end = (start + size).min(self.memory.len());
        self.memory[start..end].fill(0xFF);
    }

    /// Apply the command framed by the last transaction.
    fn execute(&mut self) {
        let Some(&op) = self.frame.first() else {
            return;
        };
        match op {
            x if x == Opcode::WriteEnable as u8 => self.status |= STATUS_WEL,
            x if x == Opcode::WriteDisable as u8 => self.status &= !STATUS_WEL,
            x if x == Opcode::WriteStatus as u8 => {
                if let (true, Some(&value)) = (self.write_enabled(), self.frame.get(1)) {
                    self.status = (value & PROTECT_MASK) | STATUS_WEL;
                }
            }
            x if x == Opcode::ByteProgram as u8 => {
                if let (Some(addr), Some(&data)) = (self.frame_address(), self.frame.get(4)) {
                    if self.write_enabled() && self.unprotected() {
                        // NOR program only clears bits.
                        let cell = &mut self.memory[addr % FLASH_CAPACITY as usize];
                        *cell &= data;
                    }
                    self.status &= !STATUS_WEL;
                }
            }
            x if x == Opcode::Erase64K as u8 || x == Opcode::Erase32K as u8 => {
                if let Some(addr) = self.frame_address() {
                    if self.write_enabled() && self.unprotected() {
                        let size = if x == Opcode::Erase64K as u8 {
                            64 * 1024
                        } else {
                            32 * 1024
                        };
                        self.erase(addr % FLASH_CAPACITY as usize, size);
                    }
                    self.status &= !STATUS_WEL;
                }
            }
            _ => {}
        }
    }
}

impl Default for SimFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashBus for SimFlash {
    fn idle(&mut self) -> Result<(), FlashError> {
        self.selected = false;
        self.frame.clear();
        Ok(())
    }

    fn select(&mut self) -> Result<(), FlashError> {
        self.selected = true;
        self.frame.clear();
        self.read_cursor = 0;
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), FlashError> {
        if self.selected {
            self.execute();
            self.transactions += 1;
        }
        self.selected = false;
        self.frame.clear();
        Ok(())
    }

    fn send(&mut self, byte: u8) -> Result<(), FlashError> {
        if self.selected {
            self.frame.push(byte);
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<u8, FlashError> {
        if self.absent || !self.selected {
            return Ok(0xFF);
        }
        let byte = match self.frame.first() {
            Some(&op) if op == Opcode::ReadStatus as u8 => {
                if self.stuck_busy {
                    self.status | STATUS_BUSY
                } else {
                    self.status
                }
            }
            Some(&op) if op == Opcode::Read as u8 => match self.frame_address() {
                Some(base) => {
                    let addr = (base + self.read_cursor as usize) % self.memory.len();
                    self.read_cursor += 1;
                    self.memory[addr]
                }
                None => 0xFF,
            },
            _ => 0xFF,
        };
        Ok(byte)
    }
}

// ---------------------------------------------------------------------------
// FPGA
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CaptureState {
    data_high: bool,
    clk_high: bool,
    shift: u8,
    bits: u8,
    bytes: Vec<u8>,
    load_pulses: usize,
    rising_edges: usize,
}

#[derive(Clone, Copy)]
enum Line {
    Clk,
    Data,
    Load,
}

/// Records what a passive-serial loader clocks into the FPGA.
///
/// Bits are sampled on each CLK rising edge and assembled LSB first. A LOAD
/// falling edge starts a new configuration and clears what was captured.
#[derive(Clone, Default)]
pub struct FpgaCapture {
    state: Rc<RefCell<CaptureState>>,
}

impl FpgaCapture {
    /// An empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    fn line(&self, line: Line) -> CaptureLine {
        CaptureLine {
            state: Rc::clone(&self.state),
            line,
        }
    }

    /// The CLK line.
    pub fn clk(&self) -> CaptureLine {
        self.line(Line::Clk)
    }

    /// The DATA line.
    pub fn data(&self) -> CaptureLine {
        self.line(Line::Data)
    }

    /// The LOAD (nCONFIG) line.
    pub fn load(&self) -> CaptureLine {
        self.line(Line::Load)
    }

    /// Whole bytes received since the last LOAD pulse.
    pub fn bitstream(&self) -> Vec<u8> {
        self.state.borrow().bytes.clone()
    }

    /// Number of LOAD pulses seen.
    pub fn load_pulses(&self) -> usize {
        self.state.borrow().load_pulses
    }

    /// Number of CLK rising edges seen.
    pub fn rising_edges(&self) -> usize {
        self.state.borrow().rising_edges
    }

    /// Bits clocked in that do not yet make a whole byte.
    pub fn pending_bits(&self) -> u8 {
        self.state.borrow().bits
    }
}

/// One line of an [`FpgaCapture`].
pub struct CaptureLine {
    state: Rc<RefCell<CaptureState>>,
    line: Line,
}

impl ErrorType for CaptureLine {
    type Error = Infallible;
}

impl CaptureLine {
    fn drive(&mut self, high: bool) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        match self.line {
            Line::Data => s.data_high = high,
            Line::Clk => {
                if high && !s.clk_high {
                    s.rising_edges += 1;
                    if s.data_high {
                        s.shift |= 1 << s.bits;
                    }
                    s.bits += 1;
                    if s.bits == 8 {
                        let byte = s.shift;
                        s.bytes.push(byte);
                        s.shift = 0;
                        s.bits = 0;
                    }
                }
                s.clk_high = high;
            }
            Line::Load => {
                if !high {
                    s.load_pulses += 1;
                    s.bytes.clear();
                    s.shift = 0;
                    s.bits = 0;
                }
            }
        }
    }
}

impl OutputPin for CaptureLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GPIO and time
// ---------------------------------------------------------------------------

/// GPIO line whose level is shared between clones.
///
/// The bootloader drives one clone; a test or the emulator keeps another to
/// observe outputs or to set an input's level.
#[derive(Clone)]
pub struct SimPin {
    level: Rc<Cell<bool>>,
    falls: Rc<Cell<usize>>,
}

impl SimPin {
    /// A line starting at `high`.
    pub fn new(high: bool) -> Self {
        Self {
            level: Rc::new(Cell::new(high)),
            falls: Rc::new(Cell::new(0)),
        }
    }

    /// Current level, `true` for high.
    pub fn level(&self) -> bool {
        self.level.get()
    }

    /// Force the level (for inputs).
    pub fn set_level(&self, high: bool) {
        if self.level.get() && !high {
            self.falls.set(self.falls.get() + 1);
        }
        self.level.set(high);
    }

    /// High-to-low transitions so far.
    pub fn falling_edges(&self) -> usize {
        self.falls.get()
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set_level(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set_level(true);
        Ok(())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level())
    }
}

/// Delay that advances a shared virtual clock instead of sleeping.
#[derive(Clone, Default)]
pub struct SimDelay {
    elapsed_ns: Rc<Cell<u64>>,
}

impl SimDelay {
    /// A clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed, in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ns.get() / 1_000_000
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ns
            .set(self.elapsed_ns.get().saturating_add(u64::from(ns)));
    }
}

// ---------------------------------------------------------------------------
// Test rig
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) use rig::SimRig;


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    use crate::flash::Sst25v;
    use crate::fpga::{FpgaLoader, FpgaPort};
    use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
    use platform::FlashAddress;

    #[test]
    fn fresh_chip_reports_power_on_status() {
        let mut flash = Sst25v::new(SimFlash::new(), SimDelay::new());
        assert!(flash.try_init(0).is_ok());
    }

    #[test]
    fn programming_requires_unlock() {
        let mut flash = Sst25v::new(SimFlash::new(), SimDelay::new());
        let addr = FlashAddress::truncating(0x100);

        flash.write_block(addr, &[0x12]).unwrap();
        let mut out = [0u8; 1];
        flash.read_block(addr, &mut out).unwrap();
        assert_eq!(out, [0xFF]);

        flash.unlock().unwrap();
        flash.write_block(addr, &[0x12]).unwrap();
        flash.read_block(addr, &mut out).unwrap();
        assert_eq!(out, [0x12]);
    }

    #[test]
    fn nor_flash_erase_then_write_round_trips() {
        let mut flash = Sst25v::new(SimFlash::from_image(vec![0u8; 16]), SimDelay::new());
        flash.unlock().unwrap();

        NorFlash::erase(&mut flash, 0, 0x1_0000).unwrap();
        NorFlash::write(&mut flash, 4, b"rbf").unwrap();

        let mut out = [0u8; 8];
        ReadNorFlash::read(&mut flash, 0, &mut out).unwrap();
        assert_eq!(&out, b"\xFF\xFF\xFF\xFFrbf\xFF");
    }

    #[test]
    fn stuck_chip_times_out_and_keeps_memory() {
        let mut sim = SimFlash::new();
        sim.set_stuck_busy(true);
        let mut flash = Sst25v::new(sim, SimDelay::new());
        flash.unlock().unwrap();

        assert_eq!(
            flash.write_block(FlashAddress::truncating(0x10), &[0x00, 0x00]),
            Err(FlashError::Timeout)
        );

        let (sim, _) = flash.release();
        // The first byte programmed; the second was never sent.
        assert_eq!(&sim.memory()[0x10..0x12], &[0x00, 0xFF]);
        assert_eq!(sim.status() & STATUS_WEL, 0);
    }

    #[test]
    fn relock_protects_the_array_again() {
        let mut flash = Sst25v::new(SimFlash::new(), SimDelay::new());
        flash.unlock().unwrap();
        flash.relock().unwrap();
        assert_eq!(flash.read_status().unwrap(), STATUS_LOCKED);
    }

    #[test]
    fn capture_rebuilds_lsb_first_bytes() {
        let capture = FpgaCapture::new();
        let mut fpga = FpgaLoader::new(capture.clk(), capture.data(), capture.load(), SimDelay::new());

        fpga.idle().unwrap();
        fpga.begin_load(10, 0).unwrap();
        fpga.load(&[0x01, 0x80, 0xA5]).unwrap();

        assert_eq!(capture.bitstream(), vec![0x01, 0x80, 0xA5]);
        assert_eq!(capture.rising_edges(), 24);
        assert_eq!(capture.pending_bits(), 0);
    }

    #[test]
    fn sim_pin_counts_falling_edges() {
        let pin = SimPin::new(true);
        let mut driver = pin.clone();
        driver.set_low().unwrap();
        driver.set_high().unwrap();
        driver.set_low().unwrap();
        assert_eq!(pin.falling_edges(), 2);
        assert!(!pin.level());
    }

    #[test]
    fn sim_delay_accumulates_virtual_time() {
        let delay = SimDelay::new();
        let mut d = delay.clone();
        d.delay_ms(250);
        d.delay_us(500);
        assert_eq!(delay.elapsed_ms(), 250);
    }
}
