//! Mock implementations for testing
//!
//! This module provides mock implementations of all platform traits
//! for use in unit and integration tests, and as the storage behind the
//! desktop bootloader emulator.

#![cfg(any(test, feature = "std"))]
// Host-only test doubles: bounds are checked by the callers' assertions.
#![allow(clippy::arithmetic_side_effects, clippy::indexing_slicing)]

use core::convert::Infallible;
use std::collections::VecDeque;
use std::string::String;
use std::vec::Vec;

use crate::audio::{ClockDivider, DaiFormat, SerialAudioPort, SscProvider};
use crate::eeprom::{Eeprom, EEPROM_SIZE, ERASED};
use crate::video::VideoMemory;

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// Scripted serial console.
///
/// Bytes queued with [`push_input`](Self::push_input) are returned by reads
/// in order; everything written is captured for inspection. Reading from an
/// empty queue reports end-of-stream, which [`crate::Console`] surfaces as
/// [`ConsoleError::Closed`](crate::ConsoleError::Closed).
#[derive(Debug, Default)]
pub struct MockConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl MockConsole {
    /// Create a console with no pending input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a console with `bytes` already queued.
    pub fn with_input(bytes: &[u8]) -> Self {
        let mut console = Self::new();
        console.push_input(bytes);
        console
    }

    /// Queue more input.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    /// Number of queued bytes not yet read.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Drop captured output.
    pub fn clear_output(&mut self) {
        self.output.clear();
    }
}

impl embedded_io::ErrorType for MockConsole {
    type Error = Infallible;
}

impl embedded_io::Read for MockConsole {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut count = 0;
        for slot in buf.iter_mut() {
            match self.input.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

impl embedded_io::ReadReady for MockConsole {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.input.is_empty())
    }
}

impl embedded_io::Write for MockConsole {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EEPROM
// ---------------------------------------------------------------------------

/// RAM-backed 256-byte EEPROM, erased to 0xFF.
#[derive(Debug, Clone)]
pub struct MockEeprom {
    cells: [u8; EEPROM_SIZE],
    writes: usize,
}

impl MockEeprom {
    /// Create an erased EEPROM.
    pub fn new() -> Self {
        Self {
            cells: [ERASED; EEPROM_SIZE],
            writes: 0,
        }
    }

    /// Create an EEPROM from a full image.
    pub fn from_image(image: [u8; EEPROM_SIZE]) -> Self {
        Self {
            cells: image,
            writes: 0,
        }
    }

    /// Preload `data` at `start` without counting it as a write.
    pub fn preload(&mut self, start: u8, data: &[u8]) {
        for (i, &value) in data.iter().enumerate() {
            self.cells[(usize::from(start) + i) % EEPROM_SIZE] = value;
        }
    }

    /// Current contents.
    pub fn image(&self) -> &[u8; EEPROM_SIZE] {
        &self.cells
    }

    /// Number of `write` calls made through the trait.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl Default for MockEeprom {
    fn default() -> Self {
        Self::new()
    }
}

impl Eeprom for MockEeprom {
    type Error = Infallible;

    fn read(&mut self, addr: u8) -> Result<u8, Self::Error> {
        Ok(self.cells[usize::from(addr)])
    }

    fn write(&mut self, addr: u8, value: u8) -> Result<(), Self::Error> {
        self.cells[usize::from(addr)] = value;
        self.writes += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backlight
// ---------------------------------------------------------------------------

/// PWM channel that remembers every duty it was given.
#[derive(Debug, Default, Clone)]
pub struct MockBacklight {
    history: Vec<u16>,
}

impl MockBacklight {
    /// Create a backlight that has never been driven.
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent duty, if any was set.
    pub fn duty(&self) -> Option<u16> {
        self.history.last().copied()
    }

    /// Every duty set, oldest first.
    pub fn history(&self) -> &[u16] {
        &self.history
    }
}

impl embedded_hal::pwm::ErrorType for MockBacklight {
    type Error = Infallible;
}

impl embedded_hal::pwm::SetDutyCycle for MockBacklight {
    fn max_duty_cycle(&self) -> u16 {
        u16::from(u8::MAX)
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        self.history.push(duty);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Video memory
// ---------------------------------------------------------------------------

/// Vec-backed video window that counts accesses by width.
///
/// Multi-byte values are stored little-endian, as on the ARM9 bus.
#[derive(Debug, Clone)]
pub struct MockVideoMemory {
    bytes: Vec<u8>,
    halfword_writes: usize,
    byte_writes: usize,
}

impl MockVideoMemory {
    /// Create a zeroed window of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: std::vec![0; len],
            halfword_writes: 0,
            byte_writes: 0,
        }
    }

    /// Raw contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Raw contents, mutable, without counting accesses.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Number of 16-bit writes performed.
    pub fn halfword_writes(&self) -> usize {
        self.halfword_writes
    }

    /// Number of 8-bit writes performed.
    pub fn byte_writes(&self) -> usize {
        self.byte_writes
    }
}

impl VideoMemory for MockVideoMemory {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read_u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    fn write_u16(&mut self, offset: usize, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.bytes[offset] = lo;
        self.bytes[offset + 1] = hi;
        self.halfword_writes += 1;
    }

    fn read_u8(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    fn write_u8(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
        self.byte_writes += 1;
    }
}

// ---------------------------------------------------------------------------
// Serial audio controllers
// ---------------------------------------------------------------------------

/// Serial port handed out by [`MockSsc`]; records its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSscPort {
    index: u8,
    format: Option<DaiFormat>,
    dividers: Vec<(ClockDivider, u16)>,
}

impl MockSscPort {
    /// Controller number.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Last format programmed.
    pub fn format(&self) -> Option<DaiFormat> {
        self.format
    }

    /// Every divider write, oldest first.
    pub fn dividers(&self) -> &[(ClockDivider, u16)] {
        &self.dividers
    }
}

impl SerialAudioPort for MockSscPort {
    type Error = Infallible;

    fn set_format(&mut self, format: DaiFormat) -> Result<(), Self::Error> {
        self.format = Some(format);
        Ok(())
    }

    fn set_clock_divider(&mut self, divider: ClockDivider, value: u16) -> Result<(), Self::Error> {
        self.dividers.push((divider, value));
        Ok(())
    }
}

/// Error returned by [`MockSsc::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSscError {
    /// No controller with that index exists.
    NoSuchPort,
    /// The controller is already claimed.
    Busy,
}

/// Pool of three serial audio controllers, as on the AT91RM9200.
#[derive(Debug, Default)]
pub struct MockSsc {
    claimed: [bool; 3],
    released: Vec<u8>,
}

impl MockSsc {
    /// Create a pool with every controller free.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark controller `index` as claimed by someone else.
    pub fn occupy(&mut self, index: u8) {
        if let Some(slot) = self.claimed.get_mut(usize::from(index)) {
            *slot = true;
        }
    }

    /// `true` while controller `index` is claimed.
    pub fn is_claimed(&self, index: u8) -> bool {
        self.claimed.get(usize::from(index)).copied().unwrap_or(false)
    }

    /// Controllers returned through [`SscProvider::release`], oldest first.
    pub fn released(&self) -> &[u8] {
        &self.released
    }
}

impl SscProvider for MockSsc {
    type Port = MockSscPort;
    type Error = MockSscError;

    fn request(&mut self, index: u8) -> Result<Self::Port, Self::Error> {
        let slot = self
            .claimed
            .get_mut(usize::from(index))
            .ok_or(MockSscError::NoSuchPort)?;
        if *slot {
            return Err(MockSscError::Busy);
        }
        *slot = true;
        Ok(MockSscPort {
            index,
            format: None,
            dividers: Vec::new(),
        })
    }

    fn release(&mut self, port: Self::Port) {
        if let Some(slot) = self.claimed.get_mut(usize::from(port.index)) {
            *slot = false;
        }
        self.released.push(port.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Backlight;

    #[test]
    fn eeprom_starts_erased() {
        let mut eeprom = MockEeprom::new();
        assert_eq!(eeprom.read(0x00), Ok(0xFF));
        assert_eq!(eeprom.read(0xFF), Ok(0xFF));
    }

    #[test]
    fn eeprom_block_helpers_wrap_at_top() {
        let mut eeprom = MockEeprom::new();
        eeprom.write_from(0xFE, &[1, 2, 3]).unwrap_or_default();
        assert_eq!(eeprom.image()[0xFE], 1);
        assert_eq!(eeprom.image()[0xFF], 2);
        assert_eq!(eeprom.image()[0x00], 3);
        let mut buf = [0u8; 3];
        eeprom.read_into(0xFE, &mut buf).unwrap_or_default();
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(eeprom.write_count(), 3);
    }

    #[test]
    fn backlight_blanket_impl_forwards_duty() {
        let mut bl = MockBacklight::new();
        bl.set_duty(0x40).unwrap_or_default();
        bl.off().unwrap_or_default();
        assert_eq!(bl.history(), &[0x40, 0]);
    }

    #[test]
    fn video_memory_is_little_endian() {
        let mut vm = MockVideoMemory::new(4);
        vm.write_u16(0, 0xF800);
        assert_eq!(vm.bytes()[..2], [0x00, 0xF8]);
        assert_eq!(vm.read_u16(0), 0xF800);
        assert_eq!(vm.halfword_writes(), 1);
    }

    #[test]
    fn ssc_request_is_exclusive() {
        let mut ssc = MockSsc::new();
        let port = ssc.request(1);
        assert!(port.is_ok());
        assert_eq!(ssc.request(1).err(), Some(MockSscError::Busy));
        assert_eq!(ssc.request(3).err(), Some(MockSscError::NoSuchPort));
        if let Ok(port) = port {
            ssc.release(port);
        }
        assert!(!ssc.is_claimed(1));
        assert_eq!(ssc.released(), &[1]);
    }
}
