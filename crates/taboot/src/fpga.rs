//! FPGA passive-serial configuration loader
//!
//! The TABX FPGA is configured over three PIC port A lines:
//!
//! | Signal | PIC pin | Meaning |
//! |--------|---------|---------|
//! | CLK    | RA1 | configuration clock, idles low |
//! | DATA   | RA2 | configuration data |
//! | LOAD   | RA3 | nCONFIG: a low pulse restarts configuration |
//!
//! Each bitstream byte is shifted LSB first: for every bit DATA is driven,
//! then CLK goes high and low again, so there is exactly one rising edge per
//! bit and the clock is low between bytes.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{OutputPin, PinState};

/// LOAD low time before a bitstream read from flash.
pub const FLASH_LOAD_PULSE_MS: u32 = 50;

/// Time after LOAD rises before the first flash byte is clocked in.
pub const FLASH_LOAD_SETTLE_MS: u32 = 20;

/// LOAD low time before a bitstream received over the console.
pub const SERIAL_LOAD_PULSE_MS: u32 = 10;

/// Errors returned by the FPGA loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FpgaError {
    /// GPIO operation error.
    Gpio,
}

impl core::fmt::Display for FpgaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Gpio => write!(f, "FPGA configuration GPIO error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FpgaError {}

/// Anything that can take a configuration bitstream.
pub trait FpgaPort {
    /// Leave the FPGA alone: LOAD high (not loading), CLK low.
    fn idle(&mut self) -> Result<(), FpgaError>;

    /// Restart configuration: LOAD low for `pulse_ms`, then high, then wait
    /// `settle_ms` before data may be clocked.
    fn begin_load(&mut self, pulse_ms: u32, settle_ms: u32) -> Result<(), FpgaError>;

    /// Shift one configuration byte, LSB first.
    fn load_byte(&mut self, byte: u8) -> Result<(), FpgaError>;

    /// Shift a whole buffer.
    fn load(&mut self, bytes: &[u8]) -> Result<(), FpgaError> {
        bytes.iter().try_for_each(|&b| self.load_byte(b))
    }
}

/// Passive-serial loader on three GPIO lines.
pub struct FpgaLoader<CLK, DATA, LOAD, D> {
    clk: CLK,
    data: DATA,
    load: LOAD,
    delay: D,
}

impl<CLK, DATA, LOAD, D> FpgaLoader<CLK, DATA, LOAD, D>
where
    CLK: OutputPin,
    DATA: OutputPin,
    LOAD: OutputPin,
    D: DelayNs,
{
    /// Create a loader. Call [`idle`](FpgaPort::idle) before use.
    pub fn new(clk: CLK, data: DATA, load: LOAD, delay: D) -> Self {
        Self {
            clk,
            data,
            load,
            delay,
        }
    }

    /// Give the pins back.
    pub fn release(self) -> (CLK, DATA, LOAD, D) {
        (self.clk, self.data, self.load, self.delay)
    }
}

impl<CLK, DATA, LOAD, D> FpgaPort for FpgaLoader<CLK, DATA, LOAD, D>
where
    CLK: OutputPin,
    DATA: OutputPin,
    LOAD: OutputPin,
    D: DelayNs,
{
    fn idle(&mut self) -> Result<(), FpgaError> {
        self.load.set_high().map_err(|_| FpgaError::Gpio)?;
        self.clk.set_low().map_err(|_| FpgaError::Gpio)
    }

    fn begin_load(&mut self, pulse_ms: u32, settle_ms: u32) -> Result<(), FpgaError> {
        self.load.set_low().map_err(|_| FpgaError::Gpio)?;
        self.delay.delay_ms(pulse_ms);
        self.load.set_high().map_err(|_| FpgaError::Gpio)?;
        if settle_ms > 0 {
            self.delay.delay_ms(settle_ms);
        }
        Ok(())
    }

    fn load_byte(&mut self, byte: u8) -> Result<(), FpgaError> {
        let mut bits = byte;
        for _ in 0..8 {
            let level = PinState::from(bits & 0x01 != 0);
            self.data.set_state(level).map_err(|_| FpgaError::Gpio)?;
            self.clk.set_high().map_err(|_| FpgaError::Gpio)?;
            self.clk.set_low().map_err(|_| FpgaError::Gpio)?;
            bits = bits.wrapping_shr(1);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    /// Delay source that records each millisecond wait.
    #[derive(Default)]
    struct RecordingDelay {
        waits_ms: Vec<u32>,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, _ns: u32) {}

        fn delay_ms(&mut self, ms: u32) {
            self.waits_ms.push(ms);
        }
    }

    fn pulses(bits: usize) -> Vec<PinTransaction> {
        let mut txns = Vec::new();
        for _ in 0..bits {
            txns.push(PinTransaction::set(PinState::High));
            txns.push(PinTransaction::set(PinState::Low));
        }
        txns
    }

    #[test]
    fn load_byte_shifts_lsb_first() {
        // 0x01 → first bit high, remaining seven low.
        let mut data_txns = vec![PinTransaction::set(PinState::High)];
        data_txns.extend((0..7).map(|_| PinTransaction::set(PinState::Low)));
        let mut clk = PinMock::new(&pulses(8));
        let mut data = PinMock::new(&data_txns);
        let mut load = PinMock::new(&[]);
        let mut fpga = FpgaLoader::new(clk.clone(), data.clone(), load.clone(), NoopDelay);

        fpga.load_byte(0x01).unwrap();

        clk.done();
        data.done();
        load.done();
    }

    #[test]
    fn load_emits_one_rising_edge_per_bit() {
        let bytes = [0xA5, 0x3C, 0xFF];
        let mut data_txns = Vec::new();
        for b in bytes {
            for bit in 0..8 {
                let level = if b & (1 << bit) != 0 {
                    PinState::High
                } else {
                    PinState::Low
                };
                data_txns.push(PinTransaction::set(level));
            }
        }
        let mut clk = PinMock::new(&pulses(bytes.len() * 8));
        let mut data = PinMock::new(&data_txns);
        let mut load = PinMock::new(&[]);
        let mut fpga = FpgaLoader::new(clk.clone(), data.clone(), load.clone(), NoopDelay);

        fpga.load(&bytes).unwrap();

        clk.done();
        data.done();
        load.done();
    }

    #[test]
    fn idle_parks_load_high_and_clock_low() {
        let mut clk = PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let mut data = PinMock::new(&[]);
        let mut load = PinMock::new(&[PinTransaction::set(PinState::High)]);
        let mut fpga = FpgaLoader::new(clk.clone(), data.clone(), load.clone(), NoopDelay);

        fpga.idle().unwrap();

        clk.done();
        data.done();
        load.done();
    }

    #[test]
    fn begin_load_pulses_load_low_for_the_requested_time() {
        let mut clk = PinMock::new(&[]);
        let mut data = PinMock::new(&[]);
        let mut load = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let mut delay = RecordingDelay::default();
        let mut fpga = FpgaLoader::new(clk.clone(), data.clone(), load.clone(), &mut delay);

        fpga.begin_load(FLASH_LOAD_PULSE_MS, FLASH_LOAD_SETTLE_MS)
            .unwrap();
        drop(fpga);

        assert_eq!(delay.waits_ms, [FLASH_LOAD_PULSE_MS, FLASH_LOAD_SETTLE_MS]);
        clk.done();
        data.done();
        load.done();
    }

    #[test]
    fn begin_load_without_settle_skips_second_wait() {
        let mut clk = PinMock::new(&[]);
        let mut data = PinMock::new(&[]);
        let mut load = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let mut delay = RecordingDelay::default();
        let mut fpga = FpgaLoader::new(clk.clone(), data.clone(), load.clone(), &mut delay);

        fpga.begin_load(SERIAL_LOAD_PULSE_MS, 0).unwrap();
        drop(fpga);

        assert_eq!(delay.waits_ms, [SERIAL_LOAD_PULSE_MS]);
        clk.done();
        data.done();
        load.done();
    }
}
