//! SPI flash bus framings
//!
//! The SST25V hangs off the PIC's SSP pins (SCK RC3, SDI RC4, SDO RC5) with
//! chip select on RC0. The bootloader can drive it two ways:
//!
//! - [`HwSpiBus`]: the SSP peripheral as an SPI master, mode 0, Fosc/4.
//! - [`BitBangBus`]: the same pins toggled from software, for boards where
//!   the SSP is needed elsewhere.
//!
//! Both only move single bytes; framing of whole commands lives in
//! [`Sst25v`](super::Sst25v).

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};
use embedded_hal::spi::SpiBus;

use super::FlashError;

/// Byte dummy-clocked out while receiving.
const FILL_BYTE: u8 = 0xFF;

/// Half clock period for the bit-banged framing (two instruction cycles at
/// 20 MHz).
const SCK_HALF_PERIOD_NS: u32 = 400;

/// Chip select setup time before the first clock edge.
const SELECT_SETTLE_US: u32 = 1;

/// Idle time with chip select high before a bit-banged selection.
const SELECT_IDLE_MS: u32 = 10;

/// Byte-level access to the serial flash.
///
/// Implementations must leave the clock low between bytes (SPI mode 0).
pub trait FlashBus {
    /// Put the bus in its idle state: chip deselected, clock low.
    fn idle(&mut self) -> Result<(), FlashError>;

    /// Assert chip select.
    fn select(&mut self) -> Result<(), FlashError>;

    /// Release chip select.
    fn deselect(&mut self) -> Result<(), FlashError>;

    /// Shift one byte out, MSB first.
    fn send(&mut self, byte: u8) -> Result<(), FlashError>;

    /// Shift one byte in, MSB first.
    fn receive(&mut self) -> Result<u8, FlashError>;
}

// ---------------------------------------------------------------------------
// Hardware SSP
// ---------------------------------------------------------------------------

/// Flash bus on a hardware SPI master plus a GPIO chip select.
///
/// The SPI peripheral must already be configured for mode 0 (clock idle low,
/// data sampled on the rising edge). Chip select is driven here rather than
/// by an `SpiDevice` because a bitstream transfer keeps the chip selected
/// across hundreds of kilobytes.
pub struct HwSpiBus<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> HwSpiBus<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    /// Wrap an SPI master and its chip select line.
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    /// Give the peripherals back.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

impl<SPI, CS> FlashBus for HwSpiBus<SPI, CS>
where
    SPI: SpiBus,
    CS: OutputPin,
{
    fn idle(&mut self) -> Result<(), FlashError> {
        self.cs.set_high().map_err(|_| FlashError::Gpio)
    }

    fn select(&mut self) -> Result<(), FlashError> {
        self.cs.set_low().map_err(|_| FlashError::Gpio)
    }

    fn deselect(&mut self) -> Result<(), FlashError> {
        // The last byte must be off the wire before CS rises. CS rises even
        // when the flush fails.
        let flushed = self.spi.flush().map_err(|_| FlashError::Spi);
        self.cs.set_high().map_err(|_| FlashError::Gpio)?;
        flushed
    }

    fn send(&mut self, byte: u8) -> Result<(), FlashError> {
        self.spi.write(&[byte]).map_err(|_| FlashError::Spi)
    }

    fn receive(&mut self) -> Result<u8, FlashError> {
        let mut word = [FILL_BYTE];
        self.spi
            .transfer_in_place(&mut word)
            .map_err(|_| FlashError::Spi)?;
        let [byte] = word;
        Ok(byte)
    }
}

// ---------------------------------------------------------------------------
// Bit-banged
// ---------------------------------------------------------------------------

/// Flash bus driven entirely from GPIO.
///
/// Send: drive MOSI, raise SCK, wait, lower SCK, wait (8 times, MSB first).
/// Receive: raise SCK, sample MISO, lower SCK.
pub struct BitBangBus<SCK, MOSI, MISO, CS, D> {
    sck: SCK,
    mosi: MOSI,
    miso: MISO,
    cs: CS,
    delay: D,
}

impl<SCK, MOSI, MISO, CS, D> BitBangBus<SCK, MOSI, MISO, CS, D>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
    D: DelayNs,
{
    /// Create a bit-banged bus from its four lines and a delay source.
    pub fn new(sck: SCK, mosi: MOSI, miso: MISO, cs: CS, delay: D) -> Self {
        Self {
            sck,
            mosi,
            miso,
            cs,
            delay,
        }
    }

    /// Give the pins back.
    pub fn release(self) -> (SCK, MOSI, MISO, CS, D) {
        (self.sck, self.mosi, self.miso, self.cs, self.delay)
    }

    fn sck_high(&mut self) -> Result<(), FlashError> {
        self.sck.set_high().map_err(|_| FlashError::Gpio)
    }

    fn sck_low(&mut self) -> Result<(), FlashError> {
        self.sck.set_low().map_err(|_| FlashError::Gpio)
    }
}

impl<SCK, MOSI, MISO, CS, D> FlashBus for BitBangBus<SCK, MOSI, MISO, CS, D>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CS: OutputPin,
    D: DelayNs,
{
    fn idle(&mut self) -> Result<(), FlashError> {
        self.sck_low()?;
        self.cs.set_high().map_err(|_| FlashError::Gpio)
    }

    fn select(&mut self) -> Result<(), FlashError> {
        self.cs.set_high().map_err(|_| FlashError::Gpio)?;
        self.sck_low()?;
        self.delay.delay_ms(SELECT_IDLE_MS);
        self.cs.set_low().map_err(|_| FlashError::Gpio)?;
        self.delay.delay_us(SELECT_SETTLE_US);
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), FlashError> {
        self.cs.set_high().map_err(|_| FlashError::Gpio)?;
        self.sck_low()?;
        self.delay.delay_us(SELECT_SETTLE_US);
        Ok(())
    }

    fn send(&mut self, byte: u8) -> Result<(), FlashError> {
        let mut data = byte;
        for _ in 0..8 {
            let bit = PinState::from(data & 0x80 != 0);
            self.mosi.set_state(bit).map_err(|_| FlashError::Gpio)?;
            self.sck_high()?;
            self.delay.delay_ns(SCK_HALF_PERIOD_NS);
            self.sck_low()?;
            self.delay.delay_ns(SCK_HALF_PERIOD_NS);
            data = data.wrapping_shl(1);
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<u8, FlashError> {
        let mut data: u8 = 0;
        for _ in 0..8 {
            self.sck_high()?;
            self.delay.delay_ns(SCK_HALF_PERIOD_NS);
            let bit = self.miso.is_high().map_err(|_| FlashError::Gpio)?;
            data = data.wrapping_shl(1) | u8::from(bit);
            self.sck_low()?;
            self.delay.delay_ns(SCK_HALF_PERIOD_NS);
        }
        Ok(data)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    /// SCK expectations for `n` whole bytes: one high/low pair per bit.
    fn clock_pulses(bytes: usize) -> Vec<PinTransaction> {
        let mut txns = Vec::new();
        for _ in 0..bytes * 8 {
            txns.push(PinTransaction::set(PinState::High));
            txns.push(PinTransaction::set(PinState::Low));
        }
        txns
    }

    /// Data line levels for one byte, MSB first.
    fn bits_msb_first(byte: u8) -> Vec<PinState> {
        (0..8)
            .rev()
            .map(|bit| {
                if byte & (1 << bit) != 0 {
                    PinState::High
                } else {
                    PinState::Low
                }
            })
            .collect()
    }

    #[test]
    fn hw_receive_clocks_out_fill_byte() {
        let expectations = [SpiTransaction::transfer_in_place(vec![0xFF], vec![0x1C])];
        let mut spi = SpiMock::new(&expectations);
        let mut cs = PinMock::new(&[]);
        let mut bus = HwSpiBus::new(spi.clone(), cs.clone());

        assert_eq!(bus.receive().unwrap(), 0x1C);

        spi.done();
        cs.done();
    }

    #[test]
    fn hw_deselect_flushes_before_raising_cs() {
        let expectations = [
            SpiTransaction::write_vec(vec![0x06]),
            SpiTransaction::flush(),
        ];
        let mut spi = SpiMock::new(&expectations);
        let mut cs = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let mut bus = HwSpiBus::new(spi.clone(), cs.clone());

        bus.select().unwrap();
        bus.send(0x06).unwrap();
        bus.deselect().unwrap();

        spi.done();
        cs.done();
    }

    /// SPI master whose flush always fails.
    struct FlushFails;

    impl embedded_hal::spi::ErrorType for FlushFails {
        type Error = embedded_hal::spi::ErrorKind;
    }

    impl SpiBus for FlushFails {
        fn read(&mut self, _words: &mut [u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn write(&mut self, _words: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn transfer(&mut self, _read: &mut [u8], _write: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn transfer_in_place(&mut self, _words: &mut [u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Err(embedded_hal::spi::ErrorKind::Other)
        }
    }

    #[test]
    fn hw_deselect_raises_cs_when_flush_fails() {
        let mut cs = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let mut bus = HwSpiBus::new(FlushFails, cs.clone());

        bus.select().unwrap();
        bus.send(0x05).unwrap();
        assert_eq!(bus.deselect(), Err(FlashError::Spi));

        cs.done();
    }

    #[test]
    fn bitbang_send_is_msb_first_with_one_pulse_per_bit() {
        let mosi_txns: Vec<_> = bits_msb_first(0xA5)
            .into_iter()
            .map(PinTransaction::set)
            .collect();
        let mut sck = PinMock::new(&clock_pulses(1));
        let mut mosi = PinMock::new(&mosi_txns);
        let mut miso = PinMock::new(&[]);
        let mut cs = PinMock::new(&[]);
        let mut bus = BitBangBus::new(
            sck.clone(),
            mosi.clone(),
            miso.clone(),
            cs.clone(),
            NoopDelay,
        );

        bus.send(0xA5).unwrap();

        sck.done();
        mosi.done();
        miso.done();
        cs.done();
    }

    #[test]
    fn bitbang_receive_samples_while_clock_high() {
        let miso_txns: Vec<_> = bits_msb_first(0x3C)
            .into_iter()
            .map(PinTransaction::get)
            .collect();
        let mut sck = PinMock::new(&clock_pulses(1));
        let mut mosi = PinMock::new(&[]);
        let mut miso = PinMock::new(&miso_txns);
        let mut cs = PinMock::new(&[]);
        let mut bus = BitBangBus::new(
            sck.clone(),
            mosi.clone(),
            miso.clone(),
            cs.clone(),
            NoopDelay,
        );

        assert_eq!(bus.receive().unwrap(), 0x3C);

        sck.done();
        mosi.done();
        miso.done();
        cs.done();
    }

    #[test]
    fn bitbang_select_idles_clock_before_asserting_cs() {
        let mut sck = PinMock::new(&[
            // select
            PinTransaction::set(PinState::Low),
            // deselect
            PinTransaction::set(PinState::Low),
        ]);
        let mut mosi = PinMock::new(&[]);
        let mut miso = PinMock::new(&[]);
        let mut cs = PinMock::new(&[
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let mut bus = BitBangBus::new(
            sck.clone(),
            mosi.clone(),
            miso.clone(),
            cs.clone(),
            NoopDelay,
        );

        bus.select().unwrap();
        bus.deselect().unwrap();

        sck.done();
        mosi.done();
        miso.done();
        cs.done();
    }
}
