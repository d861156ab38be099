//! Board I/O owned by the bootloader
//!
//! | Signal   | PIC pin | Polarity |
//! |----------|---------|----------|
//! | Test LED | RB1 | active high |
//! | 5 V EN   | RA5 | active high |
//! | SysReset | RB3 | active low, resets the FPGA and the main CPU |
//! | Button   | RB0 | active low, weak pull-up |
//! | Backlight| RC2 | CCP1 PWM |

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use platform::{Backlight, BrightnessPercent, Eeprom};

use crate::eeprom::BootRecord;

/// How long SysReset is held low.
pub const RESET_PULSE_MS: u32 = 250;

/// Button debounce interval.
pub const DEBOUNCE_MS: u32 = 200;

/// Errors returned by board I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BoardError {
    /// GPIO operation error.
    Gpio,
    /// Backlight PWM error.
    Pwm,
    /// EEPROM access error.
    Eeprom,
}

impl core::fmt::Display for BoardError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Gpio => write!(f, "GPIO error"),
            Self::Pwm => write!(f, "Backlight PWM error"),
            Self::Eeprom => write!(f, "EEPROM access error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BoardError {}

/// Board-level controls the bootloader drives.
pub trait BoardControl {
    /// Turn the test LED on or off.
    fn set_led(&mut self, on: bool) -> Result<(), BoardError>;

    /// Enable or disable the 5 V supply.
    fn set_supply(&mut self, on: bool) -> Result<(), BoardError>;

    /// Pulse SysReset low for [`RESET_PULSE_MS`].
    fn reset_system(&mut self) -> Result<(), BoardError>;

    /// Drive SysReset inactive.
    fn release_reset(&mut self) -> Result<(), BoardError>;

    /// Program a raw backlight duty count.
    fn set_backlight(&mut self, duty: u8) -> Result<(), BoardError>;

    /// Program the backlight from a console percentage.
    fn set_backlight_percent(&mut self, percent: BrightnessPercent) -> Result<(), BoardError> {
        self.set_backlight(percent.pwm_duty())
    }

    /// Wait `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);

    /// Sample the on/off button and toggle the backlight on a press.
    ///
    /// Returns the new backlight state when a toggle happened.
    fn check_button<E: Eeprom>(&mut self, eeprom: &mut E) -> Result<Option<bool>, BoardError>;
}

/// Status LED, supply enable, system reset, button and backlight.
pub struct Board<LED, PS5V, RESET, BUTTON, BL, D> {
    led: LED,
    ps5v: PS5V,
    reset: RESET,
    button: BUTTON,
    backlight: BL,
    delay: D,
    backlight_on: bool,
}

impl<LED, PS5V, RESET, BUTTON, BL, D> Board<LED, PS5V, RESET, BUTTON, BL, D>
where
    LED: OutputPin,
    PS5V: OutputPin,
    RESET: OutputPin,
    BUTTON: InputPin,
    BL: Backlight,
    D: DelayNs,
{
    /// Take ownership of the board lines. The button state starts "off".
    pub fn new(led: LED, ps5v: PS5V, reset: RESET, button: BUTTON, backlight: BL, delay: D) -> Self {
        Self {
            led,
            ps5v,
            reset,
            button,
            backlight,
            delay,
            backlight_on: false,
        }
    }

    /// Give the lines back.
    pub fn release(self) -> (LED, PS5V, RESET, BUTTON, BL, D) {
        (
            self.led,
            self.ps5v,
            self.reset,
            self.button,
            self.backlight,
            self.delay,
        )
    }

    /// The backlight channel.
    pub fn backlight(&self) -> &BL {
        &self.backlight
    }

    /// `true` while the backlight has been toggled on by the button.
    pub fn backlight_on(&self) -> bool {
        self.backlight_on
    }

    fn button_pressed(&mut self) -> Result<bool, BoardError> {
        self.button.is_low().map_err(|_| BoardError::Gpio)
    }
}

impl<LED, PS5V, RESET, BUTTON, BL, D> BoardControl for Board<LED, PS5V, RESET, BUTTON, BL, D>
where
    LED: OutputPin,
    PS5V: OutputPin,
    RESET: OutputPin,
    BUTTON: InputPin,
    BL: Backlight,
    D: DelayNs,
{
    fn set_led(&mut self, on: bool) -> Result<(), BoardError> {
        self.led.set_state(on.into()).map_err(|_| BoardError::Gpio)
    }

    fn set_supply(&mut self, on: bool) -> Result<(), BoardError> {
        self.ps5v.set_state(on.into()).map_err(|_| BoardError::Gpio)
    }

    fn reset_system(&mut self) -> Result<(), BoardError> {
        self.reset.set_low().map_err(|_| BoardError::Gpio)?;
        self.delay.delay_ms(RESET_PULSE_MS);
        self.release_reset()
    }

    fn release_reset(&mut self) -> Result<(), BoardError> {
        self.reset.set_high().map_err(|_| BoardError::Gpio)
    }

    fn set_backlight(&mut self, duty: u8) -> Result<(), BoardError> {
        self.backlight.set_duty(duty).map_err(|_| BoardError::Pwm)
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// A press must still be present after [`DEBOUNCE_MS`]. Holding the
    /// button toggles again on every call. Turning on restores the duty
    /// saved in EEPROM; turning off sets duty 0.
    fn check_button<E: Eeprom>(&mut self, eeprom: &mut E) -> Result<Option<bool>, BoardError> {
        if !self.button_pressed()? {
            return Ok(None);
        }
        self.delay.delay_ms(DEBOUNCE_MS);
        if !self.button_pressed()? {
            return Ok(None);
        }
        self.backlight_on = !self.backlight_on;
        let duty = if self.backlight_on {
            BootRecord::read(eeprom)
                .map_err(|_| BoardError::Eeprom)?
                .button_duty()
        } else {
            0
        };
        debug!("Button toggled backlight, duty {}", duty);
        self.set_backlight(duty)?;
        Ok(Some(self.backlight_on))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    use crate::eeprom::SAVED_PWM;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use platform::mocks::{MockBacklight, MockEeprom};

    type TestBoard = Board<PinMock, PinMock, PinMock, PinMock, MockBacklight, NoopDelay>;

    struct Lines {
        led: PinMock,
        ps5v: PinMock,
        reset: PinMock,
        button: PinMock,
    }

    impl Lines {
        fn new(reset: &[PinTransaction], button: &[PinTransaction]) -> Self {
            Self {
                led: PinMock::new(&[]),
                ps5v: PinMock::new(&[]),
                reset: PinMock::new(reset),
                button: PinMock::new(button),
            }
        }

        fn board(&self) -> TestBoard {
            Board::new(
                self.led.clone(),
                self.ps5v.clone(),
                self.reset.clone(),
                self.button.clone(),
                MockBacklight::new(),
                NoopDelay,
            )
        }

        fn done(mut self) {
            self.led.done();
            self.ps5v.done();
            self.reset.done();
            self.button.done();
        }
    }

    fn pressed_twice() -> Vec<PinTransaction> {
        vec![
            PinTransaction::get(PinState::Low),
            PinTransaction::get(PinState::Low),
        ]
    }

    #[test]
    fn reset_pulses_low_then_high() {
        let lines = Lines::new(
            &[
                PinTransaction::set(PinState::Low),
                PinTransaction::set(PinState::High),
            ],
            &[],
        );
        lines.board().reset_system().unwrap();
        lines.done();
    }

    #[test]
    fn released_button_does_nothing() {
        let lines = Lines::new(&[], &[PinTransaction::get(PinState::High)]);
        let mut board = lines.board();
        let mut eeprom = MockEeprom::new();

        assert_eq!(board.check_button(&mut eeprom).unwrap(), None);
        assert!(!board.backlight_on());
        lines.done();
    }

    #[test]
    fn bounce_shorter_than_debounce_is_ignored() {
        let lines = Lines::new(
            &[],
            &[
                PinTransaction::get(PinState::Low),
                PinTransaction::get(PinState::High),
            ],
        );
        let mut board = lines.board();
        let mut eeprom = MockEeprom::new();

        assert_eq!(board.check_button(&mut eeprom).unwrap(), None);
        lines.done();
    }

    #[test]
    fn press_toggles_between_saved_duty_and_off() {
        let mut presses = pressed_twice();
        presses.extend(pressed_twice());
        let lines = Lines::new(&[], &presses);
        let mut board = lines.board();
        let mut eeprom = MockEeprom::new();
        eeprom.preload(SAVED_PWM, &[0x20]);

        assert_eq!(board.check_button(&mut eeprom).unwrap(), Some(true));
        assert_eq!(board.check_button(&mut eeprom).unwrap(), Some(false));
        let (_, _, _, _, backlight, _) = board.release();
        assert_eq!(backlight.history(), &[0x20, 0x00]);
        lines.done();
    }

    #[test]
    fn unsaved_duty_falls_back_to_default() {
        let lines = Lines::new(&[], &pressed_twice());
        let mut board = lines.board();
        let mut eeprom = MockEeprom::new();

        board.check_button(&mut eeprom).unwrap();
        let (_, _, _, _, backlight, _) = board.release();
        assert_eq!(backlight.duty(), Some(0x40));
        lines.done();
    }

    #[test]
    fn percent_maps_onto_64_step_duty() {
        let lines = Lines::new(&[], &[]);
        let mut board = lines.board();
        board
            .set_backlight_percent(BrightnessPercent::new(50))
            .unwrap();
        let (_, _, _, _, backlight, _) = board.release();
        assert_eq!(backlight.duty(), Some(32));
        lines.done();
    }
}
