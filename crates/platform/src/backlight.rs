//! LCD backlight PWM
//!
//! The backlight runs from CCP1 on the bootloader MCU: Timer2 at
//! 20 MHz / 4 / 4 / 64 gives a 19 531 Hz carrier, and the duty value written
//! by the firmware is an 8-bit count where 64 is a fully-on backlight.
//! Any `embedded-hal` [`SetDutyCycle`] channel is a [`Backlight`].

use embedded_hal::pwm::SetDutyCycle;

/// Duty count for a fully-on backlight.
pub const FULL_DUTY: u8 = 64;

/// Duty used by the on/off button when no level has been saved.
pub const DEFAULT_DUTY: u8 = 0x40;

/// Backlight brightness control.
pub trait Backlight {
    /// Error type
    type Error: core::fmt::Debug;

    /// Program the raw PWM duty count. `0` turns the backlight off.
    fn set_duty(&mut self, duty: u8) -> Result<(), Self::Error>;

    /// Turn the backlight off.
    fn off(&mut self) -> Result<(), Self::Error> {
        self.set_duty(0)
    }
}

impl<T: SetDutyCycle> Backlight for T {
    type Error = T::Error;

    fn set_duty(&mut self, duty: u8) -> Result<(), Self::Error> {
        self.set_duty_cycle(u16::from(duty))
    }
}
