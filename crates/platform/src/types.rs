//! Board domain newtypes for compile-time safety.
//!
//! These zero-cost abstractions prevent common errors:
//! - `FlashAddress`: 24-bit serial-flash address, never wider than the
//!   three address bytes the SST25V command set carries
//! - `BrightnessPercent`: two-digit console percentage, converts to a PWM duty
//! - `SampleRateHz`: validates the 8000–96000 Hz range the TABX codec accepts

// ── Error type ───────────────────────────────────────────────────────────────

/// Error returned when a value is out of the valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutOfRangeError {
    /// The value that was out of range.
    pub value: u32,
    /// The inclusive minimum allowed value.
    pub min: u32,
    /// The inclusive maximum allowed value.
    pub max: u32,
}

impl core::fmt::Display for OutOfRangeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "value {} outside {}..={}",
            self.value, self.min, self.max
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OutOfRangeError {}

// ── FlashAddress ─────────────────────────────────────────────────────────────

/// Byte address inside the serial flash.
///
/// Wraps a `u32` with the invariant `value <= 0x00FF_FFFF`, so it always
/// encodes into the three big-endian address bytes that follow a flash
/// opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct FlashAddress(u32);

impl FlashAddress {
    /// Highest encodable address.
    pub const MAX: u32 = 0x00FF_FFFF;

    /// Address zero.
    pub const ZERO: Self = Self(0);

    /// Create a `FlashAddress`, returning an error above 24 bits.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `value > 0xFF_FFFF`.
    pub fn new(value: u32) -> Result<Self, OutOfRangeError> {
        if value > Self::MAX {
            Err(OutOfRangeError {
                value,
                min: 0,
                max: Self::MAX,
            })
        } else {
            Ok(Self(value))
        }
    }

    /// Create a `FlashAddress` keeping only the low 24 bits.
    ///
    /// The console accepts eight hex digits; the chip only decodes three
    /// address bytes, so the top byte is dropped the same way the wire does.
    #[must_use]
    pub fn truncating(value: u32) -> Self {
        Self(value & Self::MAX)
    }

    /// Decode three big-endian address bytes.
    #[must_use]
    pub fn from_be_bytes(bytes: [u8; 3]) -> Self {
        let [hi, mid, lo] = bytes;
        Self(u32::from_be_bytes([0, hi, mid, lo]))
    }

    /// Encode as three big-endian address bytes (MSB first on the wire).
    #[must_use]
    pub fn to_be_bytes(self) -> [u8; 3] {
        let [_, hi, mid, lo] = self.0.to_be_bytes();
        [hi, mid, lo]
    }

    /// Add a byte offset, returning `None` past the top of the address space.
    #[must_use]
    pub fn checked_add(self, offset: u32) -> Option<Self> {
        self.0
            .checked_add(offset)
            .filter(|&v| v <= Self::MAX)
            .map(Self)
    }

    /// Return the address as a `u32`.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

// ── BrightnessPercent ────────────────────────────────────────────────────────

/// Backlight brightness entered on the console as two decimal digits.
///
/// Clamped to 0–99 (the console has no way to type 100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct BrightnessPercent(u8);

impl BrightnessPercent {
    /// Largest representable percentage.
    pub const MAX: u8 = 99;

    /// Create a `BrightnessPercent`, clamping values above 99 to 99.
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.min(Self::MAX))
    }

    /// Parse two ASCII decimal digits.
    ///
    /// Mirrors a lenient `atof`: leading whitespace is skipped and a
    /// non-digit stops the parse, so `" 5"` and `"5x"` are 5 and `"x5"` is 0.
    #[must_use]
    pub fn from_ascii_digits(digits: [u8; 2]) -> Self {
        let mut value: u8 = 0;
        for d in digits.into_iter().skip_while(u8::is_ascii_whitespace) {
            if !d.is_ascii_digit() {
                break;
            }
            // At most two digits: 99 fits in u8.
            value = value.saturating_mul(10).saturating_add(d.wrapping_sub(b'0'));
        }
        Self::new(value)
    }

    /// PWM duty count for this brightness: `percent × 64 / 100`.
    #[must_use]
    pub fn pwm_duty(self) -> u8 {
        // 99 × 64 = 6336 fits in u16; the quotient is at most 63.
        let duty = u16::from(self.0).saturating_mul(64) / 100;
        u8::try_from(duty).unwrap_or(u8::MAX)
    }

    /// Return the inner percentage (0–99).
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

// ── SampleRateHz ─────────────────────────────────────────────────────────────

/// Sample rate in Hz, validated to the range supported by the TABX codec.
///
/// Valid range: 8000–96000 Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct SampleRateHz(u32);

impl SampleRateHz {
    /// Minimum supported sample rate: 8000 Hz (telephony).
    pub const MIN_HZ: u32 = 8_000;

    /// Maximum supported sample rate: 96000 Hz.
    pub const MAX_HZ: u32 = 96_000;

    /// Create a `SampleRateHz`, returning an error if out of 8000–96000 Hz.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `hz < 8000` or `hz > 96000`.
    pub fn new(hz: u32) -> Result<Self, OutOfRangeError> {
        if (Self::MIN_HZ..=Self::MAX_HZ).contains(&hz) {
            Ok(Self(hz))
        } else {
            Err(OutOfRangeError {
                value: hz,
                min: Self::MIN_HZ,
                max: Self::MAX_HZ,
            })
        }
    }

    /// Return the sample rate in Hz.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}
