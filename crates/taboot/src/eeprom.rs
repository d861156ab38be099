//! Boot record layout in the PIC data EEPROM
//!
//! ```text
//! Addr        Contents
//! ----------  ------------------------------------------------------------
//! 0x00        pointer to the file record loaded at boot, 0xFF = none
//! 0x01        board reset at boot, 0x01 = reset, anything else = no reset
//! 0x02        verbosity, 0x00 = terse, anything else = verbose
//! 0x03        backlight duty at boot, 0xFF = off
//! 0x04        backlight duty restored by the on/off button, 0xFF = 0x40
//! 0x05-0x0F   reserved
//! 0x10-0x1F   file record 0
//! 0x20-0x2F   file record 1
//!   ...
//! 0xF0-0xFF   file record 14
//! ```
//!
//! A file record is 16 bytes: a 24-bit flash start address and a 24-bit
//! length, both MSB first, followed by a 10-byte free-form ASCII name:
//!
//! ```text
//! 0x10  00 00 00  01 A3 EA  "plaid.rbf"    start 0x000000, 107 498 bytes
//! 0x20  02 00 00  01 B4 D1  "lcd1.rbf"     start 0x020000, 111 825 bytes
//! ```

use platform::{Eeprom, FlashAddress, OutOfRangeError};

/// Pointer to the file record loaded at boot.
pub const INIT_RBF: u8 = 0x00;
/// Reset-at-boot flag.
pub const INIT_RESET: u8 = 0x01;
/// Verbosity level.
pub const INIT_VERB: u8 = 0x02;
/// Backlight duty applied at the end of boot.
pub const INIT_PWM: u8 = 0x03;
/// Backlight duty restored when the button turns the backlight on.
pub const SAVED_PWM: u8 = 0x04;

/// Marker for "no value" in any header byte.
pub const UNSET: u8 = 0xFF;
/// [`INIT_RESET`] value that requests a board reset.
pub const RESET_ON_BOOT: u8 = 0x01;

/// Address of the first file record.
pub const RECORD_BASE: u8 = 0x10;
/// Bytes per file record.
pub const RECORD_SIZE: usize = 16;
/// Number of file records that fit after the header.
pub const RECORD_COUNT: u8 = 15;
/// Bytes reserved for the record name.
pub const NAME_LEN: usize = 10;

/// Largest length a record can describe.
pub const MAX_LENGTH: u32 = 0x00FF_FFFF;

/// EEPROM pointer of record `index` (0..15).
pub fn record_pointer(index: u8) -> Option<u8> {
    if index < RECORD_COUNT {
        index.checked_mul(16).and_then(|o| o.checked_add(RECORD_BASE))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// The five configuration bytes at the start of the EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootRecord {
    /// Raw [`INIT_RBF`] byte.
    pub rbf_pointer: u8,
    /// Raw [`INIT_RESET`] byte.
    pub reset: u8,
    /// Raw [`INIT_VERB`] byte.
    pub verbosity: u8,
    /// Raw [`INIT_PWM`] byte.
    pub initial_pwm: u8,
    /// Raw [`SAVED_PWM`] byte.
    pub saved_pwm: u8,
}

impl BootRecord {
    /// Header of a freshly erased EEPROM.
    pub const ERASED: Self = Self {
        rbf_pointer: UNSET,
        reset: UNSET,
        verbosity: UNSET,
        initial_pwm: UNSET,
        saved_pwm: UNSET,
    };

    /// Read the header.
    pub fn read<E: Eeprom>(eeprom: &mut E) -> Result<Self, E::Error> {
        let mut raw = [0u8; 5];
        eeprom.read_into(INIT_RBF, &mut raw)?;
        Ok(Self::from_bytes(raw))
    }

    /// Write the header.
    pub fn write<E: Eeprom>(&self, eeprom: &mut E) -> Result<(), E::Error> {
        eeprom.write_from(INIT_RBF, &self.to_bytes())
    }

    /// Decode the five header bytes.
    pub fn from_bytes(raw: [u8; 5]) -> Self {
        let [rbf_pointer, reset, verbosity, initial_pwm, saved_pwm] = raw;
        Self {
            rbf_pointer,
            reset,
            verbosity,
            initial_pwm,
            saved_pwm,
        }
    }

    /// Encode the five header bytes.
    pub fn to_bytes(&self) -> [u8; 5] {
        [
            self.rbf_pointer,
            self.reset,
            self.verbosity,
            self.initial_pwm,
            self.saved_pwm,
        ]
    }

    /// Record pointer to load at boot, if any.
    pub fn boot_pointer(&self) -> Option<u8> {
        (self.rbf_pointer != UNSET).then_some(self.rbf_pointer)
    }

    /// `true` when the board should be reset during boot.
    pub fn reset_on_boot(&self) -> bool {
        self.reset == RESET_ON_BOOT
    }

    /// `true` for any non-zero verbosity (an erased EEPROM is verbose).
    pub fn verbose(&self) -> bool {
        self.verbosity != 0
    }

    /// Backlight duty at the end of boot (unset means off).
    pub fn boot_duty(&self) -> u8 {
        if self.initial_pwm == UNSET {
            0
        } else {
            self.initial_pwm
        }
    }

    /// Backlight duty restored by the button.
    pub fn button_duty(&self) -> u8 {
        if self.saved_pwm == UNSET {
            platform::backlight::DEFAULT_DUTY
        } else {
            self.saved_pwm
        }
    }
}

// ---------------------------------------------------------------------------
// File records
// ---------------------------------------------------------------------------

/// One flash-resident bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FileRecord {
    /// First flash byte of the bitstream.
    pub start: FlashAddress,
    /// Bitstream length in bytes (24-bit).
    pub length: u32,
    /// Free-form name, padded with 0x00.
    pub name: [u8; NAME_LEN],
}

impl FileRecord {
    /// Create a record. Names longer than [`NAME_LEN`] are cut.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfRangeError`] if `length` does not fit in 24 bits.
    pub fn new(start: FlashAddress, length: u32, name: &str) -> Result<Self, OutOfRangeError> {
        if length > MAX_LENGTH {
            return Err(OutOfRangeError {
                value: length,
                min: 0,
                max: MAX_LENGTH,
            });
        }
        let mut padded = [0u8; NAME_LEN];
        for (slot, byte) in padded.iter_mut().zip(name.bytes()) {
            *slot = byte;
        }
        Ok(Self {
            start,
            length,
            name: padded,
        })
    }

    /// Read the record at `pointer`.
    ///
    /// `pointer` is any EEPROM address; reads wrap at 0xFF.
    pub fn read<E: Eeprom>(eeprom: &mut E, pointer: u8) -> Result<Self, E::Error> {
        let mut raw = [0u8; RECORD_SIZE];
        eeprom.read_into(pointer, &mut raw)?;
        Ok(Self::from_bytes(raw))
    }

    /// Write the record at `pointer`.
    pub fn write<E: Eeprom>(&self, eeprom: &mut E, pointer: u8) -> Result<(), E::Error> {
        eeprom.write_from(pointer, &self.to_bytes())
    }

    /// Decode 16 raw record bytes.
    pub fn from_bytes(raw: [u8; RECORD_SIZE]) -> Self {
        let [a2, a1, a0, l2, l1, l0, name @ ..] = raw;
        Self {
            start: FlashAddress::from_be_bytes([a2, a1, a0]),
            length: u32::from_be_bytes([0, l2, l1, l0]),
            name,
        }
    }

    /// Encode as 16 raw record bytes.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let [a2, a1, a0] = self.start.to_be_bytes();
        let [_, l2, l1, l0] = self.length.to_be_bytes();
        let mut raw = [0u8; RECORD_SIZE];
        for (slot, byte) in raw
            .iter_mut()
            .zip([a2, a1, a0, l2, l1, l0].into_iter().chain(self.name))
        {
            *slot = byte;
        }
        raw
    }

    /// Printable name: up to the first NUL or erased byte, empty if not UTF-8.
    pub fn name(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0x00 || b == UNSET)
            .unwrap_or(NAME_LEN);
        self.name
            .get(..end)
            .and_then(|bytes| core::str::from_utf8(bytes).ok())
            .unwrap_or("")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use platform::mocks::MockEeprom;

    #[test]
    fn decodes_example_record() {
        let mut eeprom = MockEeprom::new();
        let mut raw = vec![0x00, 0x00, 0x00, 0x01, 0xA3, 0xEA];
        raw.extend_from_slice(b"plaid.rbf\0");
        eeprom.preload(0x10, &raw);

        let record = FileRecord::read(&mut eeprom, 0x10).unwrap();
        assert_eq!(record.start, FlashAddress::ZERO);
        assert_eq!(record.length, 107_498);
        assert_eq!(record.name(), "plaid.rbf");
    }

    #[test]
    fn write_then_read_preserves_fields() {
        let mut eeprom = MockEeprom::new();
        let record = FileRecord::new(FlashAddress::truncating(0x02_0000), 111_825, "lcd1.rbf")
            .unwrap();
        record.write(&mut eeprom, 0x20).unwrap();

        assert_eq!(&eeprom.image()[0x20..0x26], &[0x02, 0x00, 0x00, 0x01, 0xB4, 0xD1]);
        assert_eq!(FileRecord::read(&mut eeprom, 0x20).unwrap(), record);
    }

    #[test]
    fn long_names_are_cut_to_ten_bytes() {
        let record = FileRecord::new(FlashAddress::ZERO, 1, "averylongname.rbf").unwrap();
        assert_eq!(record.name(), "averylongn");
    }

    #[test]
    fn length_must_fit_in_24_bits() {
        assert!(FileRecord::new(FlashAddress::ZERO, 0x0100_0000, "x").is_err());
    }

    #[test]
    fn erased_name_reads_empty() {
        let record = FileRecord::from_bytes([0xFF; RECORD_SIZE]);
        assert_eq!(record.name(), "");
        assert_eq!(record.length, MAX_LENGTH);
    }

    #[test]
    fn erased_header_is_verbose_with_no_boot_file() {
        let mut eeprom = MockEeprom::new();
        let header = BootRecord::read(&mut eeprom).unwrap();
        assert_eq!(header, BootRecord::ERASED);
        assert!(header.verbose());
        assert_eq!(header.boot_pointer(), None);
        assert!(!header.reset_on_boot());
        assert_eq!(header.boot_duty(), 0);
        assert_eq!(header.button_duty(), 0x40);
    }

    #[test]
    fn record_pointers_cover_0x10_to_0xf0() {
        assert_eq!(record_pointer(0), Some(0x10));
        assert_eq!(record_pointer(14), Some(0xF0));
        assert_eq!(record_pointer(15), None);
    }
}
