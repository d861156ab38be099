//! Single-character command console
//!
//! Every command is one byte. Arguments that follow are typed as hex digits
//! (echoed back one by one), a decimal line (`U`) or raw bytes (`W`). After a
//! command has been handled its byte is echoed; unknown bytes are dropped
//! without an echo. The main loop then prints the `"\r\n> "` prompt.
//!
//! Verbose mode adds prompts ("Address: 0x", "Brightness %: ") and
//! confirmation lines; terse mode prints single-character acknowledgements
//! so scripts on the host can synchronise.

use embedded_hal::delay::DelayNs;
use platform::config::{self, FLASH_BLOCK_SIZE};
use platform::{BrightnessPercent, Console, Eeprom, FlashAddress};

use crate::board::BoardControl;
use crate::boot::{BootError, Taboot};
use crate::flash::FlashBus;
use crate::fpga::{FpgaPort, SERIAL_LOAD_PULSE_MS};

/// Capacity of the `U` length line.
const UPLOAD_LINE_LEN: usize = 30;

/// Bytes per line of an `R` dump.
const DUMP_COLUMNS: usize = 16;

/// Console commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// `?`: print the help menu.
    Help,
    /// `V` / `v`: verbose on / off.
    Verbose(bool),
    /// `L` / `l`: test LED on / off.
    Led(bool),
    /// `5` / `0`: 5 V supply on / off.
    Supply(bool),
    /// `Bnn`: backlight to nn percent.
    Backlight,
    /// `~`: pulse the system reset.
    Reset,
    /// `U`: receive a bitstream over the console into the FPGA.
    Upload,
    /// `raa`: read EEPROM address aa.
    EepromRead,
    /// `waadd`: write dd to EEPROM address aa.
    EepromWrite,
    /// `R`: dump a 256-byte flash block.
    FlashRead,
    /// `W`: program a 256-byte flash block from raw console bytes.
    FlashWrite,
    /// `a`: program the 0..=255 test pattern.
    FlashTestWrite,
    /// `E`: erase the 64 KiB sector at an address.
    FlashErase,
    /// `S`: print the flash status register.
    FlashStatus,
    /// `+`: clear the flash block protection.
    FlashUnlock,
    /// `-`: restore the flash block protection.
    FlashRelock,
    /// `Taa`: load the FPGA from the file record at EEPROM pointer aa.
    Transfer,
}

impl Command {
    /// Decode a command byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let cmd = match byte {
            b'?' => Self::Help,
            b'V' => Self::Verbose(true),
            b'v' => Self::Verbose(false),
            b'L' => Self::Led(true),
            b'l' => Self::Led(false),
            b'5' => Self::Supply(true),
            b'0' => Self::Supply(false),
            b'B' => Self::Backlight,
            b'~' => Self::Reset,
            b'U' => Self::Upload,
            b'r' => Self::EepromRead,
            b'w' => Self::EepromWrite,
            b'R' => Self::FlashRead,
            b'W' => Self::FlashWrite,
            b'a' => Self::FlashTestWrite,
            b'E' => Self::FlashErase,
            b'S' => Self::FlashStatus,
            b'+' => Self::FlashUnlock,
            b'-' => Self::FlashRelock,
            b'T' => Self::Transfer,
            _ => return None,
        };
        Some(cmd)
    }

    /// The byte that selects this command.
    pub fn byte(self) -> u8 {
        match self {
            Self::Help => b'?',
            Self::Verbose(true) => b'V',
            Self::Verbose(false) => b'v',
            Self::Led(true) => b'L',
            Self::Led(false) => b'l',
            Self::Supply(true) => b'5',
            Self::Supply(false) => b'0',
            Self::Backlight => b'B',
            Self::Reset => b'~',
            Self::Upload => b'U',
            Self::EepromRead => b'r',
            Self::EepromWrite => b'w',
            Self::FlashRead => b'R',
            Self::FlashWrite => b'W',
            Self::FlashTestWrite => b'a',
            Self::FlashErase => b'E',
            Self::FlashStatus => b'S',
            Self::FlashUnlock => b'+',
            Self::FlashRelock => b'-',
            Self::Transfer => b'T',
        }
    }
}

/// Help menu body, printed after the banner.
///
/// `5`/`0` and `a` work but are left out of the menu.
pub const HELP_LINES: &str = "?     Show help menu\r\n\
V/v   Set to high/low verbosity\r\n\
L/l   Turn test LED ON/OFF\r\n\
Bnn   Set Backlight Level to nn%\r\n\
U     Upload FPGA Firmware\r\n\
~     System reset\r\n\
raa   Read EEPROM from aa address\r\n\
waadd Write to EEPROM address aa and data dd\r\n\
R     Read 256 byte block\r\n\
W     Write 256 byte block\r\n\
E     Erase Sector\r\n\
S     Read Flash Status\r\n\
+/-   Unlock/Lock flash for writing\r\n\
T     Transfer rbf File #\r\n";

/// Value of one typed hex digit, case-insensitive.
///
/// Anything that is not a hex digit still yields a value, so a typo writes
/// garbage rather than aborting the command.
pub fn hex_digit_value(digit: u8) -> u8 {
    if digit <= b'9' {
        digit.wrapping_sub(b'0')
    } else {
        digit
            .to_ascii_uppercase()
            .wrapping_sub(b'A')
            .wrapping_add(10)
    }
}

/// Leading decimal value of `text`: stops at the first non-digit, 0 when
/// there is none.
pub fn parse_decimal(text: &[u8]) -> u32 {
    let text = match text.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(start) => text.get(start..).unwrap_or_default(),
        None => return 0,
    };
    text.iter()
        .take_while(|b| b.is_ascii_digit())
        .fold(0u32, |acc, &b| {
            acc.wrapping_mul(10).wrapping_add(u32::from(b.wrapping_sub(b'0')))
        })
}

impl<C, E, B, FD, P, BRD> Taboot<C, E, B, FD, P, BRD>
where
    C: Console,
    E: Eeprom,
    B: FlashBus,
    FD: DelayNs,
    P: FpgaPort,
    BRD: BoardControl,
{
    /// Handle one command byte and echo it. Unknown bytes are ignored.
    ///
    /// Returns the decoded command.
    pub fn process(&mut self, byte: u8) -> Result<Option<Command>, BootError> {
        let Some(cmd) = Command::from_byte(byte) else {
            debug!("Ignoring byte {}", byte);
            return Ok(None);
        };
        self.execute(cmd)?;
        self.console.write_byte(cmd.byte())?;
        Ok(Some(cmd))
    }

    /// Run a decoded command without the trailing echo.
    pub fn execute(&mut self, cmd: Command) -> Result<(), BootError> {
        debug!("Command {}", cmd.byte());
        match cmd {
            Command::Help => self.help_menu(),
            Command::Verbose(on) => {
                self.verbose = on;
                Ok(())
            }
            Command::Led(on) => Ok(self.board.set_led(on)?),
            Command::Supply(on) => Ok(self.board.set_supply(on)?),
            Command::Backlight => self.set_backlight(),
            Command::Reset => self.reset_system(),
            Command::Upload => self.upload_rbf().map(|_| ()),
            Command::EepromRead => self.eeprom_read(),
            Command::EepromWrite => self.eeprom_write(),
            Command::FlashRead => self.flash_read(),
            Command::FlashWrite => self.flash_write(),
            Command::FlashTestWrite => self.flash_test_write(),
            Command::FlashErase => self.flash_erase(),
            Command::FlashStatus => self.flash_status(),
            Command::FlashUnlock => Ok(self.flash.unlock()?),
            Command::FlashRelock => Ok(self.flash.relock()?),
            Command::Transfer => self.transfer(),
        }
    }

    /// Print the banner and the command list.
    pub fn help_menu(&mut self) -> Result<(), BootError> {
        self.console.write_str("\r\n\r\n")?;
        self.console.write_str(config::banner())?;
        self.console.write_str("\r\n")?;
        self.console.write_str(HELP_LINES)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Argument input
    // -----------------------------------------------------------------------

    fn read_hex_digit(&mut self) -> Result<u8, BootError> {
        let digit = self.console.read_byte()?;
        self.console.write_byte(digit)?;
        Ok(hex_digit_value(digit))
    }

    /// Read two echoed hex digits as one byte.
    pub fn read_hex_byte(&mut self) -> Result<u8, BootError> {
        let hi = self.read_hex_digit()?;
        let lo = self.read_hex_digit()?;
        Ok(hi.wrapping_mul(16).wrapping_add(lo))
    }

    /// Read eight echoed hex digits as a flash address.
    ///
    /// Only the low 24 bits reach the chip.
    fn read_hex_address(&mut self) -> Result<FlashAddress, BootError> {
        let mut bytes = [0u8; 4];
        for slot in &mut bytes {
            *slot = self.read_hex_byte()?;
        }
        Ok(FlashAddress::truncating(u32::from_be_bytes(bytes)))
    }

    /// "Address: 0x" prompt, eight hex digits, newline.
    fn prompt_address(&mut self) -> Result<FlashAddress, BootError> {
        self.console.write_str("Address: 0x")?;
        let addr = self.read_hex_address()?;
        self.console.write_str("\r\n")?;
        Ok(addr)
    }

    // -----------------------------------------------------------------------
    // Board
    // -----------------------------------------------------------------------

    fn set_backlight(&mut self) -> Result<(), BootError> {
        if self.verbose {
            self.console.write_str("Brightness %: ")?;
        }
        let mut digits = [0u8; 2];
        for slot in &mut digits {
            *slot = self.console.read_byte()?;
            self.console.write_byte(*slot)?;
        }
        let percent = BrightnessPercent::from_ascii_digits(digits);
        debug!("Backlight {} percent", percent.get());
        self.board.set_backlight_percent(percent)?;
        Ok(())
    }

    /// Receive a bitstream over the console and shift it into the FPGA.
    ///
    /// The host first sends the length as a decimal line, then the raw
    /// bytes. Returns the length received.
    pub fn upload_rbf(&mut self) -> Result<u32, BootError> {
        let line = self.console.read_line::<UPLOAD_LINE_LEN>()?;
        let length = parse_decimal(&line);
        info!("Serial upload of {} bytes", length);

        self.fpga.begin_load(SERIAL_LOAD_PULSE_MS, 0)?;
        for _ in 0..length {
            let byte = self.console.read_byte()?;
            self.fpga.load_byte(byte)?;
        }

        if self.verbose {
            self.console
                .print(format_args!("\r\nrbf {length} bytes received\r\n"))?;
        } else {
            self.console.write_byte(b'F')?;
        }
        Ok(length)
    }

    // -----------------------------------------------------------------------
    // EEPROM
    // -----------------------------------------------------------------------

    fn eeprom_read(&mut self) -> Result<(), BootError> {
        if self.verbose {
            self.console.write_str("addr: 0x")?;
        }
        let addr = self.read_hex_byte()?;
        let data = self.eeprom.read(addr).map_err(|_| BootError::Eeprom)?;
        if self.verbose {
            self.console
                .print(format_args!(" data: 0x{data:02x}\r\n"))?;
        } else {
            self.console.print(format_args!("0x{data:02x}\r\n"))?;
        }
        Ok(())
    }

    fn eeprom_write(&mut self) -> Result<(), BootError> {
        if self.verbose {
            self.console.write_str("addr: 0x")?;
        }
        let addr = self.read_hex_byte()?;
        self.console
            .write_str(if self.verbose { " data: 0x" } else { " " })?;
        let data = self.read_hex_byte()?;
        self.eeprom
            .write(addr, data)
            .map_err(|_| BootError::Eeprom)?;
        debug!("EEPROM {} := {}", addr, data);
        self.console.write_str(if self.verbose {
            "\r\n eeprom data written"
        } else {
            "\r\n"
        })?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Flash
    // -----------------------------------------------------------------------

    fn flash_read(&mut self) -> Result<(), BootError> {
        let addr = self.prompt_address()?;
        let mut block = [0u8; FLASH_BLOCK_SIZE];
        self.flash.read_block(addr, &mut block)?;
        for row in block.chunks(DUMP_COLUMNS) {
            for byte in row {
                self.console.print(format_args!("0x{byte:02x} "))?;
            }
            self.console.write_str("\r\n")?;
        }
        Ok(())
    }

    fn flash_write(&mut self) -> Result<(), BootError> {
        let addr = self.read_hex_address()?;
        let mut block = [0u8; FLASH_BLOCK_SIZE];
        for slot in &mut block {
            *slot = self.console.read_byte()?;
        }
        self.flash.write_block(addr, &block)?;
        self.console.write_byte(b'.')?;
        Ok(())
    }

    fn flash_test_write(&mut self) -> Result<(), BootError> {
        let addr = self.prompt_address()?;
        let mut block = [0u8; FLASH_BLOCK_SIZE];
        for (slot, value) in block.iter_mut().zip(0u8..=u8::MAX) {
            *slot = value;
        }
        self.flash.write_block(addr, &block)?;
        if self.verbose {
            self.console.write_str("Flash test write done\r\n")?;
        } else {
            self.console.write_byte(b'.')?;
        }
        Ok(())
    }

    fn flash_erase(&mut self) -> Result<(), BootError> {
        let addr = self.prompt_address()?;
        self.flash.erase_sector(addr)?;
        if self.verbose {
            self.console.write_str("Flash erase done\r\n")?;
        }
        Ok(())
    }

    fn flash_status(&mut self) -> Result<(), BootError> {
        let status = self.flash.read_status()?;
        self.console
            .print(format_args!("Status=0x{status:02x}\r\n"))?;
        Ok(())
    }

    fn transfer(&mut self) -> Result<(), BootError> {
        if self.verbose {
            self.console.write_str("EEPROM Pointer: ")?;
        }
        let pointer = self.read_hex_byte()?;
        self.flash_to_fpga(pointer)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    use crate::eeprom::FileRecord;
    use crate::sim::{SimFlash, SimRig};
    use platform::mocks::MockEeprom;

    fn rig(verbose: bool) -> SimRig {
        let mut rig = SimRig::new(MockEeprom::new(), SimFlash::new());
        rig.taboot.verbose = verbose;
        rig
    }

    fn run(rig: &mut SimRig, input: &[u8]) -> String {
        rig.taboot.console_mut().clear_output();
        rig.taboot.console_mut().push_input(&input[1..]);
        rig.taboot.process(input[0]).unwrap();
        rig.taboot.console().output_str()
    }

    #[test]
    fn every_command_byte_round_trips() {
        for byte in 0..=u8::MAX {
            if let Some(cmd) = Command::from_byte(byte) {
                assert_eq!(cmd.byte(), byte);
            }
        }
    }

    #[test]
    fn hex_digits_are_case_insensitive() {
        assert_eq!(hex_digit_value(b'7'), 7);
        assert_eq!(hex_digit_value(b'a'), 10);
        assert_eq!(hex_digit_value(b'F'), 15);
    }

    #[test]
    fn decimal_parse_stops_at_first_non_digit() {
        assert_eq!(parse_decimal(b"107498"), 107_498);
        assert_eq!(parse_decimal(b" 42 bytes"), 42);
        assert_eq!(parse_decimal(b"x"), 0);
        assert_eq!(parse_decimal(b""), 0);
    }

    #[test]
    fn unknown_byte_is_not_echoed() {
        let mut rig = rig(true);
        assert_eq!(rig.taboot.process(b'z').unwrap(), None);
        assert_eq!(rig.taboot.console().output_str(), "");
    }

    #[test]
    fn help_menu_lists_commands_then_echoes() {
        let mut rig = rig(false);
        let out = run(&mut rig, b"?");
        assert!(out.starts_with("\r\n\r\nTaboot 1.0\r\n?     Show help menu\r\n"));
        assert!(out.ends_with("T     Transfer rbf File #\r\n?"));
    }

    #[test]
    fn verbosity_toggles() {
        let mut rig = rig(false);
        run(&mut rig, b"V");
        assert!(rig.taboot.verbose());
        run(&mut rig, b"v");
        assert!(!rig.taboot.verbose());
    }

    #[test]
    fn led_and_supply_commands_drive_lines() {
        let mut rig = rig(false);
        run(&mut rig, b"L");
        run(&mut rig, b"5");
        assert!(rig.led.level());
        assert!(rig.supply.level());
        run(&mut rig, b"l");
        run(&mut rig, b"0");
        assert!(!rig.led.level());
        assert!(!rig.supply.level());
    }

    #[test]
    fn eeprom_read_terse_and_verbose() {
        let mut rig = rig(false);
        let out = run(&mut rig, b"r02");
        assert_eq!(out, "020xff\r\nr");

        rig.taboot.verbose = true;
        let out = run(&mut rig, b"r1A");
        assert_eq!(out, "addr: 0x1A data: 0xff\r\nr");
    }

    #[test]
    fn eeprom_write_stores_value() {
        let mut rig = rig(false);
        let out = run(&mut rig, b"w0342");
        assert_eq!(out, "03 42\r\nw");
        assert_eq!(rig.taboot.eeprom().image()[0x03], 0x42);

        rig.taboot.verbose = true;
        let out = run(&mut rig, b"w04aa");
        assert_eq!(out, "addr: 0x04 data: 0xaa\r\n eeprom data writtenw");
        assert_eq!(rig.taboot.eeprom().image()[0x04], 0xAA);
    }

    #[test]
    fn backlight_percent_echoes_digits() {
        let mut rig = rig(true);
        let out = run(&mut rig, b"B50");
        assert_eq!(out, "Brightness %: 50B");
        assert_eq!(rig.taboot.board().backlight().duty(), Some(32));
    }

    #[test]
    fn reset_command_pulses_sysreset() {
        let mut rig = rig(true);
        let out = run(&mut rig, b"~");
        assert_eq!(out, "Reset done\r\n~");
        assert_eq!(rig.reset.falling_edges(), 1);
    }

    #[test]
    fn serial_upload_shifts_bytes_into_fpga() {
        let mut rig = rig(false);
        let out = run(&mut rig, b"U3\r\xAA\xBB\xCC");
        assert_eq!(out, "FU");
        assert_eq!(rig.capture.bitstream(), vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(rig.capture.load_pulses(), 1);

        rig.taboot.verbose = true;
        let out = run(&mut rig, b"U1\r\x01");
        assert_eq!(out, "\r\nrbf 1 bytes received\r\nU");
    }

    #[test]
    fn status_and_lock_commands() {
        let mut rig = rig(false);
        assert_eq!(run(&mut rig, b"S"), "Status=0x1c\r\nS");
        run(&mut rig, b"+");
        assert_eq!(run(&mut rig, b"S"), "Status=0x00\r\nS");
        run(&mut rig, b"-");
        assert_eq!(run(&mut rig, b"S"), "Status=0x1c\r\nS");
    }

    #[test]
    fn test_pattern_write_then_read_back() {
        let mut rig = rig(false);
        run(&mut rig, b"+");
        let out = run(&mut rig, b"a00000100");
        assert_eq!(out, "Address: 0x00000100\r\n.a");

        let out = run(&mut rig, b"R00000100");
        let mut lines = out.split("\r\n");
        assert_eq!(lines.next(), Some("Address: 0x00000100"));
        assert_eq!(
            lines.next(),
            Some("0x00 0x01 0x02 0x03 0x04 0x05 0x06 0x07 0x08 0x09 0x0a 0x0b 0x0c 0x0d 0x0e 0x0f ")
        );
        assert!(out.ends_with("0xfe 0xff \r\nR"));
    }

    #[test]
    fn raw_block_write_and_erase() {
        let mut rig = rig(true);
        run(&mut rig, b"+");
        let mut input = b"W00020000".to_vec();
        input.extend(core::iter::repeat(0x5A).take(FLASH_BLOCK_SIZE));
        let out = run(&mut rig, &input);
        assert_eq!(out, "00020000.W");

        let (_, _, flash, _, _) = rig.taboot.release();
        let (sim, _) = flash.release();
        assert!(sim.memory()[0x2_0000..0x2_0100].iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn erase_clears_the_sector() {
        let mut flash = SimFlash::new();
        flash.preload(0x1_0010, &[0x00; 4]);
        let mut rig = SimRig::new(MockEeprom::new(), flash);
        rig.taboot.verbose = true;
        run(&mut rig, b"+");
        let out = run(&mut rig, b"E00010000");
        assert_eq!(out, "Address: 0x00010000\r\nFlash erase done\r\nE");

        let (_, _, flash, _, _) = rig.taboot.release();
        let (sim, _) = flash.release();
        assert_eq!(&sim.memory()[0x1_0010..0x1_0014], &[0xFF; 4]);
    }

    #[test]
    fn transfer_loads_record_from_typed_pointer() {
        let mut eeprom = MockEeprom::new();
        FileRecord::new(FlashAddress::truncating(0x2_0000), 3, "lcd1.rbf")
            .unwrap()
            .write(&mut eeprom, 0x20)
            .unwrap();
        let mut flash = SimFlash::new();
        flash.preload(0x2_0000, &[1, 2, 3, 4]);
        let mut rig = SimRig::new(eeprom, flash);
        rig.taboot.verbose = true;

        let out = run(&mut rig, b"T20");
        assert_eq!(out, "EEPROM Pointer: 20Flash to fpga done\r\nT");
        assert_eq!(rig.capture.bitstream(), vec![1, 2, 3]);
        assert!(!rig.led.level());
    }
}
