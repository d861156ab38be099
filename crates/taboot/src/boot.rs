//! Power-on sequence and main loop
//!
//! Boot order:
//!   1. LED off, backlight off, FPGA LOAD high (not loading)
//!   2. 100 ms power-up delay
//!   3. Verbosity from EEPROM
//!   4. Board reset if requested in EEPROM, otherwise SysReset held inactive
//!   5. LED on, flash init with retries, 400 ms settle
//!   6. FPGA configured from the boot record (skipped when unset)
//!   7. Backlight to its boot duty, LED off
//!   8. Help menu (verbose only) and the `>` prompt
//!
//! After boot the loop either services one console command or samples the
//! backlight button; there is nothing else running on the controller.

use embedded_hal::delay::DelayNs;
use platform::{Console, ConsoleError, Eeprom};

use crate::board::{BoardControl, BoardError};
use crate::eeprom::{BootRecord, FileRecord, INIT_RBF, UNSET};
use crate::flash::{FlashBus, FlashError, Sst25v};
use crate::fpga::{FpgaError, FpgaPort, FLASH_LOAD_PULSE_MS, FLASH_LOAD_SETTLE_MS};

/// Delay after the outputs are parked at power-up.
pub const POWER_UP_DELAY_MS: u32 = 100;

/// Delay between flash init and the first bitstream load.
pub const FLASH_SETTLE_MS: u32 = 400;

/// Flash init retries at boot (one attempt plus this many).
pub const FLASH_INIT_RETRIES: u8 = 5;

/// Errors that stop a boot step or a console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootError {
    /// Console I/O failed.
    Console(ConsoleError),
    /// Serial flash failed.
    Flash(FlashError),
    /// FPGA configuration lines failed.
    Fpga(FpgaError),
    /// Board I/O failed.
    Board(BoardError),
    /// EEPROM access failed.
    Eeprom,
}

impl core::fmt::Display for BootError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Console(e) => write!(f, "console: {e}"),
            Self::Flash(e) => write!(f, "flash: {e}"),
            Self::Fpga(e) => write!(f, "fpga: {e}"),
            Self::Board(e) => write!(f, "board: {e}"),
            Self::Eeprom => write!(f, "EEPROM access error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BootError {}

impl From<ConsoleError> for BootError {
    fn from(e: ConsoleError) -> Self {
        Self::Console(e)
    }
}

impl From<FlashError> for BootError {
    fn from(e: FlashError) -> Self {
        Self::Flash(e)
    }
}

impl From<FpgaError> for BootError {
    fn from(e: FpgaError) -> Self {
        Self::Fpga(e)
    }
}

impl From<BoardError> for BootError {
    fn from(e: BoardError) -> Self {
        Self::Board(e)
    }
}

/// The bootloader: console, EEPROM, serial flash, FPGA port and board I/O.
pub struct Taboot<C, E, B, FD, P, BRD> {
    pub(crate) console: C,
    pub(crate) eeprom: E,
    pub(crate) flash: Sst25v<B, FD>,
    pub(crate) fpga: P,
    pub(crate) board: BRD,
    pub(crate) verbose: bool,
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
    /// Assemble the bootloader. Nothing is touched until [`boot`](Self::boot).
    pub fn new(console: C, eeprom: E, flash: Sst25v<B, FD>, fpga: P, board: BRD) -> Self {
        Self {
            console,
            eeprom,
            flash,
            fpga,
            board,
            verbose: false,
        }
    }

    /// Take the parts back.
    pub fn release(self) -> (C, E, Sst25v<B, FD>, P, BRD) {
        (self.console, self.eeprom, self.flash, self.fpga, self.board)
    }

    /// The console.
    pub fn console(&self) -> &C {
        &self.console
    }

    /// The console, mutably.
    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    /// The EEPROM.
    pub fn eeprom(&self) -> &E {
        &self.eeprom
    }

    /// The FPGA port.
    pub fn fpga(&self) -> &P {
        &self.fpga
    }

    /// The board I/O.
    pub fn board(&self) -> &BRD {
        &self.board
    }

    /// `true` when prompts and confirmations are printed.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Run the power-on sequence up to the first prompt.
    ///
    /// A flash chip that never reports its power-on status is not fatal:
    /// the failure is reported and boot carries on.
    pub fn boot(&mut self) -> Result<(), BootError> {
        self.board.set_led(false)?;
        self.board.set_backlight(0)?;
        self.fpga.idle()?;
        self.board.delay_ms(POWER_UP_DELAY_MS);

        let header = BootRecord::read(&mut self.eeprom).map_err(|_| BootError::Eeprom)?;
        self.verbose = header.verbose();
        info!("Boot header {} {} {}", header.rbf_pointer, header.reset, header.verbosity);

        if header.reset_on_boot() {
            self.reset_system()?;
        } else {
            self.board.release_reset()?;
        }

        self.board.set_led(true)?;
        self.try_init_flash(FLASH_INIT_RETRIES)?;
        self.board.delay_ms(FLASH_SETTLE_MS);
        self.init_fpga(INIT_RBF)?;

        self.board.set_backlight(header.boot_duty())?;
        self.board.set_led(false)?;

        if self.verbose {
            self.help_menu()?;
        }
        self.console.write_str(">")?;
        Ok(())
    }

    /// Pulse SysReset.
    pub fn reset_system(&mut self) -> Result<(), BootError> {
        self.board.reset_system()?;
        info!("System reset");
        if self.verbose {
            self.console.write_str("Reset done\r\n")?;
        }
        Ok(())
    }

    /// Bring up the flash, reporting the outcome when verbose.
    ///
    /// Returns `false` when the chip never answered.
    pub fn try_init_flash(&mut self, retries: u8) -> Result<bool, BootError> {
        let ok = match self.flash.try_init(retries) {
            Ok(()) => true,
            Err(FlashError::NotResponding { .. }) => false,
            Err(e) => return Err(e.into()),
        };
        if self.verbose {
            let msg = if ok {
                "Flash Init OK\r\n"
            } else {
                "Flash Init failed\r\n"
            };
            self.console.write_str(msg)?;
        }
        Ok(ok)
    }

    /// Configure the FPGA from the record whose pointer is stored at
    /// EEPROM address `pointer_addr`. An unset pointer skips the load.
    pub fn init_fpga(&mut self, pointer_addr: u8) -> Result<(), BootError> {
        let pointer = self
            .eeprom
            .read(pointer_addr)
            .map_err(|_| BootError::Eeprom)?;
        if pointer == UNSET {
            info!("No boot bitstream configured");
            if self.verbose {
                self.console.write_str("no address in eeprom\r\n")?;
            }
            return Ok(());
        }
        self.flash_to_fpga(pointer)
    }

    /// Stream the bitstream described by the file record at `pointer` from
    /// flash into the FPGA.
    ///
    /// The record is not validated: whatever start and length it holds are
    /// sent, and the FPGA decides whether the configuration took.
    pub fn flash_to_fpga(&mut self, pointer: u8) -> Result<(), BootError> {
        self.board.set_led(true)?;
        self.fpga
            .begin_load(FLASH_LOAD_PULSE_MS, FLASH_LOAD_SETTLE_MS)?;

        let record = FileRecord::read(&mut self.eeprom, pointer).map_err(|_| BootError::Eeprom)?;
        info!(
            "Loading record {} from flash {} ({} bytes)",
            pointer,
            record.start.get(),
            record.length
        );

        let fpga = &mut self.fpga;
        self.flash
            .stream(record.start, record.length, |byte| -> Result<(), BootError> {
                fpga.load_byte(byte)?;
                Ok(())
            })?;

        self.board.set_led(false)?;
        if self.verbose {
            self.console.write_str("Flash to fpga done\r\n")?;
        }
        Ok(())
    }

    /// One pass of the main loop: service a pending command, or sample the
    /// backlight button when the console is idle.
    pub fn poll(&mut self) -> Result<(), BootError> {
        if self.console.byte_available()? {
            let byte = self.console.read_byte()?;
            // The prompt follows every command, failed or not; a command
            // error takes precedence over a prompt error.
            let processed = self.process(byte);
            let prompted = self.console.write_str("\r\n> ");
            processed?;
            prompted?;
        } else {
            self.board.check_button(&mut self.eeprom)?;
        }
        Ok(())
    }

    /// Run the main loop forever. Errors are logged and the loop goes on.
    pub fn run(&mut self) -> ! {
        loop {
            if let Err(_e) = self.poll() {
                error!("Main loop: {}", _e);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    use crate::eeprom::{INIT_PWM, INIT_RESET, INIT_VERB};
    use crate::sim::{SimDelay, SimFlash, SimRig};
    use platform::mocks::MockEeprom;
    use platform::FlashAddress;

    fn plaid_eeprom() -> MockEeprom {
        let mut eeprom = MockEeprom::new();
        eeprom.preload(INIT_RBF, &[0x10]);
        let record = FileRecord::new(FlashAddress::ZERO, 4, "plaid.rbf").unwrap();
        record.write(&mut eeprom, 0x10).unwrap();
        eeprom
    }

    fn plaid_flash() -> SimFlash {
        let mut flash = SimFlash::new();
        flash.preload(0, &[0xDE, 0xAD, 0xBE, 0xEF, 0x55]);
        flash
    }

    #[test]
    fn boot_loads_the_configured_bitstream() {
        let mut rig = SimRig::new(plaid_eeprom(), plaid_flash());
        rig.taboot.boot().unwrap();

        assert_eq!(rig.capture.bitstream(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(rig.capture.load_pulses(), 1);
        assert!(!rig.led.level());
    }

    #[test]
    fn erased_eeprom_boots_verbose_without_loading() {
        let mut rig = SimRig::new(MockEeprom::new(), SimFlash::new());
        rig.taboot.boot().unwrap();

        let out = rig.taboot.console().output_str();
        assert!(out.contains("Flash Init OK\r\n"));
        assert!(out.contains("no address in eeprom\r\n"));
        assert!(out.contains("Taboot 1.0"));
        assert!(out.ends_with('>'));
        assert_eq!(rig.capture.load_pulses(), 0);
        assert!(rig.taboot.verbose());
    }

    #[test]
    fn terse_boot_prints_only_the_prompt() {
        let mut eeprom = plaid_eeprom();
        eeprom.preload(INIT_VERB, &[0x00]);
        let mut rig = SimRig::new(eeprom, plaid_flash());
        rig.taboot.boot().unwrap();

        assert_eq!(rig.taboot.console().output_str(), ">");
    }

    #[test]
    fn reset_flag_pulses_sysreset() {
        let mut eeprom = MockEeprom::new();
        eeprom.preload(INIT_RESET, &[0x01]);
        let mut rig = SimRig::new(eeprom, SimFlash::new());
        rig.taboot.boot().unwrap();

        assert_eq!(rig.reset.falling_edges(), 1);
        assert!(rig.reset.level());
        assert!(rig.taboot.console().output_str().contains("Reset done\r\n"));
    }

    #[test]
    fn missing_reset_flag_only_releases_sysreset() {
        let mut rig = SimRig::new(MockEeprom::new(), SimFlash::new());
        rig.taboot.boot().unwrap();

        assert_eq!(rig.reset.falling_edges(), 0);
        assert!(rig.reset.level());
    }

    #[test]
    fn dead_flash_is_reported_and_boot_continues() {
        let mut flash = SimFlash::new();
        flash.set_absent(true);
        let mut rig = SimRig::new(MockEeprom::new(), flash);
        rig.taboot.boot().unwrap();

        let out = rig.taboot.console().output_str();
        assert!(out.contains("Flash Init failed\r\n"));
        assert!(out.ends_with('>'));
    }

    #[test]
    fn boot_applies_initial_backlight_duty() {
        let mut eeprom = MockEeprom::new();
        eeprom.preload(INIT_PWM, &[0x30]);
        let mut rig = SimRig::new(eeprom, SimFlash::new());
        rig.taboot.boot().unwrap();

        assert_eq!(rig.taboot.board().backlight().duty(), Some(0x30));
    }

    #[test]
    fn boot_waits_for_power_up_and_flash_settle() {
        let delay = SimDelay::new();
        let mut rig = SimRig::with_delay(MockEeprom::new(), SimFlash::new(), delay.clone());
        rig.taboot.boot().unwrap();

        let min_ms = u64::from(POWER_UP_DELAY_MS + FLASH_SETTLE_MS);
        assert!(delay.elapsed_ms() >= min_ms);
    }

    #[test]
    fn poll_checks_button_when_idle() {
        let mut rig = SimRig::new(MockEeprom::new(), SimFlash::new());
        rig.button.set_level(false);
        rig.taboot.poll().unwrap();

        assert!(rig.taboot.board().backlight_on());
        assert_eq!(rig.taboot.board().backlight().duty(), Some(0x40));
    }

    #[test]
    fn poll_prompts_after_each_command() {
        let mut rig = SimRig::new(MockEeprom::new(), SimFlash::new());
        rig.taboot.console_mut().push_input(b"L");
        rig.taboot.poll().unwrap();

        assert_eq!(rig.taboot.console().output_str(), "L\r\n> ");
        assert!(rig.led.level());
    }

    #[test]
    fn poll_prompts_after_a_failed_command() {
        let mut flash = SimFlash::new();
        flash.set_stuck_busy(true);
        let mut rig = SimRig::new(MockEeprom::new(), flash);
        rig.taboot.console_mut().push_input(b"a00000100");

        assert_eq!(
            rig.taboot.poll(),
            Err(BootError::Flash(FlashError::Timeout))
        );
        assert_eq!(
            rig.taboot.console().output_str(),
            "Address: 0x00000100\r\n\r\n> "
        );
    }
}
