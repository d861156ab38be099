//! Desktop emulator of the Taboot bootloader
//!
//! Boots against a file-backed flash and EEPROM, then runs the command
//! console on stdin/stdout. Whatever the FPGA receives is captured and can
//! be written out for comparison with the source `.rbf`.
//!
//! ```bash
//! cargo run -p taboot --features emulator --bin taboot-emulator -- \
//!     --flash flash.bin --eeprom eeprom.bin --bitstream-out fpga.rbf
//! ```
//!
//! Log output goes to stderr and is filtered with `RUST_LOG`.

// Desktop tooling: unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use embedded_storage::nor_flash::NorFlash;
use platform::config::{FLASH_CAPACITY, FLASH_SLOT_SIZE};
use platform::eeprom::EEPROM_SIZE;
use platform::mocks::{MockBacklight, MockEeprom};
use platform::{ConsoleError, Eeprom, FlashAddress};
use taboot::eeprom::{record_pointer, FileRecord, INIT_RBF};
use taboot::flash::SECTOR_SIZE;
use taboot::sim::{FpgaCapture, SimDelay, SimFlash, SimPin};
use taboot::{Board, BootError, FpgaLoader, Sst25v, Taboot};
use tracing_subscriber::EnvFilter;

/// Idle wait for console input, so the main loop does not spin.
const INPUT_POLL: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(name = "taboot-emulator")]
#[command(about = "Run the TABX bootloader against file-backed flash and EEPROM", long_about = None)]
#[command(version)]
struct Args {
    /// Serial flash image (missing or short images are padded with 0xFF)
    #[arg(long)]
    flash: Option<PathBuf>,

    /// 256-byte EEPROM image (missing means erased)
    #[arg(long)]
    eeprom: Option<PathBuf>,

    /// Write the bytes clocked into the FPGA to this file on exit
    #[arg(long)]
    bitstream_out: Option<PathBuf>,

    /// Program this bitstream into a flash slot and make it the boot image
    #[arg(long)]
    install: Option<PathBuf>,

    /// Slot (0..15) used by --install
    #[arg(long, default_value_t = 0)]
    slot: u8,

    /// Write flash and EEPROM back to their files on exit
    #[arg(long)]
    save: bool,

    /// Exit after the boot sequence instead of running the console
    #[arg(long)]
    boot_only: bool,
}

// ---------------------------------------------------------------------------
// stdin/stdout console
// ---------------------------------------------------------------------------

/// Console on the process's stdin and stdout.
///
/// A reader thread feeds stdin into a channel so that `read_ready` can
/// answer without blocking.
struct StdConsole {
    rx: Receiver<u8>,
    pending: Option<u8>,
    closed: bool,
}

impl StdConsole {
    fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for byte in std::io::stdin().lock().bytes() {
                let Ok(byte) = byte else { break };
                if tx.send(byte).is_err() {
                    break;
                }
            }
        });
        Self {
            rx,
            pending: None,
            closed: false,
        }
    }
}

impl embedded_io::ErrorType for StdConsole {
    type Error = std::io::Error;
}

impl embedded_io::ReadReady for StdConsole {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.pending.is_some() || self.closed {
            return Ok(true);
        }
        match self.rx.recv_timeout(INPUT_POLL) {
            Ok(byte) => {
                self.pending = Some(byte);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                Ok(true)
            }
        }
    }
}

impl embedded_io::Read for StdConsole {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let Some(slot) = buf.first_mut() else {
            return Ok(0);
        };
        let byte = match self.pending.take() {
            Some(byte) => byte,
            None => match self.rx.recv() {
                Ok(byte) => byte,
                Err(_) => {
                    self.closed = true;
                    return Ok(0);
                }
            },
        };
        *slot = byte;
        // Drain whatever else is already queued.
        let mut n = 1;
        for slot in buf.iter_mut().skip(1) {
            match self.rx.try_recv() {
                Ok(byte) => {
                    *slot = byte;
                    n += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        Ok(n)
    }
}

impl embedded_io::Write for StdConsole {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::stdout().write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::stdout().flush()
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

fn load_flash(path: Option<&Path>) -> Result<SimFlash> {
    let Some(path) = path.filter(|p| p.exists()) else {
        return Ok(SimFlash::new());
    };
    let image = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if image.len() > FLASH_CAPACITY as usize {
        bail!(
            "{} is {} bytes, larger than the {} byte flash",
            path.display(),
            image.len(),
            FLASH_CAPACITY
        );
    }
    Ok(SimFlash::from_image(image))
}

fn load_eeprom(path: Option<&Path>) -> Result<MockEeprom> {
    let Some(path) = path.filter(|p| p.exists()) else {
        return Ok(MockEeprom::new());
    };
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let image: [u8; EEPROM_SIZE] = bytes
        .as_slice()
        .try_into()
        .with_context(|| format!("{} must be exactly {EEPROM_SIZE} bytes", path.display()))?;
    Ok(MockEeprom::from_image(image))
}

/// Program `rbf` into slot `slot` and point the boot record at it.
fn install(
    flash: SimFlash,
    eeprom: &mut MockEeprom,
    rbf: &Path,
    slot: u8,
) -> Result<SimFlash> {
    let data = std::fs::read(rbf).with_context(|| format!("reading {}", rbf.display()))?;
    let pointer = record_pointer(slot).with_context(|| format!("slot {slot} out of range"))?;
    let start = u32::from(slot) * FLASH_SLOT_SIZE;
    let length = u32::try_from(data.len())?;
    if length > FLASH_SLOT_SIZE {
        bail!("{} does not fit in a {FLASH_SLOT_SIZE} byte slot", rbf.display());
    }

    let mut chip = Sst25v::new(flash, SimDelay::new());
    chip.unlock().map_err(|e| anyhow::anyhow!("unlock: {e}"))?;
    let end = start + length.div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
    chip.erase(start, end.max(start))
        .map_err(|e| anyhow::anyhow!("erase: {e}"))?;
    chip.write(start, &data)
        .map_err(|e| anyhow::anyhow!("program: {e}"))?;
    chip.relock().map_err(|e| anyhow::anyhow!("relock: {e}"))?;

    let name = rbf
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let record = FileRecord::new(FlashAddress::new(start)?, length, name)?;
    record.write(eeprom, pointer).expect("mock EEPROM is infallible");
    eeprom
        .write_from(INIT_RBF, &[pointer])
        .expect("mock EEPROM is infallible");
    tracing::info!(slot, start, length, name, "Installed bitstream");

    Ok(chip.release().0)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut eeprom = load_eeprom(args.eeprom.as_deref())?;
    let mut flash = load_flash(args.flash.as_deref())?;
    if let Some(rbf) = &args.install {
        flash = install(flash, &mut eeprom, rbf, args.slot)?;
    }

    let delay = SimDelay::new();
    let capture = FpgaCapture::new();
    let fpga = FpgaLoader::new(capture.clk(), capture.data(), capture.load(), delay.clone());
    let board = Board::new(
        SimPin::new(false),
        SimPin::new(false),
        SimPin::new(true),
        SimPin::new(true),
        MockBacklight::new(),
        delay.clone(),
    );
    let mut taboot = Taboot::new(
        StdConsole::spawn(),
        eeprom,
        Sst25v::new(flash, delay.clone()),
        fpga,
        board,
    );

    taboot.boot()?;
    tracing::info!(
        bytes = capture.bitstream().len(),
        virtual_ms = delay.elapsed_ms(),
        "Boot complete"
    );

    if !args.boot_only {
        loop {
            match taboot.poll() {
                Ok(()) => {}
                Err(BootError::Console(ConsoleError::Closed)) => break,
                Err(e) => return Err(e.into()),
            }
        }
        println!();
    }

    if let Some(path) = &args.bitstream_out {
        std::fs::write(path, capture.bitstream())
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "Wrote captured bitstream");
    }

    if args.save {
        let (_, eeprom, flash, _, _) = taboot.release();
        if let Some(path) = &args.eeprom {
            std::fs::write(path, eeprom.image())?;
        }
        if let Some(path) = &args.flash {
            std::fs::write(path, flash.release().0.memory())?;
        }
    }

    Ok(())
}
