// Desktop/tooling crate: unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod check;
mod doc;
mod pack;
mod test;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "TABX board support development tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check no_std builds, the emulator, clippy and formatting
    Check,
    /// Run all tests (unit, integration, and doc)
    Test {
        /// Run only unit tests
        #[arg(long)]
        unit: bool,
        /// Run only integration tests
        #[arg(long)]
        integration: bool,
    },
    /// Build and optionally open documentation
    Doc {
        /// Open documentation in browser
        #[arg(long)]
        open: bool,
    },
    /// Build EEPROM and serial flash images from a directory of .rbf files
    Pack {
        /// Directory searched recursively for .rbf bitstreams
        #[arg(long)]
        bitstreams: PathBuf,
        /// Output directory for eeprom.bin and flash.bin
        #[arg(long, default_value = "target/images")]
        out: PathBuf,
        /// Slot loaded at power-up (default: 0)
        #[arg(long)]
        boot: Option<u8>,
        /// Verbose bootloader console
        #[arg(long)]
        verbose: bool,
        /// Pulse the board reset during boot
        #[arg(long)]
        reset: bool,
        /// Backlight PWM duty at the end of boot (default: off)
        #[arg(long)]
        backlight: Option<u8>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => check::run(),
        Commands::Test { unit, integration } => test::run(unit, integration),
        Commands::Doc { open } => doc::run(open),
        Commands::Pack {
            bitstreams,
            out,
            boot,
            verbose,
            reset,
            backlight,
        } => {
            let options = pack::PackOptions {
                boot_slot: boot,
                verbose,
                reset,
                backlight,
            };
            pack::run(&bitstreams, &out, &options)
        }
    }
}
