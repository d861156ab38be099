//! Board configuration and constants
//!
//! This module defines central configuration values used across the
//! workspace. Banners, clocks and memory sizes should reference these
//! constants rather than hardcoding values.

/// The bootloader name, printed at the top of the help menu
pub const APP_NAME: &str = "Taboot";

/// Bootloader release shown in the help banner
pub const APP_RELEASE: &str = "1.0";

/// Crate version (synchronized with Cargo.toml)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The board name
pub const BOARD_NAME: &str = "TABX";

/// Help banner line (name + release)
pub const fn banner() -> &'static str {
    "Taboot 1.0"
}

// ── Bootloader MCU (PIC18F2520) ──────────────────────────────────────────────

/// Crystal frequency of the bootloader MCU.
pub const CRYSTAL_HZ: u32 = 20_000_000;

/// Console baud rate (8 data bits, no parity, 1 stop bit).
pub const CONSOLE_BAUD: u32 = 230_400;

// ── Serial flash (SST25V) ────────────────────────────────────────────────────

/// Serial flash capacity: 4 MiB.
pub const FLASH_CAPACITY: u32 = 4 * 1024 * 1024;

/// Size of a console flash block (`R`, `W`, `a` commands).
pub const FLASH_BLOCK_SIZE: usize = 256;

/// Spacing between bitstreams in the flash layout produced by `xtask pack`.
///
/// A Cyclone `.rbf` for the TABX FPGA is about 110 KB, so each image gets a
/// 128 KiB slot (`0x000000`, `0x020000`, ...).
pub const FLASH_SLOT_SIZE: u32 = 0x2_0000;
