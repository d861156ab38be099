//! Taboot: FPGA configuration bootloader for the TABX board
//!
//! Runs on the PIC18F2520 board controller. At power-up it parks the board
//! outputs, reads its boot record from the data EEPROM, brings up the SST25V
//! serial flash and streams the selected bitstream into the FPGA over the
//! passive-serial lines. After that it serves a single-character RS-232
//! command console for EEPROM, flash, backlight and FPGA maintenance.
//!
//! # Architecture
//!
//! ```text
//! boot (power-on sequence, main loop) ── console (command dispatch)
//!         ↓
//! flash (SST25V over FlashBus) · fpga (FpgaPort) · eeprom (boot record)
//! board (LED, 5 V, SysReset, button, backlight)
//!         ↓
//! platform (Console, Eeprom, Backlight traits) + embedded-hal
//! ```
//!
//! # Features
//!
//! - `hardware` - Build for the board controller (defmt logging)
//! - `emulator` - Desktop emulator binary (tracing, clap)
//! - `std` - Simulated flash, FPGA and GPIO in [`sim`]

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![warn(clippy::dbg_macro)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

#[macro_use]
mod log;

pub mod board;
pub mod boot;
pub mod console;
pub mod eeprom;
pub mod flash;
pub mod fpga;

#[cfg(any(test, feature = "std"))]
pub mod sim;

pub use board::{Board, BoardControl, BoardError};
pub use boot::{BootError, Taboot};
pub use console::Command;
pub use eeprom::{BootRecord, FileRecord};
pub use flash::{BitBangBus, FlashBus, FlashError, HwSpiBus, Sst25v};
pub use fpga::{FpgaError, FpgaLoader, FpgaPort};
