//! Hardware Abstraction Layer (HAL) for the TABX board
//!
//! This crate provides the trait-based seams between the TABX drivers and
//! the silicon they run on, so that the bootloader and the board drivers can
//! be developed and tested without physical hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (taboot bootloader, tabx board drivers)
//!         ↓
//! Platform HAL (this crate - trait abstractions + newtypes)
//!         ↓
//! Hardware Layer (PIC18 registers, AT91RM9200 SSC / SMC / PIO)
//! ```
//!
//! # Abstractions
//!
//! ## Bootloader side (PIC18F2520)
//! - [`Console`] - RS-232 command channel (blanket impl over `embedded-io`)
//! - [`Eeprom`] - 256-byte data EEPROM holding the boot record
//! - [`Backlight`] - LCD backlight PWM (blanket impl over `SetDutyCycle`)
//!
//! ## Board side (AT91RM9200)
//! - [`VideoMemory`] - memory-mapped window onto the FPGA video RAM
//! - [`SerialAudioPort`] / [`SscProvider`] - synchronous serial controller
//!   used as the CPU side of the PCM link
//!
//! # Features
//!
//! - `std`: Enable the in-memory mocks (for testing and the emulator)
//! - `hardware`: Physical hardware implementations
//! - `defmt`: Enable defmt logging
//!
//! # Example
//!
//! ```
//! use platform::{Console, ConsoleError, Eeprom};
//!
//! fn dump<C: Console, E: Eeprom>(console: &mut C, eeprom: &mut E) -> Result<(), ConsoleError> {
//!     let verbosity = eeprom.read(0x02).unwrap_or(0);
//!     console.print(format_args!("verbosity 0x{verbosity:02x}\r\n"))
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors: callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

#[cfg(all(feature = "std", not(test)))]
extern crate std;

pub mod audio;
pub mod backlight;
pub mod config;
pub mod console;
pub mod eeprom;
pub mod types;
pub mod video;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

// Re-export main traits
pub use audio::{ClockDivider, DaiFormat, SerialAudioPort, SscProvider};
pub use backlight::Backlight;
pub use console::{Console, ConsoleError};
pub use eeprom::Eeprom;
pub use video::VideoMemory;

// Re-export newtypes
pub use types::{BrightnessPercent, FlashAddress, OutOfRangeError, SampleRateHz};
