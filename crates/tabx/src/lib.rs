//! TABX board drivers
//!
//! Driver logic for the AT91RM9200 side of the TABX board: the simple
//! framebuffer in front of the FPGA LCD controller, and the PCM sound card
//! that runs the FPGA audio path off one of the SoC's synchronous serial
//! controllers.
//!
//! # Architecture
//!
//! ```text
//! display (SimpleFb: screen info, translated read/write, DrawTarget)
//! audio   (TABX_PCM codec DAI, DAI link, SSC clock dividers, SoundCard)
//!         ↓
//! platform (VideoMemory, SerialAudioPort, SscProvider) + embedded-hal
//! ```
//!
//! # Features
//!
//! - `hardware` - Build for the board (defmt logging)
//! - `std` - `std::error::Error` impls and platform mocks
//! - `tracing` - Log through `tracing` on the host

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
#![allow(clippy::cast_lossless)]

#[macro_use]
mod log;

pub mod audio;
pub mod display;

pub use audio::{AudioError, HwParams, SoundCard, StreamDirection, TABX_PCM_DAI};
pub use display::{BlankMode, DisplayError, FixScreenInfo, SimpleFb, VarScreenInfo};
