//! Simple framebuffer for the TABX FPGA LCD controller
//!
//! The FPGA scans a fixed 1024×480 RGB565 frame out of its own video RAM,
//! which the AT91RM9200 reaches on external chip select 2. There are no
//! controller registers to program: the driver only describes the fixed mode,
//! validates mode requests against it, and moves pixels through the
//! row/column address translation the video DRAM wants.
//!
//! - [`screeninfo`] - variable/fixed screen information and mode checking
//! - [`sfb`] - the [`SimpleFb`] driver itself
//! - [`smc`] - static memory controller setup for the video window

pub mod screeninfo;
pub mod sfb;
pub mod smc;

pub use screeninfo::{check_var, line_length, Bitfield, FixScreenInfo, VarScreenInfo, Visual};
pub use sfb::{translate, BlankMode, SimpleFb, PALETTE_SIZE};
pub use smc::smc_csr_value;

/// Visible panel width in pixels.
pub const LCD_WIDTH: u32 = 1024;

/// Visible panel height in pixels.
pub const LCD_HEIGHT: u32 = 480;

/// Only supported colour depth.
pub const BITS_PER_PIXEL: u32 = 16;

/// Physical base of the video window (NCS2).
pub const VIDEO_MEM_START: u32 = 0x3000_0000;

/// Size of the video address space: 2 MiB.
pub const VIDEO_MEM_SIZE: u32 = 0x0020_0000;

/// Bytes per scan line of the fixed mode.
pub const LINE_LENGTH: u32 = LCD_WIDTH * 2;

/// Horizontal blanking, in pixels, after the visible area.
pub const RIGHT_MARGIN: u32 = 384;

/// Identifier reported in the fixed screen info.
pub const FB_ID: &str = "SimpleFB";

/// Errors returned by the framebuffer driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayError {
    /// Requested mode or blank level is not supported.
    InvalidArgument,
    /// Requested virtual resolution does not fit in video memory.
    OutOfMemory,
    /// Write starts past the end of video memory.
    NoSpace,
    /// Palette register number out of range.
    InvalidRegister,
    /// LCD enable line could not be driven.
    Gpio,
}

impl core::fmt::Display for DisplayError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "Unsupported video mode"),
            Self::OutOfMemory => write!(f, "Mode does not fit in video memory"),
            Self::NoSpace => write!(f, "Write past end of video memory"),
            Self::InvalidRegister => write!(f, "Palette register out of range"),
            Self::Gpio => write!(f, "GPIO error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DisplayError {}
