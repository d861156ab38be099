//! Screen information and mode validation
//!
//! [`VarScreenInfo`] is the negotiable part of a video mode (resolution,
//! colour layout, timing); [`FixScreenInfo`] is what the hardware dictates
//! (memory window, line length). [`check_var`] adjusts a requested mode to
//! the nearest one the panel can show, or rejects it.

use super::{
    DisplayError, BITS_PER_PIXEL, FB_ID, LCD_HEIGHT, LCD_WIDTH, LINE_LENGTH, RIGHT_MARGIN,
    VIDEO_MEM_SIZE, VIDEO_MEM_START,
};

/// Position of one colour channel inside a pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Bitfield {
    /// Bit offset of the channel.
    pub offset: u32,
    /// Channel width in bits.
    pub length: u32,
    /// `true` when the most significant bit is on the right.
    pub msb_right: bool,
}

impl Bitfield {
    /// Channel at `offset` spanning `length` bits, MSB on the left.
    pub const fn new(offset: u32, length: u32) -> Self {
        Self {
            offset,
            length,
            msb_right: false,
        }
    }
}

/// How pixel values map to colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Visual {
    /// Pixel values are colour components directly.
    TrueColor,
}

/// Variable screen information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VarScreenInfo {
    /// Visible width.
    pub xres: u32,
    /// Visible height.
    pub yres: u32,
    /// Virtual width.
    pub xres_virtual: u32,
    /// Virtual height.
    pub yres_virtual: u32,
    /// Visible area offset into the virtual area, x.
    pub xoffset: u32,
    /// Visible area offset into the virtual area, y.
    pub yoffset: u32,
    /// Colour depth.
    pub bits_per_pixel: u32,
    /// Non-zero for greyscale modes.
    pub grayscale: u32,
    /// Red channel.
    pub red: Bitfield,
    /// Green channel.
    pub green: Bitfield,
    /// Blue channel.
    pub blue: Bitfield,
    /// Alpha channel (unused on this panel).
    pub transp: Bitfield,
    /// Panel height.
    pub height: u32,
    /// Panel width.
    pub width: u32,
    /// Pixels before the visible area.
    pub left_margin: u32,
    /// Pixels after the visible area.
    pub right_margin: u32,
    /// Lines above the visible area.
    pub upper_margin: u32,
    /// Lines below the visible area.
    pub lower_margin: u32,
}

impl VarScreenInfo {
    /// The panel's one and only mode: 1024×480, RGB565.
    pub const FIXED_MODE: Self = Self {
        xres: LCD_WIDTH,
        yres: LCD_HEIGHT,
        xres_virtual: LCD_WIDTH,
        yres_virtual: LCD_HEIGHT,
        xoffset: 0,
        yoffset: 0,
        bits_per_pixel: BITS_PER_PIXEL,
        grayscale: 0,
        red: Bitfield::new(0, 5),
        green: Bitfield::new(5, 6),
        blue: Bitfield::new(11, 5),
        transp: Bitfield::new(0, 0),
        height: LCD_HEIGHT,
        width: LCD_WIDTH,
        left_margin: 0,
        right_margin: RIGHT_MARGIN,
        upper_margin: 0,
        lower_margin: 0,
    };
}

impl Default for VarScreenInfo {
    fn default() -> Self {
        Self::FIXED_MODE
    }
}

/// Fixed screen information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FixScreenInfo {
    /// Driver identification.
    pub id: &'static str,
    /// Physical start of frame buffer memory.
    pub smem_start: u32,
    /// Length of frame buffer memory.
    pub smem_len: u32,
    /// Physical start of memory-mapped I/O.
    pub mmio_start: u32,
    /// Length of memory-mapped I/O.
    pub mmio_len: u32,
    /// Bytes per line.
    pub line_length: u32,
    /// Pixel interpretation.
    pub visual: Visual,
    /// Horizontal panning step (0: no panning).
    pub xpanstep: u16,
    /// Vertical panning step (0: no panning).
    pub ypanstep: u16,
    /// Vertical wrap step (0: no wrapping).
    pub ywrapstep: u16,
}

impl FixScreenInfo {
    /// Description of the NCS2 video window.
    pub const VIDEO_WINDOW: Self = Self {
        id: FB_ID,
        smem_start: VIDEO_MEM_START,
        smem_len: VIDEO_MEM_SIZE,
        mmio_start: VIDEO_MEM_START,
        mmio_len: VIDEO_MEM_SIZE,
        line_length: LINE_LENGTH,
        visual: Visual::TrueColor,
        xpanstep: 0,
        ypanstep: 0,
        ywrapstep: 0,
    };
}

impl Default for FixScreenInfo {
    fn default() -> Self {
        Self::VIDEO_WINDOW
    }
}

/// Bytes per line for `xres_virtual` pixels of `bpp` bits, padded to 32 bits.
///
/// Saturates instead of wrapping, so absurd requests fail the memory check.
pub fn line_length(xres_virtual: u32, bpp: u32) -> u64 {
    let bits = u64::from(xres_virtual).saturating_mul(u64::from(bpp));
    (bits.saturating_add(31) & !31) / 8
}

/// Validate `var` against a video memory of `smem_len` bytes.
///
/// Zero resolutions take the panel defaults, and the virtual area grows to
/// cover the visible area plus its offset. On success the colour layout and
/// panel size fields are rewritten to the hardware's.
pub fn check_var(var: &mut VarScreenInfo, smem_len: u32) -> Result<(), DisplayError> {
    if var.xres == 0 {
        var.xres = LCD_WIDTH;
    }
    if var.yres == 0 {
        var.yres = LCD_HEIGHT;
    }

    var.xres_virtual = var.xres_virtual.max(var.xres);
    var.yres_virtual = var.yres_virtual.max(var.yres);

    if var.bits_per_pixel != BITS_PER_PIXEL {
        return Err(DisplayError::InvalidArgument);
    }

    var.xres_virtual = var.xres_virtual.max(var.xoffset.saturating_add(var.xres));
    var.yres_virtual = var.yres_virtual.max(var.yoffset.saturating_add(var.yres));

    let needed = line_length(var.xres_virtual, var.bits_per_pixel)
        .saturating_mul(u64::from(var.yres_virtual));
    if needed > u64::from(smem_len) {
        return Err(DisplayError::OutOfMemory);
    }

    fixup_colors(var);
    Ok(())
}

/// Force RGB565 with no transparency and the panel's physical size.
fn fixup_colors(var: &mut VarScreenInfo) {
    var.red = Bitfield::new(0, 5);
    var.green = Bitfield::new(5, 6);
    var.blue = Bitfield::new(11, 5);
    var.transp = Bitfield::new(0, 0);
    var.grayscale = 0;
    var.height = LCD_HEIGHT;
    var.width = LCD_WIDTH;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn fixed_mode_passes_unchanged() {
        let mut var = VarScreenInfo::FIXED_MODE;
        check_var(&mut var, VIDEO_MEM_SIZE).unwrap();
        assert_eq!(var, VarScreenInfo::FIXED_MODE);
    }

    #[test]
    fn zero_resolution_takes_panel_defaults() {
        let mut var = VarScreenInfo {
            xres: 0,
            yres: 0,
            xres_virtual: 0,
            yres_virtual: 0,
            ..VarScreenInfo::FIXED_MODE
        };
        check_var(&mut var, VIDEO_MEM_SIZE).unwrap();
        assert_eq!((var.xres, var.yres), (1024, 480));
        assert_eq!((var.xres_virtual, var.yres_virtual), (1024, 480));
    }

    #[test]
    fn virtual_area_covers_offset_view() {
        let mut var = VarScreenInfo {
            yoffset: 480,
            ..VarScreenInfo::FIXED_MODE
        };
        check_var(&mut var, VIDEO_MEM_SIZE).unwrap();
        assert_eq!(var.yres_virtual, 960);
        assert_eq!(var.xres_virtual, 1024);
    }

    #[test]
    fn only_16_bpp_is_accepted() {
        for bpp in [1, 8, 24, 32] {
            let mut var = VarScreenInfo {
                bits_per_pixel: bpp,
                ..VarScreenInfo::FIXED_MODE
            };
            assert_eq!(check_var(&mut var, VIDEO_MEM_SIZE), Err(DisplayError::InvalidArgument));
        }
    }

    #[test]
    fn mode_larger_than_video_memory_is_rejected() {
        // 2048 bytes per line: 1024 lines fill 2 MiB exactly, 1025 do not.
        let mut fits = VarScreenInfo {
            yres_virtual: 1024,
            ..VarScreenInfo::FIXED_MODE
        };
        assert!(check_var(&mut fits, VIDEO_MEM_SIZE).is_ok());

        let mut too_tall = VarScreenInfo {
            yres_virtual: 1025,
            ..VarScreenInfo::FIXED_MODE
        };
        assert_eq!(check_var(&mut too_tall, VIDEO_MEM_SIZE), Err(DisplayError::OutOfMemory));
    }

    #[test]
    fn colour_layout_is_forced_to_rgb565() {
        let mut var = VarScreenInfo {
            red: Bitfield { offset: 16, length: 8, msb_right: true },
            transp: Bitfield::new(24, 8),
            grayscale: 1,
            height: 0,
            ..VarScreenInfo::FIXED_MODE
        };
        check_var(&mut var, VIDEO_MEM_SIZE).unwrap();
        assert_eq!(var.red, Bitfield::new(0, 5));
        assert_eq!(var.transp, Bitfield::new(0, 0));
        assert_eq!(var.grayscale, 0);
        assert_eq!(var.height, LCD_HEIGHT);
    }

    #[test]
    fn line_length_pads_to_32_bits() {
        assert_eq!(line_length(1024, 16), 2048);
        assert_eq!(line_length(1, 16), 4);
        assert_eq!(line_length(3, 8), 4);
        assert_eq!(line_length(0, 16), 0);
    }

    #[test]
    fn line_length_saturates_instead_of_wrapping() {
        assert!(line_length(u32::MAX, u32::MAX) > u64::from(VIDEO_MEM_SIZE));
    }
}
