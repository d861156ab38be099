//! Simple framebuffer driver
//!
//! # Address translation
//!
//! The video DRAM is organised in rows of 1280 bytes. Linear framebuffer
//! offsets are split into a row number (bits 11..19 of the bus address) and
//! a column (bits 0..10), so that sequential accesses stay inside one DRAM
//! row:
//!
//! ```text
//! bus = ((offset / 1280) & 0x1FF) << 11 | (offset % 1280) & 0x7FF
//! ```
//!
//! Every access made by [`SimpleFb::read`], [`SimpleFb::write`] and the
//! [`DrawTarget`] implementation goes through [`translate`].

use embedded_graphics::pixelcolor::raw::RawU16;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_hal::digital::OutputPin;
use platform::VideoMemory;

use super::screeninfo::{check_var, line_length, FixScreenInfo, VarScreenInfo};
use super::{DisplayError, VIDEO_MEM_SIZE};

/// Number of pseudo-palette entries (console colours).
pub const PALETTE_SIZE: usize = 16;

/// Bytes per video DRAM row.
const DRAM_ROW_BYTES: usize = 1280;

/// Row number mask (9 bits).
const DRAM_ROW_MASK: usize = 0x1FF;

/// Column mask (11 bits).
const DRAM_COLUMN_MASK: usize = 0x7FF;

/// Bus address bit of the row number.
const DRAM_ROW_SHIFT: u32 = 11;

/// Map a linear framebuffer offset to its video DRAM bus offset.
// Divisor is a non-zero constant and row <= 0x1FF, so the result fits in 20 bits.
#[allow(clippy::arithmetic_side_effects)]
pub fn translate(offset: usize) -> usize {
    let row = (offset / DRAM_ROW_BYTES) & DRAM_ROW_MASK;
    let column = (offset % DRAM_ROW_BYTES) & DRAM_COLUMN_MASK;
    (row << DRAM_ROW_SHIFT) | column
}

/// Display blanking levels, in fbdev order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlankMode {
    /// Display on.
    Unblank,
    /// Display on, console blanks in software.
    Normal,
    /// Vertical sync suspended.
    VsyncSuspend,
    /// Horizontal sync suspended.
    HsyncSuspend,
    /// Display off.
    Powerdown,
}

impl TryFrom<i32> for BlankMode {
    type Error = DisplayError;

    fn try_from(level: i32) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::Unblank),
            1 => Ok(Self::Normal),
            2 => Ok(Self::VsyncSuspend),
            3 => Ok(Self::HsyncSuspend),
            4 => Ok(Self::Powerdown),
            _ => Err(DisplayError::InvalidArgument),
        }
    }
}

/// Framebuffer over the FPGA video window.
///
/// `EN` drives the LCD controller enable line (PB11 on the board).
pub struct SimpleFb<M, EN> {
    memory: M,
    enable: EN,
    var: VarScreenInfo,
    fix: FixScreenInfo,
    pseudo_palette: [u32; PALETTE_SIZE],
}

impl<M, EN> SimpleFb<M, EN>
where
    M: VideoMemory,
    EN: OutputPin,
{
    /// Wrap the video window in the fixed 1024×480 RGB565 mode.
    ///
    /// `smem_len` is the smaller of the window and the 2 MiB address space.
    /// The SMC must already be set up with
    /// [`smc_csr_value`](super::smc_csr_value).
    pub fn new(memory: M, enable: EN) -> Self {
        let window = u32::try_from(memory.len()).unwrap_or(u32::MAX);
        let fix = FixScreenInfo {
            smem_len: window.min(VIDEO_MEM_SIZE),
            mmio_len: window.min(VIDEO_MEM_SIZE),
            ..FixScreenInfo::VIDEO_WINDOW
        };
        let var = VarScreenInfo::FIXED_MODE;
        info!(
            "SimpleFB: {}x{} {} bpp, {} bytes",
            var.xres,
            var.yres,
            var.bits_per_pixel,
            fix.smem_len
        );
        Self {
            memory,
            enable,
            var,
            fix,
            pseudo_palette: [0; PALETTE_SIZE],
        }
    }

    /// Hand back the video window and enable line.
    pub fn release(self) -> (M, EN) {
        (self.memory, self.enable)
    }

    /// Current variable screen information.
    pub fn var(&self) -> &VarScreenInfo {
        &self.var
    }

    /// Fixed screen information.
    pub fn fix(&self) -> &FixScreenInfo {
        &self.fix
    }

    /// Video window.
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Console colours in pixel format.
    pub fn pseudo_palette(&self) -> &[u32; PALETTE_SIZE] {
        &self.pseudo_palette
    }

    /// Validate `var` against this framebuffer's memory. Does not touch hardware.
    pub fn check_var(&self, var: &mut VarScreenInfo) -> Result<(), DisplayError> {
        check_var(var, self.fix.smem_len)
    }

    /// Apply the current `var`: recompute the line length.
    pub fn set_par(&mut self) {
        let length = line_length(self.var.xres_virtual, self.var.bits_per_pixel);
        self.fix.line_length = u32::try_from(length).unwrap_or(u32::MAX);
    }

    /// Check `var`, make it current and apply it. Returns the adjusted mode.
    pub fn set_var(&mut self, mut var: VarScreenInfo) -> Result<VarScreenInfo, DisplayError> {
        self.check_var(&mut var)?;
        self.var = var;
        self.set_par();
        debug!(
            "SimpleFB: virtual {}x{}, line {} bytes",
            var.xres_virtual,
            var.yres_virtual,
            self.fix.line_length
        );
        Ok(var)
    }

    fn smem_len(&self) -> usize {
        usize::try_from(self.fix.smem_len).unwrap_or(usize::MAX)
    }

    /// Copy video memory starting at linear offset `pos` into `buf`.
    ///
    /// Returns the number of bytes read: 0 at or past the end of memory,
    /// fewer than `buf.len()` when the read is clipped.
    pub fn read(&self, pos: usize, buf: &mut [u8]) -> usize {
        let len = self.smem_len();
        if pos >= len {
            return 0;
        }
        let count = buf.len().min(len.saturating_sub(pos));
        let Some(buf) = buf.get_mut(..count) else {
            return 0;
        };

        let mut offset = pos;
        let mut pairs = buf.chunks_exact_mut(2);
        for pair in &mut pairs {
            pair.copy_from_slice(&self.memory.read_u16(translate(offset)).to_le_bytes());
            offset = offset.wrapping_add(2);
        }
        if let [last] = pairs.into_remainder() {
            *last = self.memory.read_u8(translate(offset));
        }
        count
    }

    /// Copy `buf` into video memory starting at linear offset `pos`.
    ///
    /// Returns the number of bytes written, which is short when the write
    /// runs off the end of memory. A write that starts past the end, or at
    /// the end with data left to write, fails with [`DisplayError::NoSpace`].
    pub fn write(&mut self, pos: usize, buf: &[u8]) -> Result<usize, DisplayError> {
        let len = self.smem_len();
        if pos > len {
            return Err(DisplayError::NoSpace);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let count = buf.len().min(len.saturating_sub(pos));
        let Some(buf) = buf.get(..count).filter(|b| !b.is_empty()) else {
            return Err(DisplayError::NoSpace);
        };

        let mut offset = pos;
        let mut pairs = buf.chunks_exact(2);
        for pair in &mut pairs {
            if let [lo, hi] = *pair {
                self.memory.write_u16(translate(offset), u16::from_le_bytes([lo, hi]));
            }
            offset = offset.wrapping_add(2);
        }
        if let [last] = *pairs.remainder() {
            self.memory.write_u8(translate(offset), last);
        }
        Ok(count)
    }

    /// Set console colour `regno` from 16-bit colour components.
    ///
    /// Only the top bits of each component are kept, packed as RGB565.
    pub fn set_color_register(
        &mut self,
        regno: u32,
        red: u16,
        green: u16,
        blue: u16,
    ) -> Result<(), DisplayError> {
        let slot = usize::try_from(regno)
            .ok()
            .and_then(|i| self.pseudo_palette.get_mut(i))
            .ok_or(DisplayError::InvalidRegister)?;
        let red = u32::from(red) & 0xF800;
        let green = (u32::from(green) & 0xFC00).wrapping_shr(5);
        let blue = (u32::from(blue) & 0xF800).wrapping_shr(11);
        *slot = red | green | blue;
        Ok(())
    }

    /// Blank or unblank the panel through the LCD enable line.
    ///
    /// Returns `true` when the console should blank in software, which is
    /// the case for [`BlankMode::Normal`] only.
    pub fn blank(&mut self, mode: BlankMode) -> Result<bool, DisplayError> {
        match mode {
            BlankMode::Unblank | BlankMode::Normal => self.enable.set_high(),
            BlankMode::VsyncSuspend | BlankMode::HsyncSuspend | BlankMode::Powerdown => {
                self.enable.set_low()
            }
        }
        .map_err(|_| DisplayError::Gpio)?;
        debug!("SimpleFB: blank level {}", mode as u8);
        Ok(mode == BlankMode::Normal)
    }

    /// Linear offset of a visible pixel, or `None` when it is off screen.
    fn pixel_offset(&self, point: Point) -> Option<usize> {
        let x = u32::try_from(point.x).ok().filter(|x| *x < self.var.xres)?;
        let y = u32::try_from(point.y).ok().filter(|y| *y < self.var.yres)?;
        let x = u64::from(x.checked_add(self.var.xoffset)?);
        let y = u64::from(y.checked_add(self.var.yoffset)?);
        let offset = y
            .checked_mul(u64::from(self.fix.line_length))?
            .checked_add(x.checked_mul(2)?)?;
        let offset = usize::try_from(offset).ok()?;
        (offset.checked_add(2)? <= self.smem_len()).then_some(offset)
    }

    /// Colour of the pixel at `point`, or `None` when it is off screen.
    pub fn pixel(&self, point: Point) -> Option<Rgb565> {
        let offset = self.pixel_offset(point)?;
        Some(RawU16::new(self.memory.read_u16(translate(offset))).into())
    }
}

// ---------------------------------------------------------------------------
// DrawTarget: generic drawing through the translated addressing
// ---------------------------------------------------------------------------

impl<M, EN> DrawTarget for SimpleFb<M, EN>
where
    M: VideoMemory,
    EN: OutputPin,
{
    type Color = Rgb565;
    type Error = DisplayError;

    /// Write pixels straight into video memory. Off-screen pixels are dropped.
    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let Some(offset) = self.pixel_offset(point) else {
                continue;
            };
            self.memory
                .write_u16(translate(offset), color.into_storage());
        }
        Ok(())
    }
}

impl<M, EN> OriginDimensions for SimpleFb<M, EN>
where
    M: VideoMemory,
    EN: OutputPin,
{
    fn size(&self) -> Size {
        Size::new(self.var.xres, self.var.yres)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use platform::mocks::MockVideoMemory;

    const WINDOW: usize = VIDEO_MEM_SIZE as usize;

    fn fb() -> SimpleFb<MockVideoMemory, PinMock> {
        SimpleFb::new(MockVideoMemory::new(WINDOW), PinMock::new(&[]))
    }

    fn done(fb: SimpleFb<MockVideoMemory, PinMock>) -> MockVideoMemory {
        let (memory, mut enable) = fb.release();
        enable.done();
        memory
    }

    #[test]
    fn translate_splits_rows_of_1280() {
        assert_eq!(translate(0), 0);
        assert_eq!(translate(1279), 1279);
        assert_eq!(translate(1280), 0x800);
        assert_eq!(translate(1280 * 3 + 10), (3 << 11) | 10);
    }

    #[test]
    fn translate_wraps_row_number_at_9_bits() {
        assert_eq!(translate(1280 * 512), 0);
        assert_eq!(translate(1280 * 513 + 1), 0x801);
    }

    #[test]
    fn new_reports_fixed_mode() {
        let fb = fb();
        assert_eq!(fb.fix().id, "SimpleFB");
        assert_eq!(fb.fix().line_length, 2048);
        assert_eq!(fb.fix().smem_len, 0x20_0000);
        assert_eq!(fb.size(), Size::new(1024, 480));
        done(fb);
    }

    #[test]
    fn small_window_limits_smem_len() {
        let fb = SimpleFb::new(MockVideoMemory::new(4096), PinMock::new(&[]));
        assert_eq!(fb.fix().smem_len, 4096);
        done(fb);
    }

    #[test]
    fn write_then_read_through_translation() {
        let mut fb = fb();
        assert_eq!(fb.write(1278, &[1, 2, 3, 4, 5]), Ok(5));

        let mut back = [0u8; 5];
        assert_eq!(fb.read(1278, &mut back), 5);
        assert_eq!(back, [1, 2, 3, 4, 5]);

        let memory = done(fb);
        // 1278..1280 stay in row 0; 1280.. lands in row 1 at 0x800.
        assert_eq!(&memory.bytes()[1278..1280], &[1, 2]);
        assert_eq!(&memory.bytes()[0x800..0x803], &[3, 4, 5]);
        assert_eq!(memory.halfword_writes(), 2);
        assert_eq!(memory.byte_writes(), 1);
    }

    #[test]
    fn read_past_end_returns_nothing() {
        let fb = fb();
        let mut buf = [0u8; 4];
        assert_eq!(fb.read(WINDOW, &mut buf), 0);
        assert_eq!(fb.read(WINDOW + 100, &mut buf), 0);
        done(fb);
    }

    #[test]
    fn read_is_clipped_at_end() {
        let fb = fb();
        let mut buf = [0u8; 8];
        assert_eq!(fb.read(WINDOW - 3, &mut buf), 3);
        done(fb);
    }

    #[test]
    fn write_past_end_is_no_space() {
        let mut fb = fb();
        assert_eq!(fb.write(WINDOW + 1, &[0]), Err(DisplayError::NoSpace));
        assert_eq!(fb.write(WINDOW, &[0]), Err(DisplayError::NoSpace));
        assert_eq!(fb.write(WINDOW, &[]), Ok(0));
        done(fb);
    }

    #[test]
    fn partial_write_at_end_returns_written_count() {
        let mut fb = fb();
        assert_eq!(fb.write(WINDOW - 2, &[9, 9, 9, 9]), Ok(2));
        done(fb);
    }

    #[test]
    fn color_register_packs_rgb565() {
        let mut fb = fb();
        fb.set_color_register(0, 0xFFFF, 0x0000, 0x0000).unwrap();
        fb.set_color_register(1, 0x0000, 0xFFFF, 0x0000).unwrap();
        fb.set_color_register(2, 0x0000, 0x0000, 0xFFFF).unwrap();
        fb.set_color_register(15, 0x8421, 0x8421, 0x8421).unwrap();
        assert_eq!(fb.pseudo_palette()[0], 0xF800);
        assert_eq!(fb.pseudo_palette()[1], 0x07E0);
        assert_eq!(fb.pseudo_palette()[2], 0x001F);
        assert_eq!(fb.pseudo_palette()[15], 0x8000 | 0x0420 | 0x0010);
        done(fb);
    }

    #[test]
    fn color_register_16_is_rejected() {
        let mut fb = fb();
        assert_eq!(
            fb.set_color_register(16, 0, 0, 0),
            Err(DisplayError::InvalidRegister)
        );
        done(fb);
    }

    #[test]
    fn blank_drives_enable_line() {
        let expectations = [
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::Low),
        ];
        let mut fb = SimpleFb::new(MockVideoMemory::new(64), PinMock::new(&expectations));
        assert_eq!(fb.blank(BlankMode::Unblank), Ok(false));
        assert_eq!(fb.blank(BlankMode::Normal), Ok(true));
        assert_eq!(fb.blank(BlankMode::VsyncSuspend), Ok(false));
        assert_eq!(fb.blank(BlankMode::HsyncSuspend), Ok(false));
        assert_eq!(fb.blank(BlankMode::Powerdown), Ok(false));
        done(fb);
    }

    #[test]
    fn unknown_blank_level_is_invalid() {
        assert_eq!(BlankMode::try_from(5), Err(DisplayError::InvalidArgument));
        assert_eq!(BlankMode::try_from(-1), Err(DisplayError::InvalidArgument));
        assert_eq!(BlankMode::try_from(4), Ok(BlankMode::Powerdown));
    }

    #[test]
    fn set_var_recomputes_line_length() {
        let mut fb = fb();
        let var = VarScreenInfo {
            xres: 640,
            xres_virtual: 640,
            ..VarScreenInfo::FIXED_MODE
        };
        let applied = fb.set_var(var).unwrap();
        assert_eq!(applied.xres, 640);
        assert_eq!(fb.fix().line_length, 1280);
        done(fb);
    }

    #[test]
    fn rejected_mode_leaves_state_alone() {
        let mut fb = fb();
        let var = VarScreenInfo {
            bits_per_pixel: 8,
            ..VarScreenInfo::FIXED_MODE
        };
        assert_eq!(fb.set_var(var), Err(DisplayError::InvalidArgument));
        assert_eq!(*fb.var(), VarScreenInfo::FIXED_MODE);
        done(fb);
    }

    #[test]
    fn draw_pixel_lands_at_translated_address() {
        let mut fb = fb();
        Pixel(Point::new(3, 1), Rgb565::RED).draw(&mut fb).unwrap();
        assert_eq!(fb.pixel(Point::new(3, 1)), Some(Rgb565::RED));

        let memory = done(fb);
        // Line 1 starts at 2048; pixel 3 adds 6 bytes -> row 1, column 774.
        let bus = (1 << 11) | 774;
        assert_eq!(
            u16::from_le_bytes([memory.bytes()[bus], memory.bytes()[bus + 1]]),
            0xF800
        );
    }

    #[test]
    fn off_screen_pixels_are_dropped() {
        let mut fb = fb();
        Pixel(Point::new(-1, 0), Rgb565::WHITE).draw(&mut fb).unwrap();
        Pixel(Point::new(1024, 0), Rgb565::WHITE).draw(&mut fb).unwrap();
        Pixel(Point::new(0, 480), Rgb565::WHITE).draw(&mut fb).unwrap();
        assert_eq!(fb.pixel(Point::new(1024, 0)), None);

        let memory = done(fb);
        assert_eq!(memory.halfword_writes(), 0);
    }

    #[test]
    fn filled_rectangle_reads_back() {
        let mut fb = fb();
        Rectangle::new(Point::new(10, 20), Size::new(4, 3))
            .into_styled(PrimitiveStyle::with_fill(Rgb565::BLUE))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.pixel(Point::new(10, 20)), Some(Rgb565::BLUE));
        assert_eq!(fb.pixel(Point::new(13, 22)), Some(Rgb565::BLUE));
        assert_eq!(fb.pixel(Point::new(14, 22)), Some(Rgb565::BLACK));

        let memory = done(fb);
        assert_eq!(memory.halfword_writes(), 12);
    }
}
