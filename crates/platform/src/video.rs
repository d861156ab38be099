//! Video memory window
//!
//! The TABX FPGA exposes its frame store on the AT91RM9200 external bus
//! (chip select 2, 16-bit data bus). The CPU sees it as a plain
//! memory-mapped window; this trait hides the volatile accesses so the
//! framebuffer logic can be tested against a `Vec`-backed mock.
//!
//! Offsets are bus byte offsets from the window base, *after* any pixel
//! address translation. 16-bit accesses must be made at even offsets.

/// Memory-mapped video RAM.
pub trait VideoMemory {
    /// Size of the window in bytes.
    fn len(&self) -> usize;

    /// `true` when the window is zero-sized.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 16-bit read at byte offset `offset`.
    fn read_u16(&self, offset: usize) -> u16;

    /// 16-bit write at byte offset `offset`.
    fn write_u16(&mut self, offset: usize, value: u16);

    /// 8-bit read at byte offset `offset`.
    fn read_u8(&self, offset: usize) -> u8;

    /// 8-bit write at byte offset `offset`.
    fn write_u8(&mut self, offset: usize, value: u8);
}
