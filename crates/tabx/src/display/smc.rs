//! Static Memory Controller setup for the video window
//!
//! The FPGA video RAM hangs off AT91RM9200 chip select 2. Before the window
//! at [`VIDEO_MEM_START`](super::VIDEO_MEM_START) can be touched, `SMC_CSR2`
//! must be programmed for the FPGA's bus timing.
//!
//! | Field | Bits | Value |
//! |---|---|---|
//! | NWS | 0..6 | 7 wait states |
//! | WSEN | 7 | wait states enabled |
//! | DBW | 13..14 | 2 (16-bit bus) |
//! | ACSS | 16..17 | 2 cycles address to chip select |
//!
//! TDF, BAT, DRP, RWSETUP and RWHOLD are left at zero.

/// External Bus Interface user interface base address.
pub const EBI_BASE: u32 = 0xFFFF_FF60;

/// Offset of `SMC_CSR2` from [`EBI_BASE`].
pub const SMC_CSR2_OFFSET: u32 = 0x18;

/// Absolute address of `SMC_CSR2`.
pub const SMC_CSR2_ADDR: u32 = EBI_BASE + SMC_CSR2_OFFSET;

/// Number of wait states.
pub const SMC_NWS: u32 = 0x0000_0007;
/// Wait state enable.
pub const SMC_WSEN: u32 = 0x0000_0080;
/// Data float time.
pub const SMC_TDF: u32 = 0x0000_0000;
/// Byte access type.
pub const SMC_BAT: u32 = 0x0000_0000;
/// Data bus width: 16 bits.
pub const SMC_DBW: u32 = 0x0000_4000;
/// Data read protocol.
pub const SMC_DRP: u32 = 0x0000_0000;
/// Address to chip select setup.
pub const SMC_ACSS: u32 = 0x0002_0000;
/// Read and write signal setup time.
pub const SMC_RWSETUP: u32 = 0x0000_0000;
/// Read and write signal hold time.
pub const SMC_RWHOLD: u32 = 0x0000_0000;

/// Value written to `SMC_CSR2` before the framebuffer is registered.
pub const fn smc_csr_value() -> u32 {
    SMC_RWHOLD
        | SMC_RWSETUP
        | SMC_ACSS
        | SMC_DRP
        | SMC_DBW
        | SMC_BAT
        | SMC_TDF
        | SMC_WSEN
        | SMC_NWS
}

/// PIO controller B base address; the LCD enable line is PB11.
pub const PIOB_BASE: u32 = 0xFFFF_F600;

/// PIOB bit mask of the LCD enable line.
pub const LCD_ENABLE_MASK: u32 = 1 << 11;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csr2_value_matches_bus_timing() {
        assert_eq!(smc_csr_value(), 0x0002_4087);
    }

    #[test]
    fn csr2_address() {
        assert_eq!(SMC_CSR2_ADDR, 0xFFFF_FF78);
    }

    #[test]
    fn wait_states_fit_their_field() {
        assert_eq!(SMC_NWS & !0x7F, 0);
    }
}
