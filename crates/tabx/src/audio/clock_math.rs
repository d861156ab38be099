//! SSC clock divider calculations for the TABX PCM link.
//!
//! The SSC runs as clock master (CBS_CFS): it derives the I2S bit clock from
//! the AT91RM9200 master clock and the frame (LR) clock from the bit clock.
//! The FPGA codec has no registers and locks onto whatever arrives.
//!
//! # Clock Tree
//!
//!   MCK (60 MHz) -> SSC_CMR.DIV (x2) -> BCLK
//!                -> SSC_TCMR.PERIOD / SSC_RCMR.PERIOD (x2) -> LRC
//!
//! # Formulas
//!
//!   BCLK = MCK / (2 x cmr_div)
//!   LRC  = BCLK / (2 x (period + 1))
//!
//! With `period = 15` every frame is 32 bit clocks (16 per channel), so
//! LRC = MCK / (64 x cmr_div). The integer divider always rounds the rate
//! *up*: the link runs between 0.04 % (11 025 Hz) and 8.5 % (96 000 Hz) fast.
//!
//! | Rate (Hz) | cmr_div | BCLK (Hz) | LRC (Hz) |
//! |---|---|---|---|
//! | 8 000 | 117 | 256 410 | 8 012 |
//! | 11 025 | 85 | 352 941 | 11 029 |
//! | 16 000 | 58 | 517 241 | 16 163 |
//! | 22 050 | 42 | 714 285 | 22 321 |
//! | 32 000 | 29 | 1 034 482 | 32 327 |
//! | 44 100 | 21 | 1 428 571 | 44 642 |
//! | 48 000 | 19 | 1 578 947 | 49 342 |
//! | 64 000 | 14 | 2 142 857 | 66 964 |
//! | 88 200 | 10 | 3 000 000 | 93 750 |
//! | 96 000 | 9 | 3 333 333 | 104 166 |
//!
//! References:
//! - AT91RM9200 datasheet, SSC chapter (CMR, TCMR, RCMR)

use platform::SampleRateHz;

/// AT91RM9200 master clock (Hz) feeding the SSC.
pub const MCLK_HZ: u32 = 60_000_000;

/// Frame period: 16 bit clocks per half frame.
pub const FRAME_PERIOD: u16 = 15;

/// Divider pair for one sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SscDividers {
    /// SSC_CMR clock divider.
    pub cmr_div: u16,
    /// SSC_TCMR / SSC_RCMR frame period.
    pub period: u16,
}

impl SscDividers {
    const fn new(cmr_div: u16) -> Self {
        Self {
            cmr_div,
            period: FRAME_PERIOD,
        }
    }

    /// Resulting bit clock.
    pub const fn bclk_hz(self) -> u32 {
        bclk_hz(self.cmr_div)
    }

    /// Resulting frame clock (the real sample rate).
    pub const fn lrc_hz(self) -> u32 {
        lrc_hz(self.bclk_hz(), self.period)
    }
}

/// Supported rates and their dividers, ascending by rate.
pub const DIVIDER_TABLE: [(u32, SscDividers); 10] = [
    (8_000, SscDividers::new(117)),
    (11_025, SscDividers::new(85)),
    (16_000, SscDividers::new(58)),
    (22_050, SscDividers::new(42)),
    (32_000, SscDividers::new(29)),
    (44_100, SscDividers::new(21)),
    (48_000, SscDividers::new(19)),
    (64_000, SscDividers::new(14)),
    (88_200, SscDividers::new(10)),
    (96_000, SscDividers::new(9)),
];

/// Dividers for `rate`, or `None` if the board does not support it.
pub fn dividers_for(rate: SampleRateHz) -> Option<SscDividers> {
    DIVIDER_TABLE
        .iter()
        .find(|(hz, _)| *hz == rate.get())
        .map(|(_, dividers)| *dividers)
}

/// BCLK = MCK / (2 x cmr_div). A zero divider stops the clock.
pub const fn bclk_hz(cmr_div: u16) -> u32 {
    match (cmr_div as u32).checked_mul(2) {
        Some(div) => match MCLK_HZ.checked_div(div) {
            Some(hz) => hz,
            None => 0,
        },
        None => 0,
    }
}

/// LRC = BCLK / (2 x (period + 1)).
pub const fn lrc_hz(bclk_hz: u32, period: u16) -> u32 {
    let bits_per_frame = (period as u32).saturating_add(1).saturating_mul(2);
    match bclk_hz.checked_div(bits_per_frame) {
        Some(hz) => hz,
        None => 0,
    }
}
