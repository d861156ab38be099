//! TABX PCM sound card
//!
//! The FPGA audio path is a plain I2S receiver with no control interface:
//! it infers the sample rate from the bit clock, so all the configuration
//! happens on the CPU side. The card is split the usual way:
//!
//! - [`codec`] - what the TABX_PCM codec DAI can accept
//! - [`clock_math`] - SSC divider table for each supported rate
//! - [`machine`] - the DAI link, the card, and `hw_params`
//!
//! # Dependency Injection
//!
//! The machine driver targets [`platform::SscProvider`] and
//! [`platform::SerialAudioPort`]. Tests use `platform::mocks::MockSsc`:
//!
//! ```rust,ignore
//! let mut card = SoundCard::probe(MockSsc::new())?;
//! card.hw_params(StreamDirection::Playback, &HwParams::stereo_s16(44_100))?;
//! ```

pub mod clock_math;
pub mod codec;
pub mod machine;

pub use codec::{DaiDriver, PcmFormat, PcmStreamCaps, PCM_RATES_8000_96000, TABX_PCM_DAI};
pub use machine::{hw_params, DaiLink, HwParams, SoundCard, StreamDirection, CARD_NAME, TABX_DAI_LINK};

/// Errors returned by the sound card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AudioError {
    /// The serial controller could not be claimed.
    SscUnavailable,
    /// The serial port rejected a format or divider setting.
    Port,
    /// No divider entry for this sample rate (Hz).
    UnsupportedRate(u32),
}

impl core::fmt::Display for AudioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SscUnavailable => write!(f, "Failed to request SSC"),
            Self::Port => write!(f, "Serial audio port configuration failed"),
            Self::UnsupportedRate(hz) => write!(f, "Unsupported sample rate {hz} Hz"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AudioError {}
