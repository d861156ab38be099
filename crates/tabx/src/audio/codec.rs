//! TABX_PCM codec DAI
//!
//! Playback only, one or two channels, 16-bit little-endian samples at the
//! standard rates from 8 kHz to 96 kHz.

use platform::SampleRateHz;

/// The standard rate set from 8 kHz to 96 kHz, Hz.
pub const PCM_RATES_8000_96000: &[u32] = &[
    8_000, 11_025, 16_000, 22_050, 32_000, 44_100, 48_000, 64_000, 88_200, 96_000,
];

/// Sample formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PcmFormat {
    /// Signed 16-bit, little endian.
    S16Le,
}

/// Capabilities of one stream direction of a DAI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PcmStreamCaps {
    /// Stream name.
    pub stream_name: &'static str,
    /// Fewest channels.
    pub channels_min: u8,
    /// Most channels.
    pub channels_max: u8,
    /// Lowest rate, Hz.
    pub rate_min: u32,
    /// Highest rate, Hz.
    pub rate_max: u32,
    /// Discrete rates inside `rate_min..=rate_max`, Hz.
    pub rates: &'static [u32],
    /// Accepted sample formats.
    pub formats: &'static [PcmFormat],
}

impl PcmStreamCaps {
    /// `true` when `channels` is within range and `rate` and `format` are
    /// listed.
    pub fn accepts(&self, channels: u8, rate: u32, format: PcmFormat) -> bool {
        (self.channels_min..=self.channels_max).contains(&channels)
            && (self.rate_min..=self.rate_max).contains(&rate)
            && self.rates.contains(&rate)
            && self.formats.contains(&format)
    }
}

/// Codec side of a digital audio interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DaiDriver {
    /// DAI name.
    pub name: &'static str,
    /// Playback capabilities, if any.
    pub playback: Option<PcmStreamCaps>,
    /// Capture capabilities, if any.
    pub capture: Option<PcmStreamCaps>,
}

/// The TABX PCM codec.
pub const TABX_PCM_DAI: DaiDriver = DaiDriver {
    name: "TABX_PCM",
    playback: Some(PcmStreamCaps {
        stream_name: "Playback",
        channels_min: 1,
        channels_max: 2,
        rate_min: SampleRateHz::MIN_HZ,
        rate_max: SampleRateHz::MAX_HZ,
        rates: PCM_RATES_8000_96000,
        formats: &[PcmFormat::S16Le],
    }),
    capture: None,
};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tabx_pcm_is_playback_only() {
        assert_eq!(TABX_PCM_DAI.name, "TABX_PCM");
        assert!(TABX_PCM_DAI.capture.is_none());
        assert_eq!(TABX_PCM_DAI.playback.map(|p| p.stream_name), Some("Playback"));
    }

    #[test]
    fn playback_caps_cover_8k_to_96k_s16() {
        let caps = TABX_PCM_DAI.playback.unwrap();
        assert!(caps.accepts(1, 8_000, PcmFormat::S16Le));
        assert!(caps.accepts(2, 96_000, PcmFormat::S16Le));
        assert!(!caps.accepts(3, 48_000, PcmFormat::S16Le));
        assert!(!caps.accepts(0, 48_000, PcmFormat::S16Le));
        assert!(!caps.accepts(2, 7_999, PcmFormat::S16Le));
        assert!(!caps.accepts(2, 192_000, PcmFormat::S16Le));
    }

    #[test]
    fn rates_between_standard_steps_are_refused() {
        let caps = TABX_PCM_DAI.playback.unwrap();
        assert!(caps.accepts(2, 44_100, PcmFormat::S16Le));
        assert!(!caps.accepts(2, 12_000, PcmFormat::S16Le));
        assert!(!caps.accepts(2, 44_000, PcmFormat::S16Le));
    }
}
