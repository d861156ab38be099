//! AT91RM9200 machine driver for the TABX PCM codec
//!
//! Binds the codec DAI to SSC 1 and programs the SSC for each stream.

use platform::{ClockDivider, DaiFormat, SampleRateHz, SerialAudioPort, SscProvider};

use super::clock_math::{dividers_for, SscDividers};
use super::codec::{DaiDriver, PcmFormat, TABX_PCM_DAI};
use super::AudioError;

/// Sound card name.
pub const CARD_NAME: &str = "TABX-PCM";

/// Stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamDirection {
    /// Host to codec.
    Playback,
    /// Codec to host.
    Capture,
}

/// Parameters negotiated for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HwParams {
    /// Sample rate, Hz.
    pub rate: u32,
    /// Channel count.
    pub channels: u8,
    /// Sample format.
    pub format: PcmFormat,
}

impl HwParams {
    /// Two channels of S16_LE at `rate`.
    pub const fn stereo_s16(rate: u32) -> Self {
        Self {
            rate,
            channels: 2,
            format: PcmFormat::S16Le,
        }
    }
}

/// Connection between a CPU serial port and a codec DAI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DaiLink {
    /// Link name.
    pub name: &'static str,
    /// PCM stream name.
    pub stream_name: &'static str,
    /// SSC controller used as the CPU DAI.
    pub cpu_dai: u8,
    /// Codec end of the link.
    pub codec_dai: &'static DaiDriver,
}

/// The card's only link: TABX_PCM on SSC 1.
pub const TABX_DAI_LINK: DaiLink = DaiLink {
    name: "TABX_PCM",
    stream_name: "TABX_PCM PCM",
    cpu_dai: 1,
    codec_dai: &TABX_PCM_DAI,
};

/// Configure the CPU port for a stream.
///
/// Sets I2S with normal clock polarities and the SSC as clock master, then
/// the bit clock divider and the transmit (playback) or receive (capture)
/// frame period. Returns the dividers that were programmed.
pub fn hw_params<P: SerialAudioPort>(
    port: &mut P,
    direction: StreamDirection,
    params: &HwParams,
) -> Result<SscDividers, AudioError> {
    debug!("hw_params: rate {} Hz, {} channels", params.rate, params.channels);

    port.set_format(DaiFormat::I2S_NB_NF_CODEC_SLAVE).map_err(|_| {
        warn!("can't set cpu DAI configuration");
        AudioError::Port
    })?;

    let dividers = SampleRateHz::new(params.rate)
        .ok()
        .and_then(dividers_for)
        .ok_or_else(|| {
            warn!("unsupported rate {} Hz", params.rate);
            AudioError::UnsupportedRate(params.rate)
        })?;

    port.set_clock_divider(ClockDivider::Cmr, dividers.cmr_div)
        .map_err(|_| AudioError::Port)?;

    let period = match direction {
        StreamDirection::Playback => ClockDivider::TransmitPeriod,
        StreamDirection::Capture => ClockDivider::ReceivePeriod,
    };
    port.set_clock_divider(period, dividers.period)
        .map_err(|_| AudioError::Port)?;

    debug!(
        "hw_params: cmr_div {}, period {}, LRC {} Hz",
        dividers.cmr_div,
        dividers.period,
        dividers.lrc_hz()
    );
    Ok(dividers)
}

/// Registered sound card holding its serial controller.
pub struct SoundCard<P> {
    port: P,
    link: &'static DaiLink,
}

impl<P: SerialAudioPort> SoundCard<P> {
    /// Claim the link's SSC and register the card.
    pub fn probe<S>(provider: &mut S) -> Result<Self, AudioError>
    where
        S: SscProvider<Port = P>,
    {
        let link = &TABX_DAI_LINK;
        let port = provider.request(link.cpu_dai).map_err(|_| {
            warn!("Failed to request SSC {}", link.cpu_dai);
            AudioError::SscUnavailable
        })?;
        info!("{}: {} <-> SSC {}", CARD_NAME, link.codec_dai.name, link.cpu_dai);
        Ok(Self { port, link })
    }

    /// Unregister the card and give the SSC back.
    pub fn remove<S>(self, provider: &mut S)
    where
        S: SscProvider<Port = P>,
    {
        provider.release(self.port);
        info!("{}: removed", CARD_NAME);
    }

    /// Card name.
    pub fn name(&self) -> &'static str {
        CARD_NAME
    }

    /// The card's DAI link.
    pub fn link(&self) -> &'static DaiLink {
        self.link
    }

    /// Claimed serial port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Configure the port for a stream; see [`hw_params`].
    pub fn hw_params(
        &mut self,
        direction: StreamDirection,
        params: &HwParams,
    ) -> Result<SscDividers, AudioError> {
        hw_params(&mut self.port, direction, params)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use platform::mocks::MockSsc;

    #[test]
    fn link_names_and_ssc() {
        assert_eq!(TABX_DAI_LINK.name, "TABX_PCM");
        assert_eq!(TABX_DAI_LINK.stream_name, "TABX_PCM PCM");
        assert_eq!(TABX_DAI_LINK.cpu_dai, 1);
        assert_eq!(TABX_DAI_LINK.codec_dai.name, "TABX_PCM");
    }

    #[test]
    fn probe_claims_ssc1() {
        let mut ssc = MockSsc::new();
        let card = SoundCard::probe(&mut ssc).unwrap();
        assert_eq!(card.name(), "TABX-PCM");
        assert_eq!(card.port().index(), 1);
        assert!(ssc.is_claimed(1));
        assert!(!ssc.is_claimed(0));
    }

    #[test]
    fn probe_fails_when_ssc1_is_taken() {
        let mut ssc = MockSsc::new();
        ssc.occupy(1);
        assert!(matches!(
            SoundCard::probe(&mut ssc),
            Err(AudioError::SscUnavailable)
        ));
        assert!(!ssc.released().contains(&1));
    }

    #[test]
    fn remove_releases_ssc() {
        let mut ssc = MockSsc::new();
        let card = SoundCard::probe(&mut ssc).unwrap();
        card.remove(&mut ssc);
        assert!(!ssc.is_claimed(1));
        assert_eq!(ssc.released(), &[1]);
    }

    #[test]
    fn playback_sets_transmit_period() {
        let mut ssc = MockSsc::new();
        let mut card = SoundCard::probe(&mut ssc).unwrap();
        let dividers = card
            .hw_params(StreamDirection::Playback, &HwParams::stereo_s16(48_000))
            .unwrap();
        assert_eq!(dividers.cmr_div, 19);
        assert_eq!(card.port().format(), Some(DaiFormat::I2S_NB_NF_CODEC_SLAVE));
        assert_eq!(
            card.port().dividers(),
            &[(ClockDivider::Cmr, 19), (ClockDivider::TransmitPeriod, 15)]
        );
    }

    #[test]
    fn capture_sets_receive_period() {
        let mut ssc = MockSsc::new();
        let mut card = SoundCard::probe(&mut ssc).unwrap();
        card.hw_params(StreamDirection::Capture, &HwParams::stereo_s16(8_000))
            .unwrap();
        assert_eq!(
            card.port().dividers(),
            &[(ClockDivider::Cmr, 117), (ClockDivider::ReceivePeriod, 15)]
        );
    }

    #[test]
    fn unsupported_rate_programs_no_dividers() {
        let mut ssc = MockSsc::new();
        let mut card = SoundCard::probe(&mut ssc).unwrap();
        for rate in [12_000, 192_000, 0] {
            assert_eq!(
                card.hw_params(StreamDirection::Playback, &HwParams::stereo_s16(rate)),
                Err(AudioError::UnsupportedRate(rate))
            );
        }
        // Format is set before the rate is looked up.
        assert!(card.port().format().is_some());
        assert!(card.port().dividers().is_empty());
    }
}
