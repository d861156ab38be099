//! Audio integration tests: sound card lifecycle against the SSC mocks.
//!
//! Run with: cargo test -p tabx --test integration_audio

// Integration test file -- intentional test patterns permitted.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use platform::mocks::MockSsc;
use platform::{ClockDivider, DaiFormat};
use tabx::audio::clock_math::DIVIDER_TABLE;
use tabx::audio::{hw_params, PcmFormat, CARD_NAME, TABX_DAI_LINK};
use tabx::{AudioError, HwParams, SoundCard, StreamDirection, TABX_PCM_DAI};

#[test]
fn card_lifecycle() {
    let mut ssc = MockSsc::new();

    let mut card = SoundCard::probe(&mut ssc).unwrap();
    assert_eq!(card.name(), CARD_NAME);
    assert_eq!(card.link(), &TABX_DAI_LINK);

    card.hw_params(StreamDirection::Playback, &HwParams::stereo_s16(44_100))
        .unwrap();
    card.remove(&mut ssc);

    // The controller can be claimed again after removal.
    let again = SoundCard::probe(&mut ssc).unwrap();
    assert_eq!(again.port().index(), 1);
}

#[test]
fn every_advertised_table_rate_configures() {
    let caps = TABX_PCM_DAI.playback.unwrap();
    let mut ssc = MockSsc::new();
    let mut card = SoundCard::probe(&mut ssc).unwrap();

    for (rate, expected) in DIVIDER_TABLE {
        let params = HwParams {
            rate,
            channels: 2,
            format: PcmFormat::S16Le,
        };
        assert!(caps.accepts(params.channels, rate, params.format));
        let dividers = card.hw_params(StreamDirection::Playback, &params).unwrap();
        assert_eq!(dividers, expected, "{rate} Hz");
    }

    let writes = card.port().dividers();
    assert_eq!(writes.len(), DIVIDER_TABLE.len() * 2);
    assert!(writes
        .chunks(2)
        .all(|w| w[0].0 == ClockDivider::Cmr && w[1].0 == ClockDivider::TransmitPeriod));
}

#[test]
fn hw_params_works_on_a_bare_port() {
    let mut ssc = MockSsc::new();
    let mut port = platform::SscProvider::request(&mut ssc, 0).unwrap();
    hw_params(&mut port, StreamDirection::Capture, &HwParams::stereo_s16(96_000)).unwrap();
    assert_eq!(port.format(), Some(DaiFormat::I2S_NB_NF_CODEC_SLAVE));
    assert_eq!(
        port.dividers(),
        &[(ClockDivider::Cmr, 9), (ClockDivider::ReceivePeriod, 15)]
    );
}

#[test]
fn rate_outside_the_standard_set_is_rejected_everywhere() {
    let caps = TABX_PCM_DAI.playback.unwrap();
    assert!(!caps.accepts(2, 12_000, PcmFormat::S16Le));

    let mut ssc = MockSsc::new();
    let mut card = SoundCard::probe(&mut ssc).unwrap();
    assert_eq!(
        card.hw_params(StreamDirection::Playback, &HwParams::stereo_s16(12_000)),
        Err(AudioError::UnsupportedRate(12_000))
    );
}

#[test]
fn occupied_controller_fails_probe() {
    let mut ssc = MockSsc::new();
    ssc.occupy(TABX_DAI_LINK.cpu_dai);
    assert!(matches!(
        SoundCard::probe(&mut ssc),
        Err(AudioError::SscUnavailable)
    ));
}
