//! Serial audio port (CPU DAI) abstraction
//!
//! On the AT91RM9200 the PCM link to the TABX codec runs over one of the
//! three Synchronous Serial Controllers. The sound card requests an SSC at
//! probe time, configures its format and clock dividers per stream, and
//! hands it back on removal.

/// Serial data framing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DaiProtocol {
    /// Philips I2S: MSB one bit-clock after the LRC edge.
    I2s,
    /// Left justified.
    LeftJustified,
    /// Right justified.
    RightJustified,
    /// DSP mode A.
    DspA,
}

/// Bit-clock / frame-clock polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockInversion {
    /// Normal bit clock, normal frame.
    NormalBitNormalFrame,
    /// Normal bit clock, inverted frame.
    NormalBitInvertedFrame,
    /// Inverted bit clock, normal frame.
    InvertedBitNormalFrame,
    /// Inverted bit clock, inverted frame.
    InvertedBitInvertedFrame,
}

/// Which side of the link generates the clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockProvider {
    /// Codec is bit-clock and frame slave: the CPU port drives both.
    CodecSlave,
    /// Codec is bit-clock and frame master.
    CodecMaster,
}

/// Complete digital audio interface format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DaiFormat {
    /// Framing protocol.
    pub protocol: DaiProtocol,
    /// Clock polarity.
    pub inversion: ClockInversion,
    /// Clock direction.
    pub provider: ClockProvider,
}

impl DaiFormat {
    /// I2S, normal polarities, CPU port as clock master.
    pub const I2S_NB_NF_CODEC_SLAVE: Self = Self {
        protocol: DaiProtocol::I2s,
        inversion: ClockInversion::NormalBitNormalFrame,
        provider: ClockProvider::CodecSlave,
    };
}

/// Serial port clock divider selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDivider {
    /// Clock Mode Register divider: BCLK = MCK / (2 × div).
    Cmr,
    /// Transmit frame period: LRC = BCLK / (2 × (period + 1)).
    TransmitPeriod,
    /// Receive frame period.
    ReceivePeriod,
}

/// CPU side of a PCM link.
pub trait SerialAudioPort {
    /// Error type
    type Error: core::fmt::Debug;

    /// Program the interface format.
    fn set_format(&mut self, format: DaiFormat) -> Result<(), Self::Error>;

    /// Program one of the clock dividers.
    fn set_clock_divider(&mut self, divider: ClockDivider, value: u16) -> Result<(), Self::Error>;
}

/// Owner of the SoC serial audio controllers.
pub trait SscProvider {
    /// Port handed out by [`request`](Self::request).
    type Port: SerialAudioPort;
    /// Error type
    type Error: core::fmt::Debug;

    /// Claim controller `index` for exclusive use.
    fn request(&mut self, index: u8) -> Result<Self::Port, Self::Error>;

    /// Return a previously claimed controller.
    fn release(&mut self, port: Self::Port);
}
