//! Logging macros.
//!
//! Board builds log through `defmt` (feature `defmt`), host builds through
//! `tracing` (feature `tracing`). With neither enabled the macros expand to
//! nothing.

/// Informational message.
macro_rules! info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($($arg)*);
        #[cfg(feature = "tracing")]
        ::tracing::info!($($arg)*);
    }};
}

/// Debug message.
macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)*);
        #[cfg(feature = "tracing")]
        ::tracing::debug!($($arg)*);
    }};
}

/// Warning.
macro_rules! warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)*);
        #[cfg(feature = "tracing")]
        ::tracing::warn!($($arg)*);
    }};
}
