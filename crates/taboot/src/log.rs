//! Logging macros.
//!
//! Hardware builds log through `defmt` (feature `defmt`), the desktop
//! emulator through `tracing` (feature `tracing`). With neither enabled the
//! macros expand to nothing, so the bootloader image carries no log strings.
//!
//! Only plain `{}` placeholders are used, which both backends accept.

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

/// Error.
macro_rules! error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($($arg)*);
        #[cfg(feature = "tracing")]
        ::tracing::error!($($arg)*);
    }};
}
