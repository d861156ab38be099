//! RS-232 command console abstraction
//!
//! The bootloader talks to its host over a single byte-oriented serial line
//! (230 400 baud, 8N1). Anything implementing the blocking `embedded-io`
//! traits [`Read`], [`Write`] and [`ReadReady`] is a [`Console`] through the
//! blanket impl below, so a PIC UART driver, a desktop stdin/stdout pair and
//! [`MockConsole`](crate::mocks::MockConsole) all plug in the same way.

use core::fmt;

use embedded_io::{Error as _, ErrorKind, Read, ReadReady, Write};

/// Console I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsoleError {
    /// The underlying serial channel reported an error.
    Io(ErrorKind),
    /// The channel was closed while a byte was expected.
    Closed,
    /// A formatted message could not be rendered.
    Format,
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(kind) => write!(f, "serial I/O error: {kind:?}"),
            Self::Closed => write!(f, "serial channel closed"),
            Self::Format => write!(f, "message formatting failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConsoleError {}

/// Byte-oriented serial console.
///
/// The four required methods map one-to-one onto the `embedded-io` traits;
/// the provided helpers cover what the command console needs on top.
pub trait Console {
    /// `true` when at least one received byte can be read without blocking.
    fn byte_available(&mut self) -> Result<bool, ConsoleError>;

    /// Block until one byte is received.
    fn read_byte(&mut self) -> Result<u8, ConsoleError>;

    /// Transmit every byte of `bytes`.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConsoleError>;

    /// Wait until all buffered output has left the transmitter.
    fn flush_output(&mut self) -> Result<(), ConsoleError>;

    /// Transmit a single byte.
    fn write_byte(&mut self, byte: u8) -> Result<(), ConsoleError> {
        self.write_bytes(&[byte])
    }

    /// Transmit a string verbatim (no newline translation).
    fn write_str(&mut self, s: &str) -> Result<(), ConsoleError> {
        self.write_bytes(s.as_bytes())
    }

    /// Render `args` directly onto the line, without an intermediate buffer.
    fn print(&mut self, args: fmt::Arguments<'_>) -> Result<(), ConsoleError> {
        let mut adapter = FmtAdapter {
            console: self,
            error: None,
        };
        match fmt::write(&mut adapter, args) {
            Ok(()) => Ok(()),
            Err(fmt::Error) => Err(adapter.error.unwrap_or(ConsoleError::Format)),
        }
    }

    /// Read one line terminated by carriage return or line feed.
    ///
    /// Leading line terminators are skipped, so a `"\r\n"` pair left over
    /// from the previous line does not produce an empty read. Bytes beyond
    /// the capacity `N` are consumed and dropped.
    fn read_line<const N: usize>(&mut self) -> Result<heapless::Vec<u8, N>, ConsoleError> {
        let mut line = heapless::Vec::new();
        loop {
            let byte = self.read_byte()?;
            if byte == b'\r' || byte == b'\n' {
                if line.is_empty() {
                    continue;
                }
                return Ok(line);
            }
            // Overlong input is truncated, matching a fixed receive buffer.
            let _ = line.push(byte);
        }
    }
}

impl<T> Console for T
where
    T: Read + Write + ReadReady,
{
    fn byte_available(&mut self) -> Result<bool, ConsoleError> {
        self.read_ready().map_err(|e| ConsoleError::Io(e.kind()))
    }

    fn read_byte(&mut self) -> Result<u8, ConsoleError> {
        let mut buf = [0u8; 1];
        match self.read(&mut buf) {
            Ok(0) => Err(ConsoleError::Closed),
            Ok(_) => {
                let [byte] = buf;
                Ok(byte)
            }
            Err(e) => Err(ConsoleError::Io(e.kind())),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConsoleError> {
        Write::write_all(self, bytes).map_err(|e| ConsoleError::Io(e.kind()))
    }

    fn flush_output(&mut self) -> Result<(), ConsoleError> {
        Write::flush(self).map_err(|e| ConsoleError::Io(e.kind()))
    }
}

struct FmtAdapter<'a, C: Console + ?Sized> {
    console: &'a mut C,
    error: Option<ConsoleError>,
}

impl<C: Console + ?Sized> fmt::Write for FmtAdapter<'_, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.console.write_bytes(s.as_bytes()).map_err(|e| {
            self.error = Some(e);
            fmt::Error
        })
    }
}
