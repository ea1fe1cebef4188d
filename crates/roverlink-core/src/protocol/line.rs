//! Serial line access
//!
//! Provides the hardware line abstraction the engine drives, and its
//! production implementation over tokio-serial.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};

use super::DEFAULT_BAUD_RATE;

/// Byte-level I/O over one serial line.
///
/// Anything that reads and writes bytes asynchronously qualifies; tests use
/// an in-memory duplex pipe in place of real hardware.
pub trait LineIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> LineIo for T {}

/// Serial line settings for the rover link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    /// Baud rate
    pub baud_rate: u32,
    /// Number of data bits
    pub data_bits: DataBits,
    /// Number of stop bits
    pub stop_bits: StopBits,
    /// Parity checking
    pub parity: Parity,
    /// Flow control
    pub flow_control: FlowControl,
}

impl Default for LineSettings {
    /// The firmware link settings: 38400 baud, 8N1, no flow control
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

/// Opens the hardware line behind a caller-supplied name
pub trait LineOpener: Send + Sync {
    /// Open the named line, returning its byte-level I/O handle
    fn open(&self, name: &str) -> io::Result<Box<dyn LineIo>>;
}

/// Production opener backed by tokio-serial
#[derive(Debug, Clone, Default)]
pub struct SerialLineOpener {
    /// Settings applied to every opened line
    pub settings: LineSettings,
}

impl SerialLineOpener {
    /// Create an opener with the default firmware link settings
    pub fn new() -> Self {
        Self::default()
    }
}

impl LineOpener for SerialLineOpener {
    fn open(&self, name: &str) -> io::Result<Box<dyn LineIo>> {
        let stream = tokio_serial::new(name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Box::new(stream))
    }
}
