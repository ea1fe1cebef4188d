//! Serial Protocol Communication
//!
//! Implements the fixed-frame binary protocol spoken by the rover firmware:
//! single-byte drive commands out, 14-byte telemetry frames back, with no
//! acknowledgement other than the frame itself.

pub mod commands;
mod error;
mod frame;
pub mod line;
mod reply;
mod session;

pub use commands::{Command, Direction, DriveMode, DriveOutcome};
pub use error::{ErrorKind, LinkError};
pub use frame::{FrameAccumulator, TelemetryFrame, SENSOR_COUNT};
pub use line::{LineIo, LineOpener, LineSettings, SerialLineOpener};
pub use reply::ReplyCell;
pub use session::{LinkState, RoverLink};

/// Default baud rate for the rover serial link
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Length of one telemetry frame in bytes
pub const FRAME_LEN: usize = 14;

/// Marker byte pair opening every valid telemetry frame
pub const FRAME_MARKER: [u8; 2] = [248, 4];

/// Settling delay after a successful port open before the open call replies.
/// The firmware needs a moment after the port opens before it will listen.
pub const WARMUP_DELAY_MS: u64 = 2000;

/// Watchdog timeout for calls that can stall forever on a silent device
pub const DISCONNECTION_TIMEOUT_MS: u64 = 5000;
