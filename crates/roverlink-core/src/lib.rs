//! # RoverLink Core Library
//!
//! Core functionality for the RoverLink serial control bridge.

#![warn(missing_docs)]

//!
//! This library provides the serial protocol engine for a small rover robot
//! speaking a fixed-frame binary protocol over a byte-oriented serial line:
//! single-byte drive commands in, 14-byte telemetry frames out.
//!
//! The engine owns one serial line at a time, encodes and dispatches drive
//! commands, reassembles and decodes telemetry frames, correlates exactly one
//! outstanding telemetry request with the next frame, and bounds every
//! device-facing call with a watchdog timer.
//!
//! ## Example
//!
//! ```rust,ignore
//! use roverlink_core::protocol::RoverLink;
//!
//! let link = RoverLink::new();
//! link.select_line("/dev/ttyUSB0");
//! link.open().await?;
//!
//! // Select a direction, then trigger it
//! link.set_direction("4").await?;
//! link.drive("5").await?;
//!
//! // Pull one telemetry frame
//! let frame = link.telemetry().await?;
//! println!("button: {}", frame.button);
//! ```

pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        Command, Direction, DriveMode, DriveOutcome, ErrorKind, LinkError, LinkState, RoverLink,
        TelemetryFrame,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
