//! Protocol errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification reported alongside every [`LinkError`].
///
/// `User` errors are caller misuse and are always safe to retry after fixing
/// the call; `Serial` errors are hardware or protocol failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Caller misuse (no line selected, invalid code, ...)
    User,
    /// Hardware or protocol failure (open/write errors, timeouts, bad frames)
    Serial,
}

/// Errors that can occur while talking to the rover
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("no serial line selected")]
    NoLineSelected,

    #[error("serial line is not open")]
    NotOpen,

    #[error("invalid direction code: {0:?}")]
    InvalidDirection(String),

    #[error("invalid drive mode: {0:?}")]
    InvalidMode(String),

    #[error("failed to open serial line: {0}")]
    OpenFailed(String),

    #[error("serial line closed with error: {0}")]
    CloseFailed(String),

    #[error("failed to write to serial line: {0}")]
    WriteFailed(String),

    #[error("serial line is not responding")]
    NotResponding,

    #[error("device disconnected")]
    Disconnected,

    #[error("telemetry frame marker mismatch: got {high:#04x} {low:#04x}")]
    InvalidFrame {
        /// First marker byte as received
        high: u8,
        /// Second marker byte as received
        low: u8,
    },
}

impl LinkError {
    /// Whether this is caller misuse or a hardware/protocol failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::NoLineSelected
            | LinkError::InvalidDirection(_)
            | LinkError::InvalidMode(_) => ErrorKind::User,
            LinkError::NotOpen
            | LinkError::OpenFailed(_)
            | LinkError::CloseFailed(_)
            | LinkError::WriteFailed(_)
            | LinkError::NotResponding
            | LinkError::Disconnected
            | LinkError::InvalidFrame { .. } => ErrorKind::Serial,
        }
    }

    /// Message suitable for showing to an end user. The technical detail
    /// stays in the `Display` form.
    pub fn user_message(&self) -> &'static str {
        match self {
            LinkError::NoLineSelected => "Please select a serial line first",
            LinkError::NotOpen => "The serial line is not open",
            LinkError::InvalidDirection(_) => "Unknown direction",
            LinkError::InvalidMode(_) => "Unknown drive mode",
            LinkError::OpenFailed(_) => "An error occurred while connecting to the device",
            LinkError::CloseFailed(_) => "The serial line closed with an error",
            LinkError::WriteFailed(_) => "Cannot send the command to the device",
            LinkError::NotResponding => "The serial line is not responding, please try again",
            LinkError::Disconnected => "The device disconnected",
            LinkError::InvalidFrame { .. } => "The device sent corrupted telemetry",
        }
    }
}
