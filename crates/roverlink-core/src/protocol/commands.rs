//! Protocol commands
//!
//! Defines the five single-byte wire commands understood by the rover
//! firmware, and the control-surface codes they are selected by.

use serde::{Deserialize, Serialize};

/// Wire commands understood by the rover firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Halt both motors
    Stop,

    /// Drive forward
    Forward,

    /// Drive backward
    Back,

    /// Turn left
    Left,

    /// Turn right
    Right,
}

impl Command {
    /// Get the single-byte wire value. Must match the firmware exactly.
    pub fn wire_byte(self) -> u8 {
        match self {
            Command::Stop => 0x00,
            Command::Forward => 0xE0,
            Command::Back => 0x8F,
            Command::Left => 0xA0,
            Command::Right => 0xC0,
        }
    }
}

/// A drivable direction, selected by the control-surface codes 1-4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Code "1"
    Back,
    /// Code "2"
    Left,
    /// Code "3"
    Right,
    /// Code "4"
    Forward,
}

impl Direction {
    /// Parse a control-surface direction code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(Direction::Back),
            "2" => Some(Direction::Left),
            "3" => Some(Direction::Right),
            "4" => Some(Direction::Forward),
            _ => None,
        }
    }

    /// The wire command this direction maps to
    pub fn command(self) -> Command {
        match self {
            Direction::Back => Command::Back,
            Direction::Left => Command::Left,
            Direction::Right => Command::Right,
            Direction::Forward => Command::Forward,
        }
    }
}

/// Engine dispatch mode, selected by the control-surface codes 0 and 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveMode {
    /// Code "0": transmit the stop byte
    Stop,
    /// Code "5": transmit the saved direction, if any
    Confirm,
}

impl DriveMode {
    /// Parse a control-surface mode code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(DriveMode::Stop),
            "5" => Some(DriveMode::Confirm),
            _ => None,
        }
    }

    /// The control-surface code for this mode
    pub fn code(self) -> &'static str {
        match self {
            DriveMode::Stop => "0",
            DriveMode::Confirm => "5",
        }
    }
}

/// Terminal outcome of a direction-set or drive call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveOutcome {
    /// A command byte was written to the line
    Dispatched(Command),

    /// The direction was saved; nothing was written
    Stored(Direction),

    /// Confirm was requested with no direction saved. Nothing was written
    /// and the engine is now armed: the next direction-set fires by itself.
    DirectionPending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bytes_match_firmware() {
        assert_eq!(Command::Stop.wire_byte(), 0x00);
        assert_eq!(Command::Forward.wire_byte(), 0xE0);
        assert_eq!(Command::Back.wire_byte(), 0x8F);
        assert_eq!(Command::Left.wire_byte(), 0xA0);
        assert_eq!(Command::Right.wire_byte(), 0xC0);
    }

    #[test]
    fn test_direction_codes() {
        assert_eq!(Direction::from_code("1"), Some(Direction::Back));
        assert_eq!(Direction::from_code("2"), Some(Direction::Left));
        assert_eq!(Direction::from_code("3"), Some(Direction::Right));
        assert_eq!(Direction::from_code("4"), Some(Direction::Forward));
        assert_eq!(Direction::from_code("0"), None);
        assert_eq!(Direction::from_code("5"), None);
        assert_eq!(Direction::from_code("forward"), None);
    }

    #[test]
    fn test_direction_to_command() {
        assert_eq!(Direction::Back.command(), Command::Back);
        assert_eq!(Direction::Forward.command(), Command::Forward);
        assert_eq!(Direction::Left.command(), Command::Left);
        assert_eq!(Direction::Right.command(), Command::Right);
    }

    #[test]
    fn test_mode_codes_roundtrip() {
        assert_eq!(DriveMode::from_code("0"), Some(DriveMode::Stop));
        assert_eq!(DriveMode::from_code("5"), Some(DriveMode::Confirm));
        assert_eq!(DriveMode::from_code("1"), None);
        assert_eq!(DriveMode::Stop.code(), "0");
        assert_eq!(DriveMode::Confirm.code(), "5");
    }
}
