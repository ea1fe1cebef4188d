//! Telemetry frame decoding and reassembly
//!
//! The rover answers every command byte with one fixed-length frame:
//!
//! - 2 bytes: marker pair (248, 4); anything else invalidates the frame
//! - 12 bytes: six two-byte fields (button + five sensors), each decoded
//!   as `((high & 0x07) << 7) | low`

use serde::{Deserialize, Serialize};

use super::{LinkError, FRAME_LEN, FRAME_MARKER};

/// Number of sensor fields following the button field
pub const SENSOR_COUNT: usize = 5;

/// One decoded telemetry frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Button field value
    pub button: u16,

    /// Sensor field values, in wire order
    pub sensors: [u16; SENSOR_COUNT],
}

impl TelemetryFrame {
    /// Decode one 14-byte frame.
    ///
    /// The marker pair is validated first; a mismatch rejects the whole
    /// frame as a device-side protocol error. Decoding is pure: the same
    /// bytes always yield the same field values.
    pub fn decode(bytes: &[u8; FRAME_LEN]) -> Result<Self, LinkError> {
        if bytes[0] != FRAME_MARKER[0] || bytes[1] != FRAME_MARKER[1] {
            return Err(LinkError::InvalidFrame {
                high: bytes[0],
                low: bytes[1],
            });
        }

        let mut fields = [0u16; 1 + SENSOR_COUNT];
        for (i, field) in fields.iter_mut().enumerate() {
            *field = decode_field(bytes[2 + i * 2], bytes[3 + i * 2]);
        }

        let mut sensors = [0u16; SENSOR_COUNT];
        sensors.copy_from_slice(&fields[1..]);
        Ok(Self {
            button: fields[0],
            sensors,
        })
    }
}

/// Decode one two-byte field: the three low bits of `high` shifted left 7,
/// OR-ed with the raw `low` byte. Bit 7 of `low` aliases into the shifted
/// high bits; the firmware packs fields this way and the overlap must be
/// reproduced, not corrected.
fn decode_field(high: u8, low: u8) -> u16 {
    (((high & 0x07) as u16) << 7) | low as u16
}

/// Accumulates raw bytes from the line until a full frame candidate arrives.
///
/// There is no delimiter and no length field; the device never mixes frame
/// lengths, so the first [`FRAME_LEN`] bytes in the buffer are the only
/// candidate. Taking a frame drops everything in the buffer, including any
/// excess bytes beyond the candidate.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
}

impl FrameAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes from the line
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop all buffered bytes
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Take the first [`FRAME_LEN`] bytes as a frame candidate, resetting
    /// the buffer. Returns `None` while the buffer is still short.
    pub fn take_frame(&mut self) -> Option<[u8; FRAME_LEN]> {
        if self.buf.len() < FRAME_LEN {
            return None;
        }
        let mut frame = [0u8; FRAME_LEN];
        frame.copy_from_slice(&self.buf[..FRAME_LEN]);
        self.buf.clear();
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(fields: [(u8, u8); 6]) -> [u8; FRAME_LEN] {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = FRAME_MARKER[0];
        bytes[1] = FRAME_MARKER[1];
        for (i, (high, low)) in fields.iter().enumerate() {
            bytes[2 + i * 2] = *high;
            bytes[3 + i * 2] = *low;
        }
        bytes
    }

    #[test]
    fn test_decode_all_zero_fields() {
        let frame = TelemetryFrame::decode(&frame_bytes([(0, 0); 6])).expect("valid frame");
        assert_eq!(frame.button, 0);
        assert_eq!(frame.sensors, [0; SENSOR_COUNT]);
    }

    #[test]
    fn test_decode_field_values() {
        let frame = TelemetryFrame::decode(&frame_bytes([
            (0x01, 0x00), // 1 << 7 = 128
            (0x07, 0xFF), // maximum: 896 | 255 = 1023
            (0x00, 0x7F), // low byte only
            (0x02, 0x01), // 256 | 1
            (0x00, 0x00),
            (0x03, 0x20), // 384 | 32
        ]))
        .expect("valid frame");
        assert_eq!(frame.button, 128);
        assert_eq!(frame.sensors, [1023, 127, 257, 0, 416]);
    }

    #[test]
    fn test_decode_bit_seven_overlap() {
        // Bit 7 of low lands on the same bit as the lowest shifted high bit.
        // (1 << 7) | 0x80 is still 128, not 256.
        let frame =
            TelemetryFrame::decode(&frame_bytes([(0x01, 0x80), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)]))
                .expect("valid frame");
        assert_eq!(frame.button, 128);
    }

    #[test]
    fn test_decode_ignores_high_bits_above_three() {
        // Only the three low-order bits of high participate.
        let with_junk =
            TelemetryFrame::decode(&frame_bytes([(0xF5, 0x10), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)]))
                .expect("valid frame");
        let clean =
            TelemetryFrame::decode(&frame_bytes([(0x05, 0x10), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)]))
                .expect("valid frame");
        assert_eq!(with_junk.button, clean.button);
    }

    #[test]
    fn test_marker_mismatch_rejects_frame() {
        let mut bytes = frame_bytes([(0x01, 0x01); 6]);
        bytes[0] = 0x12;
        match TelemetryFrame::decode(&bytes) {
            Err(LinkError::InvalidFrame { high, low }) => {
                assert_eq!(high, 0x12);
                assert_eq!(low, FRAME_MARKER[1]);
            }
            other => panic!("expected invalid frame, got {:?}", other),
        }

        // Second marker byte alone is enough to reject
        let mut bytes = frame_bytes([(0, 0); 6]);
        bytes[1] = 0xFF;
        assert!(TelemetryFrame::decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_is_deterministic() {
        let bytes = frame_bytes([(0x03, 0xAB); 6]);
        let first = TelemetryFrame::decode(&bytes).expect("valid frame");
        let second = TelemetryFrame::decode(&bytes).expect("valid frame");
        assert_eq!(first, second);
    }

    #[test]
    fn test_accumulator_short_buffer() {
        let mut acc = FrameAccumulator::new();
        acc.extend(&[1, 2, 3]);
        assert_eq!(acc.take_frame(), None);
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn test_accumulator_take_discards_excess() {
        let mut acc = FrameAccumulator::new();
        let mut chunk = vec![0u8; FRAME_LEN];
        chunk[0] = 0xAA;
        chunk.extend_from_slice(&[1, 2, 3]); // excess beyond one frame
        acc.extend(&chunk);

        let frame = acc.take_frame().expect("enough bytes");
        assert_eq!(frame[0], 0xAA);
        // Excess goes with the reset; no carry-over between exchanges.
        assert!(acc.is_empty());
    }

    #[test]
    fn test_accumulator_reset() {
        let mut acc = FrameAccumulator::new();
        acc.extend(&[0u8; 20]);
        acc.reset();
        assert!(acc.is_empty());
        assert_eq!(acc.take_frame(), None);
    }

    #[test]
    fn test_frame_serializes() {
        let frame = TelemetryFrame {
            button: 1,
            sensors: [2, 3, 4, 5, 6],
        };
        let json = serde_json::to_string(&frame).expect("serializable");
        assert!(json.contains("\"button\":1"));
    }
}
