use crate::types::{EventKind, MotionSample, SensorDeltas, SensorLayout};

// -- Frame identifiers (single ASCII byte) --
pub const DAQ_SYNC_IDENTIFIER: u8 = b'1';
pub const ODOR_ON_IDENTIFIER: u8 = b'2';
pub const ODOR_OFF_IDENTIFIER: u8 = b'3';
pub const MOTION_IDENTIFIER: u8 = b'4';
pub const TERMINATE_IDENTIFIER: u8 = b'!';

// -- Payload geometry --
pub const TIMESTAMP_SIZE: usize = 4;
pub const SINGLE_MOTION_SIZE: usize = TIMESTAMP_SIZE + 2;
pub const DUAL_MOTION_SIZE: usize = TIMESTAMP_SIZE + 4;
/// Largest payload any frame can carry.
pub const MAX_PAYLOAD_SIZE: usize = DUAL_MOTION_SIZE;

/// Overflow modulus of the device timestamp counter (2^32 - 1).
pub const MAX_VALUE: u64 = 4_294_967_295;

/// Largest usable overflow modulus: one full 32-bit counter period.
pub const MAX_OVERFLOW_MODULUS: u64 = 1 << 32;

/// cos(45 deg), the mounting angle of both optical sensors.
pub const COS_45: f64 = 0.70710678118;

/// Default fusion window in raw device ticks (microseconds on the rig).
pub const DEFAULT_TIMESTEP: u32 = 200_000;

/// Default dead zone: smallest fused per-axis delta treated as motion.
pub const DEFAULT_MIN_DELTA: f64 = 10.0;

/// Baud rate the rig firmware is flashed with.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Map an identifier byte to the frame it announces.
///
/// Bytes outside the table (including anything that is not single-byte
/// ASCII) yield `None`; the caller reports them as `Unknown`.
pub fn identify(byte: u8) -> Option<EventKind> {
    match byte {
        DAQ_SYNC_IDENTIFIER => Some(EventKind::DaqSync),
        ODOR_ON_IDENTIFIER => Some(EventKind::OdorOn),
        ODOR_OFF_IDENTIFIER => Some(EventKind::OdorOff),
        MOTION_IDENTIFIER => Some(EventKind::Motion),
        TERMINATE_IDENTIFIER => Some(EventKind::Terminate),
        _ => None,
    }
}

/// Payload length that follows the identifier for a given frame kind.
pub fn payload_len(kind: EventKind, motion: &dyn MotionDecoder) -> usize {
    match kind {
        EventKind::DaqSync | EventKind::OdorOn | EventKind::OdorOff => TIMESTAMP_SIZE,
        EventKind::Motion => motion.payload_len(),
        EventKind::Terminate | EventKind::Unknown => 0,
    }
}

/// Parse a big-endian unsigned 32-bit timestamp from the start of `payload`.
pub fn parse_timestamp(payload: &[u8]) -> Option<u32> {
    if payload.len() < TIMESTAMP_SIZE {
        return None;
    }
    Some(u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]))
}

/// Decodes the motion payload for one sensor layout.
pub trait MotionDecoder: Send {
    fn layout(&self) -> SensorLayout;

    /// Payload bytes following the `4` identifier.
    fn payload_len(&self) -> usize;

    /// Decode a payload of exactly `payload_len()` bytes.
    fn decode(&self, payload: &[u8]) -> Option<MotionSample>;
}

/// Payload layout:
/// - `[0..4]`: uint32 BE timestamp
/// - `[4]`: int8 deltaX
/// - `[5]`: int8 deltaY
///
/// The timestamp comes first, as in the dual-sensor frame. Early
/// single-sensor firmware sent `deltaX, deltaY, timestamp` instead; that
/// firmware has to be reflashed (or its captures reordered) before it can
/// be decoded here.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleSensor;

impl MotionDecoder for SingleSensor {
    fn layout(&self) -> SensorLayout {
        SensorLayout::Single
    }

    fn payload_len(&self) -> usize {
        SINGLE_MOTION_SIZE
    }

    fn decode(&self, payload: &[u8]) -> Option<MotionSample> {
        if payload.len() < SINGLE_MOTION_SIZE {
            return None;
        }
        Some(MotionSample {
            timestamp: parse_timestamp(payload)?,
            deltas: SensorDeltas::Single {
                dx: payload[4] as i8,
                dy: payload[5] as i8,
            },
        })
    }
}

/// Payload layout:
/// - `[0..4]`: uint32 BE timestamp
/// - `[4]`, `[5]`: int8 deltaX1, deltaY1 (first sensor)
/// - `[6]`, `[7]`: int8 deltaX2, deltaY2 (second sensor)
#[derive(Debug, Clone, Copy, Default)]
pub struct DualSensor;

impl MotionDecoder for DualSensor {
    fn layout(&self) -> SensorLayout {
        SensorLayout::Dual
    }

    fn payload_len(&self) -> usize {
        DUAL_MOTION_SIZE
    }

    fn decode(&self, payload: &[u8]) -> Option<MotionSample> {
        if payload.len() < DUAL_MOTION_SIZE {
            return None;
        }
        Some(MotionSample {
            timestamp: parse_timestamp(payload)?,
            deltas: SensorDeltas::Dual {
                dx1: payload[4] as i8,
                dy1: payload[5] as i8,
                dx2: payload[6] as i8,
                dy2: payload[7] as i8,
            },
        })
    }
}

impl SensorLayout {
    /// Motion decoder matching this layout.
    pub fn motion_decoder(self) -> Box<dyn MotionDecoder> {
        match self {
            SensorLayout::Single => Box::new(SingleSensor),
            SensorLayout::Dual => Box::new(DualSensor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify() {
        assert_eq!(identify(b'1'), Some(EventKind::DaqSync));
        assert_eq!(identify(b'2'), Some(EventKind::OdorOn));
        assert_eq!(identify(b'3'), Some(EventKind::OdorOff));
        assert_eq!(identify(b'4'), Some(EventKind::Motion));
        assert_eq!(identify(b'!'), Some(EventKind::Terminate));
        assert_eq!(identify(b'5'), None);
        assert_eq!(identify(0xFF), None);
    }

    #[test]
    fn test_payload_len() {
        assert_eq!(payload_len(EventKind::OdorOff, &DualSensor), 4);
        assert_eq!(payload_len(EventKind::Motion, &SingleSensor), 6);
        assert_eq!(payload_len(EventKind::Motion, &DualSensor), 8);
        assert_eq!(payload_len(EventKind::Terminate, &DualSensor), 0);
    }

    #[test]
    fn test_parse_timestamp_big_endian() {
        assert_eq!(parse_timestamp(&[0x00, 0x00, 0x00, 0x05]), Some(5));
        assert_eq!(parse_timestamp(&[0xFF, 0xFF, 0xFF, 0xFF]), Some(u32::MAX));
        assert_eq!(parse_timestamp(&[0x01, 0x02, 0x03, 0x04]), Some(0x0102_0304));
        assert_eq!(parse_timestamp(&[0x00, 0x01]), None);
    }

    #[test]
    fn test_decode_dual_motion() {
        let payload = [0x00, 0x03, 0x0D, 0x40, 0x0A, 0xF6, 0x7F, 0x80];
        let sample = DualSensor.decode(&payload).unwrap();
        assert_eq!(sample.timestamp, 200_000);
        assert_eq!(
            sample.deltas,
            SensorDeltas::Dual {
                dx1: 10,
                dy1: -10,
                dx2: 127,
                dy2: -128
            }
        );
    }

    #[test]
    fn test_decode_single_motion() {
        let payload = [0x00, 0x00, 0x01, 0x00, 0xFF, 0x02];
        let sample = SingleSensor.decode(&payload).unwrap();
        assert_eq!(sample.timestamp, 256);
        assert_eq!(sample.deltas, SensorDeltas::Single { dx: -1, dy: 2 });
        assert!(SingleSensor.decode(&payload[..5]).is_none());
    }

    #[test]
    fn test_layout_selects_decoder() {
        assert_eq!(SensorLayout::Single.motion_decoder().payload_len(), 6);
        assert_eq!(SensorLayout::Dual.motion_decoder().layout(), SensorLayout::Dual);
        assert_eq!(SensorLayout::default(), SensorLayout::Dual);
    }
}
