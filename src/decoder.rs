use crate::protocol::{self, MotionDecoder, MAX_PAYLOAD_SIZE};
use crate::transport::ByteSource;
use crate::types::{EventKind, RawEvent, SensorLayout};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    AwaitIdentifier,
    ReadPayload { kind: EventKind, identifier: u8 },
    Emit(RawEvent),
}

/// Turns the rig byte stream into typed frames, one per call.
///
/// An identifier byte outside the frame table is reported as
/// `RawEvent::Unknown` and the decoder goes straight back to waiting for the
/// next identifier. No bytes are skipped to find a frame boundary, so a
/// desynchronized stream keeps producing `Unknown` (or misparsed) frames
/// until an identifier byte happens to line up again.
pub struct FrameDecoder {
    motion: Box<dyn MotionDecoder>,
    state: DecoderState,
    buf: [u8; MAX_PAYLOAD_SIZE],
}

impl FrameDecoder {
    pub fn new(layout: SensorLayout) -> Self {
        Self::with_motion_decoder(layout.motion_decoder())
    }

    pub fn with_motion_decoder(motion: Box<dyn MotionDecoder>) -> Self {
        Self {
            motion,
            state: DecoderState::AwaitIdentifier,
            buf: [0u8; MAX_PAYLOAD_SIZE],
        }
    }

    pub fn layout(&self) -> SensorLayout {
        self.motion.layout()
    }

    /// Decode the next frame from `source`.
    ///
    /// Returns `Ok(None)` when no identifier byte arrived within the
    /// source's poll timeout. A payload that cannot be read in full is a
    /// connection fault; the decoder resets and the error is returned.
    pub fn next_event(&mut self, source: &mut dyn ByteSource) -> Result<Option<RawEvent>> {
        loop {
            match self.state {
                DecoderState::AwaitIdentifier => {
                    let Some(identifier) = source.poll_byte()? else {
                        return Ok(None);
                    };
                    self.state = match protocol::identify(identifier) {
                        Some(EventKind::Terminate) => DecoderState::Emit(RawEvent::Terminate),
                        Some(kind) => DecoderState::ReadPayload { kind, identifier },
                        None => {
                            log::warn!("Unknown frame identifier 0x{:02x}", identifier);
                            DecoderState::Emit(RawEvent::Unknown(identifier))
                        }
                    };
                }
                DecoderState::ReadPayload { kind, identifier } => {
                    let len = protocol::payload_len(kind, self.motion.as_ref());
                    let payload = &mut self.buf[..len];
                    if let Err(e) = source.read_payload(payload) {
                        self.state = DecoderState::AwaitIdentifier;
                        return Err(e);
                    }

                    let timestamp = protocol::parse_timestamp(payload);
                    let event = match kind {
                        EventKind::DaqSync => timestamp.map(RawEvent::DaqSync),
                        EventKind::OdorOn => timestamp.map(RawEvent::OdorOn),
                        EventKind::OdorOff => timestamp.map(RawEvent::OdorOff),
                        EventKind::Motion => self.motion.decode(payload).map(RawEvent::Motion),
                        EventKind::Terminate | EventKind::Unknown => None,
                    };
                    let event = event.unwrap_or(RawEvent::Unknown(identifier));
                    log::trace!("Decoded {:?}", event);
                    self.state = DecoderState::Emit(event);
                }
                DecoderState::Emit(event) => {
                    self.state = DecoderState::AwaitIdentifier;
                    return Ok(Some(event));
                }
            }
        }
    }
}
