use serde::Serialize;

/// One decoded frame from the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    /// DAQ sync pulse with its raw device timestamp.
    DaqSync(u32),
    /// Odor valve opened.
    OdorOn(u32),
    /// Odor valve closed.
    OdorOff(u32),
    /// Optical sensor reading.
    Motion(MotionSample),
    /// End of experiment. Carries no payload.
    Terminate,
    /// Identifier byte that maps to no known frame.
    Unknown(u8),
}

impl RawEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RawEvent::DaqSync(_) => EventKind::DaqSync,
            RawEvent::OdorOn(_) => EventKind::OdorOn,
            RawEvent::OdorOff(_) => EventKind::OdorOff,
            RawEvent::Motion(_) => EventKind::Motion,
            RawEvent::Terminate => EventKind::Terminate,
            RawEvent::Unknown(_) => EventKind::Unknown,
        }
    }

    /// Raw device timestamp, for the frame kinds that carry one.
    pub fn timestamp(&self) -> Option<u32> {
        match self {
            RawEvent::DaqSync(t) | RawEvent::OdorOn(t) | RawEvent::OdorOff(t) => Some(*t),
            RawEvent::Motion(m) => Some(m.timestamp),
            RawEvent::Terminate | RawEvent::Unknown(_) => None,
        }
    }
}

/// Frame kind without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DaqSync,
    OdorOn,
    OdorOff,
    Motion,
    Terminate,
    Unknown,
}

/// Optical motion frame: device timestamp plus raw sensor counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionSample {
    pub timestamp: u32,
    pub deltas: SensorDeltas,
}

/// Raw signed counts reported since the previous frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorDeltas {
    /// One sensor facing the ball.
    Single { dx: i8, dy: i8 },
    /// Two sensors mounted at 45 degrees on either side of the ball.
    Dual { dx1: i8, dy1: i8, dx2: i8, dy2: i8 },
}

/// Which motion payload the rig firmware sends. Chosen when the session is
/// configured, never inferred from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorLayout {
    Single,
    #[default]
    Dual,
}

/// Cumulative ball displacement in sensor counts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Point pushed to the live plot whenever X or Y moved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    pub x: f64,
    pub y: f64,
    /// Raw timestamp of the motion frame that closed the fusion window.
    pub timestamp: u32,
}

bitflags::bitflags! {
    /// Axes whose fused delta cleared the dead zone in one fusion window.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Axes: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
    }
}

/// Snapshot of per-channel event counts during acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelCounts {
    pub daq_sync: usize,
    pub odor_on: usize,
    pub odor_off: usize,
    pub motion: usize,
    pub unknown: usize,
}

/// A serial port visible to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub kind: PortKind,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub product: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    Unknown,
}
