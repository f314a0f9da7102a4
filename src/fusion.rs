//! Dual-sensor motion fusion.
//!
//! Two optical sensors sit at 45 degrees on either side of the ball. Their
//! raw counts are summed over a fusion window, projected onto the rig's
//! X/Y/Z basis, and added to a running position when they clear the dead
//! zone:
//!
//!   deltaX = 0.5    * (dx1 + dx2)
//!   deltaY = cos 45 * (dy1 + dy2)
//!   deltaZ = cos 45 * (dy1 - dy2)
//!
//! The accumulator is cleared after every evaluation, so counts that stay
//! under the dead zone within one window are dropped rather than carried
//! into the next.

use crate::protocol::{COS_45, DEFAULT_MIN_DELTA, DEFAULT_TIMESTEP};
use crate::types::{Axes, Position, PositionUpdate};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionConfig {
    /// Dead zone: a fused axis delta moves the position only if
    /// `|delta| >= min_delta`.
    pub min_delta: f64,
    /// Fusion window in raw device ticks.
    pub timestep: u32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            min_delta: DEFAULT_MIN_DELTA,
            timestep: DEFAULT_TIMESTEP,
        }
    }
}

/// Raw sensor counts summed since the last evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorAccumulator {
    pub dx1: i64,
    pub dy1: i64,
    pub dx2: i64,
    pub dy2: i64,
}

impl SensorAccumulator {
    pub fn add(&mut self, dx1: i8, dy1: i8, dx2: i8, dy2: i8) {
        self.dx1 += i64::from(dx1);
        self.dy1 += i64::from(dy1);
        self.dx2 += i64::from(dx2);
        self.dy2 += i64::from(dy2);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Project the summed counts onto the rig basis.
    pub fn fused(&self) -> Position {
        Position {
            x: 0.5 * (self.dx1 + self.dx2) as f64,
            y: COS_45 * (self.dy1 + self.dy2) as f64,
            z: COS_45 * (self.dy1 - self.dy2) as f64,
        }
    }
}

/// Result of one fusion evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionOutcome {
    /// Fused deltas for the window, before the dead zone.
    pub delta: Position,
    /// Axes that cleared the dead zone.
    pub moved: Axes,
    /// Running position after the window was applied.
    pub position: Position,
    /// Raw timestamp of the frame that closed the window.
    pub timestamp: u32,
}

impl FusionOutcome {
    /// Point for the live plot, present when X or Y moved.
    pub fn plot_update(&self) -> Option<PositionUpdate> {
        self.moved.intersects(Axes::X | Axes::Y).then_some(PositionUpdate {
            x: self.position.x,
            y: self.position.y,
            timestamp: self.timestamp,
        })
    }

    /// Position-history sample, present when any axis moved.
    pub fn history_sample(&self) -> Option<Position> {
        (!self.moved.is_empty()).then_some(self.position)
    }
}

/// Accumulates dual-sensor readings and folds them into a cumulative position.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    config: FusionConfig,
    accumulator: SensorAccumulator,
    position: Position,
    last_timestamp: u32,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            accumulator: SensorAccumulator::default(),
            position: Position::default(),
            last_timestamp: 0,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn accumulator(&self) -> &SensorAccumulator {
        &self.accumulator
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Raw timestamp of the last evaluation (0 before the first one).
    pub fn last_timestamp(&self) -> u32 {
        self.last_timestamp
    }

    /// Add one dual-sensor reading.
    ///
    /// The window is evaluated when more than `timestep` ticks have passed
    /// since the last evaluation, or when the timestamp went backwards
    /// (counter wrap). Otherwise the counts are only accumulated.
    pub fn ingest(&mut self, timestamp: u32, deltas: [i8; 4]) -> Option<FusionOutcome> {
        let [dx1, dy1, dx2, dy2] = deltas;
        self.accumulator.add(dx1, dy1, dx2, dy2);

        let elapsed = i64::from(timestamp) - i64::from(self.last_timestamp);
        if elapsed > i64::from(self.config.timestep) || timestamp < self.last_timestamp {
            Some(self.evaluate(timestamp))
        } else {
            None
        }
    }

    fn evaluate(&mut self, timestamp: u32) -> FusionOutcome {
        let delta = self.accumulator.fused();
        let min = self.config.min_delta;
        let mut moved = Axes::empty();

        if delta.x.abs() >= min {
            self.position.x += delta.x;
            moved |= Axes::X;
        }
        if delta.y.abs() >= min {
            self.position.y += delta.y;
            moved |= Axes::Y;
        }
        if delta.z.abs() >= min {
            self.position.z += delta.z;
            moved |= Axes::Z;
        }

        if moved.is_empty() {
            log::trace!("Fusion window at {} below dead zone: {:?}", timestamp, delta);
        }

        self.accumulator.reset();
        self.last_timestamp = timestamp;

        FusionOutcome {
            delta,
            moved,
            position: self.position,
            timestamp,
        }
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}
