use crate::reconcile::Reconciler;
use crate::types::{ChannelCounts, Position, SensorLayout};
use serde::Serialize;

/// Everything recorded during one acquisition run.
///
/// Channels are append-only and keep arrival order. The session is filled by
/// the acquisition loop, then consumed once by [`Session::finalize`].
#[derive(Debug, Clone, Default)]
pub struct Session {
    layout: SensorLayout,
    daq_sync: Vec<u32>,
    odor_on: Vec<u32>,
    odor_off: Vec<u32>,
    motion: Vec<u32>,
    delta_xs: Vec<i8>,
    delta_ys: Vec<i8>,
    positions: Vec<Position>,
    unknown: usize,
}

impl Session {
    pub fn new(layout: SensorLayout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn layout(&self) -> SensorLayout {
        self.layout
    }

    pub fn push_daq_sync(&mut self, timestamp: u32) {
        self.daq_sync.push(timestamp);
    }

    pub fn push_odor_on(&mut self, timestamp: u32) {
        self.odor_on.push(timestamp);
    }

    pub fn push_odor_off(&mut self, timestamp: u32) {
        self.odor_off.push(timestamp);
    }

    pub fn push_motion(&mut self, timestamp: u32) {
        self.motion.push(timestamp);
    }

    /// Raw per-frame deltas (single-sensor rigs).
    pub fn push_deltas(&mut self, dx: i8, dy: i8) {
        self.delta_xs.push(dx);
        self.delta_ys.push(dy);
    }

    /// Fused position sample (dual-sensor rigs).
    pub fn push_position(&mut self, position: Position) {
        self.positions.push(position);
    }

    pub fn note_unknown(&mut self) {
        self.unknown += 1;
    }

    pub fn daq_sync(&self) -> &[u32] {
        &self.daq_sync
    }

    pub fn odor_on(&self) -> &[u32] {
        &self.odor_on
    }

    pub fn odor_off(&self) -> &[u32] {
        &self.odor_off
    }

    pub fn motion(&self) -> &[u32] {
        &self.motion
    }

    pub fn deltas(&self) -> (&[i8], &[i8]) {
        (&self.delta_xs, &self.delta_ys)
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// First raw DAQ sync timestamp, the alignment origin.
    pub fn initial_time(&self) -> Option<u32> {
        self.daq_sync.first().copied()
    }

    pub fn counts(&self) -> ChannelCounts {
        ChannelCounts {
            daq_sync: self.daq_sync.len(),
            odor_on: self.odor_on.len(),
            odor_off: self.odor_off.len(),
            motion: self.motion.len(),
            unknown: self.unknown,
        }
    }

    /// Reconcile all timestamp channels and build the export record.
    ///
    /// Without any DAQ sync pulse there is no origin: timestamps are exported
    /// raw and the record is marked [`Alignment::Raw`]. `overflow_modulus`
    /// is clamped to `1..=2^32`.
    pub fn finalize(self, overflow_modulus: u64) -> SessionExport {
        let motion = match self.layout {
            SensorLayout::Single => MotionExport::Deltas {
                delta_xs: self.delta_xs,
                delta_ys: self.delta_ys,
            },
            SensorLayout::Dual => MotionExport::Positions {
                position_x: self.positions.iter().map(|p| p.x).collect(),
                position_y: self.positions.iter().map(|p| p.y).collect(),
                position_z: self.positions.iter().map(|p| p.z).collect(),
            },
        };

        let Some(reconciler) = Reconciler::from_daq_sync(&self.daq_sync) else {
            log::warn!("No DAQ sync pulse recorded; exporting raw, unaligned timestamps");
            let raw =
                |channel: Vec<u32>| -> Vec<i64> { channel.into_iter().map(i64::from).collect() };
            return SessionExport {
                daq_times: raw(self.daq_sync),
                odor_on_times: raw(self.odor_on),
                odor_off_times: raw(self.odor_off),
                motion_times: raw(self.motion),
                motion,
                alignment: Alignment::Raw,
            };
        };

        let reconciler = reconciler.with_modulus(overflow_modulus);
        let daq = reconciler.adjust(&self.daq_sync);
        let odor_on = reconciler.adjust(&self.odor_on);
        let odor_off = reconciler.adjust(&self.odor_off);
        let moves = reconciler.adjust(&self.motion);

        let overflows = ChannelOverflows {
            daq_sync: daq.overflows,
            odor_on: odor_on.overflows,
            odor_off: odor_off.overflows,
            motion: moves.overflows,
        };
        log::info!(
            "Session aligned to initial time {} (overflows: {:?})",
            reconciler.initial_time(),
            overflows
        );

        SessionExport {
            daq_times: daq.values,
            odor_on_times: odor_on.values,
            odor_off_times: odor_off.values,
            motion_times: moves.values,
            motion,
            alignment: Alignment::Aligned {
                initial_time: reconciler.initial_time(),
                overflows,
            },
        }
    }
}

/// Session record handed to an external writer (MATLAB, HDF5, JSON...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionExport {
    #[serde(rename = "DAQ_Times")]
    pub daq_times: Vec<i64>,
    #[serde(rename = "Odor_On_Times")]
    pub odor_on_times: Vec<i64>,
    #[serde(rename = "Odor_Off_Times")]
    pub odor_off_times: Vec<i64>,
    #[serde(rename = "Motion_Times")]
    pub motion_times: Vec<i64>,
    #[serde(flatten)]
    pub motion: MotionExport,
    #[serde(rename = "Alignment")]
    pub alignment: Alignment,
}

impl SessionExport {
    pub fn is_aligned(&self) -> bool {
        matches!(self.alignment, Alignment::Aligned { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MotionExport {
    Deltas {
        #[serde(rename = "Delta_Xs")]
        delta_xs: Vec<i8>,
        #[serde(rename = "Delta_Ys")]
        delta_ys: Vec<i8>,
    },
    Positions {
        #[serde(rename = "Position_X")]
        position_x: Vec<f64>,
        #[serde(rename = "Position_Y")]
        position_y: Vec<f64>,
        #[serde(rename = "Position_Z")]
        position_z: Vec<f64>,
    },
}

/// Whether the exported timestamps share the DAQ sync origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "Status")]
pub enum Alignment {
    Aligned {
        #[serde(rename = "Initial_Time")]
        initial_time: u32,
        #[serde(rename = "Overflows")]
        overflows: ChannelOverflows,
    },
    /// No DAQ sync pulse: values are raw device counter readings.
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChannelOverflows {
    pub daq_sync: u32,
    pub odor_on: u32,
    pub odor_off: u32,
    pub motion: u32,
}
