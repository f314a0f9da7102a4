//! # treadmill - host driver for the spherical treadmill rig
//!
//! Reads the rig's serial telemetry and turns it into a session record.
//! Provides:
//! - Frame decoding of DAQ sync, odor on/off, optical motion and terminate frames
//! - Dual-sensor motion fusion into a cumulative X/Y/Z position
//! - Timestamp reconciliation (counter wraparound, common DAQ sync origin)
//! - A background acquisition thread with live position feed and orderly shutdown
//!
//! ## Quick Start
//! ```no_run
//! use treadmill::{Rig, RigConfig};
//! use std::time::Duration;
//!
//! let rig = Rig::open(RigConfig::from_env()).unwrap();
//! let acquisition = rig.start_acquisition().unwrap();
//! let feed = acquisition.position_feed();
//!
//! for _ in 0..50 {
//!     if let Ok(p) = feed.recv_timeout(Duration::from_secs(1)) {
//!         println!("x={:.1} y={:.1}", p.x, p.y);
//!     }
//! }
//!
//! let report = acquisition.finish().unwrap();
//! let export = report.session.finalize(treadmill::protocol::MAX_VALUE);
//! println!("aligned: {}", export.is_aligned());
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod transport;
pub mod decoder;
pub mod fusion;
pub mod reconcile;
pub mod session;
pub mod cancel;
pub mod pipeline;
pub mod acquisition;
pub mod consumer;
pub mod config;
pub mod device;

pub use error::TreadmillError;
pub use types::*;
pub use acquisition::Acquisition;
pub use cancel::CancelToken;
pub use config::RigConfig;
pub use consumer::{spawn_consumer, Consumer, ConsumerHandle, PositionFeed};
pub use decoder::FrameDecoder;
pub use device::{list_ports, Rig};
pub use fusion::{FusionConfig, FusionEngine};
pub use pipeline::{AcquisitionReport, Pipeline};
pub use reconcile::Reconciler;
pub use session::{Alignment, Session, SessionExport};
pub use transport::{ByteSource, ReplaySource, SerialSource};

/// Result type alias for treadmill operations.
pub type Result<T> = std::result::Result<T, TreadmillError>;
