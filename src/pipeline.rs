use crate::cancel::CancelToken;
use crate::decoder::FrameDecoder;
use crate::fusion::{FusionConfig, FusionEngine};
use crate::session::Session;
use crate::transport::ByteSource;
use crate::types::{
    ChannelCounts, EventKind, PositionUpdate, RawEvent, SensorDeltas, SensorLayout,
};
use crate::{Result, TreadmillError};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What one call to [`Pipeline::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No frame arrived within the source's poll timeout.
    Idle,
    /// A frame was decoded and dispatched.
    Dispatched(EventKind),
    /// A Terminate frame arrived; dispatching has stopped.
    Terminated,
    /// Dispatching stopped earlier; nothing was read.
    Inactive,
}

/// Per-channel event counts readable from other threads while the
/// acquisition loop is running.
#[derive(Debug, Default)]
pub struct LiveCounters {
    daq_sync: AtomicUsize,
    odor_on: AtomicUsize,
    odor_off: AtomicUsize,
    motion: AtomicUsize,
    unknown: AtomicUsize,
}

impl LiveCounters {
    pub fn record(&self, kind: EventKind) {
        let counter = match kind {
            EventKind::DaqSync => &self.daq_sync,
            EventKind::OdorOn => &self.odor_on,
            EventKind::OdorOff => &self.odor_off,
            EventKind::Motion => &self.motion,
            EventKind::Unknown => &self.unknown,
            EventKind::Terminate => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ChannelCounts {
        ChannelCounts {
            daq_sync: self.daq_sync.load(Ordering::Relaxed),
            odor_on: self.odor_on.load(Ordering::Relaxed),
            odor_off: self.odor_off.load(Ordering::Relaxed),
            motion: self.motion.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
        }
    }
}

/// Session contents plus the fault that ended the loop, if any.
///
/// A connection fault keeps everything recorded up to that point, so the
/// session can still be finalized and exported.
#[derive(Debug)]
pub struct AcquisitionReport {
    pub session: Session,
    pub fault: Option<TreadmillError>,
}

/// The decode-and-dispatch loop.
///
/// Owns the byte source and the session buffers. Timestamp frames go
/// straight to their channel; motion frames also go through the fusion
/// engine (dual-sensor rigs) or are stored as raw deltas (single-sensor
/// rigs). A Terminate frame stops dispatching, but the loop keeps running
/// until it is cancelled.
pub struct Pipeline<S: ByteSource> {
    source: S,
    decoder: FrameDecoder,
    engine: FusionEngine,
    session: Session,
    active: bool,
    feed: Option<Sender<PositionUpdate>>,
    counters: Arc<LiveCounters>,
    idle_wait: Duration,
}

impl<S: ByteSource> Pipeline<S> {
    pub fn new(source: S, layout: SensorLayout, fusion: FusionConfig) -> Self {
        Self {
            source,
            decoder: FrameDecoder::new(layout),
            engine: FusionEngine::new(fusion),
            session: Session::new(layout),
            active: true,
            feed: None,
            counters: Arc::new(LiveCounters::default()),
            idle_wait: Duration::from_millis(100),
        }
    }

    /// Send live-plot points to `feed`.
    pub fn with_position_feed(mut self, feed: Sender<PositionUpdate>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_counters(mut self, counters: Arc<LiveCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// How long the loop sleeps per iteration once dispatching has stopped.
    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    pub fn counters(&self) -> Arc<LiveCounters> {
        self.counters.clone()
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Decode and dispatch at most one frame.
    pub fn step(&mut self) -> Result<Step> {
        if !self.active {
            return Ok(Step::Inactive);
        }

        let Some(event) = self.decoder.next_event(&mut self.source)? else {
            return Ok(Step::Idle);
        };
        Ok(self.dispatch(event))
    }

    /// Run until `cancel` fires or the connection fails.
    pub fn run(mut self, cancel: &CancelToken) -> AcquisitionReport {
        let mut fault = None;

        log::info!("Acquisition loop started ({:?} sensors)", self.session.layout());
        while !cancel.is_cancelled() {
            match self.step() {
                Ok(Step::Inactive) => std::thread::sleep(self.idle_wait),
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Acquisition aborted by connection fault: {}", e);
                    fault = Some(e);
                    break;
                }
            }
        }

        let counts = self.session.counts();
        log::info!(
            "Acquisition loop stopped: {} DAQ sync, {} odor on, {} odor off, {} motion, {} unknown",
            counts.daq_sync,
            counts.odor_on,
            counts.odor_off,
            counts.motion,
            counts.unknown
        );

        AcquisitionReport {
            session: self.session,
            fault,
        }
    }

    fn dispatch(&mut self, event: RawEvent) -> Step {
        let kind = event.kind();
        match event {
            RawEvent::DaqSync(t) => {
                log::debug!("DAQ sync at {}", t);
                self.session.push_daq_sync(t);
            }
            RawEvent::OdorOn(t) => {
                log::debug!("Odor on at {}", t);
                self.session.push_odor_on(t);
            }
            RawEvent::OdorOff(t) => {
                log::debug!("Odor off at {}", t);
                self.session.push_odor_off(t);
            }
            RawEvent::Motion(sample) => {
                self.session.push_motion(sample.timestamp);
                match sample.deltas {
                    SensorDeltas::Single { dx, dy } => self.session.push_deltas(dx, dy),
                    SensorDeltas::Dual { dx1, dy1, dx2, dy2 } => {
                        let deltas = [dx1, dy1, dx2, dy2];
                        if let Some(outcome) = self.engine.ingest(sample.timestamp, deltas) {
                            if let Some(position) = outcome.history_sample() {
                                self.session.push_position(position);
                            }
                            let update = outcome.plot_update();
                            if let (Some(update), Some(feed)) = (update, &self.feed) {
                                // The plot going away never stops acquisition.
                                if feed.send(update).is_err() {
                                    log::trace!("Position feed has no receiver");
                                }
                            }
                        }
                    }
                }
            }
            RawEvent::Terminate => {
                log::info!("Terminate received; no further frames will be recorded");
                self.active = false;
                return Step::Terminated;
            }
            RawEvent::Unknown(_) => self.session.note_unknown(),
        }
        self.counters.record(kind);
        Step::Dispatched(kind)
    }
}
