use crate::cancel::CancelToken;
use crate::config::RigConfig;
use crate::consumer::PositionFeed;
use crate::pipeline::{AcquisitionReport, LiveCounters, Pipeline};
use crate::transport::ByteSource;
use crate::types::ChannelCounts;
use crate::{Result, TreadmillError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// Handle to a running acquisition.
///
/// The producer thread owns the byte source and the session. Consumers see
/// live data only through the position feed and the counters; the session
/// itself comes back through [`Acquisition::finish`] once the thread has
/// exited, so the connection is never closed under a half-read frame.
pub struct Acquisition {
    feed: PositionFeed,
    counters: Arc<LiveCounters>,
    cancel: CancelToken,
    done: Receiver<()>,
    thread: Option<std::thread::JoinHandle<AcquisitionReport>>,
}

impl Acquisition {
    /// Start the acquisition thread on `source`.
    pub fn start<S>(source: S, config: &RigConfig) -> Result<Acquisition>
    where
        S: ByteSource + 'static,
    {
        Self::start_with_cancel(source, config, CancelToken::new())
    }

    /// Start the acquisition thread, stopping when `cancel` fires.
    ///
    /// Share the token with preview and plot consumers so a single
    /// cancellation winds down the whole session.
    pub fn start_with_cancel<S>(
        source: S,
        config: &RigConfig,
        cancel: CancelToken,
    ) -> Result<Acquisition>
    where
        S: ByteSource + 'static,
    {
        let (feed_tx, feed_rx) = crossbeam_channel::unbounded();
        // Nothing is ever sent: the sender dropping marks the loop as done.
        let (done_tx, done) = crossbeam_channel::bounded::<()>(0);
        let counters = Arc::new(LiveCounters::default());

        let pipeline = Pipeline::new(source, config.layout, config.fusion)
            .with_position_feed(feed_tx)
            .with_counters(counters.clone())
            .with_idle_wait(config.poll_timeout);
        let worker_cancel = cancel.clone();

        let thread = std::thread::Builder::new()
            .name("treadmill-acquisition".into())
            .spawn(move || {
                let report = pipeline.run(&worker_cancel);
                drop(done_tx);
                report
            })
            .map_err(|e| TreadmillError::Spawn(format!("acquisition thread: {}", e)))?;

        Ok(Acquisition {
            feed: PositionFeed::new(feed_rx),
            counters,
            cancel,
            done,
            thread: Some(thread),
        })
    }

    /// Live-plot feed. Every clone drains the same queue.
    pub fn position_feed(&self) -> PositionFeed {
        self.feed.clone()
    }

    /// Per-channel counts recorded so far.
    pub fn counts(&self) -> ChannelCounts {
        self.counters.snapshot()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Ask the acquisition thread to stop after the frame in progress.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// True once the acquisition thread has left its loop.
    pub fn is_done(&self) -> bool {
        self.wait_done(Duration::ZERO)
    }

    /// Block until the acquisition thread has left its loop or `timeout`
    /// elapses. Returns whether it is done.
    pub fn wait_done(&self, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// Stop acquisition, wait for the thread to exit and hand back what was
    /// recorded.
    pub fn finish(mut self) -> Result<AcquisitionReport> {
        self.cancel.cancel();
        let thread = self.thread.take().ok_or(TreadmillError::StreamStopped)?;
        thread.join().map_err(|_| TreadmillError::StreamStopped)
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAX_VALUE;
    use crate::transport::ReplaySource;
    use std::time::Instant;

    fn config() -> RigConfig {
        RigConfig::default().with_poll_timeout(Duration::from_millis(2))
    }

    fn source(bytes: &[u8]) -> ReplaySource {
        ReplaySource::from_bytes(bytes.to_vec()).with_poll_timeout(Duration::from_millis(2))
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_loop_runs_until_cancelled() {
        let acq = Acquisition::start(source(&[b'1', 0, 0, 0, 7, b'!']), &config()).unwrap();
        assert!(wait_for(|| acq.counts().daq_sync == 1));
        // Terminate does not end the loop; only cancellation does.
        assert!(!acq.wait_done(Duration::from_millis(50)));

        acq.stop();
        assert!(acq.wait_done(Duration::from_secs(5)));
        assert!(acq.is_done());

        let report = acq.finish().unwrap();
        assert!(report.fault.is_none());
        assert_eq!(report.session.daq_sync(), &[7]);
    }

    #[test]
    fn test_connection_fault_ends_loop_with_partial_data() {
        let acq = Acquisition::start(source(&[b'2', 0, 0, 0, 1, b'3', 0]), &config()).unwrap();
        assert!(acq.wait_done(Duration::from_secs(5)));

        let report = acq.finish().unwrap();
        assert!(report.fault.as_ref().is_some_and(|e| e.is_connection_fault()));
        let export = report.session.finalize(MAX_VALUE);
        assert!(!export.is_aligned());
        assert_eq!(export.odor_on_times, vec![1]);
    }

    #[test]
    fn test_shared_token_stops_acquisition() {
        let cancel = CancelToken::new();
        let acq = Acquisition::start_with_cancel(source(&[]), &config(), cancel.clone()).unwrap();
        assert!(!acq.is_done());
        cancel.cancel();
        assert!(acq.wait_done(Duration::from_secs(5)));
    }

    #[test]
    fn test_position_feed_receives_updates() {
        let mut bytes = vec![b'1', 0, 0, 0, 0];
        bytes.extend_from_slice(&[b'4', 0x00, 0x04, 0x00, 0x00, 20, 0, 20, 0]);
        let acq = Acquisition::start(source(&bytes), &config()).unwrap();
        let feed = acq.position_feed();

        let update = feed.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(update.x, 20.0);
        assert_eq!(update.timestamp, 0x0004_0000);

        let report = acq.finish().unwrap();
        assert_eq!(report.session.positions().len(), 1);
    }
}
