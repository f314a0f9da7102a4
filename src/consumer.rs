use crate::cancel::CancelToken;
use crate::types::PositionUpdate;
use crate::{Result, TreadmillError};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default pause between render cycles.
pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(20);

/// Receiving end of the live-plot position stream.
#[derive(Debug, Clone)]
pub struct PositionFeed {
    receiver: Receiver<PositionUpdate>,
}

impl PositionFeed {
    pub(crate) fn new(receiver: Receiver<PositionUpdate>) -> Self {
        Self { receiver }
    }

    /// Take every point queued since the last drain.
    pub fn drain(&self) -> Vec<PositionUpdate> {
        self.receiver.try_iter().collect()
    }

    /// Wait for the next point.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<PositionUpdate> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => TreadmillError::Timeout,
            RecvTimeoutError::Disconnected => TreadmillError::StreamStopped,
        })
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

/// A display collaborator (camera preview, live plot) driven on its own
/// thread.
///
/// A failing or panicking `render` is logged and the next cycle runs as
/// usual; it never reaches the acquisition thread.
pub trait Consumer: Send + 'static {
    fn name(&self) -> &str;

    fn render(&mut self) -> Result<()>;
}

/// Handle to a consumer thread.
pub struct ConsumerHandle {
    name: String,
    cycles: Arc<AtomicUsize>,
    faults: Arc<AtomicUsize>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ConsumerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render cycles that completed without a fault.
    pub fn cycles(&self) -> usize {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn faults(&self) -> usize {
        self.faults.load(Ordering::Relaxed)
    }

    /// Wait for the thread to exit. It only exits once its token is cancelled.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Consumer '{}' panicked", self.name);
            }
        }
    }
}

/// Run `consumer` every `interval` until `cancel` fires.
pub fn spawn_consumer<C: Consumer>(
    mut consumer: C,
    interval: Duration,
    cancel: CancelToken,
) -> Result<ConsumerHandle> {
    let name = consumer.name().to_string();
    let cycles = Arc::new(AtomicUsize::new(0));
    let faults = Arc::new(AtomicUsize::new(0));
    let (thread_cycles, thread_faults) = (cycles.clone(), faults.clone());

    let thread = std::thread::Builder::new()
        .name(format!("treadmill-{}", name))
        .spawn(move || {
            while !cancel.is_cancelled() {
                std::thread::sleep(interval);
                if cancel.is_cancelled() {
                    break;
                }
                match panic::catch_unwind(AssertUnwindSafe(|| consumer.render())) {
                    Ok(Ok(())) => {
                        thread_cycles.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Err(e)) => {
                        thread_faults.fetch_add(1, Ordering::Relaxed);
                        log::warn!("Couldn't render {}: {}", consumer.name(), e);
                    }
                    Err(payload) => {
                        thread_faults.fetch_add(1, Ordering::Relaxed);
                        log::error!(
                            "Consumer '{}' panicked: {}",
                            consumer.name(),
                            panic_message(payload.as_ref())
                        );
                    }
                }
            }
            log::debug!("Consumer '{}' stopped", consumer.name());
        })
        .map_err(|e| TreadmillError::Spawn(format!("consumer '{}': {}", name, e)))?;

    Ok(ConsumerHandle {
        name,
        cycles,
        faults,
        thread: Some(thread),
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
