//! Background capture worker.
//!
//! The worker owns the device and its stream. Frames flow through a
//! [`FrameConsumer`]; stills it produces are handed to the foreground over a
//! single-slot channel, everything else over an event channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::capture::{AspectRatioCache, FrameConsumer, StillImage};
use crate::traits::{CameraDevice, CameraError, CaptureStream, Format, Result};

/// Something the worker reports to the foreground.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The stream is running in `format`.
    Started {
        /// Format the driver actually applied.
        format: Format,
    },
    /// Aspect ratio (height/width) of the first frame.
    AspectRatio(f64),
    /// The worker exited; `reason` is set when it failed.
    Stopped {
        /// Error that ended the session.
        reason: Option<String>,
    },
}

/// A running capture session.
pub struct CaptureSession {
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    events: Receiver<SessionEvent>,
    stills: Receiver<StillImage>,
}

impl CaptureSession {
    /// Start capturing from `device` on a background thread.
    ///
    /// Returns immediately; device initialization happens on the worker and
    /// is reported with [`SessionEvent::Started`].
    pub fn start<D, C>(
        device: D,
        consumer: Arc<C>,
        format: Format,
        buffer_count: u32,
    ) -> Result<Self>
    where
        D: CameraDevice + Send + 'static,
        C: FrameConsumer + Send + Sync + ?Sized + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (event_tx, events) = mpsc::channel();
        let (still_tx, stills) = mpsc::sync_channel(1);

        let worker = thread::Builder::new()
            .name("capture".to_owned())
            .spawn({
                let running = Arc::clone(&running);
                move || {
                    let reason = run_worker(
                        device,
                        &*consumer,
                        &format,
                        buffer_count,
                        &running,
                        &event_tx,
                        &still_tx,
                    )
                    .err()
                    .map(|err| {
                        warn!("Capture session failed: {err}");
                        err.to_string()
                    });
                    running.store(false, Ordering::Release);
                    let _ = event_tx.send(SessionEvent::Stopped { reason });
                }
            })?;

        Ok(Self {
            running,
            worker: Some(worker),
            events,
            stills,
        })
    }

    /// Whether the worker is still capturing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Next pending event, if any.
    pub fn try_recv_event(&self) -> Option<SessionEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_event_timeout(&self, timeout: Duration) -> Result<SessionEvent> {
        self.events.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => CameraError::Timeout,
            RecvTimeoutError::Disconnected => {
                CameraError::StreamError("capture worker gone".to_owned())
            }
        })
    }

    /// Take the pending still image, if any.
    pub fn try_recv_still(&self) -> Option<StillImage> {
        self.stills.try_recv().ok()
    }

    /// Wait up to `timeout` for a still image.
    pub fn recv_still_timeout(&self, timeout: Duration) -> Option<StillImage> {
        self.stills.recv_timeout(timeout).ok()
    }

    /// Stop the worker and wait for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Capture worker panicked");
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<D, C>(
    mut device: D,
    consumer: &C,
    format: &Format,
    buffer_count: u32,
    running: &AtomicBool,
    events: &mpsc::Sender<SessionEvent>,
    stills: &SyncSender<StillImage>,
) -> Result<()>
where
    D: CameraDevice,
    C: FrameConsumer + ?Sized,
{
    let format = device.set_format(format)?;
    let mut stream = device.create_stream(buffer_count)?;
    info!(
        width = format.width,
        height = format.height,
        fourcc = %format.fourcc,
        "Capture session started"
    );
    let _ = events.send(SessionEvent::Started { format });

    let aspect = AspectRatioCache::new();

    while running.load(Ordering::Acquire) {
        let frame = match stream.next_frame() {
            Ok(frame) => frame,
            Err(CameraError::Timeout) => continue,
            Err(err) => return Err(err),
        };

        if aspect.get().is_none() {
            if let Some(ratio) = aspect.from_first_frame(&frame) {
                let _ = events.send(SessionEvent::AspectRatio(ratio));
            }
        }

        if let Some(still) = consumer.consume(&frame) {
            match stills.try_send(still) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!(
                        sequence = frame.metadata.sequence,
                        "Still dropped, previous one not taken"
                    );
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }

    info!("Capture session stopped");
    Ok(())
}
