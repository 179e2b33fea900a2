//! Foreground camera state for a UI to render.
//!
//! [`CameraModel`] owns everything user-visible: the zoom range and selected
//! factor, the displayed still and the preview aspect ratio. A UI reads it,
//! calls its actions, and calls [`CameraModel::poll`] to pick up what the
//! capture worker produced.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::capture::{CaptureGate, StillImage};
use crate::config::StreamConfig;
use crate::session::{CaptureSession, SessionEvent};
use crate::traits::{CameraDevice, Result, ZoomControl};
use crate::zoom::{ZoomController, ZoomRange};

/// Aspect ratio used for the preview before any frame was seen.
pub const DEFAULT_PREVIEW_ASPECT_RATIO: f64 = 1.0;

/// User-visible camera state.
pub struct CameraModel<Z: ZoomControl> {
    zoom: ZoomController<Z>,
    gate: Arc<CaptureGate>,
    session: Option<CaptureSession>,
    image: Option<StillImage>,
    aspect_ratio: Option<f64>,
}

impl<Z: ZoomControl> CameraModel<Z> {
    /// Create a model around `zoom`, capturing stills through `gate`.
    pub const fn new(zoom: ZoomController<Z>, gate: Arc<CaptureGate>) -> Self {
        Self {
            zoom,
            gate,
            session: None,
            image: None,
            aspect_ratio: None,
        }
    }

    /// Start capturing from `device`. Does nothing if a session is running.
    pub fn start_session<D>(&mut self, device: D, stream: &StreamConfig) -> Result<()>
    where
        D: CameraDevice + Send + 'static,
    {
        if self.is_running() {
            debug!("Capture session already running");
            return Ok(());
        }
        let format = stream.format()?;
        let session =
            CaptureSession::start(device, Arc::clone(&self.gate), format, stream.buffer_count)?;
        self.session = Some(session);
        Ok(())
    }

    /// Stop the capture session, if any.
    pub fn stop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }

    /// Whether a capture session is running.
    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(CaptureSession::is_running)
    }

    /// Apply everything the capture worker reported since the last poll.
    pub fn poll(&mut self) {
        let Some(session) = &self.session else {
            return;
        };

        let mut started = false;
        while let Some(event) = session.try_recv_event() {
            match event {
                SessionEvent::Started { .. } => started = true,
                SessionEvent::AspectRatio(ratio) => {
                    debug!(ratio, "Preview aspect ratio");
                    self.aspect_ratio = Some(ratio);
                }
                SessionEvent::Stopped { reason: Some(reason) } => {
                    warn!("Capture stopped: {reason}");
                }
                SessionEvent::Stopped { reason: None } => info!("Capture stopped"),
            }
        }
        if let Some(still) = session.try_recv_still() {
            self.image = Some(still);
        }

        if started {
            self.zoom.reset_to_standard();
        }
    }

    /// Select a zoom factor and ramp the hardware towards it.
    pub fn set_linear_zoom(&mut self, factor: f64) {
        self.zoom.set_linear_factor(factor);
    }

    /// Read the hardware zoom back into the selected factor.
    pub fn sync_zoom(&mut self) -> Option<f64> {
        self.zoom.reconcile()
    }

    /// Capture the next frame as a still image.
    ///
    /// Any displayed still is dropped, so [`CameraModel::image`] returns
    /// `None` until the new one arrives.
    pub fn capture_image_once(&mut self) {
        self.image = None;
        self.gate.arm();
    }

    /// Drop the displayed still, returning to the live preview.
    pub fn dismiss_image(&mut self) {
        self.image = None;
    }

    /// The displayed still, if any.
    pub const fn image(&self) -> Option<&StillImage> {
        self.image.as_ref()
    }

    /// Aspect ratio (height/width) for laying out the live preview.
    pub fn preview_aspect_ratio(&self) -> f64 {
        self.aspect_ratio.unwrap_or(DEFAULT_PREVIEW_ASPECT_RATIO)
    }

    /// Zoom range for the slider.
    pub const fn zoom_range(&self) -> &ZoomRange {
        self.zoom.range()
    }

    /// Selected zoom factor for the slider.
    pub const fn linear_zoom(&self) -> f64 {
        self.zoom.linear_factor()
    }

    /// The zoom controller.
    pub const fn zoom(&self) -> &ZoomController<Z> {
        &self.zoom
    }
}
