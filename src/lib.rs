//! Cam-Zoom-Capture: camera zoom control and one-shot still capture
//!
//! This library maps a continuous zoom value onto hardware zoom ramps and
//! snapshots single frames of a live stream into still images. Hardware sits
//! behind traits, with a V4L2 implementation for real devices and a mock for
//! testing.

pub mod capture;
pub mod config;
pub mod device;
pub mod model;
pub mod session;
pub mod traits;
pub mod validation;
pub mod zoom;

#[cfg(test)]
pub mod mock;

pub use capture::{AspectRatioCache, CaptureGate, FrameConsumer, StillImage};
pub use config::Config;
pub use device::{V4L2Device, V4L2Zoom};
pub use model::CameraModel;
pub use session::{CaptureSession, SessionEvent};
pub use traits::{
    CameraDevice, CameraError, CaptureStream, ConfigurationGuard, DeviceCapabilities, Format,
    FourCC, Frame, FrameMetadata, LensDescriptor, LensType, ZoomControl,
};
pub use zoom::{compute_range, compute_standard_zoom, ZoomController, ZoomRange, ZoomState};
