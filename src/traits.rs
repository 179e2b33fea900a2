//! Core traits and types for the camera and zoom hardware abstraction.

use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::time::Duration;

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");

    /// Bytes per pixel for packed formats, `None` for compressed ones.
    #[must_use]
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            Self::YUYV => Some(2),
            Self::RGB3 => Some(3),
            _ => None,
        }
    }
}

impl FromStr for FourCC {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| CameraError::Config(format!("invalid fourcc {s:?}")))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride), 0 for compressed formats.
    pub stride: u32,
    /// Total frame size in bytes, 0 when the driver decides.
    pub size: u32,
}

impl Format {
    /// Create a new format specification.
    #[must_use]
    pub fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = width.saturating_mul(fourcc.bytes_per_pixel().unwrap_or(0));
        let size = stride.saturating_mul(height);
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// A captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data.
    pub data: Vec<u8>,
    /// Format the frame was captured in.
    pub format: Format,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

/// Physical lens kind in a multi-lens camera assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LensType {
    /// Ultra-wide angle lens.
    UltraWide,
    /// Primary wide angle lens.
    Wide,
    /// Telephoto lens.
    Telephoto,
    /// Anything else the hardware reports.
    Other,
}

/// One constituent lens, as reported by the hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct LensDescriptor {
    /// Lens kind.
    pub lens_type: LensType,
    /// Zoom factor at which the assembly switches onto this lens.
    pub switch_over_threshold: Option<f64>,
}

impl LensDescriptor {
    /// Create a descriptor without a switch-over threshold.
    #[must_use]
    pub const fn new(lens_type: LensType) -> Self {
        Self {
            lens_type,
            switch_over_threshold: None,
        }
    }
}

/// Error type for camera operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// Device with given index was not found.
    #[error("Device {0} not found")]
    DeviceNotFound(u32),
    /// Failed to open device.
    #[error("Failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// No usable capture or zoom hardware.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    /// Requested format is not supported.
    #[error("Format not supported: {0:?}")]
    FormatNotSupported(Format),
    /// The configuration lock could not be acquired.
    #[error("Configuration lock failed: {0}")]
    ConfigurationLockFailed(String),
    /// A frame could not be turned into a still image.
    #[error("Frame conversion failed: {0}")]
    FrameConversionFailed(String),
    /// Error during streaming operation.
    #[error("Stream error: {0}")]
    StreamError(String),
    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// Abstraction over camera device operations.
pub trait CameraDevice {
    /// The stream type returned by `create_stream`.
    type Stream<'a>: CaptureStream
    where
        Self: 'a;

    /// The zoom collaborator returned by `zoom_control`.
    type Zoom: ZoomControl;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Get current format.
    fn format(&self) -> Result<Format>;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Create a capture stream with the specified number of buffers.
    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>>;

    /// Get a handle for driving the device's zoom.
    fn zoom_control(&self) -> Result<Self::Zoom>;
}

/// Abstraction over capture stream operations.
pub trait CaptureStream {
    /// Capture the next frame from the stream.
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Abstraction over the hardware zoom of one capture device.
///
/// Ramp commands must be bracketed by `lock_for_configuration` and
/// `unlock_for_configuration`; use [`ConfigurationGuard`] to keep the
/// bracket balanced.
pub trait ZoomControl {
    /// Constituent lenses in physical zoom order.
    fn lenses(&self) -> &[LensDescriptor];

    /// Factors at which the active lens changes, in zoom order.
    fn switch_over_factors(&self) -> &[f64];

    /// Raw `(min, max)` zoom factors supported by the hardware.
    fn zoom_bounds(&self) -> (f64, f64);

    /// Zoom factor the hardware is currently at.
    fn zoom_factor(&self) -> Result<f64>;

    /// Acquire exclusive access to the device configuration.
    fn lock_for_configuration(&mut self) -> Result<()>;

    /// Release the configuration lock.
    fn unlock_for_configuration(&mut self);

    /// Stop any in-flight ramp where it currently is.
    fn cancel_zoom_ramp(&mut self);

    /// Start a smooth transition towards `factor` at `rate` factor-units/second.
    fn ramp_to_zoom(&mut self, factor: f64, rate: f64) -> Result<()>;
}

/// Holds the configuration lock of a [`ZoomControl`] until dropped.
pub struct ConfigurationGuard<'a, Z: ZoomControl + ?Sized> {
    control: &'a mut Z,
}

impl<'a, Z: ZoomControl + ?Sized> ConfigurationGuard<'a, Z> {
    /// Lock `control` for configuration.
    pub fn acquire(control: &'a mut Z) -> Result<Self> {
        control.lock_for_configuration()?;
        Ok(Self { control })
    }
}

impl<Z: ZoomControl + ?Sized> Deref for ConfigurationGuard<'_, Z> {
    type Target = Z;

    fn deref(&self) -> &Z {
        self.control
    }
}

impl<Z: ZoomControl + ?Sized> DerefMut for ConfigurationGuard<'_, Z> {
    fn deref_mut(&mut self) -> &mut Z {
        self.control
    }
}

impl<Z: ZoomControl + ?Sized> Drop for ConfigurationGuard<'_, Z> {
    fn drop(&mut self) {
        self.control.unlock_for_configuration();
    }
}
