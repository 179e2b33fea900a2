//! One-shot still capture from the live frame stream.
//!
//! The [`CaptureGate`] sits on the frame path. It lets frames pass untouched
//! until armed, then turns the next frame into a [`StillImage`] and disarms
//! itself whether or not the conversion worked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use image::{ImageFormat, RgbImage};
use tracing::{debug, warn};

use crate::config::Orientation;
use crate::traits::{CameraError, FourCC, Frame, Result};

/// A still image extracted from one frame.
#[derive(Debug, Clone)]
pub struct StillImage {
    /// RGB pixels.
    pub pixels: RgbImage,
    /// Height divided by width.
    pub aspect_ratio: f64,
}

impl StillImage {
    /// Wrap `pixels`, computing the aspect ratio.
    #[must_use]
    pub fn new(pixels: RgbImage) -> Self {
        let aspect_ratio = aspect_ratio(pixels.width(), pixels.height()).unwrap_or(1.0);
        Self {
            pixels,
            aspect_ratio,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Consumes frames on the capture worker, occasionally producing a still.
pub trait FrameConsumer {
    /// Inspect `frame`; return a still image if one was requested.
    fn consume(&self, frame: &Frame) -> Option<StillImage>;
}

/// Arm-once, fire-once gate for still capture.
#[derive(Debug, Default)]
pub struct CaptureGate {
    armed: AtomicBool,
    orientation: Orientation,
}

impl CaptureGate {
    /// Create a disarmed gate.
    #[must_use]
    pub const fn new(orientation: Orientation) -> Self {
        Self {
            armed: AtomicBool::new(false),
            orientation,
        }
    }

    /// Request a still from the next frame. Arming twice still yields one still.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Release);
    }

    /// Whether a still is pending.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Pass `frame` through the gate.
    ///
    /// Returns `None` when disarmed. When armed, disarms and returns the
    /// still, or `None` if the frame could not be converted.
    pub fn on_frame(&self, frame: &Frame) -> Option<StillImage> {
        if !self.armed.swap(false, Ordering::AcqRel) {
            return None;
        }

        match extract_still(frame, self.orientation) {
            Ok(still) => {
                debug!(
                    sequence = frame.metadata.sequence,
                    width = still.width(),
                    height = still.height(),
                    "Still image captured"
                );
                Some(still)
            }
            Err(err) => {
                warn!(sequence = frame.metadata.sequence, "{err}");
                None
            }
        }
    }
}

impl FrameConsumer for CaptureGate {
    fn consume(&self, frame: &Frame) -> Option<StillImage> {
        self.on_frame(frame)
    }
}

/// Preview aspect ratio, computed from the first frame only.
#[derive(Debug, Default)]
pub struct AspectRatioCache {
    ratio: OnceLock<f64>,
}

impl AspectRatioCache {
    /// Create an empty cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ratio: OnceLock::new(),
        }
    }

    /// Height/width of the first frame seen with non-zero dimensions.
    ///
    /// Later frames return the cached value whatever their size.
    pub fn from_first_frame(&self, frame: &Frame) -> Option<f64> {
        if let Some(ratio) = self.ratio.get() {
            return Some(*ratio);
        }
        let ratio = aspect_ratio(frame.format.width, frame.format.height)?;
        Some(*self.ratio.get_or_init(|| ratio))
    }

    /// The cached ratio, if a frame was seen.
    pub fn get(&self) -> Option<f64> {
        self.ratio.get().copied()
    }
}

fn aspect_ratio(width: u32, height: u32) -> Option<f64> {
    (width > 0).then(|| f64::from(height) / f64::from(width))
}

/// Convert `frame` into an oriented RGB still.
pub fn extract_still(frame: &Frame, orientation: Orientation) -> Result<StillImage> {
    let pixels = frame_to_rgb(frame)?;
    let pixels = match orientation {
        Orientation::Up => pixels,
        Orientation::Right => image::imageops::rotate90(&pixels),
    };
    Ok(StillImage::new(pixels))
}

fn frame_to_rgb(frame: &Frame) -> Result<RgbImage> {
    let format = &frame.format;
    match format.fourcc {
        FourCC::YUYV => yuyv_to_rgb(frame),
        FourCC::RGB3 => {
            let data = packed_rows(frame, 3)?.concat();
            RgbImage::from_raw(format.width, format.height, data).ok_or_else(|| {
                CameraError::FrameConversionFailed("RGB3 frame produced a short image".to_owned())
            })
        }
        FourCC::MJPG => image::load_from_memory_with_format(&frame.data, ImageFormat::Jpeg)
            .map(|decoded| decoded.to_rgb8())
            .map_err(|err| CameraError::FrameConversionFailed(err.to_string())),
        other => Err(CameraError::FrameConversionFailed(format!(
            "unsupported pixel format {other}"
        ))),
    }
}

fn short_buffer(frame: &Frame, expected: usize) -> CameraError {
    CameraError::FrameConversionFailed(format!(
        "frame {} has {} bytes, expected {expected}",
        frame.metadata.sequence,
        frame.data.len()
    ))
}

/// Split a packed frame into its rows, dropping any line padding.
///
/// Rows start every `stride` bytes. A zero stride means the rows are tightly
/// packed at `width * bytes_per_pixel`. The last row needs no padding after it.
fn packed_rows(frame: &Frame, bytes_per_pixel: usize) -> Result<Vec<&[u8]>> {
    let format = &frame.format;
    let height = format.height as usize;
    let row_len = (format.width as usize)
        .checked_mul(bytes_per_pixel)
        .ok_or_else(|| CameraError::FrameConversionFailed("frame row overflows".to_owned()))?;
    let stride = match format.stride as usize {
        0 => row_len,
        stride => stride,
    };
    if stride < row_len {
        return Err(CameraError::FrameConversionFailed(format!(
            "stride {stride} is shorter than a {row_len} byte row"
        )));
    }
    if height == 0 {
        return Ok(Vec::new());
    }

    let needed = stride
        .checked_mul(height - 1)
        .and_then(|offset| offset.checked_add(row_len))
        .ok_or_else(|| CameraError::FrameConversionFailed("frame size overflows".to_owned()))?;
    if frame.data.len() < needed {
        return Err(short_buffer(frame, needed));
    }

    (0..height)
        .map(|row| {
            let start = row * stride;
            frame
                .data
                .get(start..start + row_len)
                .ok_or_else(|| short_buffer(frame, needed))
        })
        .collect()
}

fn yuyv_to_rgb(frame: &Frame) -> Result<RgbImage> {
    let (width, height) = (frame.format.width, frame.format.height);
    if width % 2 != 0 {
        return Err(CameraError::FrameConversionFailed(format!(
            "odd YUYV width {width}"
        )));
    }
    let rows = packed_rows(frame, 2)?;

    // YUYV format: [Y0 U Y1 V] repeats, each pair of pixels shares U and V
    let mut rgb = Vec::with_capacity((width as usize) * (height as usize) * 3);
    for row in rows {
        for chunk in row.chunks_exact(4) {
            if let &[y0, u, y1, v] = chunk {
                let (r, g, b) = yuv_to_rgb(y0, u, v);
                rgb.extend_from_slice(&[r, g, b]);
                let (r, g, b) = yuv_to_rgb(y1, u, v);
                rgb.extend_from_slice(&[r, g, b]);
            }
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
        CameraError::FrameConversionFailed("YUYV conversion produced a short image".to_owned())
    })
}

/// Convert YUV values to RGB using the ITU-R BT.601 formula.
#[must_use]
#[allow(clippy::many_single_char_names)]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamp = |val: f32| -> u8 { val.clamp(0.0, 255.0) as u8 };

    (clamp(r), clamp(g), clamp(b))
}
