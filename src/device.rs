//! V4L2 device implementation using the v4l crate.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::control::{Control, Description, Flags, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as V4lCaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::traits::{
    CameraDevice, CameraError, CaptureStream, DeviceCapabilities, Format, FourCC, Frame,
    FrameMetadata, LensDescriptor, LensType, Result, ZoomControl,
};

const V4L2_CID_CAMERA_CLASS_BASE: u32 = 0x009a_0900;

/// Absolute zoom control (camera class).
pub const V4L2_CID_ZOOM_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 13;

/// Raw `ZOOM_ABSOLUTE` units per zoom factor (UVC cameras report 100 = 1x).
const ZOOM_UNITS_PER_FACTOR: f64 = 100.0;

/// Interval between control writes while ramping.
const RAMP_TICK: Duration = Duration::from_millis(33);

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4L2Device {
    device: Device,
    path: PathBuf,
    capabilities: DeviceCapabilities,
}

impl V4L2Device {
    /// Open a V4L2 device by index (e.g., 0 for /dev/video0).
    pub fn open(index: u32) -> Result<Self> {
        let path = PathBuf::from(format!("/dev/video{index}"));
        if !path.exists() {
            return Err(CameraError::DeviceNotFound(index));
        }
        Self::with_path(path)
    }

    /// Open a V4L2 device by path.
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let device = Device::with_path(&path)
            .map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))?;

        let caps = device
            .query_caps()
            .map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };

        Ok(Self {
            device,
            path,
            capabilities,
        })
    }

    /// Open the first streaming capture device among `/dev/video0..limit`.
    pub fn first_available(limit: u32) -> Result<Self> {
        for index in 0..limit {
            let device = match Self::open(index) {
                Ok(device) => device,
                Err(CameraError::DeviceNotFound(_)) => continue,
                Err(err) => {
                    debug!(index, "Skipping device: {err}");
                    continue;
                }
            };

            let caps = device.capabilities();
            info!(
                index,
                card = %caps.card,
                driver = %caps.driver,
                can_capture = caps.can_capture,
                can_stream = caps.can_stream,
                "Capture device candidate"
            );
            if caps.can_capture && caps.can_stream {
                return Ok(device);
            }
        }

        Err(CameraError::DeviceUnavailable(format!(
            "no capture device among /dev/video0..{limit}"
        )))
    }

    /// Device node path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CameraDevice for V4L2Device {
    type Stream<'a> = V4L2Stream<'a>;
    type Zoom = V4L2Zoom;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        let fmt = self
            .device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        Ok(Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        })
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let mut fmt = self
            .device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();

        let fmt = self
            .device
            .set_format(&fmt)
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        if FourCC::from(fmt.fourcc) != format.fourcc {
            return Err(CameraError::FormatNotSupported(format.clone()));
        }

        Ok(Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        })
    }

    fn create_stream(&mut self, buffer_count: u32) -> Result<Self::Stream<'_>> {
        let format = self.format()?;
        let stream = Stream::with_buffers(&self.device, Type::VideoCapture, buffer_count)
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        Ok(V4L2Stream { stream, format })
    }

    fn zoom_control(&self) -> Result<V4L2Zoom> {
        let description = find_zoom_control(&self.device)?;
        Ok(V4L2Zoom::new(self.path.clone(), &description))
    }
}

/// V4L2 capture stream wrapping mmap-based streaming.
pub struct V4L2Stream<'a> {
    stream: Stream<'a>,
    format: Format,
}

impl CaptureStream for V4L2Stream<'_> {
    fn next_frame(&mut self) -> Result<Frame> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        // V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        let used = buf.len().min(meta.bytesused as usize);
        let data = buf.get(..used).unwrap_or(buf).to_vec();

        Ok(Frame {
            data,
            format: self.format.clone(),
            metadata: FrameMetadata {
                sequence: meta.sequence,
                timestamp: Duration::new(secs, nanos),
                bytes_used: meta.bytesused,
            },
        })
    }
}

fn find_zoom_control(device: &Device) -> Result<Description> {
    device
        .query_controls()
        .map_err(|err| CameraError::DeviceUnavailable(err.to_string()))?
        .into_iter()
        .find(|desc| desc.id == V4L2_CID_ZOOM_ABSOLUTE)
        .ok_or_else(|| CameraError::DeviceUnavailable("no ZOOM_ABSOLUTE control".to_owned()))
}

fn open_path(path: &Path) -> Result<Device> {
    Device::with_path(path).map_err(|err| CameraError::DeviceOpenFailed(err.to_string()))
}

#[allow(clippy::cast_precision_loss)]
fn units_to_factor(units: i64) -> f64 {
    units as f64 / ZOOM_UNITS_PER_FACTOR
}

#[allow(clippy::cast_possible_truncation)]
fn factor_to_units(factor: f64, min: i64, max: i64) -> i64 {
    ((factor * ZOOM_UNITS_PER_FACTOR).round() as i64).clamp(min, max)
}

/// Zoom of a V4L2 camera through `V4L2_CID_ZOOM_ABSOLUTE`.
///
/// A V4L2 node exposes a single lens. The driver has no ramp of its own, so
/// ramps run on a worker thread that steps the control towards the target.
pub struct V4L2Zoom {
    path: PathBuf,
    min: i64,
    max: i64,
    step: i64,
    lenses: Vec<LensDescriptor>,
    handle: Option<Device>,
    ramp: Option<Ramp>,
}

struct Ramp {
    cancel: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl V4L2Zoom {
    fn new(path: PathBuf, description: &Description) -> Self {
        Self {
            path,
            min: description.minimum,
            max: description.maximum,
            step: i64::try_from(description.step).unwrap_or(1).max(1),
            lenses: vec![LensDescriptor::new(LensType::Wide)],
            handle: None,
            ramp: None,
        }
    }
}

impl ZoomControl for V4L2Zoom {
    fn lenses(&self) -> &[LensDescriptor] {
        &self.lenses
    }

    fn switch_over_factors(&self) -> &[f64] {
        &[]
    }

    fn zoom_bounds(&self) -> (f64, f64) {
        (units_to_factor(self.min), units_to_factor(self.max))
    }

    fn zoom_factor(&self) -> Result<f64> {
        let device = open_path(&self.path)?;
        read_units(&device).map(units_to_factor)
    }

    fn lock_for_configuration(&mut self) -> Result<()> {
        let device = open_path(&self.path)?;
        let description = find_zoom_control(&device)?;
        let busy = Flags::GRABBED | Flags::DISABLED | Flags::READ_ONLY;
        if description.flags.intersects(busy) {
            return Err(CameraError::ConfigurationLockFailed(format!(
                "zoom control unavailable ({:?})",
                description.flags
            )));
        }
        self.handle = Some(device);
        Ok(())
    }

    fn unlock_for_configuration(&mut self) {
        self.handle = None;
    }

    fn cancel_zoom_ramp(&mut self) {
        if let Some(ramp) = self.ramp.take() {
            ramp.cancel.store(true, Ordering::Release);
            if ramp.worker.join().is_err() {
                warn!("Zoom ramp worker panicked");
            }
        }
    }

    fn ramp_to_zoom(&mut self, factor: f64, rate: f64) -> Result<()> {
        let device = self.handle.as_ref().ok_or_else(|| {
            CameraError::ConfigurationLockFailed("ramp issued without lock".to_owned())
        })?;

        let start = read_units(device)?;
        let target = factor_to_units(factor, self.min, self.max);
        let per_tick = ramp_step(rate, self.step);

        let cancel = Arc::new(AtomicBool::new(false));
        let path = self.path.clone();
        let worker = thread::Builder::new().name("zoom-ramp".to_owned()).spawn({
            let cancel = Arc::clone(&cancel);
            move || run_ramp(&path, start, target, per_tick, &cancel)
        })?;

        debug!(from = start, to = target, per_tick, "Zoom ramp started");
        self.ramp = Some(Ramp { cancel, worker });
        Ok(())
    }
}

impl Drop for V4L2Zoom {
    fn drop(&mut self) {
        self.cancel_zoom_ramp();
    }
}

fn read_units(device: &Device) -> Result<i64> {
    match device.control(V4L2_CID_ZOOM_ABSOLUTE)?.value {
        Value::Integer(units) => Ok(units),
        other => Err(CameraError::StreamError(format!(
            "unexpected zoom control value {other:?}"
        ))),
    }
}

/// Raw units to move per ramp tick at `rate` factor-units per second.
///
/// Never less than the control's `step`, and always at least one unit so a
/// ramp makes progress.
fn ramp_step(rate: f64, step: i64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let per_tick = (rate * ZOOM_UNITS_PER_FACTOR * RAMP_TICK.as_secs_f64()) as i64;
    per_tick.max(step).max(1)
}

/// Move `current` one tick towards `target` without overshooting it.
fn next_units(current: i64, target: i64, per_tick: i64) -> i64 {
    if current < target {
        current.saturating_add(per_tick).min(target)
    } else {
        current.saturating_sub(per_tick).max(target)
    }
}

fn run_ramp(path: &Path, start: i64, target: i64, per_tick: i64, cancel: &AtomicBool) {
    let device = match open_path(path) {
        Ok(device) => device,
        Err(err) => {
            warn!("Zoom ramp aborted: {err}");
            return;
        }
    };

    let write = |units| {
        let control = Control {
            id: V4L2_CID_ZOOM_ABSOLUTE,
            value: Value::Integer(units),
        };
        device.set_control(control).map_err(CameraError::from)
    };
    if let Err(err) = step_towards(start, target, per_tick, cancel, write) {
        warn!("Failed to set zoom: {err}");
    }
}

/// Write successive unit values from `start` to `target`, one per tick,
/// until the target is written or `cancel` is set.
fn step_towards<F>(
    start: i64,
    target: i64,
    per_tick: i64,
    cancel: &AtomicBool,
    mut write: F,
) -> Result<()>
where
    F: FnMut(i64) -> Result<()>,
{
    let mut current = start;
    while current != target && !cancel.load(Ordering::Acquire) {
        current = next_units(current, target, per_tick);
        write(current)?;
        if current != target {
            thread::sleep(RAMP_TICK);
        }
    }
    Ok(())
}
