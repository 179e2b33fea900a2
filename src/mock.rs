//! Mock device implementation for testing without hardware.

use crate::traits::{
    CameraDevice, CameraError, CaptureStream, DeviceCapabilities, Format, FourCC, Frame,
    FrameMetadata, LensDescriptor, LensType, Result, ZoomControl,
};
use std::time::Duration;

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    frame_count: u32,
    pattern: TestPattern,
    frame_interval: Duration,
    zoom: Option<MockZoom>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(640, 480, FourCC::YUYV),
            frame_count: 0,
            pattern: TestPattern::ColorBars,
            frame_interval: Duration::ZERO,
            zoom: Some(MockZoom::new()),
        }
    }

    /// Set the format for this mock device.
    #[must_use]
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Set the test pattern streams start with.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Sleep this long before delivering each frame.
    #[must_use]
    pub const fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Set the zoom hardware handed out by `zoom_control`.
    #[must_use]
    pub fn with_zoom(mut self, zoom: Option<MockZoom>) -> Self {
        self.zoom = zoom;
        self
    }
}

impl CameraDevice for MockDevice {
    type Stream<'a> = MockStream<'a>;
    type Zoom = MockZoom;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        self.format = format.clone();
        Ok(self.format.clone())
    }

    fn create_stream(&mut self, _buffer_count: u32) -> Result<Self::Stream<'_>> {
        let pattern = self.pattern;
        Ok(MockStream {
            device: self,
            pattern,
        })
    }

    fn zoom_control(&self) -> Result<MockZoom> {
        self.zoom
            .clone()
            .ok_or_else(|| CameraError::DeviceUnavailable("mock has no zoom".to_owned()))
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
    /// Buffer too short for the format.
    Truncated,
}

/// Mock capture stream for testing.
pub struct MockStream<'a> {
    device: &'a mut MockDevice,
    pattern: TestPattern,
}

impl MockStream<'_> {
    /// Set the test pattern for frame generation.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }
}

impl CaptureStream for MockStream<'_> {
    fn next_frame(&mut self) -> Result<Frame> {
        if !self.device.frame_interval.is_zero() {
            std::thread::sleep(self.device.frame_interval);
        }

        let format = self.device.format.clone();
        let data = generate_test_frame(&format, self.pattern);

        let seq = self.device.frame_count;
        self.device.frame_count += 1;

        #[allow(clippy::cast_possible_truncation)]
        let bytes_used = data.len() as u32;

        Ok(Frame {
            data,
            format,
            metadata: FrameMetadata {
                sequence: seq,
                timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
                bytes_used,
            },
        })
    }
}

/// Generate test frame data based on pattern.
fn generate_test_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    let size = (format.width * format.height * 2) as usize; // YUYV = 2 bytes/pixel

    if let TestPattern::Truncated = pattern {
        return vec![0u8; size / 2];
    }

    let mut data = vec![0u8; size];

    match pattern {
        TestPattern::ColorBars => {
            generate_color_bars(&mut data, format.width, format.height);
        }
        TestPattern::Gradient => {
            generate_gradient(&mut data, format.width, format.height);
        }
        TestPattern::Solid(y, u, v) => {
            generate_solid(&mut data, y, u, v);
        }
        TestPattern::Truncated => {}
    }

    data
}

/// Write one YUYV macropixel (two pixels sharing U and V) at `offset`.
///
/// Writes nothing if the macropixel would run past the end of `data`.
fn write_pair(data: &mut [u8], offset: usize, luma: u8, u: u8, v: u8) {
    if let Some([y0, cb, y1, cr]) = data.get_mut(offset..offset + 4) {
        *y0 = luma; // Y0
        *cb = u; // U
        *y1 = luma; // Y1
        *cr = v; // V
    }
}

/// Generate YUYV color bars pattern.
fn generate_color_bars(data: &mut [u8], width: u32, height: u32) {
    // 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    let bars: [(u8, u8, u8); 8] = [
        (235, 128, 128), // White
        (210, 16, 146),  // Yellow
        (170, 166, 16),  // Cyan
        (145, 54, 34),   // Green
        (106, 202, 222), // Magenta
        (81, 90, 240),   // Red
        (41, 240, 110),  // Blue
        (16, 128, 128),  // Black
    ];

    let bar_width = (width / 8).max(1);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let bar_idx = (x / bar_width).min(7) as usize;
            let (luma, u, v) = bars[bar_idx];
            write_pair(data, ((y * width + x) * 2) as usize, luma, u, v);
        }
    }
}

/// Generate YUYV horizontal gradient pattern, neutral chroma throughout.
fn generate_gradient(data: &mut [u8], width: u32, height: u32) {
    for y in 0..height {
        for x in (0..width).step_by(2) {
            #[allow(clippy::cast_possible_truncation)]
            let luma = ((x * 255) / width) as u8;
            write_pair(data, ((y * width + x) * 2) as usize, luma, 128, 128);
        }
    }
}

/// Generate solid color YUYV frame: every macropixel is `[Y0 U Y1 V]` with
/// `Y0 == Y1 == y`.
fn generate_solid(data: &mut [u8], y: u8, u: u8, v: u8) {
    for offset in (0..data.len()).step_by(4) {
        write_pair(data, offset, y, u, v);
    }
}

/// A zoom hardware call recorded by [`MockZoom`].
#[derive(Debug, Clone, PartialEq)]
pub enum ZoomCommand {
    /// `lock_for_configuration` succeeded.
    Lock,
    /// `unlock_for_configuration`.
    Unlock,
    /// `cancel_zoom_ramp`.
    Cancel,
    /// `ramp_to_zoom` with its arguments.
    Ramp {
        /// Target factor.
        factor: f64,
        /// Ramp rate.
        rate: f64,
    },
}

/// Mock zoom hardware that records every call.
#[derive(Debug, Clone)]
pub struct MockZoom {
    lenses: Vec<LensDescriptor>,
    switch_over: Vec<f64>,
    bounds: (f64, f64),
    factor: f64,
    reachable_max: Option<f64>,
    locked: bool,
    fail_lock: bool,
    fail_ramp: bool,
    commands: Vec<ZoomCommand>,
}

impl Default for MockZoom {
    fn default() -> Self {
        Self::new()
    }
}

impl MockZoom {
    /// Single wide lens with a 1.0..=10.0 range.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lenses: vec![LensDescriptor::new(LensType::Wide)],
            switch_over: Vec::new(),
            bounds: (1.0, 10.0),
            factor: 1.0,
            reachable_max: None,
            locked: false,
            fail_lock: false,
            fail_ramp: false,
            commands: Vec::new(),
        }
    }

    /// Replace the lens assembly.
    #[must_use]
    pub fn with_lenses(mut self, lenses: &[LensType], switch_over: &[f64]) -> Self {
        self.lenses = lenses.iter().copied().map(LensDescriptor::new).collect();
        self.switch_over = switch_over.to_vec();
        self
    }

    /// Replace the raw hardware zoom bounds.
    #[must_use]
    pub const fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = (min, max);
        self.factor = min;
        self
    }

    /// Ramps stop at this factor, as if the hardware could not go further.
    #[must_use]
    pub const fn with_reachable_max(mut self, max: f64) -> Self {
        self.reachable_max = Some(max);
        self
    }

    /// Make every `lock_for_configuration` fail as if another process held it.
    #[must_use]
    pub const fn with_failing_lock(mut self) -> Self {
        self.fail_lock = true;
        self
    }

    /// Make every `ramp_to_zoom` fail.
    #[must_use]
    pub const fn with_failing_ramp(mut self) -> Self {
        self.fail_ramp = true;
        self
    }

    /// Calls recorded so far.
    #[must_use]
    pub fn commands(&self) -> &[ZoomCommand] {
        &self.commands
    }

    /// Whether the configuration lock is currently held.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Last ramp target, if any.
    #[must_use]
    pub fn last_ramp_target(&self) -> Option<f64> {
        self.commands.iter().rev().find_map(|cmd| match cmd {
            ZoomCommand::Ramp { factor, .. } => Some(*factor),
            _ => None,
        })
    }
}

impl ZoomControl for MockZoom {
    fn lenses(&self) -> &[LensDescriptor] {
        &self.lenses
    }

    fn switch_over_factors(&self) -> &[f64] {
        &self.switch_over
    }

    fn zoom_bounds(&self) -> (f64, f64) {
        self.bounds
    }

    fn zoom_factor(&self) -> Result<f64> {
        Ok(self.factor)
    }

    fn lock_for_configuration(&mut self) -> Result<()> {
        if self.fail_lock {
            return Err(CameraError::ConfigurationLockFailed(
                "mock lock held elsewhere".to_owned(),
            ));
        }
        self.locked = true;
        self.commands.push(ZoomCommand::Lock);
        Ok(())
    }

    fn unlock_for_configuration(&mut self) {
        self.locked = false;
        self.commands.push(ZoomCommand::Unlock);
    }

    fn cancel_zoom_ramp(&mut self) {
        self.commands.push(ZoomCommand::Cancel);
    }

    fn ramp_to_zoom(&mut self, factor: f64, rate: f64) -> Result<()> {
        if !self.locked {
            return Err(CameraError::ConfigurationLockFailed(
                "ramp issued without lock".to_owned(),
            ));
        }
        if self.fail_ramp {
            return Err(CameraError::StreamError("mock ramp rejected".to_owned()));
        }
        self.commands.push(ZoomCommand::Ramp { factor, rate });
        self.factor = self
            .reachable_max
            .map_or(factor, |reachable| factor.min(reachable));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
        assert!(device.capabilities().can_stream);
    }

    #[test]
    fn test_mock_device_format() {
        let mut device = MockDevice::new();
        let format = device.format().expect("format should succeed");
        assert_eq!(format.width, 640);
        assert_eq!(format.height, 480);

        let new_format = Format::new(1280, 720, FourCC::YUYV);
        let actual = device.set_format(&new_format).expect("set_format should succeed");
        assert_eq!(actual.width, 1280);
        assert_eq!(actual.height, 720);
    }

    #[test]
    fn test_mock_stream_capture() {
        let mut device = MockDevice::new();
        let mut stream = device.create_stream(4).expect("create_stream should succeed");

        let frame1 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert_eq!(frame1.format.width, 640);
        assert!(!frame1.data.is_empty());

        let frame2 = stream.next_frame().expect("next_frame should succeed");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::ColorBars);

        assert_eq!(data.len(), (640 * 480 * 2) as usize);

        // First bar should be white (Y=235)
        assert_eq!(data[0], 235);
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::new(64, 64, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Solid(128, 64, 192));

        assert_eq!(data[0], 128);
        assert_eq!(data[2], 128);
        assert_eq!(data[1], 64);
        assert_eq!(data[3], 192);
    }

    #[test]
    fn test_gradient_macropixel_layout() {
        let format = Format::new(8, 2, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Gradient);

        // Second macropixel of the second row covers x = 2
        let offset = ((8 + 2) * 2) as usize;
        assert_eq!(&data[offset..offset + 4], &[63, 128, 63, 128]);
    }

    #[test]
    fn test_write_pair_ignores_partial_macropixel() {
        let mut data = vec![0u8; 6];
        write_pair(&mut data, 4, 1, 2, 3);
        assert_eq!(data, vec![0; 6]);

        write_pair(&mut data, 0, 10, 20, 30);
        assert_eq!(&data[..4], &[10, 20, 10, 30]);
    }

    #[test]
    fn test_mock_zoom_without_hardware() {
        let device = MockDevice::new().with_zoom(None);
        assert!(matches!(
            device.zoom_control(),
            Err(CameraError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_mock_zoom_requires_lock_for_ramp() {
        let mut zoom = MockZoom::new();
        assert!(zoom.ramp_to_zoom(2.0, 5.0).is_err());
        assert_eq!(zoom.last_ramp_target(), None);
    }
}
