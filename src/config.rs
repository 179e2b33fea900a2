//! Runtime configuration, loadable from a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::traits::{CameraError, Format, FourCC, Result};

/// Top-level configuration. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which capture device to use.
    pub device: DeviceConfig,
    /// Requested stream format.
    pub stream: StreamConfig,
    /// Zoom limits and ramp speed.
    pub zoom: ZoomPolicy,
    /// Still image handling.
    pub still: StillConfig,
}

impl Config {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| CameraError::Config(err.to_string()))
    }
}

/// Capture device selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Fixed `/dev/videoN` index. `None` picks the first capture device.
    pub index: Option<u32>,
    /// How many device indices to try when searching.
    pub search_limit: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            index: None,
            search_limit: 8,
        }
    }
}

/// Requested capture stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Four character pixel format code.
    pub fourcc: String,
    /// Number of driver buffers.
    pub buffer_count: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fourcc: "YUYV".to_owned(),
            buffer_count: 4,
        }
    }
}

impl StreamConfig {
    /// The requested format.
    pub fn format(&self) -> Result<Format> {
        let fourcc: FourCC = self.fourcc.parse()?;
        Ok(Format::new(self.width, self.height, fourcc))
    }
}

/// Zoom limits and ramp speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomPolicy {
    /// Highest zoom factor offered, whatever the hardware allows.
    pub policy_cap: f64,
    /// Ramp speed in factor-units per second.
    pub ramp_rate: f64,
    /// Lowest factor when no zoom hardware is present.
    pub fallback_min: f64,
    /// Highest factor when no zoom hardware is present.
    pub fallback_max: f64,
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self {
            policy_cap: 15.0,
            ramp_rate: 5.0,
            fallback_min: 1.0,
            fallback_max: 10.0,
        }
    }
}

/// Rotation applied to captured stills.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// As delivered by the sensor.
    #[default]
    Up,
    /// Rotated 90 degrees clockwise (portrait).
    Right,
}

/// Still image handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StillConfig {
    /// Rotation applied to captured stills.
    pub orientation: Orientation,
}
