//! Telemetry values published to subscribers

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ChannelError, Result};

/// MIME type attached to camera images.
pub const JPEG_MIME: &str = "image/jpg";

/// Gain that maps 16-bit depth samples into a visible range.
pub const DEPTH_VISUAL_GAIN: u16 = 64;

/// Telemetry streams whose payloads are decoded (images pass through as-is)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Depth,
    Status,
    State,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamKind::Depth => "depth",
            StreamKind::Status => "status",
            StreamKind::State => "state",
        })
    }
}

/// Encoded color image as received from the robot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotImageData {
    /// Encoded image bytes (zero-copy view into the received message)
    pub data: Bytes,
    /// MIME type of `data`
    pub mime: &'static str,
}

impl RobotImageData {
    pub fn jpeg(data: Bytes) -> Self {
        Self { data, mime: JPEG_MIME }
    }
}

/// Decoded 16-bit depth raster, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct DepthRaster {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<u16>,
}

impl DepthRaster {
    /// Decode a PNG-encoded depth map.
    ///
    /// 8-bit sources are widened to 16 bits by the decoder.
    pub fn from_png(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
            .map_err(|e| ChannelError::payload_decode(StreamKind::Depth, e.to_string()))?;
        let luma = image.into_luma16();
        let (width, height) = luma.dimensions();
        Ok(Self { width, height, samples: luma.into_raw() })
    }

    pub fn sample(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.samples.get((y as usize) * (self.width as usize) + x as usize).copied()
    }

    /// Samples multiplied by [`DEPTH_VISUAL_GAIN`], saturating at `u16::MAX`.
    pub fn visual_samples(&self) -> impl Iterator<Item = u16> + '_ {
        self.samples.iter().map(|s| s.saturating_mul(DEPTH_VISUAL_GAIN))
    }
}

impl fmt::Debug for DepthRaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepthRaster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("samples", &self.samples.len())
            .finish()
    }
}

/// Robot state document
///
/// Only `joints` is interpreted; every other field is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    /// Joint angles in radians
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joints: Option<Vec<f64>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
