// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Camera identifier: the capture device index (`/dev/video<N>`)
///
/// Settings are keyed by the decimal form of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u32);

impl SourceId {
    /// Device node for this source
    pub fn device_path(&self) -> String {
        format!("/dev/video{}", self.0)
    }

    /// Key under which this camera's settings are stored
    pub fn settings_key(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(SourceId)
    }
}

/// A single frame from the camera
///
/// Frames are packed RGB8 at the configured capture resolution; the same
/// buffer feeds the motion detector and the segment encoder.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel data
    pub image: RgbImage,
    /// Per-device frame counter, starting at 0
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw packed RGB bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}
