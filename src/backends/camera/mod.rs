// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! A [`DeviceProvider`] opens a [`CaptureDevice`] for a source index at a
//! requested resolution and frame rate. The device is exclusively owned by
//! the capture loop that opened it and is released when dropped.

pub mod types;
#[cfg(feature = "gstreamer")]
pub mod v4l2;

#[cfg(test)]
pub(crate) mod synthetic;

pub use types::*;

use crate::errors::DeviceError;

/// Requested capture format
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// An open capture device
///
/// Dropping the device releases it.
pub trait CaptureDevice: Send {
    /// Read one frame, blocking until it arrives
    ///
    /// # Returns
    /// * `Ok(Some(frame))` - A frame was captured
    /// * `Ok(None)` - Empty read (end of stream, timeout or a device hiccup)
    /// * `Err(DeviceError)` - The device failed and cannot deliver more frames
    fn read_frame(&mut self) -> Result<Option<Frame>, DeviceError>;

    /// Whether the stream has ended for good, so empty reads will not recover
    fn is_ended(&self) -> bool {
        false
    }

    /// Source this device was opened for
    fn source(&self) -> SourceId;
}

/// Factory for capture devices
pub trait DeviceProvider: Send + Sync {
    /// Open and configure the device for `source`
    fn open(
        &self,
        source: SourceId,
        config: &DeviceConfig,
    ) -> Result<Box<dyn CaptureDevice>, DeviceError>;
}
