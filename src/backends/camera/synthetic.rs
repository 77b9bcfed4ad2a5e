// SPDX-License-Identifier: GPL-3.0-only

//! Scripted capture devices for tests
//!
//! Every read advances a [`ManualClock`] by the frame interval, so a
//! simulated session of minutes runs in milliseconds.

use super::{CaptureDevice, DeviceConfig, DeviceProvider, Frame, SourceId};
use crate::clock::ManualClock;
use crate::errors::DeviceError;
use image::{Rgb, RgbImage};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the device does on read `n`
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Frame(RgbImage),
    /// Empty read, the stream goes on
    Empty,
    /// Empty read, the stream has ended
    End,
    Fail,
}

type Script = dyn Fn(u64) -> Step + Send + Sync;

/// Provider handing out [`SyntheticDevice`]s that follow one script
#[derive(Clone)]
pub(crate) struct SyntheticProvider {
    clock: Arc<ManualClock>,
    interval: Duration,
    pacing: Option<Duration>,
    script: Arc<Script>,
    fail_open: Arc<Mutex<HashSet<SourceId>>>,
    open_devices: Arc<Mutex<HashSet<SourceId>>>,
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl SyntheticProvider {
    pub fn new(
        clock: Arc<ManualClock>,
        interval: Duration,
        script: impl Fn(u64) -> Step + Send + Sync + 'static,
    ) -> Self {
        Self {
            clock,
            interval,
            pacing: None,
            script: Arc::new(script),
            fail_open: Arc::new(Mutex::new(HashSet::new())),
            open_devices: Arc::new(Mutex::new(HashSet::new())),
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `count` solid gray frames, then end of stream
    pub fn finite(clock: Arc<ManualClock>, interval: Duration, count: u64) -> Self {
        Self::new(clock, interval, move |n| {
            if n < count {
                Step::Frame(solid(64, 48, 128))
            } else {
                Step::End
            }
        })
    }

    /// Frames forever
    pub fn endless(clock: Arc<ManualClock>, interval: Duration) -> Self {
        Self::new(clock, interval, |_| Step::Frame(solid(64, 48, 128)))
    }

    /// Sleep for real on every read, so threads interleave in tests
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Make `open` fail for `source`
    pub fn fail_open_for(self, source: SourceId) -> Self {
        self.fail_open.lock().unwrap().insert(source);
        self
    }

    pub fn is_open(&self, source: SourceId) -> bool {
        self.open_devices.lock().unwrap().contains(&source)
    }
}

impl DeviceProvider for SyntheticProvider {
    fn open(
        &self,
        source: SourceId,
        _config: &DeviceConfig,
    ) -> Result<Box<dyn CaptureDevice>, DeviceError> {
        if self.fail_open.lock().unwrap().contains(&source) {
            return Err(DeviceError::Unavailable {
                camera: source,
                reason: "no such device".to_string(),
            });
        }
        // Devices are exclusive, like a real V4L2 node
        if !self.open_devices.lock().unwrap().insert(source) {
            return Err(DeviceError::Unavailable {
                camera: source,
                reason: "device busy".to_string(),
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SyntheticDevice {
            source,
            provider: self.clone(),
            reads: 0,
            ended: false,
        }))
    }
}

pub(crate) struct SyntheticDevice {
    source: SourceId,
    provider: SyntheticProvider,
    reads: u64,
    ended: bool,
}

impl CaptureDevice for SyntheticDevice {
    fn read_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        if let Some(pacing) = self.provider.pacing {
            std::thread::sleep(pacing);
        }
        self.provider.clock.advance(self.provider.interval);

        let n = self.reads;
        self.reads += 1;
        match (self.provider.script)(n) {
            Step::Frame(image) => Ok(Some(Frame::new(image, n))),
            Step::Empty => Ok(None),
            Step::End => {
                self.ended = true;
                Ok(None)
            }
            Step::Fail => Err(DeviceError::Closed(self.source)),
        }
    }

    fn is_ended(&self) -> bool {
        self.ended
    }

    fn source(&self) -> SourceId {
        self.source
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.provider.open_devices.lock().unwrap().remove(&self.source);
        self.provider.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Uniform gray image
pub(crate) fn solid(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

/// Black image with a white square of side `size` at (`x`, `y`)
pub(crate) fn with_block(width: u32, height: u32, x: u32, y: u32, size: u32) -> RgbImage {
    let mut image = solid(width, height, 0);
    for py in y..(y + size).min(height) {
        for px in x..(x + size).min(width) {
            image.put_pixel(px, py, Rgb([255, 255, 255]));
        }
    }
    image
}

