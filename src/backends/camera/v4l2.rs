// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 capture devices via GStreamer
//!
//! Each device runs its own pipeline:
//!
//! ```text
//! v4l2src device=/dev/videoN ! videoconvert ! videoscale
//!     ! video/x-raw,format=RGB,width=W,height=H[,framerate=F]
//!     ! appsink name=sink
//! ```
//!
//! Frames are pulled synchronously by the capture loop, so the appsink keeps
//! only a small queue and drops the oldest buffers when the loop falls behind.

use super::{CaptureDevice, DeviceConfig, DeviceProvider, Frame, SourceId};
use crate::constants::{pipeline, timing};
use crate::errors::DeviceError;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use image::RgbImage;
use tracing::{debug, info, warn};

/// Opens `/dev/video<N>` devices through `v4l2src`
#[derive(Debug, Default, Clone)]
pub struct GstDeviceProvider;

impl GstDeviceProvider {
    pub fn new() -> Result<Self, DeviceError> {
        gstreamer::init()
            .map_err(|e| DeviceError::Backend(format!("GStreamer init failed: {}", e)))?;
        Ok(Self)
    }
}

impl DeviceProvider for GstDeviceProvider {
    fn open(
        &self,
        source: SourceId,
        config: &DeviceConfig,
    ) -> Result<Box<dyn CaptureDevice>, DeviceError> {
        let device_path = source.device_path();
        if !std::path::Path::new(&device_path).exists() {
            return Err(DeviceError::Unavailable {
                camera: source,
                reason: format!("{} does not exist", device_path),
            });
        }

        // Not every driver can deliver the requested rate; fall back to the
        // device's native rate and let finalize correct the stored fps.
        let candidates = [
            build_pipeline_string(&device_path, config, true),
            build_pipeline_string(&device_path, config, false),
        ];

        let mut last_error = String::from("no pipeline candidates");
        for pipeline_str in &candidates {
            debug!(camera = %source, pipeline = %pipeline_str, "Trying capture pipeline");
            match V4l2Device::start(source, pipeline_str) {
                Ok(device) => {
                    info!(
                        camera = %source,
                        width = config.width,
                        height = config.height,
                        fps = config.fps,
                        "Capture device opened"
                    );
                    return Ok(Box::new(device));
                }
                Err(reason) => {
                    warn!(camera = %source, error = %reason, "Capture pipeline failed");
                    last_error = reason;
                }
            }
        }

        Err(DeviceError::Unavailable {
            camera: source,
            reason: last_error,
        })
    }
}

fn build_pipeline_string(device_path: &str, config: &DeviceConfig, with_rate: bool) -> String {
    let mut caps = format!(
        "video/x-raw,format={},width={},height={}",
        pipeline::FRAME_FORMAT,
        config.width,
        config.height
    );
    if with_rate {
        let millis = (config.fps * 1000.0).round().max(1.0) as u64;
        caps.push_str(&format!(",framerate={}/1000", millis));
    }

    format!(
        "v4l2src device={} ! videoconvert ! videoscale ! {} ! \
         appsink name=sink max-buffers={} drop=true sync=false",
        device_path,
        caps,
        pipeline::MAX_BUFFERS
    )
}

/// A running `v4l2src` pipeline
pub struct V4l2Device {
    source: SourceId,
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    sequence: u64,
}

impl V4l2Device {
    fn start(source: SourceId, pipeline_str: &str) -> Result<Self, String> {
        let pipeline = gstreamer::parse::launch(pipeline_str)
            .map_err(|e| format!("Failed to create pipeline: {}", e))?
            .dynamic_cast::<gstreamer::Pipeline>()
            .map_err(|_| "Failed to cast to pipeline".to_string())?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| "Failed to find appsink".to_string())?
            .dynamic_cast::<AppSink>()
            .map_err(|_| "Failed to cast appsink".to_string())?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| format!("Failed to start pipeline: {}", e))?;

        let (result, _, _) = pipeline.state(gstreamer::ClockTime::from_seconds(
            timing::START_TIMEOUT_SECS,
        ));
        if let Err(e) = result {
            let reason = bus_error(&pipeline).unwrap_or_else(|| e.to_string());
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(reason);
        }

        Ok(Self {
            source,
            pipeline,
            appsink,
            sequence: 0,
        })
    }
}

impl CaptureDevice for V4l2Device {
    fn read_frame(&mut self) -> Result<Option<Frame>, DeviceError> {
        if let Some(reason) = bus_error(&self.pipeline) {
            return Err(DeviceError::Backend(format!(
                "camera {}: {}",
                self.source, reason
            )));
        }

        let timeout = gstreamer::ClockTime::from_nseconds(
            timing::FRAME_READ_TIMEOUT.as_nanos() as u64,
        );
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            if self.appsink.is_eos() {
                debug!(camera = %self.source, "Capture stream ended");
            }
            return Ok(None);
        };

        let image = rgb_image_from_sample(&sample)?;
        let frame = Frame::new(image, self.sequence);
        self.sequence += 1;

        if self.sequence % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(camera = %self.source, frames = self.sequence, "Capturing");
        }
        Ok(Some(frame))
    }

    fn is_ended(&self) -> bool {
        self.appsink.is_eos()
    }

    fn source(&self) -> SourceId {
        self.source
    }
}

impl Drop for V4l2Device {
    fn drop(&mut self) {
        // Release the device node immediately
        let _ = self.pipeline.set_state(gstreamer::State::Null);
        info!(camera = %self.source, frames = self.sequence, "Capture device released");
    }
}

/// Copy a sample into a tightly packed RGB image, honouring the row stride
fn rgb_image_from_sample(sample: &gstreamer::Sample) -> Result<RgbImage, DeviceError> {
    let caps = sample
        .caps()
        .ok_or_else(|| DeviceError::Backend("No caps on sample".into()))?;
    let info = gstreamer_video::VideoInfo::from_caps(caps)
        .map_err(|e| DeviceError::Backend(format!("Invalid caps: {}", e)))?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| DeviceError::Backend("No buffer in sample".into()))?;
    let map = buffer
        .map_readable()
        .map_err(|_| DeviceError::Backend("Failed to map buffer".into()))?;

    let width = info.width();
    let height = info.height();
    let row_bytes = width as usize * 3;
    let stride = info.stride()[0] as usize;
    let data = map.as_slice();

    if height == 0 || stride < row_bytes || data.len() < stride * (height as usize - 1) + row_bytes {
        return Err(DeviceError::Backend(format!(
            "Short buffer: {} bytes for {}x{} (stride {})",
            data.len(),
            width,
            height,
            stride
        )));
    }

    let mut packed = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(stride).take(height as usize) {
        packed.extend_from_slice(&row[..row_bytes]);
    }

    RgbImage::from_raw(width, height, packed)
        .ok_or_else(|| DeviceError::Backend("Frame size mismatch".into()))
}

/// Pop a pending error message from the pipeline bus, if any
fn bus_error(pipeline: &gstreamer::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let msg = bus.pop_filtered(&[gstreamer::MessageType::Error])?;
    match msg.view() {
        gstreamer::MessageView::Error(err) => Some(format!(
            "{} ({})",
            err.error(),
            err.debug().map(|d| d.to_string()).unwrap_or_default()
        )),
        _ => None,
    }
}
