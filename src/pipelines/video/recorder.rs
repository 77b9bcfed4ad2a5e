// SPDX-License-Identifier: MPL-2.0

//! GStreamer segment encoder
//!
//! ```text
//! appsrc (RGB, WxH, requested fps) ! videoconvert ! x264enc ! h264parse
//!     ! <muxer> ! filesink
//! ```
//!
//! Buffers are timestamped from the frame index at the requested rate. The
//! stored rate is corrected after close by the finalizer. Rows are padded to
//! the stride GStreamer expects for packed RGB (a multiple of 4 bytes).

use super::muxer;
use super::segment::{SegmentSink, SinkFactory};
use crate::backends::camera::Frame;
use crate::config::CameraSettings;
use crate::constants::{pipeline, timing};
use crate::errors::{RecorderError, RecorderResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Creates [`GstSegmentSink`]s
#[derive(Debug, Default, Clone)]
pub struct GstSinkFactory;

impl GstSinkFactory {
    pub fn new() -> RecorderResult<Self> {
        gst::init().map_err(|e| RecorderError::Io(format!("GStreamer init failed: {}", e)))?;
        Ok(Self)
    }
}

impl SinkFactory for GstSinkFactory {
    fn create(
        &self,
        path: &Path,
        settings: &CameraSettings,
    ) -> RecorderResult<Box<dyn SegmentSink>> {
        let sink = GstSegmentSink::new(path, settings).map_err(RecorderError::Io)?;
        Ok(Box::new(sink))
    }
}

/// One segment being encoded
pub struct GstSegmentSink {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    path: PathBuf,
    width: u32,
    height: u32,
    stride: usize,
    frame_duration_ns: u64,
    frames: u64,
}

impl GstSegmentSink {
    fn new(path: &Path, settings: &CameraSettings) -> Result<Self, String> {
        let fps_millis = (settings.fps * 1000.0).round().max(1.0) as i32;
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", pipeline::FRAME_FORMAT)
            .field("width", settings.resolution_x as i32)
            .field("height", settings.resolution_y as i32)
            .field("framerate", gst::Fraction::new(fps_millis, 1000))
            .build();
        let info = gstreamer_video::VideoInfo::builder(
            gstreamer_video::VideoFormat::Rgb,
            settings.resolution_x,
            settings.resolution_y,
        )
        .build()
        .map_err(|e| format!("Invalid segment geometry: {}", e))?;

        let appsrc = gst::ElementFactory::make("appsrc")
            .name("src")
            .build()
            .map_err(|e| format!("Failed to create appsrc: {}", e))?
            .downcast::<AppSrc>()
            .map_err(|_| "Failed to downcast to AppSrc".to_string())?;
        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_is_live(false);
        appsrc.set_block(true);

        let videoconvert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| format!("Failed to create videoconvert: {}", e))?;

        let encoder = gst::ElementFactory::make("x264enc")
            .build()
            .map_err(|e| format!("Failed to create x264enc (gstreamer plugins-ugly): {}", e))?;
        encoder.set_property_from_str("tune", "zerolatency");
        encoder.set_property_from_str("speed-preset", "veryfast");
        encoder.set_property("bitrate", pipeline::ENCODER_BITRATE_KBPS);

        let parser = gst::ElementFactory::make("h264parse")
            .build()
            .map_err(|e| format!("Failed to create h264parse: {}", e))?;

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| settings.extension.clone());
        let mux = muxer::create_muxer(&extension)?;
        let filesink = muxer::create_filesink(path)?;

        let gst_pipeline = gst::Pipeline::new();
        gst_pipeline
            .add_many([
                appsrc.upcast_ref(),
                &videoconvert,
                &encoder,
                &parser,
                &mux,
                &filesink,
            ])
            .map_err(|e| format!("Failed to add elements: {}", e))?;
        gst::Element::link_many([
            appsrc.upcast_ref(),
            &videoconvert,
            &encoder,
            &parser,
            &mux,
            &filesink,
        ])
        .map_err(|e| format!("Failed to link segment pipeline: {}", e))?;

        gst_pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| format!("Failed to start segment pipeline: {}", e))?;

        debug!(path = %path.display(), muxer = ?muxer::muxer_name(&extension), "Segment encoder started");

        Ok(Self {
            pipeline: gst_pipeline,
            appsrc,
            path: path.to_path_buf(),
            width: settings.resolution_x,
            height: settings.resolution_y,
            stride: info.stride()[0] as usize,
            frame_duration_ns: (1_000_000_000.0 / settings.fps) as u64,
            frames: 0,
        })
    }

    /// Wait for EOS (or an error) to reach the bus
    fn wait_for_eos(&self) -> RecorderResult<()> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };

        let msg = bus.timed_pop_filtered(
            gst::ClockTime::from_seconds(timing::EOS_TIMEOUT_SECS),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        );
        match msg.as_ref().map(|m| m.view()) {
            Some(gst::MessageView::Eos(_)) => Ok(()),
            Some(gst::MessageView::Error(err)) => {
                error!(
                    error = %err.error(),
                    debug = ?err.debug(),
                    path = %self.path.display(),
                    "GStreamer error while closing segment"
                );
                Err(RecorderError::Io(format!(
                    "encoder error on {}: {}",
                    self.path.display(),
                    err.error()
                )))
            }
            _ => {
                warn!(path = %self.path.display(), "Timed out waiting for EOS, file may be truncated");
                Ok(())
            }
        }
    }
}

impl SegmentSink for GstSegmentSink {
    fn push(&mut self, frame: &Frame) -> RecorderResult<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(RecorderError::Io(format!(
                "Frame size {}x{} doesn't match segment {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let data = pad_rows(frame.as_bytes(), self.width as usize * 3, self.stride);
        let mut buffer = gst::Buffer::from_slice(data);
        {
            let buffer_ref = buffer
                .get_mut()
                .ok_or_else(|| RecorderError::Io("Failed to get mutable buffer".into()))?;
            buffer_ref.set_pts(gst::ClockTime::from_nseconds(
                self.frames * self.frame_duration_ns,
            ));
            buffer_ref.set_duration(gst::ClockTime::from_nseconds(self.frame_duration_ns));
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| RecorderError::Io(format!("Failed to push frame: {:?}", e)))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> RecorderResult<()> {
        self.appsrc
            .end_of_stream()
            .map_err(|e| RecorderError::Io(format!("Failed to send EOS: {:?}", e)))?;
        let drained = self.wait_for_eos();

        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| RecorderError::Io(format!("Failed to stop segment pipeline: {}", e)))?;
        drained?;

        info!(path = %self.path.display(), frames = self.frames, "Segment encoded");
        Ok(())
    }

    fn abort(self: Box<Self>) -> RecorderResult<()> {
        let _ = self.pipeline.set_state(gst::State::Null);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Copy tightly packed rows into rows of `stride` bytes, zero filling the tail
fn pad_rows(packed: &[u8], row_bytes: usize, stride: usize) -> Vec<u8> {
    if row_bytes == 0 || stride <= row_bytes {
        return packed.to_vec();
    }
    let rows = packed.len() / row_bytes;
    let mut padded = vec![0u8; rows * stride];
    for (src, dst) in packed.chunks_exact(row_bytes).zip(padded.chunks_exact_mut(stride)) {
        dst[..row_bytes].copy_from_slice(src);
    }
    padded
}

impl Drop for GstSegmentSink {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
