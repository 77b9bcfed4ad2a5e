// SPDX-License-Identifier: GPL-3.0-only

//! Per-camera capture state machine
//!
//! ```text
//! Starting -> Running -> Rotating -> Running -> ... -> Stopping -> Stopped
//! ```
//!
//! One iteration checks the cancellation flag, reads one frame and then
//! writes, rotates or closes according to the recording mode. Everything in
//! a loop is sequential; different cameras never share a loop.

use super::preview::PreviewChannel;
use super::{ExitReason, LoopReport, LoopState, RecordingMode, StartRequest};
use crate::backends::camera::{CaptureDevice, DeviceProvider, Frame, SourceId};
use crate::clock::Clock;
use crate::config::CameraSettings;
use crate::constants::motion;
use crate::errors::{RecorderError, RecorderResult};
use crate::pipelines::motion::MotionDetector;
use crate::pipelines::video::{FinalizeHandle, Segment, SegmentNamer, SegmentWriter, SinkFactory};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Collaborators shared by every loop of one supervisor
#[derive(Clone)]
pub struct LoopContext {
    pub devices: Arc<dyn DeviceProvider>,
    pub sinks: Arc<dyn SinkFactory>,
    pub clock: Arc<dyn Clock>,
    pub preview: PreviewChannel,
    /// `None` disables finalize
    pub finalize: Option<FinalizeHandle>,
    /// Cancellation flag of the current start
    pub cancel: Arc<AtomicBool>,
}

pub struct CaptureLoop {
    source: SourceId,
    mode: RecordingMode,
    settings: CameraSettings,
    timer_limit: Option<Duration>,
    speed: f64,
    ctx: LoopContext,
    writer: SegmentWriter,
    namer: SegmentNamer,
    detector: MotionDetector,
    state: LoopState,
    segments: Vec<Segment>,
    rotations: u32,
    last_fps: Option<u32>,
}

impl CaptureLoop {
    pub fn new(
        source: SourceId,
        settings: CameraSettings,
        request: &StartRequest,
        ctx: LoopContext,
    ) -> Self {
        let timer_limit = match request.mode {
            RecordingMode::Timer => Some(request.timer.unwrap_or(settings.timer_duration())),
            RecordingMode::Loop | RecordingMode::Motion => request.timer,
        };

        Self {
            source,
            mode: request.mode,
            writer: SegmentWriter::new(Arc::clone(&ctx.sinks), Arc::clone(&ctx.clock)),
            namer: SegmentNamer::new(&settings),
            detector: MotionDetector::new(motion::MIN_AREA),
            settings,
            timer_limit,
            speed: request.speed,
            ctx,
            state: LoopState::Starting,
            segments: Vec::new(),
            rotations: 0,
            last_fps: None,
        }
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn mode(&self) -> RecordingMode {
        self.mode
    }

    /// Run until cancelled, the timer expires, the device ends or an error occurs
    pub fn run(mut self) -> LoopReport {
        info!(
            camera = %self.source,
            mode = %self.mode,
            width = self.settings.resolution_x,
            height = self.settings.resolution_y,
            fps = self.settings.fps,
            timer = ?self.timer_limit,
            "Capture loop starting"
        );

        let mut device = match self.start() {
            Ok(device) => device,
            Err(e) => {
                warn!(camera = %self.source, error = %e, "Capture loop failed to start");
                return self.stop(None, ExitReason::Failed(e));
            }
        };

        let session_start = self.ctx.clock.now();
        self.transition(LoopState::Running);

        let exit = self
            .run_frames(device.as_mut(), session_start)
            .unwrap_or_else(ExitReason::Failed);
        self.stop(Some(device), exit)
    }

    fn transition(&mut self, next: LoopState) {
        debug!(camera = %self.source, from = %self.state, to = %next, "Loop state");
        self.state = next;
    }

    /// Starting: folder, device, first segment
    fn start(&mut self) -> RecorderResult<Box<dyn CaptureDevice>> {
        std::fs::create_dir_all(&self.settings.rec_folder).map_err(|e| {
            RecorderError::Io(format!(
                "cannot create {}: {}",
                self.settings.rec_folder.display(),
                e
            ))
        })?;

        let device = self
            .ctx
            .devices
            .open(self.source, &self.settings.device_config())?;

        self.open_segment()?;
        Ok(device)
    }

    fn run_frames(
        &mut self,
        device: &mut dyn CaptureDevice,
        session_start: Duration,
    ) -> RecorderResult<ExitReason> {
        let mut previous: Option<Frame> = None;
        let mut last_motion = session_start;
        let mut empty_reads = 0u32;

        loop {
            if self.ctx.cancel.load(Ordering::SeqCst) {
                debug!(camera = %self.source, "Stop signal received");
                return Ok(ExitReason::Cancelled);
            }

            let frame = match device.read_frame() {
                Ok(Some(frame)) => {
                    empty_reads = 0;
                    frame
                }
                Ok(None) if self.mode == RecordingMode::Motion => {
                    if device.is_ended() {
                        warn!(camera = %self.source, "Device stream ended");
                        return Ok(ExitReason::DeviceLost);
                    }
                    empty_reads += 1;
                    if empty_reads % motion::EMPTY_READ_WARN_INTERVAL == 0 {
                        warn!(camera = %self.source, empty_reads, "No frames from device");
                    }
                    self.ctx.clock.sleep(motion::EMPTY_READ_BACKOFF);
                    continue;
                }
                Ok(None) => {
                    info!(camera = %self.source, "Device stream ended");
                    return Ok(ExitReason::EndOfStream);
                }
                Err(e) => {
                    warn!(camera = %self.source, error = %e, "Device read failed");
                    return Err(e.into());
                }
            };

            let preview = self.ctx.preview.is_selected(self.source);

            match self.mode {
                RecordingMode::Loop => {
                    self.writer.write(&frame)?;
                    if self.writer.elapsed() >= self.settings.segment_length() {
                        self.rotate()?;
                    }
                    if preview {
                        self.ctx.preview.publish(self.source, frame.sequence, frame.image.clone());
                    }
                }
                RecordingMode::Timer => {
                    self.writer.write(&frame)?;
                    if preview {
                        self.ctx.preview.publish(self.source, frame.sequence, frame.image.clone());
                    }
                }
                RecordingMode::Motion => {
                    if let Some(prev) = previous.as_ref() {
                        let result = self.detector.detect(prev, &frame);
                        let now = self.ctx.clock.now();

                        if result.moved {
                            last_motion = now;
                            if !self.writer.is_open() {
                                info!(camera = %self.source, regions = result.regions.len(), "Motion detected");
                                self.transition(LoopState::Rotating);
                                self.open_segment()?;
                                self.rotations += 1;
                                self.transition(LoopState::Running);
                            }
                            self.writer.write(&frame)?;
                        } else if self.writer.is_open() {
                            if now.saturating_sub(last_motion) >= self.settings.motion_idle_timeout() {
                                info!(camera = %self.source, "No motion, closing segment");
                                self.close_segment()?;
                            } else {
                                self.writer.write(&frame)?;
                            }
                        }

                        if preview {
                            self.ctx.preview.publish(self.source, frame.sequence, result.annotated);
                        }
                    } else if preview {
                        self.ctx.preview.publish(self.source, frame.sequence, frame.image.clone());
                    }
                    previous = Some(frame);
                }
            }

            if let Some(limit) = self.timer_limit
                && self.ctx.clock.now().saturating_sub(session_start) >= limit
            {
                info!(camera = %self.source, limit_secs = limit.as_secs_f64(), "Timer expired");
                return Ok(ExitReason::TimerExpired);
            }
        }
    }

    fn open_segment(&mut self) -> RecorderResult<()> {
        let path = self.namer.next_path(self.ctx.clock.wall());
        self.writer.open(path, &self.settings)
    }

    /// Close the open segment and queue its finalize
    fn close_segment(&mut self) -> RecorderResult<()> {
        let segment = self.writer.close()?;
        if segment.frame_count == 0 {
            return Ok(());
        }

        match segment.measured_fps() {
            Some(fps) => {
                self.last_fps = Some(fps);
                let target = if self.mode.applies_speed() {
                    fps as f64 * self.speed
                } else {
                    fps as f64
                };
                debug!(
                    camera = %self.source,
                    measured_fps = fps,
                    target_fps = target,
                    "Segment measured"
                );
                match &self.ctx.finalize {
                    Some(finalize) => {
                        finalize.submit(segment.path.clone(), target);
                    }
                    None => {
                        warn!(
                            camera = %self.source,
                            path = %segment.path.display(),
                            "No finalize queue, segment keeps the requested frame rate"
                        );
                    }
                }
            }
            None => {
                debug!(
                    camera = %self.source,
                    path = %segment.path.display(),
                    previous_fps = ?self.last_fps,
                    "Zero elapsed time, skipping finalize"
                );
            }
        }

        self.segments.push(segment);
        Ok(())
    }

    fn rotate(&mut self) -> RecorderResult<()> {
        self.transition(LoopState::Rotating);
        self.close_segment()?;
        self.open_segment()?;
        self.rotations += 1;
        self.transition(LoopState::Running);
        Ok(())
    }

    /// Stopping -> Stopped
    fn stop(mut self, device: Option<Box<dyn CaptureDevice>>, exit: ExitReason) -> LoopReport {
        self.transition(LoopState::Stopping);

        let mut exit = exit;
        if self.writer.is_open()
            && let Err(e) = self.close_segment()
        {
            warn!(camera = %self.source, error = %e, "Failed to close segment");
            if !exit.is_failure() {
                exit = ExitReason::Failed(e);
            }
        }

        // Release the device
        drop(device);
        self.ctx.preview.release(self.source);
        self.transition(LoopState::Stopped);

        info!(
            camera = %self.source,
            mode = %self.mode,
            exit = %exit,
            segments = self.segments.len(),
            rotations = self.rotations,
            "Capture loop stopped"
        );

        LoopReport {
            source: self.source,
            mode: self.mode,
            exit,
            segments: self.segments,
            rotations: self.rotations,
            last_measured_fps: self.last_fps,
            final_state: self.state,
        }
    }
}
