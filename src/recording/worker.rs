// SPDX-License-Identifier: GPL-3.0-only

//! Thread lifecycle for capture loops
//!
//! A [`CaptureWorker`] runs one [`CaptureLoop`] on its own OS thread and hands
//! back the loop's [`LoopReport`] when joined.

use super::capture_loop::CaptureLoop;
use super::{ExitReason, LoopReport, LoopState, RecordingMode};
use crate::backends::camera::SourceId;
use crate::errors::{RecorderError, RecorderResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Handle to a capture loop running in a separate thread
pub struct CaptureWorker {
    source: SourceId,
    mode: RecordingMode,
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<LoopReport>>,
    /// Cancellation flag shared with the loop
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureWorker {
    /// Spawn `capture_loop` on a new thread
    ///
    /// `stop_signal` must be the flag the loop's context checks.
    pub fn start(capture_loop: CaptureLoop, stop_signal: Arc<AtomicBool>) -> RecorderResult<Self> {
        let source = capture_loop.source();
        let mode = capture_loop.mode();
        let name = format!("capture-{}", source);

        info!(name = %name, mode = %mode, "Starting capture worker");

        let thread_name = name.clone();
        let thread_handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!(name = %thread_name, "Capture thread started");
                let report = capture_loop.run();
                info!(name = %thread_name, exit = %report.exit, "Capture thread exiting");
                report
            })
            .map_err(|e| RecorderError::Io(format!("failed to spawn {}: {}", name, e)))?;

        Ok(Self {
            source,
            mode,
            thread_handle: Some(thread_handle),
            stop_signal,
            name,
        })
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Whether the loop belongs to a start that was already cancelled
    pub fn is_cancelled(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Signal the loop to stop (non-blocking)
    ///
    /// The flag is shared by every loop of the same start.
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Wait for the thread to finish without sending the stop signal
    ///
    /// Returns `None` when already joined.
    pub fn join(&mut self) -> Option<LoopReport> {
        let handle = self.thread_handle.take()?;
        debug!(name = %self.name, "Waiting for capture thread to finish");

        match handle.join() {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(name = %self.name, "Capture thread panicked: {:?}", e);
                Some(LoopReport {
                    source: self.source,
                    mode: self.mode,
                    exit: ExitReason::Failed(RecorderError::InvalidState(
                        "capture thread panicked".to_string(),
                    )),
                    segments: Vec::new(),
                    rotations: 0,
                    last_measured_fps: None,
                    final_state: LoopState::Stopped,
                })
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureWorker dropped, stopping loop");
            self.request_stop();
            self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::synthetic::SyntheticProvider;
    use crate::clock::ManualClock;
    use crate::config::CameraSettings;
    use crate::pipelines::video::segment::testing::MemorySinkFactory;
    use crate::recording::capture_loop::LoopContext;
    use crate::recording::preview::PreviewChannel;
    use crate::recording::StartRequest;
    use std::time::Duration;

    fn spawn(devices: SyntheticProvider, clock: Arc<ManualClock>, dir: &std::path::Path) -> CaptureWorker {
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = LoopContext {
            devices: Arc::new(devices),
            sinks: Arc::new(MemorySinkFactory::default()),
            clock,
            preview: PreviewChannel::new(),
            finalize: None,
            cancel: Arc::clone(&cancel),
        };
        let mut settings = CameraSettings::defaults_for(SourceId(0));
        settings.rec_folder = dir.to_path_buf();
        let request = StartRequest::new(RecordingMode::Loop, [SourceId(0)]);
        CaptureWorker::start(CaptureLoop::new(SourceId(0), settings, &request, ctx), cancel).unwrap()
    }

    #[test]
    fn test_join_returns_report() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let devices = SyntheticProvider::finite(clock.clone(), Duration::from_millis(10), 10);
        let mut worker = spawn(devices, clock, dir.path());

        let report = worker.join().unwrap();
        assert!(matches!(report.exit, ExitReason::EndOfStream));
        assert_eq!(report.frames_written(), 10);
        assert!(!worker.is_running());
        assert!(worker.join().is_none());
    }

    #[test]
    fn test_stop_signal() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let devices = SyntheticProvider::endless(clock.clone(), Duration::from_millis(10))
            .with_pacing(Duration::from_millis(2));
        let released = Arc::clone(&devices.released);
        let mut worker = spawn(devices, clock, dir.path());

        // Let it run a bit
        thread::sleep(Duration::from_millis(30));
        assert!(worker.is_running());

        worker.request_stop();
        let report = worker.join().unwrap();
        assert!(matches!(report.exit, ExitReason::Cancelled));
        assert!(report.frames_written() > 0);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let devices = SyntheticProvider::endless(clock.clone(), Duration::from_millis(10))
            .with_pacing(Duration::from_millis(2));
        let released = Arc::clone(&devices.released);
        let worker = spawn(devices, clock, dir.path());

        drop(worker);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
