// SPDX-License-Identifier: MPL-2.0

//! Segment finalize (frame-rate correction)
//!
//! Encoders stamp segments with the requested frame rate. Once a segment is
//! closed its measured rate is known, and the finalizer rewrites the stored
//! rate losslessly (stream copy, no re-encode).
//!
//! Finalize runs on one background worker fed by a bounded queue. Capture
//! loops only block when the queue is full. Failures are logged and counted,
//! they never stop a capture loop.

use crate::constants::finalize;
use crate::errors::FinalizeError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Rewrites the stored frame rate of a finished segment
pub trait Finalizer: Send + Sync {
    /// Re-stamp `path` with `fps`, leaving the original untouched on failure
    fn finalize(&self, path: &Path, fps: f64) -> Result<(), FinalizeError>;
}

/// Two-step ffmpeg remux
///
/// 1. `ffmpeg -y -i <seg> -c copy -f h264 <tmp>` extracts the elementary stream
/// 2. `ffmpeg -y -r <fps> -i <tmp> -c copy <seg>.remux.<ext>` re-muxes it at the
///    measured rate
///
/// The result is renamed over the original.
#[derive(Debug, Clone)]
pub struct FfmpegFinalizer {
    binary: PathBuf,
}

impl FfmpegFinalizer {
    pub fn new() -> Self {
        Self::with_binary(finalize::FFMPEG_BINARY)
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run<I, S>(&self, step: &str, args: I) -> Result<(), FinalizeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.binary)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-y")
            .args(args)
            .output()
            .map_err(|e| FinalizeError::ToolUnavailable {
                tool: self.binary.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(FinalizeError::ToolFailed {
                step: step.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn remux(
        &self,
        path: &Path,
        fps: f64,
        stream: &Path,
        remuxed: &Path,
    ) -> Result<(), FinalizeError> {
        self.run(
            "extract",
            [
                OsStr::new("-i"),
                path.as_os_str(),
                OsStr::new("-c"),
                OsStr::new("copy"),
                OsStr::new("-f"),
                OsStr::new("h264"),
                stream.as_os_str(),
            ],
        )?;

        let rate = format!("{}", fps);
        self.run(
            "remux",
            [
                OsStr::new("-r"),
                OsStr::new(&rate),
                OsStr::new("-i"),
                stream.as_os_str(),
                OsStr::new("-c"),
                OsStr::new("copy"),
                remuxed.as_os_str(),
            ],
        )?;

        std::fs::rename(remuxed, path)?;
        Ok(())
    }
}

impl Default for FfmpegFinalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Finalizer for FfmpegFinalizer {
    fn finalize(&self, path: &Path, fps: f64) -> Result<(), FinalizeError> {
        if !path.is_file() {
            return Err(FinalizeError::Io(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let stream = path.with_extension("remux.h264");
        let remuxed = path.with_extension(format!("remux.{}", ext));

        let result = self.remux(path, fps, &stream, &remuxed);

        let _ = std::fs::remove_file(&stream);
        if result.is_err() {
            let _ = std::fs::remove_file(&remuxed);
        }
        result
    }
}

/// One closed segment waiting to be finalized
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeJob {
    pub path: PathBuf,
    pub fps: f64,
}

/// Finalize outcome counters
#[derive(Debug, Default)]
pub struct FinalizeStats {
    completed: AtomicU64,
    failed: AtomicU64,
}

impl FinalizeStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Submits jobs to a [`FinalizeQueue`]
#[derive(Clone)]
pub struct FinalizeHandle {
    sender: mpsc::Sender<FinalizeJob>,
}

impl FinalizeHandle {
    /// Queue a segment, blocking while the queue is full
    ///
    /// Must not be called from inside an async runtime. Returns `false` when
    /// the queue has already shut down.
    pub fn submit(&self, path: PathBuf, fps: f64) -> bool {
        debug!(path = %path.display(), fps, "Queueing finalize");
        match self.sender.blocking_send(FinalizeJob { path, fps }) {
            Ok(()) => true,
            Err(mpsc::error::SendError(job)) => {
                warn!(path = %job.path.display(), "Finalize queue closed, segment left as recorded");
                false
            }
        }
    }
}

/// Bounded finalize queue with one worker thread
pub struct FinalizeQueue {
    sender: Option<mpsc::Sender<FinalizeJob>>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<FinalizeStats>,
}

impl FinalizeQueue {
    pub fn new(finalizer: Arc<dyn Finalizer>) -> Self {
        Self::with_depth(finalizer, finalize::QUEUE_DEPTH)
    }

    pub fn with_depth(finalizer: Arc<dyn Finalizer>, depth: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<FinalizeJob>(depth.max(1));
        let stats = Arc::new(FinalizeStats::default());
        let worker_stats = Arc::clone(&stats);

        let worker = std::thread::Builder::new()
            .name("finalize".to_string())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    match finalizer.finalize(&job.path, job.fps) {
                        Ok(()) => {
                            worker_stats.completed.fetch_add(1, Ordering::SeqCst);
                            info!(path = %job.path.display(), fps = job.fps, "Segment finalized");
                        }
                        Err(e) => {
                            worker_stats.failed.fetch_add(1, Ordering::SeqCst);
                            warn!(path = %job.path.display(), error = %e, "Finalize failed");
                        }
                    }
                }
                debug!("Finalize worker exiting");
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Failed to spawn finalize worker, segments will not be finalized");
                None
            }
        };

        Self {
            sender: Some(sender),
            worker,
            stats,
        }
    }

    /// Handle for capture loops
    ///
    /// `None` after [`shutdown`](Self::shutdown).
    pub fn handle(&self) -> Option<FinalizeHandle> {
        self.sender.as_ref().map(|sender| FinalizeHandle {
            sender: sender.clone(),
        })
    }

    pub fn stats(&self) -> Arc<FinalizeStats> {
        Arc::clone(&self.stats)
    }

    /// Close the queue and wait until every queued job was processed
    ///
    /// Blocks until all outstanding [`FinalizeHandle`]s are dropped.
    pub fn shutdown(&mut self) {
        self.sender = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Finalize worker panicked");
            }
            info!(
                completed = self.stats.completed(),
                failed = self.stats.failed(),
                "Finalize queue drained"
            );
        }
    }
}

impl Drop for FinalizeQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Finalizer that records its calls, for tests
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct RecordingFinalizer {
    pub calls: Arc<std::sync::Mutex<Vec<FinalizeJob>>>,
    pub fail: bool,
    pub delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl RecordingFinalizer {
    pub fn calls(&self) -> Vec<FinalizeJob> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Finalizer for RecordingFinalizer {
    fn finalize(&self, path: &Path, fps: f64) -> Result<(), FinalizeError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.calls.lock().unwrap().push(FinalizeJob {
            path: path.to_path_buf(),
            fps,
        });
        if self.fail {
            return Err(FinalizeError::ToolFailed {
                step: "remux".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "invalid data".to_string(),
            });
        }
        Ok(())
    }
}
