// SPDX-License-Identifier: GPL-3.0-only

//! Recording engine
//!
//! ```text
//! RecordingSupervisor
//!   ├── CaptureWorker (thread) ── CaptureLoop ── device, SegmentWriter
//!   ├── CaptureWorker (thread) ── CaptureLoop ── ...
//!   ├── PreviewChannel (slot + latest frame)
//!   └── FinalizeQueue (worker thread)
//! ```
//!
//! Every camera runs independently on its own thread. The only state shared
//! between loops is the cancellation flag of the current start, the preview
//! slot and the finalize queue.

pub mod capture_loop;
pub mod preview;
pub mod supervisor;
pub mod worker;

pub use capture_loop::{CaptureLoop, LoopContext};
pub use preview::{PreviewChannel, PreviewFrame};
pub use supervisor::{RecordingSupervisor, StartOutcome};
pub use worker::CaptureWorker;

use crate::backends::camera::SourceId;
use crate::errors::RecorderError;
use crate::pipelines::video::Segment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Recording policy of a capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    /// Continuous recording, rotating every `rec_length` seconds
    Loop,
    /// One segment, ended after the timer
    Timer,
    /// Segments opened on movement, closed after `motion_length` idle seconds
    Motion,
}

impl RecordingMode {
    pub const ALL: [RecordingMode; 3] =
        [RecordingMode::Loop, RecordingMode::Timer, RecordingMode::Motion];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingMode::Loop => "loop",
            RecordingMode::Timer => "timer",
            RecordingMode::Motion => "motion",
        }
    }

    /// Whether the speed factor scales the finalized frame rate
    pub fn applies_speed(&self) -> bool {
        !matches!(self, RecordingMode::Motion)
    }
}

impl fmt::Display for RecordingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "loop" => Ok(RecordingMode::Loop),
            "timer" => Ok(RecordingMode::Timer),
            "motion" => Ok(RecordingMode::Motion),
            other => Err(format!(
                "unknown recording mode {:?} (expected loop, timer or motion)",
                other
            )),
        }
    }
}

/// Parameters of one `start`
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub mode: RecordingMode,
    /// Session limit; Timer mode falls back to the camera's `timer_length`
    pub timer: Option<Duration>,
    /// Capture speed factor applied to measured fps in Loop and Timer mode
    pub speed: f64,
    pub sources: Vec<SourceId>,
}

impl StartRequest {
    pub fn new(mode: RecordingMode, sources: impl IntoIterator<Item = SourceId>) -> Self {
        Self {
            mode,
            timer: None,
            speed: 1.0,
            sources: sources.into_iter().collect(),
        }
    }

    pub fn with_timer(mut self, timer: Duration) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }
}

/// Why a capture loop ended
#[derive(Debug, Clone)]
pub enum ExitReason {
    /// The cancellation flag was set
    Cancelled,
    /// The session limit elapsed
    TimerExpired,
    /// The device stopped delivering frames (Loop and Timer mode)
    EndOfStream,
    /// Too many consecutive empty reads in Motion mode
    DeviceLost,
    Failed(RecorderError),
}

impl ExitReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, ExitReason::Failed(_))
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Cancelled => write!(f, "cancelled"),
            ExitReason::TimerExpired => write!(f, "timer expired"),
            ExitReason::EndOfStream => write!(f, "end of stream"),
            ExitReason::DeviceLost => write!(f, "device lost"),
            ExitReason::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Capture loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    Rotating,
    Stopping,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Starting => "starting",
            LoopState::Running => "running",
            LoopState::Rotating => "rotating",
            LoopState::Stopping => "stopping",
            LoopState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Result of one capture loop run
#[derive(Debug, Clone)]
pub struct LoopReport {
    pub source: SourceId,
    pub mode: RecordingMode,
    pub exit: ExitReason,
    /// Segments with at least one frame, in the order they were closed
    pub segments: Vec<Segment>,
    /// Segments opened after the first one (Loop rotations, Motion reopens)
    pub rotations: u32,
    pub last_measured_fps: Option<u32>,
    pub final_state: LoopState,
}

impl LoopReport {
    pub fn frames_written(&self) -> u64 {
        self.segments.iter().map(|s| s.frame_count).sum()
    }
}
