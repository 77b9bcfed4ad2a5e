// SPDX-License-Identifier: MPL-2.0

//! Segment files
//!
//! A [`SegmentWriter`] owns at most one open output file per camera. The
//! encoder behind it is created by an injected [`SinkFactory`], so the
//! capture loop is independent of GStreamer.

use crate::backends::camera::Frame;
use crate::clock::Clock;
use crate::config::CameraSettings;
use crate::constants::defaults;
use crate::errors::{RecorderError, RecorderResult};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Encoder for one segment file
pub trait SegmentSink: Send {
    /// Encode one frame
    fn push(&mut self, frame: &Frame) -> RecorderResult<()>;

    /// Flush and close the file
    fn finish(self: Box<Self>) -> RecorderResult<()>;

    /// Discard the segment and remove its file
    fn abort(self: Box<Self>) -> RecorderResult<()>;
}

/// Creates segment encoders
pub trait SinkFactory: Send + Sync {
    fn create(&self, path: &Path, settings: &CameraSettings)
    -> RecorderResult<Box<dyn SegmentSink>>;
}

/// A closed segment
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub path: PathBuf,
    /// Wall-clock time the segment was opened
    pub started_at: DateTime<Local>,
    pub frame_count: u64,
    /// Time between open and close
    pub elapsed: Duration,
}

impl Segment {
    /// Frames per second actually captured, rounded up
    ///
    /// `None` for empty segments or zero elapsed time.
    pub fn measured_fps(&self) -> Option<u32> {
        if self.frame_count == 0 || self.elapsed.is_zero() {
            return None;
        }
        Some((self.frame_count as f64 / self.elapsed.as_secs_f64()).ceil() as u32)
    }
}

struct OpenSegment {
    path: PathBuf,
    started_at: DateTime<Local>,
    opened: Duration,
    frames: u64,
    sink: Box<dyn SegmentSink>,
}

/// Owns the single open segment of one camera
pub struct SegmentWriter {
    factory: Arc<dyn SinkFactory>,
    clock: Arc<dyn Clock>,
    current: Option<OpenSegment>,
}

impl SegmentWriter {
    pub fn new(factory: Arc<dyn SinkFactory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            factory,
            clock,
            current: None,
        }
    }

    /// Open a new segment at `path`
    ///
    /// Fails with `InvalidState` while another segment is open and with `Io`
    /// when the parent folder is missing or the encoder cannot be created.
    pub fn open(&mut self, path: PathBuf, settings: &CameraSettings) -> RecorderResult<()> {
        if let Some(open) = &self.current {
            return Err(RecorderError::InvalidState(format!(
                "segment {} is still open",
                open.path.display()
            )));
        }

        let parent_exists = path
            .parent()
            .is_none_or(|p| p.as_os_str().is_empty() || p.is_dir());
        if !parent_exists {
            return Err(RecorderError::Io(format!(
                "folder for {} does not exist",
                path.display()
            )));
        }

        let sink = self.factory.create(&path, settings)?;
        info!(path = %path.display(), "Segment opened");

        self.current = Some(OpenSegment {
            path,
            started_at: self.clock.wall(),
            opened: self.clock.now(),
            frames: 0,
            sink,
        });
        Ok(())
    }

    pub fn write(&mut self, frame: &Frame) -> RecorderResult<()> {
        let open = self
            .current
            .as_mut()
            .ok_or_else(|| RecorderError::InvalidState("no open segment".to_string()))?;

        open.sink.push(frame)?;
        open.frames += 1;
        Ok(())
    }

    /// Close the open segment
    ///
    /// A segment that never received a frame is aborted, its file removed,
    /// and still returned with `frame_count == 0`.
    pub fn close(&mut self) -> RecorderResult<Segment> {
        let open = self
            .current
            .take()
            .ok_or_else(|| RecorderError::InvalidState("no open segment".to_string()))?;

        let segment = Segment {
            path: open.path,
            started_at: open.started_at,
            frame_count: open.frames,
            elapsed: self.clock.now().saturating_sub(open.opened),
        };

        if segment.frame_count == 0 {
            open.sink.abort()?;
            debug!(path = %segment.path.display(), "Empty segment discarded");
        } else {
            open.sink.finish()?;
            info!(
                path = %segment.path.display(),
                frames = segment.frame_count,
                elapsed_ms = segment.elapsed.as_millis() as u64,
                "Segment closed"
            );
        }

        Ok(segment)
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Time since the open segment was opened; zero when none is open
    pub fn elapsed(&self) -> Duration {
        self.current
            .as_ref()
            .map(|open| self.clock.now().saturating_sub(open.opened))
            .unwrap_or_default()
    }

    pub fn frame_count(&self) -> u64 {
        self.current.as_ref().map(|open| open.frames).unwrap_or(0)
    }
}

/// Builds collision-free segment paths
///
/// `<rec_folder>/<rec_pattern>.<ext>`; when that path was already handed out
/// or exists on disk, `_1`, `_2`, ... is appended to the stem. Several
/// rotations within the same second therefore never reuse a file.
///
/// Only the last stem and its next suffix are remembered.
pub struct SegmentNamer {
    folder: PathBuf,
    pattern: String,
    extension: String,
    last: Option<(String, u32)>,
}

impl SegmentNamer {
    pub fn new(settings: &CameraSettings) -> Self {
        Self {
            folder: settings.rec_folder.clone(),
            pattern: settings.rec_pattern.clone(),
            extension: settings.extension.clone(),
            last: None,
        }
    }

    pub fn next_path(&mut self, wall_time: DateTime<Local>) -> PathBuf {
        let mut stem = String::new();
        if write!(stem, "{}", wall_time.format(&self.pattern)).is_err() {
            stem = wall_time.format(defaults::REC_PATTERN).to_string();
        }

        let mut counter = match &self.last {
            Some((last_stem, next)) if *last_stem == stem => *next,
            _ => 0,
        };
        let mut candidate = self.candidate(&stem, counter);
        while candidate.exists() {
            counter += 1;
            candidate = self.candidate(&stem, counter);
        }

        self.last = Some((stem, counter + 1));
        candidate
    }

    fn candidate(&self, stem: &str, counter: u32) -> PathBuf {
        if counter == 0 {
            self.folder.join(format!("{}.{}", stem, self.extension))
        } else {
            self.folder
                .join(format!("{}_{}.{}", stem, counter, self.extension))
        }
    }
}
