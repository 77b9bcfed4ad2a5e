// SPDX-License-Identifier: MPL-2.0

//! camrec - multi-camera recording daemon
//!
//! Captures frames from one or more V4L2 cameras, cuts them into
//! time-bounded segment files and re-stamps every finished segment with the
//! frame rate that was actually captured.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Capture device abstraction (V4L2 via GStreamer)
//! - [`clock`]: Injectable time source
//! - [`config`]: Per-camera settings store
//! - [`pipelines`]: Motion detection, segment encoding and finalize
//! - [`recording`]: Capture loops, workers and the supervisor
//!
//! # Example
//!
//! ```ignore
//! use camrec::pipelines::video::{FfmpegFinalizer, GstSinkFactory};
//! use camrec::backends::camera::v4l2::GstDeviceProvider;
//! use camrec::{JsonFileStore, RecordingMode, RecordingSupervisor, SettingsStore, SourceId, StartRequest};
//! use std::sync::Arc;
//!
//! let mut supervisor = RecordingSupervisor::new(
//!     SettingsStore::open_json(JsonFileStore::default_path()),
//!     Arc::new(GstDeviceProvider::new()?),
//!     Arc::new(GstSinkFactory::new()?),
//!     Arc::new(FfmpegFinalizer::new()),
//! );
//! supervisor.start(StartRequest::new(RecordingMode::Loop, [SourceId(0)]));
//! ```

pub mod backends;
pub mod clock;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod recording;

// Re-export commonly used types
pub use backends::camera::{Frame, SourceId};
pub use config::{CameraSettings, JsonFileStore, SettingsStore};
pub use errors::{ConfigError, DeviceError, FinalizeError, RecorderError, RecorderResult};
pub use recording::{
    ExitReason, LoopReport, RecordingMode, RecordingSupervisor, StartOutcome, StartRequest,
};
