// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the recorder
//!
//! Failures are scoped to one camera: a [`RecorderError`] ends the capture
//! loop that produced it and nothing else. Finalize failures have their own
//! [`FinalizeError`] and never surface as a loop failure.

use crate::backends::camera::SourceId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Main recorder error type
#[derive(Debug, Clone, Error)]
pub enum RecorderError {
    /// Camera unavailable or closed, fatal to that camera's loop
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    /// Segment open/write/close failure, fatal to the current loop
    #[error("I/O error: {0}")]
    Io(String),
    /// Settings unreadable or unwritable
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Contract violation by the caller (write after close, double open, ...)
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<std::io::Error> for RecorderError {
    fn from(err: std::io::Error) -> Self {
        RecorderError::Io(err.to_string())
    }
}

/// Capture device errors
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The device could not be opened or configured
    #[error("camera {camera} unavailable: {reason}")]
    Unavailable { camera: SourceId, reason: String },
    /// The device went away while capturing
    #[error("camera {0} closed")]
    Closed(SourceId),
    /// Backend-level failure (pipeline, driver)
    #[error("backend error: {0}")]
    Backend(String),
}

/// Settings store errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Backing document could not be read
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    /// Backing document is not valid settings JSON
    #[error("malformed settings in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    /// Settings could not be persisted
    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },
    /// A stored entry violates the settings invariants
    #[error("invalid settings for camera {camera}: {reason}")]
    Invalid { camera: String, reason: String },
}

/// Finalize (remux) errors
#[derive(Debug, Clone, Error)]
pub enum FinalizeError {
    /// The remux tool could not be started
    #[error("{tool} unavailable: {reason}")]
    ToolUnavailable { tool: String, reason: String },
    /// The remux tool ran and failed
    #[error("{step} failed ({status}): {stderr}")]
    ToolFailed {
        step: String,
        status: String,
        stderr: String,
    },
    /// Filesystem error around the remux
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for FinalizeError {
    fn from(err: std::io::Error) -> Self {
        FinalizeError::Io(err.to_string())
    }
}
