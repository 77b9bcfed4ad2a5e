// SPDX-License-Identifier: MPL-2.0

//! Segment recording
//!
//! - [`segment`]: segment writer and file naming
//! - [`finalizer`]: frame-rate correction of closed segments
//! - [`recorder`] / [`muxer`]: GStreamer encoder behind the segment writer

pub mod finalizer;
#[cfg(feature = "gstreamer")]
pub mod muxer;
#[cfg(feature = "gstreamer")]
pub mod recorder;
pub mod segment;

pub use finalizer::{FfmpegFinalizer, FinalizeHandle, FinalizeQueue, FinalizeStats, Finalizer};
#[cfg(feature = "gstreamer")]
pub use recorder::GstSinkFactory;
pub use segment::{Segment, SegmentNamer, SegmentSink, SegmentWriter, SinkFactory};
