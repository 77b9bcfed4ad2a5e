// SPDX-License-Identifier: MPL-2.0

//! Container muxing for segment files
//!
//! The container is chosen by the segment's file extension.

use gstreamer as gst;
use gstreamer::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Muxer element for a container extension
pub fn muxer_name(extension: &str) -> Option<&'static str> {
    match extension.to_lowercase().as_str() {
        "avi" => Some("avimux"),
        "mp4" | "mov" => Some("mp4mux"),
        "mkv" => Some("matroskamux"),
        _ => None,
    }
}

/// Create the muxer for `extension`
///
/// # Returns
/// * `Ok(Element)` - Configured muxer
/// * `Err(String)` - Unsupported extension or missing plugin
pub fn create_muxer(extension: &str) -> Result<gst::Element, String> {
    let name = muxer_name(extension)
        .ok_or_else(|| format!("No muxer for container extension {:?}", extension))?;

    let muxer = gst::ElementFactory::make(name)
        .build()
        .map_err(|e| format!("Failed to create {}: {}", name, e))?;

    // Seekable output: durations and indexes are written on EOS
    if muxer.has_property("streamable") {
        muxer.set_property("streamable", false);
        debug!(muxer = name, "Configured muxer with streamable=false");
    }

    Ok(muxer)
}

/// Create the filesink writing to `output_path`
pub fn create_filesink(output_path: &Path) -> Result<gst::Element, String> {
    info!(path = %output_path.display(), "Creating filesink");
    gst::ElementFactory::make("filesink")
        .property("location", output_path.to_string_lossy().to_string())
        .build()
        .map_err(|e| format!("Failed to create filesink: {}", e))
}
