// SPDX-License-Identifier: GPL-3.0-only

//! Frame processing pipelines
//!
//! - [`motion`]: frame-pair motion detection
//! - [`video`]: segment encoding and finalize

pub mod motion;
pub mod video;
