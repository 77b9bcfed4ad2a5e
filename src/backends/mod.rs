// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera capture
//!
//! The recording engine only sees the traits in [`camera`]; the concrete
//! GStreamer implementation lives behind the `gstreamer` feature.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Recording engine               │
//! └────────────────────┬────────────────────────┘
//!                      │ DeviceProvider / CaptureDevice
//! ┌────────────────────┴────────────────────────┐
//! │  ┌──────────────────┐   ┌───────────────┐   │
//! │  │ V4L2 (GStreamer) │   │   Synthetic   │   │
//! │  │                  │   │   (tests)     │   │
//! │  └──────────────────┘   └───────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod camera;
