// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Defaults used when a camera has no stored settings
pub mod defaults {
    /// Capture width in pixels
    pub const RESOLUTION_X: u32 = 1280;

    /// Capture height in pixels
    pub const RESOLUTION_Y: u32 = 720;

    /// Requested capture rate
    pub const FPS: f64 = 30.0;

    /// Container extension
    pub const EXTENSION: &str = "avi";

    /// Root folder for recordings; the camera id is appended
    pub const REC_FOLDER_ROOT: &str = "recordings";

    /// Sortable local timestamp, one-second resolution
    pub const REC_PATTERN: &str = "%Y-%m-%d %H-%M-%S";

    /// Loop mode segment length (seconds)
    pub const REC_LENGTH: u64 = 180;

    /// Timer mode session length (seconds)
    pub const TIMER_LENGTH: u64 = 300;

    /// Motion mode idle timeout (seconds)
    pub const MOTION_LENGTH: u64 = 30;

    /// Application directory below the platform config dir
    pub const CONFIG_DIR_NAME: &str = "camrec";

    /// Settings file name
    pub const CONFIG_FILE_NAME: &str = "config.json";
}

/// Supported segment containers
pub mod containers {
    /// Extensions the segment encoder can mux
    pub const SUPPORTED_EXTENSIONS: &[&str] = &["avi", "mp4", "mov", "mkv"];

    /// Check if a container extension is supported
    pub fn is_supported(ext: &str) -> bool {
        SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Motion detection tuning
pub mod motion {
    use super::Duration;

    /// Minimum bounding-box area (px²) of a changed region counted as movement
    pub const MIN_AREA: u32 = 3000;

    /// Gaussian sigma, roughly a 21x21 kernel
    pub const BLUR_SIGMA: f32 = 3.5;

    /// Luma difference above which a pixel counts as changed
    pub const DIFF_THRESHOLD: u8 = 25;

    /// Dilation passes over the binary mask (3x3 structuring element)
    pub const DILATE_ITERATIONS: u32 = 2;

    /// Consecutive empty reads of a stalled motion-mode device between warnings
    pub const EMPTY_READ_WARN_INTERVAL: u32 = 50;

    /// Back-off between empty reads in motion mode
    pub const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(10);
}

/// Finalize queue constants
pub mod finalize {
    /// Maximum number of closed segments waiting for remux
    pub const QUEUE_DEPTH: usize = 4;

    /// Remux tool binary
    pub const FFMPEG_BINARY: &str = "ffmpeg";
}

/// GStreamer pipeline constants
pub mod pipeline {
    /// Maximum buffer queue size on the capture appsink
    pub const MAX_BUFFERS: u32 = 2;

    /// Pixel format exchanged between devices, detector and encoder
    pub const FRAME_FORMAT: &str = "RGB";

    /// Encoder bitrate in kbps
    pub const ENCODER_BITRATE_KBPS: u32 = 4_000;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 300;

    /// How long a device read may block before it counts as an empty read
    pub const FRAME_READ_TIMEOUT: Duration = Duration::from_secs(5);

    /// Pipeline playing state timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// Maximum wait for the encoder to drain on segment close
    pub const EOS_TIMEOUT_SECS: u64 = 10;

    /// Poll interval of the CLI control loop
    pub const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Interval between preview snapshots written by the CLI
    pub const PREVIEW_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);
}
