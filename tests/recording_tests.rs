// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the public recording types

use camrec::constants::{containers, defaults, finalize, motion};
use camrec::pipelines::motion::MotionDetector;
use camrec::pipelines::video::Segment;
use camrec::{Frame, RecordingMode, SourceId, StartRequest};
use chrono::Local;
use image::{Rgb, RgbImage};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_mode_names() {
    for (name, mode) in [
        ("loop", RecordingMode::Loop),
        ("timer", RecordingMode::Timer),
        ("motion", RecordingMode::Motion),
    ] {
        assert_eq!(name.parse::<RecordingMode>().unwrap(), mode);
        assert_eq!(mode.to_string(), name);
    }
    assert!("continuous".parse::<RecordingMode>().is_err());
}

#[test]
fn test_start_request_defaults() {
    let request = StartRequest::new(RecordingMode::Timer, [SourceId(0)]);
    assert_eq!(request.timer, None);
    assert_eq!(request.speed, 1.0);
    assert_eq!(request.sources, vec![SourceId(0)]);
}

#[test]
fn test_measured_fps_scenario() {
    let segment = Segment {
        path: PathBuf::from("recordings/0/seg.avi"),
        started_at: Local::now(),
        frame_count: 200,
        elapsed: Duration::from_secs(6),
    };
    assert_eq!(segment.measured_fps(), Some(34));
}

#[test]
fn test_motion_threshold_area() {
    let detector = MotionDetector::default();
    assert_eq!(detector.min_area(), motion::MIN_AREA);

    let still = Frame::new(RgbImage::new(320, 240), 0);
    let mut changed = RgbImage::new(320, 240);
    for y in 60..140 {
        for x in 100..180 {
            changed.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
    let changed = Frame::new(changed, 1);

    assert!(!detector.detect(&still, &still).moved);
    assert!(detector.detect(&still, &changed).moved);
}

#[test]
fn test_constants_are_consistent() {
    assert!(containers::is_supported(defaults::EXTENSION));
    assert!(containers::is_supported("MKV"));
    assert!(!containers::is_supported("webm"));
    assert_eq!(finalize::QUEUE_DEPTH, 4);
    assert!(motion::EMPTY_READ_WARN_INTERVAL > 0);
}
