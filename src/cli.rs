// SPDX-License-Identifier: GPL-3.0-only

//! Command-line control surface

use camrec::config::{JsonFileStore, SettingsStore};
use camrec::{RecordingMode, SourceId};
use std::path::PathBuf;

/// Options of `camrec record`
pub struct RecordOptions {
    pub mode: RecordingMode,
    pub timer: Option<u64>,
    pub speed: f64,
    pub sources: Vec<SourceId>,
    pub preview: Option<SourceId>,
    pub preview_file: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

fn open_settings(config: Option<PathBuf>) -> SettingsStore {
    let path = config.unwrap_or_else(JsonFileStore::default_path);
    tracing::debug!(path = %path.display(), "Using settings file");
    SettingsStore::open_json(path)
}

/// Record until Ctrl+C or until every loop has ended
#[cfg(feature = "gstreamer")]
pub fn record(options: RecordOptions) -> Result<(), Box<dyn std::error::Error>> {
    use camrec::backends::camera::v4l2::GstDeviceProvider;
    use camrec::constants::timing;
    use camrec::pipelines::video::{FfmpegFinalizer, GstSinkFactory};
    use camrec::recording::{RecordingSupervisor, StartOutcome, StartRequest};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};
    use tracing::warn;

    if !options.speed.is_finite() || options.speed <= 0.0 {
        return Err(format!("Speed must be positive, got {}", options.speed).into());
    }

    let settings = open_settings(options.config);
    let mut supervisor = RecordingSupervisor::new(
        settings,
        Arc::new(GstDeviceProvider::new()?),
        Arc::new(GstSinkFactory::new()?),
        Arc::new(FfmpegFinalizer::new()),
    );

    let mut request = StartRequest::new(options.mode, options.sources).with_speed(options.speed);
    if let Some(secs) = options.timer {
        request = request.with_timer(Duration::from_secs(secs));
    }

    println!("Recording in {} mode", request.mode);
    let outcomes = supervisor.start(request);
    for (source, outcome) in &outcomes {
        match outcome {
            StartOutcome::Started => println!("  camera {}: recording", source),
            StartOutcome::AlreadyRunning => println!("  camera {}: already recording", source),
            StartOutcome::Failed(e) => println!("  camera {}: {}", source, e),
        }
    }
    if !outcomes.iter().any(|(_, o)| o.is_started()) {
        return Err("No camera could be started".into());
    }

    if let Some(source) = options.preview {
        // The loop is already running, so this only fails for a camera that did not start
        if let Err(e) = supervisor.set_preview(source) {
            warn!(camera = %source, error = %e, "Preview unavailable");
        }
    }
    let preview_frames = supervisor.preview_frames();

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!("Press Ctrl+C to stop");
    let start = Instant::now();
    let mut last_snapshot = Instant::now();

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping...");
            break;
        }

        let active = supervisor.active_sources();
        if active.is_empty() {
            println!();
            println!("All cameras stopped");
            break;
        }

        if let Some(path) = &options.preview_file
            && last_snapshot.elapsed() >= timing::PREVIEW_SNAPSHOT_INTERVAL
        {
            last_snapshot = Instant::now();
            let latest = preview_frames.borrow().clone();
            if let Some(frame) = latest
                && let Err(e) = frame.image.save_with_format(path, image::ImageFormat::Jpeg)
            {
                warn!(path = %path.display(), error = %e, "Failed to write preview frame");
            }
        }

        let elapsed = start.elapsed().as_secs();
        print!(
            "\rRecording: {:02}:{:02}:{:02} ({} active)",
            elapsed / 3600,
            (elapsed / 60) % 60,
            elapsed % 60,
            active.len()
        );
        std::io::Write::flush(&mut std::io::stdout())?;

        std::thread::sleep(timing::CONTROL_POLL_INTERVAL);
    }

    println!("Finishing segments...");
    let reports = supervisor.shutdown();
    for report in &reports {
        println!(
            "  camera {}: {} ({} segments, {} frames, last fps {})",
            report.source,
            report.exit,
            report.segments.len(),
            report.frames_written(),
            report
                .last_measured_fps
                .map(|fps| fps.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        for segment in &report.segments {
            println!("    {}", segment.path.display());
        }
    }

    let stats = supervisor.finalize_stats();
    println!(
        "Finalized {} segments ({} failed)",
        stats.completed(),
        stats.failed()
    );
    Ok(())
}

#[cfg(not(feature = "gstreamer"))]
pub fn record(_options: RecordOptions) -> Result<(), Box<dyn std::error::Error>> {
    Err("camrec was built without the gstreamer feature; recording is unavailable".into())
}

/// Print the settings collection, creating defaults for `sources`
pub fn show_settings(
    sources: &[SourceId],
    config: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = open_settings(config);
    for source in sources {
        settings.resolve(*source)?;
    }

    println!("{}", serde_json::to_string_pretty(&settings.all()?)?);
    Ok(())
}
