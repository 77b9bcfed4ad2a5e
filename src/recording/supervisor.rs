// SPDX-License-Identifier: GPL-3.0-only

//! Owner of all capture loops
//!
//! The supervisor spawns and joins [`CaptureWorker`]s, owns the cancellation
//! flag of the current start and the preview slot, and keeps the finalize
//! queue alive until shutdown.

use super::capture_loop::{CaptureLoop, LoopContext};
use super::preview::{PreviewChannel, PreviewFrame};
use super::worker::CaptureWorker;
use super::{LoopReport, StartRequest};
use crate::backends::camera::{DeviceProvider, SourceId};
use crate::clock::{Clock, SystemClock};
use crate::config::SettingsStore;
use crate::errors::{RecorderError, RecorderResult};
use crate::pipelines::video::{FinalizeQueue, FinalizeStats, Finalizer, SinkFactory};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Per-source result of [`RecordingSupervisor::start`]
#[derive(Debug, Clone)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    Failed(RecorderError),
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started)
    }
}

pub struct RecordingSupervisor {
    settings: SettingsStore,
    devices: Arc<dyn DeviceProvider>,
    sinks: Arc<dyn SinkFactory>,
    clock: Arc<dyn Clock>,
    preview: PreviewChannel,
    workers: HashMap<SourceId, CaptureWorker>,
    /// Cancellation flag of the current start; replaced once cancelled
    cancel: Arc<AtomicBool>,
    last_request: Option<StartRequest>,
    /// Reports of loops that ended before the next `wait`
    reports: Vec<LoopReport>,
    finalizer: Arc<dyn Finalizer>,
    finalize: FinalizeQueue,
}

impl RecordingSupervisor {
    pub fn new(
        settings: SettingsStore,
        devices: Arc<dyn DeviceProvider>,
        sinks: Arc<dyn SinkFactory>,
        finalizer: Arc<dyn Finalizer>,
    ) -> Self {
        Self {
            settings,
            devices,
            sinks,
            clock: Arc::new(SystemClock::new()),
            preview: PreviewChannel::new(),
            workers: HashMap::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            last_request: None,
            reports: Vec::new(),
            finalize: FinalizeQueue::new(Arc::clone(&finalizer)),
            finalizer,
        }
    }

    /// Use `clock` for loops started from now on
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start a capture loop for every source that is not already running
    ///
    /// Returns without waiting for the loops. A failure is reported for the
    /// affected source only.
    pub fn start(&mut self, request: StartRequest) -> Vec<(SourceId, StartOutcome)> {
        self.reap();

        if self.cancel.load(Ordering::SeqCst) {
            debug!("Previous start was cancelled, new cancellation generation");
            self.cancel = Arc::new(AtomicBool::new(false));
        }

        if self.finalize.handle().is_none() {
            debug!("Finalize queue was shut down, starting a new one");
            self.finalize = FinalizeQueue::new(Arc::clone(&self.finalizer));
        }

        let sources: BTreeSet<SourceId> = request.sources.iter().copied().collect();
        let mut outcomes = Vec::with_capacity(sources.len());

        for source in sources {
            let outcome = self.start_source(source, &request);
            match &outcome {
                StartOutcome::Started => {}
                StartOutcome::AlreadyRunning => {
                    debug!(camera = %source, "Already recording");
                }
                StartOutcome::Failed(e) => {
                    warn!(camera = %source, error = %e, "Failed to start recording");
                }
            }
            outcomes.push((source, outcome));
        }

        info!(
            mode = %request.mode,
            started = outcomes.iter().filter(|(_, o)| o.is_started()).count(),
            requested = outcomes.len(),
            "Recording started"
        );
        self.last_request = Some(request);
        outcomes
    }

    fn start_source(&mut self, source: SourceId, request: &StartRequest) -> StartOutcome {
        if self
            .workers
            .get(&source)
            .is_some_and(|w| w.is_running() && !w.is_cancelled())
        {
            return StartOutcome::AlreadyRunning;
        }

        let settings = match self.settings.resolve(source) {
            Ok(settings) => settings,
            Err(e) => return StartOutcome::Failed(e.into()),
        };

        // A loop of a cancelled start may still hold the device
        if let Some(mut previous) = self.workers.remove(&source) {
            debug!(camera = %source, "Waiting for previous loop to release the device");
            if let Some(report) = previous.join() {
                self.reports.push(report);
            }
        }

        let ctx = LoopContext {
            devices: Arc::clone(&self.devices),
            sinks: Arc::clone(&self.sinks),
            clock: Arc::clone(&self.clock),
            preview: self.preview.clone(),
            finalize: self.finalize.handle(),
            cancel: Arc::clone(&self.cancel),
        };
        let capture_loop = CaptureLoop::new(source, settings, request, ctx);

        match CaptureWorker::start(capture_loop, Arc::clone(&self.cancel)) {
            Ok(worker) => {
                self.workers.insert(source, worker);
                StartOutcome::Started
            }
            Err(e) => StartOutcome::Failed(e),
        }
    }

    /// Join workers whose loop already ended
    fn reap(&mut self) {
        let finished: Vec<SourceId> = self
            .workers
            .iter()
            .filter(|(_, w)| !w.is_running())
            .map(|(source, _)| *source)
            .collect();

        for source in finished {
            if let Some(mut worker) = self.workers.remove(&source)
                && let Some(report) = worker.join()
            {
                self.reports.push(report);
            }
        }
    }

    /// Signal every active loop to stop (non-blocking)
    pub fn stop(&self) {
        if !self.cancel.swap(true, Ordering::SeqCst) {
            info!(active = self.workers.len(), "Stopping recording");
        }
    }

    /// Wait for every loop to end and collect the reports
    pub fn wait(&mut self) -> Vec<LoopReport> {
        let mut reports = std::mem::take(&mut self.reports);
        for (_, mut worker) in self.workers.drain() {
            if let Some(report) = worker.join() {
                reports.push(report);
            }
        }
        reports.sort_by_key(|r| r.source);
        reports
    }

    /// Stop, wait until every device is released, then repeat the last start
    ///
    /// Reports of the stopped loops stay available to the next `wait`.
    pub fn restart(&mut self) -> RecorderResult<Vec<(SourceId, StartOutcome)>> {
        let request = self
            .last_request
            .clone()
            .ok_or_else(|| RecorderError::InvalidState("nothing to restart".to_string()))?;

        info!(mode = %request.mode, "Restarting recording");
        self.stop();
        let reports = self.wait();
        self.reports = reports;
        Ok(self.start(request))
    }

    /// Expose frames of `source` on the preview channel
    pub fn set_preview(&self, source: SourceId) -> RecorderResult<()> {
        if !self.workers.get(&source).is_some_and(|w| w.is_running()) {
            return Err(RecorderError::InvalidState(format!(
                "camera {} is not recording",
                source
            )));
        }
        self.preview.select(Some(source));
        Ok(())
    }

    pub fn clear_preview(&self) {
        self.preview.select(None);
    }

    pub fn preview_source(&self) -> Option<SourceId> {
        self.preview.selected()
    }

    pub fn preview_frames(&self) -> watch::Receiver<Option<PreviewFrame>> {
        self.preview.subscribe()
    }

    /// Sources whose loop is still running
    pub fn active_sources(&self) -> Vec<SourceId> {
        let mut sources: Vec<SourceId> = self
            .workers
            .iter()
            .filter(|(_, w)| w.is_running())
            .map(|(source, _)| *source)
            .collect();
        sources.sort();
        sources
    }

    /// Counters of the current finalize queue (a new queue after `shutdown`)
    pub fn finalize_stats(&self) -> Arc<FinalizeStats> {
        self.finalize.stats()
    }

    /// Stop everything and drain the finalize queue
    pub fn shutdown(&mut self) -> Vec<LoopReport> {
        self.stop();
        let reports = self.wait();
        self.finalize.shutdown();
        reports
    }
}

impl Drop for RecordingSupervisor {
    fn drop(&mut self) {
        self.stop();
        for (_, mut worker) in self.workers.drain() {
            worker.join();
        }
    }
}
