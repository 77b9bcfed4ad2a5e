// SPDX-License-Identifier: GPL-3.0-only

//! Live preview of one camera
//!
//! At most one camera is selected. Its loop publishes every frame (annotated
//! in Motion mode) into a `watch` channel holding only the latest one.

use crate::backends::camera::SourceId;
use image::RgbImage;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub source: SourceId,
    pub sequence: u64,
    pub image: Arc<RgbImage>,
}

/// Preview slot plus latest-frame channel
#[derive(Clone)]
pub struct PreviewChannel {
    slot: Arc<RwLock<Option<SourceId>>>,
    sender: Arc<watch::Sender<Option<PreviewFrame>>>,
}

impl PreviewChannel {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            slot: Arc::new(RwLock::new(None)),
            sender: Arc::new(sender),
        }
    }

    /// Select the preview camera; last write wins
    pub fn select(&self, source: Option<SourceId>) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if *slot != source {
            debug!(previous = ?*slot, selected = ?source, "Preview source changed");
            *slot = source;
            // Drop a stale frame from the previously selected camera
            self.sender
                .send_if_modified(|frame| frame.take_if(|f| Some(f.source) != source).is_some());
        }
    }

    pub fn selected(&self) -> Option<SourceId> {
        *self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_selected(&self, source: SourceId) -> bool {
        self.selected() == Some(source)
    }

    pub fn publish(&self, source: SourceId, sequence: u64, image: RgbImage) {
        self.sender.send_replace(Some(PreviewFrame {
            source,
            sequence,
            image: Arc::new(image),
        }));
    }

    /// Clear the latest frame if `source` produced it
    pub fn release(&self, source: SourceId) {
        self.sender
            .send_if_modified(|frame| frame.take_if(|f| f.source == source).is_some());
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PreviewFrame>> {
        self.sender.subscribe()
    }
}

impl Default for PreviewChannel {
    fn default() -> Self {
        Self::new()
    }
}
