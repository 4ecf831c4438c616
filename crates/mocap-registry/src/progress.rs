//! Progress events from the pipeline to the registry.
//!
//! The pipeline reports bare percentages; a forwarder task derives the
//! coarse stage label from the fixed progress bands and writes it into the
//! registry. The channel keeps pipeline internals decoupled from registry
//! mutation.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mocap_models::{JobId, Stage};

use crate::registry::JobRegistry;

/// One progress report from a running pipeline.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub percent: u8,
}

/// Sending half handed to the pipeline executor.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    /// Report a progress checkpoint. Send failures mean the consumer is
    /// gone (shutdown); reports are fire-and-forget either way.
    pub fn report(&self, job_id: &JobId, percent: u8) {
        let _ = self.tx.send(ProgressEvent {
            job_id: job_id.clone(),
            percent,
        });
    }
}

/// Create the progress channel.
pub fn progress_channel() -> (ProgressSender, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, rx)
}

/// Spawn the forwarder that turns progress events into registry updates.
///
/// Runs until every sender is dropped.
pub fn spawn_progress_forwarder(
    registry: Arc<JobRegistry>,
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let stage = Stage::from_progress(event.percent);
            registry.update_stage(&event.job_id, stage, event.percent);
        }
    })
}
