use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use pod_harness_core::prelude::{
    node_files, InterruptListener, JobSpec, NodeFileKind, RunOutcome, SidecarOptions, Uploader,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::barrier::{CompletionBarrier, Observation};
use crate::outcome::scan_outcome;
use crate::targets::collect_targets;
use crate::watch::{MarkerWatch, WatchEvent};

/// How often the log directory is rescanned in case the watch missed a marker file.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Waits for every node in the pod to finish and then uploads the run's logs, artifacts and
/// finish record.
pub struct Sidecar<U> {
    options: SidecarOptions,
    upload: UploadContext<U>,
    scan_interval: Duration,
}

impl<U: Uploader + 'static> Sidecar<U> {
    pub fn new(options: SidecarOptions, spec: JobSpec, uploader: Arc<U>) -> Self {
        let upload = UploadContext {
            dir: options.base_dir.clone(),
            spec: Arc::new(spec),
            uploader,
        };

        Self {
            options,
            upload,
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }

    pub fn with_scan_interval(mut self, scan_interval: Duration) -> Self {
        self.scan_interval = scan_interval;
        self
    }

    /// Run until every node has finished and the final upload is done.
    ///
    /// If an interrupt arrives before that, a best-effort upload of whatever is present at that
    /// moment is started straight away. It may race with the final upload, both write to the same
    /// destinations and the later one wins. Only the first interrupt is acted on.
    ///
    /// Returns the uploaded outcome. The error is the final upload's, the outcome of the test
    /// itself is only reported in the finish record.
    pub async fn run(self, interrupts: InterruptListener) -> anyhow::Result<RunOutcome> {
        let interrupt_guard = AbortOnDrop(tokio::spawn(upload_on_interrupt(
            interrupts,
            self.upload.clone(),
        )));

        let dir = self.options.base_dir.clone();
        let (watch, events) = MarkerWatch::start(&dir)?;

        let barrier = CompletionBarrier::new(self.options.node_count);
        log::info!("Waiting for {} node(s) to finish", barrier.expected());

        let barrier = tokio::spawn(await_completion(
            barrier,
            events,
            dir.clone(),
            self.scan_interval,
        ))
        .await
        .context("Completion barrier task failed")?;

        drop(watch);
        // No interrupt may cut the final upload short from here on.
        drop(interrupt_guard);

        log::info!(
            "All nodes finished: {:?}",
            barrier.finished().collect::<Vec<_>>()
        );

        let outcome = scan_outcome(&dir)?;
        log::info!(
            "Run result {} (passed: {}, aborted: {})",
            outcome.result(),
            outcome.passed,
            outcome.aborted
        );

        self.upload
            .upload(outcome)
            .await
            .context("Failed to upload to storage")?;

        Ok(outcome)
    }
}

struct UploadContext<U> {
    dir: PathBuf,
    spec: Arc<JobSpec>,
    uploader: Arc<U>,
}

impl<U> Clone for UploadContext<U> {
    fn clone(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            spec: self.spec.clone(),
            uploader: self.uploader.clone(),
        }
    }
}

impl<U: Uploader + 'static> UploadContext<U> {
    async fn upload(&self, outcome: RunOutcome) -> anyhow::Result<()> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let targets = collect_targets(&this.dir, &outcome)?;
            log::info!("Uploading {} object(s)", targets.len());
            this.uploader.upload(&this.spec, targets)
        })
        .await
        .context("Upload task failed")?
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn upload_on_interrupt<U: Uploader + 'static>(
    mut interrupts: InterruptListener,
    upload: UploadContext<U>,
) {
    let Some(interrupt) = interrupts.recv().await else {
        return;
    };
    drop(interrupts);

    log::error!("Received an interrupt: {interrupt}, starting best-effort upload");
    match upload.upload(RunOutcome::interrupted()).await {
        Ok(()) => log::info!("Best-effort upload finished"),
        Err(e) => log::error!("Best-effort upload failed: {e:?}"),
    }
}

async fn await_completion(
    mut barrier: CompletionBarrier,
    mut events: UnboundedReceiver<WatchEvent>,
    dir: PathBuf,
    scan_interval: Duration,
) -> CompletionBarrier {
    // The first tick fires immediately, catching nodes that finished before the watch started.
    let mut ticker = tokio::time::interval(scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut watching = true;

    while !barrier.is_complete() {
        tokio::select! {
            event = events.recv(), if watching => match event {
                Some(WatchEvent::MarkerCreated(index)) => match barrier.observe(index) {
                    Observation::Counted => {
                        log::info!("Node {index} finished, {} remaining", barrier.remaining());
                    }
                    Observation::Duplicate => {}
                    Observation::OutOfRange => {
                        log::warn!("Ignoring marker for unknown node {index}");
                    }
                },
                Some(WatchEvent::Error(e)) => {
                    log::info!("Encountered an error during marker watch: {e}");
                }
                None => {
                    log::warn!("Marker watch closed, relying on periodic scans");
                    watching = false;
                }
            },
            _ = ticker.tick() => scan_for_markers(&mut barrier, &dir),
        }
    }

    barrier
}

fn scan_for_markers(barrier: &mut CompletionBarrier, dir: &Path) {
    match node_files(dir, NodeFileKind::Marker) {
        Ok(markers) => {
            let counted = barrier.observe_scan(markers.into_iter().map(|(index, _)| index));
            if counted > 0 {
                log::info!(
                    "Scan found {counted} finished node(s) not seen by the watch, {} remaining",
                    barrier.remaining()
                );
            }
        }
        Err(e) => log::warn!("Failed to scan for marker files: {e:?}"),
    }
}
