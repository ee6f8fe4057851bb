use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use node_sidecar::prelude::{process_log_destination, Sidecar, FINISHED_PATH};
use pod_harness_core::prelude::{
    FinishRecord, Interrupt, InterruptListener, JobSpec, JobType, NodeFileKind, PathStrategy,
    RunResult, SidecarOptions, StorageOptions, UploadSource, UploadTargets, Uploader,
};

const SCAN_INTERVAL: Duration = Duration::from_millis(50);
const RUN_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
struct RecordedUpload {
    destinations: Vec<String>,
    record: FinishRecord,
}

#[derive(Default)]
struct RecordingUploader {
    uploads: Mutex<Vec<RecordedUpload>>,
    fail: bool,
}

impl RecordingUploader {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Uploader for RecordingUploader {
    fn upload(&self, _spec: &JobSpec, targets: UploadTargets) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("bucket unavailable");
        }

        let record = match targets.get(FINISHED_PATH) {
            Some(UploadSource::Data(data)) => FinishRecord::from_json(data)?,
            other => anyhow::bail!("unexpected finish record source: {other:?}"),
        };
        self.uploads.lock().unwrap().push(RecordedUpload {
            destinations: targets.keys().cloned().collect(),
            record,
        });
        Ok(())
    }
}

fn options(dir: &Path, node_count: usize) -> SidecarOptions {
    SidecarOptions {
        node_count,
        base_dir: dir.to_path_buf(),
        storage: StorageOptions {
            bucket: "bucket".to_string(),
            path_strategy: PathStrategy::Explicit,
            default_org: String::new(),
            default_repo: String::new(),
            credentials_file: None,
            mount_root: dir.join("buckets"),
            dry_run: false,
        },
    }
}

fn spec() -> JobSpec {
    JobSpec {
        job_type: JobType::Periodic,
        job: "e2e".to_string(),
        build_id: "1".to_string(),
        job_id: "abc".to_string(),
        refs: None,
    }
}

/// Writes the marker in one step, the way the process wrapper does, so it is never seen empty.
fn finish_node(dir: &Path, index: usize, code: &str) {
    std::fs::write(NodeFileKind::ProcessLog.path_in(dir, index), "output").unwrap();
    let staging = dir.join(format!(".staging-{index}"));
    std::fs::write(&staging, code).unwrap();
    std::fs::rename(&staging, NodeFileKind::Marker.path_in(dir, index)).unwrap();
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn completes_when_nodes_finished_before_start() {
    let dir = tempfile::tempdir().unwrap();
    for index in 0..3 {
        finish_node(dir.path(), index, "0\n");
    }

    let uploader = Arc::new(RecordingUploader::default());
    let (_interrupts, listener) = InterruptListener::channel();
    let outcome = tokio::time::timeout(
        RUN_TIMEOUT,
        Sidecar::new(options(dir.path(), 3), spec(), uploader.clone())
            .with_scan_interval(SCAN_INTERVAL)
            .run(listener),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(outcome.passed);
    assert!(!outcome.aborted);

    let uploads = uploader.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].record.result, RunResult::Success);
    assert!(uploads[0].record.passed);
    for index in 0..3 {
        assert!(uploads[0]
            .destinations
            .contains(&process_log_destination(index)));
    }
}

#[tokio::test]
async fn waits_for_every_node_before_uploading() {
    let dir = tempfile::tempdir().unwrap();
    let uploader = Arc::new(RecordingUploader::default());
    let (_interrupts, listener) = InterruptListener::channel();

    let run = tokio::spawn(
        Sidecar::new(options(dir.path(), 3), spec(), uploader.clone())
            .with_scan_interval(SCAN_INTERVAL)
            .run(listener),
    );

    finish_node(dir.path(), 0, "0");
    finish_node(dir.path(), 1, "1");
    tokio::time::sleep(SCAN_INTERVAL * 4).await;
    assert!(!run.is_finished());
    assert!(uploader.uploads().is_empty());

    finish_node(dir.path(), 2, "0");
    let outcome = tokio::time::timeout(RUN_TIMEOUT, run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(!outcome.passed);
    let uploads = uploader.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].record.result, RunResult::Failure);
    assert!(!uploads[0].record.passed);
}

#[tokio::test]
async fn watch_alone_completes_the_barrier() {
    let dir = tempfile::tempdir().unwrap();
    let uploader = Arc::new(RecordingUploader::default());
    let (_interrupts, listener) = InterruptListener::channel();

    // Only the immediate first scan runs, every marker has to come through the watch.
    let run = tokio::spawn(
        Sidecar::new(options(dir.path(), 2), spec(), uploader.clone())
            .with_scan_interval(Duration::from_secs(60 * 60))
            .run(listener),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!run.is_finished());

    finish_node(dir.path(), 0, "0");
    finish_node(dir.path(), 1, "0");
    let outcome = tokio::time::timeout(RUN_TIMEOUT, run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(outcome.passed);
    let uploads = uploader.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].record.result, RunResult::Success);
}

#[tokio::test]
async fn interrupted_node_is_recorded_as_aborted_failure() {
    let dir = tempfile::tempdir().unwrap();
    finish_node(dir.path(), 0, "0");
    finish_node(dir.path(), 1, "130");

    let uploader = Arc::new(RecordingUploader::default());
    let (_interrupts, listener) = InterruptListener::channel();
    let outcome = tokio::time::timeout(
        RUN_TIMEOUT,
        Sidecar::new(options(dir.path(), 2), spec(), uploader.clone())
            .with_scan_interval(SCAN_INTERVAL)
            .run(listener),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(!outcome.passed);
    assert!(outcome.aborted);

    let record = &uploader.uploads()[0].record;
    assert_eq!(record.result, RunResult::Failure);
    assert!(record.aborted);
    assert_eq!(record.result, outcome.result());
    assert_eq!(record.passed, outcome.passed);
}

#[tokio::test]
async fn interrupt_triggers_exactly_one_best_effort_upload() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(NodeFileKind::ProcessLog.path_in(dir.path(), 0), "partial").unwrap();

    let uploader = Arc::new(RecordingUploader::default());
    let (interrupts, listener) = InterruptListener::channel();
    let run = tokio::spawn(
        Sidecar::new(options(dir.path(), 2), spec(), uploader.clone())
            .with_scan_interval(SCAN_INTERVAL)
            .run(listener),
    );

    interrupts.send(Interrupt::Terminate).await.unwrap();
    wait_for(|| uploader.uploads().len() == 1).await;

    let best_effort = uploader.uploads().remove(0);
    assert_eq!(best_effort.record.result, RunResult::Aborted);
    assert!(!best_effort.record.passed);
    assert!(!best_effort.record.aborted);
    assert_eq!(
        best_effort
            .destinations
            .iter()
            .filter(|d| d.starts_with("process-logs/"))
            .collect::<Vec<_>>(),
        vec![&process_log_destination(0)]
    );

    // Later interrupts are no longer delivered.
    assert!(interrupts.send(Interrupt::Interrupt).await.is_err());

    finish_node(dir.path(), 0, "0");
    finish_node(dir.path(), 1, "0");
    let outcome = tokio::time::timeout(RUN_TIMEOUT, run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(outcome.passed);

    let uploads = uploader.uploads();
    assert_eq!(uploads.len(), 2);
    assert_eq!(
        uploads
            .iter()
            .filter(|u| u.record.result == RunResult::Aborted)
            .count(),
        1
    );
    assert_eq!(uploads[1].record.result, RunResult::Success);
    assert!(uploads[1]
        .destinations
        .contains(&process_log_destination(1)));
}

#[tokio::test]
async fn failed_upload_is_the_final_error() {
    let dir = tempfile::tempdir().unwrap();
    finish_node(dir.path(), 0, "0");

    let (_interrupts, listener) = InterruptListener::channel();
    let result = tokio::time::timeout(
        RUN_TIMEOUT,
        Sidecar::new(
            options(dir.path(), 1),
            spec(),
            Arc::new(RecordingUploader::failing()),
        )
        .with_scan_interval(SCAN_INTERVAL)
        .run(listener),
    )
    .await
    .unwrap();

    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("bucket unavailable"));
}
