use std::path::Path;

use anyhow::Context;
use pod_harness_core::prelude::{
    node_files, FinishRecord, NodeFileKind, RunOutcome, UploadSource, UploadTargets, ARTIFACTS_DIR,
};

/// Where the finish record is stored within the job's storage prefix.
pub const FINISHED_PATH: &str = "node-finished.json";

pub fn process_log_destination(index: usize) -> String {
    format!("process-logs/node-{index}.txt")
}

/// Everything to upload for a run with the given outcome, as found in `dir` right now.
pub fn collect_targets(dir: &Path, outcome: &RunOutcome) -> anyhow::Result<UploadTargets> {
    let mut targets = UploadTargets::new();

    for (index, path) in node_files(dir, NodeFileKind::ProcessLog)? {
        targets.insert(process_log_destination(index), UploadSource::File(path));
    }

    let artifacts = dir.join(ARTIFACTS_DIR);
    if artifacts.is_dir() {
        for entry in walkdir::WalkDir::new(&artifacts).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable artifact: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&artifacts)
                .context("Artifact outside the artifacts directory")?;
            let destination = format!("{ARTIFACTS_DIR}/{}", relative.to_string_lossy());
            targets.insert(destination, UploadSource::File(entry.into_path()));
        }
    }

    let record = FinishRecord::new(outcome);
    match record.to_json() {
        Ok(data) => {
            targets.insert(FINISHED_PATH.to_string(), UploadSource::Data(data));
        }
        Err(e) => log::warn!("Could not marshal finishing data: {e}"),
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pod_harness_core::prelude::RunResult;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_logs_artifacts_and_record() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(NodeFileKind::ProcessLog.path_in(dir.path(), 0), "a").unwrap();
        std::fs::write(NodeFileKind::ProcessLog.path_in(dir.path(), 3), "b").unwrap();
        std::fs::write(NodeFileKind::Marker.path_in(dir.path(), 0), "0").unwrap();
        std::fs::create_dir_all(dir.path().join("artifacts/node-0")).unwrap();
        std::fs::write(dir.path().join("artifacts/node-0/junit.xml"), "<x/>").unwrap();

        let outcome = RunOutcome {
            passed: true,
            ..Default::default()
        };
        let targets = collect_targets(dir.path(), &outcome).unwrap();

        assert_eq!(
            targets.keys().cloned().collect::<Vec<_>>(),
            vec![
                "artifacts/node-0/junit.xml".to_string(),
                FINISHED_PATH.to_string(),
                "process-logs/node-0.txt".to_string(),
                "process-logs/node-3.txt".to_string(),
            ]
        );

        let Some(UploadSource::Data(data)) = targets.get(FINISHED_PATH) else {
            panic!("finish record should be in-memory data");
        };
        let record = FinishRecord::from_json(data).unwrap();
        assert!(record.passed);
        assert_eq!(record.result, RunResult::Success);
    }
}
