use std::path::Path;

use anyhow::Context;
use pod_harness_core::prelude::{node_files, NodeFileKind, RunOutcome, INTERRUPTED_EXIT_CODE};

/// Work out the run outcome from the marker files currently in `dir`.
///
/// The run passed only if every marker holds exit code 0. A marker that cannot be read or parsed
/// counts as a failed node without stopping the scan of the others. A marker holding the
/// interrupted exit code additionally marks the run aborted.
pub fn scan_outcome(dir: &Path) -> anyhow::Result<RunOutcome> {
    let mut outcome = RunOutcome {
        passed: true,
        ..Default::default()
    };

    for (index, path) in node_files(dir, NodeFileKind::Marker)? {
        match read_exit_code(&path) {
            Ok(0) => {}
            Ok(code) => {
                log::info!("Node {index} exited with code {code}");
                outcome.passed = false;
                if code == INTERRUPTED_EXIT_CODE {
                    outcome.aborted = true;
                }
            }
            Err(e) => {
                log::warn!("Treating node {index} as failed: {e:?}");
                outcome.passed = false;
            }
        }
    }

    Ok(outcome)
}

fn read_exit_code(path: &Path) -> anyhow::Result<i32> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read return code from {}", path.display()))?;
    data.trim()
        .parse::<i32>()
        .with_context(|| format!("Failed to parse process return code {data:?}"))
}
