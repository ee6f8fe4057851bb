use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use pod_harness_core::prelude::{NodeFileKind, ARTIFACTS_DIR};
use serde::{Deserialize, Serialize};

/// Environment variable the process wrapper reads its [WrapperOptions] from.
pub const ENTRYPOINT_OPTIONS_ENV: &str = "ENTRYPOINT_OPTIONS";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(15);

/// Configuration for the process wrapper that runs a node's original command.
///
/// The wrapper writes the command's output to `process_log` and, once the command has exited and
/// the output is flushed, writes the exit code to `marker_file`. Durations are encoded as integer
/// nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperOptions {
    pub args: Vec<String>,
    #[serde(with = "nanos")]
    pub timeout: Duration,
    #[serde(with = "nanos")]
    pub grace_period: Duration,
    pub artifact_dir: String,
    pub process_log: String,
    pub marker_file: String,
}

impl WrapperOptions {
    /// Options for node `index`, with its files placed in `log_dir` as seen from inside the pod.
    pub fn for_node(index: usize, args: Vec<String>, log_dir: &Path) -> Self {
        Self {
            args,
            timeout: DEFAULT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            artifact_dir: log_dir
                .join(ARTIFACTS_DIR)
                .join(format!("node-{index}"))
                .to_string_lossy()
                .into_owned(),
            process_log: NodeFileKind::ProcessLog
                .path_in(log_dir, index)
                .to_string_lossy()
                .into_owned(),
            marker_file: NodeFileKind::Marker
                .path_in(log_dir, index)
                .to_string_lossy()
                .into_owned(),
        }
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).context("Could not encode entrypoint configuration as JSON")
    }
}

mod nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encodes_node_options() {
        let options = WrapperOptions::for_node(
            2,
            vec!["/bin/sebak".to_string(), "node".to_string()],
            Path::new("/logs"),
        );

        let encoded: serde_json::Value = serde_json::from_str(&options.encode().unwrap()).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({
                "args": ["/bin/sebak", "node"],
                "timeout": 7_200_000_000_000u64,
                "grace_period": 15_000_000_000u64,
                "artifact_dir": "/logs/artifacts/node-2",
                "process_log": "/logs/process-log-2.txt",
                "marker_file": "/logs/marker-file-2.txt",
            })
        );
    }

    #[test]
    fn marker_path_follows_the_naming_convention() {
        let options = WrapperOptions::for_node(7, vec![], Path::new("/logs"));
        assert_eq!(NodeFileKind::Marker.parse(&options.marker_file), Ok(7));
        assert_eq!(NodeFileKind::ProcessLog.parse(&options.process_log), Ok(7));
    }
}
