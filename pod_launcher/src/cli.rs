use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pod_harness_core::logging;
use pod_harness_core::prelude::{PathStrategy, StorageOptions};

use crate::readiness::ReadinessPolicy;
use crate::template;

pub const DEFAULT_ENTRYPOINT_IMAGE: &str = "registry.svc.ci.openshift.org/ci/entrypoint:latest";
pub const DEFAULT_SIDECAR_IMAGE: &str = "gcr.io/devenv-205606/node-sidecar:latest";

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct LauncherCli {
    /// Directory holding the staged `docker_image` file. The launch record is written here too.
    #[clap(long, env = "LOG_MOUNT_PATH", default_value = "/logs")]
    pub log_path: PathBuf,

    /// Template for the test job, rendered with `Host`, `ContainerImage` and `DataDir`.
    ///
    /// Must render to a JSON object with the pod spec under `spec`. Every container in that spec is
    /// one node of the test.
    #[clap(long, env = "CLUSTER_SPEC")]
    pub cluster_spec: String,

    /// Template describing how to reach the launched cluster, rendered with `Host` set to the pod IP.
    #[clap(long, env = "CLUSTER_INFO", default_value = "")]
    pub cluster_info: String,

    /// The id of the job this launch belongs to. The pod is named `pod-<job id>`.
    #[clap(long, env = "PROW_JOB_ID")]
    pub job_id: String,

    /// The JSON encoded job spec, passed on to the sidecar untouched.
    #[clap(long, env = "JOB_SPEC", default_value = "")]
    pub job_spec: String,

    /// Name of the secret holding the storage service account.
    #[clap(long, env = "GCS_CREDENTIALS_NAME", default_value = "gcs-credentials")]
    pub credentials_secret: String,

    /// Namespace to create the pod in. Defaults to the client's namespace.
    #[clap(long, env = "POD_NAMESPACE")]
    pub namespace: Option<String>,

    /// Image that provides the process wrapper binary at `/entrypoint`.
    #[clap(long, default_value = DEFAULT_ENTRYPOINT_IMAGE)]
    pub entrypoint_image: String,

    #[clap(long, default_value = DEFAULT_SIDECAR_IMAGE)]
    pub sidecar_image: String,

    #[clap(long, default_value = "bos-e2e-test")]
    pub bucket: String,

    #[clap(long, default_value = "legacy", value_parser = parse_path_strategy)]
    pub path_strategy: PathStrategy,

    #[clap(long, default_value = "owlchain")]
    pub default_org: String,

    #[clap(long, default_value = "sebak")]
    pub default_repo: String,

    /// Where the sidecar finds mounted buckets.
    #[clap(long, default_value = "/buckets")]
    pub bucket_mount_root: PathBuf,

    /// Persistent volume claim to mount at the bucket mount root in the sidecar.
    #[clap(long)]
    pub bucket_claim: Option<String>,

    /// Have the sidecar log what it would upload instead of uploading.
    #[clap(long, default_value = "false")]
    pub dry_run: bool,

    /// Seconds to wait before the first readiness check. Doubles after every check.
    #[clap(long, default_value = "3")]
    pub readiness_backoff: u64,

    /// Give up waiting for the pod to become ready after this many checks.
    #[clap(long, default_value = "5")]
    pub readiness_attempts: u32,
}

impl LauncherCli {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.job_id.is_empty() {
            anyhow::bail!("No job id given");
        }
        if self.cluster_spec.trim().is_empty() {
            anyhow::bail!("No cluster spec template given");
        }
        if self.readiness_attempts == 0 {
            anyhow::bail!("At least one readiness attempt is required");
        }
        template::check("cluster spec", &self.cluster_spec)?;
        template::check("cluster info", &self.cluster_info)?;
        self.storage_options(PathBuf::new()).validate()?;
        Ok(())
    }

    /// Storage options for the sidecar, which reads its credentials from `credentials_file`.
    pub fn storage_options(&self, credentials_file: PathBuf) -> StorageOptions {
        StorageOptions {
            bucket: self.bucket.clone(),
            path_strategy: self.path_strategy,
            default_org: self.default_org.clone(),
            default_repo: self.default_repo.clone(),
            credentials_file: Some(credentials_file),
            mount_root: self.bucket_mount_root.clone(),
            dry_run: self.dry_run,
        }
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            initial_backoff: Duration::from_secs(self.readiness_backoff),
            max_attempts: self.readiness_attempts,
        }
    }
}

fn parse_path_strategy(s: &str) -> anyhow::Result<PathStrategy> {
    match s {
        "legacy" => Ok(PathStrategy::Legacy),
        "single" => Ok(PathStrategy::Single),
        "explicit" => Ok(PathStrategy::Explicit),
        other => Err(anyhow::anyhow!("Unknown path strategy '{other}'")),
    }
}

/// Initialise logging and parse the command line for the pod launcher.
pub fn init() -> LauncherCli {
    logging::init("pod-launcher");

    LauncherCli::parse()
}
