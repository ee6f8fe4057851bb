use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::job_spec::{JobSpec, JobType};
use crate::options::OptionsError;

/// How the org/repo of a presubmit job is encoded into its storage path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum PathStrategy {
    /// Omit the default org and repo entirely, omit only the default org otherwise.
    #[default]
    #[display("legacy")]
    Legacy,
    /// Omit the default org.
    #[display("single")]
    Single,
    /// Always include org and repo.
    #[display("explicit")]
    Explicit,
}

/// Where and how to upload job output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOptions {
    pub bucket: String,
    #[serde(default)]
    pub path_strategy: PathStrategy,
    #[serde(default)]
    pub default_org: String,
    #[serde(default)]
    pub default_repo: String,
    /// Service account credentials for the bucket, mounted from a secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,
    /// Directory that buckets are mounted under.
    #[serde(default = "default_mount_root")]
    pub mount_root: PathBuf,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_mount_root() -> PathBuf {
    PathBuf::from("/buckets")
}

impl StorageOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.bucket.is_empty() {
            return Err(OptionsError::NoBucket);
        }
        if self.path_strategy != PathStrategy::Explicit
            && (self.default_org.is_empty() || self.default_repo.is_empty())
        {
            return Err(OptionsError::MissingDefaults(self.path_strategy));
        }
        Ok(())
    }

    /// The path, relative to the bucket root, under which everything for this job is stored.
    pub fn job_prefix(&self, spec: &JobSpec) -> anyhow::Result<String> {
        match spec.job_type {
            JobType::Periodic | JobType::Postsubmit => {
                Ok(format!("logs/{}/{}", spec.job, spec.build_id))
            }
            JobType::Batch => Ok(format!("pr-logs/pull/batch/{}/{}", spec.job, spec.build_id)),
            JobType::Presubmit => {
                let refs = spec
                    .refs
                    .as_ref()
                    .context("Presubmit job spec has no refs")?;
                let pull = refs
                    .pulls
                    .first()
                    .context("Presubmit job spec has no pull request")?;

                let segment = self.repo_segment(&refs.org, &refs.repo);
                let mut prefix = String::from("pr-logs/pull/");
                if !segment.is_empty() {
                    prefix.push_str(&segment);
                    prefix.push('/');
                }
                Ok(format!("{prefix}{}/{}/{}", pull.number, spec.job, spec.build_id))
            }
        }
    }

    fn repo_segment(&self, org: &str, repo: &str) -> String {
        let default_org = org == self.default_org;
        match self.path_strategy {
            PathStrategy::Explicit => format!("{org}_{repo}"),
            PathStrategy::Legacy if default_org && repo == self.default_repo => String::new(),
            PathStrategy::Legacy | PathStrategy::Single if default_org => repo.to_string(),
            PathStrategy::Legacy | PathStrategy::Single => format!("{org}_{repo}"),
        }
    }
}

/// Content of a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    File(PathBuf),
    Data(Vec<u8>),
}

/// Destination path within the job's storage prefix mapped to the content to put there.
pub type UploadTargets = BTreeMap<String, UploadSource>;

/// Uploads a batch of targets to object storage.
///
/// Uploading the same destination twice overwrites it, so concurrent or repeated uploads of the
/// same job are safe.
pub trait Uploader: Send + Sync {
    fn upload(&self, spec: &JobSpec, targets: UploadTargets) -> anyhow::Result<()>;
}

/// Uploads into a bucket mounted on the local filesystem at `<mount_root>/<bucket>`.
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    options: StorageOptions,
}

impl DirectoryUploader {
    pub fn new(options: StorageOptions) -> Self {
        Self { options }
    }

    fn bucket_root(&self) -> PathBuf {
        self.options.mount_root.join(&self.options.bucket)
    }
}

impl Uploader for DirectoryUploader {
    fn upload(&self, spec: &JobSpec, targets: UploadTargets) -> anyhow::Result<()> {
        if let Some(credentials) = &self.options.credentials_file {
            if !credentials.exists() {
                anyhow::bail!(
                    "Storage credentials file {} does not exist",
                    credentials.display()
                );
            }
        }

        let prefix = self.options.job_prefix(spec)?;
        let root = self.bucket_root().join(&prefix);

        if self.options.dry_run {
            for destination in targets.keys() {
                log::info!("[dry run] Would upload {prefix}/{destination}");
            }
            return Ok(());
        }

        let mut failures = Vec::new();
        for (destination, source) in targets {
            if let Err(e) = write_target(&root, &destination, source) {
                log::error!("Failed to upload {destination}: {e:?}");
                failures.push(destination);
            }
        }

        if !failures.is_empty() {
            anyhow::bail!(
                "Failed to upload {} object(s) to {}: {}",
                failures.len(),
                root.display(),
                failures.join(", ")
            );
        }

        log::info!("Finished upload to {}", root.display());
        Ok(())
    }
}

fn write_target(root: &Path, destination: &str, source: UploadSource) -> anyhow::Result<()> {
    let target = root.join(destination);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    match source {
        UploadSource::File(path) => {
            std::fs::copy(&path, &target)
                .with_context(|| format!("Failed to copy {}", path.display()))?;
        }
        UploadSource::Data(data) => {
            std::fs::write(&target, data)
                .with_context(|| format!("Failed to write {}", target.display()))?;
        }
    }

    Ok(())
}
