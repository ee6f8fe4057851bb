use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::upload::{PathStrategy, StorageOptions};

/// Environment variable carrying the JSON encoded [SidecarOptions].
pub const SIDECAR_OPTIONS_ENV: &str = "SIDECAR_OPTIONS";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("The node count must be at least 1")]
    NoNodes,
    #[error("No base directory configured")]
    NoBaseDir,
    #[error("No storage bucket configured")]
    NoBucket,
    #[error("A default org and repo are required for the '{0}' path strategy")]
    MissingDefaults(PathStrategy),
}

/// Configuration handed to the completion sidecar by the pod launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarOptions {
    /// The number of node containers whose completion the sidecar waits for.
    pub node_count: usize,
    /// The shared log directory that node files are written into.
    pub base_dir: PathBuf,
    pub storage: StorageOptions,
}

impl SidecarOptions {
    pub fn from_env() -> anyhow::Result<Self> {
        let raw = std::env::var(SIDECAR_OPTIONS_ENV)
            .with_context(|| format!("Environment variable `{SIDECAR_OPTIONS_ENV}` is not set"))?;
        let options: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed `{SIDECAR_OPTIONS_ENV}`"))?;
        options
            .validate()
            .with_context(|| format!("Invalid `{SIDECAR_OPTIONS_ENV}`"))?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.node_count == 0 {
            return Err(OptionsError::NoNodes);
        }
        if self.base_dir.as_os_str().is_empty() {
            return Err(OptionsError::NoBaseDir);
        }
        self.storage.validate()
    }

    pub fn to_env_value(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).context("Could not encode sidecar options as JSON")
    }
}
