use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, PersistentVolumeClaimVolumeSource, Pod, PodSpec,
    SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use pod_harness_core::prelude::{SidecarOptions, StorageOptions, JOB_SPEC_ENV, SIDECAR_OPTIONS_ENV};
use serde::Deserialize;

use crate::entrypoint::{WrapperOptions, ENTRYPOINT_OPTIONS_ENV};

pub const LOG_MOUNT_NAME: &str = "logs";
/// Where the shared log directory is mounted in every container of the pod.
pub const LOG_MOUNT_PATH: &str = "/logs";
pub const TOOLS_MOUNT_NAME: &str = "tools";
pub const TOOLS_MOUNT_PATH: &str = "/tools";
pub const CREDENTIALS_MOUNT_NAME: &str = "gcs-credentials";
pub const CREDENTIALS_MOUNT_PATH: &str = "/secrets/gcs";
pub const CREDENTIALS_FILE_NAME: &str = "service-account.json";
pub const BUCKETS_MOUNT_NAME: &str = "buckets";

pub const INIT_CONTAINER_NAME: &str = "place-tools";
pub const SIDECAR_CONTAINER_NAME: &str = "node-sidecar";

/// Long enough for the sidecar to finish uploading after it has been asked to terminate.
pub const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 1200;

/// The rendered cluster spec template.
#[derive(Debug, Deserialize)]
pub struct ClusterJob {
    #[serde(default)]
    pub spec: Option<PodSpec>,
}

/// Everything besides the node containers that goes into the test pod.
#[derive(Debug, Clone)]
pub struct PodAssembly {
    pub entrypoint_image: String,
    pub sidecar_image: String,
    pub credentials_secret: String,
    /// Raw job spec JSON for the sidecar.
    pub job_spec: String,
    pub storage: StorageOptions,
    pub bucket_claim: Option<String>,
}

pub fn credentials_file() -> std::path::PathBuf {
    Path::new(CREDENTIALS_MOUNT_PATH).join(CREDENTIALS_FILE_NAME)
}

/// Turn the job's pod spec into the test pod spec.
///
/// Each container becomes a node: its command is run by the process wrapper, which is staged into
/// the tools volume by an init container. The sidecar is added last and told how many nodes to
/// wait for.
pub fn assemble_pod_spec(mut spec: PodSpec, assembly: &PodAssembly) -> anyhow::Result<PodSpec> {
    if spec.containers.is_empty() {
        anyhow::bail!("The cluster spec has no containers");
    }

    let log_mount = volume_mount(LOG_MOUNT_NAME, LOG_MOUNT_PATH);
    let tools_mount = volume_mount(TOOLS_MOUNT_NAME, TOOLS_MOUNT_PATH);
    let credentials_mount = volume_mount(CREDENTIALS_MOUNT_NAME, CREDENTIALS_MOUNT_PATH);
    let entrypoint_location = format!("{TOOLS_MOUNT_PATH}/entrypoint");

    spec.init_containers.get_or_insert_with(Vec::new).push(Container {
        name: INIT_CONTAINER_NAME.to_string(),
        image: Some(assembly.entrypoint_image.clone()),
        command: Some(vec!["/bin/cp".to_string()]),
        args: Some(vec!["/entrypoint".to_string(), entrypoint_location.clone()]),
        volume_mounts: Some(vec![tools_mount.clone()]),
        ..Default::default()
    });

    for (index, container) in spec.containers.iter_mut().enumerate() {
        let args: Vec<String> = container
            .command
            .take()
            .into_iter()
            .flatten()
            .chain(container.args.take().into_iter().flatten())
            .collect();
        if args.is_empty() {
            anyhow::bail!(
                "Container {} has no command for the process wrapper to run",
                container.name
            );
        }

        let wrapper = WrapperOptions::for_node(index, args, Path::new(LOG_MOUNT_PATH))
            .encode()
            .with_context(|| format!("Could not configure the wrapper for {}", container.name))?;

        container.command = Some(vec![entrypoint_location.clone()]);
        container.args = Some(Vec::new());
        container
            .env
            .get_or_insert_with(Vec::new)
            .extend(kube_env(BTreeMap::from([(ENTRYPOINT_OPTIONS_ENV, wrapper)])));
        container
            .volume_mounts
            .get_or_insert_with(Vec::new)
            .extend([log_mount.clone(), tools_mount.clone()]);
    }

    let sidecar_options = SidecarOptions {
        node_count: spec.containers.len(),
        base_dir: LOG_MOUNT_PATH.into(),
        storage: assembly.storage.clone(),
    };

    let mut sidecar_mounts = vec![log_mount, credentials_mount];
    let mut volumes = vec![
        empty_dir_volume(LOG_MOUNT_NAME),
        empty_dir_volume(TOOLS_MOUNT_NAME),
        Volume {
            name: CREDENTIALS_MOUNT_NAME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(assembly.credentials_secret.clone()),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];
    if let Some(claim) = &assembly.bucket_claim {
        sidecar_mounts.push(volume_mount(
            BUCKETS_MOUNT_NAME,
            &assembly.storage.mount_root.to_string_lossy(),
        ));
        volumes.push(Volume {
            name: BUCKETS_MOUNT_NAME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.clone(),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    spec.containers.push(Container {
        name: SIDECAR_CONTAINER_NAME.to_string(),
        image: Some(assembly.sidecar_image.clone()),
        command: Some(vec!["/node-sidecar".to_string()]),
        args: Some(Vec::new()),
        env: Some(kube_env(BTreeMap::from([
            (JOB_SPEC_ENV, assembly.job_spec.clone()),
            (SIDECAR_OPTIONS_ENV, sidecar_options.to_env_value()?),
        ]))),
        volume_mounts: Some(sidecar_mounts),
        ..Default::default()
    });

    spec.termination_grace_period_seconds = Some(TERMINATION_GRACE_PERIOD_SECONDS);
    spec.restart_policy = Some("Never".to_string());
    spec.volumes.get_or_insert_with(Vec::new).extend(volumes);

    Ok(spec)
}

pub fn build_pod(name: &str, job_id: &str, spec: PodSpec) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([
                ("created-by".to_string(), "pod-launcher".to_string()),
                ("prow-job-id".to_string(), job_id.to_string()),
            ])),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    }
}

fn volume_mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn empty_dir_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// Environment variables in name order.
fn kube_env(environment: BTreeMap<&str, String>) -> Vec<EnvVar> {
    environment
        .into_iter()
        .map(|(name, value)| EnvVar {
            name: name.to_string(),
            value: Some(value),
            ..Default::default()
        })
        .collect()
}
