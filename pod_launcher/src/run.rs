use std::path::{Path, PathBuf};

use anyhow::Context;
use k8s_openapi::api::core::v1::Pod;
use minijinja::context;
use pod_harness_core::prelude::{pod_name_for, PodClient};

use crate::cli::LauncherCli;
use crate::readiness::{wait_ready, Readiness};
use crate::spec::{assemble_pod_spec, build_pod, credentials_file, ClusterJob, PodAssembly, LOG_MOUNT_PATH};
use crate::template;

/// File in the log path naming the image under test.
pub const DOCKER_IMAGE_FILE: &str = "docker_image";
pub const CLUSTER_INFO_FILE: &str = "cluster_info.json";
/// The launch record, relative to the log path.
pub const LAUNCH_RECORD_FILE: &str = "initials/pod-launcher.txt";

/// What happened during a launch that created its pod.
#[derive(Debug)]
pub struct LaunchReport {
    pub pod_name: String,
    /// `None` if the pod never reported an IP.
    pub readiness: Option<Readiness>,
    pub record_path: PathBuf,
    /// Unset if there is no cluster info template or it could not be rendered.
    pub cluster_info_path: Option<PathBuf>,
}

/// Create the test pod for the configured job and wait for it to come up.
///
/// The launch record is written whether or not the pod could be created. Only a failure to build or
/// create the pod is returned as an error. A pod that never becomes reachable, or cluster info that
/// does not render, is noted in the record instead.
pub async fn launch<C: PodClient + ?Sized>(
    cli: &LauncherCli,
    client: &C,
) -> anyhow::Result<LaunchReport> {
    cli.validate().context("Invalid launcher configuration")?;

    let container_image = read_container_image(&cli.log_path)?;
    let pod_name = pod_name_for(&cli.job_id);

    let rendered = template::render(
        "cluster spec",
        &cli.cluster_spec,
        context! {
            Host => pod_name.as_str(),
            ContainerImage => container_image.as_str(),
            DataDir => LOG_MOUNT_PATH,
        },
    )?;
    let job: ClusterJob =
        serde_json::from_str(&rendered).context("The rendered cluster spec is not valid JSON")?;
    let base = job
        .spec
        .context("The rendered cluster spec has no pod spec under `spec`")?;

    let assembly = PodAssembly {
        entrypoint_image: cli.entrypoint_image.clone(),
        sidecar_image: cli.sidecar_image.clone(),
        credentials_secret: cli.credentials_secret.clone(),
        job_spec: cli.job_spec.clone(),
        storage: cli.storage_options(credentials_file()),
        bucket_claim: cli.bucket_claim.clone(),
    };
    let pod = build_pod(&pod_name, &cli.job_id, assemble_pod_spec(base, &assembly)?);
    let record_path = cli.log_path.join(LAUNCH_RECORD_FILE);

    log::info!("Creating pod {pod_name}");
    let created = match client.create_pod(&pod).await {
        Ok(created) => created,
        Err(e) => {
            log::error!("Failed to create pod {pod_name}: {e:?}");
            let pod_json = encode_pod(&pod)?;
            write_record(&record_path, &[&pod_json, &format!("{e:?}")])?;
            return Err(e.context(format!("Failed to create pod {pod_name}")));
        }
    };
    let pod_json = encode_pod(&created)?;

    let (readiness, outcome) = match wait_ready(client, &pod_name, cli.readiness_policy()).await {
        Ok(readiness) => match render_cluster_info(cli, &readiness.pod_ip) {
            Ok(info) => (Some(readiness), Ok(info)),
            Err(e) => {
                log::error!("{e:#}");
                (Some(readiness), Err(format!("{e:#}")))
            }
        },
        Err(e) => {
            log::error!("{e}");
            (None, Err(e.to_string()))
        }
    };

    let cluster_info_path = match (&outcome, cli.cluster_info.is_empty()) {
        (Ok(info), false) => {
            let path = cli.log_path.join(CLUSTER_INFO_FILE);
            std::fs::write(&path, info)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Some(path)
        }
        _ => None,
    };

    let (Ok(outcome) | Err(outcome)) = outcome;
    write_record(&record_path, &[&pod_json, &outcome])?;

    Ok(LaunchReport {
        pod_name,
        readiness,
        record_path,
        cluster_info_path,
    })
}

fn read_container_image(log_path: &Path) -> anyhow::Result<String> {
    let path = log_path.join(DOCKER_IMAGE_FILE);
    let image = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read the container image from {}", path.display()))?;
    let image = image.trim();
    if image.is_empty() {
        anyhow::bail!("{} is empty", path.display());
    }
    Ok(image.to_string())
}

fn encode_pod(pod: &Pod) -> anyhow::Result<String> {
    serde_json::to_string(pod).context("Could not encode the pod as JSON")
}

fn render_cluster_info(cli: &LauncherCli, pod_ip: &str) -> anyhow::Result<String> {
    if cli.cluster_info.is_empty() {
        return Ok(String::new());
    }
    template::render("cluster info", &cli.cluster_info, context! { Host => pod_ip })
}

fn write_record(path: &Path, sections: &[&str]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, sections.join("\n\n"))
        .with_context(|| format!("Failed to write the launch record to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_image_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DOCKER_IMAGE_FILE), "sebak:1.2\n").unwrap();
        assert_eq!(read_container_image(dir.path()).unwrap(), "sebak:1.2");

        std::fs::write(dir.path().join(DOCKER_IMAGE_FILE), " \n").unwrap();
        assert!(read_container_image(dir.path()).is_err());
    }

    #[test]
    fn record_sections_are_separated_by_a_blank_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LAUNCH_RECORD_FILE);
        write_record(&path, &["{}", "info"]).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}\n\ninfo");
    }
}
