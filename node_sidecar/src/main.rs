use std::sync::Arc;

use anyhow::Context;
use node_sidecar::prelude::Sidecar;
use pod_harness_core::logging;
use pod_harness_core::prelude::{
    DirectoryUploader, InterruptListener, JobSpec, KubePodClient, PodClient, SidecarOptions,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("node-sidecar");

    // Hook signals first so an early termination request is not fatal.
    let interrupts = InterruptListener::start().context("Could not listen for interrupts")?;

    let options = SidecarOptions::from_env().context("Invalid options")?;
    let spec = JobSpec::from_env().context("Could not resolve job spec")?;

    let uploader = Arc::new(DirectoryUploader::new(options.storage.clone()));
    let result = Sidecar::new(options, spec.clone(), uploader)
        .run(interrupts)
        .await;

    match &result {
        Ok(outcome) => log::info!("Uploaded run result {}", outcome.result()),
        Err(e) => log::error!("Failed to finish the run: {e:?}"),
    }

    // The test pod is of no use once the results are out, or once they never will be.
    delete_own_pod(&spec).await;

    result.map(|_| ())
}

async fn delete_own_pod(spec: &JobSpec) {
    let pod_name = spec.pod_name();
    let client = match KubePodClient::connect(None).await {
        Ok(client) => client,
        Err(e) => {
            log::warn!("Not deleting pod {pod_name}: {e:?}");
            return;
        }
    };

    match client.delete_pod(&pod_name).await {
        Ok(()) => log::info!("Deleting the pod named {pod_name}"),
        Err(e) => log::warn!("{e:?}"),
    }
}
