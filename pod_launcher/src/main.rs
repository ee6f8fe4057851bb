use pod_harness_core::prelude::KubePodClient;
use pod_launcher::prelude::{init, launch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = init();

    let client = KubePodClient::connect(cli.namespace.as_deref()).await?;
    let report = launch(&cli, &client).await?;

    match &report.readiness {
        Some(readiness) if readiness.ready => log::info!(
            "Pod {} is ready at {} after {} check(s)",
            report.pod_name,
            readiness.pod_ip,
            readiness.attempts
        ),
        Some(readiness) => log::warn!(
            "Pod {} did not become ready, last seen at {}",
            report.pod_name,
            readiness.pod_ip
        ),
        None => log::warn!("Pod {} never became reachable", report.pod_name),
    }
    log::info!("Launch record written to {}", report.record_path.display());

    Ok(())
}
