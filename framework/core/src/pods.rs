use anyhow::Context;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};

/// The parts of a pod's status that the launcher and sidecar care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodStatusView {
    pub phase: String,
    /// Container name and whether it reports ready.
    pub containers: Vec<(String, bool)>,
    pub pod_ip: Option<String>,
}

impl PodStatusView {
    pub fn is_running(&self) -> bool {
        self.phase == "Running"
    }

    /// The pod is running and every container reports ready.
    pub fn all_ready(&self) -> bool {
        self.is_running() && self.containers.iter().all(|(_, ready)| *ready)
    }
}

impl From<&Pod> for PodStatusView {
    fn from(pod: &Pod) -> Self {
        let Some(status) = pod.status.as_ref() else {
            return Self::default();
        };

        Self {
            phase: status.phase.clone().unwrap_or_default(),
            containers: status
                .container_statuses
                .iter()
                .flatten()
                .map(|c| (c.name.clone(), c.ready))
                .collect(),
            pod_ip: status.pod_ip.clone().filter(|ip| !ip.is_empty()),
        }
    }
}

/// The control plane operations used to run a test pod.
#[async_trait]
pub trait PodClient: Send + Sync {
    async fn create_pod(&self, pod: &Pod) -> anyhow::Result<Pod>;

    async fn get_pod(&self, name: &str) -> anyhow::Result<PodStatusView>;

    async fn delete_pod(&self, name: &str) -> anyhow::Result<()>;
}

/// [PodClient] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubePodClient {
    api: Api<Pod>,
}

impl KubePodClient {
    /// Connect using the in-cluster or local kubeconfig, optionally overriding the namespace.
    pub async fn connect(namespace: Option<&str>) -> anyhow::Result<Self> {
        let client = Client::try_default()
            .await
            .context("Error getting kubernetes client")?;
        let api = match namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::default_namespaced(client),
        };
        Ok(Self { api })
    }
}

#[async_trait]
impl PodClient for KubePodClient {
    async fn create_pod(&self, pod: &Pod) -> anyhow::Result<Pod> {
        self.api
            .create(&PostParams::default(), pod)
            .await
            .context("Failed to create pod")
    }

    async fn get_pod(&self, name: &str) -> anyhow::Result<PodStatusView> {
        let pod = self
            .api
            .get(name)
            .await
            .with_context(|| format!("Failed to get pod {name}"))?;
        Ok(PodStatusView::from(&pod))
    }

    async fn delete_pod(&self, name: &str) -> anyhow::Result<()> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .with_context(|| format!("Failed to delete pod {name}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerStatus, PodStatus};

    fn pod(phase: &str, ready: &[bool], ip: Option<&str>) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                pod_ip: ip.map(str::to_string),
                container_statuses: Some(
                    ready
                        .iter()
                        .enumerate()
                        .map(|(i, ready)| ContainerStatus {
                            name: format!("node-{i}"),
                            ready: *ready,
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn ready_requires_running_and_all_containers() {
        assert!(PodStatusView::from(&pod("Running", &[true, true], Some("10.0.0.1"))).all_ready());
        assert!(!PodStatusView::from(&pod("Running", &[true, false], None)).all_ready());
        assert!(!PodStatusView::from(&pod("Pending", &[true], None)).all_ready());
    }

    #[test]
    fn empty_ip_is_no_ip() {
        let view = PodStatusView::from(&pod("Pending", &[], Some("")));
        assert_eq!(view.pod_ip, None);
        assert_eq!(PodStatusView::from(&Pod::default()), PodStatusView::default());
    }
}
