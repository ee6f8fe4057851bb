use std::time::Duration;

use pod_harness_core::prelude::PodClient;

/// How long to keep checking whether a pod has become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Wait before the first check. Doubled after every check that does not find the pod ready.
    pub initial_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(3),
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    /// Every container reported ready. If false, the attempts ran out first.
    pub ready: bool,
    pub pod_ip: String,
    pub attempts: u32,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("Unreachable host: pod {pod} reported no IP after {attempts} attempt(s)")]
    Unreachable { pod: String, attempts: u32 },
}

/// Poll the pod until all its containers are ready or the policy's attempts are used up.
///
/// Running out of attempts is not an error as long as the pod reported an IP at some point, the
/// last IP seen is returned with `ready` unset. Failed polls are logged and count as attempts.
pub async fn wait_ready<C: PodClient + ?Sized>(
    client: &C,
    pod_name: &str,
    policy: ReadinessPolicy,
) -> Result<Readiness, ReadinessError> {
    let mut backoff = policy.initial_backoff;
    let mut pod_ip = None;

    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(backoff).await;

        match client.get_pod(pod_name).await {
            Ok(status) => {
                for (name, ready) in &status.containers {
                    log::info!("container status {name} : {ready}");
                }
                if status.pod_ip.is_some() {
                    pod_ip = status.pod_ip.clone();
                }

                if let (true, Some(ip)) = (status.all_ready(), &pod_ip) {
                    log::info!("Pod {pod_name} is ready at {ip}");
                    return Ok(Readiness {
                        ready: true,
                        pod_ip: ip.clone(),
                        attempts: attempt,
                    });
                }
            }
            Err(e) => log::warn!("Failed to check pod {pod_name}: {e:?}"),
        }

        if attempt < policy.max_attempts {
            backoff *= 2;
            log::info!(
                "Waiting until Pod is ready. Will check the status after {} seconds.",
                backoff.as_secs_f32()
            );
        }
    }

    match pod_ip {
        Some(pod_ip) => {
            log::warn!(
                "Pod {pod_name} was not ready after {} attempt(s), continuing with {pod_ip}",
                policy.max_attempts
            );
            Ok(Readiness {
                ready: false,
                pod_ip,
                attempts: policy.max_attempts,
            })
        }
        None => Err(ReadinessError::Unreachable {
            pod: pod_name.to_string(),
            attempts: policy.max_attempts,
        }),
    }
}
