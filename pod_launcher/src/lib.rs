pub mod cli;
pub mod entrypoint;
pub mod readiness;
pub mod run;
pub mod spec;
pub mod template;

pub mod prelude {
    pub use crate::cli::{init, LauncherCli};
    pub use crate::entrypoint::{WrapperOptions, ENTRYPOINT_OPTIONS_ENV};
    pub use crate::readiness::{wait_ready, Readiness, ReadinessError, ReadinessPolicy};
    pub use crate::run::{launch, LaunchReport, CLUSTER_INFO_FILE, DOCKER_IMAGE_FILE, LAUNCH_RECORD_FILE};
    pub use crate::spec::{
        assemble_pod_spec, build_pod, PodAssembly, INIT_CONTAINER_NAME, SIDECAR_CONTAINER_NAME,
        TERMINATION_GRACE_PERIOD_SECONDS,
    };
}
