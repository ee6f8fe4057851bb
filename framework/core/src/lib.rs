pub mod finished;
pub mod interrupt;
pub mod job_spec;
pub mod logging;
pub mod naming;
pub mod options;
pub mod pods;
pub mod upload;

pub mod prelude {
    pub use crate::finished::{FinishRecord, RunOutcome, RunResult, INTERRUPTED_EXIT_CODE};
    pub use crate::interrupt::{Interrupt, InterruptListener};
    pub use crate::job_spec::{pod_name_for, JobSpec, JobType, Refs, JOB_SPEC_ENV};
    pub use crate::naming::{node_files, NodeFileError, NodeFileKind, ARTIFACTS_DIR};
    pub use crate::options::{OptionsError, SidecarOptions, SIDECAR_OPTIONS_ENV};
    pub use crate::pods::{KubePodClient, PodClient, PodStatusView};
    pub use crate::upload::{
        DirectoryUploader, PathStrategy, StorageOptions, UploadSource, UploadTargets, Uploader,
    };
}
