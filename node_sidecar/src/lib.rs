mod barrier;
mod outcome;
mod run;
mod targets;
mod watch;

pub mod prelude {
    pub use crate::barrier::{CompletionBarrier, Observation};
    pub use crate::outcome::scan_outcome;
    pub use crate::run::{Sidecar, DEFAULT_SCAN_INTERVAL};
    pub use crate::targets::{collect_targets, process_log_destination, FINISHED_PATH};
}
