mod argv;
mod error;
mod metrics;
mod supervisor;

pub use argv::{compose_argv, LaunchNetwork};
pub use error::{Result, SupervisorError};
pub use metrics::{MetricsReader, VmMetrics};
pub use supervisor::{ExitReason, SupervisedProcess, DEFAULT_STOP_TIMEOUT};
