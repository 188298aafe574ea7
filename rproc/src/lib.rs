pub mod config;
pub mod errors;
pub mod filters;
pub mod metrics;
pub mod observer;
pub mod process;
pub mod results;
pub mod shutdown;

pub use config::{CliOverrides, Field, MatchMode, ProcessorConfig};
pub use errors::{ProcessError, ProcessResult};
pub use observer::{NoopObserver, ProgressObserver};
pub use process::Processor;
pub use results::{FileOutcome, FileReport, FileTask, RunSummary};
pub use shutdown::{ShutdownToken, DEFAULT_SHUTDOWN_TIMEOUT};
