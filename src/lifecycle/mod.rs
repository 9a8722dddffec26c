//! Process and worker lifecycle: thread launching, cooperative
//! cancellation, and shutdown signals

mod launcher;
mod run_flag;
mod shutdown;

pub use launcher::{Launcher, WorkerConfig, WorkerHandle, MAX_PRIORITY};
pub use run_flag::RunFlag;
pub use shutdown::ShutdownSignal;
