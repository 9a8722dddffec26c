//! Worker thread launcher
//!
//! Starts stream workers on dedicated threads with a fixed stack size and
//! priority, and joins them when their mode is torn down. The launcher has
//! no shared state and enforces no timeout: workers must watch their
//! [`RunFlag`](super::RunFlag) and return once it is cleared.

use std::io;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

/// Default worker priority on the console scale (0 most urgent, 63 least)
pub const DEFAULT_PRIORITY: u8 = 0x2C;

/// Lowest priority on the console scale
pub const MAX_PRIORITY: u8 = 63;

/// Default worker stack size in bytes
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Stack and scheduling parameters shared by every worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Stack size reserved for each worker thread
    pub stack_size: usize,
    /// Priority on the console scale, 0..=63
    pub priority: u8,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            priority: DEFAULT_PRIORITY,
        }
    }
}

impl WorkerConfig {
    /// Map the console priority onto a Linux nice value (-20..=19)
    pub fn nice_value(&self) -> i32 {
        let priority = i32::from(self.priority.min(MAX_PRIORITY));
        -20 + priority * 39 / i32::from(MAX_PRIORITY)
    }
}

/// A running worker thread
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Worker did not terminate cleanly
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("worker {0} panicked")]
    Panicked(String),
}

/// Starts and joins worker threads with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct Launcher {
    config: WorkerConfig,
    /// Launches left before spawning fails
    #[cfg(test)]
    spawn_budget: Option<std::sync::Arc<std::sync::atomic::AtomicUsize>>,
}

impl Launcher {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Start `body` on a new named thread
    pub fn launch<F>(&self, name: &str, body: F) -> io::Result<WorkerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        #[cfg(test)]
        self.take_spawn_budget()?;

        let config = self.config;
        let handle = thread::Builder::new()
            .name(name.to_string())
            .stack_size(config.stack_size)
            .spawn(move || {
                apply_priority(&config);
                body();
            })?;

        debug!(
            worker = name,
            stack_size = config.stack_size,
            priority = config.priority,
            "worker launched"
        );

        Ok(WorkerHandle {
            name: name.to_string(),
            handle,
        })
    }

    /// Block until the worker returns, then release its handle
    pub fn join(&self, worker: WorkerHandle) -> Result<(), JoinError> {
        let WorkerHandle { name, handle } = worker;
        handle.join().map_err(|_| JoinError::Panicked(name.clone()))?;
        debug!(worker = %name, "worker joined");
        Ok(())
    }
}

#[cfg(test)]
impl Launcher {
    /// A launcher whose spawns fail once `launches` workers were started
    pub fn failing_after(launches: usize) -> Self {
        Self {
            spawn_budget: Some(std::sync::Arc::new(launches.into())),
            ..Default::default()
        }
    }

    fn take_spawn_budget(&self) -> io::Result<()> {
        use std::sync::atomic::Ordering;

        let Some(budget) = &self.spawn_budget else {
            return Ok(());
        };
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .map(|_| ())
            .map_err(|_| io::Error::other("thread limit reached"))
    }
}

/// Lower (or raise) the calling thread's scheduling priority
#[cfg(target_os = "linux")]
fn apply_priority(config: &WorkerConfig) {
    let nice = config.nice_value();
    // SAFETY: gettid has no preconditions; setpriority only reads its arguments.
    let rc = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, nice)
    };
    if rc != 0 {
        warn!(
            nice,
            error = %io::Error::last_os_error(),
            "failed to apply worker priority"
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_priority(config: &WorkerConfig) {
    debug!(priority = config.priority, "worker priority not applied on this platform");
}
