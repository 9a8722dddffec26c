//! Streaming modes
//!
//! A mode is one transport strategy for forwarding captured media: the
//! local bus (`usb`), a raw socket (`tcp`) or the session protocol
//! (`rtsp`). Each mode declares which workers it needs and provides their
//! bodies through the [`StreamMode`] trait; [`ModeKind`] names the three
//! variants and [`ModeTable`] holds the one instance of each.

mod bus;
mod session;
mod socket;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use bytes::Bytes;

use crate::capture::{CaptureCoordinator, ScratchBuffers, StreamKind};
use crate::config::Config;
use crate::lifecycle::RunFlag;

pub use bus::{BusEndpoints, BusMode};
pub use session::{SessionMode, DEFAULT_RTSP_PORT};
pub use socket::{SocketMode, TcpPorts};

/// The three concrete streaming modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeKind {
    /// Local console bus
    Usb,
    /// Raw network socket
    Tcp,
    /// Session-description network protocol
    Rtsp,
}

impl ModeKind {
    pub const ALL: [ModeKind; 3] = [ModeKind::Usb, ModeKind::Tcp, ModeKind::Rtsp];

    /// Name used for marker files and logs
    pub fn name(&self) -> &'static str {
        match self {
            ModeKind::Usb => "usb",
            ModeKind::Tcp => "tcp",
            ModeKind::Rtsp => "rtsp",
        }
    }
}

impl std::fmt::Display for ModeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which worker threads a mode needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSet {
    pub video: bool,
    pub audio: bool,
}

impl WorkerSet {
    pub const BOTH: WorkerSet = WorkerSet { video: true, audio: true };
    pub const VIDEO_ONLY: WorkerSet = WorkerSet { video: true, audio: false };
    pub const NONE: WorkerSet = WorkerSet { video: false, audio: false };

    pub fn contains(&self, stream: StreamKind) -> bool {
        match stream {
            StreamKind::Video => self.video,
            StreamKind::Audio => self.audio,
        }
    }
}

/// Resources handed to a mode's init and exit routines
pub struct ModeContext<'a> {
    pub capture: &'a CaptureCoordinator,
    pub scratch: &'a ScratchBuffers,
}

/// Everything a worker thread needs to run its loop
#[derive(Clone)]
pub struct WorkerContext {
    pub stream: StreamKind,
    pub running: RunFlag,
    pub capture: Arc<CaptureCoordinator>,
    pub scratch: Arc<ScratchBuffers>,
}

impl WorkerContext {
    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    /// Next packet of this worker's stream, or `None` once it must stop
    pub fn next_packet(&self) -> Option<Bytes> {
        self.capture.wait(self.stream, &self.running)
    }
}

/// Behavior of one streaming mode
///
/// The manager calls `init` after zeroing the scratch buffers, then starts
/// a thread running `run_worker` for each stream in `workers()`. On
/// teardown it clears the run flag, joins those threads (video first) and
/// calls `exit`. Worker bodies must return promptly once
/// [`WorkerContext::next_packet`] yields `None` or the run flag clears.
pub trait StreamMode: Send + Sync + 'static {
    fn kind(&self) -> ModeKind;

    fn workers(&self) -> WorkerSet;

    fn init(&self, _ctx: &ModeContext<'_>) {}

    fn run_worker(&self, ctx: WorkerContext);

    fn exit(&self, _ctx: &ModeContext<'_>) {}
}

/// One instance of every mode, built once at startup
#[derive(Clone)]
pub struct ModeTable {
    usb: Arc<dyn StreamMode>,
    tcp: Arc<dyn StreamMode>,
    rtsp: Arc<dyn StreamMode>,
}

impl ModeTable {
    pub fn new(
        usb: Arc<dyn StreamMode>,
        tcp: Arc<dyn StreamMode>,
        rtsp: Arc<dyn StreamMode>,
    ) -> Self {
        debug_assert_eq!(usb.kind(), ModeKind::Usb);
        debug_assert_eq!(tcp.kind(), ModeKind::Tcp);
        debug_assert_eq!(rtsp.kind(), ModeKind::Rtsp);
        Self { usb, tcp, rtsp }
    }

    /// The production modes, configured from `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(BusMode::new(config.bus.clone())),
            Arc::new(SocketMode::new(config.tcp)),
            Arc::new(SessionMode::new(config.rtsp_port)),
        )
    }

    pub fn get(&self, kind: ModeKind) -> &Arc<dyn StreamMode> {
        match kind {
            ModeKind::Usb => &self.usb,
            ModeKind::Tcp => &self.tcp,
            ModeKind::Rtsp => &self.rtsp,
        }
    }
}
