//! Core mode lifecycle implementation
//!
//! Handles transitions between no mode and the usb, tcp and rtsp modes,
//! starting and joining the worker threads each mode declares.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::status::ModeStatus;
use crate::capture::{CaptureCoordinator, ScratchBuffers, StreamKind};
use crate::fatal::Fatal;
use crate::lifecycle::{Launcher, RunFlag, WorkerHandle};
use crate::modes::{ModeContext, ModeKind, ModeTable, StreamMode, WorkerContext, WorkerSet};

/// Slot encoding of the active mode
const SLOT_NONE: u32 = 0;

fn slot_code(mode: Option<ModeKind>) -> u32 {
    match mode {
        None => SLOT_NONE,
        Some(ModeKind::Usb) => 1,
        Some(ModeKind::Tcp) => 2,
        Some(ModeKind::Rtsp) => 3,
    }
}

fn slot_mode(code: u32) -> Result<Option<ModeKind>, Fatal> {
    match code {
        SLOT_NONE => Ok(None),
        1 => Ok(Some(ModeKind::Usb)),
        2 => Ok(Some(ModeKind::Tcp)),
        3 => Ok(Some(ModeKind::Rtsp)),
        _ => Err(Fatal::UnknownActiveMode),
    }
}

fn describe(mode: Option<ModeKind>) -> &'static str {
    mode.map(|kind| kind.name()).unwrap_or("none")
}

/// Worker handles of the active mode
#[derive(Default)]
struct Workers {
    video: Option<WorkerHandle>,
    audio: Option<WorkerHandle>,
}

impl Workers {
    fn set(&self) -> WorkerSet {
        WorkerSet {
            video: self.video.is_some(),
            audio: self.audio.is_some(),
        }
    }
}

/// Owns the active mode and its worker threads
///
/// One instance lives for the whole process. Transitions are expected to
/// arrive one at a time from the control thread; an overlapping request is
/// a protocol violation and is rejected with [`Fatal::AlreadySwitching`].
pub struct ModeManager {
    modes: ModeTable,
    /// Active mode, written only while `switching` is held
    active: AtomicU32,
    /// A transition is in progress
    switching: AtomicBool,
    /// Workers of the active mode should keep running
    running: RunFlag,
    capture: Arc<CaptureCoordinator>,
    scratch: Arc<ScratchBuffers>,
    launcher: Launcher,
    workers: Mutex<Workers>,
}

impl ModeManager {
    /// Create a manager with no active mode
    pub fn new(
        modes: ModeTable,
        capture: Arc<CaptureCoordinator>,
        scratch: ScratchBuffers,
        launcher: Launcher,
    ) -> Self {
        Self {
            modes,
            active: AtomicU32::new(SLOT_NONE),
            switching: AtomicBool::new(false),
            running: RunFlag::new(),
            capture,
            scratch: Arc::new(scratch),
            launcher,
            workers: Mutex::new(Workers::default()),
        }
    }

    /// Current status; never blocks
    pub fn status(&self) -> Result<ModeStatus, Fatal> {
        if self.switching.load(Ordering::SeqCst) {
            return Ok(ModeStatus::Switching);
        }

        Ok(match slot_mode(self.active.load(Ordering::SeqCst))? {
            None => ModeStatus::Inactive,
            Some(kind) => ModeStatus::Active(kind),
        })
    }

    /// Whether no transition is in progress
    ///
    /// Advisory only: nothing stops another caller from starting a
    /// transition between this check and a subsequent request.
    pub fn can_accept_transition(&self) -> bool {
        !self.switching.load(Ordering::SeqCst)
    }

    /// Tear down the active mode, if any, and start `target`
    ///
    /// Requesting the mode that is already active rebuilds it. Blocks until
    /// the old workers are joined and the new ones are launched.
    pub fn request_transition(&self, target: Option<ModeKind>) -> Result<(), Fatal> {
        if self
            .switching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(to = describe(target), "transition requested while switching");
            return Err(Fatal::AlreadySwitching);
        }

        let started = Instant::now();
        let previous = slot_mode(self.active.load(Ordering::SeqCst))?;
        info!(
            from = describe(previous),
            to = describe(target),
            "mode transition"
        );

        let mut workers = self.workers.lock();

        if let Some(kind) = previous {
            self.stop_mode(self.modes.get(kind), &mut workers)?;
        }

        self.active.store(slot_code(target), Ordering::SeqCst);

        if let Some(kind) = target {
            self.start_mode(self.modes.get(kind), &mut workers)?;
        }

        let running = workers.set();
        drop(workers);
        self.switching.store(false, Ordering::SeqCst);

        info!(
            mode = describe(target),
            video = running.video,
            audio = running.audio,
            duration_ms = started.elapsed().as_millis() as u64,
            "mode transition complete"
        );

        Ok(())
    }

    fn mode_context(&self) -> ModeContext<'_> {
        ModeContext {
            capture: &self.capture,
            scratch: &self.scratch,
        }
    }

    /// Stop workers video first, then audio, then run the exit routine
    fn stop_mode(&self, mode: &Arc<dyn StreamMode>, workers: &mut Workers) -> Result<(), Fatal> {
        debug!(mode = %mode.kind(), "terminating mode");
        self.running.stop();

        debug!("unlocking capture consumers");
        self.capture.force_unlock_consumers();

        if let Some(handle) = workers.video.take() {
            debug!(worker = handle.name(), "waiting for worker");
            self.launcher.join(handle).map_err(|e| {
                error!(error = %e, "video worker join failed");
                Fatal::JoinVideo
            })?;
        }

        if let Some(handle) = workers.audio.take() {
            debug!(worker = handle.name(), "waiting for worker");
            self.launcher.join(handle).map_err(|e| {
                error!(error = %e, "audio worker join failed");
                Fatal::JoinAudio
            })?;
        }

        mode.exit(&self.mode_context());
        debug!(mode = %mode.kind(), "mode terminated");
        Ok(())
    }

    /// Zero scratch, run the init routine, then start video and audio
    fn start_mode(&self, mode: &Arc<dyn StreamMode>, workers: &mut Workers) -> Result<(), Fatal> {
        debug!(mode = %mode.kind(), "starting mode");
        self.running.start();
        self.scratch.zero();

        mode.init(&self.mode_context());

        let declared = mode.workers();
        if declared.video {
            let handle = self.spawn_worker(mode, StreamKind::Video).map_err(|e| {
                error!(error = %e, "video worker launch failed");
                Fatal::StartVideo
            })?;
            workers.video = Some(handle);
        }

        if declared.audio {
            let handle = self.spawn_worker(mode, StreamKind::Audio).map_err(|e| {
                error!(error = %e, "audio worker launch failed");
                Fatal::StartAudio
            })?;
            workers.audio = Some(handle);
        }

        Ok(())
    }

    fn spawn_worker(&self, mode: &Arc<dyn StreamMode>, stream: StreamKind) -> io::Result<WorkerHandle> {
        let ctx = WorkerContext {
            stream,
            running: self.running.clone(),
            capture: Arc::clone(&self.capture),
            scratch: Arc::clone(&self.scratch),
        };
        let mode = Arc::clone(mode);
        let name = format!("{}-{}", mode.kind(), stream);

        self.launcher.launch(&name, move || mode.run_worker(ctx))
    }
}
