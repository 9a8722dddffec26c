//! streamd: console audio/video streaming daemon
//!
//! Forwards captured media over one of three transports and lets a remote
//! client switch between them at runtime:
//! - usb: local console bus endpoints
//! - tcp: raw socket per stream
//! - rtsp: interleaved session protocol
//!
//! The transport chosen at startup comes from marker files; afterwards the
//! remote control socket owns mode changes.

mod bootstrap;
mod capture;
mod config;
mod fatal;
mod ipc;
mod lifecycle;
mod logging;
mod modes;
mod state;

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::capture::{start_grabbers, CaptureCoordinator, ScratchBuffers, StreamKind};
use crate::config::Config;
use crate::fatal::{FatalHandler, ProcessAbort};
use crate::ipc::Server;
use crate::lifecycle::{Launcher, ShutdownSignal};
use crate::modes::ModeTable;
use crate::state::ModeManager;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logging::init_logging()?;

    info!(version = env!("CARGO_PKG_VERSION"), "streamd starting");

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.marker_dir, "configuration loaded");

    let mut shutdown = ShutdownSignal::new()?;

    let capture = Arc::new(CaptureCoordinator::new());
    let grabbers = start_grabbers(&capture, &config.capture)?;
    if grabbers == 0 {
        warn!("no capture sources configured, workers will idle");
    }

    let scratch = ScratchBuffers::new(config.scratch_video, config.scratch_audio);
    info!(
        video = scratch.capacity(StreamKind::Video),
        audio = scratch.capacity(StreamKind::Audio),
        "scratch buffers allocated"
    );

    let manager = Arc::new(ModeManager::new(
        ModeTable::from_config(&config),
        Arc::clone(&capture),
        scratch,
        Launcher::new(config.workers),
    ));
    let fatal: Arc<dyn FatalHandler> = Arc::new(ProcessAbort);

    bootstrap::run(&manager, &config.marker_dir, fatal.as_ref());

    let server = Server::new(&config.socket_path, Arc::clone(&manager), Arc::clone(&fatal))?;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "remote control server error");
            }
        }

        reason = shutdown.wait() => {
            info!(%reason, status = ?manager.status(), "shutdown requested");
        }
    }

    info!("shutting down...");

    match manager.status() {
        Ok(status) if status.active_mode().is_some() => {
            if let Err(e) = manager.request_transition(None) {
                error!(error = %e, "failed to stop active mode");
            }
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "active mode unreadable during shutdown"),
    }

    server.shutdown().await;

    info!(
        dropped_video = capture.dropped(StreamKind::Video),
        dropped_audio = capture.dropped(StreamKind::Audio),
        "streamd stopped"
    );

    Ok(())
}
