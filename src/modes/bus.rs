//! Local bus mode
//!
//! Forwards both streams from a single worker to the bus endpoint files.
//! Video packets drive the loop; any audio that arrived meanwhile is
//! drained right after each video packet.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{ModeKind, StreamMode, WorkerContext, WorkerSet};
use crate::capture::StreamKind;

/// Endpoint files of the bus function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEndpoints {
    pub video: PathBuf,
    pub audio: PathBuf,
}

impl Default for BusEndpoints {
    fn default() -> Self {
        Self {
            video: PathBuf::from("/dev/ffs-streamd/ep1"),
            audio: PathBuf::from("/dev/ffs-streamd/ep2"),
        }
    }
}

pub struct BusMode {
    endpoints: BusEndpoints,
}

impl BusMode {
    pub fn new(endpoints: BusEndpoints) -> Self {
        Self { endpoints }
    }
}

fn open_endpoint(path: &Path) -> Option<File> {
    match OpenOptions::new().write(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            warn!(?path, error = %e, "bus endpoint unavailable, discarding packets");
            None
        }
    }
}

fn forward(ctx: &WorkerContext, stream: StreamKind, endpoint: &mut Option<File>, packet: &[u8]) {
    let Some(file) = endpoint else {
        return;
    };

    let result: io::Result<()> = ctx
        .scratch
        .stage(stream, packet, |chunk| file.write_all(chunk));

    if let Err(e) = result {
        warn!(%stream, error = %e, "bus write failed, closing endpoint");
        *endpoint = None;
    }
}

impl StreamMode for BusMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Usb
    }

    fn workers(&self) -> WorkerSet {
        WorkerSet::VIDEO_ONLY
    }

    fn run_worker(&self, ctx: WorkerContext) {
        let mut video = open_endpoint(&self.endpoints.video);
        let mut audio = open_endpoint(&self.endpoints.audio);
        info!(
            video = video.is_some(),
            audio = audio.is_some(),
            "bus worker running"
        );

        while let Some(packet) = ctx.next_packet() {
            forward(&ctx, StreamKind::Video, &mut video, &packet);

            if let Some(pcm) = ctx.capture.try_take(StreamKind::Audio) {
                forward(&ctx, StreamKind::Audio, &mut audio, &pcm);
            }
        }

        debug!("bus worker stopped");
    }
}
