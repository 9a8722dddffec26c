//! Capture grab threads
//!
//! Read raw chunks from the configured capture devices and publish them to
//! the coordinator. Grabbers start before the first mode and run for the
//! life of the process; they are never joined.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::{CaptureCoordinator, StreamKind};

/// Size of a single capture read
const GRAB_CHUNK: usize = 32 * 1024;

/// Device nodes the grabbers read from
#[derive(Debug, Clone, Default)]
pub struct CaptureSources {
    pub video: Option<PathBuf>,
    pub audio: Option<PathBuf>,
}

/// Spawn one grab thread per configured source
pub fn start_grabbers(
    capture: &Arc<CaptureCoordinator>,
    sources: &CaptureSources,
) -> io::Result<usize> {
    let mut started = 0;

    for (stream, path) in [
        (StreamKind::Video, &sources.video),
        (StreamKind::Audio, &sources.audio),
    ] {
        let Some(path) = path else {
            debug!(%stream, "no capture source configured");
            continue;
        };

        let device = File::open(path)?;
        let capture = Arc::clone(capture);
        let path = path.clone();

        thread::Builder::new()
            .name(format!("grab-{stream}"))
            .spawn(move || grab_loop(stream, &path, device, &capture))?;

        info!(%stream, "capture grabber started");
        started += 1;
    }

    Ok(started)
}

fn grab_loop(stream: StreamKind, path: &Path, mut device: impl Read, capture: &CaptureCoordinator) {
    let mut buf = vec![0u8; GRAB_CHUNK];

    loop {
        match device.read(&mut buf) {
            Ok(0) => {
                info!(%stream, ?path, "capture source closed");
                return;
            }
            Ok(n) => capture.publish(stream, Bytes::copy_from_slice(&buf[..n])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(%stream, ?path, error = %e, "capture read failed");
                return;
            }
        }
    }
}
