//! Startup mode selection
//!
//! A marker file in the marker directory selects the mode the daemon starts
//! in. They are checked in priority order: usb, rtsp, tcp.

use std::path::Path;

use tracing::{debug, info};

use crate::fatal::FatalHandler;
use crate::modes::ModeKind;
use crate::state::ModeManager;

/// Marker probe order; first match wins
const MARKER_PRIORITY: [ModeKind; 3] = [ModeKind::Usb, ModeKind::Rtsp, ModeKind::Tcp];

/// Find the mode selected by a marker file, if any
pub fn probe_markers(marker_dir: &Path) -> Option<ModeKind> {
    MARKER_PRIORITY.into_iter().find(|kind| {
        let marker = marker_dir.join(kind.name());
        let present = marker.is_file();
        debug!(?marker, present, "probed mode marker");
        present
    })
}

/// Perform the initial transition selected by the marker files
pub fn run(manager: &ModeManager, marker_dir: &Path, fatal: &dyn FatalHandler) -> Option<ModeKind> {
    let Some(kind) = probe_markers(marker_dir) else {
        info!(?marker_dir, "no startup mode selected, waiting for remote control");
        return None;
    };

    info!(mode = %kind, "starting in persisted mode");
    if let Err(e) = manager.request_transition(Some(kind)) {
        fatal.raise(e);
    }
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::capture::{CaptureCoordinator, ScratchBuffers};
    use crate::fatal::testing::PanicOnFatal;
    use crate::lifecycle::Launcher;
    use crate::modes::testing::Fixture;
    use crate::state::ModeStatus;

    fn marker_dir(name: &str, markers: &[&str]) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("streamd-markers-{}", std::process::id()))
            .join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        for marker in markers {
            fs::write(dir.join(marker), b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_no_marker() {
        let dir = marker_dir("none", &[]);
        assert_eq!(probe_markers(&dir), None);
    }

    #[test]
    fn test_missing_directory() {
        assert_eq!(probe_markers(Path::new("/nonexistent/streamd/markers")), None);
    }

    #[test]
    fn test_single_markers() {
        assert_eq!(probe_markers(&marker_dir("usb", &["usb"])), Some(ModeKind::Usb));
        assert_eq!(probe_markers(&marker_dir("tcp", &["tcp"])), Some(ModeKind::Tcp));
        assert_eq!(probe_markers(&marker_dir("rtsp", &["rtsp"])), Some(ModeKind::Rtsp));
    }

    #[test]
    fn test_priority_order() {
        let all = marker_dir("all", &["tcp", "rtsp", "usb"]);
        assert_eq!(probe_markers(&all), Some(ModeKind::Usb));

        let no_usb = marker_dir("no-usb", &["tcp", "rtsp"]);
        assert_eq!(probe_markers(&no_usb), Some(ModeKind::Rtsp));
    }

    #[test]
    fn test_boot_with_usb_marker() {
        let fixture = Fixture::new();
        let manager = ModeManager::new(
            fixture.table.clone(),
            Arc::new(CaptureCoordinator::new()),
            ScratchBuffers::new(64, 64),
            Launcher::default(),
        );
        let dir = marker_dir("boot-usb", &["usb"]);

        let started = run(&manager, &dir, &PanicOnFatal);

        assert_eq!(started, Some(ModeKind::Usb));
        assert_eq!(manager.status(), Ok(ModeStatus::Active(ModeKind::Usb)));
        // usb declares a video worker only
        assert!(fixture.wait_for_live(1));
    }

    #[test]
    fn test_boot_without_marker_stays_inactive() {
        let fixture = Fixture::new();
        let manager = ModeManager::new(
            fixture.table.clone(),
            Arc::new(CaptureCoordinator::new()),
            ScratchBuffers::new(64, 64),
            Launcher::default(),
        );
        let dir = marker_dir("boot-none", &[]);

        assert_eq!(run(&manager, &dir, &PanicOnFatal), None);
        assert_eq!(manager.status(), Ok(ModeStatus::Inactive));
        assert!(fixture.log.take().is_empty());
    }
}
