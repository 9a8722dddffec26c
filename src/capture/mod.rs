//! Capture side of the daemon
//!
//! The hardware pipeline publishes packets into a [`CaptureCoordinator`];
//! the active mode's workers consume them through the shared
//! [`ScratchBuffers`].

mod coordinator;
mod grabber;
mod scratch;

pub use coordinator::CaptureCoordinator;
pub use grabber::{start_grabbers, CaptureSources};
pub use scratch::{ScratchBuffers, DEFAULT_AUDIO_SCRATCH, DEFAULT_VIDEO_SCRATCH};

/// One of the two media streams a mode can forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
        }
    }
}
