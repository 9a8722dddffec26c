//! Fatal diagnostics
//!
//! Every invariant violation in the mode lifecycle terminates the daemon.
//! The core reports them as [`Fatal`] values; the process boundary hands
//! them to a [`FatalHandler`], which never returns.

use tracing::error;

/// Crash-report module id shared by every diagnostic
pub const MODULE_ID: u32 = 0x69;

/// Unrecoverable conditions, each carrying a distinct diagnostic code
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fatal {
    #[error("active mode slot holds an unknown mode")]
    UnknownActiveMode,

    #[error("set-mode received unknown mode value {0}")]
    InvalidModeValue(u32),

    #[error("mode transition requested while another is in progress")]
    AlreadySwitching,

    #[error("failed to start video worker")]
    StartVideo,

    #[error("failed to start audio worker")]
    StartAudio,

    #[error("failed to join video worker")]
    JoinVideo,

    #[error("failed to join audio worker")]
    JoinAudio,
}

impl Fatal {
    /// Diagnostic code identifying the violated invariant
    pub fn code(&self) -> u32 {
        match self {
            Fatal::UnknownActiveMode => 14,
            Fatal::InvalidModeValue(_) => 15,
            Fatal::AlreadySwitching => 16,
            Fatal::StartVideo => 19,
            Fatal::StartAudio => 20,
            Fatal::JoinVideo => 21,
            Fatal::JoinAudio => 22,
        }
    }

    /// Result code in the console crash-report layout
    pub fn result_code(&self) -> u32 {
        (MODULE_ID & 0x1FF) | ((self.code() & 0x1FFF) << 9)
    }
}

/// Terminates the process on a fatal condition
pub trait FatalHandler: Send + Sync {
    fn raise(&self, fatal: Fatal) -> !;
}

/// Production handler: log the diagnostic and exit with its code
#[derive(Debug, Default)]
pub struct ProcessAbort;

impl FatalHandler for ProcessAbort {
    fn raise(&self, fatal: Fatal) -> ! {
        error!(
            code = fatal.code(),
            result = format_args!("{:#x}", fatal.result_code()),
            "fatal: {fatal}"
        );
        std::process::exit(fatal.code() as i32)
    }
}
