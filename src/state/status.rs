//! Externally observable mode status

use crate::modes::ModeKind;

/// What a status query reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeStatus {
    /// A transition is in progress
    Switching,
    /// No mode is active
    Inactive,
    /// The given mode is running with all of its workers
    Active(ModeKind),
}

impl ModeStatus {
    pub fn active_mode(&self) -> Option<ModeKind> {
        match self {
            ModeStatus::Active(kind) => Some(*kind),
            ModeStatus::Switching | ModeStatus::Inactive => None,
        }
    }
}

impl std::fmt::Display for ModeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModeStatus::Switching => write!(f, "Switching"),
            ModeStatus::Inactive => write!(f, "Inactive"),
            ModeStatus::Active(kind) => write!(f, "Active({kind})"),
        }
    }
}
