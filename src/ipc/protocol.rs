//! Remote control message protocol
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.
//! Modes travel as the numeric codes the client tooling already knows.

use serde::{Deserialize, Serialize};

use crate::fatal::Fatal;
use crate::modes::ModeKind;
use crate::state::ModeStatus;

/// Version of the remote control protocol, unrelated to the daemon version
pub const PROTOCOL_VERSION: u32 = 10;

pub const CMD_GET_VERSION: u32 = 100;
pub const CMD_GET_MODE: u32 = 101;

pub const MODE_USB: u32 = 1;
pub const MODE_TCP: u32 = 2;
pub const MODE_NONE: u32 = 3;
pub const MODE_RTSP: u32 = 4;
pub const MODE_SWITCHING: u32 = 999_998;

/// Requests from a client to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Query the protocol version
    GetVersion,

    /// Query the active mode
    GetMode,

    /// Switch to the mode with the given code
    SetMode { mode: u32 },
}

impl Request {
    /// Numeric command id; set-mode commands share the mode's code
    pub fn command_id(&self) -> u32 {
        match self {
            Request::GetVersion => CMD_GET_VERSION,
            Request::GetMode => CMD_GET_MODE,
            Request::SetMode { mode } => *mode,
        }
    }
}

/// Responses from the daemon to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Protocol version
    Version { version: u32 },

    /// Active mode code, or the switching marker
    Mode { mode: u32 },

    /// Mode change completed
    Ok,
}

/// Wire code reported for a status
pub fn status_code(status: ModeStatus) -> u32 {
    match status {
        ModeStatus::Switching => MODE_SWITCHING,
        ModeStatus::Inactive => MODE_NONE,
        ModeStatus::Active(kind) => mode_code(Some(kind)),
    }
}

/// Wire code of a set-mode target
pub fn mode_code(mode: Option<ModeKind>) -> u32 {
    match mode {
        None => MODE_NONE,
        Some(ModeKind::Usb) => MODE_USB,
        Some(ModeKind::Tcp) => MODE_TCP,
        Some(ModeKind::Rtsp) => MODE_RTSP,
    }
}

/// Decode a set-mode target; anything but the four mode codes is fatal
pub fn parse_mode(code: u32) -> Result<Option<ModeKind>, Fatal> {
    match code {
        MODE_USB => Ok(Some(ModeKind::Usb)),
        MODE_TCP => Ok(Some(ModeKind::Tcp)),
        MODE_RTSP => Ok(Some(ModeKind::Rtsp)),
        MODE_NONE => Ok(None),
        other => Err(Fatal::InvalidModeValue(other)),
    }
}
