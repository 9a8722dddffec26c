//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::capture::{CaptureSources, DEFAULT_AUDIO_SCRATCH, DEFAULT_VIDEO_SCRATCH};
use crate::lifecycle::{WorkerConfig, MAX_PRIORITY};
use crate::modes::{BusEndpoints, TcpPorts, DEFAULT_RTSP_PORT};

/// Default directory holding the startup mode markers
const DEFAULT_MARKER_DIR: &str = "/config/streamd";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for remote control
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Directory probed for the startup mode marker files
    pub marker_dir: PathBuf,

    /// Stack size and priority of stream workers
    pub workers: WorkerConfig,

    /// Scratch region sizes (video, audio)
    pub scratch_video: usize,
    pub scratch_audio: usize,

    /// Capture device nodes feeding the coordinator
    pub capture: CaptureSources,

    /// Local bus endpoint files
    pub bus: BusEndpoints,

    /// Raw socket mode ports
    pub tcp: TcpPorts,

    /// Session protocol port
    pub rtsp_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("/var/lib/streamd");
        Self {
            socket_path: data_dir.join("daemon.sock"),
            data_dir,
            marker_dir: PathBuf::from(DEFAULT_MARKER_DIR),
            workers: WorkerConfig::default(),
            scratch_video: DEFAULT_VIDEO_SCRATCH,
            scratch_audio: DEFAULT_AUDIO_SCRATCH,
            capture: CaptureSources::default(),
            bus: BusEndpoints::default(),
            tcp: TcpPorts::default(),
            rtsp_port: DEFAULT_RTSP_PORT,
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let path = |key: &str| lookup(key).map(PathBuf::from);

        let data_dir = match path("STREAMD_DATA_DIR") {
            Some(dir) => dir,
            None => {
                let home = lookup("HOME").context("neither STREAMD_DATA_DIR nor HOME is set")?;
                PathBuf::from(&home)
                    .join(".local")
                    .join("share")
                    .join("streamd")
            }
        };

        let socket_path = path("STREAMD_SOCKET").unwrap_or_else(|| data_dir.join("daemon.sock"));

        let workers = WorkerConfig {
            stack_size: parse_var(&lookup, "STREAMD_WORKER_STACK", defaults.workers.stack_size)?,
            priority: parse_var(&lookup, "STREAMD_WORKER_PRIORITY", defaults.workers.priority)?,
        };
        anyhow::ensure!(
            workers.priority <= MAX_PRIORITY,
            "STREAMD_WORKER_PRIORITY must be between 0 and 63"
        );

        let scratch_video = parse_var(&lookup, "STREAMD_SCRATCH_VIDEO", defaults.scratch_video)?;
        let scratch_audio = parse_var(&lookup, "STREAMD_SCRATCH_AUDIO", defaults.scratch_audio)?;
        anyhow::ensure!(scratch_video > 0, "STREAMD_SCRATCH_VIDEO must be at least 1 byte");
        anyhow::ensure!(scratch_audio > 0, "STREAMD_SCRATCH_AUDIO must be at least 1 byte");

        Ok(Self {
            socket_path,
            data_dir,
            marker_dir: path("STREAMD_MARKER_DIR").unwrap_or(defaults.marker_dir),
            workers,
            scratch_video,
            scratch_audio,
            capture: CaptureSources {
                video: path("STREAMD_CAPTURE_VIDEO"),
                audio: path("STREAMD_CAPTURE_AUDIO"),
            },
            bus: BusEndpoints {
                video: path("STREAMD_BUS_VIDEO_EP").unwrap_or(defaults.bus.video),
                audio: path("STREAMD_BUS_AUDIO_EP").unwrap_or(defaults.bus.audio),
            },
            tcp: TcpPorts {
                video: parse_var(&lookup, "STREAMD_TCP_VIDEO_PORT", defaults.tcp.video)?,
                audio: parse_var(&lookup, "STREAMD_TCP_AUDIO_PORT", defaults.tcp.audio)?,
            },
            rtsp_port: parse_var(&lookup, "STREAMD_RTSP_PORT", defaults.rtsp_port)?,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create data directory {:?}", self.data_dir))?;
        Ok(())
    }
}

/// Parse an optional variable, falling back to `default` when unset
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
