//! Unix domain socket server for remote control
//!
//! Clients are served one at a time, so mode changes reach the manager
//! strictly serialized. Requests run on the control thread; a set-mode
//! blocks it until the transition has finished.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use super::protocol::{parse_mode, status_code, Request, Response, PROTOCOL_VERSION};
use crate::fatal::FatalHandler;
use crate::state::ModeManager;

/// Largest accepted request body
const MAX_MESSAGE_LEN: usize = 4 * 1024;

/// Remote control server bound to a Unix socket
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    manager: Arc<ModeManager>,
    fatal: Arc<dyn FatalHandler>,
}

impl Server {
    /// Create a new server listening at `socket_path`
    pub fn new(
        socket_path: &Path,
        manager: Arc<ModeManager>,
        fatal: Arc<dyn FatalHandler>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path)
            .context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!(?socket_path, "remote control listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            manager,
            fatal,
        })
    }

    /// Run the server, serving one client session at a time
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    if let Err(e) = self.handle_client(stream).await {
                        warn!(?e, "client handler error");
                    }
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(&self, mut stream: UnixStream) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_MESSAGE_LEN {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            stream.read_exact(&mut msg_buf).await?;

            let request: Request = serde_json::from_slice(&msg_buf)
                .context("failed to parse request")?;

            debug!(?request, command = request.command_id(), "received request");

            let response = Self::process_request(request, &self.manager, self.fatal.as_ref());

            Self::send_message(&mut stream, &response).await?;
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        stream.write_all(&msg_len).await?;
        stream.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    ///
    /// Protocol violations never produce a response: they go to `fatal`.
    fn process_request(
        request: Request,
        manager: &ModeManager,
        fatal: &dyn FatalHandler,
    ) -> Response {
        match request {
            Request::GetVersion => Response::Version {
                version: PROTOCOL_VERSION,
            },

            Request::GetMode => match manager.status() {
                Ok(status) => Response::Mode {
                    mode: status_code(status),
                },
                Err(e) => fatal.raise(e),
            },

            Request::SetMode { mode } => {
                // Validate before touching any state
                let target = parse_mode(mode).unwrap_or_else(|e| fatal.raise(e));
                info!(mode, "mode change requested");
                if let Err(e) = manager.request_transition(target) {
                    fatal.raise(e);
                }
                Response::Ok
            }
        }
    }

    /// Remove the socket file
    pub async fn shutdown(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("remote control shutdown complete");
    }
}
