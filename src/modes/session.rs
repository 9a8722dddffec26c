//! Session protocol mode
//!
//! Both workers share one listener and one client connection. Packets go
//! out with interleaved binary framing (`$`, channel, big-endian length);
//! the session handshake itself is handled by the client-side tooling.

use std::io::{self, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::socket::{bind_listener, try_accept, ACCEPT_POLL};
use super::{ModeContext, ModeKind, StreamMode, WorkerContext, WorkerSet};
use crate::capture::StreamKind;

/// Default session port
pub const DEFAULT_RTSP_PORT: u16 = 6666;

/// Largest payload one interleaved frame can carry
const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Connection shared by both workers; the lock keeps frames whole
type SharedClient = Arc<Mutex<TcpStream>>;

#[derive(Default)]
struct Session {
    listener: Option<TcpListener>,
    client: Option<SharedClient>,
}

pub struct SessionMode {
    port: u16,
    session: Mutex<Session>,
}

impl SessionMode {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            session: Mutex::new(Session::default()),
        }
    }

    fn channel(stream: StreamKind) -> u8 {
        match stream {
            StreamKind::Video => 0,
            StreamKind::Audio => 2,
        }
    }

    fn current_client(&self) -> Option<SharedClient> {
        self.session.lock().client.clone()
    }

    /// The session client, accepting one if nobody is connected yet
    ///
    /// Either worker may accept. Between polls each one checks whether the
    /// other already has, so a single connection serves both channels.
    fn ensure_client(&self, ctx: &WorkerContext) -> Option<SharedClient> {
        let listener = {
            let mut session = self.session.lock();
            if let Some(client) = &session.client {
                return Some(Arc::clone(client));
            }
            if session.listener.is_none() {
                match bind_listener(self.port) {
                    Ok(listener) => session.listener = Some(listener),
                    Err(e) => {
                        warn!(port = self.port, error = %e, "failed to bind session listener");
                        return None;
                    }
                }
            }
            session.listener.as_ref()?.try_clone().ok()?
        };

        // Accept without holding the lock so the other worker is not stalled
        while ctx.is_running() {
            if let Some(client) = self.current_client() {
                return Some(client);
            }
            let Some(accepted) = try_accept(&listener, ctx.stream) else {
                thread::sleep(ACCEPT_POLL);
                continue;
            };

            let mut session = self.session.lock();
            if session.client.is_some() {
                debug!(stream = %ctx.stream, "session already has a client, refusing another");
            }
            let client = session
                .client
                .get_or_insert_with(|| Arc::new(Mutex::new(accepted)));
            return Some(Arc::clone(client));
        }
        None
    }

    /// Forget `client` unless the other worker already replaced it
    fn drop_client(&self, client: &SharedClient) {
        let mut session = self.session.lock();
        if session
            .client
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, client))
        {
            session.client = None;
            info!("session client disconnected");
        }
    }
}

/// Write one packet as interleaved frames
fn write_interleaved(out: &mut impl Write, channel: u8, payload: &[u8]) -> io::Result<()> {
    for frame in payload.chunks(MAX_FRAME_PAYLOAD) {
        let len = (frame.len() as u16).to_be_bytes();
        out.write_all(&[b'$', channel, len[0], len[1]])?;
        out.write_all(frame)?;
    }
    Ok(())
}

impl StreamMode for SessionMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Rtsp
    }

    fn workers(&self) -> WorkerSet {
        WorkerSet::BOTH
    }

    fn init(&self, _ctx: &ModeContext<'_>) {
        let mut session = self.session.lock();
        match bind_listener(self.port) {
            Ok(listener) => {
                info!(port = self.port, "session listener ready");
                session.listener = Some(listener);
            }
            // Retried lazily by the workers
            Err(e) => warn!(port = self.port, error = %e, "failed to bind session listener"),
        }
    }

    fn run_worker(&self, ctx: WorkerContext) {
        let channel = Self::channel(ctx.stream);

        while ctx.is_running() {
            let Some(client) = self.ensure_client(&ctx) else {
                // Not running anymore, or the port is unavailable
                if ctx.next_packet().is_none() {
                    break;
                }
                continue;
            };

            let Some(packet) = ctx.next_packet() else {
                break;
            };

            let sent = {
                let mut out = client.lock();
                ctx.scratch.stage(ctx.stream, &packet, |chunk| {
                    write_interleaved(&mut *out, channel, chunk)
                })
            };
            if let Err(e) = sent {
                debug!(stream = %ctx.stream, error = %e, "session write failed");
                self.drop_client(&client);
            }
        }

        debug!(stream = %ctx.stream, "session worker stopped");
    }

    fn exit(&self, _ctx: &ModeContext<'_>) {
        let mut session = self.session.lock();
        session.client = None;
        session.listener = None;
        info!("session closed");
    }
}
