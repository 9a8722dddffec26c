//! Raw socket mode
//!
//! Each stream listens on its own TCP port and writes raw packets to one
//! client at a time.

use std::io::{self, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{ModeKind, StreamMode, WorkerContext, WorkerSet};
use crate::capture::StreamKind;

/// How long a worker sleeps between accept attempts
pub(super) const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Bound on a single write so a stalled client cannot block teardown
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Listening ports for the two streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpPorts {
    pub video: u16,
    pub audio: u16,
}

impl Default for TcpPorts {
    fn default() -> Self {
        Self {
            video: 9911,
            audio: 9922,
        }
    }
}

pub struct SocketMode {
    ports: TcpPorts,
}

impl SocketMode {
    pub fn new(ports: TcpPorts) -> Self {
        Self { ports }
    }

    fn port(&self, stream: StreamKind) -> u16 {
        match stream {
            StreamKind::Video => self.ports.video,
            StreamKind::Audio => self.ports.audio,
        }
    }
}

/// Bind a non-blocking listener on all interfaces
pub(super) fn bind_listener(port: u16) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// One non-blocking accept attempt, configuring the client on success
pub(super) fn try_accept(listener: &TcpListener, stream: StreamKind) -> Option<TcpStream> {
    match listener.accept() {
        Ok((client, peer)) => match prepare_client(client) {
            Ok(client) => {
                info!(%stream, %peer, "client connected");
                Some(client)
            }
            Err(e) => {
                warn!(%peer, error = %e, "failed to configure client socket");
                None
            }
        },
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
        Err(e) => {
            warn!(%stream, error = %e, "accept failed");
            None
        }
    }
}

/// Poll `listener` until a client connects or the worker must stop
fn accept_client(listener: &TcpListener, ctx: &WorkerContext) -> Option<TcpStream> {
    while ctx.is_running() {
        if let Some(client) = try_accept(listener, ctx.stream) {
            return Some(client);
        }
        thread::sleep(ACCEPT_POLL);
    }
    None
}

fn prepare_client(stream: TcpStream) -> io::Result<TcpStream> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    Ok(stream)
}

impl StreamMode for SocketMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Tcp
    }

    fn workers(&self) -> WorkerSet {
        WorkerSet::BOTH
    }

    fn run_worker(&self, ctx: WorkerContext) {
        let port = self.port(ctx.stream);
        let listener = match bind_listener(port) {
            Ok(listener) => listener,
            Err(e) => {
                warn!(stream = %ctx.stream, port, error = %e, "failed to bind listener");
                // Keep consuming so the worker still exits on unlock
                while ctx.next_packet().is_some() {}
                return;
            }
        };
        info!(stream = %ctx.stream, port, "socket worker listening");

        'session: while let Some(mut client) = accept_client(&listener, &ctx) {
            while let Some(packet) = ctx.next_packet() {
                let sent = ctx
                    .scratch
                    .stage(ctx.stream, &packet, |chunk| client.write_all(chunk));
                if let Err(e) = sent {
                    info!(stream = %ctx.stream, error = %e, "client disconnected");
                    continue 'session;
                }
            }
            break;
        }

        debug!(stream = %ctx.stream, "socket worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::Arc;

    use bytes::Bytes;

    use crate::capture::{CaptureCoordinator, ScratchBuffers};
    use crate::lifecycle::RunFlag;

    fn free_port() -> u16 {
        TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn connect(port: u16) -> TcpStream {
        for _ in 0..50 {
            if let Ok(stream) = TcpStream::connect((Ipv4Addr::LOCALHOST, port)) {
                return stream;
            }
            thread::sleep(Duration::from_millis(20));
        }
        panic!("worker never started listening on {port}");
    }

    #[test]
    fn test_worker_streams_packets_to_client() {
        let ports = TcpPorts {
            video: free_port(),
            audio: free_port(),
        };
        let mode = Arc::new(SocketMode::new(ports));
        let capture = Arc::new(CaptureCoordinator::new());
        let running = RunFlag::new();
        running.start();

        let ctx = WorkerContext {
            stream: StreamKind::Audio,
            running: running.clone(),
            capture: Arc::clone(&capture),
            scratch: Arc::new(ScratchBuffers::new(16, 16)),
        };
        let worker = {
            let mode = Arc::clone(&mode);
            thread::spawn(move || mode.run_worker(ctx))
        };

        let mut client = connect(ports.audio);
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        // The worker may still be between accept and wait; republish until read
        let mut received = [0u8; 6];
        let mut filled = 0;
        while filled == 0 {
            capture.publish(StreamKind::Audio, Bytes::from_static(b"abcdef"));
            thread::sleep(Duration::from_millis(20));
            client.set_nonblocking(true).unwrap();
            if let Ok(n) = client.read(&mut received) {
                filled = n;
            }
            client.set_nonblocking(false).unwrap();
        }
        client.read_exact(&mut received[filled..]).unwrap();
        assert_eq!(&received, b"abcdef");

        running.stop();
        capture.force_unlock_consumers();
        worker.join().unwrap();
    }

    #[test]
    fn test_worker_exits_without_client() {
        let mode = SocketMode::new(TcpPorts {
            video: free_port(),
            audio: free_port(),
        });
        let running = RunFlag::new();
        running.start();
        let ctx = WorkerContext {
            stream: StreamKind::Video,
            running: running.clone(),
            capture: Arc::new(CaptureCoordinator::new()),
            scratch: Arc::new(ScratchBuffers::new(16, 16)),
        };

        let stopper = {
            let running = running.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                running.stop();
            })
        };

        mode.run_worker(ctx);
        stopper.join().unwrap();
    }
}
