//! Hand-off point between the capture pipeline and stream workers
//!
//! Each stream has a single-packet slot guarded by a mutex and condvar.
//! Producers overwrite the slot; consumers block until a packet arrives.
//! During a mode transition the manager clears the run flag and then calls
//! [`CaptureCoordinator::force_unlock_consumers`], which wakes every blocked
//! consumer so its worker can exit.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::StreamKind;
use crate::lifecycle::RunFlag;

#[derive(Default)]
struct SlotState {
    pending: Option<Bytes>,
    /// Bumped on every forced unlock
    unlock_epoch: u64,
    /// Packets overwritten before a consumer took them
    dropped: u64,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

/// Shared capture session exposed to whichever mode is active
#[derive(Default)]
pub struct CaptureCoordinator {
    video: Slot,
    audio: Slot,
}

impl CaptureCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, stream: StreamKind) -> &Slot {
        match stream {
            StreamKind::Video => &self.video,
            StreamKind::Audio => &self.audio,
        }
    }

    /// Publish the latest packet for `stream`, replacing an unconsumed one
    pub fn publish(&self, stream: StreamKind, packet: Bytes) {
        let slot = self.slot(stream);
        let mut state = slot.state.lock();
        if state.pending.replace(packet).is_some() {
            state.dropped += 1;
            trace!(%stream, dropped = state.dropped, "capture packet overwritten");
        }
        slot.ready.notify_one();
    }

    /// Block until a packet is available
    ///
    /// Returns `None` once `running` is cleared or a forced unlock happens
    /// after the wait began.
    pub fn wait(&self, stream: StreamKind, running: &RunFlag) -> Option<Bytes> {
        let slot = self.slot(stream);
        let mut state = slot.state.lock();
        let epoch = state.unlock_epoch;

        loop {
            // Checked under the lock so an unlock cannot slip in unobserved
            if !running.is_running() || state.unlock_epoch != epoch {
                return None;
            }
            if let Some(packet) = state.pending.take() {
                return Some(packet);
            }
            slot.ready.wait(&mut state);
        }
    }

    /// Take a pending packet without blocking
    pub fn try_take(&self, stream: StreamKind) -> Option<Bytes> {
        self.slot(stream).state.lock().pending.take()
    }

    /// Wake every consumer blocked in [`wait`](Self::wait)
    pub fn force_unlock_consumers(&self) {
        for slot in [&self.video, &self.audio] {
            let mut state = slot.state.lock();
            state.unlock_epoch = state.unlock_epoch.wrapping_add(1);
            slot.ready.notify_all();
        }
        trace!("capture consumers unlocked");
    }

    /// Number of packets dropped on `stream` because nobody consumed them
    pub fn dropped(&self, stream: StreamKind) -> u64 {
        self.slot(stream).state.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn running() -> RunFlag {
        let flag = RunFlag::new();
        flag.start();
        flag
    }

    #[test]
    fn test_publish_then_wait() {
        let capture = CaptureCoordinator::new();
        capture.publish(StreamKind::Video, Bytes::from_static(b"frame"));

        let packet = capture.wait(StreamKind::Video, &running());
        assert_eq!(packet.as_deref(), Some(&b"frame"[..]));
        assert!(capture.try_take(StreamKind::Video).is_none());
    }

    #[test]
    fn test_streams_are_independent() {
        let capture = CaptureCoordinator::new();
        capture.publish(StreamKind::Audio, Bytes::from_static(b"pcm"));

        assert!(capture.try_take(StreamKind::Video).is_none());
        assert_eq!(
            capture.try_take(StreamKind::Audio).as_deref(),
            Some(&b"pcm"[..])
        );
    }

    #[test]
    fn test_overwrite_counts_drops() {
        let capture = CaptureCoordinator::new();
        capture.publish(StreamKind::Video, Bytes::from_static(b"one"));
        capture.publish(StreamKind::Video, Bytes::from_static(b"two"));

        assert_eq!(capture.dropped(StreamKind::Video), 1);
        assert_eq!(
            capture.try_take(StreamKind::Video).as_deref(),
            Some(&b"two"[..])
        );
    }

    #[test]
    fn test_wait_returns_none_when_stopped() {
        let capture = CaptureCoordinator::new();
        let flag = RunFlag::new();
        assert!(capture.wait(StreamKind::Audio, &flag).is_none());
    }

    #[test]
    fn test_force_unlock_wakes_blocked_consumer() {
        let capture = Arc::new(CaptureCoordinator::new());
        let flag = running();
        let (done_tx, done_rx) = mpsc::channel();

        let consumer = {
            let capture = Arc::clone(&capture);
            let flag = flag.clone();
            thread::spawn(move || {
                let packet = capture.wait(StreamKind::Video, &flag);
                done_tx.send(packet.is_none()).unwrap();
            })
        };

        // Give the consumer time to block
        thread::sleep(Duration::from_millis(50));
        flag.stop();
        capture.force_unlock_consumers();

        let unlocked = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(unlocked);
        consumer.join().unwrap();
    }

    #[test]
    fn test_publish_wakes_blocked_consumer() {
        let capture = Arc::new(CaptureCoordinator::new());
        let flag = running();

        let consumer = {
            let capture = Arc::clone(&capture);
            let flag = flag.clone();
            thread::spawn(move || capture.wait(StreamKind::Audio, &flag))
        };

        thread::sleep(Duration::from_millis(50));
        capture.publish(StreamKind::Audio, Bytes::from_static(b"late"));

        let packet = consumer.join().unwrap();
        assert_eq!(packet.as_deref(), Some(&b"late"[..]));
    }
}
