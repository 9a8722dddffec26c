//! Scripted modes for exercising the lifecycle without real transports

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{ModeContext, ModeKind, ModeTable, StreamMode, WorkerContext, WorkerSet};
use crate::capture::StreamKind;

/// Observable lifecycle calls, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Init { mode: ModeKind, scratch_zeroed: bool },
    WorkerStarted(ModeKind, StreamKind),
    WorkerStopped(ModeKind, StreamKind),
    Exit(ModeKind),
}

/// Call log shared by every scripted mode of a table
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.0.lock())
    }

    pub fn count(&self, call: &Call) -> usize {
        self.0.lock().iter().filter(|c| *c == call).count()
    }
}

/// A mode whose workers block on capture until unlocked
pub struct ScriptedMode {
    kind: ModeKind,
    workers: WorkerSet,
    log: CallLog,
    live: Arc<AtomicUsize>,
    /// When set, `init` blocks until the sender side signals or is dropped
    init_gate: Mutex<Option<mpsc::Receiver<()>>>,
    /// When set, the worker for this stream panics on exit
    panic_on_exit: Option<StreamKind>,
}

impl ScriptedMode {
    pub fn new(kind: ModeKind, workers: WorkerSet, log: CallLog, live: Arc<AtomicUsize>) -> Self {
        Self {
            kind,
            workers,
            log,
            live,
            init_gate: Mutex::new(None),
            panic_on_exit: None,
        }
    }

    /// Block the next `init` until the returned sender fires
    pub fn gate_init(&self) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.init_gate.lock() = Some(rx);
        tx
    }

    pub fn panicking_on_exit(mut self, stream: StreamKind) -> Self {
        self.panic_on_exit = Some(stream);
        self
    }
}

impl StreamMode for ScriptedMode {
    fn kind(&self) -> ModeKind {
        self.kind
    }

    fn workers(&self) -> WorkerSet {
        self.workers
    }

    fn init(&self, ctx: &ModeContext<'_>) {
        self.log.push(Call::Init {
            mode: self.kind,
            scratch_zeroed: ctx.scratch.is_zeroed(),
        });
        let gate = self.init_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
    }

    fn run_worker(&self, ctx: WorkerContext) {
        self.log.push(Call::WorkerStarted(self.kind, ctx.stream));

        // Leave stale data behind for the next mode
        let _ = ctx
            .scratch
            .stage::<(), _>(ctx.stream, &[0xA5; 8], |_| Ok(()));
        self.live.fetch_add(1, Ordering::SeqCst);

        while ctx.next_packet().is_some() {}

        self.log.push(Call::WorkerStopped(self.kind, ctx.stream));
        self.live.fetch_sub(1, Ordering::SeqCst);

        if self.panic_on_exit == Some(ctx.stream) {
            panic!("scripted {} worker failure", ctx.stream);
        }
    }

    fn exit(&self, _ctx: &ModeContext<'_>) {
        self.log.push(Call::Exit(self.kind));
    }
}

/// Scripted table plus the handles tests inspect
pub struct Fixture {
    pub table: ModeTable,
    pub log: CallLog,
    pub live: Arc<AtomicUsize>,
    pub usb: Arc<ScriptedMode>,
    pub tcp: Arc<ScriptedMode>,
    pub rtsp: Arc<ScriptedMode>,
}

impl Fixture {
    /// usb declares video only, tcp and rtsp declare both workers
    pub fn new() -> Self {
        Self::with_modes(|mode| mode)
    }

    /// Build the fixture, letting `customize` adjust each mode
    pub fn with_modes(customize: impl Fn(ScriptedMode) -> ScriptedMode) -> Self {
        let log = CallLog::default();
        let live = Arc::new(AtomicUsize::new(0));
        let build = |kind, workers| {
            Arc::new(customize(ScriptedMode::new(
                kind,
                workers,
                log.clone(),
                Arc::clone(&live),
            )))
        };

        let usb = build(ModeKind::Usb, WorkerSet::VIDEO_ONLY);
        let tcp = build(ModeKind::Tcp, WorkerSet::BOTH);
        let rtsp = build(ModeKind::Rtsp, WorkerSet::BOTH);

        let table = ModeTable::new(usb.clone(), tcp.clone(), rtsp.clone());

        Self {
            table,
            log,
            live,
            usb,
            tcp,
            rtsp,
        }
    }

    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Wait for freshly launched workers to enter their loops
    pub fn wait_for_live(&self, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if self.live_workers() == expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }
}
