//! Structured lifecycle event stream.
//!
//! Lifecycle events are serialized as newline-delimited JSON (JSONL) with a
//! monotonically increasing sequence number for ordering guarantees. The
//! emitter is exposed as a regular bus module ([`JsonlEventLog`]), so the
//! observability stream uses the same subscription mechanism as every other
//! behavior module.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::HandlerError;
use crate::event::{ArenaEvent, EventBus, EventHandler, EventKindSet};
use crate::ids::ModuleId;

/// Wraps an [`ArenaEvent`] with a monotonically increasing sequence number.
#[derive(Debug, Serialize)]
struct EventEnvelope<'a> {
    /// Zero-based, monotonically increasing sequence counter.
    sequence: u64,
    /// The wrapped event (flattened into the same JSON object).
    #[serde(flatten)]
    event: &'a ArenaEvent,
}

/// Thread-safe, buffered JSONL event writer.
///
/// Each call to [`emit`](Self::emit) atomically increments the sequence
/// counter, serializes the event as a single JSON line, and flushes the
/// underlying writer. Serialization or I/O failures are silently dropped
/// because observability must never crash the host.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

// Box<dyn Write> is not Debug — provide a manual impl.
impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates an emitter that writes to stderr, out of the way of anything
    /// the host writes to stdout.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that silently discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    ///
    /// Failures are silently dropped — observability must not crash the host.
    pub fn emit(&self, event: &ArenaEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

/// Bus module streaming every lifecycle event as JSONL.
#[derive(Debug)]
pub struct JsonlEventLog {
    emitter: EventEmitter,
}

impl JsonlEventLog {
    /// The module id this log registers under.
    #[must_use]
    pub fn module_id() -> ModuleId {
        ModuleId::from("event-log")
    }

    /// Wraps an emitter as a bus module.
    #[must_use]
    pub const fn new(emitter: EventEmitter) -> Self {
        Self { emitter }
    }

    /// Subscribes an emitter to every event kind on `bus`.
    pub fn install(bus: &EventBus, emitter: EventEmitter) {
        bus.subscribe(
            Self::module_id(),
            EventKindSet::all(),
            std::sync::Arc::new(Self::new(emitter)),
        );
    }
}

impl EventHandler for JsonlEventLog {
    fn handle(&self, event: &ArenaEvent) -> Result<(), HandlerError> {
        self.emitter.emit(event);
        Ok(())
    }
}
