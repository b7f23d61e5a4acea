//! Shared integration-test harness: an in-process arena host with a
//! recording bus module, plus helpers for spawning the `arenad` binary.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};

use arenad::config::schema::test_support::template;
use arenad::error::HandlerError;
use arenad::event::{ArenaEvent, EventBus, EventHandler, EventKind, EventKindSet};
use arenad::ids::{ModuleId, PlayerId};
use arenad::manager::ArenaManager;
use arenad::victory::VictoryRegistry;

/// Bus module that records every event it sees, in dispatch order.
pub struct Recorder {
    events: Mutex<Vec<ArenaEvent>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<ArenaEvent> {
        self.events.lock().unwrap().clone()
    }

    /// The kinds recorded so far, in order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(ArenaEvent::kind).collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventHandler for Recorder {
    fn handle(&self, event: &ArenaEvent) -> Result<(), HandlerError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// An arena host wired to a recorder subscribed to every event kind.
pub struct Harness {
    pub manager: Arc<ArenaManager>,
    pub recorder: Arc<Recorder>,
}

/// Builds a host with one head-to-head and one team template registered.
pub fn harness() -> Harness {
    let bus = Arc::new(EventBus::new());
    let recorder = Recorder::new();
    bus.subscribe(
        ModuleId::from("recorder"),
        EventKindSet::all(),
        Arc::clone(&recorder) as Arc<dyn EventHandler>,
    );

    let manager = Arc::new(ArenaManager::new(
        bus,
        Arc::new(VictoryRegistry::with_builtins()),
    ));
    manager.register_template(template("duel", 2, 1, 2)).unwrap();
    manager.register_template(template("skirmish", 2, 2, 2)).unwrap();

    Harness { manager, recorder }
}

pub fn player(name: &str) -> PlayerId {
    PlayerId::new(name)
}

/// Spawns the `arenad` binary with the given arguments and waits for it.
pub fn spawn_command(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_arenad"))
        .args(args)
        .output()
        .expect("failed to spawn arenad")
}

/// Absolute path to a file under `tests/fixtures/`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}
