//! Synchronous, ordered event dispatch.
//!
//! Handlers run inline on the publishing thread, in registration order.
//! A handler failure is logged and contained; it never stops dispatch or
//! poisons the arena that published the event.

use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use super::{ArenaEvent, EventKindSet};
use crate::error::HandlerError;
use crate::ids::ModuleId;

/// A behavior module's entry point for lifecycle events.
///
/// Implementations must not block for long: dispatch is synchronous and
/// holds up the publishing arena. Failures are contained by the bus.
pub trait EventHandler: Send + Sync {
    /// Handles one published event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the module cannot process the event;
    /// the bus logs the failure and continues with the next handler.
    fn handle(&self, event: &ArenaEvent) -> Result<(), HandlerError>;
}

struct Registration {
    module: ModuleId,
    kinds: EventKindSet,
    handler: Arc<dyn EventHandler>,
}

/// Ordered registry of event handlers.
///
/// Registration order is dispatch order. Re-subscribing a module id
/// replaces its handler and kind set in place, keeping its original slot.
#[derive(Default)]
pub struct EventBus {
    registrations: RwLock<Vec<Registration>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `module` to the given event kinds.
    ///
    /// Idempotent: a module id that is already registered keeps its position
    /// in the dispatch order and has its handler and kinds replaced.
    pub fn subscribe(&self, module: ModuleId, kinds: EventKindSet, handler: Arc<dyn EventHandler>) {
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(existing) = registrations.iter_mut().find(|r| r.module == module) {
            debug!(module = %module, "replacing event subscription");
            existing.kinds = kinds;
            existing.handler = handler;
        } else {
            debug!(module = %module, "registering event subscription");
            registrations.push(Registration {
                module,
                kinds,
                handler,
            });
        }
    }

    /// Removes a module's subscription. Unknown ids are a no-op.
    pub fn unsubscribe(&self, module: &ModuleId) {
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        registrations.retain(|r| &r.module != module);
    }

    /// Drops every subscription. Used at server shutdown.
    pub fn teardown(&self) {
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        registrations.clear();
    }

    /// Number of registered modules.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.registrations
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Dispatches one event to every subscriber of its kind, in
    /// registration order.
    ///
    /// The subscription list is snapshotted before any handler runs, so a
    /// handler that subscribes or unsubscribes during dispatch affects only
    /// later events.
    pub fn dispatch(&self, event: &ArenaEvent) {
        let kind = event.kind();
        let interested: Vec<(ModuleId, Arc<dyn EventHandler>)> = {
            let registrations = self
                .registrations
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            registrations
                .iter()
                .filter(|r| r.kinds.contains(kind))
                .map(|r| (r.module.clone(), Arc::clone(&r.handler)))
                .collect()
        };

        for (module, handler) in interested {
            if let Err(err) = handler.handle(event) {
                crate::observability::metrics::record_handler_failure(&module);
                warn!(
                    module = %module,
                    event = ?kind,
                    arena = %event.arena,
                    error = %err,
                    "event handler failed; continuing dispatch"
                );
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("modules", &self.module_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::arena::lifecycle::Phase;
    use crate::event::{EventKind, EventPayload};
    use crate::ids::{InstanceId, PlayerId, TeamId};

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl EventHandler for Recorder {
        fn handle(&self, _event: &ArenaEvent) -> Result<(), HandlerError> {
            self.log.lock().unwrap().push(self.label);
            Ok(())
        }
    }

    struct Failing;

    impl EventHandler for Failing {
        fn handle(&self, _event: &ArenaEvent) -> Result<(), HandlerError> {
            Err(HandlerError::new("boom"))
        }
    }

    fn phase_event() -> ArenaEvent {
        ArenaEvent::now(
            InstanceId::new(),
            EventPayload::PhaseChanged {
                from: Phase::Idle,
                to: Phase::Waiting,
                forced: false,
            },
        )
    }

    fn join_event() -> ArenaEvent {
        ArenaEvent::now(
            InstanceId::new(),
            EventPayload::PlayerJoined {
                player: PlayerId::new("steve"),
                team: TeamId(0),
            },
        )
    }

    #[test]
    fn dispatch_runs_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            bus.subscribe(
                ModuleId::from(label),
                EventKindSet::all(),
                Arc::new(Recorder {
                    label,
                    log: Arc::clone(&log),
                }),
            );
        }

        bus.dispatch(&phase_event());
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn kind_filter_skips_uninterested_modules() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            ModuleId::from("phases-only"),
            EventKindSet::of(&[EventKind::PhaseChanged]),
            Arc::new(Recorder {
                label: "phases-only",
                log: Arc::clone(&log),
            }),
        );

        bus.dispatch(&join_event());
        assert!(log.lock().unwrap().is_empty());

        bus.dispatch(&phase_event());
        assert_eq!(*log.lock().unwrap(), vec!["phases-only"]);
    }

    #[test]
    fn resubscribe_replaces_in_place() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(
            ModuleId::from("a"),
            EventKindSet::all(),
            Arc::new(Recorder {
                label: "a-old",
                log: Arc::clone(&log),
            }),
        );
        bus.subscribe(
            ModuleId::from("b"),
            EventKindSet::all(),
            Arc::new(Recorder {
                label: "b",
                log: Arc::clone(&log),
            }),
        );
        // Re-register "a"; it must keep its slot ahead of "b".
        bus.subscribe(
            ModuleId::from("a"),
            EventKindSet::all(),
            Arc::new(Recorder {
                label: "a-new",
                log: Arc::clone(&log),
            }),
        );

        assert_eq!(bus.module_count(), 2);
        bus.dispatch(&phase_event());
        assert_eq!(*log.lock().unwrap(), vec!["a-new", "b"]);
    }

    #[test]
    fn handler_failure_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            ModuleId::from("failing"),
            EventKindSet::all(),
            Arc::new(Failing),
        );
        bus.subscribe(
            ModuleId::from("after"),
            EventKindSet::all(),
            Arc::new(Recorder {
                label: "after",
                log: Arc::clone(&log),
            }),
        );

        bus.dispatch(&phase_event());
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn unsubscribe_and_teardown() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            ModuleId::from("a"),
            EventKindSet::all(),
            Arc::new(Recorder {
                label: "a",
                log: Arc::clone(&log),
            }),
        );
        bus.subscribe(
            ModuleId::from("b"),
            EventKindSet::all(),
            Arc::new(Recorder {
                label: "b",
                log: Arc::clone(&log),
            }),
        );

        bus.unsubscribe(&ModuleId::from("a"));
        assert_eq!(bus.module_count(), 1);

        bus.teardown();
        assert_eq!(bus.module_count(), 0);
        bus.dispatch(&phase_event());
        assert!(log.lock().unwrap().is_empty());
    }
}
