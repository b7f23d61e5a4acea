//! Timer tasks driving one arena instance.
//!
//! The state machine never sleeps; it only asks for timers. The runtime
//! owns a single driver task per instance: it receives [`TimerRequest`]s
//! over a channel, sleeps them out in sub-tasks, and re-enters the arena
//! when they fire. Generation guards in the machine make a late or
//! cancelled timer a no-op, so cancellation here only has to stop the
//! tasks, never to reason about state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::lifecycle::TimerRequest;
use super::Arena;

/// Handle to the spawned driver task of one arena instance.
pub struct ArenaRuntime {
    handle: JoinHandle<()>,
}

impl ArenaRuntime {
    /// Spawns the driver task for `arena` and attaches its timer channel.
    ///
    /// The task runs until the arena's cancellation token fires. The tick
    /// interval polls the victory fallback continuously; outside `Active`
    /// the tick is a no-op in the machine, which is cheaper than arming and
    /// disarming the interval on every transition.
    #[must_use]
    pub fn spawn(arena: Arc<Arena>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<TimerRequest>();
        arena.attach_timers(sender);
        let cancel = arena.cancel_token();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(arena.template().tick_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!(arena = %arena.id(), "arena driver stopping");
                        break;
                    }
                    _ = tick.tick() => {
                        arena.tick();
                    }
                    request = receiver.recv() => {
                        let Some(request) = request else { break };
                        trace!(
                            arena = %arena.id(),
                            kind = ?request.kind,
                            generation = request.generation,
                            "arming timer"
                        );
                        let arena = Arc::clone(&arena);
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                () = cancel.cancelled() => {}
                                () = tokio::time::sleep(request.after) => {
                                    arena.on_timer(request.kind, request.generation);
                                }
                            }
                        });
                    }
                }
            }
        });

        Self { handle }
    }

    /// Waits for the driver task to finish. Call after cancelling the
    /// arena's token (force shutdown does).
    pub async fn join(self) {
        let _ = self.handle.await;
    }

    /// Aborts the driver task without waiting.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl std::fmt::Debug for ArenaRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaRuntime")
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::RwLock;
    use std::time::Duration;

    use super::*;
    use crate::arena::Phase;
    use crate::config::schema::test_support::template;
    use crate::event::EventBus;
    use crate::ids::{InstanceId, ModuleId, PlayerId};
    use crate::registry::PlayerRegistry;
    use crate::victory::{GameSignal, LastTeamStanding};

    fn spawn_duel(restorers: Vec<ModuleId>) -> (Arc<Arena>, ArenaRuntime) {
        let arena = Arena::new(
            InstanceId::new(),
            Arc::new(template("duel", 2, 1, 2)),
            Arc::new(LastTeamStanding),
            Arc::new(EventBus::new()),
            Arc::new(PlayerRegistry::new()),
            Arc::new(RwLock::new(restorers)),
        );
        let runtime = ArenaRuntime::spawn(Arc::clone(&arena));
        (arena, runtime)
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_drives_starting_to_active() {
        let (arena, _runtime) = spawn_duel(Vec::new());
        arena.join(PlayerId::new("a"), None).unwrap();
        arena.join(PlayerId::new("b"), None).unwrap();
        assert_eq!(arena.phase(), Phase::Starting);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(arena.phase(), Phase::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn discarded_countdown_does_not_fire() {
        let (arena, _runtime) = spawn_duel(Vec::new());
        arena.join(PlayerId::new("a"), None).unwrap();
        arena.join(PlayerId::new("b"), None).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        arena.leave(&PlayerId::new("b"));
        assert_eq!(arena.phase(), Phase::Waiting);

        // Let the stale timer fire; the generation guard ignores it.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(arena.phase(), Phase::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cycle_without_restorers_reaches_idle() {
        let (arena, _runtime) = spawn_duel(Vec::new());
        arena.join(PlayerId::new("a"), None).unwrap();
        arena.join(PlayerId::new("b"), None).unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(arena.phase(), Phase::Active);

        arena.signal(&GameSignal::Eliminated {
            player: PlayerId::new("b"),
        });
        assert_eq!(arena.phase(), Phase::Ending);

        // Announcement delay, then straight through Restoring to Idle.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(arena.phase(), Phase::Idle);
        assert_eq!(arena.roster_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restoration_timeout_forces_idle_degraded() {
        let (arena, _runtime) = spawn_duel(vec![ModuleId::from("never-reports")]);
        arena.join(PlayerId::new("a"), None).unwrap();
        arena.join(PlayerId::new("b"), None).unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        arena.signal(&GameSignal::Eliminated {
            player: PlayerId::new("b"),
        });
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(arena.phase(), Phase::Restoring);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(arena.phase(), Phase::Idle);
        assert!(arena.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn restoration_report_beats_the_timeout() {
        let restorer = ModuleId::from("world");
        let (arena, _runtime) = spawn_duel(vec![restorer.clone()]);
        arena.join(PlayerId::new("a"), None).unwrap();
        arena.join(PlayerId::new("b"), None).unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        arena.signal(&GameSignal::Eliminated {
            player: PlayerId::new("b"),
        });
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(arena.phase(), Phase::Restoring);

        arena.restoration_complete(&restorer);
        assert_eq!(arena.phase(), Phase::Idle);
        assert!(!arena.is_degraded());

        // The disarmed timeout must not resurrect anything.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(arena.phase(), Phase::Idle);
        assert!(!arena.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_driver() {
        let (arena, runtime) = spawn_duel(Vec::new());
        arena.join(PlayerId::new("a"), None).unwrap();
        arena.force_shutdown();
        runtime.join().await;
        assert_eq!(arena.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn time_limit_ends_a_stalled_match() {
        let (arena, _runtime) = spawn_duel(Vec::new());
        arena.join(PlayerId::new("a"), None).unwrap();
        arena.join(PlayerId::new("b"), None).unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(arena.phase(), Phase::Active);

        // Nothing happens for the whole time limit; the tick fallback draws.
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_ne!(arena.phase(), Phase::Active);
    }
}
