//! The arena aggregate: one playing space, one team model, one lifecycle.
//!
//! `Arena` wires the pure [`MatchState`] machine to the process-wide pieces:
//! the player registry (single membership), the event bus (module dispatch),
//! and the timer runtime. The mutation pattern is lock, mutate, collect
//! effects, unlock, then dispatch — handlers may re-enter the manager (the
//! tournament orchestrator does) without deadlocking on the state lock.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::schema::ArenaTemplate;
use crate::error::{JoinError, PhaseError};
use crate::event::{ArenaEvent, EventBus, EventPayload};
use crate::ids::{InstanceId, ModuleId, PlayerId, TeamId};
use crate::registry::PlayerRegistry;
use crate::victory::{GameSignal, VictoryRule, Winner};

pub mod lifecycle;
pub mod runtime;

pub use lifecycle::{Decision, Effects, MatchState, Phase, TimerKind, TimerRequest};
pub use runtime::ArenaRuntime;

/// One running (or idle) arena instance.
pub struct Arena {
    state: Mutex<MatchState>,
    template: Arc<ArenaTemplate>,
    bus: Arc<EventBus>,
    registry: Arc<PlayerRegistry>,
    restorers: Arc<RwLock<Vec<ModuleId>>>,
    timers: Mutex<Option<mpsc::UnboundedSender<TimerRequest>>>,
    cancel: CancellationToken,
    id: InstanceId,
}

impl Arena {
    /// Creates an idle instance. The caller (normally the manager) attaches
    /// an [`ArenaRuntime`] afterwards to drive the timers.
    #[must_use]
    pub fn new(
        id: InstanceId,
        template: Arc<ArenaTemplate>,
        rule: Arc<dyn VictoryRule>,
        bus: Arc<EventBus>,
        registry: Arc<PlayerRegistry>,
        restorers: Arc<RwLock<Vec<ModuleId>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MatchState::new(id, Arc::clone(&template), rule)),
            template,
            bus,
            registry,
            restorers,
            timers: Mutex::new(None),
            cancel: CancellationToken::new(),
            id,
        })
    }

    /// The instance id.
    #[must_use]
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// The template this instance runs.
    #[must_use]
    pub fn template(&self) -> &ArenaTemplate {
        &self.template
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.lock().phase()
    }

    /// Current roster size.
    #[must_use]
    pub fn roster_size(&self) -> usize {
        self.lock().teams().roster_size()
    }

    /// Whether the last restoration cycle timed out.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.lock().is_degraded()
    }

    /// Token cancelled when the instance is torn down.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Admits a player, binding the process-wide registry and assigning a
    /// team.
    ///
    /// # Errors
    ///
    /// [`JoinError::AlreadyMember`] when the registry holds a membership
    /// anywhere in the process; [`JoinError::ArenaFull`] and
    /// [`JoinError::InvalidPhase`] per the lifecycle rules.
    pub fn join(
        &self,
        player: PlayerId,
        requested: Option<TeamId>,
    ) -> Result<TeamId, JoinError> {
        let (team, effects) = {
            let mut state = self.lock();
            let team = state.join_target(requested)?;
            // Bind before the roster mutation: a registry rejection leaves
            // the machine untouched.
            self.registry.bind(player.clone(), self.id, team)?;
            (team, state.commit_join(player, team))
        };
        crate::observability::metrics::record_join(&self.template.name);
        self.apply(effects);
        Ok(team)
    }

    /// Removes a player. Returns whether they were a member here.
    pub fn leave(&self, player: &PlayerId) -> bool {
        let effects = {
            let mut state = self.lock();
            state.leave(player)
        };
        match effects {
            Some(effects) => {
                self.apply(effects);
                true
            }
            None => false,
        }
    }

    /// Feeds a gameplay signal from a host module into the match.
    pub fn signal(&self, signal: &GameSignal) {
        let effects = self.lock().signal(signal);
        self.apply(effects);
    }

    /// Records an externally imposed decision (administrative surface).
    ///
    /// # Errors
    ///
    /// Propagates [`PhaseError`] from the state machine.
    pub fn decide(&self, winner: Option<Winner>, reason: String) -> Result<(), PhaseError> {
        let effects = self.lock().decide(winner, reason)?;
        self.apply(effects);
        Ok(())
    }

    /// A restoration module reporting completion for this instance.
    pub fn restoration_complete(&self, module: &ModuleId) {
        let effects = self.lock().restoration_complete(module);
        self.apply(effects);
    }

    /// Tears the instance down from any phase, synthesizing the transitions
    /// it preempts and cancelling all outstanding timers.
    pub fn force_shutdown(&self) {
        self.cancel.cancel();
        let effects = self.lock().force_shutdown();
        if !effects.is_empty() {
            info!(arena = %self.id, "forced shutdown");
        }
        self.apply(effects);
    }

    // -- runtime re-entry points --------------------------------------------

    pub(crate) fn attach_timers(&self, sender: mpsc::UnboundedSender<TimerRequest>) {
        *self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sender);
    }

    pub(crate) fn on_timer(&self, kind: TimerKind, generation: u64) {
        let effects = {
            let mut state = self.lock();
            match kind {
                TimerKind::Countdown => state.countdown_elapsed(generation),
                TimerKind::EndingDelay => {
                    let restorers = self
                        .restorers
                        .read()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clone();
                    state.ending_elapsed(generation, &restorers)
                }
                TimerKind::RestoreTimeout => state.restoration_timed_out(generation),
            }
        };
        self.apply(effects);
    }

    pub(crate) fn tick(&self) {
        let effects = self.lock().tick();
        self.apply(effects);
    }

    // -- internals -----------------------------------------------------------

    fn lock(&self) -> std::sync::MutexGuard<'_, MatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes events and arms timers after the state lock is released.
    ///
    /// Every `PlayerLeft` releases the registry binding here, so eviction
    /// paths (ending cleanup, forced shutdown) free memberships without the
    /// lifecycle knowing the registry exists.
    fn apply(&self, effects: Effects) {
        if effects.is_empty() {
            return;
        }

        if !effects.timers.is_empty() {
            let timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(sender) = timers.as_ref() {
                for request in &effects.timers {
                    // A closed channel means the runtime is gone; the
                    // generation guard makes the lost timer harmless.
                    let _ = sender.send(*request);
                }
            } else {
                debug!(arena = %self.id, "no timer runtime attached");
            }
        }

        for payload in effects.events {
            if let EventPayload::PlayerLeft { player, .. } = &payload {
                self.registry.release(player);
            }
            self.bus.dispatch(&ArenaEvent::now(self.id, payload));
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("template", &self.template.name)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
