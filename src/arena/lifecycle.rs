//! The arena lifecycle state machine.
//!
//! `MatchState` is a pure, synchronous machine: every operation mutates the
//! state and returns an [`Effects`] value describing the events to publish
//! and the timers to arm. Nothing here touches the runtime, the bus, or the
//! player registry, so the whole transition table is unit-testable without
//! spawning a task.
//!
//! Timer staleness is handled with per-kind generation counters. Arming a
//! timer captures the current generation; a timer that fires with an old
//! generation is ignored. This is what makes the `Starting -> Waiting`
//! reversal discard elapsed countdown instead of pausing it, and what keeps
//! a torn-down instance from being revived by a late callback.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::schema::ArenaTemplate;
use crate::error::{JoinError, PhaseError};
use crate::event::EventPayload;
use crate::ids::{InstanceId, ModuleId, PlayerId, TeamId};
use crate::team::TeamModel;
use crate::victory::{DecisionKind, GameSignal, Verdict, VictoryContext, VictoryRule, Winner};

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// A named stage in an arena instance's lifecycle.
///
/// Transitions are strictly forward except the defined
/// `Starting -> Waiting` reversal and the forced path back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No players, not scheduled. The resting state between matches.
    Idle,
    /// Accepting players, below the start minimum.
    Waiting,
    /// Minimum reached, countdown running.
    Starting,
    /// Competition running, victory evaluation polling.
    Active,
    /// Winner determined; announcement window before cleanup.
    Ending,
    /// Restoration modules cleaning up the playing space.
    Restoring,
}

impl Phase {
    /// Whether a join is accepted in this phase.
    ///
    /// `Ending` and `Restoring` reject joins; everything else admits them,
    /// including late joins into an active match.
    #[must_use]
    pub const fn accepts_joins(self) -> bool {
        matches!(self, Self::Idle | Self::Waiting | Self::Starting | Self::Active)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Ending => "ending",
            Self::Restoring => "restoring",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// What kind of deferred callback a timer request arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Countdown from `Starting` to `Active`.
    Countdown,
    /// Announcement delay from `Ending` to `Restoring`.
    EndingDelay,
    /// Restoration deadline while `Restoring`.
    RestoreTimeout,
}

/// A request to arm one timer. The generation must be handed back on fire;
/// a mismatch means the timer went stale and must no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    /// Which callback to schedule.
    pub kind: TimerKind,
    /// Generation captured when the timer was armed.
    pub generation: u64,
    /// How long to wait before firing.
    pub after: Duration,
}

/// The outward-visible consequences of one state machine operation.
#[derive(Debug, Default)]
pub struct Effects {
    /// Events to publish, in order.
    pub events: Vec<EventPayload>,
    /// Timers to arm.
    pub timers: Vec<TimerRequest>,
}

impl Effects {
    /// No events, no timers.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether the operation had no outward effect.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.timers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// The terminal outcome recorded for one match. At most one per instance.
#[derive(Debug, Clone)]
pub struct Decision {
    /// How the outcome came about.
    pub kind: DecisionKind,
    /// The winning side, absent on draws and double forfeits.
    pub winner: Option<Winner>,
    /// Human-readable reason.
    pub reason: String,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle state of one arena instance.
pub struct MatchState {
    id: InstanceId,
    template: Arc<ArenaTemplate>,
    rule: Arc<dyn VictoryRule>,
    phase: Phase,
    teams: TeamModel,
    decision: Option<Decision>,
    started_at: Option<Instant>,
    pending_restorers: Vec<ModuleId>,
    degraded: bool,
    countdown_gen: u64,
    ending_gen: u64,
    restore_gen: u64,
}

impl MatchState {
    /// Creates an idle machine for one instance of `template`.
    #[must_use]
    pub fn new(id: InstanceId, template: Arc<ArenaTemplate>, rule: Arc<dyn VictoryRule>) -> Self {
        let teams = TeamModel::from_layout(&template.teams);
        Self {
            id,
            template,
            rule,
            phase: Phase::Idle,
            teams,
            decision: None,
            started_at: None,
            pending_restorers: Vec::new(),
            degraded: false,
            countdown_gen: 0,
            ending_gen: 0,
            restore_gen: 0,
        }
    }

    /// The owning instance id.
    #[must_use]
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The template this instance runs.
    #[must_use]
    pub fn template(&self) -> &ArenaTemplate {
        &self.template
    }

    /// Current team rosters and stats.
    #[must_use]
    pub const fn teams(&self) -> &TeamModel {
        &self.teams
    }

    /// The recorded outcome, once one exists.
    #[must_use]
    pub const fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    /// Whether the last restoration timed out. Cleared when the next match
    /// cycle begins.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Restorer modules that have not yet reported completion.
    #[must_use]
    pub fn pending_restorers(&self) -> &[ModuleId] {
        &self.pending_restorers
    }

    /// Time since the match went active. Zero outside a match.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.map_or(Duration::ZERO, |s| s.elapsed())
    }

    // -- joins --------------------------------------------------------------

    /// Pre-checks a join and picks the team the player would land on,
    /// without mutating anything.
    ///
    /// Split from [`commit_join`](Self::commit_join) so the caller can bind
    /// the process-wide player registry between the check and the roster
    /// mutation, and roll back nothing on a registry rejection.
    ///
    /// # Errors
    ///
    /// [`JoinError::InvalidPhase`] in `Ending`/`Restoring`;
    /// [`JoinError::ArenaFull`] when every team is at capacity.
    pub fn join_target(&self, requested: Option<TeamId>) -> Result<TeamId, JoinError> {
        if !self.phase.accepts_joins() {
            return Err(JoinError::InvalidPhase {
                arena: self.id,
                phase: self.phase,
            });
        }
        self.teams
            .select_team(requested)
            .ok_or(JoinError::ArenaFull(self.id))
    }

    /// Completes a join onto the team chosen by
    /// [`join_target`](Self::join_target).
    ///
    /// Emits `PlayerJoined` and drives `Idle -> Waiting` on the first join
    /// and `Waiting -> Starting` when the roster reaches the minimum.
    pub fn commit_join(&mut self, player: PlayerId, team: TeamId) -> Effects {
        let mut effects = Effects::none();

        if self.phase == Phase::Idle {
            // A new cycle begins; the previous degraded flag is spent.
            self.degraded = false;
            self.transition(&mut effects, Phase::Waiting, false);
        }

        let assigned = self.teams.assign(player.clone(), Some(team));
        debug_assert_eq!(assigned, Some(team), "join target no longer has room");
        effects.events.push(EventPayload::PlayerJoined { player, team });

        if self.phase == Phase::Waiting && self.teams.roster_size() >= self.template.min_players {
            self.transition(&mut effects, Phase::Starting, false);
            self.countdown_gen += 1;
            effects.timers.push(TimerRequest {
                kind: TimerKind::Countdown,
                generation: self.countdown_gen,
                after: self.template.countdown,
            });
        }

        effects
    }

    // -- leaves -------------------------------------------------------------

    /// Removes a player from the roster.
    ///
    /// Returns `None` if the player was not a member. Drives the
    /// `Starting -> Waiting` reversal (discarding the countdown entirely)
    /// and the forfeit path when an active match falls below its minimum.
    pub fn leave(&mut self, player: &PlayerId) -> Option<Effects> {
        let team = self.teams.remove(player)?;
        let mut effects = Effects::none();
        effects.events.push(EventPayload::PlayerLeft {
            player: player.clone(),
            team,
        });

        let below_minimum = self.teams.roster_size() < self.template.min_players;
        match self.phase {
            Phase::Starting if below_minimum => {
                // Invalidate the countdown; a later restart begins from the
                // full duration.
                self.countdown_gen += 1;
                self.transition(&mut effects, Phase::Waiting, false);
            }
            Phase::Active if below_minimum => {
                let winner = self.sole_populated_team().map(|team| Winner::Team { team });
                let decision = Decision {
                    kind: DecisionKind::Forfeit,
                    winner,
                    reason: format!(
                        "roster fell below the minimum of {}",
                        self.template.min_players
                    ),
                };
                self.enter_ending(&mut effects, decision);
            }
            _ => {}
        }

        Some(effects)
    }

    // -- victory polling ----------------------------------------------------

    /// Folds a gameplay signal into team stats and polls the victory rule.
    /// Ignored outside `Active`.
    pub fn signal(&mut self, signal: &GameSignal) -> Effects {
        if self.phase != Phase::Active {
            return Effects::none();
        }
        self.teams.apply_signal(signal);
        self.poll(Some(signal))
    }

    /// Fallback poll on the fixed tick interval. Checks the hard time limit
    /// first, then the rule. Ignored outside `Active`.
    pub fn tick(&mut self) -> Effects {
        if self.phase != Phase::Active {
            return Effects::none();
        }

        if let Some(limit) = self.template.time_limit {
            if self.elapsed() >= limit {
                let ctx = VictoryContext {
                    teams: &self.teams,
                    elapsed: self.elapsed(),
                    signal: None,
                };
                let decision = match self.rule.at_time_limit(&ctx) {
                    Verdict::Decided { winner, reason } => Decision {
                        kind: DecisionKind::TimeLimit,
                        winner: Some(winner),
                        reason,
                    },
                    Verdict::Draw { reason } => Decision {
                        kind: DecisionKind::TimeLimit,
                        winner: None,
                        reason,
                    },
                    Verdict::Undecided => Decision {
                        kind: DecisionKind::TimeLimit,
                        winner: None,
                        reason: "time limit elapsed".to_string(),
                    },
                };
                let mut effects = Effects::none();
                self.enter_ending(&mut effects, decision);
                return effects;
            }
        }

        self.poll(None)
    }

    /// Records an externally imposed decision (administrative surface).
    ///
    /// # Errors
    ///
    /// [`PhaseError::AlreadyDecided`] if an outcome is already recorded;
    /// [`PhaseError::IllegalTransition`] outside `Active`.
    pub fn decide(&mut self, winner: Option<Winner>, reason: String) -> Result<Effects, PhaseError> {
        if self.decision.is_some() {
            return Err(PhaseError::AlreadyDecided(self.id));
        }
        if self.phase != Phase::Active {
            return Err(PhaseError::IllegalTransition {
                from: self.phase,
                to: Phase::Ending,
            });
        }
        let mut effects = Effects::none();
        self.enter_ending(
            &mut effects,
            Decision {
                kind: DecisionKind::Forced,
                winner,
                reason,
            },
        );
        Ok(effects)
    }

    // -- timer re-entry points ----------------------------------------------

    /// Countdown timer fired. Stale generations and non-`Starting` phases
    /// no-op.
    pub fn countdown_elapsed(&mut self, generation: u64) -> Effects {
        if self.phase != Phase::Starting || generation != self.countdown_gen {
            return Effects::none();
        }
        debug_assert!(self.teams.roster_size() >= self.template.min_players);

        let mut effects = Effects::none();
        self.started_at = Some(Instant::now());
        self.transition(&mut effects, Phase::Active, false);
        effects
    }

    /// Announcement delay elapsed; move to `Restoring`.
    ///
    /// Remaining players are evicted here: the playing space is about to be
    /// torn up. `restorers` is the manager's snapshot of registered
    /// restoration modules; an empty set short-circuits straight to `Idle`.
    pub fn ending_elapsed(&mut self, generation: u64, restorers: &[ModuleId]) -> Effects {
        if self.phase != Phase::Ending || generation != self.ending_gen {
            return Effects::none();
        }

        let mut effects = Effects::none();
        self.transition(&mut effects, Phase::Restoring, false);
        self.evict_all(&mut effects);

        if restorers.is_empty() {
            self.transition(&mut effects, Phase::Idle, false);
            self.recycle();
        } else {
            self.pending_restorers = restorers.to_vec();
            self.restore_gen += 1;
            effects.timers.push(TimerRequest {
                kind: TimerKind::RestoreTimeout,
                generation: self.restore_gen,
                after: self.template.restore_timeout,
            });
        }

        effects
    }

    /// A restoration module reported completion. When the pending set
    /// drains, the instance returns to `Idle` and the timeout is disarmed.
    pub fn restoration_complete(&mut self, module: &ModuleId) -> Effects {
        if self.phase != Phase::Restoring {
            return Effects::none();
        }
        let before = self.pending_restorers.len();
        self.pending_restorers.retain(|m| m != module);
        if self.pending_restorers.len() == before || !self.pending_restorers.is_empty() {
            return Effects::none();
        }

        self.restore_gen += 1;
        let mut effects = Effects::none();
        self.transition(&mut effects, Phase::Idle, false);
        self.recycle();
        effects
    }

    /// Restoration deadline fired with modules still pending. Degraded but
    /// never fatal: the instance is forced idle and the outstanding modules
    /// are named in a warning event. Emitted exactly once per cycle; stale
    /// generations no-op.
    pub fn restoration_timed_out(&mut self, generation: u64) -> Effects {
        if self.phase != Phase::Restoring || generation != self.restore_gen {
            return Effects::none();
        }

        let mut effects = Effects::none();
        effects.events.push(EventPayload::RestorationTimedOut {
            pending: std::mem::take(&mut self.pending_restorers),
        });
        self.transition(&mut effects, Phase::Idle, false);
        self.recycle();
        self.degraded = true;
        effects
    }

    // -- forced shutdown -----------------------------------------------------

    /// Tears the instance down from any phase.
    ///
    /// The intermediate transitions the shutdown preempts are synthesized
    /// with the `forced` flag so modules that depend on seeing `Ending`
    /// before `Restoring` stay correct. Event order: the phase chain, then
    /// one `PlayerLeft` per evicted member, then a single
    /// `ForcedTermination`. A no-op from `Idle`.
    pub fn force_shutdown(&mut self) -> Effects {
        if self.phase == Phase::Idle {
            return Effects::none();
        }

        // Disarm every outstanding timer.
        self.countdown_gen += 1;
        self.ending_gen += 1;
        self.restore_gen += 1;

        let origin = self.phase;
        let mut effects = Effects::none();
        match origin {
            Phase::Waiting | Phase::Starting => {
                self.transition(&mut effects, Phase::Idle, true);
            }
            Phase::Active => {
                self.transition(&mut effects, Phase::Ending, true);
                self.transition(&mut effects, Phase::Restoring, true);
                self.transition(&mut effects, Phase::Idle, true);
            }
            Phase::Ending => {
                self.transition(&mut effects, Phase::Restoring, true);
                self.transition(&mut effects, Phase::Idle, true);
            }
            Phase::Restoring => {
                self.transition(&mut effects, Phase::Idle, true);
            }
            Phase::Idle => unreachable!("handled above"),
        }

        self.evict_all(&mut effects);
        effects
            .events
            .push(EventPayload::ForcedTermination { phase: origin });
        self.recycle();
        effects
    }

    // -- internals -----------------------------------------------------------

    fn transition(&mut self, effects: &mut Effects, to: Phase, forced: bool) {
        let from = self.phase;
        debug_assert_ne!(from, to, "self-transition");
        self.phase = to;
        effects.events.push(EventPayload::PhaseChanged { from, to, forced });
        crate::observability::metrics::record_transition(from, to, forced);
    }

    fn poll(&mut self, signal: Option<&GameSignal>) -> Effects {
        let ctx = VictoryContext {
            teams: &self.teams,
            elapsed: self.elapsed(),
            signal,
        };
        let decision = match self.rule.evaluate(&ctx) {
            Verdict::Undecided => return Effects::none(),
            Verdict::Decided { winner, reason } => Decision {
                kind: DecisionKind::Rule,
                winner: Some(winner),
                reason,
            },
            Verdict::Draw { reason } => Decision {
                kind: DecisionKind::Rule,
                winner: None,
                reason,
            },
        };

        let mut effects = Effects::none();
        self.enter_ending(&mut effects, decision);
        effects
    }

    fn enter_ending(&mut self, effects: &mut Effects, decision: Decision) {
        debug_assert_eq!(self.phase, Phase::Active);
        debug_assert!(self.decision.is_none(), "second decision for one instance");

        self.transition(effects, Phase::Ending, false);
        effects.events.push(match (&decision.kind, &decision.winner) {
            (DecisionKind::Forfeit, winner) => EventPayload::Forfeit {
                winner: winner.clone(),
                reason: decision.reason.clone(),
            },
            (kind, Some(winner)) => EventPayload::Decided {
                winner: winner.clone(),
                kind: *kind,
                reason: decision.reason.clone(),
            },
            (kind, None) => EventPayload::Draw {
                kind: *kind,
                reason: decision.reason.clone(),
            },
        });
        self.decision = Some(decision);

        self.ending_gen += 1;
        effects.timers.push(TimerRequest {
            kind: TimerKind::EndingDelay,
            generation: self.ending_gen,
            after: self.template.announce_delay,
        });
    }

    fn evict_all(&mut self, effects: &mut Effects) {
        for player in self.teams.all_members() {
            if let Some(team) = self.teams.remove(&player) {
                effects.events.push(EventPayload::PlayerLeft { player, team });
            }
        }
    }

    /// Resets per-match state so the instance can run again from `Idle`.
    /// The degraded flag is managed by the caller: timeout sets it, the next
    /// cycle clears it.
    fn recycle(&mut self) {
        self.teams.reset();
        self.decision = None;
        self.started_at = None;
        self.pending_restorers.clear();
    }

    fn sole_populated_team(&self) -> Option<TeamId> {
        let mut populated = self
            .teams
            .teams()
            .iter()
            .filter(|t| !t.members().is_empty())
            .map(|t| t.id);
        let first = populated.next()?;
        populated.next().is_none().then_some(first)
    }
}

impl std::fmt::Debug for MatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchState")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("roster", &self.teams.roster_size())
            .field("decision", &self.decision)
            .finish_non_exhaustive()
    }
}
