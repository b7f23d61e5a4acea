//! Single-elimination tournament orchestration.
//!
//! The orchestrator is just another bus module: it subscribes to the
//! decision and termination events of the arenas it schedules, records
//! winners, and asks the arena manager for new instances when a round
//! resolves. Forfeits advance the opponent; draws, double forfeits, and
//! forced terminations advance nobody, and both policies are logged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info, warn};

use crate::error::{HandlerError, TournamentError};
use crate::event::{ArenaEvent, EventHandler, EventKind, EventKindSet, EventPayload};
use crate::ids::{InstanceId, ModuleId, PlayerId, TeamId};
use crate::manager::ArenaManager;
use crate::victory::Winner;

pub mod bracket;

pub use bracket::{pair_round, BracketNode, NodeState};

/// Overall tournament progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TournamentPhase {
    /// Built, not started.
    Created,
    /// Rounds in flight.
    Running,
    /// Champion decided (or nobody left to advance).
    Finished,
}

struct State {
    phase: TournamentPhase,
    round: u32,
    nodes: Vec<BracketNode>,
    byes: HashMap<PlayerId, u32>,
    by_arena: HashMap<InstanceId, usize>,
    champion: Option<PlayerId>,
}

/// Work a resolution defers until the state lock is released.
///
/// Teardown and rescheduling dispatch further events synchronously, so
/// they must never run while the tournament lock is held.
#[derive(Default)]
struct FollowUp {
    teardown: Option<InstanceId>,
    next_round: Option<Vec<PlayerId>>,
}

/// One single-elimination bracket over a pool of participants.
pub struct Tournament {
    module: ModuleId,
    manager: Arc<ArenaManager>,
    template: String,
    state: Mutex<State>,
}

impl Tournament {
    /// Creates a tournament playing its matches on `template` instances.
    /// The template should be a head-to-head layout (two teams).
    #[must_use]
    pub fn new(manager: Arc<ArenaManager>, template: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            module: ModuleId::new(format!("tournament-{}", uuid::Uuid::new_v4())),
            manager,
            template: template.into(),
            state: Mutex::new(State {
                phase: TournamentPhase::Created,
                round: 0,
                nodes: Vec::new(),
                byes: HashMap::new(),
                by_arena: HashMap::new(),
                champion: None,
            }),
        })
    }

    /// The module id this tournament registers on the bus under.
    #[must_use]
    pub fn module_id(&self) -> &ModuleId {
        &self.module
    }

    /// Current round number; zero before the start.
    #[must_use]
    pub fn round(&self) -> u32 {
        self.lock().round
    }

    /// Snapshot of the current round's bracket nodes.
    #[must_use]
    pub fn bracket(&self) -> Vec<BracketNode> {
        self.lock().nodes.clone()
    }

    /// Whether the tournament has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.lock().phase == TournamentPhase::Finished
    }

    /// The champion, once the tournament finishes with one.
    #[must_use]
    pub fn champion(&self) -> Option<PlayerId> {
        self.lock().champion.clone()
    }

    /// Starts the bracket: subscribes to arena outcomes and schedules the
    /// first round.
    ///
    /// # Errors
    ///
    /// [`TournamentError::NotEnoughParticipants`],
    /// [`TournamentError::AlreadyStarted`], or
    /// [`TournamentError::ScheduleFailed`] when the manager cannot provide
    /// the first round's instances.
    pub fn start(self: &Arc<Self>, participants: Vec<PlayerId>) -> Result<(), TournamentError> {
        if participants.len() < 2 {
            return Err(TournamentError::NotEnoughParticipants(participants.len()));
        }
        {
            let mut state = self.lock();
            if state.phase != TournamentPhase::Created {
                return Err(TournamentError::AlreadyStarted);
            }
            state.phase = TournamentPhase::Running;
        }

        self.manager.bus().subscribe(
            self.module.clone(),
            EventKindSet::of(&[
                EventKind::Decided,
                EventKind::Draw,
                EventKind::Forfeit,
                EventKind::ForcedTermination,
            ]),
            Arc::clone(self) as Arc<dyn EventHandler>,
        );

        info!(
            tournament = %self.module,
            participants = participants.len(),
            "tournament started"
        );
        self.schedule_round(1, &participants)
    }

    // -- internals -----------------------------------------------------------

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pairs and schedules one round. Bye nodes resolve immediately; every
    /// real pairing gets a fresh arena instance with the home participant
    /// on team 0 and the away participant on team 1.
    ///
    /// Holding the lock across instance creation is safe: the joins below
    /// publish only membership and phase events, which this module does not
    /// subscribe to.
    fn schedule_round(
        &self,
        round: u32,
        participants: &[PlayerId],
    ) -> Result<(), TournamentError> {
        let mut state = self.lock();
        let mut nodes = pair_round(round, participants, &state.byes);
        state.by_arena.clear();

        for (index, node) in nodes.iter_mut().enumerate() {
            let Some(away) = node.away.clone() else {
                *state.byes.entry(node.home.clone()).or_insert(0) += 1;
                info!(tournament = %self.module, round, player = %node.home, "bye granted");
                continue;
            };

            let arena = self
                .manager
                .create_instance(&self.template)
                .map_err(|e| TournamentError::ScheduleFailed {
                    round,
                    message: e.to_string(),
                })?;
            for (player, team) in [(node.home.clone(), TeamId(0)), (away.clone(), TeamId(1))] {
                arena
                    .join(player, Some(team))
                    .map_err(|e| TournamentError::ScheduleFailed {
                        round,
                        message: e.to_string(),
                    })?;
            }

            node.arena = Some(arena.id());
            node.state = NodeState::AwaitingResult;
            state.by_arena.insert(arena.id(), index);
            info!(
                tournament = %self.module,
                round,
                arena = %arena.id(),
                home = %node.home,
                away = %away,
                "pairing scheduled"
            );
        }

        state.round = round;
        state.nodes = nodes;
        Ok(())
    }

    /// Maps an arena-level winner back to the node's participant.
    fn participant_for(node: &BracketNode, winner: &Winner) -> Option<PlayerId> {
        match winner {
            Winner::Team { team } if *team == TeamId(0) => Some(node.home.clone()),
            Winner::Team { team } if *team == TeamId(1) => node.away.clone(),
            Winner::Team { .. } => None,
            Winner::Player { player } => {
                if *player == node.home || node.away.as_ref() == Some(player) {
                    Some(player.clone())
                } else {
                    None
                }
            }
        }
    }

    /// Records one arena outcome under the lock and returns the follow-up
    /// work to run after it is released. `None` means the event did not
    /// belong to an awaiting node.
    fn resolve(&self, event: &ArenaEvent) -> Option<FollowUp> {
        let mut state = self.lock();
        let index = *state.by_arena.get(&event.arena)?;
        if state.nodes[index].state != NodeState::AwaitingResult {
            return None;
        }

        let advancing = match &event.payload {
            EventPayload::Decided { winner, .. } => {
                Self::participant_for(&state.nodes[index], winner)
            }
            EventPayload::Forfeit {
                winner: Some(winner),
                ..
            } => Self::participant_for(&state.nodes[index], winner),
            EventPayload::Forfeit { winner: None, .. } => {
                warn!(tournament = %self.module, arena = %event.arena, "double forfeit; nobody advances");
                None
            }
            EventPayload::Draw { reason, .. } => {
                warn!(tournament = %self.module, arena = %event.arena, reason, "draw; nobody advances");
                None
            }
            EventPayload::ForcedTermination { .. } => {
                warn!(tournament = %self.module, arena = %event.arena, "match terminated; nobody advances");
                None
            }
            _ => return None,
        };

        let node = &mut state.nodes[index];
        node.state = NodeState::Resolved;
        node.winner = advancing.clone();
        info!(
            tournament = %self.module,
            round = node.round,
            arena = %event.arena,
            winner = advancing.as_ref().map_or("none", |p| p.as_str()),
            "pairing resolved"
        );

        let mut follow_up = FollowUp {
            teardown: Some(event.arena),
            next_round: None,
        };

        if state.nodes.iter().all(|n| n.state == NodeState::Resolved) {
            let mut advancers: Vec<PlayerId> =
                state.nodes.iter().filter_map(|n| n.winner.clone()).collect();
            if advancers.len() >= 2 {
                follow_up.next_round = Some(advancers);
            } else {
                state.phase = TournamentPhase::Finished;
                state.champion = advancers.pop();
            }
        }

        Some(follow_up)
    }
}

impl EventHandler for Tournament {
    fn handle(&self, event: &ArenaEvent) -> Result<(), HandlerError> {
        let Some(follow_up) = self.resolve(event) else {
            return Ok(());
        };

        // The resolved arena is done; tearing it down frees its players for
        // the next round immediately instead of after the restoration cycle.
        if let Some(arena) = follow_up.teardown {
            self.manager.teardown_instance(arena);
        }

        if let Some(advancers) = follow_up.next_round {
            let round = self.round() + 1;
            if let Err(e) = self.schedule_round(round, &advancers) {
                error!(tournament = %self.module, error = %e, "failed to schedule next round");
                self.lock().phase = TournamentPhase::Finished;
            }
        }

        if self.is_finished() {
            match self.champion() {
                Some(champion) => {
                    info!(tournament = %self.module, %champion, "tournament finished");
                }
                None => warn!(tournament = %self.module, "tournament finished without a champion"),
            }
            self.manager.bus().unsubscribe(&self.module);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Tournament {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Tournament")
            .field("module", &self.module)
            .field("phase", &state.phase)
            .field("round", &state.round)
            .field("nodes", &state.nodes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::arena::Arena;
    use crate::config::schema::test_support::template;
    use crate::event::EventBus;
    use crate::victory::{GameSignal, Verdict, VictoryContext, VictoryRegistry, VictoryRule};

    fn manager() -> Arc<ArenaManager> {
        let m = Arc::new(ArenaManager::new(
            Arc::new(EventBus::new()),
            Arc::new(VictoryRegistry::with_builtins()),
        ));
        m.register_template(template("duel", 2, 1, 2)).unwrap();
        m
    }

    fn players(names: &[&str]) -> Vec<PlayerId> {
        names.iter().map(|n| PlayerId::new(*n)).collect()
    }

    fn node_arena(t: &Tournament, home: &str) -> Arc<Arena> {
        let node = t
            .bracket()
            .into_iter()
            .find(|n| n.home.as_str() == home)
            .expect("no node with that home participant");
        t.manager.instance(node.arena.expect("node not scheduled")).unwrap()
    }

    /// Lets the paused clock run past the countdown so matches go active.
    async fn run_countdowns() {
        tokio::time::sleep(Duration::from_secs(11)).await;
    }

    #[test]
    fn too_few_participants_is_rejected() {
        let t = Tournament::new(manager(), "duel");
        assert!(matches!(
            t.start(players(&["only"])),
            Err(TournamentError::NotEnoughParticipants(1))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_is_rejected() {
        let t = Tournament::new(manager(), "duel");
        t.start(players(&["a", "b"])).unwrap();
        assert!(matches!(
            t.start(players(&["c", "d"])),
            Err(TournamentError::AlreadyStarted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_template_fails_scheduling() {
        let t = Tournament::new(manager(), "ghost");
        assert!(matches!(
            t.start(players(&["a", "b"])),
            Err(TournamentError::ScheduleFailed { round: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn four_players_advance_through_two_rounds() {
        // Round 1: (a vs b), (c vs d). "a" wins by decision, "d" forfeits,
        // so round 2 must deterministically pair (a vs c).
        let m = manager();
        let t = Tournament::new(Arc::clone(&m), "duel");
        t.start(players(&["a", "b", "c", "d"])).unwrap();
        assert_eq!(t.round(), 1);
        assert_eq!(t.bracket().len(), 2);
        run_countdowns().await;

        node_arena(&t, "a").signal(&GameSignal::Eliminated {
            player: PlayerId::new("b"),
        });
        assert_eq!(t.round(), 1);

        node_arena(&t, "c").leave(&PlayerId::new("d"));

        assert_eq!(t.round(), 2);
        let bracket = t.bracket();
        assert_eq!(bracket.len(), 1);
        assert_eq!(bracket[0].home.as_str(), "a");
        assert_eq!(bracket[0].away.as_ref().unwrap().as_str(), "c");

        // Final: "a" takes the championship.
        run_countdowns().await;
        node_arena(&t, "a").signal(&GameSignal::Eliminated {
            player: PlayerId::new("c"),
        });
        assert!(t.is_finished());
        assert_eq!(t.champion().unwrap().as_str(), "a");

        // Resolved arenas are torn down along the way.
        assert!(m.list_instances().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn three_players_rotate_the_bye() {
        let m = manager();
        let t = Tournament::new(Arc::clone(&m), "duel");
        t.start(players(&["a", "b", "c"])).unwrap();

        // Round 1: (a vs b) with "c" on a bye.
        let bracket = t.bracket();
        assert_eq!(bracket.len(), 2);
        assert!(bracket[1].is_bye());
        assert_eq!(bracket[1].home.as_str(), "c");

        run_countdowns().await;
        node_arena(&t, "a").signal(&GameSignal::Eliminated {
            player: PlayerId::new("b"),
        });

        // Round 2: "c" already had a bye, so it is paired first.
        assert_eq!(t.round(), 2);
        let bracket = t.bracket();
        assert_eq!(bracket.len(), 1);
        assert_eq!(bracket[0].home.as_str(), "c");
        assert_eq!(bracket[0].away.as_ref().unwrap().as_str(), "a");
    }

    #[tokio::test(start_paused = true)]
    async fn draw_advances_nobody() {
        // A rule that declares a draw on the first signal it sees.
        struct StalemateRule;
        impl VictoryRule for StalemateRule {
            fn evaluate(&self, ctx: &VictoryContext<'_>) -> Verdict {
                match ctx.signal {
                    Some(_) => Verdict::Draw {
                        reason: "stalemate".to_string(),
                    },
                    None => Verdict::Undecided,
                }
            }
        }

        let rules = VictoryRegistry::with_builtins();
        rules.register("stalemate", |_| Arc::new(StalemateRule));
        let m = Arc::new(ArenaManager::new(Arc::new(EventBus::new()), Arc::new(rules)));
        let mut duel = template("duel", 2, 1, 2);
        duel.victory_rule = "stalemate".to_string();
        m.register_template(duel).unwrap();

        let t = Tournament::new(Arc::clone(&m), "duel");
        t.start(players(&["a", "b"])).unwrap();
        run_countdowns().await;

        node_arena(&t, "a").signal(&GameSignal::Eliminated {
            player: PlayerId::new("b"),
        });

        assert!(t.is_finished());
        assert!(t.champion().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn forced_termination_of_a_match_advances_nobody() {
        let m = manager();
        let t = Tournament::new(Arc::clone(&m), "duel");
        t.start(players(&["a", "b"])).unwrap();
        run_countdowns().await;

        let arena = node_arena(&t, "a");
        m.teardown_instance(arena.id());

        assert!(t.is_finished());
        assert!(t.champion().is_none());
    }
}
