//! Victory evaluation protocol.
//!
//! A victory rule is a pluggable strategy selected per template by
//! identifier. The scheduler polls the rule on every gameplay signal and on
//! a fixed tick interval; the first `Decided`/`Draw` verdict per instance is
//! honored and polling stops once the match is in `Ending`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::schema::ArenaTemplate;
use crate::ids::{PlayerId, TeamId};
use crate::team::TeamModel;

pub mod rules;

pub use rules::{LastTeamStanding, ScoreTarget};

// ---------------------------------------------------------------------------
// Gameplay signals
// ---------------------------------------------------------------------------

/// A gameplay signal delivered by host-specific modules.
///
/// The core does not simulate combat; it only folds these into team stats
/// and hands them to the victory rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameSignal {
    /// One player eliminated another. The killer's team scores a point and
    /// the victim is marked out of the match.
    Kill {
        /// The eliminating player.
        killer: PlayerId,
        /// The eliminated player.
        victim: PlayerId,
    },

    /// A player captured an objective worth `points`.
    Capture {
        /// The capturing player.
        player: PlayerId,
        /// Points awarded to the player's team.
        points: u64,
    },

    /// A player was eliminated without an attacker (fell out of bounds,
    /// disconnect grace expired, host-specific causes).
    Eliminated {
        /// The eliminated player.
        player: PlayerId,
    },
}

// ---------------------------------------------------------------------------
// Verdicts and decisions
// ---------------------------------------------------------------------------

/// The winning side of a decided match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Winner {
    /// A whole team won.
    Team {
        /// The winning team.
        team: TeamId,
    },
    /// A single player won (free-for-all layouts).
    Player {
        /// The winning player.
        player: PlayerId,
    },
}

/// How a decision came about. Time-limit and forfeit outcomes are distinct
/// kinds, never retries of rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// The victory rule reported a decision.
    Rule,
    /// The hard time limit elapsed.
    TimeLimit,
    /// The match could not continue (roster fell below the floor).
    Forfeit,
    /// The instance was forcibly terminated.
    Forced,
}

/// Result of one victory rule invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No outcome yet; keep playing.
    Undecided,
    /// A winner has been determined.
    Decided {
        /// The winning side.
        winner: Winner,
        /// Human-readable reason the rule decided.
        reason: String,
    },
    /// The match ended without a winner.
    Draw {
        /// Human-readable reason for the draw.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Rule contract
// ---------------------------------------------------------------------------

/// Read-only view handed to a victory rule on each poll.
#[derive(Debug)]
pub struct VictoryContext<'a> {
    /// Current team rosters and stats.
    pub teams: &'a TeamModel,
    /// Time since the match entered `Active`.
    pub elapsed: Duration,
    /// The signal that prompted this poll, if any. `None` on tick polls —
    /// a rule that forgets to react to a signal still resolves eventually.
    pub signal: Option<&'a GameSignal>,
}

/// A pluggable victory strategy.
///
/// Implementations must be cheap to call: they are polled on every gameplay
/// signal and once per tick interval.
pub trait VictoryRule: Send + Sync {
    /// Evaluates the current state, returning a verdict.
    fn evaluate(&self, ctx: &VictoryContext<'_>) -> Verdict;

    /// Called exactly once when the hard time limit elapses with the match
    /// still undecided. The default declares a draw; rules with a natural
    /// leader (score-based) can pick one instead.
    fn at_time_limit(&self, ctx: &VictoryContext<'_>) -> Verdict {
        let _ = ctx;
        Verdict::Draw {
            reason: "time limit elapsed".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule registry
// ---------------------------------------------------------------------------

/// Factory producing a rule instance for one arena template.
pub type RuleFactory = Arc<dyn Fn(&ArenaTemplate) -> Arc<dyn VictoryRule> + Send + Sync>;

/// Process-wide registry of victory rules keyed by identifier.
///
/// Templates referencing an identifier not present here are rejected at
/// registration time, never at runtime.
pub struct VictoryRegistry {
    factories: RwLock<HashMap<String, RuleFactory>>,
}

impl VictoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry preloaded with the built-in rules:
    /// `last_team_standing` and `score_target`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("last_team_standing", |_template| {
            Arc::new(LastTeamStanding) as Arc<dyn VictoryRule>
        });
        registry.register("score_target", |template| {
            Arc::new(ScoreTarget::new(template.score_target.unwrap_or(10))) as Arc<dyn VictoryRule>
        });
        registry
    }

    /// Registers a rule factory under `name`, replacing any previous entry.
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn(&ArenaTemplate) -> Arc<dyn VictoryRule> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .expect("victory registry lock poisoned")
            .insert(name.to_string(), Arc::new(factory));
    }

    /// Returns whether a rule with this identifier is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .expect("victory registry lock poisoned")
            .contains_key(name)
    }

    /// Instantiates the rule named by the template's `victory_rule` field.
    ///
    /// Returns `None` if the identifier is unknown; callers validate at
    /// template registration so this is unreachable for registered templates.
    #[must_use]
    pub fn create(&self, template: &ArenaTemplate) -> Option<Arc<dyn VictoryRule>> {
        let factories = self
            .factories
            .read()
            .expect("victory registry lock poisoned");
        factories
            .get(&template.victory_rule)
            .map(|factory| factory(template))
    }

    /// Lists registered rule identifiers, sorted.
    #[must_use]
    pub fn rule_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .expect("victory registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for VictoryRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for VictoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VictoryRegistry")
            .field("rules", &self.rule_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::test_support::template;

    #[test]
    fn builtins_are_registered() {
        let registry = VictoryRegistry::with_builtins();
        assert!(registry.contains("last_team_standing"));
        assert!(registry.contains("score_target"));
        assert!(!registry.contains("capture_the_flag"));
    }

    #[test]
    fn create_unknown_rule_returns_none() {
        let registry = VictoryRegistry::with_builtins();
        let mut t = template("duel", 2, 2, 2);
        t.victory_rule = "capture_the_flag".to_string();
        assert!(registry.create(&t).is_none());
    }

    #[test]
    fn create_known_rule() {
        let registry = VictoryRegistry::with_builtins();
        let t = template("duel", 2, 2, 2);
        assert!(registry.create(&t).is_some());
    }

    #[test]
    fn custom_rule_registration() {
        struct AlwaysDraw;
        impl VictoryRule for AlwaysDraw {
            fn evaluate(&self, _ctx: &VictoryContext<'_>) -> Verdict {
                Verdict::Draw {
                    reason: "always".to_string(),
                }
            }
        }

        let registry = VictoryRegistry::new();
        registry.register("always_draw", |_| Arc::new(AlwaysDraw));
        assert!(registry.contains("always_draw"));
        assert_eq!(registry.rule_names(), vec!["always_draw".to_string()]);
    }

    #[test]
    fn rule_names_sorted() {
        let registry = VictoryRegistry::with_builtins();
        let names = registry.rule_names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
