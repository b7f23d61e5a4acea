//! Built-in victory rules.
//!
//! Two strategies ship with the crate: `last_team_standing` resolves when a
//! single team has living members, `score_target` resolves when a team
//! reaches a configured score. Both are deterministic given the same team
//! state; ties break toward the lowest team id.

use super::{Verdict, VictoryContext, VictoryRule, Winner};

/// Decides for the sole team that still has living members.
///
/// Stays undecided while zero or one team ever had members (nothing to
/// outlast) or while two or more teams are alive. If every populated team
/// was wiped out in the same exchange, declares a draw.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastTeamStanding;

impl VictoryRule for LastTeamStanding {
    fn evaluate(&self, ctx: &VictoryContext<'_>) -> Verdict {
        let populated = ctx.teams.populated_team_count();
        if populated < 2 {
            // A one-sided roster cannot be outlasted.
            return Verdict::Undecided;
        }

        let mut alive = ctx.teams.living_teams();
        match alive.len() {
            0 => Verdict::Draw {
                reason: "all teams eliminated".to_string(),
            },
            1 => {
                let team = alive.remove(0);
                Verdict::Decided {
                    winner: Winner::Team { team },
                    reason: "last team standing".to_string(),
                }
            }
            _ => Verdict::Undecided,
        }
    }
}

/// Decides for the first team to reach a score target.
///
/// At the hard time limit, the leading team wins; an exact score tie is a
/// draw.
#[derive(Debug, Clone, Copy)]
pub struct ScoreTarget {
    target: u64,
}

impl ScoreTarget {
    /// Creates a rule deciding at `target` points.
    #[must_use]
    pub const fn new(target: u64) -> Self {
        Self { target }
    }
}

impl VictoryRule for ScoreTarget {
    fn evaluate(&self, ctx: &VictoryContext<'_>) -> Verdict {
        // Teams are iterated in id order, so a simultaneous reach (only
        // possible through a buggy host feeding duplicate signals) still
        // resolves deterministically toward the lowest id.
        for team in ctx.teams.teams() {
            if team.score >= self.target {
                return Verdict::Decided {
                    winner: Winner::Team { team: team.id },
                    reason: format!("reached {} points", self.target),
                };
            }
        }
        Verdict::Undecided
    }

    fn at_time_limit(&self, ctx: &VictoryContext<'_>) -> Verdict {
        let mut best: Option<(crate::ids::TeamId, u64)> = None;
        let mut tied = false;
        for team in ctx.teams.teams() {
            if team.members().is_empty() {
                continue;
            }
            match best {
                Some((_, score)) if team.score == score => tied = true,
                Some((_, score)) if team.score > score => {
                    best = Some((team.id, team.score));
                    tied = false;
                }
                None => best = Some((team.id, team.score)),
                _ => {}
            }
        }

        match best {
            Some((team, score)) if !tied => Verdict::Decided {
                winner: Winner::Team { team },
                reason: format!("leading with {score} points at time limit"),
            },
            _ => Verdict::Draw {
                reason: "tied at time limit".to_string(),
            },
        }
    }
}
