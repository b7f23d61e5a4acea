//! Team definitions and roster assignment for one arena instance.
//!
//! The team model owns which player sits on which team, per-team scores,
//! and per-player alive flags. Invariants: member count never exceeds
//! capacity, and a player appears on at most one team within the model.
//! Cross-arena single membership is the player registry's job, not this
//! module's.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::schema::TeamLayout;
use crate::ids::{PlayerId, TeamId};
use crate::victory::GameSignal;

/// One team: identity, capacity, ordered roster, and gameplay stats.
#[derive(Debug, Clone, Serialize)]
pub struct Team {
    /// Team id; assignment ties break toward the lowest.
    pub id: TeamId,
    /// Display name shown by cosmetic/scoreboard modules.
    pub name: String,
    /// Maximum roster size.
    pub capacity: usize,
    /// Joined players in join order.
    members: Vec<PlayerId>,
    /// Accumulated score from gameplay signals.
    pub score: u64,
    /// Players knocked out of the match but still on the roster.
    eliminated: HashSet<PlayerId>,
}

impl Team {
    fn new(id: TeamId, name: String, capacity: usize) -> Self {
        Self {
            id,
            name,
            capacity,
            members: Vec::new(),
            score: 0,
            eliminated: HashSet::new(),
        }
    }

    /// Players currently on the roster, in join order.
    #[must_use]
    pub fn members(&self) -> &[PlayerId] {
        &self.members
    }

    /// Remaining roster slots.
    #[must_use]
    pub fn free_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.members.len())
    }

    /// Whether the roster is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    /// Whether `player` is on this roster.
    #[must_use]
    pub fn contains(&self, player: &PlayerId) -> bool {
        self.members.contains(player)
    }

    /// Roster members not yet eliminated.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| !self.eliminated.contains(m))
            .count()
    }
}

/// Rosters and stats for every team of one arena instance.
#[derive(Debug, Clone, Serialize)]
pub struct TeamModel {
    teams: Vec<Team>,
}

impl TeamModel {
    /// Builds an empty model from a template's team layout.
    ///
    /// Teams are numbered `0..count`; names come from the layout or default
    /// to `"Team N"`.
    #[must_use]
    pub fn from_layout(layout: &TeamLayout) -> Self {
        let teams = (0..layout.count)
            .map(|i| {
                let name = layout
                    .names
                    .as_ref()
                    .and_then(|names| names.get(usize::from(i)).cloned())
                    .unwrap_or_else(|| format!("Team {}", i + 1));
                Team::new(TeamId(i), name, layout.capacity)
            })
            .collect();
        Self { teams }
    }

    /// All teams in id order.
    #[must_use]
    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    /// Looks up a team by id.
    #[must_use]
    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams.get(usize::from(id.0))
    }

    /// Total players across all teams.
    #[must_use]
    pub fn roster_size(&self) -> usize {
        self.teams.iter().map(|t| t.members.len()).sum()
    }

    /// Total capacity across all teams.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.teams.iter().map(|t| t.capacity).sum()
    }

    /// Whether every team is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.teams.iter().all(Team::is_full)
    }

    /// The team `player` is on, if any.
    #[must_use]
    pub fn team_of(&self, player: &PlayerId) -> Option<TeamId> {
        self.teams
            .iter()
            .find(|t| t.contains(player))
            .map(|t| t.id)
    }

    /// Chooses the team a joining player would land on, without mutating
    /// the model.
    ///
    /// The requested team is honored if it has room; otherwise the player
    /// goes to the team with the most free capacity, ties broken by lowest
    /// team id. Returns `None` when every team is full.
    #[must_use]
    pub fn select_team(&self, requested: Option<TeamId>) -> Option<TeamId> {
        requested
            .and_then(|id| self.teams.get(usize::from(id.0)))
            .filter(|t| !t.is_full())
            .map(|t| t.id)
            .or_else(|| {
                // Most free capacity wins; iteration order makes the lowest
                // id win ties.
                self.teams
                    .iter()
                    .filter(|t| !t.is_full())
                    .max_by_key(|t| (t.free_capacity(), std::cmp::Reverse(t.id)))
                    .map(|t| t.id)
            })
    }

    /// Assigns `player` to a team and returns the chosen id.
    ///
    /// Selection follows [`select_team`](Self::select_team). Returns `None`
    /// when every team is full. The caller must have established that the
    /// player is not already a member anywhere.
    pub fn assign(&mut self, player: PlayerId, requested: Option<TeamId>) -> Option<TeamId> {
        debug_assert!(
            self.team_of(&player).is_none(),
            "player already on a team in this model"
        );

        let target = self.select_team(requested)?;
        let team = &mut self.teams[usize::from(target.0)];
        team.members.push(player);
        Some(target)
    }

    /// Removes `player`, returning the team they were on.
    pub fn remove(&mut self, player: &PlayerId) -> Option<TeamId> {
        for team in &mut self.teams {
            if let Some(pos) = team.members.iter().position(|m| m == player) {
                team.members.remove(pos);
                team.eliminated.remove(player);
                return Some(team.id);
            }
        }
        None
    }

    /// Folds a gameplay signal into scores and alive flags.
    pub fn apply_signal(&mut self, signal: &GameSignal) {
        match signal {
            GameSignal::Kill { killer, victim } => {
                if let Some(team) = self.team_of(killer) {
                    self.teams[usize::from(team.0)].score += 1;
                }
                self.mark_eliminated(victim);
            }
            GameSignal::Capture { player, points } => {
                if let Some(team) = self.team_of(player) {
                    self.teams[usize::from(team.0)].score += points;
                }
            }
            GameSignal::Eliminated { player } => {
                self.mark_eliminated(player);
            }
        }
    }

    fn mark_eliminated(&mut self, player: &PlayerId) {
        for team in &mut self.teams {
            if team.contains(player) {
                team.eliminated.insert(player.clone());
            }
        }
    }

    /// Teams with at least one member, eliminated or not.
    #[must_use]
    pub fn populated_team_count(&self) -> usize {
        self.teams.iter().filter(|t| !t.members.is_empty()).count()
    }

    /// Ids of teams with at least one living member, in id order.
    #[must_use]
    pub fn living_teams(&self) -> Vec<TeamId> {
        self.teams
            .iter()
            .filter(|t| t.alive_count() > 0)
            .map(|t| t.id)
            .collect()
    }

    /// All current members across teams, in team then join order.
    #[must_use]
    pub fn all_members(&self) -> Vec<PlayerId> {
        self.teams
            .iter()
            .flat_map(|t| t.members.iter().cloned())
            .collect()
    }

    /// Resets rosters, scores, and alive flags for instance recycling.
    pub fn reset(&mut self) {
        for team in &mut self.teams {
            team.members.clear();
            team.eliminated.clear();
            team.score = 0;
        }
    }
}
