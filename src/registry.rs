//! Process-wide player membership.
//!
//! A player is in at most one arena at a time, no matter how many arenas
//! the manager runs. The registry is the single authority: arenas bind a
//! membership before touching their roster and release it on any exit path,
//! including forced shutdown.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::JoinError;
use crate::ids::{InstanceId, PlayerId, TeamId};

/// Where a player currently is.
#[derive(Debug, Clone)]
pub struct Membership {
    /// The player.
    pub player: PlayerId,
    /// The arena instance holding them.
    pub arena: InstanceId,
    /// Their team within that arena.
    pub team: TeamId,
    /// When they joined.
    pub joined_at: DateTime<Utc>,
}

/// Concurrent map of every player currently inside an arena.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    memberships: DashMap<PlayerId, Membership>,
}

impl PlayerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a player to an arena and team.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::AlreadyMember`] if the player is bound anywhere,
    /// including the same arena.
    pub fn bind(
        &self,
        player: PlayerId,
        arena: InstanceId,
        team: TeamId,
    ) -> Result<(), JoinError> {
        match self.memberships.entry(player.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => Err(JoinError::AlreadyMember {
                player,
                arena: existing.get().arena,
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Membership {
                    player,
                    arena,
                    team,
                    joined_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// Releases a player's membership. Returns it if one existed.
    pub fn release(&self, player: &PlayerId) -> Option<Membership> {
        self.memberships.remove(player).map(|(_, m)| m)
    }

    /// Releases every membership bound to `arena`. Returns the released
    /// players. Used when an instance tears down without individual leaves.
    pub fn release_instance(&self, arena: InstanceId) -> Vec<Membership> {
        let players: Vec<PlayerId> = self
            .memberships
            .iter()
            .filter(|entry| entry.value().arena == arena)
            .map(|entry| entry.key().clone())
            .collect();

        players
            .into_iter()
            .filter_map(|p| self.memberships.remove(&p).map(|(_, m)| m))
            .collect()
    }

    /// Looks up where a player currently is.
    #[must_use]
    pub fn membership(&self, player: &PlayerId) -> Option<Membership> {
        self.memberships.get(player).map(|m| m.clone())
    }

    /// Number of players currently bound anywhere.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memberships.len()
    }

    /// Whether no player is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memberships.is_empty()
    }

    /// Drops every membership. Used at server shutdown.
    pub fn teardown(&self) {
        self.memberships.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_lookup() {
        let registry = PlayerRegistry::new();
        let arena = InstanceId::new();
        registry
            .bind(PlayerId::new("steve"), arena, TeamId(0))
            .unwrap();

        let m = registry.membership(&PlayerId::new("steve")).unwrap();
        assert_eq!(m.arena, arena);
        assert_eq!(m.team, TeamId(0));
    }

    #[test]
    fn double_bind_is_rejected_with_current_arena() {
        let registry = PlayerRegistry::new();
        let first = InstanceId::new();
        registry
            .bind(PlayerId::new("steve"), first, TeamId(0))
            .unwrap();

        let err = registry
            .bind(PlayerId::new("steve"), InstanceId::new(), TeamId(1))
            .unwrap_err();
        match err {
            JoinError::AlreadyMember { arena, .. } => assert_eq!(arena, first),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn release_frees_the_slot() {
        let registry = PlayerRegistry::new();
        let arena = InstanceId::new();
        registry
            .bind(PlayerId::new("steve"), arena, TeamId(0))
            .unwrap();

        let released = registry.release(&PlayerId::new("steve")).unwrap();
        assert_eq!(released.arena, arena);
        assert!(registry.membership(&PlayerId::new("steve")).is_none());

        // Re-binding after release succeeds.
        registry
            .bind(PlayerId::new("steve"), InstanceId::new(), TeamId(1))
            .unwrap();
    }

    #[test]
    fn release_instance_only_touches_that_arena() {
        let registry = PlayerRegistry::new();
        let doomed = InstanceId::new();
        let other = InstanceId::new();
        registry
            .bind(PlayerId::new("a"), doomed, TeamId(0))
            .unwrap();
        registry
            .bind(PlayerId::new("b"), doomed, TeamId(1))
            .unwrap();
        registry.bind(PlayerId::new("c"), other, TeamId(0)).unwrap();

        let released = registry.release_instance(doomed);
        assert_eq!(released.len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.membership(&PlayerId::new("c")).is_some());
    }

    #[test]
    fn release_unknown_player_is_none() {
        let registry = PlayerRegistry::new();
        assert!(registry.release(&PlayerId::new("ghost")).is_none());
    }
}
