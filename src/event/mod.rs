//! Lifecycle events and the module event bus.
//!
//! Every arena transition publishes exactly one immutable event. Behavior
//! modules (restoration, scoreboards, cosmetics, economy, tournaments)
//! subscribe by event kind, not by type hierarchy.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::arena::lifecycle::Phase;
use crate::ids::{InstanceId, ModuleId, PlayerId, TeamId};
use crate::victory::{DecisionKind, Winner};

pub mod bus;

pub use bus::{EventBus, EventHandler};

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// Discriminant of a lifecycle event, used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A player joined an arena.
    PlayerJoined,
    /// A player left or was evicted.
    PlayerLeft,
    /// The arena moved between phases.
    PhaseChanged,
    /// A victory rule decided the match.
    Decided,
    /// The match ended without a winner.
    Draw,
    /// The match could not continue and forfeited.
    Forfeit,
    /// Restoration did not finish before its timeout.
    RestorationTimedOut,
    /// The instance was forcibly terminated.
    ForcedTermination,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::PlayerJoined,
        Self::PlayerLeft,
        Self::PhaseChanged,
        Self::Decided,
        Self::Draw,
        Self::Forfeit,
        Self::RestorationTimedOut,
        Self::ForcedTermination,
    ];
}

/// A set of event kinds a module subscribes to.
#[derive(Debug, Clone)]
pub struct EventKindSet(Vec<EventKind>);

impl EventKindSet {
    /// Subscribes to every kind.
    #[must_use]
    pub fn all() -> Self {
        Self(EventKind::ALL.to_vec())
    }

    /// Subscribes to the listed kinds.
    #[must_use]
    pub fn of(kinds: &[EventKind]) -> Self {
        Self(kinds.to_vec())
    }

    /// Whether `kind` is in the set.
    #[must_use]
    pub fn contains(&self, kind: EventKind) -> bool {
        self.0.contains(&kind)
    }
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// Payload of one lifecycle event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A player joined and was assigned a team.
    PlayerJoined {
        /// The joining player.
        player: PlayerId,
        /// The assigned team.
        team: TeamId,
    },

    /// A player left, was evicted, or the arena tore down around them.
    PlayerLeft {
        /// The departing player.
        player: PlayerId,
        /// The team they were on.
        team: TeamId,
    },

    /// The arena moved from one phase to another.
    PhaseChanged {
        /// Phase before the transition.
        from: Phase,
        /// Phase after the transition.
        to: Phase,
        /// Whether the transition was synthesized by forced shutdown.
        forced: bool,
    },

    /// A winner was determined.
    Decided {
        /// The winning side.
        winner: Winner,
        /// How the decision came about.
        kind: DecisionKind,
        /// Human-readable reason.
        reason: String,
    },

    /// The match ended with no winner.
    Draw {
        /// How the draw came about.
        kind: DecisionKind,
        /// Human-readable reason.
        reason: String,
    },

    /// The match forfeited; the opposing side (if any) advances.
    Forfeit {
        /// The side that wins by forfeit, if one remains.
        winner: Option<Winner>,
        /// Human-readable reason.
        reason: String,
    },

    /// Restoration modules did not all complete before the timeout.
    /// Degraded, never fatal.
    RestorationTimedOut {
        /// Modules that never reported completion.
        pending: Vec<ModuleId>,
    },

    /// The instance was shut down outside normal completion.
    ForcedTermination {
        /// Phase the instance was in when shutdown began.
        phase: Phase,
    },
}

impl EventPayload {
    /// The kind discriminant of this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::PlayerJoined { .. } => EventKind::PlayerJoined,
            Self::PlayerLeft { .. } => EventKind::PlayerLeft,
            Self::PhaseChanged { .. } => EventKind::PhaseChanged,
            Self::Decided { .. } => EventKind::Decided,
            Self::Draw { .. } => EventKind::Draw,
            Self::Forfeit { .. } => EventKind::Forfeit,
            Self::RestorationTimedOut { .. } => EventKind::RestorationTimedOut,
            Self::ForcedTermination { .. } => EventKind::ForcedTermination,
        }
    }
}

/// One immutable lifecycle event. Published at most once per transition;
/// modules never mutate it.
#[derive(Debug, Clone, Serialize)]
pub struct ArenaEvent {
    /// The arena instance the event belongs to.
    pub arena: InstanceId,
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ArenaEvent {
    /// Stamps a payload with an arena id and the current time.
    #[must_use]
    pub fn now(arena: InstanceId, payload: EventPayload) -> Self {
        Self {
            arena,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// The kind discriminant of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_set_all_contains_everything() {
        let set = EventKindSet::all();
        for kind in EventKind::ALL {
            assert!(set.contains(kind));
        }
    }

    #[test]
    fn kind_set_of_filters() {
        let set = EventKindSet::of(&[EventKind::Decided, EventKind::Forfeit]);
        assert!(set.contains(EventKind::Decided));
        assert!(!set.contains(EventKind::PlayerJoined));
    }

    #[test]
    fn payload_kind_matches_variant() {
        let payload = EventPayload::PhaseChanged {
            from: Phase::Waiting,
            to: Phase::Starting,
            forced: false,
        };
        assert_eq!(payload.kind(), EventKind::PhaseChanged);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = ArenaEvent::now(
            InstanceId::nil(),
            EventPayload::PlayerJoined {
                player: PlayerId::new("steve"),
                team: TeamId(0),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "player_joined");
        assert_eq!(json["player"], "steve");
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn forced_termination_serializes_phase() {
        let event = ArenaEvent::now(
            InstanceId::nil(),
            EventPayload::ForcedTermination {
                phase: Phase::Active,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "forced_termination");
        assert_eq!(json["phase"], "active");
    }
}
