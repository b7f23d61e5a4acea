//! Bracket structure and round pairing.
//!
//! Pairing is fully deterministic: participants who have already received
//! byes are sorted to the front of the round so they get paired first, and
//! the tail participant of an odd round receives the bye. Byes therefore
//! rotate instead of stacking on one player.

use std::collections::HashMap;

use serde::Serialize;

use crate::ids::{InstanceId, PlayerId};

/// Progress of one scheduled pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Created, arena not yet running.
    Scheduled,
    /// The underlying arena instance is running.
    AwaitingResult,
    /// A result (or a no-advance outcome) has been recorded.
    Resolved,
}

/// One pairing (or bye) within a tournament round.
#[derive(Debug, Clone, Serialize)]
pub struct BracketNode {
    /// One-based round number.
    pub round: u32,
    /// First participant; joins the home team slot.
    pub home: PlayerId,
    /// Second participant; `None` marks a bye.
    pub away: Option<PlayerId>,
    /// The arena instance playing this node out, once scheduled.
    pub arena: Option<InstanceId>,
    /// Node progress.
    pub state: NodeState,
    /// The advancing participant. `None` on a resolved node means nobody
    /// advances (draw, double forfeit, forced termination).
    pub winner: Option<PlayerId>,
}

impl BracketNode {
    /// Whether this node is a bye.
    #[must_use]
    pub const fn is_bye(&self) -> bool {
        self.away.is_none()
    }
}

/// Pairs one round of participants into bracket nodes.
///
/// Participants with the most received byes sort to the front (stable, so
/// input order breaks ties) and are paired first; with an odd count the
/// tail participant gets the bye, already resolved in their favor.
/// `byes` maps participants to the number of byes they have received so far.
#[must_use]
pub fn pair_round(
    round: u32,
    participants: &[PlayerId],
    byes: &HashMap<PlayerId, u32>,
) -> Vec<BracketNode> {
    let mut ordered: Vec<PlayerId> = participants.to_vec();
    ordered.sort_by_key(|p| std::cmp::Reverse(byes.get(p).copied().unwrap_or(0)));

    let mut nodes = Vec::with_capacity(ordered.len().div_ceil(2));
    let mut iter = ordered.into_iter();
    while let Some(home) = iter.next() {
        match iter.next() {
            Some(away) => nodes.push(BracketNode {
                round,
                home,
                away: Some(away),
                arena: None,
                state: NodeState::Scheduled,
                winner: None,
            }),
            None => nodes.push(BracketNode {
                round,
                home: home.clone(),
                away: None,
                arena: None,
                state: NodeState::Resolved,
                winner: Some(home),
            }),
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn players(names: &[&str]) -> Vec<PlayerId> {
        names.iter().map(|n| PlayerId::new(*n)).collect()
    }

    #[test]
    fn even_round_pairs_in_order() {
        let nodes = pair_round(1, &players(&["a", "b", "c", "d"]), &HashMap::new());
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].home.as_str(), "a");
        assert_eq!(nodes[0].away.as_ref().unwrap().as_str(), "b");
        assert_eq!(nodes[1].home.as_str(), "c");
        assert_eq!(nodes[1].away.as_ref().unwrap().as_str(), "d");
        assert!(nodes.iter().all(|n| n.state == NodeState::Scheduled));
    }

    #[test]
    fn odd_round_gives_the_tail_a_bye() {
        let nodes = pair_round(1, &players(&["a", "b", "c"]), &HashMap::new());
        assert_eq!(nodes.len(), 2);
        assert!(nodes[1].is_bye());
        assert_eq!(nodes[1].home.as_str(), "c");
        assert_eq!(nodes[1].state, NodeState::Resolved);
        assert_eq!(nodes[1].winner.as_ref().unwrap().as_str(), "c");
    }

    #[test]
    fn byes_rotate_to_previous_bye_recipients_first() {
        // "c" received a bye last round, so it is paired first this round
        // and the bye falls to someone else.
        let mut byes = HashMap::new();
        byes.insert(PlayerId::new("c"), 1);

        let nodes = pair_round(2, &players(&["a", "b", "c"]), &byes);
        assert_eq!(nodes[0].home.as_str(), "c");
        assert_eq!(nodes[0].away.as_ref().unwrap().as_str(), "a");
        assert!(nodes[1].is_bye());
        assert_eq!(nodes[1].home.as_str(), "b");
    }

    #[test]
    fn pairing_is_deterministic() {
        let p = players(&["a", "b", "c", "d", "e"]);
        let byes = HashMap::new();
        let first = pair_round(1, &p, &byes);
        let second = pair_round(1, &p, &byes);
        for (x, y) in first.iter().zip(second.iter()) {
            assert_eq!(x.home, y.home);
            assert_eq!(x.away, y.away);
        }
    }

    #[test]
    fn two_participants_form_one_node() {
        let nodes = pair_round(1, &players(&["a", "b"]), &HashMap::new());
        assert_eq!(nodes.len(), 1);
        assert!(!nodes[0].is_bye());
    }
}
