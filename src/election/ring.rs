//! Membership Ring
//!
//! The set of node ids believed live, kept in ascending order. The ring is
//! that order read clockwise, wrapping from the largest id to the smallest.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Sorted set of live node ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipView(BTreeSet<NodeId>);

impl MembershipView {
    /// Empty view
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.0.contains(&node)
    }

    /// Ids in ascending order
    pub fn ids(&self) -> Vec<NodeId> {
        self.0.iter().copied().collect()
    }

    /// Copy of this view that also contains `node`
    pub fn with(&self, node: NodeId) -> Self {
        let mut ids = self.0.clone();
        ids.insert(node);
        Self(ids)
    }

    /// Every member except `node`, ascending
    pub fn peers_of(&self, node: NodeId) -> Vec<NodeId> {
        self.0.iter().copied().filter(|id| *id != node).collect()
    }

    /// Members clockwise from `node`, excluding `node` itself.
    ///
    /// `node` need not be a member; the walk starts where it would sit.
    pub fn successors(&self, node: NodeId) -> Vec<NodeId> {
        let after = self.0.range((std::ops::Bound::Excluded(node), std::ops::Bound::Unbounded));
        let before = self.0.range(..node);
        after.chain(before).copied().collect()
    }

    /// Relay route for a token held by `holder` on behalf of `initiator`.
    ///
    /// Successors of the holder in ring order, cut off at the initiator so a
    /// skip-ahead never jumps past the end of the lap. The initiator is always
    /// routable even if this view has lost it.
    pub fn relay_route(&self, holder: NodeId, initiator: NodeId) -> Vec<NodeId> {
        let ring = self.with(holder).with(initiator);
        let mut route = Vec::new();
        for hop in ring.successors(holder) {
            route.push(hop);
            if hop == initiator {
                break;
            }
        }
        route
    }
}

impl FromIterator<NodeId> for MembershipView {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for MembershipView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        write!(f, "[{}]", ids.join(", "))
    }
}
