//! Coordinator State
//!
//! Everything a node believes about the cluster, mutated only under the
//! engine's single lock.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::election::ring::MembershipView;
use crate::id::NodeId;

/// Local view of membership and leadership
#[derive(Debug, Clone)]
pub struct CoordinatorState {
    /// Members as last reported by the registry
    pub members: MembershipView,
    /// Believed coordinator, `None` until learned or elected
    pub coordinator: Option<NodeId>,
    /// Start time of the election this node initiated, if still outstanding
    pub election_started: Option<Instant>,
    /// Bumped on every observed membership change
    pub membership_epoch: u64,
    pub elections_started: u64,
    pub elections_completed: u64,
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self {
            members: MembershipView::new(),
            coordinator: None,
            election_started: None,
            membership_epoch: 0,
            elections_started: 0,
            elections_completed: 0,
        }
    }

    pub fn election_in_progress(&self) -> bool {
        self.election_started.is_some()
    }

    /// Whether the outstanding election has been running for at least `timeout`
    pub fn election_stalled(&self, timeout: Duration) -> bool {
        self.election_started
            .map(|started| started.elapsed() >= timeout)
            .unwrap_or(false)
    }

    /// Ring as seen by `node`: the reported members plus the node itself
    pub fn ring(&self, node: NodeId) -> MembershipView {
        self.members.with(node)
    }

    /// Serializable snapshot for status endpoints
    pub fn status(&self, node: NodeId) -> NodeStatus {
        NodeStatus {
            node_id: node,
            coordinator: self.coordinator,
            is_coordinator: self.coordinator == Some(node),
            members: self.ring(node).ids(),
            election_in_progress: self.election_in_progress(),
            membership_epoch: self.membership_epoch,
            elections_started: self.elections_started,
            elections_completed: self.elections_completed,
        }
    }
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Node status as reported over HTTP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub coordinator: Option<NodeId>,
    pub is_coordinator: bool,
    pub members: Vec<NodeId>,
    pub election_in_progress: bool,
    pub membership_epoch: u64,
    pub elections_started: u64,
    pub elections_completed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_election_stalls_after_timeout() {
        let mut state = CoordinatorState::new();
        assert!(!state.election_stalled(Duration::from_secs(5)));

        state.election_started = Some(Instant::now());
        assert!(state.election_in_progress());
        assert!(!state.election_stalled(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(state.election_stalled(Duration::from_secs(5)));
    }

    #[test]
    fn test_status_includes_self() {
        let mut state = CoordinatorState::new();
        state.members = [NodeId::from(1), NodeId::from(3)].into_iter().collect();
        state.coordinator = Some(NodeId::from(2));

        let status = state.status(NodeId::from(2));
        assert!(status.is_coordinator);
        assert_eq!(status.members, vec![NodeId::from(1), NodeId::from(2), NodeId::from(3)]);
    }
}
