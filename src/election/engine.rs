//! Ring Election Engine
//!
//! Decides when this node needs an election, relays election tokens
//! clockwise around the ring of known members and keeps the local
//! coordinator pointer converging toward agreement.
//!
//! A token starts at its initiator with the initiator's id as the highest
//! id seen. Every holder folds in its own id and passes the token to the
//! next reachable member. When the token is back at the initiator the
//! highest id seen is the coordinator, and the initiator announces it.
//!
//! No lock is held across a network call. All state lives in one
//! [`CoordinatorState`] behind one mutex.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::WolfRingConfig;
use crate::election::ring::MembershipView;
use crate::election::state::{CoordinatorState, NodeStatus};
use crate::election::PeerTransport;
use crate::id::NodeId;
use crate::network::protocol::{CoordinatorAnnouncement, ElectionToken};

/// Election timing knobs
#[derive(Debug, Clone)]
pub struct ElectionTimings {
    /// Pause after a membership change before acting on it
    pub settle_delay: Duration,
    /// Age after which an outstanding election may be restarted
    pub election_timeout: Duration,
    /// Re-broadcast budget for a changed announcement
    pub max_announce_hops: u32,
}

impl Default for ElectionTimings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(10),
            election_timeout: Duration::from_secs(60),
            max_announce_hops: 2,
        }
    }
}

impl ElectionTimings {
    pub fn from_config(config: &WolfRingConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            election_timeout: config.election_timeout(),
            max_announce_hops: config.election.max_announce_hops,
        }
    }
}

/// What became of a token this node held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Passed on to the given node
    Forwarded(NodeId),
    /// The lap finished here and the given node won
    Elected(NodeId),
    /// Nobody on the route could take it
    Dropped,
}

/// Per-node election engine
pub struct ElectionEngine {
    node_id: NodeId,
    state: Mutex<CoordinatorState>,
    transport: Arc<dyn PeerTransport>,
    timings: ElectionTimings,
}

impl ElectionEngine {
    /// Create an engine for `node_id` talking to peers through `transport`
    pub fn new(
        node_id: NodeId,
        transport: Arc<dyn PeerTransport>,
        timings: ElectionTimings,
    ) -> Self {
        Self {
            node_id,
            state: Mutex::new(CoordinatorState::new()),
            transport,
            timings,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Currently believed coordinator
    pub async fn coordinator(&self) -> Option<NodeId> {
        self.state.lock().await.coordinator
    }

    /// Ring as this node sees it, itself included
    pub async fn members(&self) -> MembershipView {
        self.state.lock().await.ring(self.node_id)
    }

    /// Whether `nodes` is exactly the membership last reported to this engine
    pub async fn knows_membership(&self, nodes: &[NodeId]) -> bool {
        let view: MembershipView = nodes.iter().copied().collect();
        self.state.lock().await.members == view
    }

    pub async fn election_in_progress(&self) -> bool {
        self.state.lock().await.election_in_progress()
    }

    pub async fn status(&self) -> NodeStatus {
        self.state.lock().await.status(self.node_id)
    }

    // ============ Triggers ============

    /// React to a membership list from the registry.
    ///
    /// Returns `false` when the list matches what is already known. Otherwise
    /// the new list is adopted, and after the settle delay the node asks its
    /// peers for the coordinator and starts an election if the coordinator is
    /// gone or is this node.
    pub async fn handle_membership_change(&self, nodes: Vec<NodeId>) -> bool {
        let view: MembershipView = nodes.into_iter().collect();
        let epoch = {
            let mut state = self.state.lock().await;
            if state.members == view {
                return false;
            }
            state.members = view.clone();
            state.membership_epoch += 1;
            state.membership_epoch
        };
        tracing::info!("Node {} noticed a change in peers: {}", self.node_id, view);

        if !self.timings.settle_delay.is_zero() {
            tokio::time::sleep(self.timings.settle_delay).await;
        }

        let in_progress = {
            let state = self.state.lock().await;
            if state.membership_epoch != epoch {
                tracing::debug!(
                    "Node {} membership changed again during settle, deferring to the newer change",
                    self.node_id
                );
                return true;
            }
            state.election_in_progress()
        };

        if !in_progress {
            tracing::info!("Node {} fetching coordinator from peers", self.node_id);
            self.fetch_coordinator_from_peers().await;
        }

        if self.coordinator_needs_replacing().await {
            self.initiate_election().await;
        }
        true
    }

    /// Ask peers in ascending id order for their coordinator and adopt the
    /// first answer.
    pub async fn fetch_coordinator_from_peers(&self) -> Option<NodeId> {
        let peers = self.state.lock().await.members.peers_of(self.node_id);

        for peer in peers {
            match self.transport.query_coordinator(peer).await {
                Ok(Some(coordinator)) => {
                    self.state.lock().await.coordinator = Some(coordinator);
                    tracing::info!(
                        "Updated current coordinator from node {} to {}",
                        peer,
                        coordinator
                    );
                    return Some(coordinator);
                }
                Ok(None) => {
                    tracing::debug!("Node {} does not know the coordinator either", peer);
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch coordinator from node {}: {}", peer, e);
                }
            }
        }
        None
    }

    /// Periodic check run after every heartbeat.
    ///
    /// Clears a stalled election, then starts one if the coordinator ranks
    /// below this node, has left the membership, or is unknown.
    pub async fn self_check(&self) -> bool {
        let (coordinator, in_progress, ring, registered) = {
            let mut state = self.state.lock().await;
            if state.election_stalled(self.timings.election_timeout) {
                tracing::warn!(
                    "Node {} election timed out after {:?}, clearing it",
                    self.node_id,
                    self.timings.election_timeout
                );
                state.election_started = None;
            }
            (
                state.coordinator,
                state.election_in_progress(),
                state.ring(self.node_id),
                !state.members.is_empty(),
            )
        };

        let reason = match coordinator {
            // Higher ids reclaim office even without a failure
            Some(c) if c < self.node_id => {
                format!("coordinator {} ranks below node {}", c, self.node_id)
            }
            Some(c) if !ring.contains(c) => format!("coordinator {} is no longer a member", c),
            None if registered && !in_progress => "no coordinator is known".to_string(),
            _ => return false,
        };

        tracing::info!("Node {} starting election: {}", self.node_id, reason);
        self.initiate_election().await
    }

    async fn coordinator_needs_replacing(&self) -> bool {
        let state = self.state.lock().await;
        match state.coordinator {
            None => true,
            Some(c) => c == self.node_id || !state.ring(self.node_id).contains(c),
        }
    }

    // ============ Protocol ============

    /// Start an election unless one this node started is still running.
    ///
    /// An outstanding election older than the election timeout is treated
    /// as lost and replaced.
    pub async fn initiate_election(&self) -> bool {
        let ring = {
            let mut state = self.state.lock().await;
            if let Some(started) = state.election_started {
                if started.elapsed() < self.timings.election_timeout {
                    tracing::debug!("Node {} already has an election in progress", self.node_id);
                    return false;
                }
                tracing::warn!(
                    "Node {} restarting election stalled for {:?}",
                    self.node_id,
                    started.elapsed()
                );
            }
            state.election_started = Some(Instant::now());
            state.elections_started += 1;
            state.ring(self.node_id)
        };

        tracing::info!("Node {} initiating election among {}", self.node_id, ring);
        self.relay(ElectionToken::new(self.node_id)).await;
        true
    }

    /// Handle a token delivered by a peer
    pub async fn receive_token(&self, token: ElectionToken) -> RelayOutcome {
        if token.initiator == self.node_id {
            let winner = token.max_id.max(self.node_id);
            self.complete_election(winner).await;
            return RelayOutcome::Elected(winner);
        }
        self.relay(token).await
    }

    async fn relay(&self, token: ElectionToken) -> RelayOutcome {
        let route = self
            .state
            .lock()
            .await
            .members
            .relay_route(self.node_id, token.initiator);

        if route.is_empty() {
            tracing::info!(
                "Node {} is the only node in the network. Elected as coordinator.",
                self.node_id
            );
            self.complete_election(self.node_id).await;
            return RelayOutcome::Elected(self.node_id);
        }

        let token = token.observed_by(self.node_id);
        for hop in route {
            tracing::info!(
                "Passing election message from node {} to node {} with initiator {} and max_id {}",
                self.node_id,
                hop,
                token.initiator,
                token.max_id
            );
            match self.transport.forward_token(hop, token).await {
                Ok(()) => return RelayOutcome::Forwarded(hop),
                Err(e) if hop == token.initiator => {
                    tracing::warn!(
                        "Initiator {} unreachable from node {}, dropping election token: {}",
                        hop,
                        self.node_id,
                        e
                    );
                    return RelayOutcome::Dropped;
                }
                Err(e) => {
                    tracing::warn!(
                        "Error passing election message to node {}, skipping ahead: {}",
                        hop,
                        e
                    );
                }
            }
        }

        // Only the initiator gets here: every other member was unreachable
        if token.initiator == self.node_id {
            tracing::warn!("Node {} reached no peer, abandoning its election", self.node_id);
            self.state.lock().await.election_started = None;
        }
        RelayOutcome::Dropped
    }

    async fn complete_election(&self, winner: NodeId) {
        let (peers, ring) = {
            let mut state = self.state.lock().await;
            state.coordinator = Some(winner);
            state.election_started = None;
            state.elections_completed += 1;
            (state.members.peers_of(self.node_id), state.ring(self.node_id))
        };

        if !peers.is_empty() {
            self.broadcast(CoordinatorAnnouncement::new(winner), &peers).await;
        }
        tracing::info!("Election completed. Node {} is the coordinator among {}.", winner, ring);
    }

    /// Apply a coordinator announcement from a peer.
    ///
    /// Returns whether the local belief changed. Only a change is passed on,
    /// and only while the announcement's hop budget lasts.
    pub async fn receive_announcement(&self, announcement: CoordinatorAnnouncement) -> bool {
        let (changed, peers) = {
            let mut state = self.state.lock().await;
            let changed = state.coordinator != Some(announcement.coordinator);
            if changed {
                state.coordinator = Some(announcement.coordinator);
            }
            state.election_started = None;
            (changed, state.members.peers_of(self.node_id))
        };

        if !changed {
            tracing::debug!(
                "Node {} already follows coordinator {}",
                self.node_id,
                announcement.coordinator
            );
            return false;
        }

        tracing::info!(
            "Node {} updated coordinator to {}.",
            self.node_id,
            announcement.coordinator
        );
        if announcement.hops < self.timings.max_announce_hops && !peers.is_empty() {
            self.broadcast(announcement.forwarded(), &peers).await;
        }
        true
    }

    async fn broadcast(&self, announcement: CoordinatorAnnouncement, peers: &[NodeId]) -> usize {
        let sends = peers.iter().map(|&peer| async move {
            (peer, self.transport.announce(peer, announcement).await)
        });

        let mut acknowledged = 0;
        for (peer, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    acknowledged += 1;
                    tracing::debug!(
                        "Node {} acknowledged {} as coordinator.",
                        peer,
                        announcement.coordinator
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Error notifying node {} about the new coordinator: {}",
                        peer,
                        e
                    );
                }
            }
        }
        acknowledged
    }

    #[cfg(test)]
    pub(crate) async fn seed_members(&self, nodes: &[u64]) {
        self.state.lock().await.members = nodes.iter().copied().map(NodeId::from).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::testing::LocalNet;

    fn id(raw: u64) -> NodeId {
        NodeId::from(raw)
    }

    fn quick() -> ElectionTimings {
        ElectionTimings {
            settle_delay: Duration::ZERO,
            election_timeout: Duration::from_secs(60),
            max_announce_hops: 2,
        }
    }

    /// Every node up, every node aware of the full ring
    async fn settled_cluster(ids: &[u64]) -> (Arc<LocalNet>, Vec<Arc<ElectionEngine>>) {
        let net = LocalNet::new();
        let mut engines = Vec::new();
        for &raw in ids {
            let engine = net.add_node(raw, quick());
            engine.seed_members(ids).await;
            engines.push(engine);
        }
        (net, engines)
    }

    #[tokio::test]
    async fn test_single_node_elects_itself() {
        let net = LocalNet::new();
        let engine = net.add_node(5, quick());

        assert!(engine.handle_membership_change(vec![id(5)]).await);
        assert_eq!(engine.coordinator().await, Some(id(5)));
        assert!(!engine.election_in_progress().await);
        // Nobody to tell
        assert!(net.announcements().is_empty());
    }

    #[tokio::test]
    async fn test_elects_maximum_id_from_any_initiator() {
        let rings: [&[u64]; 4] = [&[1, 2, 3], &[4, 9, 2, 7], &[10, 3], &[1, 5, 2, 8, 6]];

        for ring in rings {
            let expected = id(*ring.iter().max().unwrap());
            for (index, _) in ring.iter().enumerate() {
                let (_net, engines) = settled_cluster(ring).await;
                assert!(engines[index].initiate_election().await);
                for engine in &engines {
                    assert_eq!(
                        engine.coordinator().await,
                        Some(expected),
                        "ring {:?} initiated by {}",
                        ring,
                        engines[index].node_id()
                    );
                }
                assert!(!engines[index].election_in_progress().await);
            }
        }
    }

    #[tokio::test]
    async fn test_token_visits_each_member_once() {
        let (net, engines) = settled_cluster(&[1, 2, 3, 4, 5]).await;
        engines[2].initiate_election().await;

        let receivers: Vec<NodeId> = net.token_deliveries().iter().map(|(to, _)| *to).collect();
        assert_eq!(receivers, vec![id(4), id(5), id(1), id(2), id(3)]);

        let (_, last) = net.token_deliveries().last().copied().unwrap();
        assert_eq!(last.initiator, id(3));
        assert_eq!(last.max_id, id(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initiators_converge() {
        let (_net, engines) = settled_cluster(&[1, 2, 3, 4]).await;

        let laps: Vec<_> = engines
            .iter()
            .map(|engine| {
                let engine = Arc::clone(engine);
                tokio::spawn(async move { engine.initiate_election().await })
            })
            .collect();
        for lap in laps {
            lap.await.unwrap();
        }

        for engine in &engines {
            let node = engine.node_id();
            assert_eq!(engine.coordinator().await, Some(id(4)), "node {}", node);
            assert!(!engine.election_in_progress().await, "node {}", node);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stalled_lap_converges_through_other_election() {
        let (net, engines) = settled_cluster(&[1, 2, 3]).await;

        // Node 1's lap is lost on its first hop
        net.set_black_hole(2, true);
        assert!(engines[0].initiate_election().await);
        assert!(engines[0].election_in_progress().await);
        net.set_black_hole(2, false);

        let laps: Vec<_> = engines[1..]
            .iter()
            .map(|engine| {
                let engine = Arc::clone(engine);
                tokio::spawn(async move { engine.initiate_election().await })
            })
            .collect();
        for lap in laps {
            assert!(lap.await.unwrap());
        }

        // The winner's announcement releases node 1's stuck guard
        for engine in &engines {
            let node = engine.node_id();
            assert_eq!(engine.coordinator().await, Some(id(3)), "node {}", node);
            assert!(!engine.election_in_progress().await, "node {}", node);
        }
        assert_eq!(engines[0].status().await.elections_completed, 0);
    }

    #[tokio::test]
    async fn test_repeated_announcement_is_not_rebroadcast() {
        let net = LocalNet::new();
        let engine = net.add_node(1, quick());
        engine.seed_members(&[1, 2, 3]).await;

        assert!(engine.receive_announcement(CoordinatorAnnouncement::new(id(3))).await);
        let after_first = net.announcements().len();
        assert_eq!(after_first, 2);

        assert!(!engine.receive_announcement(CoordinatorAnnouncement::new(id(3))).await);
        assert_eq!(net.announcements().len(), after_first);
    }

    #[tokio::test]
    async fn test_announcement_hop_budget() {
        let net = LocalNet::new();
        let engine = net.add_node(1, quick());
        engine.seed_members(&[1, 2]).await;

        let exhausted = CoordinatorAnnouncement {
            coordinator: id(2),
            hops: 2,
        };
        assert!(engine.receive_announcement(exhausted).await);
        assert_eq!(engine.coordinator().await, Some(id(2)));
        assert!(net.announcements().is_empty());
    }

    #[tokio::test]
    async fn test_three_node_scenario_with_eviction() {
        let (net, engines) = settled_cluster(&[1, 2, 3]).await;
        let (one, two, three) = (&engines[0], &engines[1], &engines[2]);

        one.initiate_election().await;
        for engine in &engines {
            assert_eq!(engine.coordinator().await, Some(id(3)));
        }

        // Coordinator 3 outranks node 1, so the self-check stays quiet
        assert!(!one.self_check().await);
        assert!(!two.self_check().await);
        assert!(!three.self_check().await);

        // Registry evicts node 3
        net.set_down(3, true);
        assert!(one.handle_membership_change(vec![id(1), id(2)]).await);
        assert!(two.handle_membership_change(vec![id(1), id(2)]).await);

        assert_eq!(one.coordinator().await, Some(id(2)));
        assert_eq!(two.coordinator().await, Some(id(2)));
        assert!(!one.election_in_progress().await);
        assert!(!two.election_in_progress().await);
    }

    #[tokio::test]
    async fn test_unchanged_membership_is_ignored() {
        let net = LocalNet::new();
        let engine = net.add_node(1, quick());
        assert!(engine.handle_membership_change(vec![id(1), id(2)]).await);
        let epoch = engine.status().await.membership_epoch;

        assert!(!engine.handle_membership_change(vec![id(2), id(1)]).await);
        assert_eq!(engine.status().await.membership_epoch, epoch);
    }

    #[tokio::test]
    async fn test_relay_skips_unreachable_member() {
        let (net, engines) = settled_cluster(&[1, 2, 3, 4]).await;
        net.set_down(3, true);

        engines[0].initiate_election().await;

        let receivers: Vec<NodeId> = net.token_deliveries().iter().map(|(to, _)| *to).collect();
        assert_eq!(receivers, vec![id(2), id(4), id(1)]);
        for index in [0, 1, 3] {
            assert_eq!(engines[index].coordinator().await, Some(id(4)));
        }
    }

    #[tokio::test]
    async fn test_token_dropped_when_initiator_unreachable() {
        let (net, engines) = settled_cluster(&[1, 2, 3]).await;
        net.set_down(1, true);

        let outcome = engines[2].receive_token(ElectionToken::new(id(1))).await;
        assert_eq!(outcome, RelayOutcome::Dropped);
        assert_eq!(engines[2].coordinator().await, None);
    }

    #[tokio::test]
    async fn test_initiator_alone_in_practice_abandons() {
        let (net, engines) = settled_cluster(&[1, 2, 3]).await;
        net.set_down(2, true);
        net.set_down(3, true);

        assert!(engines[0].initiate_election().await);
        assert!(!engines[0].election_in_progress().await);
        assert_eq!(engines[0].coordinator().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_election_times_out() {
        let timings = ElectionTimings {
            election_timeout: Duration::from_secs(30),
            ..quick()
        };
        let net = LocalNet::new();
        let one = net.add_node(1, timings.clone());
        let two = net.add_node(2, timings);
        one.seed_members(&[1, 2]).await;
        two.seed_members(&[1, 2]).await;

        // Token accepted by 2's address but never delivered
        net.set_black_hole(2, true);
        assert!(one.initiate_election().await);
        assert!(one.election_in_progress().await);
        assert!(!one.initiate_election().await);

        tokio::time::advance(Duration::from_secs(31)).await;
        net.set_black_hole(2, false);

        // The self-check clears the stale guard and, with no coordinator, re-runs
        assert!(one.self_check().await);
        assert_eq!(one.coordinator().await, Some(id(2)));
        assert_eq!(one.status().await.elections_started, 2);
    }

    #[tokio::test]
    async fn test_self_check_reclaims_for_higher_id() {
        let (_net, engines) = settled_cluster(&[3, 5]).await;
        let (three, five) = (&engines[0], &engines[1]);

        // 5 heard about 3 without ever winning itself
        let relayed = CoordinatorAnnouncement {
            coordinator: id(3),
            hops: 2,
        };
        five.receive_announcement(relayed).await;
        assert_eq!(five.coordinator().await, Some(id(3)));

        assert!(five.self_check().await);
        assert_eq!(five.coordinator().await, Some(id(5)));
        assert_eq!(three.coordinator().await, Some(id(5)));
    }

    #[tokio::test]
    async fn test_fetch_adopts_first_answer_in_id_order() {
        let (net, engines) = settled_cluster(&[1, 2, 3, 4]).await;
        // Node 3 and 4 disagree; only 3 should be asked
        engines[2].seed_members(&[3]).await;
        engines[2].receive_announcement(CoordinatorAnnouncement::new(id(4))).await;
        engines[3].seed_members(&[4]).await;
        engines[3].receive_announcement(CoordinatorAnnouncement::new(id(9))).await;

        assert_eq!(engines[0].fetch_coordinator_from_peers().await, Some(id(4)));
        assert_eq!(engines[0].coordinator().await, Some(id(4)));
        assert_eq!(net.queries(), vec![id(2), id(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_change_supersedes_settling_one() {
        let timings = ElectionTimings {
            settle_delay: Duration::from_secs(10),
            ..quick()
        };
        let net = LocalNet::new();
        let engine = net.add_node(1, timings);

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.handle_membership_change(vec![id(1), id(2)]).await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        let second = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.handle_membership_change(vec![id(1)]).await })
        };

        assert!(first.await.unwrap());
        assert!(second.await.unwrap());

        let status = engine.status().await;
        assert_eq!(status.membership_epoch, 2);
        assert_eq!(status.elections_started, 1);
        assert_eq!(status.coordinator, Some(id(1)));
    }
}
