//! Coordinator Election Module
//!
//! Ring-relay election run by every node, plus the transport seam it uses
//! to talk to its peers.

pub mod engine;
pub mod ring;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::error::Result;
use crate::id::NodeId;
use crate::network::protocol::{CoordinatorAnnouncement, ElectionToken};

pub use engine::{ElectionEngine, ElectionTimings};
pub use ring::MembershipView;
pub use state::{CoordinatorState, NodeStatus};

/// Calls one node makes on another during an election
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Hand the election token to `peer`
    async fn forward_token(&self, peer: NodeId, token: ElectionToken) -> Result<()>;

    /// Tell `peer` who won
    async fn announce(&self, peer: NodeId, announcement: CoordinatorAnnouncement) -> Result<()>;

    /// Ask `peer` who it believes the coordinator is
    async fn query_coordinator(&self, peer: NodeId) -> Result<Option<NodeId>>;
}
