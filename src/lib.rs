//! WolfRing - Ring Coordinator Election
//!
//! A membership registry tracks live nodes by heartbeat and pushes
//! membership changes to them. Every node keeps a local view of that
//! membership and, when the coordinator is missing or outranked, runs a
//! ring election: a token travels clockwise around the ascending ring of
//! node ids, collecting the highest id, and the initiator announces the
//! winner when the token comes back.
//!
//! # Architecture
//!
//! - [`registry`]: authoritative membership table, liveness sweep and
//!   change broadcasts
//! - [`election`]: per-node coordinator state and the ring protocol
//! - [`node`]: registration, heartbeats and the periodic self-check
//! - [`network`] and [`api`]: JSON over HTTP between the two roles

pub mod api;
pub mod config;
pub mod election;
pub mod error;
pub mod id;
pub mod network;
pub mod node;
pub mod registry;

pub use config::WolfRingConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WolfRingConfig;
    pub use crate::election::{ElectionEngine, ElectionTimings, NodeStatus, PeerTransport};
    pub use crate::error::{Error, Result};
    pub use crate::id::NodeId;
    pub use crate::node::{NodeRuntime, RegistryApi};
    pub use crate::registry::{MembershipNotifier, Registry, RegistryTimings};
}
