//! Membership Registry Module
//!
//! Tracks which nodes are alive from their heartbeats, evicts the silent
//! ones and pushes membership changes to the rest.

mod service;
mod table;

use async_trait::async_trait;

use crate::error::Result;
use crate::network::protocol::MembershipUpdate;

pub use service::{RegisterOutcome, Registry, RegistryTimings};
pub use table::{MembershipTable, Registration, RegistryEntry, SweepOutcome};

/// Delivery of membership-changed pushes to nodes
#[async_trait]
pub trait MembershipNotifier: Send + Sync {
    /// Push `update` to the node listening at `address`
    async fn notify(&self, address: &str, update: &MembershipUpdate) -> Result<()>;
}
