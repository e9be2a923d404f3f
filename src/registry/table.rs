//! Membership Table
//!
//! The registry's authoritative map of live nodes. Register, heartbeat,
//! sweep and reads all go through one mutex so nobody sees a half-applied
//! change.

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::id::NodeId;
use crate::network::protocol::MemberInfo;

/// One registered node
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub node_id: NodeId,
    pub address: String,
    pub last_seen: Instant,
    pub registered_at: chrono::DateTime<chrono::Utc>,
}

impl RegistryEntry {
    fn new(node_id: NodeId, address: String) -> Self {
        Self {
            node_id,
            address,
            last_seen: Instant::now(),
            registered_at: chrono::Utc::now(),
        }
    }

    fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }

    fn info(&self, now: Instant) -> MemberInfo {
        MemberInfo {
            node: self.node_id,
            address: self.address.clone(),
            registered_at: Some(self.registered_at),
            last_seen_ms_ago: now.saturating_duration_since(self.last_seen).as_millis() as u64,
        }
    }
}

/// Result of a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The id was not in the table before
    pub is_new: bool,
    /// Live ids after the registration, ascending
    pub members: Vec<NodeId>,
}

/// Result of a liveness sweep
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub evicted: Vec<NodeId>,
    /// Entries left after eviction, ascending by id
    pub remaining: Vec<MemberInfo>,
}

/// Authoritative live-node table
pub struct MembershipTable {
    entries: Mutex<BTreeMap<NodeId, RegistryEntry>>,
    liveness_timeout: Duration,
}

impl MembershipTable {
    pub fn new(liveness_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            liveness_timeout,
        }
    }

    /// Insert or refresh a node
    pub async fn register(&self, node: NodeId, address: String) -> Registration {
        let mut entries = self.entries.lock().await;
        let is_new = match entries.get_mut(&node) {
            Some(entry) => {
                entry.address = address;
                entry.last_seen = Instant::now();
                false
            }
            None => {
                entries.insert(node, RegistryEntry::new(node, address));
                true
            }
        };
        Registration {
            is_new,
            members: entries.keys().copied().collect(),
        }
    }

    /// Refresh a known node. Returns `false` for ids the table does not hold.
    pub async fn heartbeat(&self, node: NodeId) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(&node) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Live ids, ascending
    pub async fn node_ids(&self) -> Vec<NodeId> {
        self.entries.lock().await.keys().copied().collect()
    }

    /// Live entries with addresses, ascending by id
    pub async fn members(&self) -> Vec<MemberInfo> {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .map(|entry| entry.info(now))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Evict every entry whose last heartbeat is older than the liveness timeout
    pub async fn sweep(&self) -> SweepOutcome {
        self.sweep_at(Instant::now()).await
    }

    /// Sweep as of `now`
    pub async fn sweep_at(&self, now: Instant) -> SweepOutcome {
        let mut entries = self.entries.lock().await;
        let evicted: Vec<NodeId> = entries
            .values()
            .filter(|entry| entry.is_stale(now, self.liveness_timeout))
            .map(|entry| entry.node_id)
            .collect();

        for node in &evicted {
            entries.remove(node);
        }

        SweepOutcome {
            evicted,
            remaining: entries.values().map(|entry| entry.info(now)).collect(),
        }
    }
}
