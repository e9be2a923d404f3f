//! Registry Service
//!
//! Wraps the membership table with the registry's background duties: the
//! startup grace period, the periodic liveness sweep and the
//! membership-changed broadcast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WolfRingConfig;
use crate::id::NodeId;
use crate::network::protocol::{MemberInfo, MembershipUpdate};
use crate::registry::table::{MembershipTable, Registration};
use crate::registry::MembershipNotifier;

/// Registry timing knobs
#[derive(Debug, Clone)]
pub struct RegistryTimings {
    /// Delay before the first broadcast
    pub grace_period: Duration,
    /// Interval between liveness sweeps
    pub sweep_interval: Duration,
    /// Heartbeat age after which a node is evicted
    pub liveness_timeout: Duration,
}

impl Default for RegistryTimings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(15),
            sweep_interval: Duration::from_secs(30),
            liveness_timeout: Duration::from_secs(30),
        }
    }
}

impl RegistryTimings {
    pub fn from_config(config: &WolfRingConfig) -> Self {
        Self {
            grace_period: config.grace_period(),
            sweep_interval: config.sweep_interval(),
            liveness_timeout: config.liveness_timeout(),
        }
    }
}

/// Registration plus the broadcast it may have started
pub struct RegisterOutcome {
    pub registration: Registration,
    /// Set when the newcomer was announced to the other members
    pub broadcast: Option<JoinHandle<usize>>,
}

/// Membership registry
pub struct Registry {
    table: MembershipTable,
    notifier: Arc<dyn MembershipNotifier>,
    timings: RegistryTimings,
    grace_elapsed: AtomicBool,
}

impl Registry {
    pub fn new(notifier: Arc<dyn MembershipNotifier>, timings: RegistryTimings) -> Self {
        Self {
            table: MembershipTable::new(timings.liveness_timeout),
            notifier,
            timings,
            grace_elapsed: AtomicBool::new(false),
        }
    }

    pub fn grace_elapsed(&self) -> bool {
        self.grace_elapsed.load(Ordering::SeqCst)
    }

    /// Register or refresh a node.
    ///
    /// A node the table did not know is announced to the other members once
    /// the grace period is over. The announcement runs on its own task.
    pub async fn register(self: &Arc<Self>, node: NodeId, address: String) -> RegisterOutcome {
        let registration = self.table.register(node, address.clone()).await;
        tracing::info!(
            "Node {} registered or updated with address {} (new: {})",
            node,
            address,
            registration.is_new
        );

        let broadcast = if registration.is_new && self.grace_elapsed() {
            tracing::info!("Triggering notification to all nodes about the new node {}", node);
            let registry = Arc::clone(self);
            Some(tokio::spawn(async move { registry.notify_all(Some(node)).await }))
        } else {
            None
        };

        RegisterOutcome {
            registration,
            broadcast,
        }
    }

    /// Refresh a node's liveness. Unknown ids are ignored.
    pub async fn heartbeat(&self, node: NodeId) -> bool {
        let known = self.table.heartbeat(node).await;
        if known {
            tracing::trace!("Heartbeat from node {}", node);
        } else {
            tracing::debug!("Heartbeat from unregistered node {} ignored", node);
        }
        known
    }

    pub async fn list_nodes(&self) -> Vec<NodeId> {
        self.table.node_ids().await
    }

    pub async fn members(&self) -> Vec<MemberInfo> {
        self.table.members().await
    }

    /// End the startup grace period and tell whoever registered meanwhile
    pub async fn finish_grace_period(&self) -> usize {
        self.grace_elapsed.store(true, Ordering::SeqCst);
        let members = self.table.members().await;
        if members.is_empty() {
            tracing::info!("No nodes registered yet.");
            return 0;
        }
        let ids: Vec<NodeId> = members.iter().map(|m| m.node).collect();
        tracing::info!("Initial nodes: {:?}", ids);
        self.deliver(&members, None).await
    }

    /// Evict stale nodes and, if any went, tell the rest
    pub async fn sweep(&self) -> Vec<NodeId> {
        let outcome = self.table.sweep().await;
        if outcome.evicted.is_empty() {
            if outcome.remaining.is_empty() {
                tracing::debug!("No nodes registered yet.");
            }
            return outcome.evicted;
        }

        for node in &outcome.evicted {
            tracing::info!(
                "Detected inactive node: {}. Triggering notification to active nodes.",
                node
            );
        }
        self.deliver(&outcome.remaining, None).await;
        outcome.evicted
    }

    /// Push the current membership to every member except `except`.
    ///
    /// Returns how many members acknowledged. Failures are logged and never
    /// retried here; nodes catch up through their own periodic re-fetch.
    pub async fn notify_all(&self, except: Option<NodeId>) -> usize {
        let members = self.table.members().await;
        self.deliver(&members, except).await
    }

    async fn deliver(&self, members: &[MemberInfo], except: Option<NodeId>) -> usize {
        let update = MembershipUpdate {
            nodes: members.iter().map(|m| m.node).collect(),
            members: members.to_vec(),
        };

        let sends = members
            .iter()
            .filter(|member| Some(member.node) != except)
            .map(|member| {
                let update = &update;
                async move {
                    let result = self.notifier.notify(&member.address, update).await;
                    (member, result)
                }
            });

        let mut delivered = 0;
        for (member, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    delivered += 1;
                    tracing::info!(
                        "Node {} at {} has been notified about the change.",
                        member.node,
                        member.address
                    );
                }
                Err(e) => {
                    tracing::warn!("Failed to notify node {} about the change: {}", member.node, e);
                }
            }
        }
        delivered
    }

    /// Run the grace period and then the sweep loop until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            "Registry waiting {:?} for nodes to register before the first broadcast",
            self.timings.grace_period
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Registry stopped during grace period");
                return;
            }
            _ = tokio::time::sleep(self.timings.grace_period) => {}
        }
        self.finish_grace_period().await;

        let start = tokio::time::Instant::now() + self.timings.sweep_interval;
        let mut interval = tokio::time::interval_at(start, self.timings.sweep_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.sweep().await;
                }
            }
        }
        tracing::info!("Registry sweep loop stopped");
    }

    /// Spawn [`Registry::run`] as a background task
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(registry.run(cancel))
    }
}
