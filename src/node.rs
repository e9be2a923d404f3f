//! Node Runtime
//!
//! Brings a node into the cluster and keeps it there: registration, the
//! heartbeat loop, the periodic membership re-fetch and the coordinator
//! self-check that follows every heartbeat.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::election::ElectionEngine;
use crate::error::Result;
use crate::id::NodeId;
use crate::network::address::AddressBook;
use crate::network::protocol::MemberInfo;

/// Calls a node makes on the registry
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Register (or refresh) and get the live membership
    async fn register(&self, node: NodeId, address: &str) -> Result<Vec<NodeId>>;

    /// Send a heartbeat; `false` means the registry does not know this node
    async fn heartbeat(&self, node: NodeId) -> Result<bool>;

    async fn list_nodes(&self) -> Result<Vec<NodeId>>;

    async fn members(&self) -> Result<Vec<MemberInfo>>;
}

/// What one heartbeat cycle did
#[derive(Debug, Default)]
pub struct HeartbeatReport {
    /// The registry heard from us, by heartbeat or by registration
    pub reached_registry: bool,
    /// This cycle (re-)registered the node
    pub registered: bool,
    /// Membership-change handling started by this cycle
    pub membership_change: Option<JoinHandle<bool>>,
    /// Coordinator self-check, resolving to whether it started an election
    pub self_check: Option<JoinHandle<bool>>,
}

/// Long-running node process state
pub struct NodeRuntime {
    node_id: NodeId,
    advertise_address: String,
    engine: Arc<ElectionEngine>,
    registry: Arc<dyn RegistryApi>,
    addresses: Arc<AddressBook>,
    heartbeat_interval: Duration,
    registered: AtomicBool,
}

impl NodeRuntime {
    pub fn new(
        engine: Arc<ElectionEngine>,
        registry: Arc<dyn RegistryApi>,
        addresses: Arc<AddressBook>,
        advertise_address: String,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            node_id: engine.node_id(),
            advertise_address,
            engine,
            registry,
            addresses,
            heartbeat_interval,
            registered: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &Arc<ElectionEngine> {
        &self.engine
    }

    pub fn addresses(&self) -> &Arc<AddressBook> {
        &self.addresses
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Register with the registry and hand the returned membership to the engine
    pub async fn register(&self) -> Result<(Vec<NodeId>, JoinHandle<bool>)> {
        self.addresses
            .insert(self.node_id, self.advertise_address.as_str())
            .await;
        let members = self
            .registry
            .register(self.node_id, &self.advertise_address)
            .await?;
        self.registered.store(true, Ordering::SeqCst);
        tracing::info!("Node {} registered with nodes: {:?}", self.node_id, members);

        self.refresh_addresses().await;
        let handle = self.apply_membership(members.clone());
        Ok((members, handle))
    }

    /// Run the membership-change path on its own task
    pub fn apply_membership(&self, nodes: Vec<NodeId>) -> JoinHandle<bool> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move { engine.handle_membership_change(nodes).await })
    }

    async fn refresh_addresses(&self) {
        match self.registry.members().await {
            Ok(members) => self.addresses.learn(&members).await,
            Err(e) => tracing::warn!("Could not fetch member addresses from registry: {}", e),
        }
    }

    /// One heartbeat cycle: heartbeat (or register), re-fetch membership,
    /// then the coordinator self-check.
    pub async fn heartbeat_once(&self) -> HeartbeatReport {
        let mut report = HeartbeatReport::default();

        let needs_registration = if self.is_registered() {
            match self.registry.heartbeat(self.node_id).await {
                Ok(true) => {
                    report.reached_registry = true;
                    tracing::debug!(
                        "Sent heartbeat from node {}, current coordinator is {:?} among {}",
                        self.node_id,
                        self.engine.coordinator().await,
                        self.engine.members().await
                    );
                    false
                }
                Ok(false) => {
                    tracing::warn!("Registry does not know node {}, re-registering", self.node_id);
                    self.registered.store(false, Ordering::SeqCst);
                    true
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        "Registry unreachable for heartbeat from node {}: {}",
                        self.node_id,
                        e
                    );
                    false
                }
                Err(e) => {
                    tracing::error!("Error sending heartbeat from node {}: {}", self.node_id, e);
                    false
                }
            }
        } else {
            true
        };

        if needs_registration {
            match self.register().await {
                Ok((_, handle)) => {
                    report.reached_registry = true;
                    report.registered = true;
                    report.membership_change = Some(handle);
                }
                Err(e) => {
                    tracing::warn!("Error registering node {}: {}", self.node_id, e);
                }
            }
        } else if report.reached_registry {
            match self.registry.list_nodes().await {
                Ok(nodes) => {
                    if !self.engine.knows_membership(&nodes).await {
                        self.refresh_addresses().await;
                        report.membership_change = Some(self.apply_membership(nodes));
                    }
                }
                Err(e) => {
                    tracing::warn!("Error fetching active nodes from registry: {}", e);
                }
            }
        }

        report.self_check = Some(self.spawn_self_check());
        report
    }

    /// Spawn the coordinator self-check off the heartbeat loop
    pub fn spawn_self_check(&self) -> JoinHandle<bool> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move { engine.self_check().await })
    }

    /// Register, then heartbeat until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!("Node {} starting, advertising {}", self.node_id, self.advertise_address);
        if let Err(e) = self.register().await {
            tracing::warn!(
                "Error registering node {}: {} (retrying on next heartbeat)",
                self.node_id,
                e
            );
        }

        let start = tokio::time::Instant::now() + self.heartbeat_interval;
        let mut interval = tokio::time::interval_at(start, self.heartbeat_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.heartbeat_once().await;
                }
            }
        }
        tracing::info!("Node {} heartbeat loop stopped", self.node_id);
    }

    /// Spawn [`NodeRuntime::run`] as a background task
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let runtime = Arc::clone(self);
        tokio::spawn(runtime.run(cancel))
    }
}
