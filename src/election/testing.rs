//! In-process cluster used by election tests.
//!
//! Calls go straight into the peer's engine, so a whole election runs to
//! completion inside the initiating call.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::election::engine::{ElectionEngine, ElectionTimings};
use crate::election::PeerTransport;
use crate::error::{Error, Result};
use crate::id::NodeId;
use crate::network::protocol::{CoordinatorAnnouncement, ElectionToken};

#[derive(Default)]
pub(crate) struct LocalNet {
    engines: Mutex<HashMap<NodeId, Arc<ElectionEngine>>>,
    down: Mutex<HashSet<NodeId>>,
    black_holes: Mutex<HashSet<NodeId>>,
    deliveries: Mutex<Vec<(NodeId, ElectionToken)>>,
    announcements: Mutex<Vec<(NodeId, CoordinatorAnnouncement)>>,
    queries: Mutex<Vec<NodeId>>,
}

impl LocalNet {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add_node(
        self: &Arc<Self>,
        raw: u64,
        timings: ElectionTimings,
    ) -> Arc<ElectionEngine> {
        let transport: Arc<dyn PeerTransport> = Arc::clone(self) as Arc<dyn PeerTransport>;
        let engine = Arc::new(ElectionEngine::new(NodeId::from(raw), transport, timings));
        self.engines
            .lock()
            .unwrap()
            .insert(NodeId::from(raw), Arc::clone(&engine));
        engine
    }

    /// Unreachable: every call to the node fails
    pub(crate) fn set_down(&self, raw: u64, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(NodeId::from(raw));
        } else {
            set.remove(&NodeId::from(raw));
        }
    }

    /// Lossy: tokens sent to the node are acknowledged and then lost
    pub(crate) fn set_black_hole(&self, raw: u64, lossy: bool) {
        let mut set = self.black_holes.lock().unwrap();
        if lossy {
            set.insert(NodeId::from(raw));
        } else {
            set.remove(&NodeId::from(raw));
        }
    }

    /// Tokens actually delivered, in delivery order
    pub(crate) fn token_deliveries(&self) -> Vec<(NodeId, ElectionToken)> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Announcements attempted, reachable or not
    pub(crate) fn announcements(&self) -> Vec<(NodeId, CoordinatorAnnouncement)> {
        self.announcements.lock().unwrap().clone()
    }

    /// Coordinator queries attempted
    pub(crate) fn queries(&self) -> Vec<NodeId> {
        self.queries.lock().unwrap().clone()
    }

    fn engine(&self, peer: NodeId) -> Result<Arc<ElectionEngine>> {
        if self.down.lock().unwrap().contains(&peer) {
            return Err(Error::ConnectionFailed {
                address: format!("local:{}", peer),
                reason: "node is down".into(),
            });
        }
        self.engines
            .lock()
            .unwrap()
            .get(&peer)
            .cloned()
            .ok_or_else(|| Error::ConnectionFailed {
                address: format!("local:{}", peer),
                reason: "no such node".into(),
            })
    }
}

#[async_trait]
impl PeerTransport for LocalNet {
    async fn forward_token(&self, peer: NodeId, token: ElectionToken) -> Result<()> {
        let engine = self.engine(peer)?;
        if self.black_holes.lock().unwrap().contains(&peer) {
            return Ok(());
        }
        self.deliveries.lock().unwrap().push((peer, token));
        engine.receive_token(token).await;
        Ok(())
    }

    async fn announce(&self, peer: NodeId, announcement: CoordinatorAnnouncement) -> Result<()> {
        self.announcements.lock().unwrap().push((peer, announcement));
        let engine = self.engine(peer)?;
        engine.receive_announcement(announcement).await;
        Ok(())
    }

    async fn query_coordinator(&self, peer: NodeId) -> Result<Option<NodeId>> {
        self.queries.lock().unwrap().push(peer);
        let engine = self.engine(peer)?;
        Ok(engine.coordinator().await)
    }
}
