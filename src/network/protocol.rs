//! Wire Protocol
//!
//! JSON bodies exchanged between nodes and the registry over HTTP.

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

// ============ Registry surface ============

/// `POST /register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub node: NodeId,
    pub address: String,
}

/// `POST /heartbeat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub node: NodeId,
}

/// Heartbeat acknowledgement. `known == false` tells the node to re-register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    #[serde(default = "default_known")]
    pub known: bool,
}

fn default_known() -> bool {
    true
}

/// One registry entry as seen from outside
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub node: NodeId,
    pub address: String,
    #[serde(default)]
    pub registered_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub last_seen_ms_ago: u64,
}

// ============ Node surface ============

/// `POST /check_nodes`, pushed by the registry when membership changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipUpdate {
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub members: Vec<MemberInfo>,
}

/// `POST /election`, the token relayed around the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionToken {
    pub initiator: NodeId,
    pub max_id: NodeId,
}

impl ElectionToken {
    /// Fresh token for an election started by `initiator`
    pub fn new(initiator: NodeId) -> Self {
        Self {
            initiator,
            max_id: initiator,
        }
    }

    /// Token after `holder` has seen it
    pub fn observed_by(self, holder: NodeId) -> Self {
        Self {
            initiator: self.initiator,
            max_id: self.max_id.max(holder),
        }
    }
}

/// `POST /coordinator`, the election result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorAnnouncement {
    pub coordinator: NodeId,
    /// Re-broadcasts this announcement has already been through
    #[serde(default)]
    pub hops: u32,
}

impl CoordinatorAnnouncement {
    pub fn new(coordinator: NodeId) -> Self {
        Self {
            coordinator,
            hops: 0,
        }
    }

    pub fn forwarded(self) -> Self {
        Self {
            coordinator: self.coordinator,
            hops: self.hops.saturating_add(1),
        }
    }
}

/// `GET /coordinator_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorInfo {
    pub coordinator: Option<NodeId>,
}

/// Plain acknowledgement body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    pub message: String,
}

impl Ack {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_tracks_maximum() {
        let token = ElectionToken::new(NodeId::from(2))
            .observed_by(NodeId::from(5))
            .observed_by(NodeId::from(3));
        assert_eq!(token.initiator, NodeId::from(2));
        assert_eq!(token.max_id, NodeId::from(5));
    }

    #[test]
    fn test_wire_shapes() {
        let token: ElectionToken = serde_json::from_str(r#"{"initiator":1,"max_id":3}"#).unwrap();
        assert_eq!(token.max_id, NodeId::from(3));

        // Older senders omit hops
        let ann: CoordinatorAnnouncement = serde_json::from_str(r#"{"coordinator":3}"#).unwrap();
        assert_eq!(ann.hops, 0);
        assert_eq!(ann.forwarded().hops, 1);

        let info = serde_json::to_string(&CoordinatorInfo { coordinator: None }).unwrap();
        assert_eq!(info, r#"{"coordinator":null}"#);

        // Registry push without address directory
        let update: MembershipUpdate = serde_json::from_str(r#"{"nodes":[1,2]}"#).unwrap();
        assert!(update.members.is_empty());

        let hb: HeartbeatResponse = serde_json::from_str("{}").unwrap();
        assert!(hb.known);
    }
}
