//! Peer Address Book
//!
//! Maps node ids to reachable addresses. Entries come from the registry's
//! member directory; unknown ids fall back to the configured template.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::id::NodeId;
use crate::network::protocol::MemberInfo;

/// Node id to address resolution
pub struct AddressBook {
    entries: RwLock<HashMap<NodeId, String>>,
    template: String,
}

impl AddressBook {
    /// Create an address book with a `{id}` fallback template
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            template: template.into(),
        }
    }

    /// Record a single address
    pub async fn insert(&self, node: NodeId, address: impl Into<String>) {
        self.entries.write().await.insert(node, address.into());
    }

    /// Merge addresses from a registry member listing
    pub async fn learn(&self, members: &[MemberInfo]) {
        if members.is_empty() {
            return;
        }
        let mut entries = self.entries.write().await;
        for member in members {
            if entries.get(&member.node) != Some(&member.address) {
                tracing::debug!("Address for node {} is {}", member.node, member.address);
                entries.insert(member.node, member.address.clone());
            }
        }
    }

    /// Address for a node
    pub async fn resolve(&self, node: NodeId) -> String {
        if let Some(address) = self.entries.read().await.get(&node) {
            return address.clone();
        }
        self.template.replace("{id}", &node.to_string())
    }
}

/// Turn a bare `host:port` into a URL for `path`
pub fn endpoint(address: &str, path: &str) -> String {
    let base = address.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{}{}", base, path)
    } else {
        format!("http://{}{}", base, path)
    }
}
