//! WolfRing Configuration
//!
//! Configuration structures for the membership registry and for the
//! election nodes. Both roles read the same file; each uses its sections.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::id::NodeId;

/// Main WolfRing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WolfRingConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Election timing configuration
    #[serde(default)]
    pub election: ElectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node identifier
    #[serde(default = "default_node_id")]
    pub id: NodeId,

    /// Address the node API binds to
    #[serde(default = "default_node_bind_address")]
    pub bind_address: String,

    /// Address other processes use to reach this node
    #[serde(default)]
    pub advertise_address: Option<String>,

    /// Fallback address pattern for peers, `{id}` is replaced by the node id
    #[serde(default = "default_peer_address_template")]
    pub peer_address_template: String,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// URL nodes use to reach the registry
    #[serde(default = "default_registry_url")]
    pub url: String,

    /// Address the registry API binds to
    #[serde(default = "default_registry_bind_address")]
    pub bind_address: String,

    /// Delay before the first membership broadcast
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Interval between liveness sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Heartbeat age after which a node is evicted
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,
}

/// Election and heartbeat timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Pause after a membership change before acting on it
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    /// Interval between heartbeats to the registry
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Age after which an unfinished election is considered stalled
    #[serde(default = "default_election_timeout_secs")]
    pub election_timeout_secs: u64,

    /// Per-request timeout for peer and registry calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// TCP connect timeout for peer and registry calls
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How many times a changed announcement may be re-broadcast
    #[serde(default = "default_max_announce_hops")]
    pub max_announce_hops: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_node_id() -> NodeId {
    NodeId::from(1)
}

fn default_node_bind_address() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_peer_address_template() -> String {
    "node{id}:80".to_string()
}

fn default_registry_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_registry_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_grace_period_secs() -> u64 {
    15
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_liveness_timeout_secs() -> u64 {
    30
}

fn default_settle_delay_secs() -> u64 {
    10
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_election_timeout_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_max_announce_hops() -> u32 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            bind_address: default_node_bind_address(),
            advertise_address: None,
            peer_address_template: default_peer_address_template(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            bind_address: default_registry_bind_address(),
            grace_period_secs: default_grace_period_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
        }
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: default_settle_delay_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            election_timeout_secs: default_election_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_announce_hops: default_max_announce_hops(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WolfRingConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfRingConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, apply environment overrides and validate
    pub fn load(path: &Path) -> crate::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::debug!("No configuration file at {:?}, using defaults", path);
            WolfRingConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("NODE_ID") {
            self.node.id = id.parse()?;
        }
        if let Some(bind) = lookup("NODE_BIND_ADDRESS") {
            self.node.bind_address = bind;
        }
        if let Some(address) = lookup("NODE_ADDRESS") {
            self.node.advertise_address = Some(address);
        }
        if let Some(url) = lookup("REGISTRY_URL") {
            self.registry.url = url;
        }
        if let Some(bind) = lookup("REGISTRY_BIND_ADDRESS") {
            self.registry.bind_address = bind;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node.id.get() == 0 {
            return Err(crate::Error::Config("node.id must be a positive integer".into()));
        }

        if self.node.bind_address.is_empty() {
            return Err(crate::Error::Config("node.bind_address cannot be empty".into()));
        }

        if !self.node.peer_address_template.contains("{id}") {
            return Err(crate::Error::Config(
                "node.peer_address_template must contain {id}".into(),
            ));
        }

        if self.registry.url.is_empty() {
            return Err(crate::Error::Config("registry.url cannot be empty".into()));
        }

        if self.registry.sweep_interval_secs == 0 || self.registry.liveness_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "registry sweep interval and liveness timeout must be non-zero".into(),
            ));
        }

        if self.election.heartbeat_interval_secs == 0 {
            return Err(crate::Error::Config(
                "election.heartbeat_interval_secs must be non-zero".into(),
            ));
        }

        if self.election.election_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "election.election_timeout_secs must be non-zero".into(),
            ));
        }

        if self.registry.liveness_timeout_secs < self.election.heartbeat_interval_secs {
            tracing::warn!(
                "Liveness timeout ({}s) is shorter than the heartbeat interval ({}s); \
                 healthy nodes may be evicted",
                self.registry.liveness_timeout_secs,
                self.election.heartbeat_interval_secs
            );
        }

        Ok(())
    }

    /// Get the advertised address (or bind address if not set)
    pub fn advertise_address(&self) -> &str {
        self.node
            .advertise_address
            .as_deref()
            .unwrap_or(&self.node.bind_address)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.registry.grace_period_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.registry.sweep_interval_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.registry.liveness_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.election.settle_delay_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.election.heartbeat_interval_secs)
    }

    pub fn election_timeout(&self) -> Duration {
        Duration::from_secs(self.election.election_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.election.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.election.connect_timeout_secs)
    }
}
