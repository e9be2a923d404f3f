//! Node Identity
//!
//! Nodes are named by small positive integers. The integer order is the
//! election tie-break and the ring traversal order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Globally unique node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Create a node id, rejecting zero
    pub fn new(value: u64) -> Result<Self> {
        if value == 0 {
            return Err(Error::Config("node id must be a positive integer".into()));
        }
        Ok(Self(value))
    }

    /// Raw integer value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: u64 = s
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid node id '{}': {}", s, e)))?;
        Self::new(value)
    }
}
