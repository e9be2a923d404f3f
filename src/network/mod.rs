//! Network Module
//!
//! JSON-over-HTTP plumbing between nodes and the registry.

pub mod address;
pub mod client;
pub mod protocol;

pub use address::AddressBook;
pub use client::{HttpClient, HttpNotifier, HttpPeerTransport, RegistryClient};
pub use protocol::{
    CoordinatorAnnouncement, CoordinatorInfo, ElectionToken, MemberInfo, MembershipUpdate,
};
