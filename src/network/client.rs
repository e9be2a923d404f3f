//! HTTP Clients
//!
//! reqwest implementations of the transport seams: registry calls made by
//! nodes, peer calls made during elections and membership pushes made by
//! the registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::election::PeerTransport;
use crate::error::{Error, Result};
use crate::id::NodeId;
use crate::network::address::{endpoint, AddressBook};
use crate::network::protocol::{
    CoordinatorAnnouncement, CoordinatorInfo, ElectionToken, HeartbeatRequest, HeartbeatResponse,
    MemberInfo, MembershipUpdate, RegisterRequest,
};
use crate::node::RegistryApi;
use crate::registry::MembershipNotifier;

/// Shared JSON-over-HTTP client
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client with connect and whole-request timeouts
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// POST a JSON body, failing on non-2xx
    pub async fn post<B>(&self, address: &str, path: &str, body: &B) -> Result<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(endpoint(address, path))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::from_http(address, e))?;
        response
            .error_for_status()
            .map_err(|e| Error::from_http(address, e))
    }

    /// POST a JSON body and decode the JSON reply
    pub async fn post_json<B, T>(&self, address: &str, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.post(address, path, body).await?;
        response.json().await.map_err(|e| Error::from_http(address, e))
    }

    /// GET and decode the JSON reply
    pub async fn get_json<T>(&self, address: &str, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .get(endpoint(address, path))
            .send()
            .await
            .map_err(|e| Error::from_http(address, e))?
            .error_for_status()
            .map_err(|e| Error::from_http(address, e))?;
        response.json().await.map_err(|e| Error::from_http(address, e))
    }
}

/// Node-side client for the registry
pub struct RegistryClient {
    http: HttpClient,
    url: String,
}

impl RegistryClient {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RegistryApi for RegistryClient {
    async fn register(&self, node: NodeId, address: &str) -> Result<Vec<NodeId>> {
        let request = RegisterRequest {
            node,
            address: address.to_string(),
        };
        self.http.post_json(&self.url, "/register", &request).await
    }

    async fn heartbeat(&self, node: NodeId) -> Result<bool> {
        let response: HeartbeatResponse = self
            .http
            .post_json(&self.url, "/heartbeat", &HeartbeatRequest { node })
            .await?;
        Ok(response.known)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeId>> {
        self.http.get_json(&self.url, "/nodes").await
    }

    async fn members(&self) -> Result<Vec<MemberInfo>> {
        self.http.get_json(&self.url, "/members").await
    }
}

/// Peer calls addressed through the address book
pub struct HttpPeerTransport {
    http: HttpClient,
    addresses: Arc<AddressBook>,
}

impl HttpPeerTransport {
    pub fn new(http: HttpClient, addresses: Arc<AddressBook>) -> Self {
        Self { http, addresses }
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn forward_token(&self, peer: NodeId, token: ElectionToken) -> Result<()> {
        let address = self.addresses.resolve(peer).await;
        self.http.post(&address, "/election", &token).await?;
        Ok(())
    }

    async fn announce(&self, peer: NodeId, announcement: CoordinatorAnnouncement) -> Result<()> {
        let address = self.addresses.resolve(peer).await;
        self.http.post(&address, "/coordinator", &announcement).await?;
        Ok(())
    }

    async fn query_coordinator(&self, peer: NodeId) -> Result<Option<NodeId>> {
        let address = self.addresses.resolve(peer).await;
        let info: CoordinatorInfo = self.http.get_json(&address, "/coordinator_info").await?;
        Ok(info.coordinator)
    }
}

/// Registry-side membership pushes
pub struct HttpNotifier {
    http: HttpClient,
}

impl HttpNotifier {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MembershipNotifier for HttpNotifier {
    async fn notify(&self, address: &str, update: &MembershipUpdate) -> Result<()> {
        self.http.post(address, "/check_nodes", update).await?;
        Ok(())
    }
}
