//! Node HTTP Surface
//!
//! Pushes (`/check_nodes`, `/election`, `/coordinator`) are acknowledged at
//! once and handled on their own task, so a registry broadcast or a relay
//! hop never waits on a settle delay or on the rest of the ring.

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;

use crate::api::{serve, HealthResponse};
use crate::error::Result;
use crate::network::protocol::{
    Ack, CoordinatorAnnouncement, CoordinatorInfo, ElectionToken, MembershipUpdate,
};
use crate::node::NodeRuntime;

/// Build the node router
pub fn node_router(runtime: Arc<NodeRuntime>) -> Router {
    Router::new()
        .route("/coordinator_info", get(handle_coordinator_info))
        .route("/check_nodes", post(handle_check_nodes))
        .route("/election", post(handle_election))
        .route("/coordinator", post(handle_coordinator))
        .route("/status", get(handle_status))
        .route("/health", get(handle_health))
        .with_state(runtime)
}

/// Node HTTP server
pub struct NodeServer {
    bind_address: String,
    runtime: Arc<NodeRuntime>,
}

impl NodeServer {
    pub fn new(bind_address: impl Into<String>, runtime: Arc<NodeRuntime>) -> Self {
        Self {
            bind_address: bind_address.into(),
            runtime,
        }
    }

    /// Serve until `cancel` fires
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let router = node_router(Arc::clone(&self.runtime));
        serve("Node", &self.bind_address, router, cancel).await
    }
}

async fn handle_coordinator_info(State(runtime): State<Arc<NodeRuntime>>) -> impl IntoResponse {
    Json(CoordinatorInfo {
        coordinator: runtime.engine().coordinator().await,
    })
}

async fn handle_check_nodes(
    State(runtime): State<Arc<NodeRuntime>>,
    Json(update): Json<MembershipUpdate>,
) -> impl IntoResponse {
    tracing::debug!(
        "Node {} received membership push: {:?}",
        runtime.engine().node_id(),
        update.nodes
    );
    runtime.addresses().learn(&update.members).await;
    runtime.apply_membership(update.nodes);
    Json(Ack::new("membership update accepted"))
}

async fn handle_election(
    State(runtime): State<Arc<NodeRuntime>>,
    Json(token): Json<ElectionToken>,
) -> impl IntoResponse {
    let engine = Arc::clone(runtime.engine());
    tokio::spawn(async move {
        engine.receive_token(token).await;
    });
    Json(Ack::new("election token accepted"))
}

async fn handle_coordinator(
    State(runtime): State<Arc<NodeRuntime>>,
    Json(announcement): Json<CoordinatorAnnouncement>,
) -> impl IntoResponse {
    let engine = Arc::clone(runtime.engine());
    tokio::spawn(async move {
        engine.receive_announcement(announcement).await;
    });
    Json(Ack::new("coordinator announcement accepted"))
}

async fn handle_status(State(runtime): State<Arc<NodeRuntime>>) -> impl IntoResponse {
    Json(runtime.engine().status().await)
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        role: "node".to_string(),
    })
}
