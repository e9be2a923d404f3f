//! Registry HTTP Surface

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
use crate::network::protocol::{HeartbeatRequest, HeartbeatResponse, RegisterRequest};
use crate::registry::Registry;

/// Build the registry router
pub fn registry_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/register", post(handle_register))
        .route("/heartbeat", post(handle_heartbeat))
        .route("/nodes", get(handle_nodes))
        .route("/members", get(handle_members))
        .route("/health", get(handle_health))
        .with_state(registry)
}

/// Registry HTTP server
pub struct RegistryServer {
    bind_address: String,
    registry: Arc<Registry>,
}

impl RegistryServer {
    pub fn new(bind_address: impl Into<String>, registry: Arc<Registry>) -> Self {
        Self {
            bind_address: bind_address.into(),
            registry,
        }
    }

    /// Serve until `cancel` fires
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let router = registry_router(Arc::clone(&self.registry));
        serve("Registry", &self.bind_address, router, cancel).await
    }
}

async fn handle_register(
    State(registry): State<Arc<Registry>>,
    Json(request): Json<RegisterRequest>,
) -> impl IntoResponse {
    // The new-node broadcast runs detached
    let outcome = registry.register(request.node, request.address).await;
    Json(outcome.registration.members)
}

async fn handle_heartbeat(
    State(registry): State<Arc<Registry>>,
    Json(request): Json<HeartbeatRequest>,
) -> impl IntoResponse {
    let known = registry.heartbeat(request.node).await;
    Json(HeartbeatResponse { known })
}

async fn handle_nodes(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    Json(registry.list_nodes().await)
}

async fn handle_members(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    Json(registry.members().await)
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        role: "registry".to_string(),
    })
}
