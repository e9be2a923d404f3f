//! HTTP API Module
//!
//! The registry and node HTTP surfaces.

mod node;
mod registry;

use axum::Router;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};

pub use node::{node_router, NodeServer};
pub use registry::{registry_router, RegistryServer};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub role: String,
}

/// Bind `bind_address` and serve `router` until `cancel` fires
pub(crate) async fn serve(
    name: &str,
    bind_address: &str,
    router: Router,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!("{} HTTP API listening on {}", name, bind_address);

    let app = router.layer(TraceLayer::new_for_http());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::Network(format!("{} HTTP server error: {}", name, e)))?;

    tracing::info!("{} HTTP API stopped", name);
    Ok(())
}
