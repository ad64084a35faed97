//! Artifact + admin HTTP server.
//!
//! Serves the executor bundle and configuration blobs under a stable URI
//! that is advertised to the cluster manager as the framework's WebUI
//! URL, and exposes the administrative REST surface for declaring
//! clusters and nodes.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/static/*file` | Artifact files (executor bundle, templates) |
//! | GET | `/api/v1/clusters` | List cluster names |
//! | POST | `/api/v1/clusters/:name` | Create a cluster |
//! | GET | `/api/v1/clusters/:name` | Get a cluster with its nodes |
//! | POST | `/api/v1/clusters/:name/nodes` | Declare a node |
//! | GET | `/api/v1/clusters/:name/nodes` | List a cluster's nodes |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use riakgrid_state::NodeAsk;

use crate::core::SchedulerCore;
use crate::error::SchedulerError;

/// Shared state for the handlers.
#[derive(Clone)]
pub struct ApiState {
    pub core: Arc<SchedulerCore>,
    pub artifact_dir: PathBuf,
}

/// Response wrapper for a consistent API shape.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(err: &SchedulerError) -> impl IntoResponse {
    let status = match err {
        SchedulerError::UnknownCluster(_) => StatusCode::NOT_FOUND,
        SchedulerError::ClusterExists(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(err.to_string()),
        }),
    )
}

/// Build the artifact + admin router.
pub fn build_router(core: Arc<SchedulerCore>, artifact_dir: PathBuf) -> Router {
    let state = ApiState { core, artifact_dir };
    Router::new()
        .route("/static/*file", get(serve_artifact))
        .route("/api/v1/clusters", get(list_clusters))
        .route("/api/v1/clusters/:name", post(create_cluster).get(get_cluster))
        .route(
            "/api/v1/clusters/:name/nodes",
            post(create_node).get(list_nodes),
        )
        .with_state(state)
}

/// Bind and serve; returns the advertised base URL and the server task.
pub async fn serve(
    bind: SocketAddr,
    router: Router,
) -> std::io::Result<(String, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let local = listener.local_addr()?;
    let uri = format!("http://{local}");
    info!(%uri, "artifact server listening");

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            warn!(error = %e, "artifact server exited");
        }
    });
    Ok((uri, handle))
}

/// GET /static/*file
async fn serve_artifact(
    State(state): State<ApiState>,
    Path(file): Path<String>,
) -> impl IntoResponse {
    // The artifact directory is flat; reject traversal outright.
    if file.contains("..") {
        return StatusCode::NOT_FOUND.into_response();
    }
    let path = state.artifact_dir.join(file.trim_start_matches('/'));
    match tokio::fs::read(&path).await {
        Ok(bytes) => bytes.into_response(),
        Err(_) => {
            warn!(path = %path.display(), "artifact not found");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// GET /api/v1/clusters
async fn list_clusters(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.core.list_clusters().await)
}

/// POST /api/v1/clusters/:name
async fn create_cluster(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.core.add_cluster(&name).await {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok(name)).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// GET /api/v1/clusters/:name
async fn get_cluster(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.core.get_cluster(&name).await {
        Some(cluster) => ApiResponse::ok(cluster).into_response(),
        None => error_response(&SchedulerError::UnknownCluster(name)).into_response(),
    }
}

/// POST /api/v1/clusters/:name/nodes
///
/// Body is an optional `NodeAsk`; omitted fields take the defaults.
async fn create_node(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    ask: Option<Json<NodeAsk>>,
) -> impl IntoResponse {
    let ask = ask.map(|Json(a)| a).unwrap_or_default();
    match state.core.add_node(&name, ask).await {
        Ok(node) => (StatusCode::CREATED, ApiResponse::ok(node)).into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// GET /api/v1/clusters/:name/nodes
async fn list_nodes(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.core.get_cluster(&name).await {
        Some(cluster) => {
            let nodes: Vec<_> = cluster.nodes.into_values().collect();
            ApiResponse::ok(nodes).into_response()
        }
        None => error_response(&SchedulerError::UnknownCluster(name)).into_response(),
    }
}
