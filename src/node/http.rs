//! HTTP RPC surface of a storage node
//!
//! Every file call runs to completion on the handler task: a create or get
//! holds the request open for the full dial-back stream.

use axum::{extract::State, routing, Json, Router};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::common::Result;
use crate::node::api::{NameRequest, NodeIdResponse, OkResponse, StatResponse, TransferRequest};
use crate::node::replication::Broadcaster;
use crate::node::storage::Storage;
use crate::node::transfer::TransferEndpoint;

/// RPC bodies are small JSON documents; file bytes never pass through HTTP
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared node state for HTTP handlers.
#[derive(Clone)]
pub struct NodeState {
    pub node_id: String,
    pub storage: Arc<Storage>,
    pub transfer: Arc<TransferEndpoint>,
    pub broadcaster: Arc<Broadcaster>,
}

pub fn create_router(state: NodeState) -> Router {
    Router::new()
        .route("/files/create", routing::post(create_file))
        .route("/files/get", routing::post(get_file))
        .route("/files/update", routing::post(update_file))
        .route("/files/delete", routing::post(delete_file))
        .route("/files/stat", routing::post(stat_file))
        .route("/sync", routing::post(sync_file))
        .route("/sync/delete", routing::post(sync_delete_file))
        .route("/ping", routing::get(ping))
        .route("/id", routing::get(node_id))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn create_file(
    State(state): State<NodeState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<OkResponse>> {
    let ok = state
        .transfer
        .receive_new(&req.addr, req.port, &req.name)
        .await?;
    Ok(Json(OkResponse { ok }))
}

async fn get_file(
    State(state): State<NodeState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<OkResponse>> {
    state.transfer.send(&req.addr, req.port, &req.name).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn update_file(
    State(state): State<NodeState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<OkResponse>> {
    let ok = state
        .transfer
        .receive_update(&req.addr, req.port, &req.name)
        .await?;
    Ok(Json(OkResponse { ok }))
}

async fn delete_file(
    State(state): State<NodeState>,
    Json(req): Json<NameRequest>,
) -> Result<Json<OkResponse>> {
    let ok = state.storage.delete(&req.name).await?;
    if ok {
        tracing::info!("Deleted {}", req.name);
    } else {
        tracing::info!("Delete of {}: not present", req.name);
    }
    Ok(Json(OkResponse { ok }))
}

async fn stat_file(
    State(state): State<NodeState>,
    Json(req): Json<NameRequest>,
) -> Result<Json<StatResponse>> {
    let digest = state.storage.digest(&req.name).await?;
    Ok(Json(StatResponse { digest }))
}

async fn sync_file(
    State(state): State<NodeState>,
    Json(req): Json<NameRequest>,
) -> Result<Json<OkResponse>> {
    state.broadcaster.broadcast(&req.name).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn sync_delete_file(
    State(state): State<NodeState>,
    Json(req): Json<NameRequest>,
) -> Result<Json<OkResponse>> {
    let removed = state.storage.delete(&req.name).await?;
    tracing::info!("Purge of {}: removed={}", req.name, removed);
    Ok(Json(OkResponse { ok: true }))
}

async fn ping(State(state): State<NodeState>) -> Json<OkResponse> {
    tracing::debug!("Node {}: ping", state.node_id);
    Json(OkResponse { ok: true })
}

async fn node_id(State(state): State<NodeState>) -> Json<NodeIdResponse> {
    Json(NodeIdResponse {
        node_id: state.node_id.clone(),
    })
}
