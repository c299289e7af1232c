//! HTTP RPC surface of the coordinator

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    routing, Json, Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::common::{Error, Result};
use crate::coordinator::api::*;
use crate::coordinator::orchestrator::Orchestrator;

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared coordinator state for HTTP handlers.
#[derive(Clone)]
pub struct CoordState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn create_router(state: CoordState) -> Router {
    Router::new()
        .route("/login", routing::post(login))
        .route("/session", routing::get(session))
        .route("/departments", routing::get(list_departments))
        .route("/departments/:department/files", routing::get(list_files))
        .route("/files/create", routing::post(create_file))
        .route("/files/get", routing::post(get_file))
        .route("/files/update", routing::post(update_file))
        .route("/files/delete", routing::post(delete_file))
        .route("/nodes", routing::post(add_node))
        .route("/admin/employees", routing::post(add_employee))
        .route("/admin/sync", routing::post(trigger_sync))
        .route("/admin/status", routing::get(cluster_status))
        .route("/health", routing::get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Token from `Authorization: Bearer <token>`
fn bearer(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(Error::InvalidToken)
}

async fn login(
    State(state): State<CoordState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    let token = state.orchestrator.login(&req.username, &req.password)?;
    Ok(Json(TokenResponse { token }))
}

async fn session(State(state): State<CoordState>, headers: HeaderMap) -> Json<ValidResponse> {
    let valid = bearer(&headers)
        .map(|token| state.orchestrator.is_valid_token(token))
        .unwrap_or(false);
    Json(ValidResponse { valid })
}

async fn list_departments(
    State(state): State<CoordState>,
    headers: HeaderMap,
) -> Result<Json<DepartmentsResponse>> {
    let departments = state.orchestrator.list_departments(bearer(&headers)?)?;
    Ok(Json(DepartmentsResponse { departments }))
}

async fn list_files(
    State(state): State<CoordState>,
    Path(department): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FilesResponse>> {
    let files = state
        .orchestrator
        .list_department_files(bearer(&headers)?, &department)?;
    Ok(Json(FilesResponse { files }))
}

async fn create_file(
    State(state): State<CoordState>,
    headers: HeaderMap,
    Json(req): Json<FileTransferRequest>,
) -> Result<Json<AcceptedResponse>> {
    let accepted = state.orchestrator.create_file(
        bearer(&headers)?,
        &req.addr,
        req.port,
        &req.full_name,
    )?;
    Ok(Json(AcceptedResponse { accepted }))
}

async fn get_file(
    State(state): State<CoordState>,
    headers: HeaderMap,
    Json(req): Json<GetFileRequest>,
) -> Result<Json<AcceptedResponse>> {
    let accepted = state.orchestrator.get_file(
        bearer(&headers)?,
        &req.addr,
        req.port,
        &req.name,
        &req.department,
    )?;
    Ok(Json(AcceptedResponse { accepted }))
}

async fn update_file(
    State(state): State<CoordState>,
    headers: HeaderMap,
    Json(req): Json<FileTransferRequest>,
) -> Result<Json<AcceptedResponse>> {
    let accepted = state.orchestrator.update_file(
        bearer(&headers)?,
        &req.addr,
        req.port,
        &req.full_name,
    )?;
    Ok(Json(AcceptedResponse { accepted }))
}

async fn delete_file(
    State(state): State<CoordState>,
    headers: HeaderMap,
    Json(req): Json<DeleteFileRequest>,
) -> Result<Json<AcceptedResponse>> {
    let accepted = state
        .orchestrator
        .delete_file(bearer(&headers)?, &req.full_name)?;
    Ok(Json(AcceptedResponse { accepted }))
}

async fn add_node(
    State(state): State<CoordState>,
    Json(req): Json<AddNodeRequest>,
) -> Result<Json<OkResponse>> {
    state.orchestrator.add_node(&req.node_id, &req.url)?;
    Ok(Json(OkResponse { ok: true }))
}

async fn add_employee(
    State(state): State<CoordState>,
    headers: HeaderMap,
    Json(req): Json<AddEmployeeRequest>,
) -> Result<Json<OkResponse>> {
    let ok = state.orchestrator.add_employee(
        bearer(&headers)?,
        &req.username,
        &req.password,
        req.roles,
    )?;
    Ok(Json(OkResponse { ok }))
}

async fn trigger_sync(
    State(state): State<CoordState>,
    headers: HeaderMap,
) -> Result<Json<OkResponse>> {
    let ok = state.orchestrator.trigger_sync(bearer(&headers)?)?;
    Ok(Json(OkResponse { ok }))
}

async fn cluster_status(State(state): State<CoordState>) -> Json<ClusterStatus> {
    let orch = &state.orchestrator;
    let (files, tombstones) = orch.replicas().counts();
    Json(ClusterStatus {
        nodes: orch.nodes().snapshot(),
        files,
        tombstones,
        busy: orch.gate().len(),
    })
}

async fn health() -> Json<OkResponse> {
    Json(OkResponse { ok: true })
}
