//! Operator HTTP routes
//!
//! Registry inspection, DDL, reshard submission, migration control, and
//! the query surface. Every handler goes through the controller; errors
//! come back as `{error, code}` with the status the code maps to.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::control::{ControlError, Controller, ReshardRequest};
use crate::engine::Row;
use crate::migrate::MigrationStatus;
use crate::registry::{RegistrySnapshot, ShardId};
use crate::routing::Predicate;
use crate::schema::DdlChange;
use crate::sync::DdlReport;

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub registry_version: u64,
    pub schema_version: u64,
}

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MigrationsResponse {
    pub migrations: Vec<MigrationStatus>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub allow_degraded: bool,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub rows: Vec<Row>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub key: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: u64,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type Rejection = (StatusCode, Json<ErrorResponse>);

fn reject(err: ControlError) -> Rejection {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
}

fn bad_id(raw: &str) -> Rejection {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: format!("'{}' is not a job id", raw),
            code: "KSPAN_BAD_REQUEST".to_string(),
        }),
    )
}

// ==================
// Routes
// ==================

/// All operator routes.
pub fn routes(controller: Arc<Controller>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Registry
        .route("/registry", get(registry_handler))
        .route("/shards/:id/detach", post(detach_handler))
        .route("/shards/:id/catch_up", post(catch_up_handler))
        // Schema
        .route("/ddl", post(ddl_handler))
        // Migrations
        .route("/reshard", post(reshard_handler))
        .route("/migrations", get(migrations_handler))
        .route("/migrations/:id", get(migration_handler))
        .route("/migrations/:id/cancel", post(cancel_handler))
        // Query surface
        .route("/query", post(query_handler))
        .route("/rows", post(write_handler))
        .route("/rows/:key", delete(delete_handler))
        .with_state(controller)
}

// ==================
// Handlers
// ==================

async fn health_handler(State(controller): State<Arc<Controller>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        registry_version: controller.registry().version(),
        schema_version: controller.synchronizer().catalog_version(),
    })
}

async fn registry_handler(
    State(controller): State<Arc<Controller>>,
) -> Json<RegistrySnapshot> {
    Json((*controller.registry().snapshot()).clone())
}

async fn detach_handler(
    State(controller): State<Arc<Controller>>,
    Path(id): Path<String>,
) -> Result<Json<VersionResponse>, Rejection> {
    let version = controller
        .detach_shard(&ShardId::new(id))
        .map_err(reject)?;
    Ok(Json(VersionResponse { version }))
}

async fn catch_up_handler(
    State(controller): State<Arc<Controller>>,
    Path(id): Path<String>,
) -> Result<Json<VersionResponse>, Rejection> {
    let version = controller.catch_up(&ShardId::new(id)).map_err(reject)?;
    Ok(Json(VersionResponse { version }))
}

async fn ddl_handler(
    State(controller): State<Arc<Controller>>,
    Json(change): Json<DdlChange>,
) -> Result<Json<DdlReport>, Rejection> {
    controller.ddl(change).map(Json).map_err(reject)
}

async fn reshard_handler(
    State(controller): State<Arc<Controller>>,
    Json(request): Json<ReshardRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), Rejection> {
    let job = controller.reshard(request).map_err(reject)?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job })))
}

async fn migrations_handler(
    State(controller): State<Arc<Controller>>,
) -> Json<MigrationsResponse> {
    let migrations = controller.migrations();
    let total = migrations.len();
    Json(MigrationsResponse { migrations, total })
}

async fn migration_handler(
    State(controller): State<Arc<Controller>>,
    Path(id): Path<String>,
) -> Result<Json<MigrationStatus>, Rejection> {
    let id: Uuid = id.parse().map_err(|_| bad_id(&id))?;
    controller.migration_status(id).map(Json).map_err(reject)
}

async fn cancel_handler(
    State(controller): State<Arc<Controller>>,
    Path(id): Path<String>,
) -> Result<Json<MigrationStatus>, Rejection> {
    let id: Uuid = id.parse().map_err(|_| bad_id(&id))?;
    controller.cancel_migration(id).map(Json).map_err(reject)
}

async fn query_handler(
    State(controller): State<Arc<Controller>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, Rejection> {
    let rows = controller
        .read(&request.predicates, request.allow_degraded)
        .map_err(reject)?;
    let count = rows.len();
    Ok(Json(QueryResponse { rows, count }))
}

async fn write_handler(
    State(controller): State<Arc<Controller>>,
    Json(request): Json<WriteRequest>,
) -> Result<StatusCode, Rejection> {
    controller
        .write(Row::new(request.key, request.fields))
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_handler(
    State(controller): State<Arc<Controller>>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>, Rejection> {
    let deleted = controller.delete(&key).map_err(reject)?;
    Ok(Json(DeleteResponse { deleted }))
}
