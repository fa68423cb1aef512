//! Request handlers for the `/v1` API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::middleware::RequestContext;
use super::responses::ApiError;
use crate::bridge::SampleBridge;
use crate::core::Clock;
use crate::dispatch::Dispatcher;
use crate::model::{
    Difficulty, FieldDef, JsonMap, PolicyConfig, Queue, SampleRef, Schema, SchemaVersion,
};
use crate::store::Store;
use crate::tenant::Permission;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<Dispatcher>,
    pub bridge: Arc<dyn SampleBridge>,
    pub clock: Arc<dyn Clock>,
}

/// Resolve a caller-supplied labeler reference: internal id first, then
/// the tenant-scoped external id.
async fn resolve_labeler(
    store: &dyn Store,
    reference: &str,
    tenant_id: &str,
) -> Result<crate::model::Labeler, ApiError> {
    match store.get_labeler(reference, tenant_id).await {
        Ok(labeler) => Ok(labeler),
        Err(_) => store
            .get_labeler_by_external_id(reference, tenant_id)
            .await
            .map_err(|_| ApiError::not_found(reference)),
    }
}

// ============================================================================
// Schemas
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSchemaRequest {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

pub async fn create_schema(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateSchemaRequest>,
) -> Result<(StatusCode, Json<Schema>), ApiError> {
    ctx.require(Permission::ManageQueue)?;

    let schema = Schema::new(&ctx.tenant_id, body.name, body.fields, state.clock.now());
    let schema = state.store.put_schema(schema).await?;
    Ok((StatusCode::CREATED, Json(schema)))
}

pub async fn get_schema(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Json<Schema>, ApiError> {
    let schema = state.store.get_schema(&id, &ctx.tenant_id).await?;
    Ok(Json(schema))
}

// ============================================================================
// Queues
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateQueueRequest {
    pub name: String,
    pub schema_id: String,
    /// Forge module the queue draws samples from; mandatory.
    #[serde(default)]
    pub component_module: Option<String>,
    #[serde(default)]
    pub policy: Option<PolicyConfig>,
    #[serde(default)]
    pub labels_per_sample: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    #[serde(flatten)]
    pub queue: Queue,
    pub stats: crate::store::QueueStats,
}

pub async fn create_queue(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateQueueRequest>,
) -> Result<(StatusCode, Json<Queue>), ApiError> {
    ctx.require(Permission::ManageQueue)?;

    let component_module = body
        .component_module
        .filter(|module| !module.is_empty())
        .ok_or_else(ApiError::component_module_required)?;

    let schema = state.store.get_schema(&body.schema_id, &ctx.tenant_id).await?;

    // The queue id is fixed up front so version 1 can reference it.
    let queue_id = crate::model::new_id();
    let version = SchemaVersion::new(&queue_id, &ctx.tenant_id, 1, schema.fields.clone());
    let version = state.store.put_schema_version(version).await?;

    let mut queue = Queue::new(
        &ctx.tenant_id,
        body.name,
        &version.id,
        component_module,
        state.clock.now(),
    );
    queue.id = queue_id;
    if let Some(policy) = body.policy {
        queue.policy = policy;
    }
    if let Some(k) = body.labels_per_sample {
        queue.labels_per_sample = k;
        // Keep the default redundancy policy in step with the target.
        if body_policy_is_default(&queue.policy) {
            queue.policy = PolicyConfig::Redundancy {
                labels_per_sample: k,
                allow_same_labeler: false,
            };
        }
    }
    if let Some(timeout) = body.timeout_seconds {
        queue.timeout_seconds = timeout;
    }

    let queue = state.store.put_queue(queue).await?;
    Ok((StatusCode::CREATED, Json(queue)))
}

fn body_policy_is_default(policy: &PolicyConfig) -> bool {
    *policy == PolicyConfig::default()
}

pub async fn get_queue(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Json<QueueResponse>, ApiError> {
    let queue = state.store.get_queue(&id, &ctx.tenant_id).await?;
    let stats = state.store.queue_stats(&id, &ctx.tenant_id).await?;
    Ok(Json(QueueResponse { queue, stats }))
}

// ============================================================================
// Samples
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterSampleRequest {
    pub queue_id: String,
    pub forge_sample_id: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub metadata: JsonMap,
}

pub async fn register_sample(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<RegisterSampleRequest>,
) -> Result<(StatusCode, Json<SampleRef>), ApiError> {
    ctx.require(Permission::RequestAssignment)?;

    // The queue must exist in this tenant before we touch Forge.
    state.store.get_queue(&body.queue_id, &ctx.tenant_id).await?;

    if !state.bridge.verify_exists(&body.forge_sample_id).await? {
        return Err(ApiError::not_found(body.forge_sample_id));
    }

    let mut sample = SampleRef::new(&body.queue_id, &ctx.tenant_id, body.forge_sample_id);
    sample.difficulty = body.difficulty;
    sample.domain = body.domain;
    sample.metadata = body.metadata;

    let sample = state.store.put_sample(sample).await?;
    Ok((StatusCode::CREATED, Json(sample)))
}

pub async fn get_sample(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Json<SampleRef>, ApiError> {
    let sample = state.store.get_sample(&id, &ctx.tenant_id).await?;
    Ok(Json(sample))
}

// ============================================================================
// Assignments & labels
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct NextAssignmentQuery {
    pub user_id: String,
}

pub async fn next_assignment(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(queue_id): Path<String>,
    Query(query): Query<NextAssignmentQuery>,
) -> Result<Json<crate::model::Assignment>, ApiError> {
    ctx.require(Permission::RequestAssignment)?;

    let labeler = resolve_labeler(state.store.as_ref(), &query.user_id, &ctx.tenant_id).await?;
    let assignment = state
        .dispatcher
        .fetch_next(&queue_id, &labeler.id, &ctx.tenant_id)
        .await?;
    Ok(Json(assignment))
}

#[derive(Debug, Deserialize)]
pub struct SubmitLabelRequest {
    pub assignment_id: String,
    /// Labeler id or external id; falls back to the `X-User-Id` header.
    #[serde(default)]
    pub user_id: Option<String>,
    pub payload: JsonMap,
}

pub async fn submit_label(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<SubmitLabelRequest>,
) -> Result<(StatusCode, Json<crate::model::Label>), ApiError> {
    ctx.require(Permission::SubmitLabel)?;

    let reference = body
        .user_id
        .or_else(|| ctx.user_id.clone())
        .ok_or_else(|| {
            ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "user_id_required")
        })?;
    let labeler = resolve_labeler(state.store.as_ref(), &reference, &ctx.tenant_id).await?;

    let label = state
        .dispatcher
        .submit_label(&body.assignment_id, &labeler.id, &ctx.tenant_id, body.payload)
        .await?;
    Ok((StatusCode::CREATED, Json(label)))
}

// ============================================================================
// Datasets
// ============================================================================

pub async fn get_dataset(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Json<crate::model::Dataset>, ApiError> {
    let dataset = state.store.get_dataset(&id, &ctx.tenant_id).await?;
    Ok(Json(dataset))
}

pub async fn get_dataset_slice(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path((id, slice_name)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dataset = state.store.get_dataset(&id, &ctx.tenant_id).await?;
    let slice = dataset
        .slice(&slice_name)
        .ok_or_else(|| ApiError::not_found(format!("{id}/slices/{slice_name}")))?;
    Ok(Json(json!({
        "dataset_id": &dataset.id,
        "name": slice_name,
        "sample_ids": slice,
    })))
}

// ============================================================================
// Health
// ============================================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "time": state.clock.now(),
    }))
}
