//! REST API handlers.
//!
//! Each handler reads/writes via `StateStore`, keeps the scheduler in step
//! with the stored config and returns JSON responses.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info};

use vigil_scheduler::SchedulerResult;
use vigil_state::*;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn internal_error(e: impl std::fmt::Display) -> axum::response::Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

fn not_found() -> axum::response::Response {
    error_response("endpoint not found", StatusCode::NOT_FOUND).into_response()
}

/// Mirror an endpoint's active flag and interval into the scheduler.
async fn sync_schedule(state: &ApiState, endpoint: &EndpointConfig) -> SchedulerResult<()> {
    if endpoint.is_active {
        state
            .scheduler
            .add_or_replace(&endpoint.id, endpoint.interval())
            .await
    } else {
        state.scheduler.remove(&endpoint.id).await;
        Ok(())
    }
}

// ── Requests ───────────────────────────────────────────────────

/// POST body; the server assigns `id` and `created_at`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEndpoint {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub alert_email: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    5
}

fn default_active() -> bool {
    true
}

impl NewEndpoint {
    fn into_config(self) -> EndpointConfig {
        EndpointConfig {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name,
            url: self.url,
            method: self.method.to_ascii_uppercase(),
            interval_secs: self.interval_secs,
            timeout_secs: self.timeout_secs,
            headers: self.headers,
            body: self.body,
            is_active: self.is_active,
            alert_email: self.alert_email,
            webhook_url: self.webhook_url,
            created_at: epoch_millis(),
        }
    }
}

/// PUT body. Absent fields are left alone; for the optional fields an
/// explicit `null` clears the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    #[serde(default, deserialize_with = "present")]
    pub headers: Option<Option<HashMap<String, String>>>,
    #[serde(default, deserialize_with = "present")]
    pub body: Option<Option<serde_json::Value>>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub alert_email: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub webhook_url: Option<Option<String>>,
}

/// Distinguish a field sent as `null` from one not sent at all.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl EndpointUpdate {
    fn apply(self, endpoint: &mut EndpointConfig) {
        if let Some(name) = self.name {
            endpoint.name = name;
        }
        if let Some(url) = self.url {
            endpoint.url = url;
        }
        if let Some(method) = self.method {
            endpoint.method = method.to_ascii_uppercase();
        }
        if let Some(interval) = self.interval_secs {
            endpoint.interval_secs = interval;
        }
        if let Some(timeout) = self.timeout_secs {
            endpoint.timeout_secs = timeout;
        }
        if let Some(headers) = self.headers {
            endpoint.headers = headers;
        }
        if let Some(body) = self.body {
            endpoint.body = body;
        }
        if let Some(active) = self.is_active {
            endpoint.is_active = active;
        }
        if let Some(email) = self.alert_email {
            endpoint.alert_email = email;
        }
        if let Some(webhook) = self.webhook_url {
            endpoint.webhook_url = webhook;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Larger `limit` values are clamped.
pub const MAX_LOG_LIMIT: usize = 1000;

// ── Health ─────────────────────────────────────────────────────

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ── Endpoints ──────────────────────────────────────────────────

/// GET /api/v1/endpoints
pub async fn list_endpoints(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_endpoints() {
        Ok(endpoints) => ApiResponse::ok(endpoints).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/endpoints/{id}
pub async fn get_endpoint(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_endpoint(&id) {
        Ok(Some(endpoint)) => ApiResponse::ok(endpoint).into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/v1/endpoints
pub async fn create_endpoint(
    State(state): State<ApiState>,
    Json(req): Json<NewEndpoint>,
) -> impl IntoResponse {
    let endpoint = req.into_config();
    if let Err(e) = endpoint.validate() {
        return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }
    if let Err(e) = state.store.put_endpoint(&endpoint) {
        return internal_error(e);
    }
    if let Err(e) = sync_schedule(&state, &endpoint).await {
        error!(endpoint_id = %endpoint.id, error = %e, "failed to schedule new endpoint");
        return internal_error(e);
    }

    info!(endpoint_id = %endpoint.id, url = %endpoint.url, "endpoint created");
    (StatusCode::CREATED, ApiResponse::ok(endpoint)).into_response()
}

/// PUT /api/v1/endpoints/{id}
pub async fn update_endpoint(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<EndpointUpdate>,
) -> impl IntoResponse {
    let mut endpoint = match state.store.get_endpoint(&id) {
        Ok(Some(endpoint)) => endpoint,
        Ok(None) => return not_found(),
        Err(e) => return internal_error(e),
    };

    update.apply(&mut endpoint);
    if let Err(e) = endpoint.validate() {
        return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }
    if let Err(e) = state.store.put_endpoint(&endpoint) {
        return internal_error(e);
    }
    if let Err(e) = sync_schedule(&state, &endpoint).await {
        error!(endpoint_id = %id, error = %e, "failed to reschedule endpoint");
        return internal_error(e);
    }

    info!(endpoint_id = %id, active = endpoint.is_active, "endpoint updated");
    ApiResponse::ok(endpoint).into_response()
}

/// DELETE /api/v1/endpoints/{id}
pub async fn delete_endpoint(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_endpoint(&id) {
        Ok(true) => {
            state.scheduler.remove(&id).await;
            info!(endpoint_id = %id, "endpoint deleted");
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => not_found(),
        Err(e) => internal_error(e),
    }
}

// ── Check log ──────────────────────────────────────────────────

/// GET /api/v1/endpoints/{id}/logs?limit=N
pub async fn list_logs(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    match state.store.get_endpoint(&id) {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(),
        Err(e) => return internal_error(e),
    }
    match state
        .store
        .query_recent_results(&id, query.limit.min(MAX_LOG_LIMIT))
    {
        Ok(results) => ApiResponse::ok(results).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/endpoints/{id}/stats
pub async fn get_stats(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_endpoint(&id) {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(),
        Err(e) => return internal_error(e),
    }
    match state.store.endpoint_stats(&id) {
        Ok(stats) => ApiResponse::ok(stats).into_response(),
        Err(e) => internal_error(e),
    }
}
