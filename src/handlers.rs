// JSON route handlers for the admin dashboard

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::error::{AccessError, ApiError, ValidationError};
use crate::models::{DashboardSnapshot, DashboardStats, Server, Service, Settings, SyncReport, UserMetrics};
use crate::records::FormData;
use crate::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/stats", get(get_stats))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/dashboard/cache", get(get_cached_dashboard).delete(clear_dashboard_cache))
        .route("/api/dashboard/refresh", post(refresh_dashboard))
        .route("/api/sync-status", get(get_sync_status))
        .route("/api/servers", get(list_servers).post(add_server).delete(delete_all_servers))
        .route("/api/servers/:id", delete(delete_server))
        .route("/api/services", get(list_services).post(add_service).delete(delete_all_services))
        .route("/api/services/:id", delete(delete_service))
        .route("/api/flags", get(get_flags))
        .route("/api/settings", get(get_settings))
        .with_state(state)
}

/// Request timeout (answered with 408), tracing and permissive CORS.
pub fn with_http_layers(router: Router, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_health = state.store.ping().await.is_ok();
    let status = if db_health {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if db_health { "healthy" } else { "unhealthy" },
            "database": if db_health { "up" } else { "down" },
        })),
    )
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<UserMetrics> {
    Json(state.metrics.compute_user_metrics().await)
}

pub async fn get_dashboard(State(state): State<Arc<AppState>>) -> Json<DashboardSnapshot> {
    Json(state.metrics.compute_dashboard_snapshot().await)
}

pub async fn get_cached_dashboard(State(state): State<Arc<AppState>>) -> ApiResult<Option<DashboardStats>> {
    Ok(Json(state.dashboard.cached_dashboard().await?))
}

pub async fn refresh_dashboard(State(state): State<Arc<AppState>>) -> ApiResult<DashboardStats> {
    Ok(Json(state.dashboard.refresh_dashboard_cache().await?))
}

pub async fn clear_dashboard_cache(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let cleared = state.dashboard.clear_dashboard_cache().await?;
    Ok(Json(json!({ "cleared": cleared })))
}

pub async fn get_sync_status(State(state): State<Arc<AppState>>) -> ApiResult<SyncReport> {
    Ok(Json(state.sync.sync_status().await?))
}

pub async fn list_servers(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Server>> {
    Ok(Json(state.records.list_servers().await?))
}

pub async fn add_server(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = state.records.add_server(&form(body)?).await?;
    refresh_after_change(&state).await;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn delete_server(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Value> {
    let deleted = state.records.delete_server(&id).await?;
    refresh_after_change(&state).await;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn delete_all_servers(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let deleted = state.records.delete_all_servers().await?;
    refresh_after_change(&state).await;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn list_services(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Service>> {
    Ok(Json(state.records.list_services().await?))
}

pub async fn add_service(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = state.records.add_service(&form(body)?).await?;
    refresh_after_change(&state).await;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn delete_service(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Value> {
    let deleted = state.records.delete_service(&id).await?;
    refresh_after_change(&state).await;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn delete_all_services(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    let deleted = state.records.delete_all_services().await?;
    refresh_after_change(&state).await;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn get_flags(State(state): State<Arc<AppState>>) -> ApiResult<BTreeMap<String, String>> {
    Ok(Json(state.records.get_flags().await?))
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> ApiResult<Settings> {
    Ok(Json(state.records.get_settings().await?))
}

/// Request bodies must be JSON objects.
fn form(body: Value) -> Result<FormData, AccessError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::field("body").into()),
    }
}

/// Mutations keep the cached dashboard current. A failed refresh never fails the mutation.
async fn refresh_after_change(state: &AppState) {
    match state.dashboard.refresh_dashboard_cache().await {
        Ok(stats) => info!("Dashboard cache updated, {} services", stats.total_services),
        Err(e) => error!("Failed to refresh dashboard cache: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::util::ServiceExt;

    fn slow_app(timeout: Duration) -> Router {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                "done"
            }),
        );
        with_http_layers(router, timeout)
    }

    #[tokio::test]
    async fn test_slow_request_times_out_with_408() {
        let response = slow_app(Duration::from_millis(10))
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_fast_request_passes_through_layers() {
        let response = slow_app(Duration::from_secs(5))
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
