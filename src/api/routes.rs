use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::domain::Policy;
use crate::policy::{PolicyError, PolicyService, PolicySnapshot};

use super::response::HealthResponse;

/// Shared application state.
pub struct AppState {
    /// Mutation pipeline
    pub service: PolicyService,

    /// Latest policy snapshot (updated via watch channel)
    pub snapshot_rx: watch::Receiver<Arc<PolicySnapshot>>,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/policy", get(list_policies).post(create_policy))
        .route(
            "/policy/:policy_id",
            get(get_policy).put(update_policy).delete(delete_policy),
        )
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_policies(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Policy>>, PolicyError> {
    Ok(Json(state.service.list().await?))
}

async fn get_policy(
    State(state): State<Arc<AppState>>,
    Path(policy_id): Path<String>,
) -> Result<Json<Policy>, PolicyError> {
    Ok(Json(state.service.get(&policy_id).await?))
}

/// Bodies are taken as raw bytes so malformed documents are classified by
/// the pipeline rather than rejected by the JSON extractor.
async fn create_policy(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Policy>, PolicyError> {
    Ok(Json(state.service.create(&body).await?))
}

async fn update_policy(
    State(state): State<Arc<AppState>>,
    Path(policy_id): Path<String>,
    body: Bytes,
) -> Result<Json<Policy>, PolicyError> {
    Ok(Json(state.service.update(&policy_id, &body).await?))
}

async fn delete_policy(
    State(state): State<Arc<AppState>>,
    Path(policy_id): Path<String>,
) -> Result<Json<()>, PolicyError> {
    state.service.delete(&policy_id).await?;
    Ok(Json(()))
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot_rx.borrow().clone();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        policies: snapshot.len(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot_len = state.snapshot_rx.borrow().len();

    let metrics = format!(
        r#"# HELP policyd_uptime_seconds Application uptime in seconds
# TYPE policyd_uptime_seconds counter
policyd_uptime_seconds {}

# HELP policyd_cached_policies Number of policies in the current snapshot
# TYPE policyd_cached_policies gauge
policyd_cached_policies {}

{}"#,
        state.start_time.elapsed().as_secs(),
        snapshot_len,
        state.service.metrics().to_prometheus(),
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        metrics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastNotifier;
    use crate::observability::MetricsRegistry;
    use crate::storage::MemoryStorage;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let service = PolicyService::new(
            storage.clone(),
            Arc::new(BroadcastNotifier::new(8)),
            Arc::new(MetricsRegistry::new()),
        );
        let (_tx, rx) = watch::channel(Arc::new(PolicySnapshot::empty()));

        let state = Arc::new(AppState {
            service,
            snapshot_rx: rx,
            start_time: Instant::now(),
            version: "0.1.0-test".to_string(),
        });

        (create_router(state), storage)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        (status, value)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = test_app();

        let (status, body) = send(&app, Method::GET, "/health", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));
    }

    #[tokio::test]
    async fn test_crud_status_codes() {
        let (app, _) = test_app();

        let (status, created) =
            send(&app, Method::POST, "/policy", r#"{"name": "VPN Policy"}"#).await;
        assert_eq!(status, StatusCode::OK);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, fetched) = send(&app, Method::GET, &format!("/policy/{id}"), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], json!("VPN Policy"));

        let (status, updated) = send(
            &app,
            Method::PUT,
            &format!("/policy/{id}"),
            r#"{"name": "Renamed"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["name"], json!("Renamed"));
        assert_eq!(updated["id"], json!(id));

        let (status, list) = send(&app, Method::GET, "/policy", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, body) = send(&app, Method::DELETE, &format!("/policy/{id}"), "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);

        let (status, body) = send(&app, Method::GET, &format!("/policy/{id}"), "").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], json!("INTERNAL_ERROR"));
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let (app, storage) = test_app();

        let (status, body) = send(&app, Method::PUT, "/policy/not-an-id", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("BAD_REQUEST"));

        let (status, body) = send(
            &app,
            Method::POST,
            "/policy",
            r#"{"keybase_mode": "sometimes"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["keybase_mode"].is_string());

        let (status, _) = send(&app, Method::POST, "/policy", "{broken").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _) = test_app();
        send(&app, Method::POST, "/policy", "{}").await;

        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("policyd_mutations_total{op=\"create\"} 1"));
    }
}
