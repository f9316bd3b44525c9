//! HTTP servers: the public API on `server.port` and Prometheus metrics on
//! `monitoring.metrics_port`.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nearby_core::health::HealthStatus;
use nearby_core::records::{NewRecord, RecordId};
use nearby_core::search::NearbyQuery;
use nearby_core::{Error, ProximityService};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Shared state for HTTP endpoints.
pub struct ServerState {
    pub service: Arc<ProximityService>,
}

/// Error body: `{"code": "...", "message": "...", "request_id": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    /// Matches the `request_id` field of the server-side log line
    #[serde(default)]
    pub request_id: String,
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> String {
    format!("req-{:08x}", NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
}

/// A handler failure rendered as [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    request_id: String,
}

impl ApiError {
    fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_ARGUMENT",
            message: message.into(),
            request_id: next_request_id(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            e if e.is_transient() => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        let request_id = next_request_id();
        if status.is_server_error() {
            warn!(error = %err, code, request_id = %request_id, "Request failed");
        }
        Self {
            status,
            code,
            message: err.to_string(),
            request_id,
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid_argument(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::invalid_argument(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_argument(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            code: self.code.to_string(),
            message: self.message,
            request_id: self.request_id,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Query string of `GET /v1/search/nearby`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    pub longitude: f64,
    #[serde(default)]
    pub radius: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl From<SearchParams> for NearbyQuery {
    fn from(params: SearchParams) -> Self {
        NearbyQuery {
            latitude: params.latitude,
            longitude: params.longitude,
            radius_meters: params.radius,
            limit: params.limit,
            cursor: params.cursor,
        }
    }
}

/// Query string of `POST /v1/admin/index-sync`.
#[derive(Debug, Deserialize)]
pub struct SyncParams {
    #[serde(default)]
    pub max_events: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub processed: usize,
    pub remaining: u64,
}

/// Routes served on the API port.
pub fn api_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/v1/search/nearby", get(search_handler))
        .route("/v1/business", post(create_handler))
        .route(
            "/v1/business/{id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/v1/admin/index-sync", post(sync_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Routes served on the metrics port.
pub fn metrics_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve both routers until `shutdown_rx` fires.
pub async fn start_server(
    state: Arc<ServerState>,
    host: &str,
    port: u16,
    metrics_port: u16,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let api_addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let api_listener = tokio::net::TcpListener::bind(api_addr).await?;
    info!(addr = %api_addr, "API server started");

    let metrics_addr: SocketAddr = format!("{}:{}", host, metrics_port).parse()?;
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr).await?;
    info!(addr = %metrics_addr, "Metrics server started");

    let api_server = async {
        axum::serve(api_listener, api_router(Arc::clone(&state)))
            .await
            .map_err(|e| error!(error = %e, "API server error"))
    };

    let metrics_server = async {
        axum::serve(metrics_listener, metrics_router(Arc::clone(&state)))
            .await
            .map_err(|e| error!(error = %e, "Metrics server error"))
    };

    tokio::select! {
        _ = api_server => {}
        _ = metrics_server => {}
        _ = shutdown_rx.recv() => {
            info!("HTTP servers shutting down");
        }
    }
    Ok(())
}

async fn search_handler(
    State(state): State<Arc<ServerState>>,
    params: std::result::Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = params?;
    let response = state.service.search_nearby(&params.into()).await?;
    Ok(Json(response))
}

async fn create_handler(
    State(state): State<Arc<ServerState>>,
    input: std::result::Result<Json<NewRecord>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = input?;
    let record = state.service.records().create(input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_handler(
    State(state): State<Arc<ServerState>>,
    id: std::result::Result<Path<RecordId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let record = state.service.records().get(id).await?;
    Ok(Json(record))
}

async fn update_handler(
    State(state): State<Arc<ServerState>>,
    id: std::result::Result<Path<RecordId>, PathRejection>,
    input: std::result::Result<Json<NewRecord>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let Json(input) = input?;
    let record = state.service.records().update(id, input).await?;
    Ok(Json(record))
}

async fn delete_handler(
    State(state): State<Arc<ServerState>>,
    id: std::result::Result<Path<RecordId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    state.service.records().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sync_handler(
    State(state): State<Arc<ServerState>>,
    params: std::result::Result<Query<SyncParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = params?;
    let max_events = params
        .max_events
        .unwrap_or(state.service.config().index_sync.batch_size);
    if max_events == 0 {
        return Err(ApiError::invalid_argument("max_events must be > 0"));
    }

    let processed = state.service.sync_once(max_events).await?;
    let remaining = state.service.synchronizer().backlog().await?.unprocessed;
    info!(processed, remaining, "Manual index sync completed");
    Ok(Json(SyncResponse {
        processed,
        remaining,
    }))
}

/// Full status; 503 when unhealthy.
async fn health_handler(State(state): State<Arc<ServerState>>) -> ApiResult<Response> {
    state.service.refresh_health().await;
    let status = state.service.status().await?;

    let status_code = match state.service.health().overall_status() {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    Ok((status_code, Json(status)).into_response())
}

/// Kubernetes liveness probe handler.
async fn healthz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.service.health().overall_status() != HealthStatus::Unhealthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Kubernetes readiness probe handler.
async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.service.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus metrics endpoint handler.
async fn metrics_handler(State(state): State<Arc<ServerState>>) -> ApiResult<impl IntoResponse> {
    let output = state.service.metrics().encode_text()?;
    Ok((
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use nearby_core::search::NearbySearchResponse;
    use nearby_core::Config;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn create_test_state() -> Arc<ServerState> {
        let mut config = Config::default();
        config.index_sync.enabled = false;
        let service = ProximityService::new(config)
            .await
            .expect("Failed to build service");
        Arc::new(ServerState {
            service: Arc::new(service),
        })
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn create_body(latitude: f64, longitude: f64) -> Value {
        json!({
            "owner_id": 7,
            "name": "Gangnam Kimbap",
            "category": "restaurant",
            "address": "Teheran-ro 1",
            "latitude": latitude,
            "longitude": longitude,
        })
    }

    #[tokio::test]
    async fn test_create_sync_search_roundtrip() {
        let router = api_router(create_test_state().await);

        let (status, body) = send(
            &router,
            json_request(Method::POST, "/v1/business", create_body(37.4991, 127.0313)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created: Value = serde_json::from_slice(&body).unwrap();
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["status"], "ACTIVE");

        let (status, body) = send(
            &router,
            json_request(Method::POST, "/v1/admin/index-sync", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let sync: SyncResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(sync.processed, 1);
        assert_eq!(sync.remaining, 0);

        let (status, body) = send(
            &router,
            get_request("/v1/search/nearby?lat=37.4991&lon=127.0313&radius=500"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let response: NearbySearchResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.items[0].id, id);
    }

    #[tokio::test]
    async fn test_validation_error_is_400() {
        let router = api_router(create_test_state().await);

        let (status, body) = send(
            &router,
            get_request("/v1/search/nearby?lat=37.4991&lon=127.0313&radius=500&limit=0"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "INVALID_ARGUMENT");

        // missing coordinates
        let (status, body) = send(&router, get_request("/v1/search/nearby?radius=500")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "INVALID_ARGUMENT");

        let (status, _) = send(
            &router,
            json_request(Method::POST, "/v1/business", json!({"name": "no coords"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_record_id_is_400_json() {
        let router = api_router(create_test_state().await);

        let (status, body) = send(&router, get_request("/v1/business/abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "INVALID_ARGUMENT");
        assert!(!error.message.is_empty());
        assert!(error.request_id.starts_with("req-"));

        let (status, body) = send(
            &router,
            json_request(Method::PUT, "/v1/business/1.5", create_body(37.4991, 127.0313)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "INVALID_ARGUMENT");

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/v1/business/x")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "INVALID_ARGUMENT");
    }

    #[test]
    fn test_error_responses_carry_distinct_request_ids() {
        let first: ApiError = Error::NotFound(1).into();
        let second = ApiError::invalid_argument("bad");
        assert_ne!(first.request_id, second.request_id);
    }

    #[tokio::test]
    async fn test_unknown_record_is_404() {
        let router = api_router(create_test_state().await);

        let (status, body) = send(&router, get_request("/v1/business/999")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, "NOT_FOUND");

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/v1/business/999")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let router = api_router(create_test_state().await);
        let (_, body) = send(
            &router,
            json_request(Method::POST, "/v1/business", create_body(37.4991, 127.0313)),
        )
        .await;
        let id = serde_json::from_slice::<Value>(&body).unwrap()["id"]
            .as_i64()
            .unwrap();

        let (status, body) = send(
            &router,
            json_request(
                Method::PUT,
                &format!("/v1/business/{}", id),
                create_body(35.1796, 129.0756),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let updated: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(updated["geohash"], "wy7b1hmb");

        let request = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/v1/business/{}", id))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&router, request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&router, get_request(&format!("/v1/business/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let router = api_router(create_test_state().await);

        let (status, body) = send(&router, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        let health: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["components"].as_array().unwrap().len(), 5);

        let (status, _) = send(&router, get_request("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&router, get_request("/readyz")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = create_test_state().await;
        let router = metrics_router(Arc::clone(&state));
        state
            .service
            .search_nearby(&NearbyQuery::new(37.4991, 127.0313, 500))
            .await
            .unwrap();

        let (status, body) = send(&router, get_request("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("nearby_search_latency_seconds_count 1"));
    }

    #[test]
    fn test_error_mapping() {
        let err: ApiError = Error::NotFound(1).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = Error::HotZone("down".into()).into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code, "UNAVAILABLE");

        let err: ApiError = Error::Serialization("bad".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
