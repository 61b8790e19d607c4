//! HTTP transport implementation.
//!
//! One axum server carries the REST management API and proxies instance
//! traffic. Every route is nested under the configured API prefix:
//!
//! - `POST   /instance/create`, `PUT /instance/update/{id}/{version}`,
//!   `DELETE /instance/remove/{id}/{version}`, `DELETE /instance/remove/{id}`,
//!   `POST   /instance/upgrade`, `GET /instance/{id}/{version}`,
//!   `GET    /instance/list`
//! - `ANY  {app}/{id}/{version}/stream`, `GET {app}/{id}/{version}/sse`,
//!   `POST {app}/{id}/{version}/message`, handed to the instance's mounted
//!   transport.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Request, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{any, delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

use super::{TransportError, TransportResult, config::HttpConfig};
use crate::domains::instances::{
    CreateInstanceRequest, CreateInstanceResponse, InstanceError, InstanceInfo, InstanceKey,
    OrchestrationService, UpdateInstanceRequest, UpdateInstanceResponse,
};

/// Header carrying the caller identity written to audit fields.
pub const USER_HEADER: &str = "x-user-id";

const DEFAULT_USER: &str = "system";

/// HTTP transport handler.
pub struct HttpTransport {
    config: HttpConfig,
}

/// Structured error body returned by every REST route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for InstanceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    service: Arc<OrchestrationService>,
    name: String,
}

impl AppState {
    pub fn new(service: Arc<OrchestrationService>, name: impl Into<String>) -> Self {
        Self {
            service,
            name: name.into(),
        }
    }
}

impl HttpTransport {
    /// Create a new HTTP transport with the given config.
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Serve `app` until `shutdown` resolves.
    pub async fn run<F>(self, app: Router, shutdown: F) -> TransportResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.address();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        let cors_status = if self.config.enable_cors {
            "enabled"
        } else {
            "disabled"
        };
        info!("Ready - listening on {} (CORS {})", addr, cors_status);
        info!("  → API:    {}/instance", self.config.api_prefix);
        info!("  → Health: GET /health");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| TransportError::http(e.to_string()))?;

        Ok(())
    }
}

/// Build the complete application router.
pub fn build_router(state: AppState, config: &HttpConfig, app_prefix: &str) -> Router {
    let app_prefix = app_prefix.trim_end_matches('/');
    let api = Router::new()
        .route("/instance/create", post(create_instance))
        .route("/instance/update/{id}/{version}", put(update_instance))
        .route("/instance/remove/{id}/{version}", delete(remove_instance))
        .route("/instance/remove/{id}", delete(remove_resource))
        .route("/instance/upgrade", post(upgrade_instance))
        .route("/instance/list", get(list_instances))
        .route("/instance/{id}/{version}", get(get_instance))
        .route(
            &format!("{app_prefix}/{{id}}/{{version}}/stream"),
            any(proxy_stream),
        )
        .route(&format!("{app_prefix}/{{id}}/{{version}}/sse"), get(proxy_sse))
        .route(
            &format!("{app_prefix}/{{id}}/{{version}}/message"),
            post(proxy_message),
        )
        .with_state(state.clone());

    let root = Router::new()
        .route("/health", get(health_check))
        .route("/", get(root_handler))
        .with_state(state);

    let prefix = config.api_prefix.trim_end_matches('/');
    let mut app = if prefix.is_empty() {
        root.merge(api)
    } else {
        root.nest(prefix, api)
    };

    app = app.layer(TraceLayer::new_for_http());

    // Add CORS if enabled
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Root handler - provides API info.
async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": state.name,
        "version": env!("CARGO_PKG_VERSION"),
        "instances": state.service.manager().list().await.len(),
        "endpoints": {
            "instances": "/instance",
            "health": "/health"
        }
    }))
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn audit_user(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .unwrap_or(DEFAULT_USER)
        .to_string()
}

fn instance_path(
    path: Result<Path<(String, i64)>, PathRejection>,
) -> Result<InstanceKey, InstanceError> {
    let Path((id, version)) = path.map_err(|e| InstanceError::validation(e.body_text()))?;
    Ok(InstanceKey::new(id, version))
}

#[instrument(skip_all)]
async fn create_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateInstanceRequest>, JsonRejection>,
) -> Result<Json<CreateInstanceResponse>, InstanceError> {
    let Json(request) = payload.map_err(|e| InstanceError::validation(e.body_text()))?;
    let response = state.service.create(request, &audit_user(&headers)).await?;
    Ok(Json(response))
}

#[instrument(skip_all)]
async fn update_instance(
    State(state): State<AppState>,
    path: Result<Path<(String, i64)>, PathRejection>,
    headers: HeaderMap,
    payload: Result<Json<UpdateInstanceRequest>, JsonRejection>,
) -> Result<Json<UpdateInstanceResponse>, InstanceError> {
    let key = instance_path(path)?;
    let Json(request) = payload.map_err(|e| InstanceError::validation(e.body_text()))?;
    let response = state
        .service
        .update(&key, request, &audit_user(&headers))
        .await?;
    Ok(Json(response))
}

#[instrument(skip_all)]
async fn remove_instance(
    State(state): State<AppState>,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> Result<Json<serde_json::Value>, InstanceError> {
    let key = instance_path(path)?;
    state.service.delete(&key).await?;
    Ok(Json(serde_json::json!({
        "mcp_id": key.id,
        "version": key.version,
        "deleted": true
    })))
}

#[instrument(skip_all)]
async fn remove_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, InstanceError> {
    let deleted = state.service.delete_by_resource_id(&id).await?;
    Ok(Json(serde_json::json!({
        "mcp_id": id,
        "deleted": deleted
    })))
}

#[instrument(skip_all)]
async fn upgrade_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateInstanceRequest>, JsonRejection>,
) -> Result<Json<CreateInstanceResponse>, InstanceError> {
    let Json(request) = payload.map_err(|e| InstanceError::validation(e.body_text()))?;
    let response = state.service.upgrade(request, &audit_user(&headers)).await?;
    Ok(Json(response))
}

async fn get_instance(
    State(state): State<AppState>,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> Result<Json<InstanceInfo>, InstanceError> {
    let key = instance_path(path)?;
    Ok(Json(state.service.get(&key).await?))
}

async fn list_instances(State(state): State<AppState>) -> Json<Vec<InstanceInfo>> {
    Json(state.service.list().await)
}

/// Which mounted transport a proxied request goes to.
#[derive(Debug, Clone, Copy)]
enum Mount {
    Stream,
    Sse,
}

async fn proxy_stream(
    State(state): State<AppState>,
    path: Result<Path<(String, i64)>, PathRejection>,
    request: Request,
) -> Response {
    proxy(state, path, request, Mount::Stream).await
}

async fn proxy_sse(
    State(state): State<AppState>,
    path: Result<Path<(String, i64)>, PathRejection>,
    request: Request,
) -> Response {
    proxy(state, path, request, Mount::Sse).await
}

async fn proxy_message(
    State(state): State<AppState>,
    path: Result<Path<(String, i64)>, PathRejection>,
    request: Request,
) -> Response {
    proxy(state, path, request, Mount::Sse).await
}

/// Hand `request` to the instance's mounted router.
async fn proxy(
    state: AppState,
    path: Result<Path<(String, i64)>, PathRejection>,
    request: Request,
    mount: Mount,
) -> Response {
    let key = match instance_path(path) {
        Ok(key) => key,
        Err(e) => return e.into_response(),
    };
    let instance = match state.service.manager().get(&key).await {
        Ok(instance) => instance,
        Err(e) => return e.into_response(),
    };
    if instance.disabled {
        return InstanceError::Disabled(key).into_response();
    }

    let transport = match mount {
        Mount::Stream => instance.stream.as_ref(),
        Mount::Sse => instance.sse.as_ref(),
    };
    let Some(transport) = transport else {
        return InstanceError::NotFound(key).into_response();
    };

    match transport.router().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use super::*;
    use crate::domains::instances::testing::real_manager;
    use crate::domains::records::SqliteRecordStore;

    fn app() -> Router {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let service = OrchestrationService::new(Arc::new(store), Arc::new(real_manager()));
        let state = AppState::new(Arc::new(service), "test-gateway");
        build_router(state, &HttpConfig::default(), "/app")
    }

    fn json_request(method: &str, uri: &str, body: Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, request: HttpRequest<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn create_body() -> Value {
        json!({
            "mcp_id": "m1",
            "version": 1,
            "name": "Demo",
            "tools": [{"tool_id": "t1", "name": "echo"}]
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let (status, body) = send(&app(), empty_request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_create_returns_endpoints() {
        let app = app();
        let (status, body) = send(
            &app,
            json_request("POST", "/mcp/instance/create", create_body()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "mcp_id": "m1",
                "version": 1,
                "stream_url": "/app/m1/1/stream",
                "sse_url": "/app/m1/1/sse"
            })
        );
    }

    #[tokio::test]
    async fn test_repeated_create_is_bad_request() {
        let app = app();
        send(&app, json_request("POST", "/mcp/instance/create", create_body())).await;
        let (status, body) = send(
            &app,
            json_request("POST", "/mcp/instance/create", create_body()),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "already_exists");
    }

    #[tokio::test]
    async fn test_malformed_body_is_validation_error() {
        let (status, body) = send(
            &app(),
            json_request("POST", "/mcp/instance/create", json!({"name": "no id"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_non_numeric_version_is_validation_error() {
        let (status, body) = send(&app(), empty_request("GET", "/mcp/instance/m1/latest")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_get_and_list() {
        let app = app();
        send(&app, json_request("POST", "/mcp/instance/create", create_body())).await;

        let (status, info) = send(&app, empty_request("GET", "/mcp/instance/m1/1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["name"], "Demo");
        assert_eq!(info["message_url"], "/app/m1/1/message");

        let (status, list) = send(&app, empty_request("GET", "/mcp/instance/list")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (status, body) = send(&app, empty_request("GET", "/mcp/instance/m1/2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_update_keeps_urls() {
        let app = app();
        let (_, created) = send(&app, json_request("POST", "/mcp/instance/create", create_body())).await;

        let (status, updated) = send(
            &app,
            json_request(
                "PUT",
                "/mcp/instance/update/m1/1",
                json!({"name": "Renamed", "tools": []}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated, created);

        let (_, info) = send(&app, empty_request("GET", "/mcp/instance/m1/1")).await;
        assert_eq!(info["name"], "Renamed");
        assert_eq!(info["tools"], json!([]));
    }

    #[tokio::test]
    async fn test_upgrade_shapes_match() {
        let app = app();
        let (status, created) =
            send(&app, json_request("POST", "/mcp/instance/upgrade", create_body())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, updated) =
            send(&app, json_request("POST", "/mcp/instance/upgrade", create_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created, updated);
    }

    #[tokio::test]
    async fn test_remove_routes() {
        let app = app();
        send(&app, json_request("POST", "/mcp/instance/create", create_body())).await;
        let mut second = create_body();
        second["version"] = json!(2);
        send(&app, json_request("POST", "/mcp/instance/create", second)).await;

        let (status, body) = send(&app, empty_request("DELETE", "/mcp/instance/remove/m1/1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);

        let (status, body) = send(&app, empty_request("DELETE", "/mcp/instance/remove/m1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 1);

        let (_, list) = send(&app, empty_request("GET", "/mcp/instance/list")).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_absent_is_ok() {
        let (status, _) = send(&app(), empty_request("DELETE", "/mcp/instance/remove/ghost/3")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_proxy_unknown_instance_is_not_found() {
        let (status, body) = send(&app(), empty_request("GET", "/mcp/app/ghost/1/sse")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_proxy_refuses_disabled_instance() {
        use crate::core::server::GatewayServer;
        use crate::core::transport::{SseDeployer, StreamDeployer, TransportConfig};
        use crate::domains::instances::testing::{demo_config, mock_registrar};
        use crate::domains::instances::{InstanceManager, InstanceStorage, RuntimeInstance};

        let storage = Arc::new(InstanceStorage::new());
        let transport = TransportConfig::default();
        let manager = InstanceManager::new(
            storage.clone(),
            mock_registrar(),
            Arc::new(StreamDeployer::new(transport.clone())),
            Arc::new(SseDeployer::new(transport, "/mcp")),
        );
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let service = OrchestrationService::new(Arc::new(store), Arc::new(manager));
        let app = build_router(
            AppState::new(Arc::new(service), "test-gateway"),
            &HttpConfig::default(),
            "/app",
        );

        let mut instance =
            RuntimeInstance::new(demo_config("m1", 1), GatewayServer::new("Demo", 1, ""));
        instance.disabled = true;
        storage.save(Arc::new(instance)).await.unwrap();

        let (status, body) = send(&app, empty_request("GET", "/mcp/app/m1/1/sse")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "disabled");

        let (status, body) = send(&app, empty_request("GET", "/mcp/instance/m1/1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["disabled"], true);
    }

    #[tokio::test]
    async fn test_proxy_reaches_sse_transport() {
        let app = app();
        send(&app, json_request("POST", "/mcp/instance/create", create_body())).await;

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/mcp/app/m1/1/sse"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"));

        let (status, _) = send(
            &app,
            json_request("POST", "/mcp/app/m1/1/message?sessionId=unknown", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_audit_user_defaults_to_system() {
        let mut headers = HeaderMap::new();
        assert_eq!(audit_user(&headers), "system");
        headers.insert(USER_HEADER, "alice".parse().unwrap());
        assert_eq!(audit_user(&headers), "alice");
    }
}
