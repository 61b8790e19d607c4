//! SSE transport deployer.
//!
//! Classic two-endpoint MCP over Server-Sent Events:
//! - `GET {app_prefix}/{id}/{version}/sse` opens a session. The first event is
//!   `endpoint`, carrying the URL the client must POST its messages to.
//! - `POST {app_prefix}/{id}/{version}/message?sessionId=...` delivers one
//!   JSON-RPC message to that session.
//!
//! Every session runs its own clone of the instance server on a channel
//! transport, tracked so undeploy can wait for the sessions to drain.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use bytes::Bytes;
use futures::{SinkExt, Stream, StreamExt, channel::mpsc};
use rmcp::ServiceExt;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::deployer::{MountedTransport, TransportDeployer, route_path};
use super::error::{DeployError, DeployResult};
use super::TransportConfig;
use crate::core::server::GatewayServer;
use crate::domains::instances::{InstanceKey, RuntimeInstance};

const SESSION_QUERY: &str = "sessionId";
const CHANNEL_CAPACITY: usize = 64;

/// Deployer for the SSE transport.
pub struct SseDeployer {
    config: TransportConfig,
    api_prefix: String,
}

impl SseDeployer {
    pub const NAME: &'static str = "sse";

    /// `api_prefix` is the prefix the gateway nests instance routes under; it
    /// is part of the endpoint URL announced to clients.
    pub fn new(config: TransportConfig, api_prefix: impl Into<String>) -> Self {
        Self {
            config,
            api_prefix: api_prefix.into(),
        }
    }
}

/// Per-instance state shared by the SSE and message handlers.
struct SseApp {
    key: InstanceKey,
    server: GatewayServer,
    endpoint: String,
    keep_alive: std::time::Duration,
    sessions: RwLock<HashMap<String, mpsc::Sender<ClientJsonRpcMessage>>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

#[async_trait]
impl TransportDeployer for SseDeployer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn deploy(&self, instance: &mut RuntimeInstance) -> DeployResult<()> {
        let key = instance.key();
        if instance.sse.is_some() {
            return Err(DeployError::already_deployed(Self::NAME, &key));
        }

        let sse_path = route_path(&self.config.app_prefix, &key, "sse")?;
        let message_path = route_path(&self.config.app_prefix, &key, "message")?;
        let prefix = self.api_prefix.trim_end_matches('/');

        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();
        let app = Arc::new(SseApp {
            key: key.clone(),
            server: instance.server.clone(),
            endpoint: format!("{}{}", prefix, message_path),
            keep_alive: self.config.sse_keep_alive(),
            sessions: RwLock::new(HashMap::new()),
            shutdown: shutdown.clone(),
            tasks: tasks.clone(),
        });

        let router = Router::new()
            .route(&sse_path, get(sse_handler))
            .route(&message_path, post(message_handler))
            .with_state(app);

        info!("Mounted sse transport for {} at {}", key, sse_path);
        instance.sse_path = sse_path;
        instance.message_path = message_path;
        instance.sse = Some(MountedTransport::with_tasks(router, shutdown, tasks));
        Ok(())
    }

    async fn undeploy(&self, instance: &RuntimeInstance) -> DeployResult<()> {
        let Some(mounted) = &instance.sse else {
            return Ok(());
        };
        let key = instance.key();
        mounted
            .shutdown(Self::NAME, &key, self.config.shutdown_timeout())
            .await?;
        info!("Stopped sse transport for {}", key);
        Ok(())
    }
}

/// Open a session and stream server messages to the client.
async fn sse_handler(
    State(app): State<Arc<SseApp>>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, StatusCode> {
    if app.shutdown.is_cancelled() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let session_id = Uuid::new_v4().to_string();
    let (client_tx, client_rx) = mpsc::channel::<ClientJsonRpcMessage>(CHANNEL_CAPACITY);
    let (server_tx, server_rx) = mpsc::channel::<ServerJsonRpcMessage>(CHANNEL_CAPACITY);

    app.sessions
        .write()
        .await
        .insert(session_id.clone(), client_tx);

    let session_token = app.shutdown.child_token();
    let task_app = app.clone();
    let task_id = session_id.clone();
    let task_token = session_token.clone();
    app.tasks.spawn(async move {
        run_session(&task_app, &task_id, server_tx, client_rx, task_token).await;
        task_app.sessions.write().await.remove(&task_id);
    });

    info!("Opened sse session {} for {}", session_id, app.key);

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}?{}={}", app.endpoint, SESSION_QUERY, session_id));

    // Dropping the response stream means the client went away.
    let guard = session_token.drop_guard();
    let messages = server_rx.map(move |message| {
        let _session = &guard;
        Event::default().event("message").json_data(&message)
    });
    let stream = futures::stream::once(async move { Ok(endpoint) }).chain(messages);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(app.keep_alive)))
}

async fn run_session(
    app: &SseApp,
    session_id: &str,
    server_tx: mpsc::Sender<ServerJsonRpcMessage>,
    client_rx: mpsc::Receiver<ClientJsonRpcMessage>,
    token: CancellationToken,
) {
    let service = match app
        .server
        .clone()
        .serve_with_ct((server_tx, client_rx), token)
        .await
    {
        Ok(service) => service,
        Err(e) => {
            warn!("Failed to initialize sse session {} for {}: {}", session_id, app.key, e);
            return;
        }
    };

    match service.waiting().await {
        Ok(reason) => debug!("sse session {} for {} closed: {:?}", session_id, app.key, reason),
        Err(e) => warn!("sse session {} for {} failed: {}", session_id, app.key, e),
    }
}

/// Deliver one client message to its session.
async fn message_handler(
    State(app): State<Arc<SseApp>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> StatusCode {
    let Some(session_id) = query.get(SESSION_QUERY) else {
        return StatusCode::BAD_REQUEST;
    };

    let Some(mut sender) = app.sessions.read().await.get(session_id).cloned() else {
        debug!("Message for unknown sse session {} of {}", session_id, app.key);
        return StatusCode::NOT_FOUND;
    };

    let message: ClientJsonRpcMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            debug!("Rejected malformed message for session {}: {}", session_id, e);
            return StatusCode::BAD_REQUEST;
        }
    };

    if sender.send(message).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}
