//! In-process mock of the telemetry backend: the `/api/*` endpoints the
//! dashboard polls, the action endpoints and the `/ws` realtime channel.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use lib_opsdash::core::SafeModeTimings;
use lib_opsdash::ingestors::ReconnectPolicy;
use lib_opsdash::{DashboardSettings, Endpoints};
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};

/// A frame the mock pushes to every connected socket.
#[derive(Debug, Clone)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

struct Inner {
    frames: broadcast::Sender<Frame>,
    connections: watch::Sender<usize>,
    hits: Mutex<Vec<String>>,
}

#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    inner: Arc<Inner>,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        let (frames, _) = broadcast::channel(64);
        let (connections, _) = watch::channel(0);
        let inner = Arc::new(Inner { frames, connections, hits: Mutex::new(Vec::new()) });

        let app = Router::new()
            .route("/api/system", get(system))
            .route("/api/services", get(services))
            .route("/api/containers", get(containers))
            .route("/api/actions/restart", post(restart))
            .route("/api/actions/resolve", post(resolve))
            .route("/ws", get(ws_handler))
            .with_state(inner.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, inner }
    }

    /// Settings pointing at this mock, with test-sized timings.
    pub fn settings(&self) -> DashboardSettings {
        let endpoints = Endpoints::resolve(&format!("http://{}", self.addr), "", "").unwrap();
        let mut settings = DashboardSettings::with_endpoints(endpoints);
        settings.http_retries = 0;
        settings.reconnect = ReconnectPolicy {
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(100),
            max_attempts: 10,
        };
        settings.safe_mode = SafeModeTimings {
            readiness_interval: Duration::from_millis(20),
            service_timeout: Duration::from_millis(500),
            container_timeout: Duration::from_millis(500),
        };
        settings
    }

    pub fn push(&self, frame: Frame) {
        self.inner.frames.send(frame).unwrap();
    }

    pub fn push_json(&self, value: Value) {
        self.push(Frame::Text(value.to_string()));
    }

    pub fn connections(&self) -> usize {
        *self.inner.connections.borrow()
    }

    /// Waits until `n` sockets have been accepted in total.
    pub async fn wait_for_connections(&self, n: usize) {
        let mut rx = self.inner.connections.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|c| *c >= n))
            .await
            .expect("timed out waiting for a websocket connection")
            .unwrap();
    }

    pub fn hits(&self) -> Vec<String> {
        self.inner.hits.lock().unwrap().clone()
    }

    pub fn count(&self, hit: &str) -> usize {
        self.hits().iter().filter(|h| *h == hit).count()
    }
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn record(state: &Inner, hit: String) {
    state.hits.lock().unwrap().push(hit);
}

async fn system(State(state): State<Arc<Inner>>) -> Json<Value> {
    record(&state, "GET /api/system".into());
    Json(json!({
        "cpu_usage": 10.0,
        "memory": {"total": 8_000_000_000u64, "percent": 40.0},
        "disk": {"/": {"percent": 55.0}},
        "load_average": {"load1": 0.5, "load5": 0.4, "load15": 0.3},
        "timestamp": 1_700_000_000
    }))
}

async fn services(State(state): State<Arc<Inner>>) -> Json<Value> {
    record(&state, "GET /api/services".into());
    Json(json!({
        "healthy_count": 2,
        "unhealthy_count": 0,
        "services": {
            "nginx": {"service": "nginx", "active": true, "enabled": true, "status": "running"},
            "postgresql": {"service": "postgresql", "active": true, "enabled": true, "status": "running"}
        }
    }))
}

async fn containers(State(state): State<Arc<Inner>>) -> Json<Value> {
    record(&state, "GET /api/containers".into());
    Json(json!({
        "total": 1, "running": 1, "stopped": 0, "unhealthy": 0,
        "containers": [{"id": "4f2a9c", "name": "guacamole-db", "image": "postgres:15", "status": "Up 2 minutes", "state": "running"}]
    }))
}

/// Containers restart fine; services fail the way systemd reports a missing unit.
async fn restart(State(state): State<Arc<Inner>>, Json(body): Json<Value>) -> impl IntoResponse {
    let kind = body["type"].as_str().unwrap_or_default().to_string();
    let name = body["name"].as_str().unwrap_or_default().to_string();
    record(&state, format!("POST /api/actions/restart {kind} {name}"));

    if kind == "service" {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": format!("Failed to restart service {name}: Unit {name}.service not found.")})),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({"success": true, "message": format!("Container {name} restarted successfully"), "details": ""})),
        )
    }
}

async fn resolve(State(state): State<Arc<Inner>>, Json(body): Json<Value>) -> Json<Value> {
    let id = body["issue_id"].as_str().unwrap_or_default().to_string();
    record(&state, format!("POST /api/actions/resolve {id}"));
    Json(json!({"success": true, "message": "Issue resolved", "actions_taken": ["Removed old kernels"]}))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<Inner>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<Inner>) {
    let mut frames = state.frames.subscribe();
    state.connections.send_modify(|c| *c += 1);

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let sent = match frame {
                    Ok(Frame::Text(text)) => socket.send(Message::Text(text.into())).await,
                    Ok(Frame::Binary(bytes)) => socket.send(Message::Binary(bytes.into())).await,
                    Ok(Frame::Close) | Err(_) => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                };
                if sent.is_err() {
                    break;
                }
            }
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
