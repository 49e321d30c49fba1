//! [`CockpitServer`] – HTTP + WebSocket front end for the telemetry service.
//!
//! Listens on `0.0.0.0:8000` (configurable via [`CockpitServer::with_port`]).
//!
//! * `/api/*` requests → the axum [`router`].
//! * WebSocket upgrades on `/ws/telemetry` → a snapshot push loop that also
//!   accepts manual-control frames from the client.
//!
//! Every response passes through a CORS middleware, and connections that sit
//! idle longer than the idle timeout are dropped by the [`IdleTimeoutListener`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use rover_core::{Health, Snapshot, TelemetryService};
use rover_types::{GatewayError, ManualControlCommand};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::listener::IdleTimeoutListener;

/// Default TCP port for the HTTP/WebSocket server.
pub const DEFAULT_PORT: u16 = 8000;

/// Default WebSocket snapshot period.
pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_millis(200);

/// Default time a connection may go without reading or writing a byte.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// WebSocket endpoint that streams snapshots.
pub const TELEMETRY_WS_PATH: &str = "/ws/telemetry";

/// Upstream topic carrying a [`ManualControlCommand`] in `msg`.
pub const MANUAL_CONTROL_TOPIC: &str = "/manual_control";

/// Topic of the reply sent for every upstream manual-control frame.
pub const MANUAL_CONTROL_RESULT_TOPIC: &str = "/manual_control/result";

// ---------------------------------------------------------------------------
// CockpitServer
// ---------------------------------------------------------------------------

/// Serves the telemetry API and the live WebSocket feed.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rover_core::TelemetryService;
/// use rover_cockpit::CockpitServer;
///
/// #[tokio::main]
/// async fn main() {
///     let service = Arc::new(TelemetryService::default());
///     CockpitServer::new(Arc::clone(&service))
///         .with_port(8000)
///         .run()
///         .await
///         .expect("cockpit server failed");
/// }
/// ```
pub struct CockpitServer {
    service: Arc<TelemetryService>,
    port: u16,
    push_interval: Duration,
    idle_timeout: Duration,
}

impl CockpitServer {
    /// Create a server backed by `service` on the [`DEFAULT_PORT`].
    pub fn new(service: Arc<TelemetryService>) -> Self {
        Self {
            service,
            port: DEFAULT_PORT,
            push_interval: DEFAULT_PUSH_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the WebSocket push period (builder-style).
    pub fn with_push_interval(mut self, interval: Duration) -> Self {
        self.push_interval = interval;
        self
    }

    /// Override the per-connection idle timeout (builder-style).
    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = idle;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn push_interval(&self) -> Duration {
        self.push_interval
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Bind `0.0.0.0:<port>` and serve forever.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the TCP listener cannot bind.
    pub async fn run(self) -> Result<(), GatewayError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Transport(format!("bind error on {addr}: {e}")))?;
        self.run_on(listener).await
    }

    /// Serve connections accepted from an already bound `listener`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] if the listener's address cannot be
    /// read or the server stops with an I/O error.
    pub async fn run_on(self, listener: TcpListener) -> Result<(), GatewayError> {
        let local = listener
            .local_addr()
            .map_err(|e| GatewayError::Transport(format!("listener address: {e}")))?;
        info!(addr = %local, "cockpit listening");

        let app = router(self.service, self.push_interval);
        axum::serve(IdleTimeoutListener::new(listener, self.idle_timeout), app)
            .await
            .map_err(|e| GatewayError::Transport(format!("cockpit server on {local}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    service: Arc<TelemetryService>,
    push_interval: Duration,
}

/// Build the cockpit routes.
///
/// | Method & path | Response |
/// |---|---|
/// | `OPTIONS *` | 204, CORS headers only |
/// | `GET /api/health` | [`Health`] |
/// | `GET /api/telemetry` | [`Snapshot`] |
/// | `POST /api/manual-control` | `{"ok":true}`, 422 or 400 with `detail` |
/// | `GET /ws/telemetry` (upgrade) | snapshot stream |
/// | anything else | 404 with `detail`, 405 for a known path |
pub fn router(service: Arc<TelemetryService>, push_interval: Duration) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/telemetry", get(telemetry))
        .route("/api/manual-control", post(manual_control))
        .route(TELEMETRY_WS_PATH, get(telemetry_ws))
        .fallback(not_found)
        .with_state(AppState {
            service,
            push_interval,
        })
        .layer(middleware::from_fn(cors))
}

async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let response = next.run(request).await;
        debug!(%method, %path, status = response.status().as_u16(), "http");
        response
    };
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    response
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

// GET /api/health
async fn health(State(app): State<AppState>) -> Json<Health> {
    Json(app.service.health())
}

// GET /api/telemetry
async fn telemetry(State(app): State<AppState>) -> Json<Snapshot> {
    Json(app.service.snapshot())
}

// POST /api/manual-control
//
// Raw body: malformed JSON must still be a 422 carrying `detail`.
async fn manual_control(State(app): State<AppState>, body: Bytes) -> Response {
    let command: ManualControlCommand = match serde_json::from_slice(&body) {
        Ok(command) => command,
        Err(e) => return detail(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()),
    };
    match app.service.send_manual_control(&command) {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e @ GatewayError::InvalidCommand { .. }) => {
            detail(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())
        }
        Err(e) => detail(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn not_found() -> Response {
    detail(StatusCode::NOT_FOUND, "Not Found")
}

// ---------------------------------------------------------------------------
// WebSocket: snapshot push + upstream commands
// ---------------------------------------------------------------------------

// GET /ws/telemetry
async fn telemetry_ws(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| push_telemetry(socket, app))
}

async fn push_telemetry(socket: WebSocket, app: AppState) {
    info!("telemetry websocket opened");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut ticker = tokio::time::interval(app.push_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // ── Downstream: snapshot → client ───────────────────────────────
            _ = ticker.tick() => {
                match serde_json::to_string(&app.service.snapshot()) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "snapshot serialization error"),
                }
            }
            // ── Upstream: client → dispatcher ───────────────────────────────
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_upstream_message(text.as_str(), &app.service)
                            && ws_tx.send(Message::Text(reply.into())).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("telemetry websocket closed");
}

#[derive(Serialize)]
struct UpstreamResult {
    topic: &'static str,
    ok: bool,
    detail: Option<String>,
}

/// Handle one text frame from a WebSocket client.
///
/// Only `{"topic": "/manual_control", "msg": {...}}` is recognised.  It is
/// answered with `{"topic": "/manual_control/result", "ok": .., "detail": ..}`.
/// Anything else, including invalid JSON, is ignored and yields `None`.
pub(crate) fn handle_upstream_message(text: &str, service: &TelemetryService) -> Option<String> {
    let json = serde_json::from_str::<Value>(text).ok()?;
    let topic = json.get("topic").and_then(|t| t.as_str()).unwrap_or("");
    if topic != MANUAL_CONTROL_TOPIC {
        return None;
    }

    let msg = json
        .get("msg")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    let outcome = serde_json::from_value::<ManualControlCommand>(msg)
        .map_err(|e| e.to_string())
        .and_then(|command| {
            service
                .send_manual_control(&command)
                .map_err(|e| e.to_string())
        });

    let reply = UpstreamResult {
        topic: MANUAL_CONTROL_RESULT_TOPIC,
        ok: outcome.is_ok(),
        detail: outcome.err(),
    };
    serde_json::to_string(&reply).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rover_core::ServiceConfig;
    use rover_link::LoopbackLink;
    use rover_types::{Heartbeat, LinkFrame, OutboundCommand, TelemetryMessage};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite;

    /// A started service whose loopback vehicle has sent one heartbeat.
    async fn connected_service() -> (Arc<TelemetryService>, Arc<LoopbackLink>) {
        let service = Arc::new(TelemetryService::new(ServiceConfig::default()));
        let link = Arc::new(LoopbackLink::new());
        service.start(link.clone()).unwrap();
        link.inject(LinkFrame::new(1, 1, TelemetryMessage::Heartbeat(Heartbeat::default())));
        for _ in 0..200 {
            if service.is_connected() {
                return (service, link);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("loopback vehicle never connected");
    }

    async fn spawn_server(server: CockpitServer) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.run_on(listener));
        addr
    }

    async fn spawn_default(service: Arc<TelemetryService>) -> SocketAddr {
        spawn_server(CockpitServer::new(service).with_push_interval(Duration::from_millis(20))).await
    }

    struct Reply {
        status: u16,
        /// Status line and headers, lowercased.
        head: String,
        body: String,
    }

    impl Reply {
        fn json(&self) -> Value {
            serde_json::from_str(&self.body).expect("response body is JSON")
        }
    }

    /// Write `raw` to the server and read the whole response.
    async fn exchange(addr: SocketAddr, raw: &str) -> Reply {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
            .await
            .expect("server answers and closes")
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let (head, body) = text.split_once("\r\n\r\n").expect("complete response");
        Reply {
            status: head.split_whitespace().nth(1).unwrap().parse().unwrap(),
            head: head.to_ascii_lowercase(),
            body: body.to_string(),
        }
    }

    async fn call(addr: SocketAddr, method: &str, target: &str, body: &str) -> Reply {
        let raw = format!(
            "{method} {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        exchange(addr, &raw).await
    }

    // ── CockpitServer constructor ─────────────────────────────────────────────

    #[test]
    fn defaults_and_builders() {
        let service = Arc::new(TelemetryService::default());
        let server = CockpitServer::new(Arc::clone(&service));
        assert_eq!(server.port(), DEFAULT_PORT);
        assert_eq!(server.push_interval(), DEFAULT_PUSH_INTERVAL);
        assert_eq!(server.idle_timeout(), DEFAULT_IDLE_TIMEOUT);

        let server = CockpitServer::new(service)
            .with_port(9999)
            .with_push_interval(Duration::from_millis(50))
            .with_idle_timeout(Duration::from_secs(5));
        assert_eq!(server.port(), 9999);
        assert_eq!(server.push_interval(), Duration::from_millis(50));
        assert_eq!(server.idle_timeout(), Duration::from_secs(5));
    }

    // ── Routes ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn health_without_link_has_null_targets() {
        let addr = spawn_default(Arc::new(TelemetryService::default())).await;
        let reply = call(addr, "GET", "/api/health", "").await;
        assert_eq!(reply.status, 200);
        assert!(reply.head.contains("access-control-allow-origin: *"));
        let json = reply.json();
        assert_eq!(json["ok"], true);
        assert_eq!(json["connected"], false);
        assert!(json["target_system"].is_null());
        assert!(json["target_component"].is_null());
    }

    #[tokio::test]
    async fn telemetry_returns_snapshot() {
        let addr = spawn_default(Arc::new(TelemetryService::default())).await;
        let reply = call(addr, "GET", "/api/telemetry?pretty=1", "").await;
        assert_eq!(reply.status, 200);
        let json = reply.json();
        assert_eq!(json["connected"], false);
        assert!(json["position"]["lat_deg"].is_null());
        assert!(json["raw"]["HEARTBEAT"].is_null());
    }

    #[tokio::test]
    async fn manual_control_without_link_is_bad_request() {
        let addr = spawn_default(Arc::new(TelemetryService::default())).await;
        let reply = call(addr, "POST", "/api/manual-control", "{}").await;
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json()["detail"], "MAVLink connection is not initialized");
    }

    #[tokio::test]
    async fn chunked_manual_control_body_is_read_in_full() {
        let addr = spawn_default(Arc::new(TelemetryService::default())).await;
        let reply = exchange(
            addr,
            "POST /api/manual-control HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n\
             2\r\n{}\r\n0\r\n\r\n",
        )
        .await;
        // Parsed as `{}`, so the failure is the missing link, not the body.
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json()["detail"], "MAVLink connection is not initialized");
    }

    #[tokio::test]
    async fn manual_control_with_malformed_json_is_unprocessable() {
        let addr = spawn_default(Arc::new(TelemetryService::default())).await;
        let reply = call(addr, "POST", "/api/manual-control", "{not json").await;
        assert_eq!(reply.status, 422);
        assert!(reply.json()["detail"].is_string());
    }

    #[tokio::test]
    async fn manual_control_out_of_range_is_unprocessable() {
        let addr = spawn_default(Arc::new(TelemetryService::default())).await;
        let reply = call(addr, "POST", "/api/manual-control", r#"{"x": 1001}"#).await;
        assert_eq!(reply.status, 422);
        assert_eq!(reply.json()["detail"], "x = 1001 is out of range [-1000, 1000]");
    }

    #[tokio::test]
    async fn manual_control_before_heartbeat_is_target_unknown() {
        let service = Arc::new(TelemetryService::default());
        service.start(Arc::new(LoopbackLink::new())).unwrap();
        let addr = spawn_default(Arc::clone(&service)).await;

        let reply = call(addr, "POST", "/api/manual-control", "{}").await;
        assert_eq!(reply.status, 400);
        assert_eq!(
            reply.json()["detail"],
            "Target system is unknown. Wait for heartbeat first"
        );
        service.stop().await;
    }

    #[tokio::test]
    async fn manual_control_reaches_the_vehicle() {
        let (service, link) = connected_service().await;
        let addr = spawn_default(Arc::clone(&service)).await;

        let reply = call(
            addr,
            "POST",
            "/api/manual-control",
            r#"{"x": 250, "y": -250, "r": 10, "buttons": 2}"#,
        )
        .await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.json(), json!({ "ok": true }));
        assert!(link.sent().contains(&OutboundCommand::ManualControl {
            target_system: 1,
            x: 250,
            y: -250,
            z: 500,
            r: 10,
            buttons: 2,
        }));
        service.stop().await;
    }

    #[tokio::test]
    async fn options_is_no_content_with_cors() {
        let addr = spawn_default(Arc::new(TelemetryService::default())).await;
        let reply = call(addr, "OPTIONS", "/api/manual-control", "").await;
        assert_eq!(reply.status, 204);
        assert!(reply.body.is_empty());
        assert!(reply.head.contains("access-control-allow-origin: *"));
        assert!(reply.head.contains("access-control-allow-methods: get, post, options"));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found_and_wrong_method_is_rejected() {
        let addr = spawn_default(Arc::new(TelemetryService::default())).await;
        let reply = call(addr, "GET", "/nope", "").await;
        assert_eq!(reply.status, 404);
        assert_eq!(reply.json()["detail"], "Not Found");
        assert!(reply.head.contains("access-control-allow-origin: *"));

        assert_eq!(call(addr, "DELETE", "/api/health", "").await.status, 405);
        assert_eq!(call(addr, "GET", "/api/manual-control", "").await.status, 405);
    }

    // ── Connection handling ───────────────────────────────────────────────────

    #[tokio::test]
    async fn idle_connection_is_closed() {
        let addr = spawn_server(
            CockpitServer::new(Arc::new(TelemetryService::default()))
                .with_idle_timeout(Duration::from_millis(100)),
        )
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("server drops the silent connection");
        assert!(matches!(read, Ok(0) | Err(_)), "got {read:?}");
    }

    #[tokio::test]
    async fn websocket_upgrade_split_across_writes_is_accepted() {
        let addr = spawn_default(Arc::new(TelemetryService::default())).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream
            .write_all(b"GET /ws/telemetry HTTP/1.1\r\nHost: localhost\r\n")
            .await
            .unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream
            .write_all(
                b"Upgrade: websocket\r\nConnection: Upgrade\r\n\
                  Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
            )
            .await
            .unwrap();

        let mut head = Vec::new();
        let mut buf = [0u8; 256];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
                .await
                .expect("handshake reply")
                .unwrap();
            assert!(n > 0, "connection closed before the handshake reply");
            head.extend_from_slice(&buf[..n]);
        }
        let head = String::from_utf8_lossy(&head);
        assert!(head.starts_with("HTTP/1.1 101"), "got: {head}");
    }

    // ── Upstream message handling ─────────────────────────────────────────────

    #[test]
    fn upstream_manual_control_without_link_reports_failure() {
        let service = TelemetryService::default();
        let reply = handle_upstream_message(
            r#"{"topic":"/manual_control","msg":{"x":0,"y":0,"z":500,"r":0}}"#,
            &service,
        )
        .expect("manual control gets a reply");
        let json: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(json["topic"], MANUAL_CONTROL_RESULT_TOPIC);
        assert_eq!(json["ok"], false);
        assert_eq!(json["detail"], "MAVLink connection is not initialized");
    }

    #[tokio::test]
    async fn upstream_manual_control_is_dispatched() {
        let (service, link) = connected_service().await;
        let reply = handle_upstream_message(
            r#"{"topic":"/manual_control","msg":{"x":-1000,"z":0}}"#,
            &service,
        )
        .unwrap();
        let json: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(json["ok"], true);
        assert!(json["detail"].is_null());
        assert!(link.sent().iter().any(|c| matches!(
            c,
            OutboundCommand::ManualControl { x: -1000, z: 0, .. }
        )));
        service.stop().await;
    }

    #[test]
    fn upstream_unknown_topic_and_invalid_json_are_ignored() {
        let service = TelemetryService::default();
        assert!(handle_upstream_message(r#"{"topic":"/unknown"}"#, &service).is_none());
        assert!(handle_upstream_message("not json at all", &service).is_none());
    }

    // ── Over the wire ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn websocket_pushes_snapshots_and_answers_commands() {
        let addr = spawn_default(Arc::new(TelemetryService::default())).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{TELEMETRY_WS_PATH}"))
            .await
            .unwrap();

        let first = ws.next().await.unwrap().unwrap();
        let snapshot: Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
        assert_eq!(snapshot["connected"], false);

        ws.send(tungstenite::Message::Text(
            r#"{"topic":"/manual_control","msg":{}}"#.to_string().into(),
        ))
        .await
        .unwrap();

        let mut answered = false;
        for _ in 0..50 {
            let frame = ws.next().await.unwrap().unwrap();
            let json: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
            if json["topic"] == MANUAL_CONTROL_RESULT_TOPIC {
                assert_eq!(json["ok"], false);
                answered = true;
                break;
            }
        }
        assert!(answered, "no manual control result received");
        ws.close(None).await.unwrap();
    }
}
