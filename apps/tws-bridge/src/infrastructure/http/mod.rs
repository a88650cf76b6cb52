//! HTTP Entry Point
//!
//! Small HTTP surface of the bridge: the root greeting, a liveness probe,
//! the terminal session status and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /` - Plain text greeting
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /status` - JSON snapshot of the terminal session
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{SessionSnapshot, TerminalSession};
use crate::infrastructure::metrics::get_metrics_handle;

/// Body served on `GET /`.
pub const GREETING: &str = "Hello World!";

// =============================================================================
// Response Types
// =============================================================================

/// Status endpoint response.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Terminal session.
    pub session: SessionSnapshot,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the HTTP handlers.
pub struct AppState {
    version: String,
    started_at: Instant,
    session: Arc<dyn TerminalSession>,
}

impl AppState {
    /// Create handler state around a terminal session.
    #[must_use]
    pub fn new(version: String, session: Arc<dyn TerminalSession>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            session,
        }
    }
}

/// Build the router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/healthz", get(liveness_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server.
pub struct HttpServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind, call `on_listening` with the bound address, then serve until
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run<F>(self, on_listening: F) -> Result<(), HttpServerError>
    where
        F: FnOnce(SocketAddr) + Send,
    {
        let app = create_router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(
            port = local_addr.port(),
            "listening at http://localhost:{}",
            local_addr.port()
        );
        on_listening(local_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn root_handler() -> &'static str {
    GREETING
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        session: state.session.snapshot(),
    })
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::MockTerminalSession;
    use crate::domain::events::ConnectionState;

    fn make_state(snapshot: SessionSnapshot) -> Arc<AppState> {
        let mut session = MockTerminalSession::new();
        session
            .expect_snapshot()
            .returning(move || snapshot.clone());
        Arc::new(AppState::new("0.1.0".to_string(), Arc::new(session)))
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn root_returns_greeting_while_disconnected() {
        let app = create_router(make_state(SessionSnapshot::default()));
        let (status, body) = get_body(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Hello World!");
    }

    #[tokio::test]
    async fn liveness_probe() {
        let app = create_router(make_state(SessionSnapshot::default()));
        let (status, body) = get_body(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn status_reports_session_snapshot() {
        let snapshot = SessionSnapshot {
            state: ConnectionState::Connected,
            address: "localhost:7497".to_string(),
            client_id: 999,
            server_version: 176,
            connection_time: Some("20240520 09:30:00 EST".to_string()),
            next_valid_id: Some(1),
            managed_accounts: vec!["DU123456".to_string()],
            bars_received: 10,
            errors_received: 3,
        };
        let app = create_router(make_state(snapshot));

        let (status, body) = get_body(app, "/status").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["version"], "0.1.0");
        assert_eq!(json["session"]["state"], "connected");
        assert_eq!(json["session"]["server_version"], 176);
        assert_eq!(json["session"]["managed_accounts"][0], "DU123456");
        assert_eq!(json["session"]["bars_received"], 10);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = create_router(make_state(SessionSnapshot::default()));
        let (status, _) = get_body(app, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn server_error_messages() {
        let err = HttpServerError::BindFailed(3000, "address in use".to_string());
        assert_eq!(err.to_string(), "failed to bind to port 3000: address in use");
    }
}
