//! Local stand-in for the orchestrator's pre-signed callback URL.
//!
//! Records every `PUT` it receives. A number of upcoming requests can be
//! answered with `500` to exercise delivery retries.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::put;
use ratewall_resource::error::{Error, Result};
use serde_json::Value;
use tokio::sync::oneshot;

/// A callback request as received.
#[derive(Debug, Clone)]
pub struct RecordedCallback {
    /// Path segment after `/callbacks/`.
    pub id: String,
    /// `Content-Type` header, if sent.
    pub content_type: Option<String>,
    /// Raw body length.
    pub body_len: usize,
    /// Parsed body (`Value::Null` if it was not JSON).
    pub body: Value,
}

#[derive(Debug, Default)]
struct ServerState {
    received: Vec<RecordedCallback>,
    attempts: usize,
    failures_remaining: usize,
}

/// HTTP server on `127.0.0.1:0` recording completion signals.
pub struct CallbackServer {
    base_url: String,
    state: Arc<Mutex<ServerState>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    _task: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for CallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackServer")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CallbackServer {
    /// Starts the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or its address read.
    pub async fn start() -> Result<Self> {
        let state = Arc::new(Mutex::new(ServerState::default()));

        let app = Router::new()
            .route("/callbacks/:id", put(record_callback))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::internal(format!("failed to bind callback listener: {e}")))?;
        let addr: SocketAddr = listener
            .local_addr()
            .map_err(|e| Error::internal(format!("failed to read listener addr: {e}")))?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = server.await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            state,
            shutdown_tx: Some(shutdown_tx),
            _task: task,
        })
    }

    /// URL to hand out as an event's `ResponseURL`.
    pub fn url(&self, id: &str) -> String {
        format!("{}/callbacks/{id}", self.base_url)
    }

    /// Answers the next `count` requests with `500`.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().unwrap().failures_remaining = count;
    }

    /// Requests that were accepted, in order.
    pub fn received(&self) -> Vec<RecordedCallback> {
        self.state.lock().unwrap().received.clone()
    }

    /// Requests seen, including rejected ones.
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn record_callback(
    State(state): State<Arc<Mutex<ServerState>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let mut state = state.lock().unwrap();
    state.attempts += 1;
    if state.failures_remaining > 0 {
        state.failures_remaining -= 1;
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    state.received.push(RecordedCallback {
        id,
        content_type: headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body_len: body.len(),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });
    StatusCode::OK
}
