//! # Step Coordinator Server Module / 步骤协调服务器模块
//!
//! The HTTP side of remote execution. A driver asks `POST /getstep` which page
//! comes next and reports every output line with `PUT /message`. Both calls
//! must carry the id of the one active `StepSession`; anything else is
//! rejected without touching the session.
//!
//! 远程执行的 HTTP 端。驱动程序通过 `POST /getstep` 询问下一个页面，
//! 并通过 `PUT /message` 报告每一行输出。两个调用都必须携带当前活动会话的 id。

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::core::config::PageSpec;
use crate::core::error::{Error, Result};
use crate::remote::protocol::{self, ErrorBody, RelayedMessage, StepResponse};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// What an active session reports to the attempt driving it.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The driver asked for page `index`.
    Step(usize),
    /// The driver relayed an output line.
    Message(RelayedMessage),
}

/// State of the one remote attempt currently allowed to talk to the server.
#[derive(Debug)]
pub struct StepSession {
    pub run_id: String,
    pub current_step: usize,
    pub complete: bool,
    events: mpsc::UnboundedSender<SessionEvent>,
}

/// Correlation service shared by the HTTP handlers and the browser stage.
#[derive(Clone)]
pub struct StepCoordinator {
    pages: Arc<Vec<PageSpec>>,
    session: Arc<Mutex<Option<StepSession>>>,
}

impl StepCoordinator {
    pub fn new(pages: Vec<PageSpec>) -> Self {
        Self {
            pages: Arc::new(pages),
            session: Arc::new(Mutex::new(None)),
        }
    }

    pub fn pages(&self) -> &[PageSpec] {
        &self.pages
    }

    /// Makes `run_id` the active session, replacing any previous one.
    pub fn open_session(&self, run_id: &str) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock() = Some(StepSession {
            run_id: run_id.to_string(),
            current_step: 0,
            complete: false,
            events: tx,
        });
        rx
    }

    pub fn close_session(&self) {
        *self.lock() = None;
    }

    /// Whether the active session has reached its terminal step.
    pub fn is_complete(&self) -> bool {
        self.lock().as_ref().is_some_and(|s| s.complete)
    }

    /// Serves `/getstep`. An out-of-range step marks the session complete and
    /// returns an empty reply.
    pub fn get_step(&self, body: &Value) -> Result<StepResponse> {
        let mut guard = self.lock();
        let session = active(&mut guard, body)?;
        let step = protocol::body_step(body)?;

        session.current_step = step;
        let reply = match self.pages.get(step) {
            Some(page) if !page.url.is_empty() => StepResponse::from(page),
            _ => {
                session.complete = true;
                StepResponse::default()
            }
        };
        let _ = session.events.send(SessionEvent::Step(step));
        Ok(reply)
    }

    /// Serves `/message`. Fields are read leniently; a body without a usable
    /// `id` never gets past the session check.
    pub fn post_message(&self, body: Value) -> Result<()> {
        let mut guard = self.lock();
        let session = active(&mut guard, &body)?;
        match RelayedMessage::from_body(&body) {
            Some(message) => {
                let _ = session.events.send(SessionEvent::Message(message));
            }
            None => tracing::debug!("Dropping malformed message: {body}"),
        }
        Ok(())
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::POST, Method::PUT])
            .allow_headers([header::CONTENT_TYPE, header::CONTENT_LENGTH]);

        Router::new()
            .route("/getstep", post(get_step))
            .route("/message", put(put_message))
            .layer(cors)
            .with_state(self.clone())
    }

    /// Binds `port` (0 picks a free one) and serves until the handle is shut down.
    pub async fn serve(&self, port: u16) -> Result<ServerHandle> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::ServerBind { port, source })?;
        let local_addr = listener.local_addr()?;

        let token = CancellationToken::new();
        let shutdown = token.clone();
        let app = self.router();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::error!("Coordination server stopped: {e}");
            }
        });

        Ok(ServerHandle {
            local_addr,
            token,
            task: Some(task),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<StepSession>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn active<'a>(
    guard: &'a mut MutexGuard<'_, Option<StepSession>>,
    body: &Value,
) -> Result<&'a mut StepSession> {
    let id = protocol::body_id(body);
    match guard.as_mut() {
        Some(session) if id.as_deref() == Some(session.run_id.as_str()) => Ok(session),
        _ => Err(Error::InvalidTestId),
    }
}

async fn get_step(State(coordinator): State<StepCoordinator>, body: Bytes) -> Response {
    let body = parse_body(&body);
    match coordinator.get_step(&body) {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(e) => reject(&e),
    }
}

async fn put_message(State(coordinator): State<StepCoordinator>, body: Bytes) -> Response {
    let body = parse_body(&body);
    match coordinator.post_message(body) {
        Ok(()) => (StatusCode::OK, Json(json!({}))).into_response(),
        Err(e) => reject(&e),
    }
}

fn parse_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

fn reject(error: &Error) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorBody::from(error))).into_response()
}

/// A running coordination server. Dropping it stops the server.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(mut task) = self.task.take()
            && tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await.is_err()
        {
            task.abort();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
