//! axum routes serving the tool execution loop over SSE

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use eyre::eyre;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::events::{EventLogger, EventRecorder, TraceMirror, read_session_events, reconstruct_entries};
use crate::llm::{Message, ModelInvoker, ModelParameters, ModelProvider, create_provider};
use crate::r#loop::{LoopConfig, StreamSession, ToolExecutionLoop};
use crate::tools::ToolRegistry;

use super::{SseEncoder, TransportError};

pub const HEALTH_PATH: &str = "/health";
pub const CHAT_PATH: &str = "/v1/chat";
pub const SESSION_MESSAGE_PATH: &str = "/v1/sessions/:id/message";
pub const TOOLS_PATH: &str = "/v1/tools";

/// Response header carrying the id of the session behind a chat stream
pub const SESSION_HEADER: &str = "x-session-id";

/// Recorders kept in memory by default; older sessions are served from their event log
pub const DEFAULT_SESSION_CAPACITY: usize = 256;

/// Recent session recorders, oldest evicted first
struct SessionStore {
    recorders: HashMap<String, EventRecorder>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SessionStore {
    fn new(capacity: usize) -> Self {
        Self {
            recorders: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, session_id: &str, recorder: EventRecorder) {
        if self.recorders.insert(session_id.to_string(), recorder).is_none() {
            self.order.push_back(session_id.to_string());
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                debug!(session_id = %oldest, "SessionStore::insert: evicting recorder");
                self.recorders.remove(&oldest);
            }
        }
    }

    fn get(&self, session_id: &str) -> Option<EventRecorder> {
        self.recorders.get(session_id).cloned()
    }

    fn len(&self) -> usize {
        self.recorders.len()
    }
}

/// Shared handles for every request
#[derive(Clone)]
pub struct AppState {
    provider: Arc<dyn ModelProvider>,
    registry: ToolRegistry,
    params: ModelParameters,
    loop_config: LoopConfig,
    events_dir: Option<PathBuf>,
    sessions: Arc<Mutex<SessionStore>>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        registry: ToolRegistry,
        params: ModelParameters,
        loop_config: LoopConfig,
    ) -> Self {
        debug!(provider = %provider.name(), tools = registry.len(), "AppState::new: called");
        Self {
            provider,
            registry,
            params,
            loop_config,
            events_dir: None,
            sessions: Arc::new(Mutex::new(SessionStore::new(DEFAULT_SESSION_CAPACITY))),
        }
    }

    /// Keep at most `capacity` recorders in memory
    pub fn with_session_capacity(mut self, capacity: usize) -> Self {
        self.sessions = Arc::new(Mutex::new(SessionStore::new(capacity)));
        self
    }

    /// Number of session recorders currently held in memory
    pub fn recorded_sessions(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Persist each session's events as JSONL under `dir`
    pub fn with_events_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.events_dir = dir;
        self
    }

    fn remember(&self, session_id: &str, recorder: EventRecorder) {
        self.sessions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(session_id, recorder);
    }

    /// Rebuild a session's message from memory, else from its event log
    fn session_message(&self, session_id: &str) -> Result<Option<Message>, ApiError> {
        let recorder = self.sessions.lock().unwrap_or_else(|p| p.into_inner()).get(session_id);
        if let Some(recorder) = recorder {
            return Ok(Some(recorder.message()));
        }
        let Some(dir) = &self.events_dir else {
            return Ok(None);
        };
        // Only ids this server could have issued map onto a log directory
        if Uuid::parse_str(session_id).is_err() {
            return Ok(None);
        }
        let entries = read_session_events(dir, session_id).map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok((!entries.is_empty()).then(|| reconstruct_entries(&entries)))
    }
}

/// Errors returned to HTTP clients as `{"error": ...}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Body of `POST /v1/chat`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub loop_budget: Option<u32>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(CHAT_PATH, post(chat))
        .route(SESSION_MESSAGE_PATH, get(session_message))
        .route(TOOLS_PATH, get(list_tools))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.specs())
}

/// Reconstruct the assistant message of a session from its recorded events
async fn session_message(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Message>, ApiError> {
    debug!(%id, "session_message: called");
    let message = state
        .session_message(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("session {}", id)))?;
    Ok(Json(message))
}

/// Start a session and stream its events
///
/// The loop runs on its own task; the encoder is closed when it settles,
/// whatever the outcome. A client disconnect drops the body, which aborts the
/// session.
async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Result<Response, ApiError> {
    debug!(messages = request.messages.len(), ?request.loop_budget, "chat: called");
    if request.messages.is_empty() {
        return Err(ApiError::BadRequest("messages must not be empty".to_string()));
    }

    let cancel = CancellationToken::new();
    let encoder = Arc::new(SseEncoder::new(cancel.clone()));
    let bus = encoder.create_event_emitter();

    let budget = request.loop_budget.unwrap_or(state.loop_config.loop_budget);
    let mut session = StreamSession::with_cancel(request.messages, budget, cancel);
    let session_id = session.id.clone();

    let recorder = EventRecorder::attach(&bus);
    TraceMirror::attach(&bus);
    let logger = match &state.events_dir {
        Some(dir) => match EventLogger::attach(&bus, dir, &session_id) {
            Ok(logger) => Some(logger),
            Err(e) => {
                warn!(%session_id, error = %e, "chat: event log unavailable");
                None
            }
        },
        None => None,
    };
    state.remember(&session_id, recorder);

    let mut response = encoder.to_response()?;
    let header_value =
        HeaderValue::from_str(&session_id).map_err(|e| ApiError::Internal(format!("session id header: {}", e)))?;
    response.headers_mut().insert(SESSION_HEADER, header_value);

    let invoker =
        ModelInvoker::new(state.provider.clone(), state.params.clone()).with_chunk_buffer(state.loop_config.chunk_buffer);
    let engine = ToolExecutionLoop::new(invoker, state.registry.clone(), bus);

    tokio::spawn(async move {
        match engine.run(&mut session).await {
            Ok(result) => info!(
                session_id = %result.session_id,
                stop = ?result.stop,
                loop_count = result.loop_count,
                "chat: session finished"
            ),
            Err(e) => warn!(session_id = %session.id, error = %e, "chat: session failed"),
        }
        encoder.close();
        if let Some(logger) = logger {
            logger.close();
        }
    });

    info!(%session_id, "chat: streaming");
    Ok(response)
}

/// Bind and serve until ctrl-c
pub async fn serve(config: &Config) -> eyre::Result<()> {
    debug!(bind = %config.server.bind, "serve: called");
    let provider = create_provider(&config.llm)?;
    let events_dir = config.events.enabled.then(|| config.events.dir.clone());
    let state = AppState::new(
        provider,
        ToolRegistry::standard(),
        config.llm.model_parameters(),
        LoopConfig::from(&config.loop_config),
    )
    .with_events_dir(events_dir)
    .with_session_capacity(config.server.session_capacity);

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| eyre!("Failed to bind {}: {}", config.server.bind, e))?;
    info!(addr = %listener.local_addr()?, "serve: listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "serve: failed to listen for ctrl-c");
            }
        })
        .await?;

    info!("serve: stopped");
    Ok(())
}
