//! HTTP and WebSocket handlers.

use std::sync::Arc;

use axum::{
    extract::{ws::Message, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ServerState, SessionView};
use crate::challenge::ChallengeError;
use crate::clock;
use crate::guard::{self, Router as _};
use crate::models::{
    DurationError, Route, RouteError, WatchDuration, CUSTOM_MAX_MINUTES, CUSTOM_MIN_MINUTES,
    CUSTOM_STEP_MINUTES, DEFAULT_MINUTES, PRESET_MINUTES,
};
use crate::session::{AppState, SessionError};

// === Request/Response Types ===

/// Request to start a session.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartRequest {
    pub minutes: WatchDuration,
    pub challenge_id: Uuid,
    pub answer: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LifecycleRequest {
    pub state: AppState,
}

/// What the duration screen offers.
#[derive(Debug, Serialize, Deserialize)]
pub struct DurationOptions {
    pub presets: Vec<u32>,
    pub default: u32,
    pub custom_min: u32,
    pub custom_max: u32,
    pub custom_step: u32,
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    pub minutes: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub minutes: u32,
    pub expires_at: i64,
    /// Local wall-clock time, `HH:MM:SS`.
    pub ends_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub id: Uuid,
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteRequest {
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteView {
    pub path: String,
}

/// Pushed over the WebSocket on every change.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub session: SessionView,
    pub route: String,
}

impl Snapshot {
    fn capture(state: &ServerState) -> Self {
        Self {
            session: state.controller.status().into(),
            route: state.router.current().path(),
        }
    }
}

// === Errors ===

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Duration(#[from] DurationError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Challenge(#[from] ChallengeError),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Duration(_) | Self::Route(_) | Self::Session(_) => StatusCode::BAD_REQUEST,
            Self::Challenge(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

// === Handlers ===

pub(super) async fn index() -> Html<&'static str> {
    Html(include_str!("ui.html"))
}

pub(super) async fn get_session(State(state): State<Arc<ServerState>>) -> Json<SessionView> {
    Json(state.controller.status().into())
}

pub(super) async fn start_session(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<StartRequest>,
) -> Result<Json<SessionView>, ApiError> {
    if let Err(err) = state.challenges.verify(req.challenge_id, req.answer) {
        warn!(error = %err, "Rejected session start");
        return Err(err.into());
    }

    let status = state.controller.start(req.minutes.minutes()).await?;
    state.router.replace(Route::Videos);
    Ok(Json(status.into()))
}

pub(super) async fn end_session(State(state): State<Arc<ServerState>>) -> Json<SessionView> {
    let status = state.controller.end().await;
    state.router.replace(Route::Root);
    Json(status.into())
}

pub(super) async fn reload_session(State(state): State<Arc<ServerState>>) -> Json<SessionView> {
    Json(state.controller.reload().await.into())
}

pub(super) async fn lifecycle(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<LifecycleRequest>,
) -> Json<SessionView> {
    debug!(state = ?req.state, "App lifecycle change");
    Json(state.controller.on_app_state(req.state).await.into())
}

pub(super) async fn durations() -> Json<DurationOptions> {
    Json(DurationOptions {
        presets: PRESET_MINUTES.to_vec(),
        default: DEFAULT_MINUTES,
        custom_min: CUSTOM_MIN_MINUTES,
        custom_max: CUSTOM_MAX_MINUTES,
        custom_step: CUSTOM_STEP_MINUTES,
    })
}

pub(super) async fn preview(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let minutes = WatchDuration::new(params.minutes)?.minutes();
    Ok(Json(PreviewResponse {
        minutes,
        expires_at: state.controller.preview(minutes),
        ends_at: clock::preview_end(state.clock.now_ms(), minutes),
    }))
}

pub(super) async fn issue_challenge(
    State(state): State<Arc<ServerState>>,
) -> Json<ChallengeResponse> {
    let challenge = state.challenges.issue();
    Json(ChallengeResponse {
        id: challenge.id,
        question: challenge.question(),
    })
}

pub(super) async fn get_route(State(state): State<Arc<ServerState>>) -> Json<RouteView> {
    Json(RouteView {
        path: state.router.current().path(),
    })
}

pub(super) async fn navigate(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<RouteRequest>,
) -> Result<Json<RouteView>, ApiError> {
    let requested = Route::parse(&req.path)?;
    let active = state.controller.status().is_active();
    let landed = guard::redirect(active, &requested).unwrap_or_else(|| requested.clone());
    state.router.replace(landed.clone());
    if landed != requested {
        info!(requested = %requested, landed = %landed, "Navigation redirected");
    }
    Ok(Json(RouteView { path: landed.path() }))
}

pub(super) async fn websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

async fn handle_websocket(mut socket: axum::extract::ws::WebSocket, state: Arc<ServerState>) {
    let sessions = WatchStream::new(state.controller.subscribe()).map(|_| ());
    let routes = WatchStream::new(state.router.subscribe()).map(|_| ());
    let mut changes = sessions.merge(routes);

    while changes.next().await.is_some() {
        let Ok(json) = serde_json::to_string(&Snapshot::capture(&state)) else {
            continue;
        };
        if socket.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
}
