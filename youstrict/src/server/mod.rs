//! YouStrict server - owns the one session controller for the app.
//!
//! Architecture:
//! - One server per user, discoverable via PID/port files in ~/.youstrict
//! - The server holds the controller, the router and the navigation guard
//! - The UI and the CLI talk to it over HTTP on 127.0.0.1
//!
//! Endpoints:
//! - GET /api/session - Current session
//! - POST /api/session - Start a session (requires a solved challenge)
//! - DELETE /api/session - End the session
//! - POST /api/session/reload - Re-read the stored session
//! - POST /api/lifecycle - App moved to foreground/background
//! - GET /api/durations - Duration choices
//! - GET /api/preview - When a session started now would end
//! - POST /api/challenge - Issue a parent challenge
//! - GET /api/route, POST /api/route - Current screen, guarded navigation
//! - WS /ws - Snapshots on every session or route change
//! - GET / - Status page

mod handlers;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::challenge::ChallengeBook;
use crate::clock::{self, Clock, SystemClock};
use crate::config::{self, Config};
use crate::guard::{MemoryRouter, NavigationGuard};
use crate::models::Route;
use crate::session::{SessionController, SessionStatus};
use crate::store::{FileSecureStore, MemorySecureStore, SecureStore, SessionStore};

pub use handlers::{
    ChallengeResponse, LifecycleRequest, PreviewResponse, RouteRequest, RouteView, StartRequest,
};

const PID_FILE: &str = "server.pid";
const PORT_FILE: &str = "server.port";

/// Session as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub active: bool,
    pub remaining_seconds: u64,
    pub expires_at: Option<i64>,
    /// Remaining time formatted for display.
    pub countdown: String,
}

impl From<SessionStatus> for SessionView {
    fn from(status: SessionStatus) -> Self {
        Self {
            active: status.is_active(),
            remaining_seconds: status.remaining_seconds(),
            expires_at: status.expires_at(),
            countdown: clock::format_countdown(status.remaining_seconds()),
        }
    }
}

/// Shared server state.
pub struct ServerState {
    controller: SessionController,
    router: Arc<MemoryRouter>,
    challenges: ChallengeBook,
    clock: Arc<dyn Clock>,
    /// Kept alive for the lifetime of the server.
    _guard: NavigationGuard,
}

impl ServerState {
    /// Wire the router and guard around `controller`. Needs a tokio runtime.
    pub fn new(controller: SessionController, clock: Arc<dyn Clock>) -> Self {
        let router = Arc::new(MemoryRouter::new(Route::Root));
        let guard = NavigationGuard::spawn(controller.subscribe(), router.clone());
        Self {
            controller,
            router,
            challenges: ChallengeBook::new(clock.clone()),
            clock,
            _guard: guard,
        }
    }
}

/// All routes, without middleware.
pub fn app(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/api/session",
            get(handlers::get_session)
                .post(handlers::start_session)
                .delete(handlers::end_session),
        )
        .route("/api/session/reload", post(handlers::reload_session))
        .route("/api/lifecycle", post(handlers::lifecycle))
        .route("/api/durations", get(handlers::durations))
        .route("/api/preview", get(handlers::preview))
        .route("/api/challenge", post(handlers::issue_challenge))
        .route("/api/route", get(handlers::get_route).post(handlers::navigate))
        .route("/ws", get(handlers::websocket))
        .with_state(state)
}

// === Server Lifecycle ===

/// Start the server and run until Ctrl-C.
pub async fn start_server(config: &Config, open_browser: bool) -> Result<()> {
    let server_dir = config::server_dir()?;
    std::fs::create_dir_all(&server_dir)
        .with_context(|| format!("Failed to create {}", server_dir.display()))?;
    std::fs::write(server_dir.join(PID_FILE), std::process::id().to_string())?;
    std::fs::write(server_dir.join(PORT_FILE), config.port.to_string())?;

    let backend: Arc<dyn SecureStore> = match FileSecureStore::open(&config.data_dir) {
        Ok(store) => {
            info!(dir = %store.dir().display(), "Opened session store");
            Arc::new(store)
        }
        Err(err) => {
            warn!(error = %err, "Session store unavailable; sessions will not survive a restart");
            Arc::new(MemorySecureStore::new())
        }
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let controller = SessionController::new(SessionStore::new(backend), clock.clone());

    let status = controller.reload().await;
    info!(
        active = status.is_active(),
        remaining_seconds = status.remaining_seconds(),
        "Loaded stored session"
    );

    let state = Arc::new(ServerState::new(controller, clock));
    let app = app(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "YouStrict server listening");

    if open_browser {
        if let Err(err) = open::that(format!("http://{addr}")) {
            warn!(error = %err, "Failed to open browser");
        }
    }

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    remove_server_files(&server_dir);
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

fn remove_server_files(server_dir: &Path) {
    let _ = std::fs::remove_file(server_dir.join(PID_FILE));
    let _ = std::fs::remove_file(server_dir.join(PORT_FILE));
}

/// Port of a running server, if any.
pub fn get_server_port() -> Option<u16> {
    let server_dir = config::server_dir().ok()?;
    let pid_str = std::fs::read_to_string(server_dir.join(PID_FILE)).ok()?;
    let pid = pid_str.trim().parse::<u32>().ok()?;
    if !process_alive(pid) {
        return None;
    }
    std::fs::read_to_string(server_dir.join(PORT_FILE))
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
const fn process_alive(_pid: u32) -> bool {
    true
}

/// Launch `youstrict serve` detached from this process.
pub fn spawn_server_daemon(config: &Config) -> Result<()> {
    use std::process::{Command, Stdio};

    let exe = std::env::current_exe()?;
    Command::new(&exe)
        .arg("--port")
        .arg(config.port.to_string())
        .arg("--data-dir")
        .arg(&config.data_dir)
        .arg("serve")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Failed to spawn server daemon")?;
    Ok(())
}

/// Port of the running server, starting one if needed.
pub async fn ensure_server_running(config: &Config) -> Result<u16> {
    if let Some(port) = get_server_port() {
        return Ok(port);
    }

    spawn_server_daemon(config)?;

    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Some(port) = get_server_port() {
            return Ok(port);
        }
    }

    anyhow::bail!("Server failed to start")
}
